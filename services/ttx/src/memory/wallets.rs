use std::{collections::HashMap, sync::Arc};

use ctoken_primitives::{
    AuditInfo, Ed25519Signer, Ed25519Verifier, Identity, Signer, SigningError, Verifier,
};
use parking_lot::{Mutex, RwLock};
use rand::{SeedableRng, rngs::StdRng};

use crate::{network::WalletService, wire::RecipientData};

/// What a local identity is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Owner,
    Issuer,
    Auditor,
}

struct Entry {
    role: Role,
    wallet: Option<String>,
    signer: Arc<dyn Signer>,
}

/// Ed25519 wallets of one node. Every recipient identity handed out is a
/// fresh pseudonym; the auditor can link each of them to `enrollment_id`.
pub struct MemoryWallets {
    enrollment_id: String,
    rng: Mutex<StdRng>,
    identities: RwLock<HashMap<Identity, Entry>>,
    recipients: RwLock<HashMap<Identity, RecipientData>>,
}

impl MemoryWallets {
    pub fn new(seed: u64) -> Self {
        Self {
            enrollment_id: format!("enrollment-{seed}"),
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            identities: RwLock::new(HashMap::new()),
            recipients: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_enrollment_id(mut self, enrollment_id: impl Into<String>) -> Self {
        self.enrollment_id = enrollment_id.into();
        self
    }

    pub fn enrollment_id(&self) -> &str {
        &self.enrollment_id
    }

    /// Every identity held, whatever its role.
    pub fn identities(&self) -> Vec<Identity> {
        self.identities.read().keys().cloned().collect()
    }

    /// Add an identity backed by `signer`.
    pub fn insert(&self, role: Role, wallet: Option<&str>, signer: Arc<dyn Signer>) -> Identity {
        let id = signer.identity();
        self.identities.write().insert(
            id.clone(),
            Entry {
                role,
                wallet: wallet.map(str::to_string),
                signer,
            },
        );
        id
    }

    fn generate(&self, role: Role, wallet: Option<&str>) -> Identity {
        let signer = Ed25519Signer::generate(&mut *self.rng.lock());
        self.insert(role, wallet, Arc::new(signer))
    }

    /// Fresh owner pseudonym of the default wallet.
    pub fn new_pseudonym(&self) -> Identity {
        self.generate(Role::Owner, None)
    }

    pub fn new_issuer(&self) -> Identity {
        self.generate(Role::Issuer, None)
    }

    pub fn new_auditor(&self) -> Identity {
        self.generate(Role::Auditor, None)
    }

    /// Identities of owner wallet `wallet` (`None` for the default one).
    pub fn owner_identities(&self, wallet: Option<&str>) -> Vec<Identity> {
        self.identities
            .read()
            .iter()
            .filter(|(_, e)| e.role == Role::Owner && e.wallet.as_deref() == wallet)
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Recipient identities other nodes handed to us.
    pub fn recipient(&self, id: &Identity) -> Option<RecipientData> {
        self.recipients.read().get(id).cloned()
    }

    fn has_role(&self, id: &Identity, role: Role) -> bool {
        self.identities
            .read()
            .get(id)
            .is_some_and(|e| e.role == role)
    }
}

impl WalletService for MemoryWallets {
    fn is_me(&self, id: &Identity) -> bool {
        self.identities.read().contains_key(id)
    }

    fn is_owner(&self, id: &Identity) -> bool {
        self.has_role(id, Role::Owner)
    }

    fn is_issuer(&self, id: &Identity) -> bool {
        self.has_role(id, Role::Issuer)
    }

    fn is_auditor(&self) -> bool {
        self.identities
            .read()
            .values()
            .any(|e| e.role == Role::Auditor)
    }

    fn signer(&self, id: &Identity) -> Option<Arc<dyn Signer>> {
        self.identities.read().get(id).map(|e| e.signer.clone())
    }

    fn verifier(&self, id: &Identity) -> Result<Box<dyn Verifier>, SigningError> {
        Ok(Box::new(Ed25519Verifier::from_identity(id)?))
    }

    fn recipient_identity(&self, wallet: Option<&str>) -> Result<Identity, SigningError> {
        Ok(self.generate(Role::Owner, wallet))
    }

    fn audit_info(&self, id: &Identity) -> Result<Vec<u8>, SigningError> {
        if let Some(entry) = self.identities.read().get(id) {
            return Ok(AuditInfo::sign(&*entry.signer, &self.enrollment_id)?.to_bytes()?);
        }
        self.recipients
            .read()
            .get(id)
            .map(|data| data.audit_info.clone())
            .ok_or_else(|| SigningError::UnknownIdentity(id.clone()))
    }

    fn token_metadata(&self, id: &Identity) -> Result<Vec<u8>, SigningError> {
        if let Some(entry) = self.identities.read().get(id) {
            return Ok(entry.wallet.as_deref().unwrap_or_default().as_bytes().to_vec());
        }
        self.recipients
            .read()
            .get(id)
            .map(|data| data.metadata.clone())
            .ok_or_else(|| SigningError::UnknownIdentity(id.clone()))
    }

    fn register_recipient_identity(&self, data: &RecipientData) -> Result<(), SigningError> {
        AuditInfo::open(&data.audit_info, &data.identity)?;
        self.recipients
            .write()
            .insert(data.identity.clone(), data.clone());
        Ok(())
    }
}
