//! Peer side of every token protocol: answer signature requests, audit
//! requests and recipient identity requests, then validate, store and
//! acknowledge the final transaction.

use std::sync::Arc;

use ctoken_primitives::{Identity, TokenRequest};
use ctoken_verifier::verify_request;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::{
    auditing::respond_audit,
    error::{TtxError, VaultError},
    network::{Session, WalletService, read_message},
    node::Node,
    recipients::{respond_exchange_recipient_identities, respond_request_recipient_identity},
    transaction::{Transaction, compute_tx_id},
    vault::keys::{self, TOKEN_KEY_PREFIX},
    wire::{ACK, SignatureRequest, WireMessage},
};

/// What a served session produced.
#[derive(Debug)]
pub enum Served {
    /// A transaction this node endorsed and committed.
    Transaction(Box<Transaction>),
    /// The recipient identity handed out.
    RecipientIdentity(Identity),
    /// `(mine, theirs)` after an identity exchange.
    Exchanged(Identity, Identity),
}

/// Serve one incoming session, dispatching on its first message. A failure is
/// reported to the other side before it is returned.
pub async fn serve(node: Node, session: Arc<dyn Session>) -> Result<Served, TtxError> {
    let info = session.info();
    let span = info_span!("serve", session = %info.id, caller = %info.caller);
    let result = dispatch(&node, &*session, &info.caller)
        .instrument(span)
        .await;
    if let Err(e) = &result {
        warn!(session = %info.id, error = %e, "session failed");
        // the other side may already be gone
        let _ = session.send_error(e.to_string()).await;
    }
    result
}

async fn dispatch(
    node: &Node,
    session: &dyn Session,
    caller: &Identity,
) -> Result<Served, TtxError> {
    let first = read_message(session, caller, Some(node.config.signature_timeout())).await?;
    match first {
        WireMessage::RecipientRequest(req) => {
            respond_request_recipient_identity(node, session, req)
                .await
                .map(Served::RecipientIdentity)
        }
        WireMessage::ExchangeRecipientRequest(req) => {
            respond_exchange_recipient_identities(node, session, req)
                .await
                .map(|(me, other)| Served::Exchanged(me, other))
        }
        first => respond_endorsement(node, session, caller, first)
            .await
            .map(|tx| Served::Transaction(Box::new(tx))),
    }
}

/// Signer slots of `request` held by this node.
fn owned_signer_slots(request: &TokenRequest, wallets: &dyn WalletService) -> usize {
    request
        .signers()
        .iter()
        .filter(|s| wallets.signer(s).is_some())
        .count()
}

async fn respond_endorsement(
    node: &Node,
    session: &dyn Session,
    caller: &Identity,
    first: WireMessage,
) -> Result<Transaction, TtxError> {
    let mut next = match first {
        WireMessage::SignatureRequest(first) => {
            answer_signature_requests(node, session, caller, first).await?;
            None
        }
        other => Some(other),
    };

    loop {
        let msg = match next.take() {
            Some(msg) => msg,
            None => {
                read_message(session, caller, node.config.final_transaction_timeout()).await?
            }
        };
        match msg {
            WireMessage::Transaction(tx) => return finalize(node, session, *tx).await,
            WireMessage::AuditRequest(req) => {
                if !node.wallets.is_auditor() {
                    return Err(TtxError::Protocol("audit requested from a non-auditor"));
                }
                respond_audit(node, session, req).await?;
            }
            _ => return Err(TtxError::Protocol("expected the final transaction")),
        }
    }
}

/// Answer one signature request per signer slot this node holds, the first
/// of which has already arrived. Every request must carry the same request
/// and transaction id.
async fn answer_signature_requests(
    node: &Node,
    session: &dyn Session,
    caller: &Identity,
    first: SignatureRequest,
) -> Result<(), TtxError> {
    let n = owned_signer_slots(&first.request, &*node.wallets);
    debug!(tx_id = %first.tx_id, n, "answering signature requests");
    if n == 0 {
        return Err(TtxError::NotMyIdentity(first.signer));
    }
    let (request, tx_id) = (first.request.clone(), first.tx_id.clone());
    let mut pending = Some(first);
    for _ in 0..n {
        let req = match pending.take() {
            Some(req) => req,
            None => match read_message(session, caller, Some(node.config.signature_timeout()))
                .await?
            {
                WireMessage::SignatureRequest(req) => req,
                _ => return Err(TtxError::Protocol("expected a signature request")),
            },
        };
        if req.request != request || req.tx_id != tx_id {
            return Err(TtxError::Protocol("signature request changed mid-session"));
        }
        session.send(sign_request(&*node.wallets, &req)?).await?;
    }
    Ok(())
}

fn sign_request(wallets: &dyn WalletService, req: &SignatureRequest) -> Result<Vec<u8>, TtxError> {
    if !wallets.is_me(&req.signer) {
        return Err(TtxError::NotMyIdentity(req.signer.clone()));
    }
    let signer = wallets
        .signer(&req.signer)
        .ok_or_else(|| TtxError::NotMyIdentity(req.signer.clone()))?;
    Ok(signer.sign(&req.message_to_sign()?)?)
}

/// Validate the endorsed transaction, store it and commit it locally, then
/// acknowledge.
async fn finalize(
    node: &Node,
    session: &dyn Session,
    tx: Transaction,
) -> Result<Transaction, TtxError> {
    let span = info_span!("finalize", tx_id = %tx.id);
    commit_transaction(node, session, tx).instrument(span).await
}

async fn commit_transaction(
    node: &Node,
    session: &dyn Session,
    tx: Transaction,
) -> Result<Transaction, TtxError> {
    let envelope = tx.envelope.as_ref().ok_or_else(|| TtxError::MissingEnvelope {
        tx_id: tx.id.clone(),
    })?;
    if envelope.tx_id != tx.id || compute_tx_id(&tx.nonce, &tx.creator) != tx.id {
        return Err(TtxError::Protocol("transaction id mismatch"));
    }
    verify_request(&tx.request, &node.pp, &tx.id)?;

    // only outputs of this transaction may be created
    let rws = node.vault.get_rwset(&tx.id, &envelope.results)?;
    for (key, value) in rws.writes(&node.config.namespace) {
        let (prefix, components) = keys::split_composite_key(&key).map_err(VaultError::from)?;
        let Some(first) = components.first() else {
            continue;
        };
        let is_output = prefix == TOKEN_KEY_PREFIX
            && !matches!(
                first.as_str(),
                keys::MINE | keys::TOKEN_REQUEST | keys::SERIAL_NUMBER
            );
        if is_output && !value.is_empty() && *first != tx.id {
            return Err(VaultError::ForeignOutput {
                tx_id: tx.id.clone(),
                found: first.clone(),
            }
            .into());
        }
    }

    tx.store_transient(&*node.vault)?;
    node.vault.store_envelope(envelope)?;
    node.vault.commit(&tx.id)?;
    session.send(ACK.to_vec()).await?;
    info!("transaction committed");
    Ok(tx)
}
