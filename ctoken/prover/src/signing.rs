use std::sync::Arc;

use ctoken_primitives::{Signer, SigningError, signing_message};

/// Sign `raw_action || tx_id` with every signer, in order.
///
/// `signature[i]` authorizes slot `i`. If any signer fails the whole call
/// fails and no partial list is returned.
///
/// # Errors
/// * the first `SigningError` returned by a signer
pub fn sign_action(
    raw_action: &[u8],
    signers: &[Arc<dyn Signer>],
    tx_id: &str,
) -> Result<Vec<Vec<u8>>, SigningError> {
    let msg = signing_message(raw_action, tx_id);
    signers.iter().map(|s| s.sign(&msg)).collect()
}
