use ctoken_primitives::{
    Identity, Token, TokenId, TokenRequest, TokenRequestMetadata, signing_message,
};
use ctoken_verifier::{AuditError, Auditor, verify_signature};
use tracing::debug;

use crate::{
    error::TtxError,
    network::{Session, read_reply, send_message},
    node::Node,
    vault::{StoredToken, keys},
    wire::{AuditRequest, WireMessage},
};

/// Obtain the auditor's signature over the transaction's request, locally if
/// this node is the auditor, otherwise over a session bounded by the audit
/// timeout. The signature is verified before it is returned.
pub(crate) async fn request_audit(
    node: &Node,
    auditor: &Identity,
    request: &TokenRequest,
    metadata: &TokenRequestMetadata,
    tx_id: &str,
) -> Result<Vec<u8>, TtxError> {
    if node.wallets.is_me(auditor) {
        debug!(tx_id, "auditing locally");
        return audit_and_sign(node, request, metadata, tx_id);
    }

    let session = node.transport.session(tx_id, auditor).await?;
    send_message(
        &*session,
        &WireMessage::AuditRequest(AuditRequest {
            request: request.clone(),
            metadata: metadata.clone(),
            tx_id: tx_id.to_string(),
        }),
    )
    .await?;
    let sigma = read_reply(&*session, auditor, Some(node.config.audit_timeout())).await?;

    let verifier = node.wallets.verifier(auditor)?;
    if !verify_signature(&*verifier, &request.marshal_to_sign()?, tx_id, &sigma) {
        return Err(TtxError::InvalidRemoteSignature {
            party: auditor.clone(),
        });
    }
    debug!(tx_id, "auditor signature verified");
    Ok(sigma)
}

/// Auditor side of an audit request.
pub(crate) async fn respond_audit(
    node: &Node,
    session: &dyn Session,
    req: AuditRequest,
) -> Result<(), TtxError> {
    let sigma = audit_and_sign(node, &req.request, &req.metadata, &req.tx_id)?;
    session.send(sigma).await?;
    Ok(())
}

fn audit_and_sign(
    node: &Node,
    request: &TokenRequest,
    metadata: &TokenRequestMetadata,
    tx_id: &str,
) -> Result<Vec<u8>, TtxError> {
    let auditor = node
        .pp
        .auditor
        .as_ref()
        .ok_or(TtxError::Protocol("public parameters name no auditor"))?;
    let signer = node
        .wallets
        .signer(auditor)
        .ok_or_else(|| TtxError::NotMyIdentity(auditor.clone()))?;

    let inputs = request
        .transfers
        .iter()
        .map(|t| {
            t.inputs
                .iter()
                .map(|id| audited_input(node, id))
                .collect::<Result<Vec<_>, _>>()
        })
        .collect::<Result<Vec<Vec<Token>>, TtxError>>()?;
    Auditor::new(&node.pp).check(request, metadata, &inputs, tx_id)?;

    let msg = signing_message(&request.marshal_to_sign()?, tx_id);
    Ok(signer.sign(&msg)?)
}

/// The auditor's own record of a spent token: an audit record, or an owned
/// one when the auditor node held the token itself.
fn audited_input(node: &Node, id: &TokenId) -> Result<Token, TtxError> {
    let ns = &node.config.namespace;
    let raw = [
        keys::audit_token_key(&id.tx_id, id.index),
        keys::owned_token_key(&id.tx_id, id.index),
    ]
    .into_iter()
    .find_map(|key| key.ok().and_then(|k| node.vault.get_state(ns, &k)))
    .ok_or_else(|| AuditError::InputMismatch {
        token_id: id.clone(),
    })?;
    let record: StoredToken = serde_json::from_slice(&raw)?;
    Ok(record.token)
}
