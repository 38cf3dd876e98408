//! Initiator side of endorsement: collect every required signature, get the
//! auditor's approval, submit to the ledger and hand the endorsed transaction
//! to every party it concerns.

use ctoken_primitives::{Identity, signing_message};
use ctoken_verifier::{verify_request, verify_signature};
use tracing::{Instrument, debug, info, info_span};

use crate::{
    auditing::request_audit,
    error::TtxError,
    network::{Invocation, SigningCapability, read_reply, send_message},
    node::Node,
    transaction::Transaction,
    wire::{ACK, SignatureRequest, WireMessage},
};

struct DistributionEntry {
    is_me: bool,
    long_term: Identity,
    ids: Vec<Identity>,
}

/// Run the whole initiator protocol on `tx`.
///
/// On success the request carries every signature (and the auditor's), the
/// envelope is set, and every interested party has committed the
/// transaction. On failure nothing is appended to the request.
///
/// # Errors
/// * `TtxError::PartyTimeout` - if a party does not answer in time
/// * `TtxError::InvalidRemoteSignature` - if a returned signature does not verify
/// * `TtxError::Remote` - if a party reports an error
/// * `TtxError::Ledger` - if the ledger rejects the request
pub async fn collect_endorsements(node: &Node, tx: &mut Transaction) -> Result<(), TtxError> {
    let span = info_span!("collect_endorsements", tx_id = %tx.id);
    let result = endorse(node, tx).instrument(span).await;
    node.transport.close(&tx.id);
    result
}

async fn endorse(node: &Node, tx: &mut Transaction) -> Result<(), TtxError> {
    if tx.auditor.is_some() {
        tx.attach_audit_info(&*node.wallets)?;
    }
    tx.store_transient(&*node.vault)?;

    let signatures = collect_signatures(node, tx).await?;
    let auditor_signature = match tx.auditor.clone() {
        Some(auditor) => {
            Some(request_audit(node, &auditor, &tx.request, &tx.metadata, &tx.id).await?)
        }
        None => None,
    };
    for sigma in signatures {
        tx.request.append_signature(sigma);
    }
    if let Some(sigma) = auditor_signature {
        tx.request.append_auditor_signature(sigma);
    }

    call_ledger(node, tx).await?;
    distribute(node, tx).await?;
    info!("transaction endorsed and distributed");
    Ok(())
}

/// One signature per required signer, in signer order. Issuers come first,
/// then transfer senders.
async fn collect_signatures(node: &Node, tx: &Transaction) -> Result<Vec<Vec<u8>>, TtxError> {
    let signers = tx.request.signers();
    debug!(signers = signers.len(), "collecting signatures");
    let raw = tx.request.marshal_to_sign()?;
    let msg = signing_message(&raw, &tx.id);

    let mut signatures = Vec::with_capacity(signers.len());
    for party in signers {
        let sigma = match node.wallets.signing_capability(&party) {
            SigningCapability::Local(signer) => {
                debug!(%party, "signing locally");
                signer.sign(&msg)?
            }
            SigningCapability::Remote(party) => {
                debug!(%party, "requesting signature");
                remote_signature(node, tx, &party, &raw).await?
            }
        };
        signatures.push(sigma);
    }
    Ok(signatures)
}

async fn remote_signature(
    node: &Node,
    tx: &Transaction,
    party: &Identity,
    raw: &[u8],
) -> Result<Vec<u8>, TtxError> {
    let session = node.transport.session(&tx.id, party).await?;
    let request = SignatureRequest {
        request: tx.request.clone(),
        tx_id: tx.id.clone(),
        signer: party.clone(),
    };
    send_message(&*session, &WireMessage::SignatureRequest(request)).await?;
    let sigma = read_reply(&*session, party, Some(node.config.signature_timeout())).await?;

    let verifier = node.wallets.verifier(party)?;
    if !verify_signature(&*verifier, raw, &tx.id, &sigma) {
        return Err(TtxError::InvalidRemoteSignature {
            party: party.clone(),
        });
    }
    debug!(%party, "signature verified");
    Ok(sigma)
}

async fn call_ledger(node: &Node, tx: &mut Transaction) -> Result<(), TtxError> {
    let invocation = Invocation {
        network: tx.network.clone(),
        channel: tx.channel.clone(),
        namespace: tx.namespace.clone(),
        invoker: tx.creator.clone(),
        tx_id: tx.id.clone(),
        function: "invoke".into(),
        request: tx.request.to_bytes()?,
    };
    debug!("invoking the ledger");
    let envelope = node
        .ledger
        .invoke(invocation)
        .await
        .map_err(|source| TtxError::Ledger {
            tx_id: tx.id.clone(),
            source,
        })?;
    if envelope.tx_id != tx.id {
        return Err(TtxError::MissingEnvelope {
            tx_id: tx.id.clone(),
        });
    }
    tx.envelope = Some(envelope);
    Ok(())
}

async fn distribute(node: &Node, tx: &Transaction) -> Result<(), TtxError> {
    let envelope = tx.envelope.as_ref().ok_or_else(|| TtxError::MissingEnvelope {
        tx_id: tx.id.clone(),
    })?;
    verify_request(&tx.request, &node.pp, &tx.id)?;

    let mut parties = tx.parties();
    parties.extend(tx.auditor.iter().cloned());

    let mut entries: Vec<DistributionEntry> = Vec::new();
    for party in parties {
        if party.is_none() {
            // redeemed value
            continue;
        }
        let long_term = node.long_term(&party)?;
        match entries.iter_mut().find(|e| e.long_term == long_term) {
            Some(entry) => {
                if !entry.ids.contains(&party) {
                    entry.ids.push(party);
                }
            }
            None => entries.push(DistributionEntry {
                is_me: long_term == node.me,
                long_term,
                ids: vec![party],
            }),
        }
    }

    for entry in entries {
        if entry.is_me {
            debug!("committing locally");
            node.vault.store_envelope(envelope)?;
            node.vault.commit(&tx.id)?;
            continue;
        }

        let party = &entry.ids[0];
        let is_auditor = tx
            .auditor
            .as_ref()
            .is_some_and(|a| entry.ids.contains(a));
        let view = if is_auditor {
            tx.clone()
        } else {
            tx.filtered_for(&entry.ids)
        };
        debug!(party = %entry.long_term, "distributing transaction");
        let session = node.transport.session(&tx.id, party).await?;
        send_message(&*session, &WireMessage::Transaction(Box::new(view))).await?;
        let ack = read_reply(&*session, party, Some(node.config.distribution_timeout())).await?;
        if ack != ACK {
            return Err(TtxError::Protocol("unexpected acknowledgement"));
        }
    }
    Ok(())
}
