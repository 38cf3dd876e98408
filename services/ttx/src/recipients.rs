//! Recipient identities: before a transfer, the sender asks the recipient's
//! node for a fresh pseudonym to own the new tokens, or both sides swap one.

use ctoken_primitives::Identity;
use tracing::{Instrument, debug, info_span};

use crate::{
    error::TtxError,
    network::{Session, request_reply},
    node::Node,
    wire::{ExchangeRecipientRequest, RecipientData, RecipientRequest, WireMessage},
};

/// Session context of one identity request, unique per instance.
fn fresh_context(kind: &str) -> String {
    format!("{kind}:{:032x}", rand::random::<u128>())
}

/// Fresh pseudonym of `wallet` with what the auditor and the token layer
/// need to know about it.
fn recipient_data(node: &Node, wallet: Option<&str>) -> Result<RecipientData, TtxError> {
    let identity = node.wallets.recipient_identity(wallet)?;
    Ok(RecipientData {
        audit_info: node.wallets.audit_info(&identity)?,
        metadata: node.wallets.token_metadata(&identity)?,
        identity,
    })
}

/// Identity `party`'s node wants to receive tokens with.
///
/// A party of this node gets a fresh local pseudonym. Otherwise the remote
/// node is asked (bounded by the recipient timeout), and its answer is
/// registered and bound to `party` in the endpoint resolver.
pub async fn request_recipient_identity(
    node: &Node,
    party: &Identity,
) -> Result<Identity, TtxError> {
    let span = info_span!("request_recipient_identity", %party);
    async move {
        if node.long_term(party)? == node.me {
            return Ok(node.wallets.recipient_identity(None)?);
        }

        let context = fresh_context("recipient");
        let session = node.transport.session(&context, party).await?;
        let request = WireMessage::RecipientRequest(RecipientRequest {
            channel: node.config.channel.clone(),
            wallet_id: None,
        });
        let reply = request_reply(
            &*session,
            &request,
            party,
            Some(node.config.recipient_timeout()),
        )
        .await;
        node.transport.close(&context);
        let data: RecipientData = serde_json::from_slice(&reply?)?;

        node.wallets.register_recipient_identity(&data)?;
        node.resolver.bind(&node.long_term(party)?, &data.identity);
        debug!(recipient = %data.identity, "recipient identity registered");
        Ok(data.identity)
    }
    .instrument(span)
    .await
}

pub(crate) async fn respond_request_recipient_identity(
    node: &Node,
    session: &dyn Session,
    req: RecipientRequest,
) -> Result<Identity, TtxError> {
    let data = recipient_data(node, req.wallet_id.as_deref())?;
    session.send(serde_json::to_vec(&data)?).await?;
    node.resolver.bind(&node.me, &data.identity);
    Ok(data.identity)
}

/// Swap fresh recipient identities with `party`: `(mine, theirs)`.
///
/// The remote side has the exchange timeout to answer. Both identities end up
/// bound to their nodes in the endpoint resolver.
pub async fn exchange_recipient_identities(
    node: &Node,
    wallet: Option<&str>,
    party: &Identity,
) -> Result<(Identity, Identity), TtxError> {
    let span = info_span!("exchange_recipient_identities", %party);
    async move {
        let mine = recipient_data(node, wallet)?;
        if node.long_term(party)? == node.me {
            let theirs = node.wallets.recipient_identity(None)?;
            return Ok((mine.identity, theirs));
        }

        let context = fresh_context("exchange");
        let session = node.transport.session(&context, party).await?;
        let request = WireMessage::ExchangeRecipientRequest(ExchangeRecipientRequest {
            channel: node.config.channel.clone(),
            wallet_id: None,
            recipient_data: mine.clone(),
        });
        let reply = request_reply(
            &*session,
            &request,
            party,
            Some(node.config.exchange_timeout()),
        )
        .await;
        node.transport.close(&context);
        let theirs: RecipientData = serde_json::from_slice(&reply?)?;

        node.wallets.register_recipient_identity(&theirs)?;
        node.resolver.bind(&node.long_term(party)?, &theirs.identity);
        node.resolver.bind(&node.me, &mine.identity);
        Ok((mine.identity, theirs.identity))
    }
    .instrument(span)
    .await
}

pub(crate) async fn respond_exchange_recipient_identities(
    node: &Node,
    session: &dyn Session,
    req: ExchangeRecipientRequest,
) -> Result<(Identity, Identity), TtxError> {
    let theirs = req.recipient_data;
    node.wallets.register_recipient_identity(&theirs)?;
    node.resolver.bind(&session.info().caller, &theirs.identity);

    let mine = recipient_data(node, req.wallet_id.as_deref())?;
    session.send(serde_json::to_vec(&mine)?).await?;
    node.resolver.bind(&node.me, &mine.identity);
    Ok((mine.identity, theirs.identity))
}
