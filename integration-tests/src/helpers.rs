//! Helper functions for integration tests
//!
//! Thin wrappers that build a transaction on one node, endorse it through
//! the full protocol and return it.

use anyhow::{Result, bail};
use ctoken_primitives::Identity;
use ctoken_ttx::{
    Transaction, collect_endorsements,
    network::{Invocation, Ledger},
    vault::{self, StoredToken, Vault},
};

use crate::network::TestNode;

fn new_transaction(node: &TestNode) -> Transaction {
    Transaction::new(
        &node.node.config,
        node.node.me.clone(),
        node.node.pp.auditor.clone(),
        &mut rand::rng(),
    )
}

/// Publish the public parameters on the ledger and commit the setup
/// transaction on `node`.
pub async fn publish_parameters(node: &TestNode) -> Result<String> {
    let tx_id = format!("setup-{}", node.name);
    let envelope = node
        .node
        .ledger
        .invoke(Invocation {
            network: node.node.config.network.clone(),
            channel: node.node.config.channel.clone(),
            namespace: node.node.config.namespace.clone(),
            invoker: node.node.me.clone(),
            tx_id: tx_id.clone(),
            function: "setup".into(),
            request: Vec::new(),
        })
        .await?;
    node.node.vault.store_envelope(&envelope)?;
    node.node.vault.commit(&tx_id)?;
    Ok(tx_id)
}

/// Issue `values` of `token_type` from `issuer` (held by `node`) to `owners`.
pub async fn issue(
    node: &TestNode,
    issuer: &Identity,
    token_type: &str,
    values: &[u64],
    owners: &[Identity],
) -> Result<Transaction> {
    let mut tx = new_transaction(node);
    tx.issue(
        &node.node.pp,
        issuer,
        token_type,
        values,
        owners,
        &mut rand::rng(),
    )?;
    collect_endorsements(&node.node, &mut tx).await?;
    Ok(tx)
}

/// Unspent tokens of `node` covering at least `amount`, oldest first.
pub fn select_inputs(node: &TestNode, token_type: &str, amount: u128) -> Result<Vec<StoredToken>> {
    let mut selected = Vec::new();
    let mut total = 0u128;
    for token in owned(node, Some(token_type))? {
        if total >= amount {
            break;
        }
        total += token.value() as u128;
        selected.push(token);
    }
    if total < amount {
        bail!("{} holds {total} {token_type}, needs {amount}", node.name);
    }
    Ok(selected)
}

/// Transfer `values` to `owners` out of the tokens of `node`. Any change goes
/// to a fresh pseudonym of `node`.
pub async fn transfer(
    node: &TestNode,
    token_type: &str,
    values: &[u64],
    owners: &[Identity],
) -> Result<Transaction> {
    let amount: u128 = values.iter().map(|v| *v as u128).sum();
    let inputs = select_inputs(node, token_type, amount)?;
    transfer_inputs(node, &inputs, values, owners).await
}

/// Transfer spending exactly `inputs`.
pub async fn transfer_inputs(
    node: &TestNode,
    inputs: &[StoredToken],
    values: &[u64],
    owners: &[Identity],
) -> Result<Transaction> {
    let total: u128 = inputs.iter().map(|t| t.value() as u128).sum();
    let amount: u128 = values.iter().map(|v| *v as u128).sum();
    let (mut values, mut owners) = (values.to_vec(), owners.to_vec());
    if total > amount {
        values.push(u64::try_from(total - amount)?);
        owners.push(node.wallets.new_pseudonym());
    }

    let mut tx = new_transaction(node);
    tx.transfer(&node.node.pp, inputs, &values, &owners, &mut rand::rng())?;
    collect_endorsements(&node.node, &mut tx).await?;
    Ok(tx)
}

/// Redeem `value` of `token_type` held by `node`.
pub async fn redeem(node: &TestNode, token_type: &str, value: u64) -> Result<Transaction> {
    let inputs = select_inputs(node, token_type, value as u128)?;
    let change_owner = node.wallets.new_pseudonym();
    let mut tx = new_transaction(node);
    tx.redeem(&node.node.pp, &inputs, value, &change_owner, &mut rand::rng())?;
    collect_endorsements(&node.node, &mut tx).await?;
    Ok(tx)
}

pub fn owned(node: &TestNode, token_type: Option<&str>) -> Result<Vec<StoredToken>> {
    let ns = &node.node.config.namespace;
    Ok(vault::owned_tokens(&*node.node.vault, ns, token_type)?)
}

pub fn balance(node: &TestNode, token_type: &str) -> Result<u128> {
    let ns = &node.node.config.namespace;
    Ok(vault::balance(&*node.node.vault, ns, token_type)?)
}
