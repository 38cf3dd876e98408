//! Composite keys of the token namespace.
//!
//! A key is `"\0" || prefix || "\0" || (component || "\0")*`, the layout a
//! Fabric ledger uses, so keys sort by prefix first and split back without
//! ambiguity.

use thiserror::Error;

const NS: char = '\u{0}';
const MAX_UNICODE: char = '\u{10FFFF}';

/// Prefix of every key the ledger writes for tokens.
pub const TOKEN_KEY_PREFIX: &str = "ztoken";
pub const MINE: &str = "mine";
pub const TOKEN_REQUEST: &str = "token_request";
pub const SERIAL_NUMBER: &str = "sn";
pub const SETUP: &str = "setup";
pub const PARAMS: &str = "params";

/// Local records written by reconciliation.
pub const OWNED_TOKEN_PREFIX: &str = "ftoken";
pub const AUDIT_TOKEN_PREFIX: &str = "audittoken";
pub const ISSUED_TOKEN_PREFIX: &str = "issuedtoken";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    #[error("key component {0:?} contains a reserved character")]
    InvalidComponent(String),
    #[error("{0:?} is not a composite key")]
    NotComposite(String),
}

fn validate(component: &str) -> Result<(), KeyError> {
    if component.contains([NS, MAX_UNICODE]) {
        return Err(KeyError::InvalidComponent(component.to_string()));
    }
    Ok(())
}

pub fn create_composite_key(prefix: &str, components: &[&str]) -> Result<String, KeyError> {
    validate(prefix)?;
    let mut key = String::with_capacity(2 + prefix.len());
    key.push(NS);
    key.push_str(prefix);
    key.push(NS);
    for c in components {
        validate(c)?;
        key.push_str(c);
        key.push(NS);
    }
    Ok(key)
}

pub fn split_composite_key(key: &str) -> Result<(String, Vec<String>), KeyError> {
    let body = key
        .strip_prefix(NS)
        .and_then(|k| k.strip_suffix(NS))
        .ok_or_else(|| KeyError::NotComposite(key.to_string()))?;
    let mut parts = body.split(NS).map(str::to_string);
    let prefix = parts
        .next()
        .ok_or_else(|| KeyError::NotComposite(key.to_string()))?;
    Ok((prefix, parts.collect()))
}

/// Start of every key under `prefix`, for range scans.
pub fn prefix_range(prefix: &str) -> Result<String, KeyError> {
    create_composite_key(prefix, &[])
}

pub fn token_key(tx_id: &str, index: u64) -> Result<String, KeyError> {
    create_composite_key(TOKEN_KEY_PREFIX, &[tx_id, &index.to_string()])
}

pub fn mine_key(tx_id: &str, index: u64) -> Result<String, KeyError> {
    create_composite_key(TOKEN_KEY_PREFIX, &[MINE, tx_id, &index.to_string()])
}

pub fn token_request_key(tx_id: &str) -> Result<String, KeyError> {
    create_composite_key(TOKEN_KEY_PREFIX, &[TOKEN_REQUEST, tx_id])
}

/// Spent marker under graph hiding: a hash of the token id, so the ledger
/// never names the spent output.
pub fn serial_number_key(serial: &str) -> Result<String, KeyError> {
    create_composite_key(TOKEN_KEY_PREFIX, &[SERIAL_NUMBER, serial])
}

pub fn setup_key() -> Result<String, KeyError> {
    create_composite_key(TOKEN_KEY_PREFIX, &[SETUP])
}

pub fn params_key() -> Result<String, KeyError> {
    create_composite_key(TOKEN_KEY_PREFIX, &[PARAMS])
}

pub fn owned_token_key(tx_id: &str, index: u64) -> Result<String, KeyError> {
    create_composite_key(OWNED_TOKEN_PREFIX, &[tx_id, &index.to_string()])
}

pub fn audit_token_key(tx_id: &str, index: u64) -> Result<String, KeyError> {
    create_composite_key(AUDIT_TOKEN_PREFIX, &[tx_id, &index.to_string()])
}

pub fn issued_token_key(tx_id: &str, index: u64) -> Result<String, KeyError> {
    create_composite_key(ISSUED_TOKEN_PREFIX, &[tx_id, &index.to_string()])
}
