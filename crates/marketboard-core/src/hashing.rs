//! Irreversible identity hashing.
//!
//! Uploader, character, retainer and listing identifiers are replaced by the
//! hex SHA-256 of their textual form before anything is stored.

use sha2::{Digest, Sha256};
use std::fmt::Display;

use crate::types::RawId;

/// Hex-encoded SHA-256 of `raw`'s textual form.
pub fn hash_identity(raw: impl Display) -> String {
    hex::encode(Sha256::digest(raw.to_string().as_bytes()))
}

/// Hash an optional raw ID. Absent IDs become an empty token.
pub fn hash_optional(raw: Option<&RawId>) -> String {
    raw.map(hash_identity).unwrap_or_default()
}

/// Short prefix of a token, safe for log lines
pub fn token_prefix(token: &str) -> &str {
    token.get(..12).unwrap_or(token)
}
