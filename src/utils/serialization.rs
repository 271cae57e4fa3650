//! Canonical byte encoding
//!
//! Every stored record and wire payload goes through these two functions
//! with one fixed configuration, because transaction and block identities
//! are hashes of this byte layout. The block header's version field tracks
//! the generation of the layout; changing anything here is a consensus
//! change and needs that version bumped.

use crate::error::{NodeError, Result};
use bincode::config::Configuration;
use serde::{Deserialize, Serialize};

/// The one configuration used crate-wide. Never vary this per call site.
const CANONICAL: Configuration = bincode::config::standard();

pub fn serialize<T: Serialize + bincode::Encode>(value: &T) -> Result<Vec<u8>> {
    Ok(bincode::encode_to_vec(value, CANONICAL)?)
}

/// Decode a canonical byte string. The entire input must be consumed: if
/// two different byte strings could decode to the same value, identity
/// hashes over the encoding would stop being identities.
pub fn deserialize<T>(bytes: &[u8]) -> Result<T>
where
    T: for<'de> Deserialize<'de> + bincode::Decode<()>,
{
    let (value, consumed) = bincode::decode_from_slice(bytes, CANONICAL)?;
    if consumed != bytes.len() {
        return Err(NodeError::Serialization(format!(
            "Canonical decode left {} trailing byte(s)",
            bytes.len() - consumed
        )));
    }
    Ok(value)
}
