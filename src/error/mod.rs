//! Error handling for the node
//!
//! One crate-wide error enum. Expected consensus outcomes (a block that is
//! already known, a block that loses a fork race) are *not* errors — the
//! chain engine returns `ImportResult` for those. Errors here are the
//! operational failures: storage, crypto, transport, decoding.

use std::fmt;

/// Result type alias for node operations
pub type Result<T> = std::result::Result<T, NodeError>;

/// Error taxonomy for node operations
///
/// `Decode` and `Consensus` stay separate variants: a frame that fails to
/// decode is dropped and logged, while a consensus violation counts against
/// the sending peer.
#[derive(Debug, Clone)]
pub enum NodeError {
    /// Database-related errors
    Database(String),
    /// Cryptographic operation errors
    Crypto(String),
    /// Network communication errors
    Network(String),
    /// Wire frame or payload decoding errors
    Decode(String),
    /// Transaction validation errors
    Transaction(String),
    /// Consensus rule violations
    Consensus(String),
    /// Wallet / keystore operation errors
    Wallet(String),
    /// Configuration errors
    Config(String),
    /// Serialization/deserialization errors
    Serialization(String),
    /// File I/O errors
    Io(String),
    /// Invalid address format
    InvalidAddress(String),
    /// Insufficient balance for a transfer
    InsufficientFunds { required: String, available: String },
    /// Block validation errors
    InvalidBlock(String),
    /// Mining errors (a cancelled search is NOT an error; see `MineResult`)
    Mining(String),
    /// Keystore encryption/decryption errors
    Encryption(String),
}

impl fmt::Display for NodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeError::Database(msg) => write!(f, "Database error: {msg}"),
            NodeError::Crypto(msg) => write!(f, "Cryptographic error: {msg}"),
            NodeError::Network(msg) => write!(f, "Network error: {msg}"),
            NodeError::Decode(msg) => write!(f, "Decode error: {msg}"),
            NodeError::Transaction(msg) => write!(f, "Transaction error: {msg}"),
            NodeError::Consensus(msg) => write!(f, "Consensus error: {msg}"),
            NodeError::Wallet(msg) => write!(f, "Wallet error: {msg}"),
            NodeError::Config(msg) => write!(f, "Configuration error: {msg}"),
            NodeError::Serialization(msg) => write!(f, "Serialization error: {msg}"),
            NodeError::Io(msg) => write!(f, "I/O error: {msg}"),
            NodeError::InvalidAddress(addr) => write!(f, "Invalid address: {addr}"),
            NodeError::InsufficientFunds {
                required,
                available,
            } => {
                write!(
                    f,
                    "Insufficient funds: required {required}, available {available}"
                )
            }
            NodeError::InvalidBlock(msg) => write!(f, "Invalid block: {msg}"),
            NodeError::Mining(msg) => write!(f, "Mining error: {msg}"),
            NodeError::Encryption(msg) => write!(f, "Encryption error: {msg}"),
        }
    }
}

impl std::error::Error for NodeError {}

impl From<std::io::Error> for NodeError {
    fn from(err: std::io::Error) -> Self {
        NodeError::Io(err.to_string())
    }
}

impl From<sled::Error> for NodeError {
    fn from(err: sled::Error) -> Self {
        NodeError::Database(err.to_string())
    }
}

impl From<bincode::error::EncodeError> for NodeError {
    fn from(err: bincode::error::EncodeError) -> Self {
        NodeError::Serialization(err.to_string())
    }
}

impl From<bincode::error::DecodeError> for NodeError {
    fn from(err: bincode::error::DecodeError) -> Self {
        NodeError::Serialization(err.to_string())
    }
}
