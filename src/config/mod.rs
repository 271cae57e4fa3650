//! Configuration management
//!
//! Environment-fed settings: node address, mining address, node id, network
//! id, keystore password.

pub mod settings;

pub use settings::{Config, GLOBAL_CONFIG};
