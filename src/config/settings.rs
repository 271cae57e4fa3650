use once_cell::sync::Lazy;
use std::env;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

pub static GLOBAL_CONFIG: Lazy<Config> = Lazy::new(Config::from_env);

const DEFAULT_NODE_ADDR: &str = "127.0.0.1:2001";
const DEFAULT_NETWORK_ID: u32 = 1;
const DEFAULT_KEYSTORE_PASSWORD: &str = "development-only-password";

/// Typed runtime settings, seeded from the environment once at startup.
/// Only the mining address changes afterwards (the CLI's `--mine` flag).
#[derive(Clone)]
struct Settings {
    node_addr: String,
    mining_addr: Option<String>,
    node_id: Option<String>,
    network_id: u32,
    keystore_password: String,
}

pub struct Config {
    settings: RwLock<Settings>,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

impl Config {
    pub fn from_env() -> Config {
        let network_id = env::var("NETWORK_ID")
            .ok()
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(DEFAULT_NETWORK_ID);

        Config {
            settings: RwLock::new(Settings {
                node_addr: env::var("NODE_ADDRESS")
                    .unwrap_or_else(|_| DEFAULT_NODE_ADDR.to_string()),
                mining_addr: env::var("MINING_ADDRESS").ok(),
                node_id: env::var("NODE_ID").ok(),
                network_id,
                keystore_password: env::var("KEYSTORE_PASSWORD")
                    .unwrap_or_else(|_| DEFAULT_KEYSTORE_PASSWORD.to_string()),
            }),
        }
    }

    // Settings are plain data; a panic elsewhere cannot leave them half
    // written, so a poisoned lock is recovered instead of propagated.
    fn read(&self) -> RwLockReadGuard<'_, Settings> {
        self.settings
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Settings> {
        self.settings
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn node_addr(&self) -> String {
        self.read().node_addr.clone()
    }

    pub fn mining_addr(&self) -> Option<String> {
        self.read().mining_addr.clone()
    }

    pub fn set_mining_addr(&self, addr: String) {
        self.write().mining_addr = Some(addr);
    }

    pub fn node_id(&self) -> Option<String> {
        self.read().node_id.clone()
    }

    pub fn network_id(&self) -> u32 {
        self.read().network_id
    }

    pub fn keystore_password(&self) -> String {
        self.read().keystore_password.clone()
    }

    /// Node id fallback derived from the listen port, so `127.0.0.1:2001`
    /// gets its data under `data/node_2001/` without further setup.
    pub fn node_id_from_addr(&self) -> String {
        let addr = self.node_addr();
        match addr.rsplit_once(':') {
            Some((_, port)) if !port.is_empty() => port.to_string(),
            _ => String::from("default"),
        }
    }
}
