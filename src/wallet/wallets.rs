use crate::error::{NodeError, Result};
use crate::storage::Keystore;
use crate::wallet::Wallet;
use std::collections::HashMap;

/// Wallet collection loaded from the encrypted keystore. Keys are sealed in
/// the repository's `keys` tree; only the decrypted pkcs8 documents live in
/// memory here.
pub struct Wallets {
    keystore: Keystore,
    wallets: HashMap<String, Wallet>,
}

impl Wallets {
    pub fn load(keystore: Keystore) -> Result<Wallets> {
        let mut wallets = HashMap::new();
        for pkcs8 in keystore.load_all()? {
            let wallet = Wallet::from_pkcs8(pkcs8)?;
            wallets.insert(wallet.get_address(), wallet);
        }

        log::info!("Loaded {} wallet(s) from keystore", wallets.len());
        Ok(Wallets { keystore, wallets })
    }

    pub fn create_wallet(&mut self) -> Result<String> {
        let wallet = Wallet::new()?;
        let address = wallet.get_address();

        self.keystore.store_key(wallet.get_pkcs8())?;
        self.wallets.insert(address.clone(), wallet);
        Ok(address)
    }

    pub fn get_wallet(&self, address: &str) -> Option<&Wallet> {
        self.wallets.get(address)
    }

    pub fn require_wallet(&self, address: &str) -> Result<&Wallet> {
        self.get_wallet(address)
            .ok_or_else(|| NodeError::Wallet(format!("No wallet for address {address}")))
    }

    pub fn get_addresses(&self) -> Vec<String> {
        self.wallets.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.wallets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wallets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Repository;
    use tempfile::tempdir;

    #[test]
    fn test_create_and_reload() {
        let dir = tempdir().unwrap();
        let repo = Repository::open(dir.path().to_str().unwrap()).unwrap();

        let address = {
            let keystore = Keystore::open(repo.clone(), "correct horse battery").unwrap();
            let mut wallets = Wallets::load(keystore).unwrap();
            assert!(wallets.is_empty());
            wallets.create_wallet().unwrap()
        };

        let keystore = Keystore::open(repo, "correct horse battery").unwrap();
        let wallets = Wallets::load(keystore).unwrap();
        assert_eq!(wallets.len(), 1);
        assert!(wallets.get_wallet(&address).is_some());
    }
}
