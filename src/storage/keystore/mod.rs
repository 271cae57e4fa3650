//! Encrypted keystore
//!
//! Private keys live in the repository's `keys` tree, one AES-256-GCM sealed
//! blob per index. Each blob carries its own salt; the sealing key is derived
//! from the password with Argon2id per blob, so individual entries can be
//! opened without a keystore-wide master record.

pub mod cipher;

pub use cipher::{generate_random_bytes, Aes256GcmCipher, EncryptionResult, SecureKey};

use crate::error::{NodeError, Result};
use crate::storage::Repository;
use crate::utils::{deserialize, serialize};
use serde::{Deserialize, Serialize};

const MIN_PASSWORD_LENGTH: usize = 8;
const SALT_LENGTH: usize = 32;

/// One sealed key entry as persisted in the `keys` tree.
#[derive(Debug, Clone, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
struct SealedKey {
    ciphertext: Vec<u8>,
    nonce: Vec<u8>,
    salt: Vec<u8>,
}

pub struct Keystore {
    repo: Repository,
    password: String,
}

impl Keystore {
    pub fn open(repo: Repository, password: &str) -> Result<Keystore> {
        if password.len() < MIN_PASSWORD_LENGTH {
            return Err(NodeError::Encryption(format!(
                "Password must be at least {MIN_PASSWORD_LENGTH} characters long"
            )));
        }
        Ok(Keystore {
            repo,
            password: password.to_string(),
        })
    }

    fn derive_key(&self, salt: &[u8]) -> Result<SecureKey> {
        use argon2::{Algorithm, Argon2, Params, Version};

        let params = Params::new(65536, 3, 1, Some(32))
            .map_err(|e| NodeError::Encryption(format!("Invalid Argon2 parameters: {e}")))?;
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

        let mut key = vec![0u8; 32];
        argon2
            .hash_password_into(self.password.as_bytes(), salt, &mut key)
            .map_err(|e| NodeError::Encryption(format!("Key derivation failed: {e}")))?;

        Ok(SecureKey::new(key))
    }

    /// Seal a private key under the next free index; returns that index.
    pub fn store_key(&self, key_material: &[u8]) -> Result<u32> {
        let index = self.repo.key_blob_count()?;

        let salt = generate_random_bytes(SALT_LENGTH)?;
        let cipher = Aes256GcmCipher::new(self.derive_key(&salt)?)?;
        let sealed = cipher.encrypt(key_material)?;

        let entry = SealedKey {
            ciphertext: sealed.ciphertext,
            nonce: sealed.nonce,
            salt,
        };
        self.repo.put_key_blob(index, serialize(&entry)?.as_slice())?;

        log::info!("Stored encrypted key at index {index}");
        Ok(index)
    }

    pub fn load_key(&self, index: u32) -> Result<Vec<u8>> {
        let blob = self
            .repo
            .key_blob(index)?
            .ok_or_else(|| NodeError::Wallet(format!("No key stored at index {index}")))?;
        let entry: SealedKey = deserialize(&blob)?;

        let cipher = Aes256GcmCipher::new(self.derive_key(&entry.salt)?)?;
        cipher.decrypt(&entry.ciphertext, &entry.nonce)
    }

    /// Open every stored key in index order.
    pub fn load_all(&self) -> Result<Vec<Vec<u8>>> {
        let count = self.repo.key_blob_count()?;
        let mut keys = Vec::with_capacity(count as usize);
        for index in 0..count {
            keys.push(self.load_key(index)?);
        }
        Ok(keys)
    }

    pub fn key_count(&self) -> Result<u32> {
        self.repo.key_blob_count()
    }
}
