use crate::error::{NodeError, Result};
use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Key, Nonce,
};
use serde::{Deserialize, Serialize};
use zeroize::ZeroizeOnDrop;

/// Result of encryption operation
#[derive(Debug, Clone, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct EncryptionResult {
    /// Encrypted data
    pub ciphertext: Vec<u8>,
    /// Nonce used for encryption
    pub nonce: Vec<u8>,
}

/// Secure key wrapper that automatically zeros memory on drop
#[derive(Clone, ZeroizeOnDrop)]
pub struct SecureKey {
    key: Vec<u8>,
}

impl SecureKey {
    pub fn new(key: Vec<u8>) -> Self {
        Self { key }
    }

    /// Get key bytes (use carefully)
    pub fn as_bytes(&self) -> &[u8] {
        &self.key
    }

    pub fn len(&self) -> usize {
        self.key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.key.is_empty()
    }
}

impl std::fmt::Debug for SecureKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecureKey")
            .field("length", &self.key.len())
            .finish()
    }
}

/// Generate cryptographically secure random bytes
pub fn generate_random_bytes(length: usize) -> Result<Vec<u8>> {
    use rand::RngCore;
    let mut rng = rand::thread_rng();
    let mut bytes = vec![0u8; length];
    rng.fill_bytes(&mut bytes);
    Ok(bytes)
}

/// AES-256-GCM cipher for sealing private keys at rest
pub struct Aes256GcmCipher {
    cipher: Aes256Gcm,
}

impl Aes256GcmCipher {
    pub fn new(key: SecureKey) -> Result<Self> {
        if key.len() != 32 {
            return Err(NodeError::Encryption(
                "AES-256-GCM requires a 32-byte key".to_string(),
            ));
        }

        let aes_key = Key::<Aes256Gcm>::from_slice(key.as_bytes());
        let cipher = Aes256Gcm::new(aes_key);

        Ok(Self { cipher })
    }

    /// Encrypt data with a random nonce
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<EncryptionResult> {
        let nonce_bytes = generate_random_bytes(12)?;
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext)
            .map_err(|e| NodeError::Encryption(format!("AES-256-GCM encryption failed: {e}")))?;

        Ok(EncryptionResult {
            ciphertext,
            nonce: nonce_bytes,
        })
    }

    pub fn decrypt(&self, ciphertext: &[u8], nonce_bytes: &[u8]) -> Result<Vec<u8>> {
        if nonce_bytes.len() != 12 {
            return Err(NodeError::Encryption(
                "AES-256-GCM requires a 12-byte nonce".to_string(),
            ));
        }

        let nonce = Nonce::from_slice(nonce_bytes);
        self.cipher
            .decrypt(nonce, ciphertext)
            .map_err(|e| NodeError::Encryption(format!("AES-256-GCM decryption failed: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypt_decrypt_round_trip() {
        let key = SecureKey::new(generate_random_bytes(32).unwrap());
        let cipher = Aes256GcmCipher::new(key).unwrap();

        let plaintext = b"pkcs8 private key material";
        let sealed = cipher.encrypt(plaintext).unwrap();
        let opened = cipher.decrypt(&sealed.ciphertext, &sealed.nonce).unwrap();
        assert_eq!(opened, plaintext);
    }

    #[test]
    fn test_wrong_key_fails() {
        let cipher = Aes256GcmCipher::new(SecureKey::new(generate_random_bytes(32).unwrap()))
            .unwrap();
        let other = Aes256GcmCipher::new(SecureKey::new(generate_random_bytes(32).unwrap()))
            .unwrap();

        let sealed = cipher.encrypt(b"secret").unwrap();
        assert!(other.decrypt(&sealed.ciphertext, &sealed.nonce).is_err());
    }

    #[test]
    fn test_rejects_short_key() {
        assert!(Aes256GcmCipher::new(SecureKey::new(vec![0u8; 16])).is_err());
    }

    #[test]
    fn test_generate_random_bytes() {
        let a = generate_random_bytes(32).unwrap();
        let b = generate_random_bytes(32).unwrap();
        assert_eq!(a.len(), 32);
        assert_ne!(a, b);
    }
}
