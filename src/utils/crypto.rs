//! Digest and signature primitives
//!
//! Everything consensus-sensitive hashes with SHA-256 (double-SHA256 for
//! header proof-of-work), addresses come from ripemd160 over a SHA-256 of
//! the public key, and transactions are signed with ECDSA P-256.

use ring::digest;
use ring::rand::SystemRandom;
use ring::signature::{
    EcdsaKeyPair, KeyPair, UnparsedPublicKey, ECDSA_P256_SHA256_FIXED,
    ECDSA_P256_SHA256_FIXED_SIGNING,
};
use ripemd::{Digest as _, Ripemd160};

use crate::error::{NodeError, Result};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

fn unix_time() -> Result<Duration> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| NodeError::Crypto(format!("System clock is before the Unix epoch: {e}")))
}

pub fn current_timestamp_millis() -> Result<i64> {
    i64::try_from(unix_time()?.as_millis())
        .map_err(|_| NodeError::Crypto("Timestamp overflow".to_string()))
}

/// Unix time in whole seconds, as carried in block headers.
pub fn current_timestamp_secs() -> Result<u32> {
    u32::try_from(unix_time()?.as_secs())
        .map_err(|_| NodeError::Crypto("Timestamp overflow".to_string()))
}

pub fn sha256_digest(data: &[u8]) -> Vec<u8> {
    digest::digest(&digest::SHA256, data).as_ref().to_vec()
}

/// SHA256(SHA256(data)) — the header proof-of-work hash.
pub fn double_sha256_digest(data: &[u8]) -> Vec<u8> {
    let inner = digest::digest(&digest::SHA256, data);
    digest::digest(&digest::SHA256, inner.as_ref())
        .as_ref()
        .to_vec()
}

pub fn ripemd160_digest(data: &[u8]) -> Vec<u8> {
    Ripemd160::digest(data).to_vec()
}

pub fn base58_encode(data: &[u8]) -> String {
    bs58::encode(data).into_string()
}

pub fn base58_decode(data: &str) -> Result<Vec<u8>> {
    bs58::decode(data)
        .into_vec()
        .map_err(|e| NodeError::InvalidAddress(format!("Invalid base58 encoding: {e}")))
}

fn signing_key_pair(pkcs8: &[u8], rng: &SystemRandom) -> Result<EcdsaKeyPair> {
    EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, pkcs8, rng)
        .map_err(|e| NodeError::Crypto(format!("Bad PKCS#8 key document: {e}")))
}

/// Generate a fresh P-256 key pair, returned as its PKCS#8 document.
pub fn new_key_pair() -> Result<Vec<u8>> {
    let rng = SystemRandom::new();
    let document = EcdsaKeyPair::generate_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, &rng)
        .map_err(|e| NodeError::Crypto(format!("Key generation failed: {e}")))?;
    Ok(document.as_ref().to_vec())
}

/// The public half of a stored PKCS#8 document.
pub fn public_key_from_pkcs8(pkcs8: &[u8]) -> Result<Vec<u8>> {
    let rng = SystemRandom::new();
    let key_pair = signing_key_pair(pkcs8, &rng)?;
    Ok(key_pair.public_key().as_ref().to_vec())
}

pub fn ecdsa_p256_sha256_sign_digest(pkcs8: &[u8], message: &[u8]) -> Result<Vec<u8>> {
    let rng = SystemRandom::new();
    let signature = signing_key_pair(pkcs8, &rng)?
        .sign(&rng, message)
        .map_err(|e| NodeError::Crypto(format!("Signing failed: {e}")))?;
    Ok(signature.as_ref().to_vec())
}

pub fn ecdsa_p256_sha256_sign_verify(public_key: &[u8], signature: &[u8], message: &[u8]) -> bool {
    UnparsedPublicKey::new(&ECDSA_P256_SHA256_FIXED, public_key)
        .verify(message, signature)
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_double_sha256_differs_from_single() {
        let data = b"emberchain";
        let single = sha256_digest(data);
        let double = double_sha256_digest(data);
        assert_eq!(single.len(), 32);
        assert_eq!(double.len(), 32);
        assert_ne!(single, double);
        assert_eq!(double, sha256_digest(&single));
    }

    #[test]
    fn test_sign_and_verify() {
        let pkcs8 = new_key_pair().unwrap();
        let public_key = public_key_from_pkcs8(&pkcs8).unwrap();

        let message = b"transfer 100 to receiver";
        let signature = ecdsa_p256_sha256_sign_digest(&pkcs8, message).unwrap();
        assert!(ecdsa_p256_sha256_sign_verify(
            &public_key,
            &signature,
            message
        ));
        assert!(!ecdsa_p256_sha256_sign_verify(
            &public_key,
            &signature,
            b"a different message"
        ));
    }

    #[test]
    fn test_public_key_is_stable_across_reloads() {
        let pkcs8 = new_key_pair().unwrap();
        let first = public_key_from_pkcs8(&pkcs8).unwrap();
        let second = public_key_from_pkcs8(&pkcs8).unwrap();
        assert_eq!(first, second);
    }
}
