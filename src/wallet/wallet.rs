use crate::core::ADDRESS_LEN;
use crate::error::{NodeError, Result};
use serde::{Deserialize, Serialize};

const VERSION: u8 = 0x00;
pub const ADDRESS_CHECK_SUM_LEN: usize = 4;

#[derive(Clone, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct Wallet {
    pkcs8: Vec<u8>,
    public_key: Vec<u8>,
}

impl Wallet {
    pub fn new() -> Result<Wallet> {
        let pkcs8 = crate::utils::new_key_pair()?;
        Self::from_pkcs8(pkcs8)
    }

    pub fn from_pkcs8(pkcs8: Vec<u8>) -> Result<Wallet> {
        let public_key = crate::utils::public_key_from_pkcs8(&pkcs8)?;
        Ok(Wallet { pkcs8, public_key })
    }

    /// Raw 20-byte account address: ripemd160(sha256(public_key)). This is
    /// the form carried inside transactions and headers.
    pub fn address_bytes(&self) -> Vec<u8> {
        hash_pub_key(self.public_key.as_slice())
    }

    /// Display address: base58(version || key-hash || checksum)
    pub fn get_address(&self) -> String {
        convert_address(self.address_bytes().as_slice())
    }

    pub fn get_public_key(&self) -> &[u8] {
        self.public_key.as_slice()
    }

    pub fn get_pkcs8(&self) -> &[u8] {
        self.pkcs8.as_slice()
    }
}

pub fn hash_pub_key(pub_key: &[u8]) -> Vec<u8> {
    let pub_key_sha256 = crate::utils::sha256_digest(pub_key);
    crate::utils::ripemd160_digest(pub_key_sha256.as_slice())
}

fn checksum(payload: &[u8]) -> Vec<u8> {
    let first_sha = crate::utils::sha256_digest(payload);
    let second_sha = crate::utils::sha256_digest(first_sha.as_slice());
    second_sha[0..ADDRESS_CHECK_SUM_LEN].to_vec()
}

pub fn validate_address(address: &str) -> bool {
    let payload = match crate::utils::base58_decode(address) {
        Ok(payload) => payload,
        Err(_) => return false,
    };

    if payload.len() != 1 + ADDRESS_LEN + ADDRESS_CHECK_SUM_LEN {
        return false;
    }

    let actual_checksum = payload[payload.len() - ADDRESS_CHECK_SUM_LEN..].to_vec();
    let version = payload[0];
    let pub_key_hash = payload[1..payload.len() - ADDRESS_CHECK_SUM_LEN].to_vec();

    let mut target_vec = vec![];
    target_vec.push(version);
    target_vec.extend(pub_key_hash);
    let target_checksum = checksum(target_vec.as_slice());
    actual_checksum.eq(target_checksum.as_slice())
}

pub fn convert_address(pub_hash_key: &[u8]) -> String {
    let mut payload: Vec<u8> = vec![];
    payload.push(VERSION);
    payload.extend(pub_hash_key);
    let checksum = checksum(payload.as_slice());
    payload.extend(checksum.as_slice());
    crate::utils::base58_encode(payload.as_slice())
}

/// Recover the raw 20-byte address from its display form.
pub fn address_to_bytes(address: &str) -> Result<Vec<u8>> {
    if !validate_address(address) {
        return Err(NodeError::InvalidAddress(address.to_string()));
    }
    let payload = crate::utils::base58_decode(address)?;
    Ok(payload[1..payload.len() - ADDRESS_CHECK_SUM_LEN].to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_round_trip() {
        let wallet = Wallet::new().unwrap();
        let display = wallet.get_address();

        assert!(validate_address(&display));
        assert_eq!(address_to_bytes(&display).unwrap(), wallet.address_bytes());
        assert_eq!(wallet.address_bytes().len(), ADDRESS_LEN);
    }

    #[test]
    fn test_tampered_address_fails_validation() {
        let wallet = Wallet::new().unwrap();
        let mut display = wallet.get_address();
        // Flip one character; base58 has no 'l', so swap between two valid ones
        let replacement = if display.ends_with('1') { '2' } else { '1' };
        display.pop();
        display.push(replacement);
        assert!(!validate_address(&display));
    }

    #[test]
    fn test_wallet_reload_from_pkcs8() {
        let wallet = Wallet::new().unwrap();
        let reloaded = Wallet::from_pkcs8(wallet.get_pkcs8().to_vec()).unwrap();
        assert_eq!(wallet.address_bytes(), reloaded.address_bytes());
    }
}
