// Account-model value transfer. A transaction moves `amount` from the
// sender account to the receiver account and bumps the sender nonce; the
// executor charges gas out of the sender balance. Transaction identity is
// the SHA-256 of the canonical encoding with the signature field left empty,
// which is also the signing preimage.

use crate::error::{NodeError, Result};
use crate::utils::{
    current_timestamp_millis, ecdsa_p256_sha256_sign_digest, ecdsa_p256_sha256_sign_verify,
    ripemd160_digest, serialize, sha256_digest,
};
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};

/// Raw account addresses are 20 bytes: ripemd160(sha256(public_key)).
pub const ADDRESS_LEN: usize = 20;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct Transaction {
    sender: Vec<u8>,
    receiver: Vec<u8>,
    amount: Vec<u8>, // big-endian unsigned integer
    timestamp: i64,  // milliseconds
    public_key: Vec<u8>,
    signature: Vec<u8>,
    nonce: Vec<u8>, // big-endian unsigned integer
    gas_price: u64,
    gas_limit: u64,
    data: Vec<u8>,
}

impl Transaction {
    /// Build an unsigned transaction. `receiver` empty means contract
    /// creation; `data` then carries the code.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        sender: Vec<u8>,
        receiver: Vec<u8>,
        amount: &BigUint,
        nonce: &BigUint,
        gas_price: u64,
        gas_limit: u64,
        data: Vec<u8>,
        public_key: Vec<u8>,
    ) -> Result<Transaction> {
        if sender.len() != ADDRESS_LEN {
            return Err(NodeError::InvalidAddress(format!(
                "Sender address must be {ADDRESS_LEN} bytes, got {}",
                sender.len()
            )));
        }
        if !receiver.is_empty() && receiver.len() != ADDRESS_LEN {
            return Err(NodeError::InvalidAddress(format!(
                "Receiver address must be {ADDRESS_LEN} bytes, got {}",
                receiver.len()
            )));
        }

        Ok(Transaction {
            sender,
            receiver,
            amount: amount.to_bytes_be(),
            timestamp: current_timestamp_millis()?,
            public_key,
            signature: vec![],
            nonce: nonce.to_bytes_be(),
            gas_price,
            gas_limit,
            data,
        })
    }

    /// Transaction identity: hash of the canonical encoding without the
    /// signature. Stable across signing.
    pub fn id(&self) -> Vec<u8> {
        let preimage = self
            .unsigned_encoding()
            .expect("Transaction encoding should never fail for identity hashing");
        sha256_digest(preimage.as_slice())
    }

    fn unsigned_encoding(&self) -> Result<Vec<u8>> {
        let mut unsigned = self.clone();
        unsigned.signature = vec![];
        serialize(&unsigned)
    }

    pub fn sign(&mut self, pkcs8: &[u8]) -> Result<()> {
        let preimage = self.unsigned_encoding()?;
        self.signature = ecdsa_p256_sha256_sign_digest(pkcs8, preimage.as_slice())?;
        Ok(())
    }

    /// Signature check plus sender binding: the sender address must be the
    /// key-hash of the embedded public key, otherwise a valid signature from
    /// an unrelated key would spend someone else's account.
    pub fn verify(&self) -> bool {
        if self.signature.is_empty() || self.public_key.is_empty() {
            return false;
        }

        let derived = ripemd160_digest(sha256_digest(&self.public_key).as_slice());
        if derived != self.sender {
            return false;
        }

        let preimage = match self.unsigned_encoding() {
            Ok(bytes) => bytes,
            Err(_) => return false,
        };
        ecdsa_p256_sha256_sign_verify(&self.public_key, &self.signature, preimage.as_slice())
    }

    pub fn get_sender(&self) -> &[u8] {
        self.sender.as_slice()
    }

    pub fn get_receiver(&self) -> &[u8] {
        self.receiver.as_slice()
    }

    pub fn get_amount(&self) -> BigUint {
        BigUint::from_bytes_be(&self.amount)
    }

    pub fn get_nonce(&self) -> BigUint {
        BigUint::from_bytes_be(&self.nonce)
    }

    pub fn get_timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn get_public_key(&self) -> &[u8] {
        self.public_key.as_slice()
    }

    pub fn get_gas_price(&self) -> u64 {
        self.gas_price
    }

    pub fn get_gas_limit(&self) -> u64 {
        self.gas_limit
    }

    pub fn get_data(&self) -> &[u8] {
        self.data.as_slice()
    }

    pub fn is_contract_creation(&self) -> bool {
        self.receiver.is_empty()
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        serialize(self)
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Transaction> {
        crate::utils::deserialize::<Transaction>(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallet::Wallet;

    fn signed_transfer(wallet: &Wallet, receiver: Vec<u8>, amount: u64, nonce: u64) -> Transaction {
        let mut tx = Transaction::new(
            wallet.address_bytes(),
            receiver,
            &BigUint::from(amount),
            &BigUint::from(nonce),
            1,
            21_000,
            vec![],
            wallet.get_public_key().to_vec(),
        )
        .unwrap();
        tx.sign(wallet.get_pkcs8()).unwrap();
        tx
    }

    #[test]
    fn test_id_ignores_signature() {
        let wallet = Wallet::new().unwrap();
        let mut tx = Transaction::new(
            wallet.address_bytes(),
            vec![7u8; ADDRESS_LEN],
            &BigUint::from(500u32),
            &BigUint::from(0u32),
            1,
            21_000,
            vec![],
            wallet.get_public_key().to_vec(),
        )
        .unwrap();

        let unsigned_id = tx.id();
        tx.sign(wallet.get_pkcs8()).unwrap();
        assert_eq!(unsigned_id, tx.id());
    }

    #[test]
    fn test_sign_and_verify() {
        let wallet = Wallet::new().unwrap();
        let tx = signed_transfer(&wallet, vec![7u8; ADDRESS_LEN], 500, 0);
        assert!(tx.verify());
    }

    #[test]
    fn test_verify_rejects_foreign_key() {
        let wallet = Wallet::new().unwrap();
        let other = Wallet::new().unwrap();

        // Signed by `other` but claiming `wallet`'s sender address
        let mut tx = Transaction::new(
            wallet.address_bytes(),
            vec![7u8; ADDRESS_LEN],
            &BigUint::from(500u32),
            &BigUint::from(0u32),
            1,
            21_000,
            vec![],
            other.get_public_key().to_vec(),
        )
        .unwrap();
        tx.sign(other.get_pkcs8()).unwrap();

        assert!(!tx.verify());
    }

    #[test]
    fn test_verify_rejects_tampered_amount() {
        let wallet = Wallet::new().unwrap();
        let mut tx = signed_transfer(&wallet, vec![7u8; ADDRESS_LEN], 500, 0);
        tx.amount = BigUint::from(5_000_000u32).to_bytes_be();
        assert!(!tx.verify());
    }

    #[test]
    fn test_round_trip() {
        let wallet = Wallet::new().unwrap();
        let tx = signed_transfer(&wallet, vec![7u8; ADDRESS_LEN], 500, 3);

        let bytes = tx.serialize().unwrap();
        let decoded = Transaction::deserialize(&bytes).unwrap();
        assert_eq!(tx, decoded);
        assert_eq!(tx.id(), decoded.id());
    }
}
