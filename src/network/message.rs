//! Wire messages and framing
//!
//! Frames are length-prefixed: a u32 big-endian byte count, then a one-byte
//! message code, then the payload in the canonical encoding. Decode failures
//! surface as `NodeError::Decode` and cost the sender nothing but a log
//! line.

use crate::core::{Block, BlockHeader, Transaction};
use crate::error::{NodeError, Result};
use crate::utils::{deserialize, serialize};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

/// Upper bound on a single frame, to keep a hostile peer from ballooning
/// memory.
pub const MAX_FRAME_BYTES: usize = 32 * 1024 * 1024;

pub const CODE_DISCONNECT: u8 = 0x01;
pub const CODE_STATUS: u8 = 0x02;
pub const CODE_GET_NODES: u8 = 0x03;
pub const CODE_NODES: u8 = 0x04;
pub const CODE_NEW_TRANSACTIONS: u8 = 0x05;
pub const CODE_NEW_BLOCK: u8 = 0x06;
pub const CODE_GET_BLOCKS: u8 = 0x07;
pub const CODE_BLOCKS: u8 = 0x08;
pub const CODE_GET_BLOCK_HEADERS: u8 = 0x09;
pub const CODE_BLOCK_HEADERS: u8 = 0x0a;

/// Peer status exchanged at handshake and on best-block changes.
#[derive(Debug, Clone, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct Status {
    pub node_id: String,
    pub addr_from: String,
    pub protocol_version: u32,
    pub network_id: u32,
    pub total_difficulty: u128,
    pub best_hash: Vec<u8>,
    pub best_height: u64,
    pub genesis_hash: Vec<u8>,
}

#[derive(Debug, Clone)]
pub enum Message {
    Disconnect,
    Status(Status),
    GetNodes {
        addr_from: String,
    },
    Nodes {
        addrs: Vec<String>,
    },
    NewTransactions {
        addr_from: String,
        transactions: Vec<Transaction>,
    },
    NewBlock {
        addr_from: String,
        block: Block,
    },
    GetBlocks {
        addr_from: String,
        from: u64,
        count: u64,
    },
    Blocks {
        addr_from: String,
        blocks: Vec<Block>,
    },
    GetBlockHeaders {
        addr_from: String,
        from: u64,
        count: u64,
    },
    BlockHeaders {
        addr_from: String,
        headers: Vec<BlockHeader>,
    },
}

impl Message {
    pub fn code(&self) -> u8 {
        match self {
            Message::Disconnect => CODE_DISCONNECT,
            Message::Status(_) => CODE_STATUS,
            Message::GetNodes { .. } => CODE_GET_NODES,
            Message::Nodes { .. } => CODE_NODES,
            Message::NewTransactions { .. } => CODE_NEW_TRANSACTIONS,
            Message::NewBlock { .. } => CODE_NEW_BLOCK,
            Message::GetBlocks { .. } => CODE_GET_BLOCKS,
            Message::Blocks { .. } => CODE_BLOCKS,
            Message::GetBlockHeaders { .. } => CODE_GET_BLOCK_HEADERS,
            Message::BlockHeaders { .. } => CODE_BLOCK_HEADERS,
        }
    }

    /// Code byte followed by the encoded payload.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut bytes = vec![self.code()];
        let payload = match self {
            Message::Disconnect => vec![],
            Message::Status(status) => serialize(status)?,
            Message::GetNodes { addr_from } => serialize(addr_from)?,
            Message::Nodes { addrs } => serialize(addrs)?,
            Message::NewTransactions {
                addr_from,
                transactions,
            } => serialize(&(addr_from.clone(), transactions.clone()))?,
            Message::NewBlock { addr_from, block } => {
                serialize(&(addr_from.clone(), block.clone()))?
            }
            Message::GetBlocks {
                addr_from,
                from,
                count,
            } => serialize(&(addr_from.clone(), *from, *count))?,
            Message::Blocks { addr_from, blocks } => {
                serialize(&(addr_from.clone(), blocks.clone()))?
            }
            Message::GetBlockHeaders {
                addr_from,
                from,
                count,
            } => serialize(&(addr_from.clone(), *from, *count))?,
            Message::BlockHeaders { addr_from, headers } => {
                serialize(&(addr_from.clone(), headers.clone()))?
            }
        };
        bytes.extend_from_slice(&payload);
        Ok(bytes)
    }

    pub fn decode(bytes: &[u8]) -> Result<Message> {
        let (code, payload) = bytes
            .split_first()
            .ok_or_else(|| NodeError::Decode("Empty frame".to_string()))?;

        let message = match *code {
            CODE_DISCONNECT => Message::Disconnect,
            CODE_STATUS => Message::Status(Self::payload::<Status>(payload)?),
            CODE_GET_NODES => Message::GetNodes {
                addr_from: Self::payload::<String>(payload)?,
            },
            CODE_NODES => Message::Nodes {
                addrs: Self::payload::<Vec<String>>(payload)?,
            },
            CODE_NEW_TRANSACTIONS => {
                let (addr_from, transactions) =
                    Self::payload::<(String, Vec<Transaction>)>(payload)?;
                Message::NewTransactions {
                    addr_from,
                    transactions,
                }
            }
            CODE_NEW_BLOCK => {
                let (addr_from, block) = Self::payload::<(String, Block)>(payload)?;
                Message::NewBlock { addr_from, block }
            }
            CODE_GET_BLOCKS => {
                let (addr_from, from, count) = Self::payload::<(String, u64, u64)>(payload)?;
                Message::GetBlocks {
                    addr_from,
                    from,
                    count,
                }
            }
            CODE_BLOCKS => {
                let (addr_from, blocks) = Self::payload::<(String, Vec<Block>)>(payload)?;
                Message::Blocks { addr_from, blocks }
            }
            CODE_GET_BLOCK_HEADERS => {
                let (addr_from, from, count) = Self::payload::<(String, u64, u64)>(payload)?;
                Message::GetBlockHeaders {
                    addr_from,
                    from,
                    count,
                }
            }
            CODE_BLOCK_HEADERS => {
                let (addr_from, headers) = Self::payload::<(String, Vec<BlockHeader>)>(payload)?;
                Message::BlockHeaders { addr_from, headers }
            }
            other => {
                return Err(NodeError::Decode(format!("Unknown message code {other:#04x}")));
            }
        };
        Ok(message)
    }

    fn payload<T>(bytes: &[u8]) -> Result<T>
    where
        T: for<'de> Deserialize<'de> + bincode::Decode<()>,
    {
        deserialize::<T>(bytes).map_err(|e| NodeError::Decode(format!("Bad payload: {e}")))
    }
}

/// Write one length-prefixed frame.
pub fn write_frame<W: Write>(writer: &mut W, message: &Message) -> Result<()> {
    let bytes = message.encode()?;
    let len = bytes.len() as u32;
    writer.write_all(&len.to_be_bytes())?;
    writer.write_all(&bytes)?;
    writer.flush()?;
    Ok(())
}

/// Read one length-prefixed frame. Returns the raw code+payload bytes.
pub fn read_frame<R: Read>(reader: &mut R) -> Result<Vec<u8>> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf)?;
    let len = u32::from_be_bytes(len_buf) as usize;
    if len == 0 || len > MAX_FRAME_BYTES {
        return Err(NodeError::Decode(format!("Invalid frame length {len}")));
    }

    let mut data = vec![0u8; len];
    reader.read_exact(&mut data)?;
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status() -> Status {
        Status {
            node_id: "node-1".to_string(),
            addr_from: "127.0.0.1:2001".to_string(),
            protocol_version: 1,
            network_id: 1,
            total_difficulty: 42,
            best_hash: vec![0xaa; 32],
            best_height: 7,
            genesis_hash: vec![0xbb; 32],
        }
    }

    #[test]
    fn test_code_is_first_byte() {
        let encoded = Message::Status(status()).encode().unwrap();
        assert_eq!(encoded[0], CODE_STATUS);

        let encoded = Message::Disconnect.encode().unwrap();
        assert_eq!(encoded, vec![CODE_DISCONNECT]);
    }

    #[test]
    fn test_status_round_trip() {
        let encoded = Message::Status(status()).encode().unwrap();
        match Message::decode(&encoded).unwrap() {
            Message::Status(decoded) => {
                assert_eq!(decoded.node_id, "node-1");
                assert_eq!(decoded.total_difficulty, 42);
                assert_eq!(decoded.best_height, 7);
            }
            other => panic!("Expected Status, got {other:?}"),
        }
    }

    #[test]
    fn test_get_blocks_round_trip() {
        let message = Message::GetBlocks {
            addr_from: "127.0.0.1:2002".to_string(),
            from: 401,
            count: 100,
        };
        match Message::decode(&message.encode().unwrap()).unwrap() {
            Message::GetBlocks {
                addr_from,
                from,
                count,
            } => {
                assert_eq!(addr_from, "127.0.0.1:2002");
                assert_eq!(from, 401);
                assert_eq!(count, 100);
            }
            other => panic!("Expected GetBlocks, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_code_is_decode_error() {
        assert!(Message::decode(&[0xff, 1, 2, 3]).is_err());
        assert!(Message::decode(&[]).is_err());
    }

    #[test]
    fn test_frame_round_trip() {
        let message = Message::GetNodes {
            addr_from: "127.0.0.1:2003".to_string(),
        };

        let mut buffer = Vec::new();
        write_frame(&mut buffer, &message).unwrap();

        let mut reader = buffer.as_slice();
        let frame = read_frame(&mut reader).unwrap();
        match Message::decode(&frame).unwrap() {
            Message::GetNodes { addr_from } => assert_eq!(addr_from, "127.0.0.1:2003"),
            other => panic!("Expected GetNodes, got {other:?}"),
        }
    }

    #[test]
    fn test_oversized_frame_is_rejected() {
        let mut buffer = Vec::new();
        buffer.extend_from_slice(&(MAX_FRAME_BYTES as u32 + 1).to_be_bytes());
        let mut reader = buffer.as_slice();
        assert!(read_frame(&mut reader).is_err());
    }
}
