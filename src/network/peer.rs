use crate::network::message::Status;
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

/// A connected peer as last reported by its STATUS message. Lifetime is
/// bound to the transport: a closed connection removes the entry.
#[derive(Debug, Clone)]
pub struct Peer {
    pub node_id: String,
    pub addr: String,
    pub protocol_version: u32,
    pub network_id: u32,
    pub best_hash: Vec<u8>,
    pub best_height: u64,
    pub genesis_hash: Vec<u8>,
    pub total_difficulty: u128,
}

impl Peer {
    pub fn from_status(status: &Status) -> Peer {
        Peer {
            node_id: status.node_id.clone(),
            addr: status.addr_from.clone(),
            protocol_version: status.protocol_version,
            network_id: status.network_id,
            best_hash: status.best_hash.clone(),
            best_height: status.best_height,
            genesis_hash: status.genesis_hash.clone(),
            total_difficulty: status.total_difficulty,
        }
    }
}

/// Connected-peer roster plus the discovery set of addresses learned from
/// NODES messages. Mutated on the manager thread only.
pub struct Peers {
    connected: RwLock<HashMap<String, Peer>>,
    known: RwLock<HashSet<String>>,
    max_peers: usize,
}

impl Peers {
    pub fn new(max_peers: usize) -> Peers {
        Peers {
            connected: RwLock::new(HashMap::new()),
            known: RwLock::new(HashSet::new()),
            max_peers,
        }
    }

    pub fn update_from_status(&self, status: &Status) {
        let peer = Peer::from_status(status);
        match self.connected.write() {
            Ok(mut connected) => {
                connected.insert(peer.addr.clone(), peer);
            }
            Err(_) => {
                log::error!("Failed to acquire write lock on peer roster");
            }
        }
    }

    pub fn remove(&self, addr: &str) {
        match self.connected.write() {
            Ok(mut connected) => {
                if connected.remove(addr).is_some() {
                    log::info!("Removed peer {addr}");
                }
            }
            Err(_) => {
                log::error!("Failed to acquire write lock on peer roster");
            }
        }
    }

    pub fn get(&self, addr: &str) -> Option<Peer> {
        match self.connected.read() {
            Ok(connected) => connected.get(addr).cloned(),
            Err(_) => {
                log::error!("Failed to acquire read lock on peer roster");
                None
            }
        }
    }

    pub fn addrs(&self) -> Vec<String> {
        match self.connected.read() {
            Ok(connected) => connected.keys().cloned().collect(),
            Err(_) => {
                log::error!("Failed to acquire read lock on peer roster");
                Vec::new()
            }
        }
    }

    pub fn addrs_except(&self, excluded: &str) -> Vec<String> {
        self.addrs()
            .into_iter()
            .filter(|addr| addr != excluded)
            .collect()
    }

    pub fn len(&self) -> usize {
        match self.connected.read() {
            Ok(connected) => connected.len(),
            Err(_) => {
                log::error!("Failed to acquire read lock on peer roster");
                0
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn at_capacity(&self) -> bool {
        self.len() >= self.max_peers
    }

    /// Merge addresses learned from a NODES message into the discovery set.
    pub fn merge_known(&self, addrs: &[String]) {
        match self.known.write() {
            Ok(mut known) => {
                for addr in addrs {
                    known.insert(addr.clone());
                }
            }
            Err(_) => {
                log::error!("Failed to acquire write lock on known addresses");
            }
        }
    }

    pub fn known_addrs(&self) -> Vec<String> {
        match self.known.read() {
            Ok(known) => known.iter().cloned().collect(),
            Err(_) => {
                log::error!("Failed to acquire read lock on known addresses");
                Vec::new()
            }
        }
    }
}
