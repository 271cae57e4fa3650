//! Header-first catch-up state machine
//!
//! A peer whose STATUS advertises more cumulative difficulty than ours
//! triggers a sync. The manager walks backwards from its own best height in
//! 200-block windows, asking for headers until it finds one whose parent is
//! already local (the common ancestor is inside that window), then switches
//! to pulling full blocks forward from there. An empty reply in either phase
//! means the peer has nothing further and the sync is complete.

use crate::core::{BlockHeader, ChainEngine};
use std::time::{Duration, Instant};

/// Walk-back window for the common-ancestor search.
pub const SYNC_WINDOW: u64 = 200;

/// Headers requested per round.
pub const HEADERS_PER_REQUEST: u64 = 10;

/// Blocks requested per round once the ancestor is found.
pub const BLOCKS_PER_REQUEST: u64 = 100;

/// No transition for this long reverts the machine to IDLE.
pub const SYNC_STALL_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    InitSyncGetHeaders,
    InitSyncGetBlocks,
    InitSyncCompleted,
}

/// A request the caller should send to the sync peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncRequest {
    GetHeaders { from: u64, count: u64 },
    GetBlocks { from: u64, count: u64 },
}

/// Read-only view of the local chain, the seam that keeps the state machine
/// testable without a populated repository.
pub trait ChainView {
    fn has_block(&self, hash: &[u8]) -> bool;
    fn best_height(&self) -> u64;
    fn best_total_difficulty(&self) -> u128;
}

impl ChainView for ChainEngine {
    fn has_block(&self, hash: &[u8]) -> bool {
        ChainEngine::has_block(self, hash)
    }

    fn best_height(&self) -> u64 {
        ChainEngine::best_height(self)
    }

    fn best_total_difficulty(&self) -> u128 {
        ChainEngine::best_total_difficulty(self)
    }
}

pub struct SyncManager {
    state: SyncState,
    /// `from` height of the outstanding header request
    header_cursor: u64,
    /// Next height to pull once in the block phase
    block_cursor: u64,
    /// Address of the peer being synced from
    peer_addr: Option<String>,
    last_progress: Instant,
}

impl Default for SyncManager {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncManager {
    pub fn new() -> SyncManager {
        SyncManager {
            state: SyncState::Idle,
            header_cursor: 0,
            block_cursor: 0,
            peer_addr: None,
            last_progress: Instant::now(),
        }
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    pub fn is_syncing(&self) -> bool {
        matches!(
            self.state,
            SyncState::InitSyncGetHeaders | SyncState::InitSyncGetBlocks
        )
    }

    pub fn peer_addr(&self) -> Option<&str> {
        self.peer_addr.as_deref()
    }

    fn touch(&mut self) {
        self.last_progress = Instant::now();
    }

    /// Peer status arrived. Starts a sync when the peer is ahead of us and
    /// the machine is idle.
    pub fn on_peer_status(
        &mut self,
        view: &dyn ChainView,
        peer_addr: &str,
        peer_total_difficulty: u128,
    ) -> Option<SyncRequest> {
        if self.state != SyncState::Idle && self.state != SyncState::InitSyncCompleted {
            return None;
        }
        if peer_total_difficulty <= view.best_total_difficulty() {
            return None;
        }

        self.peer_addr = Some(peer_addr.to_string());
        self.touch();

        let best_height = view.best_height();
        if best_height == 0 {
            // Fresh chain: nothing to anchor on, pull blocks from the start
            self.state = SyncState::InitSyncGetBlocks;
            self.block_cursor = 1;
            log::info!("Starting sync from genesis against {peer_addr}");
            return Some(SyncRequest::GetBlocks {
                from: 1,
                count: BLOCKS_PER_REQUEST,
            });
        }

        self.state = SyncState::InitSyncGetHeaders;
        self.header_cursor = best_height.saturating_sub(SYNC_WINDOW - 1).max(1);
        log::info!(
            "Starting header sync against {peer_addr} from height {}",
            self.header_cursor
        );
        Some(SyncRequest::GetHeaders {
            from: self.header_cursor,
            count: HEADERS_PER_REQUEST,
        })
    }

    /// Headers arrived during the ancestor search.
    pub fn on_block_headers(
        &mut self,
        view: &dyn ChainView,
        headers: &[BlockHeader],
    ) -> Option<SyncRequest> {
        if self.state != SyncState::InitSyncGetHeaders {
            return None;
        }
        self.touch();

        let first = match headers.first() {
            Some(first) => first,
            None => {
                // Peer has nothing at this height: done
                self.state = SyncState::InitSyncCompleted;
                log::info!("Sync completed: peer returned no headers");
                return None;
            }
        };

        if view.has_block(first.get_parent_hash()) {
            // Common ancestor found; pull bodies forward from here
            self.state = SyncState::InitSyncGetBlocks;
            self.block_cursor = first.get_height();
            log::info!(
                "Common ancestor found below height {}, switching to block sync",
                first.get_height()
            );
            return Some(SyncRequest::GetBlocks {
                from: self.block_cursor,
                count: BLOCKS_PER_REQUEST,
            });
        }

        // Ancestor is further back: retreat one window and ask again
        self.header_cursor = self.header_cursor.saturating_sub(SYNC_WINDOW).max(1);
        log::info!(
            "Parent unknown, stepping header search back to height {}",
            self.header_cursor
        );
        Some(SyncRequest::GetHeaders {
            from: self.header_cursor,
            count: HEADERS_PER_REQUEST,
        })
    }

    /// A batch of `received` blocks was imported. An empty batch means the
    /// peer has nothing further.
    pub fn on_blocks(&mut self, received: u64) -> Option<SyncRequest> {
        if self.state != SyncState::InitSyncGetBlocks {
            return None;
        }
        self.touch();

        if received == 0 {
            self.state = SyncState::InitSyncCompleted;
            log::info!("Sync completed at height cursor {}", self.block_cursor);
            return None;
        }

        self.block_cursor = self.block_cursor.saturating_add(received);
        Some(SyncRequest::GetBlocks {
            from: self.block_cursor,
            count: BLOCKS_PER_REQUEST,
        })
    }

    /// Revert to IDLE when no transition happened for the stall timeout.
    /// Returns true when a stalled sync was abandoned.
    pub fn check_stall(&mut self) -> bool {
        if self.is_syncing() && self.last_progress.elapsed() > SYNC_STALL_TIMEOUT {
            log::warn!("Sync stalled, reverting to idle");
            self.reset();
            return true;
        }
        false
    }

    pub fn reset(&mut self) {
        self.state = SyncState::Idle;
        self.peer_addr = None;
        self.header_cursor = 0;
        self.block_cursor = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::merkle::transactions_root;
    use crate::core::HASH_LEN;
    use std::collections::HashSet;

    struct FakeView {
        best_height: u64,
        total_difficulty: u128,
        known_hashes: HashSet<Vec<u8>>,
    }

    impl ChainView for FakeView {
        fn has_block(&self, hash: &[u8]) -> bool {
            self.known_hashes.contains(hash)
        }

        fn best_height(&self) -> u64 {
            self.best_height
        }

        fn best_total_difficulty(&self) -> u128 {
            self.total_difficulty
        }
    }

    fn header_with_parent(height: u64, parent: Vec<u8>) -> BlockHeader {
        BlockHeader::new(
            height,
            parent,
            vec![1u8; 20],
            1_700_000_000,
            0x1f00ffff,
            vec![0u8; HASH_LEN],
            transactions_root(&[]),
        )
        .unwrap()
    }

    #[test]
    fn test_peer_behind_does_not_start_sync() {
        let view = FakeView {
            best_height: 10,
            total_difficulty: 100,
            known_hashes: HashSet::new(),
        };
        let mut sync = SyncManager::new();

        assert!(sync.on_peer_status(&view, "peer:1", 100).is_none());
        assert!(sync.on_peer_status(&view, "peer:1", 50).is_none());
        assert_eq!(sync.state(), SyncState::Idle);
    }

    #[test]
    fn test_fresh_chain_pulls_blocks_from_one() {
        let view = FakeView {
            best_height: 0,
            total_difficulty: 10,
            known_hashes: HashSet::new(),
        };
        let mut sync = SyncManager::new();

        let request = sync.on_peer_status(&view, "peer:1", 999).unwrap();
        assert_eq!(
            request,
            SyncRequest::GetBlocks {
                from: 1,
                count: BLOCKS_PER_REQUEST
            }
        );
        assert_eq!(sync.state(), SyncState::InitSyncGetBlocks);
    }

    #[test]
    fn test_common_ancestor_walkback() {
        // Local best at 1000, peer ahead; ancestor search must probe 801,
        // 601, then find the parent known at 401 and switch to block sync
        let known_parent = vec![0x11; HASH_LEN];
        let mut known_hashes = HashSet::new();
        known_hashes.insert(known_parent.clone());
        let view = FakeView {
            best_height: 1000,
            total_difficulty: 10,
            known_hashes,
        };

        let mut sync = SyncManager::new();
        let request = sync.on_peer_status(&view, "peer:1", 999).unwrap();
        assert_eq!(
            request,
            SyncRequest::GetHeaders {
                from: 801,
                count: HEADERS_PER_REQUEST
            }
        );

        // 801: parent unknown, step back to 601
        let unknown = header_with_parent(801, vec![0xaa; HASH_LEN]);
        let request = sync.on_block_headers(&view, &[unknown]).unwrap();
        assert_eq!(
            request,
            SyncRequest::GetHeaders {
                from: 601,
                count: HEADERS_PER_REQUEST
            }
        );

        // 601: parent unknown, step back to 401
        let unknown = header_with_parent(601, vec![0xbb; HASH_LEN]);
        let request = sync.on_block_headers(&view, &[unknown]).unwrap();
        assert_eq!(
            request,
            SyncRequest::GetHeaders {
                from: 401,
                count: HEADERS_PER_REQUEST
            }
        );

        // 401: parent known, switch to block sync from 401
        let anchored = header_with_parent(401, known_parent);
        let request = sync.on_block_headers(&view, &[anchored]).unwrap();
        assert_eq!(
            request,
            SyncRequest::GetBlocks {
                from: 401,
                count: BLOCKS_PER_REQUEST
            }
        );
        assert_eq!(sync.state(), SyncState::InitSyncGetBlocks);

        // Batches advance the cursor; an empty batch completes
        let request = sync.on_blocks(100).unwrap();
        assert_eq!(
            request,
            SyncRequest::GetBlocks {
                from: 501,
                count: BLOCKS_PER_REQUEST
            }
        );
        assert!(sync.on_blocks(0).is_none());
        assert_eq!(sync.state(), SyncState::InitSyncCompleted);
    }

    #[test]
    fn test_walkback_clamps_at_one() {
        let view = FakeView {
            best_height: 150,
            total_difficulty: 10,
            known_hashes: HashSet::new(),
        };
        let mut sync = SyncManager::new();

        // 150 - 200 + 1 clamps to 1
        let request = sync.on_peer_status(&view, "peer:1", 999).unwrap();
        assert_eq!(
            request,
            SyncRequest::GetHeaders {
                from: 1,
                count: HEADERS_PER_REQUEST
            }
        );
    }

    #[test]
    fn test_empty_headers_complete_sync() {
        let view = FakeView {
            best_height: 300,
            total_difficulty: 10,
            known_hashes: HashSet::new(),
        };
        let mut sync = SyncManager::new();

        sync.on_peer_status(&view, "peer:1", 999).unwrap();
        assert!(sync.on_block_headers(&view, &[]).is_none());
        assert_eq!(sync.state(), SyncState::InitSyncCompleted);
        assert!(!sync.is_syncing());
    }

    #[test]
    fn test_messages_outside_sync_are_ignored() {
        let view = FakeView {
            best_height: 300,
            total_difficulty: 10,
            known_hashes: HashSet::new(),
        };
        let mut sync = SyncManager::new();

        assert!(sync
            .on_block_headers(&view, &[header_with_parent(1, vec![0u8; HASH_LEN])])
            .is_none());
        assert!(sync.on_blocks(5).is_none());
        assert_eq!(sync.state(), SyncState::Idle);
    }
}
