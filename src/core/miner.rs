//! Header-nonce search with cooperative cancellation
//!
//! The miner is an owned control handle, cloneable across threads. One
//! search runs at a time; `stop` and `skip` clear the working flag and the
//! search observes it between nonces. A race between a hit and a cancel is
//! settled by re-reading the flag after the loop: the hit only counts if the
//! search was still live.

use crate::core::target::{compact_bits, meets_target, target_hex};
use crate::core::Block;
use crate::error::{NodeError, Result};
use crate::utils::double_sha256_digest;
use log::info;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Outcome of a mining attempt. Cancellation and nonce exhaustion are
/// reported here, not as errors.
#[derive(Debug, Clone)]
pub struct MineResult {
    pub success: bool,
    pub difficulty: u64,
    pub nonce: u32,
    pub block: Block,
}

#[derive(Clone, Default)]
pub struct Miner {
    working: Arc<AtomicBool>,
    in_flight_height: Arc<AtomicU64>,
}

impl Miner {
    pub fn new() -> Miner {
        Miner {
            working: Arc::new(AtomicBool::new(false)),
            in_flight_height: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn is_working(&self) -> bool {
        self.working.load(Ordering::SeqCst)
    }

    /// Height of the candidate currently being mined. Only meaningful while
    /// `is_working` returns true.
    pub fn in_flight_height(&self) -> u64 {
        self.in_flight_height.load(Ordering::SeqCst)
    }

    /// Abandon the current attempt so the caller can rebuild the candidate.
    /// No-op while idle.
    pub fn skip(&self) {
        self.working.store(false, Ordering::SeqCst);
    }

    /// Shut the search down. Idempotent.
    pub fn stop(&self) {
        self.working.store(false, Ordering::SeqCst);
    }

    /// Search the 32-bit nonce space for a hash under the candidate's own
    /// difficulty target. On success the returned block carries the winning
    /// nonce and its cumulative difficulty.
    pub fn mine(&self, mut candidate: Block, parent_total_difficulty: u128) -> Result<MineResult> {
        if self
            .working
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(NodeError::Mining(
                "A mining task is already running; stop it before restarting".to_string(),
            ));
        }
        self.in_flight_height
            .store(candidate.get_height(), Ordering::SeqCst);

        let difficulty = candidate.get_header().get_difficulty();
        let target = target_hex(compact_bits(difficulty));
        info!(
            "Mining block at height {} (target {target})",
            candidate.get_height()
        );

        let mut hit: Option<u32> = None;
        let mut last_nonce: u32 = 0;
        for nonce in 0..=u32::MAX {
            // Cancellation is observed between nonces only
            if !self.working.load(Ordering::SeqCst) {
                break;
            }

            last_nonce = nonce;
            let preimage = candidate.get_header().mining_preimage(nonce);
            let hash = double_sha256_digest(&preimage);
            if meets_target(hash.as_slice(), &target) {
                hit = Some(nonce);
                break;
            }
        }

        // A hit that raced a cancel does not count
        let success = hit.is_some() && self.working.load(Ordering::SeqCst);
        self.working.store(false, Ordering::SeqCst);

        if success {
            let nonce = hit.expect("hit is present when success is true");
            candidate.header_mut().set_nonce(nonce);
            candidate
                .header_mut()
                .set_total_difficulty(parent_total_difficulty + difficulty as u128);
            info!(
                "Found nonce {nonce} for block at height {}",
                candidate.get_height()
            );
            return Ok(MineResult {
                success: true,
                difficulty,
                nonce,
                block: candidate,
            });
        }

        Ok(MineResult {
            success: false,
            difficulty,
            nonce: last_nonce,
            block: candidate,
        })
    }
}
