//! Compact difficulty encoding and the mining target
//!
//! The header carries difficulty as a 64-bit value whose low 32 bits are a
//! packed target: high byte exponent, low three bytes mantissa, so that
//! `target = mantissa * 2^(8 * (exponent - 3))`. A header hash hits the
//! target iff its 64-digit lowercase hex rendering compares lexicographically
//! below the zero-padded target rendering. Fixed-width lowercase hex compares
//! identically to unsigned big-endian integers, and the hex comparison is the
//! consensus check.

use data_encoding::HEXLOWER;
use num_bigint::BigUint;

/// Compact bits of the genesis block; also the easiest allowed target.
pub const GENESIS_DIFFICULTY_BITS: u32 = 0x1f00ffff;

/// Desired spacing between consecutive blocks, in seconds.
pub const TARGET_SPACING_SECS: u32 = 10;

/// Retarget granularity: each block moves the target by 1/2048 of itself.
const RETARGET_DIVISOR: u32 = 2048;

/// Expand a compact 32-bit encoding into the full 256-bit target.
pub fn target_from_compact(compact: u32) -> BigUint {
    let exponent = compact >> 24;
    let mantissa = BigUint::from(compact & 0x00ff_ffff);

    let target = if exponent <= 3 {
        mantissa >> (8 * (3 - exponent))
    } else {
        mantissa << (8 * (exponent - 3))
    };

    // Saturate anything that would not fit in 32 bytes
    let max = max_target_value();
    if target > max {
        max
    } else {
        target
    }
}

/// Pack a target back into compact form. The low bytes beyond the three-byte
/// mantissa are truncated, same as the expansion only keeps three bytes of
/// precision.
pub fn target_to_compact(target: &BigUint) -> u32 {
    let bytes = target.to_bytes_be();
    if target == &BigUint::from(0u32) {
        return 0;
    }

    let mut exponent = bytes.len() as u32;
    let mut mantissa: u32 = 0;
    for i in 0..3 {
        mantissa <<= 8;
        mantissa |= bytes.get(i).copied().unwrap_or(0) as u32;
    }

    // Keep the mantissa's high bit clear so expansion and packing agree on
    // the exponent (same normalization rule as Bitcoin's nBits)
    if mantissa & 0x0080_0000 != 0 {
        mantissa >>= 8;
        exponent += 1;
    }

    (exponent << 24) | (mantissa & 0x00ff_ffff)
}

fn max_target_value() -> BigUint {
    (BigUint::from(1u32) << 256u32) - BigUint::from(1u32)
}

/// The 64-character zero-padded lowercase hex rendering of a compact target.
pub fn target_hex(compact: u32) -> String {
    let target = target_from_compact(compact);
    let bytes = target.to_bytes_be();
    let mut padded = vec![0u8; 32_usize.saturating_sub(bytes.len())];
    padded.extend_from_slice(&bytes);
    HEXLOWER.encode(&padded)
}

/// Hit test: the hash hex must sort strictly below the target hex.
pub fn meets_target(hash: &[u8], target: &str) -> bool {
    let hash_hex = HEXLOWER.encode(hash);
    hash_hex.as_str() < target
}

/// Compact bits of a 64-bit stored difficulty value.
pub fn compact_bits(difficulty: u64) -> u32 {
    difficulty as u32
}

/// Deterministic difficulty retarget.
///
/// Consensus schedule: blocks are expected `TARGET_SPACING_SECS` apart. A
/// faster parent spacing shrinks the target (harder) by 1/2048 of itself, a
/// slower one grows it (easier) by the same fraction. The target never grows
/// beyond the genesis target and never collapses to zero.
pub fn calculate_next_difficulty(parent_difficulty: u64, parent_time: u32, time: u32) -> u64 {
    let parent_target = target_from_compact(compact_bits(parent_difficulty));
    let step = &parent_target / RETARGET_DIVISOR;

    let spacing = time.saturating_sub(parent_time);
    let mut next_target = if spacing < TARGET_SPACING_SECS {
        &parent_target - &step
    } else {
        &parent_target + &step
    };

    let floor = BigUint::from(1u32);
    let ceiling = target_from_compact(GENESIS_DIFFICULTY_BITS);
    if next_target < floor {
        next_target = floor;
    }
    if next_target > ceiling {
        next_target = ceiling;
    }

    target_to_compact(&next_target) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_hex_bitcoin_style_bits() {
        // exponent 0x1d, mantissa 0xffff: two mantissa bytes followed by 26
        // zero bytes, 28 significant bytes in total
        let hex = target_hex(0x1d00ffff);
        assert_eq!(hex.len(), 64);
        assert_eq!(
            hex,
            "00000000ffff0000000000000000000000000000000000000000000000000000"
        );
    }

    #[test]
    fn test_target_hex_tiny_exponent() {
        // exponent 1 shifts the mantissa right by two bytes: 0x010000 >> 16 = 1
        let hex = target_hex(0x01010000);
        assert_eq!(
            hex,
            "0000000000000000000000000000000000000000000000000000000000000001"
        );
    }

    #[test]
    fn test_meets_target_is_strict() {
        let target = target_hex(0x1d00ffff);

        let mut just_below = [0u8; 32];
        just_below[4] = 0xff;
        just_below[5] = 0xfe;
        assert!(meets_target(&just_below, &target));

        // Equality does not hit
        let mut equal = [0u8; 32];
        equal[4] = 0xff;
        equal[5] = 0xff;
        assert!(!meets_target(&equal, &target));

        let mut above = [0u8; 32];
        above[0] = 0x01;
        assert!(!meets_target(&above, &target));
    }

    #[test]
    fn test_compact_round_trip() {
        for bits in [0x1d00ffff_u32, 0x1f00ffff, 0x207fffff, 0x04123456] {
            let target = target_from_compact(bits);
            assert_eq!(target_to_compact(&target), bits);
        }
    }

    #[test]
    fn test_retarget_fast_block_raises_difficulty() {
        let parent = GENESIS_DIFFICULTY_BITS as u64;
        let next = calculate_next_difficulty(parent, 1000, 1002);
        let parent_target = target_from_compact(compact_bits(parent));
        let next_target = target_from_compact(compact_bits(next));
        assert!(next_target < parent_target);
    }

    #[test]
    fn test_retarget_slow_block_clamps_at_genesis() {
        // Already at the easiest target, a slow block cannot go easier
        let parent = GENESIS_DIFFICULTY_BITS as u64;
        let next = calculate_next_difficulty(parent, 1000, 1100);
        assert_eq!(next, GENESIS_DIFFICULTY_BITS as u64);
    }

    #[test]
    fn test_retarget_is_deterministic() {
        let a = calculate_next_difficulty(0x1d00ffff, 500, 520);
        let b = calculate_next_difficulty(0x1d00ffff, 500, 520);
        assert_eq!(a, b);
    }
}
