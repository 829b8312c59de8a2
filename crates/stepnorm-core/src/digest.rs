//! # Content Digests
//!
//! The digest of a record's canonical encoding is the unit of identity in
//! stepnorm: structurally identical records produce identical digests, and
//! every downstream decision (dedup key, chunk bucket, final address,
//! output identity) is a pure function of it.
//!
//! Alongside the 256-bit BLAKE3 digest a derived 31-bit non-negative
//! summary is kept for cheap bucketing arithmetic. The summary uses the
//! stable djb2 hash so that bucket indices never depend on platform or
//! process state.

use serde::{Deserialize, Serialize};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;

/// Digest width in bytes (BLAKE3-256).
pub const DIGEST_LEN: usize = 32;

// =============================================================================
// STABLE 31-BIT HASHING (djb2)
// =============================================================================

/// Stable non-negative 31-bit hash of a byte slice.
///
/// djb2 (`h = h * 33 + b`, seed 5381) masked to 31 bits. Used for digest
/// summaries and for hashing synthetic chunk names during allocation.
#[must_use]
pub fn stable_code(bytes: &[u8]) -> u32 {
    let mut hash: u32 = 5381;
    for &b in bytes {
        hash = hash.wrapping_shl(5).wrapping_add(hash).wrapping_add(u32::from(b));
    }
    hash & 0x7FFF_FFFF
}

// =============================================================================
// DIGEST
// =============================================================================

/// A record's content digest plus its derived 31-bit summary.
///
/// Ordering is (summary, bytes) — the canonical total order used wherever
/// references are sorted by content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Digest {
    bytes: [u8; DIGEST_LEN],
    summary: u32,
}

impl Digest {
    /// Digest a canonical byte encoding.
    #[must_use]
    pub fn of(content: &[u8]) -> Self {
        let bytes = *blake3::hash(content).as_bytes();
        let summary = stable_code(&bytes);
        Self { bytes, summary }
    }

    /// The raw digest bytes.
    #[must_use]
    pub const fn bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.bytes
    }

    /// The 31-bit non-negative summary used for bucketing.
    #[must_use]
    pub const fn summary(&self) -> u32 {
        self.summary
    }

    /// The stable string form of this digest (standard base64).
    #[must_use]
    pub fn to_base64(&self) -> String {
        BASE64.encode(self.bytes)
    }
}

impl PartialOrd for Digest {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Digest {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.summary
            .cmp(&other.summary)
            .then_with(|| self.bytes.cmp(&other.bytes))
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stable_code_is_31_bit() {
        assert!(stable_code(b"IFCWALL_0") <= 0x7FFF_FFFF);
        assert!(stable_code(&[0xFF; 64]) <= 0x7FFF_FFFF);
    }

    #[test]
    fn stable_code_matches_djb2() {
        // djb2("a") = 5381 * 33 + 97 = 177670
        assert_eq!(stable_code(b"a"), 177_670);
        assert_eq!(stable_code(b""), 5381);
    }

    #[test]
    fn digest_is_deterministic() {
        let a = Digest::of(b"IFCWALL('x');");
        let b = Digest::of(b"IFCWALL('x');");
        assert_eq!(a, b);
        assert_eq!(a.to_base64(), b.to_base64());
    }

    #[test]
    fn digest_order_uses_summary_first() {
        let a = Digest::of(b"one");
        let b = Digest::of(b"two");
        let expected = a
            .summary()
            .cmp(&b.summary())
            .then_with(|| a.bytes().cmp(b.bytes()));
        assert_eq!(a.cmp(&b), expected);
    }
}
