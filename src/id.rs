//! # Fast process-unique task ids.
//!
//! Ids combine a nanosecond wall-clock timestamp with a process-wide atomic
//! counter, so two tasks spawned in the same nanosecond still get distinct
//! ids. The 16-byte payload (8-byte little-endian timestamp ‖ 8-byte
//! little-endian counter) is encoded as unpadded base64url, yielding a
//! 22-character ASCII string.
//!
//! This is orders of magnitude cheaper than a crypto UUID and is unique for
//! the life of the process, which is all task tracking needs.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;

/// Disambiguates ids generated within the same nanosecond.
static COUNTER: AtomicU64 = AtomicU64::new(0);

/// Returns a new 22-character task id.
pub fn next_id() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or_default();
    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);

    let mut raw = [0u8; 16];
    raw[..8].copy_from_slice(&nanos.to_le_bytes());
    raw[8..].copy_from_slice(&seq.to_le_bytes());

    URL_SAFE_NO_PAD.encode(raw)
}
