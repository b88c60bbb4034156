//! # Epoch Clock Helpers
//!
//! Wall-clock readings used for record freshness decisions. All timestamps
//! in wire formats and freshness math are unsigned integers relative to the
//! Unix epoch.

use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// Seconds since the Unix epoch.
pub fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Test: millisecond and second clocks agree to within a second
    #[test]
    fn test_clocks_agree() {
        let ms = now_millis();
        let s = now_secs();
        assert!(ms / 1000 >= s);
        assert!(ms / 1000 - s <= 1);
    }

    /// Test: clock is past a fixed recent date
    #[test]
    fn test_clock_is_sane() {
        // 2024-01-01T00:00:00Z
        assert!(now_secs() > 1_704_067_200);
    }
}
