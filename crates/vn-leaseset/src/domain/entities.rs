//! # Domain Entities
//!
//! Core data structures for reachability records: the shared [`Lease`]
//! value, the owned [`RecordBuffer`], the [`StoreType`] sub-format tag, and
//! the wire constants every decoder agrees on.

use shared_types::{IdentHash, StoreTypeCode, TunnelId};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Maximum leases a single record may advertise, identical across all
/// sub-formats. Bounds resource use from a single hostile record.
pub const MAX_NUM_LEASES: usize = 16;

/// Legacy wire size of one lease: 32-byte gateway + 4-byte tunnel id +
/// 8-byte millisecond end date.
pub const LEASE_SIZE: usize = 44;

/// v2 wire size of one lease: 32-byte gateway + 4-byte tunnel id +
/// 4-byte second end date.
pub const LEASE2_SIZE: usize = 40;

/// Legacy wire size of the encryption key field.
pub const ENCRYPTION_KEY_LEN: usize = 256;

/// Freshness threshold in milliseconds, applied uniformly wherever "is this
/// stale enough to drop" is decided. Absorbs clock skew and in-flight use.
pub const LEASE_END_DATE_THRESHOLD_MS: u64 = 51_000;

/// Record sub-format tag. Carried alongside the buffer (and mixed into the
/// v2 signature scope), never inside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum StoreType {
    /// Original record format with millisecond lease end dates.
    Legacy = 1,
    /// v2 record with key sections and second-granularity leases.
    Standard = 3,
    /// v2 record addressed by a blinded key, body encrypted.
    Encrypted = 5,
    /// v2 record referencing other destinations; carries no leases.
    Meta = 7,
}

impl StoreType {
    /// Decode a wire code. Returns `None` for unknown codes.
    pub fn from_code(code: StoreTypeCode) -> Option<Self> {
        match code {
            1 => Some(Self::Legacy),
            3 => Some(Self::Standard),
            5 => Some(Self::Encrypted),
            7 => Some(Self::Meta),
            _ => None,
        }
    }

    /// Wire code of this sub-format.
    pub fn code(self) -> StoreTypeCode {
        self as StoreTypeCode
    }
}

/// Identity of a lease: the (gateway, tunnel id) pair. End dates never
/// participate in lease identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LeaseKey {
    /// Hash of the tunnel's entry router.
    pub gateway: IdentHash,
    /// Tunnel identifier on that gateway.
    pub tunnel_id: TunnelId,
}

/// One advertised ingress point: traffic for the destination can be handed
/// to `gateway` for tunnel `tunnel_id` until `end_date`.
///
/// Leases are shared as `Arc<Lease>` between a record's internal set and any
/// in-flight consumer (a tunnel-build attempt already holding one). The
/// freshness fields are atomics so that reconciliation can expire a lease
/// out from under a concurrent holder: a removed lease has `0` stored into
/// its end date *before* it leaves the set, so a holder observes expiry
/// rather than a stale-but-plausible date. This zombie convention is a
/// documented contract of the reconciliation engine, not an accident.
pub struct Lease {
    gateway: IdentHash,
    tunnel_id: TunnelId,
    /// Milliseconds since epoch; `0` marks a lease pruned from its record.
    end_date: AtomicU64,
    /// Reconciliation scratch; never serialized.
    updated: AtomicBool,
}

impl Lease {
    /// Create a lease with the given end date in milliseconds.
    pub fn new(gateway: IdentHash, tunnel_id: TunnelId, end_date_ms: u64) -> Self {
        Self {
            gateway,
            tunnel_id,
            end_date: AtomicU64::new(end_date_ms),
            updated: AtomicBool::new(false),
        }
    }

    /// Gateway router hash.
    pub fn gateway(&self) -> &IdentHash {
        &self.gateway
    }

    /// Tunnel identifier on the gateway.
    pub fn tunnel_id(&self) -> TunnelId {
        self.tunnel_id
    }

    /// Identity key of this lease.
    pub fn key(&self) -> LeaseKey {
        LeaseKey {
            gateway: self.gateway,
            tunnel_id: self.tunnel_id,
        }
    }

    /// Current end date in milliseconds; `0` once pruned.
    pub fn end_date(&self) -> u64 {
        self.end_date.load(Ordering::Acquire)
    }

    /// True if the raw end date (no threshold) is past `now`.
    pub fn is_expired_at(&self, now_ms: u64) -> bool {
        now_ms >= self.end_date()
    }

    pub(crate) fn set_end_date(&self, end_date_ms: u64) {
        self.end_date.store(end_date_ms, Ordering::Release);
    }

    pub(crate) fn set_updated(&self, updated: bool) {
        self.updated.store(updated, Ordering::Release);
    }

    pub(crate) fn is_updated(&self) -> bool {
        self.updated.load(Ordering::Acquire)
    }
}

impl PartialEq for Lease {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Lease {}

impl fmt::Debug for Lease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lease")
            .field("gateway", &self.gateway)
            .field("tunnel_id", &self.tunnel_id)
            .field("end_date", &self.end_date())
            .finish()
    }
}

/// Owned, growable record buffer.
///
/// Replacing the contents reuses existing capacity when sufficient and
/// reallocates otherwise; no raw offsets ever leave the decode routines.
#[derive(Debug, Clone, Default)]
pub struct RecordBuffer {
    data: Vec<u8>,
}

impl RecordBuffer {
    /// Empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffer initialized from `bytes`.
    pub fn from_slice(bytes: &[u8]) -> Self {
        Self {
            data: bytes.to_vec(),
        }
    }

    /// Replace the contents, reusing capacity when possible.
    pub fn set_contents(&mut self, bytes: &[u8]) {
        self.data.clear();
        self.data.extend_from_slice(bytes);
    }

    /// Current contents.
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Content length in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True if no contents are held.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Allocated capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.data.capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Test: leases are equal iff (gateway, tunnel id) match
    #[test]
    fn test_lease_identity() {
        let a = Lease::new(IdentHash([1; 32]), 7, 1000);
        let b = Lease::new(IdentHash([1; 32]), 7, 9999);
        let c = Lease::new(IdentHash([1; 32]), 8, 1000);

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    /// Test: zombie store is observed through a shared reference
    #[test]
    fn test_lease_zombie_visible() {
        use std::sync::Arc;

        let lease = Arc::new(Lease::new(IdentHash([2; 32]), 1, 5000));
        let holder = Arc::clone(&lease);

        lease.set_end_date(0);

        assert_eq!(holder.end_date(), 0);
        assert!(holder.is_expired_at(1));
    }

    /// Test: set_contents reuses capacity when the new contents fit
    #[test]
    fn test_buffer_capacity_reuse() {
        let mut buf = RecordBuffer::from_slice(&[0u8; 512]);
        let cap = buf.capacity();

        buf.set_contents(&[1u8; 100]);

        assert_eq!(buf.len(), 100);
        assert_eq!(buf.capacity(), cap);
        assert_eq!(buf.as_slice(), &[1u8; 100][..]);
    }

    /// Test: store type codes round-trip and unknown codes are rejected
    #[test]
    fn test_store_type_codes() {
        for st in [
            StoreType::Legacy,
            StoreType::Standard,
            StoreType::Encrypted,
            StoreType::Meta,
        ] {
            assert_eq!(StoreType::from_code(st.code()), Some(st));
        }
        assert_eq!(StoreType::from_code(0), None);
        assert_eq!(StoreType::from_code(2), None);
    }
}
