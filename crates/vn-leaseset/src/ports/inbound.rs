//! # Inbound Ports (Driving Ports / API)
//!
//! The query surface offered to routing logic by records that materialize
//! leases. Implemented by the legacy and standard-v2 record types only;
//! meta records carry no leases and deliberately do not implement it.

use crate::domain::entities::Lease;
use std::sync::Arc;

/// Freshness and selection queries over a record's live lease set.
///
/// All time-dependent answers are computed against the ambient clock; the
/// pure `*_at` forms on the concrete types take an explicit `now` for
/// deterministic testing.
pub trait LeaseHolding {
    /// Leases not yet expired at the ambient clock, excluding any matched
    /// by `exclude`.
    ///
    /// `with_threshold` picks the comparison sense deliberately:
    /// `true` *adds* the freshness threshold to each end date (permissive,
    /// "can still be used momentarily"), `false` *subtracts* it (strict,
    /// "safe to rely on for a new build"). The two are not interchangeable.
    fn non_expired_leases_excluding(
        &self,
        exclude: &dyn Fn(&Lease) -> bool,
        with_threshold: bool,
    ) -> Vec<Arc<Lease>>;

    /// All non-expired leases, with the same threshold sense as
    /// [`LeaseHolding::non_expired_leases_excluding`].
    fn non_expired_leases(&self, with_threshold: bool) -> Vec<Arc<Lease>> {
        self.non_expired_leases_excluding(&|_| false, with_threshold)
    }

    /// True if any held lease's raw end date (no threshold) is already
    /// past the ambient clock.
    fn has_expired_leases(&self) -> bool;

    /// True if the record holds no leases.
    fn is_empty(&self) -> bool;

    /// True if the record as a whole is expired: materializing with an
    /// empty set, or past its aggregate expiration.
    fn is_expired(&self) -> bool;

    /// Aggregate expiration of the record in milliseconds.
    fn expiration_time(&self) -> u64;

    /// True if already expired or within `window_ms` of the aggregate
    /// expiration. A random jitter up to `jitter_ms` is added to "now" to
    /// desynchronize many records' refresh decisions.
    fn expires_soon(&self, window_ms: u64, jitter_ms: u64) -> bool;
}
