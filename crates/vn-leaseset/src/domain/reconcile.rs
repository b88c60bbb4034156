//! # Lease Reconciliation Engine
//!
//! The three-phase mark/update/prune algorithm run on every decode that
//! materializes leases. The set is reconciled in place rather than
//! replaced so that an `Arc<Lease>` handed to an in-flight consumer stays
//! a valid allocation across record updates; only its freshness changes.
//!
//! ## Zombie convention
//!
//! A lease pruned in the third phase has `0` stored into its end date
//! *before* it is removed from the set. A concurrent holder therefore
//! observes expiry, never a stale-but-plausible date. This is a contract
//! of the engine, relied upon by tunnel-selection logic.

use super::entities::{Lease, LeaseKey, LEASE_END_DATE_THRESHOLD_MS};
use crate::ports::outbound::NetDbGateway;
use shared_types::{IdentHash, TunnelId};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Lease set plus the reconciliation state shared by the legacy and
/// standard-v2 record types.
pub(crate) struct LeaseReconciler {
    /// When false, individual leases are never materialized; only the
    /// aggregate expiration is tracked (memory-saving mode).
    store_leases: bool,
    leases: BTreeMap<LeaseKey, Arc<Lease>>,
    /// Max end date observed during the current pass, seeded by `begin`.
    expiration_candidate: u64,
}

impl LeaseReconciler {
    pub(crate) fn new(store_leases: bool) -> Self {
        Self {
            store_leases,
            leases: BTreeMap::new(),
            expiration_candidate: 0,
        }
    }

    pub(crate) fn store_leases(&self) -> bool {
        self.store_leases
    }

    pub(crate) fn set_store_leases(&mut self, store_leases: bool) {
        self.store_leases = store_leases;
    }

    /// Phase 1: mark every held lease un-updated (or drop the set entirely
    /// when not materializing) and seed the aggregate-expiration candidate.
    pub(crate) fn begin(&mut self, expiration_seed_ms: u64) {
        self.expiration_candidate = expiration_seed_ms;
        if self.store_leases {
            for lease in self.leases.values() {
                lease.set_updated(false);
            }
        } else {
            self.leases.clear();
        }
    }

    /// Phase 2: fold one incoming lease into the set.
    ///
    /// A lease whose end date plus the freshness threshold is already past
    /// `now_ms` is discarded. Otherwise the aggregate candidate is raised
    /// and, when materializing, the lease is upserted by identity (an
    /// existing entry gets only its end date overwritten) and an unknown
    /// gateway triggers a fire-and-forget lookup through `netdb`.
    pub(crate) fn update_lease(
        &mut self,
        gateway: IdentHash,
        tunnel_id: TunnelId,
        end_date_ms: u64,
        now_ms: u64,
        netdb: &dyn NetDbGateway,
    ) {
        if now_ms >= end_date_ms.saturating_add(LEASE_END_DATE_THRESHOLD_MS) {
            warn!(%gateway, tunnel_id, end_date_ms, "lease is expired already");
            return;
        }
        if end_date_ms > self.expiration_candidate {
            self.expiration_candidate = end_date_ms;
        }
        if !self.store_leases {
            return;
        }
        let key = LeaseKey { gateway, tunnel_id };
        let lease = self
            .leases
            .entry(key)
            .or_insert_with(|| Arc::new(Lease::new(gateway, tunnel_id, end_date_ms)));
        lease.set_end_date(end_date_ms);
        lease.set_updated(true);
        if !netdb.find_router(&gateway) {
            debug!(%gateway, "lease gateway not found, requesting");
            netdb.request_destination(&gateway);
        }
    }

    /// Phase 3: prune every lease the pass did not touch, zombifying each
    /// (end date stored as `0`) before removal.
    pub(crate) fn end(&mut self) {
        if !self.store_leases {
            return;
        }
        self.leases.retain(|_, lease| {
            if lease.is_updated() {
                true
            } else {
                lease.set_end_date(0);
                false
            }
        });
    }

    /// Max end date observed since the last `begin`.
    pub(crate) fn expiration_candidate(&self) -> u64 {
        self.expiration_candidate
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.leases.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.leases.len()
    }

    pub(crate) fn leases(&self) -> impl Iterator<Item = &Arc<Lease>> {
        self.leases.values()
    }

    /// Leases still usable at `now_ms`, excluding any matched by `exclude`.
    /// `with_threshold` adds the freshness threshold to each end date;
    /// otherwise the threshold is subtracted.
    pub(crate) fn non_expired_excluding_at(
        &self,
        now_ms: u64,
        exclude: &dyn Fn(&Lease) -> bool,
        with_threshold: bool,
    ) -> Vec<Arc<Lease>> {
        let mut out = Vec::new();
        for lease in self.leases.values() {
            let end_date = if with_threshold {
                lease.end_date().saturating_add(LEASE_END_DATE_THRESHOLD_MS)
            } else {
                lease.end_date().saturating_sub(LEASE_END_DATE_THRESHOLD_MS)
            };
            if now_ms < end_date && !exclude(lease) {
                out.push(Arc::clone(lease));
            }
        }
        out
    }

    /// True if any held lease's raw end date is past `now_ms`.
    pub(crate) fn has_expired_at(&self, now_ms: u64) -> bool {
        self.leases.values().any(|lease| lease.is_expired_at(now_ms))
    }
}

/// True if `now_ms` has reached `expiration_ms`, or is within `window_ms`
/// of it. Exact at the boundary: `now == expiration` expires.
pub(crate) fn expires_soon_at(now_ms: u64, expiration_ms: u64, window_ms: u64) -> bool {
    if now_ms >= expiration_ms {
        return true;
    }
    expiration_ms - now_ms <= window_ms
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockNetDb;

    const HOUR_MS: u64 = 3_600_000;

    fn reconcile(
        engine: &mut LeaseReconciler,
        incoming: &[(u8, u32, u64)],
        now: u64,
        netdb: &MockNetDb,
    ) {
        engine.begin(0);
        for &(gw, tid, end) in incoming {
            engine.update_lease(IdentHash([gw; 32]), tid, end, now, netdb);
        }
        engine.end();
    }

    /// Test: reconciliation is idempotent on identical input
    #[test]
    fn test_idempotent() {
        let netdb = MockNetDb::new();
        let mut engine = LeaseReconciler::new(true);
        let now = 1_000_000;
        let input = [(1u8, 1u32, now + HOUR_MS), (2, 2, now + HOUR_MS)];

        reconcile(&mut engine, &input, now, &netdb);
        let first: Vec<_> = engine.leases().map(|l| (l.key(), l.end_date())).collect();

        reconcile(&mut engine, &input, now, &netdb);
        let second: Vec<_> = engine.leases().map(|l| (l.key(), l.end_date())).collect();

        assert_eq!(first, second);
        assert_eq!(engine.len(), 2);
    }

    /// Test: mark/update/prune keeps survivors and zombifies the rest
    #[test]
    fn test_mark_update_prune() {
        let netdb = MockNetDb::new();
        let mut engine = LeaseReconciler::new(true);
        let now = 1_000_000;

        reconcile(
            &mut engine,
            &[(1, 1, now + HOUR_MS), (2, 2, now + HOUR_MS), (3, 3, now + HOUR_MS)],
            now,
            &netdb,
        );
        assert_eq!(engine.len(), 3);

        // Hold B across the update
        let held_b = engine
            .leases()
            .find(|l| l.gateway() == &IdentHash([2; 32]))
            .cloned()
            .unwrap();

        reconcile(&mut engine, &[(1, 1, now + 2 * HOUR_MS), (4, 4, now + HOUR_MS)], now, &netdb);

        let keys: Vec<u8> = engine.leases().map(|l| l.gateway().0[0]).collect();
        assert_eq!(keys, vec![1, 4]);

        // A was updated in place
        let a = engine.leases().next().unwrap();
        assert_eq!(a.end_date(), now + 2 * HOUR_MS);

        // B is observed as a zombie by its holder
        assert_eq!(held_b.end_date(), 0);
    }

    /// Test: an upsert on an existing key reuses the same allocation
    #[test]
    fn test_upsert_preserves_allocation() {
        let netdb = MockNetDb::new();
        let mut engine = LeaseReconciler::new(true);
        let now = 1_000_000;

        reconcile(&mut engine, &[(5, 9, now + HOUR_MS)], now, &netdb);
        let held = engine.leases().next().cloned().unwrap();

        reconcile(&mut engine, &[(5, 9, now + 3 * HOUR_MS)], now, &netdb);

        // Same Arc, new date
        assert_eq!(held.end_date(), now + 3 * HOUR_MS);
        assert!(Arc::ptr_eq(&held, engine.leases().next().unwrap()));
    }

    /// Test: stale incoming leases are discarded, not materialized
    #[test]
    fn test_stale_lease_discarded() {
        let netdb = MockNetDb::new();
        let mut engine = LeaseReconciler::new(true);
        let now = 1_000_000 + 10 * HOUR_MS;

        reconcile(&mut engine, &[(1, 1, now - HOUR_MS)], now, &netdb);

        assert!(engine.is_empty());
        assert_eq!(engine.expiration_candidate(), 0);
    }

    /// Test: a lease within the threshold window is still accepted
    #[test]
    fn test_threshold_window_accepted() {
        let netdb = MockNetDb::new();
        let mut engine = LeaseReconciler::new(true);
        let now = 1_000_000;

        // Ends 1ms ago, but the threshold keeps it alive for reconciliation
        reconcile(&mut engine, &[(1, 1, now - 1)], now, &netdb);

        assert_eq!(engine.len(), 1);
        assert_eq!(engine.expiration_candidate(), now - 1);
    }

    /// Test: unknown gateways trigger a fire-and-forget request
    #[test]
    fn test_unknown_gateway_requested() {
        let netdb = MockNetDb::new();
        netdb.add_router(IdentHash([1; 32]));
        let mut engine = LeaseReconciler::new(true);
        let now = 1_000_000;

        reconcile(&mut engine, &[(1, 1, now + HOUR_MS), (9, 9, now + HOUR_MS)], now, &netdb);

        assert_eq!(netdb.requested(), vec![IdentHash([9; 32])]);
    }

    /// Test: non-materializing mode clears the set and only tracks expiry
    #[test]
    fn test_non_materializing() {
        let netdb = MockNetDb::new();
        let mut engine = LeaseReconciler::new(false);
        let now = 1_000_000;

        reconcile(&mut engine, &[(1, 1, now + HOUR_MS)], now, &netdb);

        assert!(engine.is_empty());
        assert_eq!(engine.expiration_candidate(), now + HOUR_MS);
        assert!(netdb.requested().is_empty());
    }

    /// Test: raw end dates decide has_expired, with no threshold applied
    #[test]
    fn test_has_expired_raw_dates() {
        let netdb = MockNetDb::new();
        let mut engine = LeaseReconciler::new(true);
        let now = 1_000_000;

        // Alive for reconciliation thanks to the threshold, but its raw
        // end date is already past
        reconcile(&mut engine, &[(1, 1, now - 1), (2, 2, now + HOUR_MS)], now, &netdb);

        assert!(engine.has_expired_at(now));
        assert!(!engine.has_expired_at(now - 2));
    }

    /// Test: with zero window, expiry flips exactly at the boundary
    #[test]
    fn test_expires_soon_boundary() {
        assert!(!expires_soon_at(999, 1000, 0));
        assert!(expires_soon_at(1000, 1000, 0));
        assert!(expires_soon_at(1001, 1000, 0));

        // A window reaches back before the expiration
        assert!(expires_soon_at(900, 1000, 100));
        assert!(!expires_soon_at(899, 1000, 100));
    }

    /// Test: permissive selection is a superset of strict selection
    #[test]
    fn test_threshold_superset() {
        let netdb = MockNetDb::new();
        let mut engine = LeaseReconciler::new(true);
        let now = 1_000_000;

        // One comfortably fresh, one inside the threshold margin
        reconcile(
            &mut engine,
            &[(1, 1, now + HOUR_MS), (2, 2, now + LEASE_END_DATE_THRESHOLD_MS / 2)],
            now,
            &netdb,
        );

        let strict = engine.non_expired_excluding_at(now, &|_| false, false);
        let permissive = engine.non_expired_excluding_at(now, &|_| false, true);

        assert_eq!(strict.len(), 1);
        assert_eq!(permissive.len(), 2);
        for lease in &strict {
            assert!(permissive.iter().any(|p| p.key() == lease.key()));
        }
    }
}
