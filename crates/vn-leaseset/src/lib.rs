//! # Reachability Records (LeaseSets)
//!
//! Parsing, validation, lifecycle management, and local construction of a
//! destination's published reachability record: a signed document mapping a
//! network identity to a small set of ingress tunnels ("leases") plus the
//! encryption key(s) needed to address it.
//!
//! ## Architecture
//!
//! This subsystem follows hexagonal architecture:
//! - **Domain Layer** (`domain/`): wire decoding, lease reconciliation,
//!   freshness math, local record construction. No I/O.
//! - **Ports Layer** (`ports/`): trait definitions for the query surface and
//!   the external collaborators (identity, network database, tunnels).
//! - **Adapters Layer** (`adapters/`): the concrete identity implementation
//!   backed by `shared-crypto`.
//! - **Service Layer** (`service.rs`): store-type dispatch and wiring.
//!
//! ## Security Notes
//!
//! - Records arrive as untrusted network bytes; every field read is bounds
//!   checked before it is dereferenced, and any structural failure marks the
//!   record invalid without touching memory outside the buffer.
//! - Signature verification gates `is_valid`, but lease state reconciled
//!   from a well-formed payload is retained even when the signature fails;
//!   callers must check validity before routing through a record.

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod service;
pub mod testing;

// Re-export public API
pub use adapters::identity::NetIdentity;
pub use domain::entities::{
    Lease, LeaseKey, RecordBuffer, StoreType, ENCRYPTION_KEY_LEN, LEASE2_SIZE,
    LEASE_END_DATE_THRESHOLD_MS, LEASE_SIZE, MAX_NUM_LEASES,
};
pub use domain::errors::LeaseSetError;
pub use domain::lease_set::LeaseSet;
pub use domain::lease_set2::{EncryptedRecord, LeaseSet2, MetaRecord};
pub use domain::local::{LocalLeaseSet, LocalLeaseSet2};
pub use domain::record::RemoteRecord;
pub use domain::validator::validate_lease_set_buffer;
pub use ports::inbound::LeaseHolding;
pub use ports::outbound::{
    InboundTunnelInfo, NetDbGateway, RecordIdentity, TUNNEL_EXPIRATION_THRESHOLD_SECS,
    TUNNEL_LIFETIME_SECS,
};
pub use service::LeaseSetService;
