//! # Outbound Ports (Driven Ports / SPI)
//!
//! Traits for the collaborators this subsystem consumes: the public-key
//! identity type, the network database, and the tunnel pool. The concrete
//! identity adapter lives in this crate; the others are owned by their own
//! subsystems.

use crate::domain::errors::LeaseSetError;
use shared_crypto::RecordEncryptor;
use shared_types::{IdentHash, TunnelId};

/// Lifetime of an inbound tunnel from creation, in seconds.
pub const TUNNEL_LIFETIME_SECS: u64 = 600;

/// Margin before a tunnel's nominal expiry at which it stops being
/// advertised, in seconds.
pub const TUNNEL_EXPIRATION_THRESHOLD_SECS: u64 = 60;

/// A destination's public-key identity.
///
/// The identity owns signature verification and key handling; this
/// subsystem only needs its wire lengths and the narrow operations below.
/// `from_buffer` must fail if the buffer is shorter than the identity's
/// self-declared length.
pub trait RecordIdentity: Sized + Send + Sync {
    /// Parse an identity from the head of `buf`.
    fn from_buffer(buf: &[u8]) -> Result<Self, LeaseSetError>;

    /// Serialized length of this identity.
    fn full_len(&self) -> usize;

    /// Length of the (legacy, unused) transient signing key field that
    /// follows the encryption key on the wire.
    fn signing_public_key_len(&self) -> usize;

    /// Signature length of this identity's algorithm.
    fn signature_len(&self) -> usize;

    /// Verify `signature` over `data` with this identity's key.
    fn verify(&self, data: &[u8], signature: &[u8]) -> bool;

    /// Build an encryptor for the record's advertised key material, or
    /// `None` if the material does not parse for this identity's
    /// encryption type.
    fn create_encryptor(&self, key_material: &[u8]) -> Option<Box<dyn RecordEncryptor>>;

    /// Append the serialized identity to `out`.
    fn write_to(&self, out: &mut Vec<u8>);

    /// Lookup hash of this identity.
    fn ident_hash(&self) -> IdentHash;
}

/// Gateway to the network-identity database.
///
/// `request_destination` is fire-and-forget: implementations must queue the
/// request internally and return immediately. It is invoked from inside
/// record decoding, so a blocking or fallible implementation would stall
/// the receive path.
pub trait NetDbGateway: Send + Sync {
    /// True if the router `hash` is already known locally.
    fn find_router(&self, hash: &IdentHash) -> bool;

    /// Ask the network for the router `hash`. Must not block.
    fn request_destination(&self, hash: &IdentHash);
}

/// View of one locally-built inbound tunnel, as advertised in a local
/// record.
pub trait InboundTunnelInfo: Send + Sync {
    /// Identity hash of the tunnel's entry router.
    fn next_ident_hash(&self) -> IdentHash;

    /// Tunnel id at the entry router.
    fn next_tunnel_id(&self) -> TunnelId;

    /// Tunnel creation time, seconds since epoch.
    fn creation_time(&self) -> u64;
}
