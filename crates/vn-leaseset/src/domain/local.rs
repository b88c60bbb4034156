//! # Local Record Construction
//!
//! Builds the node's own record from its identity, an encryption key, and
//! a bounded list of locally built inbound tunnels. The buffer is left
//! unsigned; signing and republish scheduling are external
//! responsibilities. Not validated against itself, trusted because
//! self-authored.

use super::entities::{StoreType, ENCRYPTION_KEY_LEN, LEASE2_SIZE, LEASE_SIZE, MAX_NUM_LEASES};
use super::errors::LeaseSetError;
use crate::ports::outbound::{
    InboundTunnelInfo, RecordIdentity, TUNNEL_EXPIRATION_THRESHOLD_SECS, TUNNEL_LIFETIME_SECS,
};
use shared_types::{time, IdentHash};
use std::sync::Arc;

/// The node's own legacy record, unsigned.
pub struct LocalLeaseSet<I: RecordIdentity> {
    identity: Arc<I>,
    buffer: Vec<u8>,
    expiration_time: u64,
}

impl<I: RecordIdentity> LocalLeaseSet<I> {
    /// Serialize a record advertising up to [`MAX_NUM_LEASES`] of the
    /// given tunnels. Each lease's end date is the tunnel's nominal expiry
    /// minus the safety margin, nudged forward proportionally to the
    /// tunnel's age so successive republications of an unchanged tunnel
    /// set still compare strictly newer under the minimum-based rule.
    pub fn new(
        identity: Arc<I>,
        encryption_key: &[u8; ENCRYPTION_KEY_LEN],
        tunnels: &[Arc<dyn InboundTunnelInfo>],
    ) -> Self {
        let num = tunnels.len().min(MAX_NUM_LEASES);
        let signing_key_len = identity.signing_public_key_len();
        let signature_len = identity.signature_len();
        let mut buffer = Vec::with_capacity(
            identity.full_len() + ENCRYPTION_KEY_LEN + signing_key_len + 1 + num * LEASE_SIZE
                + signature_len,
        );

        identity.write_to(&mut buffer);
        buffer.extend_from_slice(encryption_key);
        // Unused transient signing key
        buffer.resize(buffer.len() + signing_key_len, 0);
        buffer.push(num as u8);

        let current_ms = time::now_millis();
        let mut expiration_time = 0u64;
        for tunnel in tunnels.iter().take(num) {
            buffer.extend_from_slice(tunnel.next_ident_hash().as_bytes());
            buffer.extend_from_slice(&tunnel.next_tunnel_id().to_be_bytes());
            let mut end_date = (tunnel.creation_time() + TUNNEL_LIFETIME_SECS
                - TUNNEL_EXPIRATION_THRESHOLD_SECS)
                * 1000;
            if end_date > expiration_time {
                expiration_time = end_date;
            }
            // Up to ~2s, growing with tunnel age
            end_date += current_ms.saturating_sub(tunnel.creation_time() * 1000) * 2
                / TUNNEL_LIFETIME_SECS;
            buffer.extend_from_slice(&end_date.to_be_bytes());
        }

        // Signature slot, filled externally
        buffer.resize(buffer.len() + signature_len, 0);

        Self {
            identity,
            buffer,
            expiration_time,
        }
    }

    /// Re-load a previously serialized record (e.g. from persistence).
    /// The expiration is unknown until the buffer is decoded remotely.
    pub fn from_buffer(identity: Arc<I>, buf: &[u8]) -> Self {
        Self {
            identity,
            buffer: buf.to_vec(),
            expiration_time: 0,
        }
    }

    /// Full serialized record, including the signature slot.
    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    /// The span the external signer must sign.
    pub fn unsigned_payload(&self) -> &[u8] {
        &self.buffer[..self.buffer.len() - self.identity.signature_len()]
    }

    /// Install the externally produced signature.
    pub fn apply_signature(&mut self, signature: &[u8]) -> Result<(), LeaseSetError> {
        let signature_len = self.identity.signature_len();
        if signature.len() != signature_len {
            return Err(LeaseSetError::BadSignatureLength {
                expected: signature_len,
                actual: signature.len(),
            });
        }
        let offset = self.buffer.len() - signature_len;
        self.buffer[offset..].copy_from_slice(signature);
        Ok(())
    }

    /// The owning identity.
    pub fn identity(&self) -> &Arc<I> {
        &self.identity
    }

    /// Lookup hash this record is published under.
    pub fn ident_hash(&self) -> IdentHash {
        self.identity.ident_hash()
    }

    /// Max advertised end date in milliseconds (un-nudged).
    pub fn expiration_time(&self) -> u64 {
        self.expiration_time
    }

    /// True past the aggregate expiration at `now_ms`.
    pub fn is_expired_at(&self, now_ms: u64) -> bool {
        now_ms > self.expiration_time
    }

    /// True past the aggregate expiration.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(time::now_millis())
    }
}

/// The node's own standard v2 record, unsigned.
///
/// The v2 signature scope starts with a synthetic store-type byte that is
/// not part of the stored buffer; [`LocalLeaseSet2::signing_scope`]
/// assembles the exact bytes the external signer must sign.
pub struct LocalLeaseSet2<I: RecordIdentity> {
    store_type: StoreType,
    identity: Arc<I>,
    buffer: Vec<u8>,
    expiration_time: u64,
}

impl<I: RecordIdentity> LocalLeaseSet2<I> {
    /// Serialize a standard v2 record: header with zero flags, empty
    /// properties, exactly one key section, and up to [`MAX_NUM_LEASES`]
    /// leases with second-granularity end dates. The header's relative
    /// expiry is the max end date minus the published timestamp, clamped
    /// to non-negative.
    pub fn new(
        store_type: StoreType,
        identity: Arc<I>,
        key_type: u16,
        encryption_public_key: &[u8],
        tunnels: &[Arc<dyn InboundTunnelInfo>],
    ) -> Self {
        let num = tunnels.len().min(MAX_NUM_LEASES);
        let key_len = encryption_public_key.len();
        let signature_len = identity.signature_len();
        let mut buffer = Vec::with_capacity(
            identity.full_len()
                + 4 // published
                + 2 // expires
                + 2 // flags
                + 2 // properties length
                + 1 // key section count
                + 2 // key type
                + 2 // key length
                + key_len
                + 1 // lease count
                + num * LEASE2_SIZE
                + signature_len,
        );

        identity.write_to(&mut buffer);
        let published = time::now_secs();
        buffer.extend_from_slice(&(published as u32).to_be_bytes());
        let expires_slot = buffer.len();
        buffer.extend_from_slice(&0u16.to_be_bytes()); // expires, patched below
        buffer.extend_from_slice(&0u16.to_be_bytes()); // flags
        buffer.extend_from_slice(&0u16.to_be_bytes()); // properties length

        buffer.push(1); // one key section
        buffer.extend_from_slice(&key_type.to_be_bytes());
        buffer.extend_from_slice(&(key_len as u16).to_be_bytes());
        buffer.extend_from_slice(encryption_public_key);

        buffer.push(num as u8);
        let mut expiration_secs = 0u64;
        for tunnel in tunnels.iter().take(num) {
            buffer.extend_from_slice(tunnel.next_ident_hash().as_bytes());
            buffer.extend_from_slice(&tunnel.next_tunnel_id().to_be_bytes());
            let end_date = tunnel.creation_time() + TUNNEL_LIFETIME_SECS
                - TUNNEL_EXPIRATION_THRESHOLD_SECS;
            if end_date > expiration_secs {
                expiration_secs = end_date;
            }
            buffer.extend_from_slice(&(end_date as u32).to_be_bytes());
        }

        let expires = expiration_secs
            .saturating_sub(published)
            .min(u64::from(u16::MAX)) as u16;
        buffer[expires_slot..expires_slot + 2].copy_from_slice(&expires.to_be_bytes());

        // Signature slot, filled externally
        buffer.resize(buffer.len() + signature_len, 0);

        Self {
            store_type,
            identity,
            buffer,
            expiration_time: expiration_secs * 1000,
        }
    }

    /// Full serialized record, including the signature slot.
    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    /// Sub-format tag mixed into the signature scope.
    pub fn store_type(&self) -> StoreType {
        self.store_type
    }

    /// The exact bytes the external signer must sign:
    /// `[store_type] ++ payload`.
    pub fn signing_scope(&self) -> Vec<u8> {
        let unsigned = self.buffer.len() - self.identity.signature_len();
        let mut scope = Vec::with_capacity(1 + unsigned);
        scope.push(self.store_type.code());
        scope.extend_from_slice(&self.buffer[..unsigned]);
        scope
    }

    /// Install the externally produced signature.
    pub fn apply_signature(&mut self, signature: &[u8]) -> Result<(), LeaseSetError> {
        let signature_len = self.identity.signature_len();
        if signature.len() != signature_len {
            return Err(LeaseSetError::BadSignatureLength {
                expected: signature_len,
                actual: signature.len(),
            });
        }
        let offset = self.buffer.len() - signature_len;
        self.buffer[offset..].copy_from_slice(signature);
        Ok(())
    }

    /// The owning identity.
    pub fn identity(&self) -> &Arc<I> {
        &self.identity
    }

    /// Max advertised end date in milliseconds.
    pub fn expiration_time(&self) -> u64 {
        self.expiration_time
    }

    /// True past the aggregate expiration at `now_ms`.
    pub fn is_expired_at(&self, now_ms: u64) -> bool {
        now_ms > self.expiration_time
    }

    /// True past the aggregate expiration.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(time::now_millis())
    }
}
