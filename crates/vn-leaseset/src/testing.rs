//! # Test Support
//!
//! Mock collaborators and wire-format builders shared by this crate's
//! tests. Builders produce fully signed record buffers from real keys so
//! signature paths are exercised end to end.

use crate::adapters::identity::NetIdentity;
use crate::domain::entities::StoreType;
use crate::ports::outbound::{InboundTunnelInfo, NetDbGateway, RecordIdentity};
use shared_crypto::{create_signer, EncType, RecordSigner, SealedBoxDecryptor, SigType};
use shared_types::{IdentHash, TunnelId};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// In-memory network database recording lookup traffic.
#[derive(Default)]
pub struct MockNetDb {
    routers: Mutex<HashSet<IdentHash>>,
    requested: Mutex<Vec<IdentHash>>,
}

impl MockNetDb {
    /// Empty database.
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared empty database.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Mark a router as locally known.
    pub fn add_router(&self, hash: IdentHash) {
        self.routers.lock().unwrap().insert(hash);
    }

    /// Hashes requested so far, in order.
    pub fn requested(&self) -> Vec<IdentHash> {
        self.requested.lock().unwrap().clone()
    }
}

impl NetDbGateway for MockNetDb {
    fn find_router(&self, hash: &IdentHash) -> bool {
        self.routers.lock().unwrap().contains(hash)
    }

    fn request_destination(&self, hash: &IdentHash) {
        self.requested.lock().unwrap().push(*hash);
    }
}

/// Fixed-value inbound tunnel.
pub struct FixedTunnel {
    /// Entry router hash.
    pub gateway: IdentHash,
    /// Tunnel id at the entry router.
    pub tunnel_id: TunnelId,
    /// Creation time, seconds since epoch.
    pub created_secs: u64,
}

impl InboundTunnelInfo for FixedTunnel {
    fn next_ident_hash(&self) -> IdentHash {
        self.gateway
    }

    fn next_tunnel_id(&self) -> TunnelId {
        self.tunnel_id
    }

    fn creation_time(&self) -> u64 {
        self.created_secs
    }
}

/// Fresh Ed25519 destination: identity plus the matching signer.
pub fn test_destination() -> (Arc<NetIdentity>, Box<dyn RecordSigner>) {
    let signer = create_signer(SigType::Ed25519);
    let identity = NetIdentity::new(
        SigType::Ed25519,
        EncType::SealedBox.code(),
        signer.public_key(),
    )
    .expect("signer key length matches");
    (Arc::new(identity), signer)
}

/// A valid sealed-box public key padded into the legacy 256-byte field.
pub fn padded_encryption_key() -> [u8; 256] {
    let decryptor = SealedBoxDecryptor::generate();
    let mut key = [0u8; 256];
    key[..33].copy_from_slice(&decryptor.public_key());
    key
}

/// Serialize and sign a legacy record.
pub fn build_legacy_record(
    identity: &NetIdentity,
    signer: &dyn RecordSigner,
    encryption_key: &[u8; 256],
    leases: &[(IdentHash, TunnelId, u64)],
) -> Vec<u8> {
    let mut buf = Vec::new();
    identity.write_to(&mut buf);
    buf.extend_from_slice(encryption_key);
    buf.resize(buf.len() + identity.signing_public_key_len(), 0);
    buf.push(leases.len() as u8);
    for (gateway, tunnel_id, end_date_ms) in leases {
        buf.extend_from_slice(gateway.as_bytes());
        buf.extend_from_slice(&tunnel_id.to_be_bytes());
        buf.extend_from_slice(&end_date_ms.to_be_bytes());
    }
    let signature = signer.sign(&buf);
    buf.extend_from_slice(&signature);
    buf
}

/// Offline-key delegation carried in a v2 header.
pub struct OfflineDelegation<'a> {
    /// Delegation expiry, seconds since epoch.
    pub expires_secs: u32,
    /// The delegate key that signs the record body.
    pub signer: &'a dyn RecordSigner,
}

/// Append a v2 header (published/expires/flags and optional offline key
/// block, certified by `primary`) to `buf`.
fn push_v2_header(
    buf: &mut Vec<u8>,
    published_secs: u32,
    expires_secs: u16,
    primary: &dyn RecordSigner,
    offline: Option<&OfflineDelegation<'_>>,
) {
    buf.extend_from_slice(&published_secs.to_be_bytes());
    buf.extend_from_slice(&expires_secs.to_be_bytes());
    buf.extend_from_slice(&(if offline.is_some() { 1u16 } else { 0u16 }).to_be_bytes());
    if let Some(delegation) = offline {
        let block_start = buf.len();
        buf.extend_from_slice(&delegation.expires_secs.to_be_bytes());
        buf.extend_from_slice(&delegation.signer.sig_type().code().to_be_bytes());
        buf.extend_from_slice(&delegation.signer.public_key());
        let delegation_sig = primary.sign(&buf[block_start..]);
        buf.extend_from_slice(&delegation_sig);
    }
}

/// Sign a v2 payload over the `[store_type] ++ payload` scope.
fn sign_v2(store_type: StoreType, payload: &[u8], signer: &dyn RecordSigner) -> Vec<u8> {
    let mut scope = Vec::with_capacity(1 + payload.len());
    scope.push(store_type.code());
    scope.extend_from_slice(payload);
    signer.sign(&scope)
}

/// Serialize and sign a standard v2 record with full control over the
/// header, properties, key sections, and leases.
#[allow(clippy::too_many_arguments)]
pub fn build_standard_record_full(
    identity: &NetIdentity,
    signer: &dyn RecordSigner,
    published_secs: u32,
    expires_secs: u16,
    properties: &[u8],
    keys: &[(u16, Vec<u8>)],
    leases: &[(IdentHash, TunnelId, u32)],
    offline: Option<&OfflineDelegation<'_>>,
) -> Vec<u8> {
    let mut buf = Vec::new();
    identity.write_to(&mut buf);
    push_v2_header(&mut buf, published_secs, expires_secs, signer, offline);

    buf.extend_from_slice(&(properties.len() as u16).to_be_bytes());
    buf.extend_from_slice(properties);

    buf.push(keys.len() as u8);
    for (key_type, key_bytes) in keys {
        buf.extend_from_slice(&key_type.to_be_bytes());
        buf.extend_from_slice(&(key_bytes.len() as u16).to_be_bytes());
        buf.extend_from_slice(key_bytes);
    }

    buf.push(leases.len() as u8);
    for (gateway, tunnel_id, end_date_secs) in leases {
        buf.extend_from_slice(gateway.as_bytes());
        buf.extend_from_slice(&tunnel_id.to_be_bytes());
        buf.extend_from_slice(&end_date_secs.to_be_bytes());
    }

    let body_signer = offline.map(|d| d.signer).unwrap_or(signer);
    let signature = sign_v2(StoreType::Standard, &buf, body_signer);
    buf.extend_from_slice(&signature);
    buf
}

/// Serialize and sign a standard v2 record with one sealed-box key and no
/// properties or offline delegation.
pub fn build_standard_record(
    identity: &NetIdentity,
    signer: &dyn RecordSigner,
    published_secs: u32,
    expires_secs: u16,
    leases: &[(IdentHash, TunnelId, u32)],
) -> Vec<u8> {
    let decryptor = SealedBoxDecryptor::generate();
    build_standard_record_full(
        identity,
        signer,
        published_secs,
        expires_secs,
        &[],
        &[(EncType::SealedBox.code(), decryptor.public_key().to_vec())],
        leases,
        None,
    )
}

/// Serialize and sign a meta v2 record with dummy entry and revocation
/// contents.
pub fn build_meta_record(
    identity: &NetIdentity,
    signer: &dyn RecordSigner,
    published_secs: u32,
    expires_secs: u16,
    num_entries: u8,
    num_revocations: u8,
) -> Vec<u8> {
    let mut buf = Vec::new();
    identity.write_to(&mut buf);
    push_v2_header(&mut buf, published_secs, expires_secs, signer, None);

    buf.extend_from_slice(&0u16.to_be_bytes()); // properties length
    buf.push(num_entries);
    buf.resize(buf.len() + num_entries as usize * 40, 0xEE);
    buf.push(num_revocations);
    buf.resize(buf.len() + num_revocations as usize * 32, 0xDD);

    let signature = sign_v2(StoreType::Meta, &buf, signer);
    buf.extend_from_slice(&signature);
    buf
}

/// Serialize and sign an encrypted v2 record addressed by a blinded key.
pub fn build_encrypted_record(
    blinded_signer: &dyn RecordSigner,
    published_secs: u32,
    expires_secs: u16,
    outer_ciphertext: &[u8],
    offline: Option<&OfflineDelegation<'_>>,
) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(&blinded_signer.sig_type().code().to_be_bytes());
    buf.extend_from_slice(&blinded_signer.public_key());
    push_v2_header(&mut buf, published_secs, expires_secs, blinded_signer, offline);

    buf.extend_from_slice(&(outer_ciphertext.len() as u16).to_be_bytes());
    buf.extend_from_slice(outer_ciphertext);

    let body_signer = offline.map(|d| d.signer).unwrap_or(blinded_signer);
    let signature = sign_v2(StoreType::Encrypted, &buf, body_signer);
    buf.extend_from_slice(&signature);
    buf
}
