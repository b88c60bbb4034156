//! # v2 Reachability Records
//!
//! The versioned record family: **standard** (key sections + leases),
//! **meta** (references to other destinations, no leases), and
//! **encrypted** (body hidden behind a blinded key). All three share a
//! header carrying the published timestamp, a relative expiry, and an
//! optional offline-key delegation.
//!
//! ## Signature scope
//!
//! A v2 signature covers one synthetic leading byte holding the store-type
//! tag followed by every byte of the record through the end of the
//! type-specific tail. The tag byte is not part of the stored buffer; the
//! verifier receives an explicit scratch buffer `[store_type] ++ body`.

use super::cursor::Cursor;
use super::entities::{
    Lease, RecordBuffer, StoreType, LEASE2_SIZE, MAX_NUM_LEASES,
};
use super::errors::LeaseSetError;
use super::reconcile::{expires_soon_at, LeaseReconciler};
use crate::ports::inbound::LeaseHolding;
use crate::ports::outbound::{NetDbGateway, RecordIdentity};
use rand::Rng;
use shared_crypto::{create_encryptor, create_verifier, RecordEncryptor, RecordVerifier};
use shared_types::{time, IdentHash, TunnelId};
use std::ops::Range;
use std::sync::Arc;
use tracing::{debug, warn};

/// Flags bit 0: the record is signed by an offline delegate key.
const FLAG_OFFLINE_KEY: u16 = 0x0001;

/// Size of one meta-record entry: 32-byte hash + 3-byte flags + 1-byte
/// cost + 4-byte expiry.
const META_ENTRY_SIZE: usize = 40;

/// Outcome of reading the shared v2 header past the identity/blinded key.
struct HeaderV2 {
    /// (published + expires) in milliseconds.
    expiration_ms: u64,
    /// Delegate verifier, present and already certified when flag bit 0
    /// was set.
    offline_verifier: Option<Box<dyn RecordVerifier>>,
}

/// Read published timestamp, relative expiry, flags, and the optional
/// offline-key block. `verify_primary` checks the delegation signature
/// with the record's primary (identity or blinded) key, whose signature
/// length is `primary_sig_len`.
fn read_v2_header(
    cursor: &mut Cursor<'_>,
    primary_sig_len: usize,
    verify_primary: &dyn Fn(&[u8], &[u8]) -> bool,
) -> Result<HeaderV2, LeaseSetError> {
    let published = cursor.read_u32("published timestamp")? as u64;
    let expires = cursor.read_u16("relative expiry")? as u64;
    let expiration_ms = (published + expires) * 1000;
    let flags = cursor.read_u16("flags")?;

    let mut offline_verifier = None;
    if flags & FLAG_OFFLINE_KEY != 0 {
        let signed_start = cursor.offset();
        cursor.skip(4, "offline key expiry")?;
        let key_type = cursor.read_u16("offline key type")?;
        let mut verifier =
            create_verifier(key_type).ok_or(LeaseSetError::UnsupportedKeyType(key_type))?;
        let key_bytes = cursor.read_bytes(verifier.public_key_len(), "offline key")?;
        // The delegation is signed over (expiry, key type, key bytes)
        let signed = &cursor.consumed()[signed_start..];
        let signature = cursor.read_bytes(primary_sig_len, "offline key signature")?;
        if !verify_primary(signed, signature) {
            return Err(LeaseSetError::OfflineSignatureInvalid);
        }
        verifier
            .set_public_key(key_bytes)
            .map_err(|_| LeaseSetError::BadOfflineKey)?;
        offline_verifier = Some(verifier);
    }

    Ok(HeaderV2 {
        expiration_ms,
        offline_verifier,
    })
}

/// Verify a v2 signature over the scratch scope
/// `[store_type] ++ buf[..signature_offset]`.
fn verify_with_store_type(
    store_type: StoreType,
    buf: &[u8],
    signature_offset: usize,
    sig_len: usize,
    verify: &dyn Fn(&[u8], &[u8]) -> bool,
) -> bool {
    if signature_offset + sig_len > buf.len() {
        return false;
    }
    let mut scope = Vec::with_capacity(1 + signature_offset);
    scope.push(store_type.code());
    scope.extend_from_slice(&buf[..signature_offset]);
    verify(&scope, &buf[signature_offset..signature_offset + sig_len])
}

// =============================================================================
// STANDARD
// =============================================================================

/// A remotely-published standard v2 record.
pub struct LeaseSet2<I: RecordIdentity> {
    buffer: RecordBuffer,
    identity: Option<Arc<I>>,
    encryptor: Option<Box<dyn RecordEncryptor>>,
    reconciler: LeaseReconciler,
    expiration_time: u64,
    is_valid: bool,
    netdb: Arc<dyn NetDbGateway>,
}

impl<I: RecordIdentity> LeaseSet2<I> {
    /// Decode a standard v2 record from untrusted bytes. The outcome is
    /// reported by [`LeaseSet2::is_valid`].
    pub fn from_buffer(buf: &[u8], store_leases: bool, netdb: Arc<dyn NetDbGateway>) -> Self {
        let mut record = Self {
            buffer: RecordBuffer::from_slice(buf),
            identity: None,
            encryptor: None,
            reconciler: LeaseReconciler::new(store_leases),
            expiration_time: 0,
            is_valid: false,
            netdb,
        };
        record.read_from_buffer();
        record
    }

    /// Replace the contents with a fresh copy of the record and re-decode,
    /// reconciling the new lease list against the currently-held set.
    pub fn update(&mut self, buf: &[u8]) {
        self.buffer.set_contents(buf);
        self.read_from_buffer();
    }

    /// Switch a non-materializing record to materializing and decode the
    /// held buffer again to build the lease set.
    pub fn populate_leases(&mut self) {
        self.reconciler.set_store_leases(true);
        self.read_from_buffer();
    }

    fn read_from_buffer(&mut self) {
        self.is_valid = match self.try_read() {
            Ok(()) => true,
            Err(error) => {
                warn!(%error, "leaseset2 rejected");
                false
            }
        };
    }

    fn try_read(&mut self) -> Result<(), LeaseSetError> {
        let identity = Arc::new(I::from_buffer(self.buffer.as_slice())?);
        self.identity = Some(Arc::clone(&identity));
        let full_len = identity.full_len();
        if full_len > self.buffer.len() {
            return Err(LeaseSetError::IdentityTooLong {
                declared: full_len,
                buffer: self.buffer.len(),
            });
        }

        // Structural pass over header and type-specific tail.
        let (header, first_key, leases, signature_offset) = {
            let mut cursor = Cursor::new(self.buffer.as_slice());
            cursor.skip(full_len, "identity")?;
            let header = read_v2_header(&mut cursor, identity.signature_len(), &|data, sig| {
                identity.verify(data, sig)
            })?;

            let properties_len = cursor.read_u16("properties length")? as usize;
            cursor.skip(properties_len, "properties")?;

            let num_keys = cursor.read_u8("key section count")?;
            let mut first_key: Option<(u16, Vec<u8>)> = None;
            for _ in 0..num_keys {
                let key_type = cursor.read_u16("encryption key type")?;
                let key_len = cursor.read_u16("encryption key length")? as usize;
                let key_bytes = cursor.read_bytes(key_len, "encryption key")?;
                // Only the first key becomes the active encryptor
                if first_key.is_none() {
                    first_key = Some((key_type, key_bytes.to_vec()));
                }
            }

            let num_leases = cursor.read_u8("lease count")?;
            debug!(num_leases, "read lease count");
            if num_leases == 0 || num_leases as usize > MAX_NUM_LEASES {
                return Err(LeaseSetError::BadLeaseCount(num_leases));
            }
            let list_len = num_leases as usize * LEASE2_SIZE;
            if list_len > cursor.remaining() {
                return Err(LeaseSetError::Truncated {
                    what: "lease list",
                    needed: list_len,
                    available: cursor.remaining(),
                });
            }
            let mut leases: Vec<(IdentHash, TunnelId, u64)> =
                Vec::with_capacity(num_leases as usize);
            for _ in 0..num_leases {
                let gateway: [u8; 32] = cursor.read_array("lease gateway")?;
                let tunnel_id = cursor.read_u32("lease tunnel id")?;
                let end_date = cursor.read_u32("lease end date")? as u64 * 1000;
                leases.push((IdentHash(gateway), tunnel_id, end_date));
            }
            (header, first_key, leases, cursor.offset())
        };

        self.expiration_time = header.expiration_ms;
        if self.reconciler.store_leases() {
            let now = time::now_millis();
            self.reconciler.begin(header.expiration_ms);
            for (gateway, tunnel_id, end_date) in leases {
                self.reconciler
                    .update_lease(gateway, tunnel_id, end_date, now, &*self.netdb);
            }
            self.expiration_time = self.reconciler.expiration_candidate();
            self.reconciler.end();

            if self.encryptor.is_none() {
                if let Some((key_type, key_bytes)) = &first_key {
                    self.encryptor = create_encryptor(*key_type, key_bytes);
                }
            }
        }

        let buf = self.buffer.as_slice();
        let verified = match &header.offline_verifier {
            Some(delegate) => verify_with_store_type(
                StoreType::Standard,
                buf,
                signature_offset,
                delegate.signature_len(),
                &|data, sig| delegate.verify(data, sig),
            ),
            None => verify_with_store_type(
                StoreType::Standard,
                buf,
                signature_offset,
                identity.signature_len(),
                &|data, sig| identity.verify(data, sig),
            ),
        };
        if !verified {
            return Err(LeaseSetError::SignatureInvalid);
        }
        Ok(())
    }

    /// Encrypt `plaintext` to the record's first advertised key.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, LeaseSetError> {
        let encryptor = self.encryptor.as_ref().ok_or(LeaseSetError::NoEncryptor)?;
        encryptor
            .encrypt(plaintext)
            .map_err(|e| LeaseSetError::Encryption(e.to_string()))
    }

    /// True if header, tail, and signature all checked out.
    pub fn is_valid(&self) -> bool {
        self.is_valid
    }

    /// The referenced identity, once decoded.
    pub fn identity(&self) -> Option<&Arc<I>> {
        self.identity.as_ref()
    }

    /// The raw verified buffer.
    pub fn buffer(&self) -> &[u8] {
        self.buffer.as_slice()
    }

    /// Sub-format tag of this record.
    pub fn store_type(&self) -> StoreType {
        StoreType::Standard
    }

    /// True past the aggregate expiration at `now_ms`, or when
    /// materializing with an empty set.
    pub fn is_expired_at(&self, now_ms: u64) -> bool {
        if self.reconciler.store_leases() && self.reconciler.is_empty() {
            return true;
        }
        now_ms > self.expiration_time
    }

    /// Number of currently-held leases.
    pub fn lease_count(&self) -> usize {
        self.reconciler.len()
    }
}

impl<I: RecordIdentity> LeaseHolding for LeaseSet2<I> {
    fn non_expired_leases_excluding(
        &self,
        exclude: &dyn Fn(&Lease) -> bool,
        with_threshold: bool,
    ) -> Vec<Arc<Lease>> {
        self.reconciler
            .non_expired_excluding_at(time::now_millis(), exclude, with_threshold)
    }

    fn has_expired_leases(&self) -> bool {
        self.reconciler.has_expired_at(time::now_millis())
    }

    fn is_empty(&self) -> bool {
        self.reconciler.is_empty()
    }

    fn is_expired(&self) -> bool {
        self.is_expired_at(time::now_millis())
    }

    fn expiration_time(&self) -> u64 {
        self.expiration_time
    }

    fn expires_soon(&self, window_ms: u64, jitter_ms: u64) -> bool {
        let mut now = time::now_millis();
        if jitter_ms > 0 {
            now += rand::thread_rng().gen_range(0..jitter_ms);
        }
        expires_soon_at(now, self.expiration_time, window_ms)
    }
}

// =============================================================================
// META
// =============================================================================

/// A v2 record that references other destinations instead of advertising
/// ingress points. Never holds leases, deliberately does not implement
/// [`LeaseHolding`]. Entries and revocations are skipped by length
/// (explicit non-interpretation), only the signature and structure are
/// checked.
pub struct MetaRecord<I: RecordIdentity> {
    buffer: RecordBuffer,
    identity: Option<Arc<I>>,
    expiration_time: u64,
    signed_body_len: usize,
    is_valid: bool,
}

impl<I: RecordIdentity> MetaRecord<I> {
    /// Decode a meta record from untrusted bytes.
    pub fn from_buffer(buf: &[u8]) -> Self {
        let mut record = Self {
            buffer: RecordBuffer::from_slice(buf),
            identity: None,
            expiration_time: 0,
            signed_body_len: 0,
            is_valid: false,
        };
        record.is_valid = match record.try_read() {
            Ok(()) => true,
            Err(error) => {
                warn!(%error, "meta leaseset rejected");
                false
            }
        };
        record
    }

    fn try_read(&mut self) -> Result<(), LeaseSetError> {
        let identity = Arc::new(I::from_buffer(self.buffer.as_slice())?);
        self.identity = Some(Arc::clone(&identity));
        let full_len = identity.full_len();
        if full_len > self.buffer.len() {
            return Err(LeaseSetError::IdentityTooLong {
                declared: full_len,
                buffer: self.buffer.len(),
            });
        }

        let buf = self.buffer.as_slice();
        let mut cursor = Cursor::new(buf);
        cursor.skip(full_len, "identity")?;
        let header = read_v2_header(&mut cursor, identity.signature_len(), &|data, sig| {
            identity.verify(data, sig)
        })?;
        self.expiration_time = header.expiration_ms;

        read_meta_tail(&mut cursor)?;
        let signature_offset = cursor.offset();
        self.signed_body_len = signature_offset;

        let verified = match &header.offline_verifier {
            Some(delegate) => verify_with_store_type(
                StoreType::Meta,
                buf,
                signature_offset,
                delegate.signature_len(),
                &|data, sig| delegate.verify(data, sig),
            ),
            None => verify_with_store_type(
                StoreType::Meta,
                buf,
                signature_offset,
                identity.signature_len(),
                &|data, sig| identity.verify(data, sig),
            ),
        };
        if !verified {
            return Err(LeaseSetError::SignatureInvalid);
        }
        Ok(())
    }

    /// True if structure and signature checked out.
    pub fn is_valid(&self) -> bool {
        self.is_valid
    }

    /// The referenced identity, once decoded.
    pub fn identity(&self) -> Option<&Arc<I>> {
        self.identity.as_ref()
    }

    /// Aggregate expiration in milliseconds, from the header only.
    pub fn expiration_time(&self) -> u64 {
        self.expiration_time
    }

    /// The raw verified buffer.
    pub fn buffer(&self) -> &[u8] {
        self.buffer.as_slice()
    }

    /// Bytes consumed before the signature (header plus tail).
    pub fn signed_body_len(&self) -> usize {
        self.signed_body_len
    }

    /// True past the header expiration at `now_ms`.
    pub fn is_expired_at(&self, now_ms: u64) -> bool {
        now_ms > self.expiration_time
    }

    /// True past the header expiration.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(time::now_millis())
    }
}

/// Walk the meta tail: properties, entries, revocations. Consumes the tail
/// from `cursor`; nothing is materialized.
fn read_meta_tail(cursor: &mut Cursor<'_>) -> Result<(), LeaseSetError> {
    let properties_len = cursor.read_u16("properties length")? as usize;
    cursor.skip(properties_len, "properties")?;

    let num_entries = cursor.read_u8("entry count")?;
    if num_entries == 0 {
        return Err(LeaseSetError::EmptyMetaRecord);
    }
    cursor.skip(num_entries as usize * META_ENTRY_SIZE, "entries")?;

    let num_revocations = cursor.read_u8("revocation count")?;
    cursor.skip(num_revocations as usize * 32, "revocations")?;
    Ok(())
}

// =============================================================================
// ENCRYPTED
// =============================================================================

/// A v2 record addressed by a blinded verifying key. The outer ciphertext
/// is carried opaquely; its decryption into an inner standard record is an
/// external concern. Only the blinded/offline signature and the structure
/// are checked here.
pub struct EncryptedRecord {
    buffer: RecordBuffer,
    blinded_key_type: u16,
    blinded_key: Vec<u8>,
    outer_ciphertext: Range<usize>,
    expiration_time: u64,
    is_valid: bool,
}

impl EncryptedRecord {
    /// Decode an encrypted record from untrusted bytes.
    pub fn from_buffer(buf: &[u8]) -> Self {
        let mut record = Self {
            buffer: RecordBuffer::from_slice(buf),
            blinded_key_type: 0,
            blinded_key: Vec::new(),
            outer_ciphertext: 0..0,
            expiration_time: 0,
            is_valid: false,
        };
        record.is_valid = match record.try_read() {
            Ok(()) => true,
            Err(error) => {
                warn!(%error, "encrypted leaseset rejected");
                false
            }
        };
        record
    }

    fn try_read(&mut self) -> Result<(), LeaseSetError> {
        let buf = self.buffer.as_slice();
        let mut cursor = Cursor::new(buf);

        // Blinded verifying key in place of a structured identity
        let blinded_key_type = cursor.read_u16("blinded key type")?;
        let mut blinded = create_verifier(blinded_key_type)
            .ok_or(LeaseSetError::UnsupportedKeyType(blinded_key_type))?;
        let blinded_key = cursor
            .read_bytes(blinded.public_key_len(), "blinded key")?
            .to_vec();
        blinded
            .set_public_key(&blinded_key)
            .map_err(|_| LeaseSetError::BadIdentity("blinded key"))?;

        let header = read_v2_header(&mut cursor, blinded.signature_len(), &|data, sig| {
            blinded.verify(data, sig)
        })?;

        // Outer ciphertext is skipped wholesale; decryption is external
        let ciphertext_len = cursor.read_u16("outer ciphertext length")? as usize;
        let ciphertext_start = cursor.offset();
        cursor.skip(ciphertext_len, "outer ciphertext")?;
        let signature_offset = cursor.offset();

        let verified = match &header.offline_verifier {
            Some(delegate) => verify_with_store_type(
                StoreType::Encrypted,
                buf,
                signature_offset,
                delegate.signature_len(),
                &|data, sig| delegate.verify(data, sig),
            ),
            None => verify_with_store_type(
                StoreType::Encrypted,
                buf,
                signature_offset,
                blinded.signature_len(),
                &|data, sig| blinded.verify(data, sig),
            ),
        };
        if !verified {
            return Err(LeaseSetError::SignatureInvalid);
        }

        self.blinded_key_type = blinded_key_type;
        self.blinded_key = blinded_key;
        self.outer_ciphertext = ciphertext_start..ciphertext_start + ciphertext_len;
        self.expiration_time = header.expiration_ms;
        Ok(())
    }

    /// True if structure and signature checked out.
    pub fn is_valid(&self) -> bool {
        self.is_valid
    }

    /// The raw verified buffer.
    pub fn buffer(&self) -> &[u8] {
        self.buffer.as_slice()
    }

    /// Signature type code of the blinded key.
    pub fn blinded_key_type(&self) -> u16 {
        self.blinded_key_type
    }

    /// Raw blinded verifying key bytes.
    pub fn blinded_key(&self) -> &[u8] {
        &self.blinded_key
    }

    /// The opaque outer ciphertext, for external decryption into an inner
    /// standard record.
    pub fn outer_ciphertext(&self) -> &[u8] {
        &self.buffer.as_slice()[self.outer_ciphertext.clone()]
    }

    /// Aggregate expiration in milliseconds, from the header only.
    pub fn expiration_time(&self) -> u64 {
        self.expiration_time
    }

    /// True past the header expiration at `now_ms`.
    pub fn is_expired_at(&self, now_ms: u64) -> bool {
        now_ms > self.expiration_time
    }

    /// True past the header expiration.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(time::now_millis())
    }
}
