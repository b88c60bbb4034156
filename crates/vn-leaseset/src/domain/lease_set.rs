//! # Legacy Reachability Record
//!
//! Decode and lifecycle of the original record format: identity, 256-byte
//! encryption key, an unused transient signing key, and up to 16 leases
//! with millisecond end dates, followed by the identity's signature over
//! everything before it.
//!
//! The record is built from untrusted bytes. Structural or cryptographic
//! failure marks it invalid; it never panics and never reads out of
//! bounds. Lease state reconciled from a well-formed payload is retained
//! even when the signature fails; callers gate on [`LeaseSet::is_valid`].

use super::cursor::Cursor;
use super::entities::{
    Lease, RecordBuffer, ENCRYPTION_KEY_LEN, LEASE_END_DATE_THRESHOLD_MS, LEASE_SIZE,
    MAX_NUM_LEASES,
};
use super::errors::LeaseSetError;
use super::reconcile::{expires_soon_at, LeaseReconciler};
use crate::ports::inbound::LeaseHolding;
use crate::ports::outbound::{NetDbGateway, RecordIdentity};
use rand::Rng;
use shared_types::{time, IdentHash, TunnelId};
use std::sync::Arc;
use tracing::{debug, warn};

/// A remotely-published legacy record.
pub struct LeaseSet<I: RecordIdentity> {
    buffer: RecordBuffer,
    identity: Option<Arc<I>>,
    encryption_key: Option<Box<[u8; ENCRYPTION_KEY_LEN]>>,
    reconciler: LeaseReconciler,
    expiration_time: u64,
    is_valid: bool,
    netdb: Arc<dyn NetDbGateway>,
}

impl<I: RecordIdentity> LeaseSet<I> {
    /// Empty, invalid record; populated later via [`LeaseSet::update`].
    pub fn empty(store_leases: bool, netdb: Arc<dyn NetDbGateway>) -> Self {
        Self {
            buffer: RecordBuffer::new(),
            identity: None,
            encryption_key: None,
            reconciler: LeaseReconciler::new(store_leases),
            expiration_time: 0,
            is_valid: false,
            netdb,
        }
    }

    /// Decode a record from untrusted bytes, verifying its signature.
    /// The outcome is reported by [`LeaseSet::is_valid`].
    pub fn from_buffer(buf: &[u8], store_leases: bool, netdb: Arc<dyn NetDbGateway>) -> Self {
        let mut record = Self::empty(store_leases, netdb);
        record.buffer.set_contents(buf);
        record.read_from_buffer(true, true);
        record
    }

    /// Replace the contents with a fresh copy of the record and re-decode,
    /// reconciling the new lease list against the currently-held set.
    pub fn update(&mut self, buf: &[u8], verify_signature: bool) {
        self.buffer.set_contents(buf);
        self.read_from_buffer(false, verify_signature);
    }

    /// Switch a non-materializing record to materializing and decode the
    /// held buffer again to build the lease set.
    pub fn populate_leases(&mut self) {
        self.reconciler.set_store_leases(true);
        self.read_from_buffer(false, true);
    }

    /// Replace the stored raw buffer without re-decoding.
    pub fn set_buffer(&mut self, buf: &[u8]) {
        self.buffer.set_contents(buf);
    }

    fn read_from_buffer(&mut self, read_identity: bool, verify_signature: bool) {
        self.is_valid = true;
        if let Err(error) = self.try_read(read_identity, verify_signature) {
            warn!(%error, "leaseset rejected");
            self.is_valid = false;
        }
    }

    fn try_read(
        &mut self,
        read_identity: bool,
        verify_signature: bool,
    ) -> Result<(), LeaseSetError> {
        if read_identity || self.identity.is_none() {
            let identity = I::from_buffer(self.buffer.as_slice())?;
            self.identity = Some(Arc::new(identity));
        }
        let Some(identity) = self.identity.clone() else {
            return Err(LeaseSetError::BadIdentity("identity not set"));
        };
        let full_len = identity.full_len();
        if full_len > self.buffer.len() {
            return Err(LeaseSetError::IdentityTooLong {
                declared: full_len,
                buffer: self.buffer.len(),
            });
        }

        // Structural pass: bounds-check and pull out every field before
        // touching the live lease set.
        let (encryption_key, leases, signed_len) = {
            let mut cursor = Cursor::new(self.buffer.as_slice());
            cursor.skip(full_len, "identity")?;
            let encryption_key: [u8; ENCRYPTION_KEY_LEN] = cursor.read_array("encryption key")?;
            cursor.skip(identity.signing_public_key_len(), "transient signing key")?;
            let num = cursor.read_u8("lease count")?;
            debug!(num, "read lease count");
            if num == 0 || num as usize > MAX_NUM_LEASES {
                return Err(LeaseSetError::BadLeaseCount(num));
            }
            // The count byte alone does not prove the list fits; re-verify
            // against the remaining length before materializing.
            let list_len = num as usize * LEASE_SIZE;
            if list_len > cursor.remaining() {
                return Err(LeaseSetError::Truncated {
                    what: "lease list",
                    needed: list_len,
                    available: cursor.remaining(),
                });
            }
            let mut leases: Vec<(IdentHash, TunnelId, u64)> = Vec::with_capacity(num as usize);
            for _ in 0..num {
                let gateway: [u8; 32] = cursor.read_array("lease gateway")?;
                let tunnel_id = cursor.read_u32("lease tunnel id")?;
                let end_date = cursor.read_u64("lease end date")?;
                leases.push((IdentHash(gateway), tunnel_id, end_date));
            }
            (encryption_key, leases, cursor.offset())
        };
        self.encryption_key = Some(Box::new(encryption_key));

        // Reconcile the incoming list against the currently-held set.
        let now = time::now_millis();
        self.reconciler.begin(0);
        for (gateway, tunnel_id, end_date) in leases {
            self.reconciler
                .update_lease(gateway, tunnel_id, end_date, now, &*self.netdb);
        }
        if self.reconciler.expiration_candidate() == 0 {
            warn!("all leases are expired, dropped");
            return Err(LeaseSetError::Expired);
        }
        self.expiration_time = self.reconciler.expiration_candidate() + LEASE_END_DATE_THRESHOLD_MS;
        self.reconciler.end();

        if verify_signature {
            let buf = self.buffer.as_slice();
            let sig_len = identity.signature_len();
            if signed_len + sig_len > buf.len() {
                return Err(LeaseSetError::Truncated {
                    what: "signature",
                    needed: sig_len,
                    available: buf.len() - signed_len,
                });
            }
            if !identity.verify(&buf[..signed_len], &buf[signed_len..signed_len + sig_len]) {
                return Err(LeaseSetError::SignatureInvalid);
            }
        }
        Ok(())
    }

    /// Minimum lease end date of `buf`, or 0 if it does not parse. Used
    /// only for newer-vs-older comparison: the minimum (not the maximum)
    /// makes the comparison conservative, so a record is newer only if its
    /// worst-case lease is fresher.
    pub fn extract_timestamp(&self, buf: &[u8]) -> u64 {
        let Some(identity) = &self.identity else {
            return 0;
        };
        let result = (|| -> Result<u64, LeaseSetError> {
            let mut cursor = Cursor::new(buf);
            cursor.skip(identity.full_len(), "identity")?;
            cursor.skip(ENCRYPTION_KEY_LEN, "encryption key")?;
            cursor.skip(identity.signing_public_key_len(), "transient signing key")?;
            let num = cursor.read_u8("lease count")?;
            let list_len = num as usize * LEASE_SIZE;
            if list_len > cursor.remaining() {
                return Err(LeaseSetError::Truncated {
                    what: "lease list",
                    needed: list_len,
                    available: cursor.remaining(),
                });
            }
            let mut timestamp = 0u64;
            for _ in 0..num {
                cursor.skip(36, "lease head")?;
                let end_date = cursor.read_u64("lease end date")?;
                if timestamp == 0 || end_date < timestamp {
                    timestamp = end_date;
                }
            }
            Ok(timestamp)
        })();
        result.unwrap_or(0)
    }

    /// True iff `buf`'s minimum lease end date exceeds this record's.
    pub fn is_newer(&self, buf: &[u8]) -> bool {
        self.extract_timestamp(buf) > self.extract_timestamp(self.buffer.as_slice())
    }

    /// True past the aggregate expiration at `now_ms`, or when
    /// materializing with an empty set.
    pub fn is_expired_at(&self, now_ms: u64) -> bool {
        if self.reconciler.store_leases() && self.reconciler.is_empty() {
            return true;
        }
        now_ms > self.expiration_time
    }

    /// Encrypt `plaintext` to the record's advertised key.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, LeaseSetError> {
        let identity = self.identity.as_ref().ok_or(LeaseSetError::NoEncryptor)?;
        let key = self.encryption_key.as_ref().ok_or(LeaseSetError::NoEncryptor)?;
        let encryptor = identity
            .create_encryptor(&key[..])
            .ok_or(LeaseSetError::NoEncryptor)?;
        encryptor
            .encrypt(plaintext)
            .map_err(|e| LeaseSetError::Encryption(e.to_string()))
    }

    /// True if identity, key, leases, and signature all checked out.
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

    /// Whether individual leases are materialized.
    pub fn store_leases(&self) -> bool {
        self.reconciler.store_leases()
    }

    /// Number of currently-held leases.
    pub fn lease_count(&self) -> usize {
        self.reconciler.len()
    }
}

impl<I: RecordIdentity> LeaseHolding for LeaseSet<I> {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{
        build_legacy_record, padded_encryption_key, test_destination, MockNetDb,
    };
    use shared_crypto::SealedBoxDecryptor;

    const HOUR_MS: u64 = 3_600_000;

    fn lease(tag: u8, tunnel_id: TunnelId, end_date_ms: u64) -> (IdentHash, TunnelId, u64) {
        (IdentHash([tag; 32]), tunnel_id, end_date_ms)
    }

    /// Test: a well-formed signed record decodes as valid
    #[test]
    fn test_decode_valid_record() {
        let netdb = MockNetDb::shared();
        let (identity, signer) = test_destination();
        let now = time::now_millis();
        let leases = [lease(1, 10, now + HOUR_MS), lease(2, 20, now + 2 * HOUR_MS)];
        let buf = build_legacy_record(&identity, signer.as_ref(), &padded_encryption_key(), &leases);

        let record = LeaseSet::<crate::NetIdentity>::from_buffer(&buf, true, netdb);

        assert!(record.is_valid());
        assert_eq!(record.lease_count(), 2);
        assert_eq!(record.expiration_time(), now + 2 * HOUR_MS + LEASE_END_DATE_THRESHOLD_MS);
        assert_eq!(record.buffer(), &buf[..]);
        assert_eq!(
            record.identity().unwrap().ident_hash(),
            identity.ident_hash()
        );
    }

    /// Test: decoded leases reproduce the encoded (gateway, tunnel, end) multiset
    #[test]
    fn test_decode_reencode_multiset() {
        let netdb = MockNetDb::shared();
        let (identity, signer) = test_destination();
        let now = time::now_millis();
        let mut input = vec![
            lease(3, 30, now + HOUR_MS),
            lease(1, 10, now + 2 * HOUR_MS),
            lease(2, 20, now + 3 * HOUR_MS),
        ];
        let buf = build_legacy_record(&identity, signer.as_ref(), &padded_encryption_key(), &input);

        let record = LeaseSet::<crate::NetIdentity>::from_buffer(&buf, true, netdb);

        let mut decoded: Vec<_> = record
            .non_expired_leases(true)
            .iter()
            .map(|l| (*l.gateway(), l.tunnel_id(), l.end_date()))
            .collect();
        decoded.sort();
        input.sort();
        assert_eq!(decoded, input);
    }

    /// Test: a failed signature invalidates the record but retains leases
    #[test]
    fn test_signature_failure_retains_leases() {
        let netdb = MockNetDb::shared();
        let (identity, signer) = test_destination();
        let now = time::now_millis();
        let mut buf = build_legacy_record(
            &identity,
            signer.as_ref(),
            &padded_encryption_key(),
            &[lease(1, 10, now + HOUR_MS)],
        );
        let last = buf.len() - 1;
        buf[last] ^= 0x01;

        let record = LeaseSet::<crate::NetIdentity>::from_buffer(&buf, true, netdb);

        assert!(!record.is_valid());
        assert_eq!(record.lease_count(), 1);
    }

    /// Test: zero leases and more than the maximum are both rejected
    #[test]
    fn test_bad_lease_counts() {
        let netdb = MockNetDb::shared();
        let (identity, signer) = test_destination();
        let now = time::now_millis();

        let empty = build_legacy_record(&identity, signer.as_ref(), &padded_encryption_key(), &[]);
        let record = LeaseSet::<crate::NetIdentity>::from_buffer(&empty, true, netdb.clone());
        assert!(!record.is_valid());

        let too_many: Vec<_> = (0..17)
            .map(|i| lease(i as u8, i, now + HOUR_MS))
            .collect();
        let buf =
            build_legacy_record(&identity, signer.as_ref(), &padded_encryption_key(), &too_many);
        let record = LeaseSet::<crate::NetIdentity>::from_buffer(&buf, true, netdb);
        assert!(!record.is_valid());
    }

    /// Test: a record whose leases are all stale is rejected
    #[test]
    fn test_all_expired_rejected() {
        let netdb = MockNetDb::shared();
        let (identity, signer) = test_destination();
        let now = time::now_millis();
        let buf = build_legacy_record(
            &identity,
            signer.as_ref(),
            &padded_encryption_key(),
            &[lease(1, 10, now - 2 * LEASE_END_DATE_THRESHOLD_MS)],
        );

        let record = LeaseSet::<crate::NetIdentity>::from_buffer(&buf, true, netdb);
        assert!(!record.is_valid());
        assert!(record.is_empty());
    }

    /// Test: every truncation strictly before the end yields an invalid
    /// record and never a panic
    #[test]
    fn test_truncation_fuzz() {
        let netdb = MockNetDb::shared();
        let (identity, signer) = test_destination();
        let now = time::now_millis();
        let buf = build_legacy_record(
            &identity,
            signer.as_ref(),
            &padded_encryption_key(),
            &[lease(1, 10, now + HOUR_MS), lease(2, 20, now + HOUR_MS)],
        );

        for cut in 0..buf.len() {
            let record =
                LeaseSet::<crate::NetIdentity>::from_buffer(&buf[..cut], true, netdb.clone());
            assert!(!record.is_valid(), "truncation at {cut} accepted");
        }

        let record = LeaseSet::<crate::NetIdentity>::from_buffer(&buf, true, netdb);
        assert!(record.is_valid());
    }

    /// Test: update reconciles the incoming list against the held set
    #[test]
    fn test_update_reconciles() {
        let netdb = MockNetDb::shared();
        let (identity, signer) = test_destination();
        let key = padded_encryption_key();
        let now = time::now_millis();

        let first = build_legacy_record(
            &identity,
            signer.as_ref(),
            &key,
            &[lease(1, 10, now + HOUR_MS), lease(2, 20, now + HOUR_MS)],
        );
        let mut record = LeaseSet::<crate::NetIdentity>::from_buffer(&first, true, netdb);
        assert_eq!(record.lease_count(), 2);

        let held_b = record
            .non_expired_leases(true)
            .into_iter()
            .find(|l| l.gateway() == &IdentHash([2; 32]))
            .unwrap();

        let second = build_legacy_record(
            &identity,
            signer.as_ref(),
            &key,
            &[lease(1, 10, now + 2 * HOUR_MS), lease(4, 40, now + HOUR_MS)],
        );
        record.update(&second, true);

        assert!(record.is_valid());
        let mut gateways: Vec<u8> = record
            .non_expired_leases(true)
            .iter()
            .map(|l| l.gateway().0[0])
            .collect();
        gateways.sort();
        assert_eq!(gateways, vec![1, 4]);

        // The dropped lease is observed as a zombie by its holder
        assert_eq!(held_b.end_date(), 0);
    }

    /// Test: is_newer compares by minimum end date, not maximum
    #[test]
    fn test_is_newer_uses_minimum() {
        let netdb = MockNetDb::shared();
        let (identity, signer) = test_destination();
        let key = padded_encryption_key();
        let base = time::now_millis();

        let current = build_legacy_record(
            &identity,
            signer.as_ref(),
            &key,
            &[lease(1, 10, base + 200_000), lease(2, 20, base + 300_000)],
        );
        let record = LeaseSet::<crate::NetIdentity>::from_buffer(&current, true, netdb);

        // Bigger maximum but smaller minimum: not newer
        let candidate = build_legacy_record(
            &identity,
            signer.as_ref(),
            &key,
            &[lease(1, 10, base + 100_000), lease(2, 20, base + 900_000)],
        );
        assert!(!record.is_newer(&candidate));

        // Larger minimum: newer
        let fresher = build_legacy_record(
            &identity,
            signer.as_ref(),
            &key,
            &[lease(1, 10, base + 250_000), lease(2, 20, base + 300_000)],
        );
        assert!(record.is_newer(&fresher));

        // Anti-symmetry against itself
        assert!(!record.is_newer(&current));
    }

    /// Test: extract_timestamp returns 0 for buffers that do not parse
    #[test]
    fn test_extract_timestamp_garbage() {
        let netdb = MockNetDb::shared();
        let (identity, signer) = test_destination();
        let now = time::now_millis();
        let buf = build_legacy_record(
            &identity,
            signer.as_ref(),
            &padded_encryption_key(),
            &[lease(1, 10, now + HOUR_MS)],
        );
        let record = LeaseSet::<crate::NetIdentity>::from_buffer(&buf, true, netdb);

        assert_eq!(record.extract_timestamp(&buf[..40]), 0);
        assert_eq!(record.extract_timestamp(&[]), 0);
        assert_eq!(record.extract_timestamp(&buf), now + HOUR_MS);
    }

    /// Test: unknown gateways are requested from the network database
    #[test]
    fn test_gateway_lookup_triggered() {
        let netdb = MockNetDb::shared();
        netdb.add_router(IdentHash([1; 32]));
        let (identity, signer) = test_destination();
        let now = time::now_millis();
        let buf = build_legacy_record(
            &identity,
            signer.as_ref(),
            &padded_encryption_key(),
            &[lease(1, 10, now + HOUR_MS), lease(9, 90, now + HOUR_MS)],
        );

        let record = LeaseSet::<crate::NetIdentity>::from_buffer(&buf, true, netdb.clone());

        assert!(record.is_valid());
        assert_eq!(netdb.requested(), vec![IdentHash([9; 32])]);
    }

    /// Test: non-materializing mode tracks expiration without leases and
    /// populate_leases builds the set afterwards
    #[test]
    fn test_populate_leases() {
        let netdb = MockNetDb::shared();
        let (identity, signer) = test_destination();
        let now = time::now_millis();
        let buf = build_legacy_record(
            &identity,
            signer.as_ref(),
            &padded_encryption_key(),
            &[lease(1, 10, now + HOUR_MS)],
        );

        let mut record = LeaseSet::<crate::NetIdentity>::from_buffer(&buf, false, netdb);
        assert!(record.is_valid());
        assert!(record.is_empty());
        assert_eq!(record.expiration_time(), now + HOUR_MS + LEASE_END_DATE_THRESHOLD_MS);

        record.populate_leases();
        assert_eq!(record.lease_count(), 1);
    }

    /// Test: fresh records do not expire soon with a zero window
    #[test]
    fn test_expires_soon_window() {
        let netdb = MockNetDb::shared();
        let (identity, signer) = test_destination();
        let now = time::now_millis();
        let buf = build_legacy_record(
            &identity,
            signer.as_ref(),
            &padded_encryption_key(),
            &[lease(1, 10, now + HOUR_MS)],
        );
        let record = LeaseSet::<crate::NetIdentity>::from_buffer(&buf, true, netdb);

        assert!(!record.expires_soon(0, 0));
        assert!(record.expires_soon(2 * HOUR_MS, 0));
        assert!(!record.is_expired());
        assert!(record.is_expired_at(now + 3 * HOUR_MS));
    }

    /// Test: encrypt seals to the advertised key
    #[test]
    fn test_encrypt_to_advertised_key() {
        let netdb = MockNetDb::shared();
        let (identity, signer) = test_destination();
        let decryptor = SealedBoxDecryptor::generate();
        let mut key = [0u8; ENCRYPTION_KEY_LEN];
        key[..33].copy_from_slice(&decryptor.public_key());
        let now = time::now_millis();
        let buf = build_legacy_record(
            &identity,
            signer.as_ref(),
            &key,
            &[lease(1, 10, now + HOUR_MS)],
        );

        let record = LeaseSet::<crate::NetIdentity>::from_buffer(&buf, true, netdb);
        let sealed = record.encrypt(b"garlic").unwrap();

        assert_eq!(decryptor.decrypt(&sealed).unwrap(), b"garlic");
    }
}
