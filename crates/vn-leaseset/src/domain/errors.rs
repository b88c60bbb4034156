//! # Record Errors
//!
//! Error taxonomy for record decoding and construction. None of these are
//! fatal to the process: a remote record that fails to decode is marked
//! invalid and the failure is surfaced for diagnostics.

use thiserror::Error;

/// Errors raised while decoding or constructing reachability records.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LeaseSetError {
    /// A field's declared or derived length exceeds the remaining buffer.
    #[error("Truncated record: {what} needs {needed} bytes, {available} available")]
    Truncated {
        /// Field being read when the buffer ran out
        what: &'static str,
        /// Bytes the field requires
        needed: usize,
        /// Bytes left in the buffer
        available: usize,
    },

    /// The identity prefix declares a length past the end of the buffer.
    #[error("Identity length {declared} exceeds buffer size {buffer}")]
    IdentityTooLong {
        /// Length the identity declares for itself
        declared: usize,
        /// Total buffer length
        buffer: usize,
    },

    /// The identity prefix itself is malformed.
    #[error("Malformed identity: {0}")]
    BadIdentity(&'static str),

    /// Zero leases, or more than [`crate::domain::entities::MAX_NUM_LEASES`].
    #[error("Incorrect number of leases: {0}")]
    BadLeaseCount(u8),

    /// A meta record referencing no destinations is useless.
    #[error("Meta record has no entries")]
    EmptyMetaRecord,

    /// Signature algorithm code this build does not support.
    #[error("Unsupported key type: {0}")]
    UnsupportedKeyType(u16),

    /// Store type code naming no known record sub-format.
    #[error("Unsupported store type: {0}")]
    UnsupportedStoreType(u8),

    /// Every lease in the record is already past its end date.
    #[error("All leases are expired")]
    Expired,

    /// The record signature does not verify.
    #[error("Signature verification failed")]
    SignatureInvalid,

    /// The offline-key delegation signature does not verify.
    #[error("Offline key signature verification failed")]
    OfflineSignatureInvalid,

    /// The offline delegate key bytes are not a valid key.
    #[error("Offline key rejected by verifier")]
    BadOfflineKey,

    /// No encryptor could be created for the record's key material.
    #[error("No encryptor available")]
    NoEncryptor,

    /// Encrypting to the record's key failed.
    #[error("Encryption failed: {0}")]
    Encryption(String),

    /// A signature being applied has the wrong length for the identity.
    #[error("Bad signature length: expected {expected}, got {actual}")]
    BadSignatureLength {
        /// Length the identity's algorithm produces
        expected: usize,
        /// Length supplied
        actual: usize,
    },
}
