//! # Standalone Buffer Validator
//!
//! Fast-path acceptance check: walks a legacy record buffer purely to
//! locate the signature and verify it, without constructing a record or
//! materializing any lease. Allocation-free apart from the identity parse.

use super::cursor::Cursor;
use super::entities::{ENCRYPTION_KEY_LEN, LEASE_SIZE, MAX_NUM_LEASES};
use super::errors::LeaseSetError;
use crate::ports::outbound::RecordIdentity;

/// Validate structure and signature of a legacy record buffer.
///
/// Returns the maximum lease end date in milliseconds on success. No
/// expiry check is applied; the caller decides freshness separately.
pub fn validate_lease_set_buffer<I: RecordIdentity>(buf: &[u8]) -> Result<u64, LeaseSetError> {
    let identity = I::from_buffer(buf)?;
    let full_len = identity.full_len();
    if full_len > buf.len() {
        return Err(LeaseSetError::IdentityTooLong {
            declared: full_len,
            buffer: buf.len(),
        });
    }

    let mut cursor = Cursor::new(buf);
    cursor.skip(full_len, "identity")?;
    cursor.skip(ENCRYPTION_KEY_LEN, "encryption key")?;
    cursor.skip(identity.signing_public_key_len(), "transient signing key")?;
    let num = cursor.read_u8("lease count")?;
    if num == 0 || num as usize > MAX_NUM_LEASES {
        return Err(LeaseSetError::BadLeaseCount(num));
    }
    let list_len = num as usize * LEASE_SIZE;
    if list_len > cursor.remaining() {
        return Err(LeaseSetError::Truncated {
            what: "lease list",
            needed: list_len,
            available: cursor.remaining(),
        });
    }

    // Find the lease with the max end date along the way
    let mut expires = 0u64;
    for _ in 0..num {
        cursor.skip(36, "lease head")?;
        let end_date = cursor.read_u64("lease end date")?;
        if end_date > expires {
            expires = end_date;
        }
    }

    let signed_len = cursor.offset();
    let signature = cursor.read_bytes(identity.signature_len(), "signature")?;
    if !identity.verify(&buf[..signed_len], signature) {
        return Err(LeaseSetError::SignatureInvalid);
    }
    Ok(expires)
}
