//! # Remote Record Dispatch
//!
//! Closed tagged union over the four record sub-formats. The store type
//! arrives alongside the buffer (it is part of the enclosing store
//! message, not the record body) and selects the decode path.

use super::entities::StoreType;
use super::errors::LeaseSetError;
use super::lease_set::LeaseSet;
use super::lease_set2::{EncryptedRecord, LeaseSet2, MetaRecord};
use crate::ports::inbound::LeaseHolding;
use crate::ports::outbound::{NetDbGateway, RecordIdentity};
use shared_types::StoreTypeCode;
use std::sync::Arc;

/// A remotely-published record of any sub-format.
pub enum RemoteRecord<I: RecordIdentity> {
    /// Legacy format.
    Legacy(LeaseSet<I>),
    /// Standard v2 format.
    Standard(LeaseSet2<I>),
    /// Meta v2 format; holds no leases.
    Meta(MetaRecord<I>),
    /// Encrypted/blinded v2 format; body is opaque.
    Encrypted(EncryptedRecord),
}

impl<I: RecordIdentity> std::fmt::Debug for RemoteRecord<I> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("RemoteRecord")
            .field(&self.store_type())
            .finish()
    }
}

impl<I: RecordIdentity> RemoteRecord<I> {
    /// Decode a record of the sub-format named by `store_type_code`.
    ///
    /// An unknown code is the one failure reported as an error rather than
    /// through the record's validity flag: there is no variant to carry
    /// the outcome.
    pub fn decode(
        store_type_code: StoreTypeCode,
        buf: &[u8],
        store_leases: bool,
        netdb: Arc<dyn NetDbGateway>,
    ) -> Result<Self, LeaseSetError> {
        let store_type = StoreType::from_code(store_type_code)
            .ok_or(LeaseSetError::UnsupportedStoreType(store_type_code))?;
        Ok(match store_type {
            StoreType::Legacy => Self::Legacy(LeaseSet::from_buffer(buf, store_leases, netdb)),
            StoreType::Standard => {
                Self::Standard(LeaseSet2::from_buffer(buf, store_leases, netdb))
            }
            StoreType::Meta => Self::Meta(MetaRecord::from_buffer(buf)),
            StoreType::Encrypted => Self::Encrypted(EncryptedRecord::from_buffer(buf)),
        })
    }

    /// Sub-format of this record.
    pub fn store_type(&self) -> StoreType {
        match self {
            Self::Legacy(_) => StoreType::Legacy,
            Self::Standard(_) => StoreType::Standard,
            Self::Meta(_) => StoreType::Meta,
            Self::Encrypted(_) => StoreType::Encrypted,
        }
    }

    /// Validity of the underlying record.
    pub fn is_valid(&self) -> bool {
        match self {
            Self::Legacy(r) => r.is_valid(),
            Self::Standard(r) => r.is_valid(),
            Self::Meta(r) => r.is_valid(),
            Self::Encrypted(r) => r.is_valid(),
        }
    }

    /// Aggregate expiration of the underlying record in milliseconds.
    pub fn expiration_time(&self) -> u64 {
        match self {
            Self::Legacy(r) => r.expiration_time(),
            Self::Standard(r) => r.expiration_time(),
            Self::Meta(r) => r.expiration_time(),
            Self::Encrypted(r) => r.expiration_time(),
        }
    }

    /// The lease query surface, for the sub-formats that hold leases.
    pub fn as_lease_holding(&self) -> Option<&dyn LeaseHolding> {
        match self {
            Self::Legacy(r) => Some(r),
            Self::Standard(r) => Some(r),
            Self::Meta(_) | Self::Encrypted(_) => None,
        }
    }
}
