//! # LeaseSet Service
//!
//! Application service wiring the record domain to the default identity
//! adapter and the network database port: decode-by-store-type for
//! received records, the fast-path buffer validator, and local record
//! construction for publication.

use crate::adapters::identity::NetIdentity;
use crate::domain::entities::{StoreType, ENCRYPTION_KEY_LEN};
use crate::domain::errors::LeaseSetError;
use crate::domain::local::{LocalLeaseSet, LocalLeaseSet2};
use crate::domain::record::RemoteRecord;
use crate::domain::validator::validate_lease_set_buffer;
use crate::ports::outbound::{InboundTunnelInfo, NetDbGateway};
use shared_types::StoreTypeCode;
use std::sync::Arc;

/// Service facade over the record subsystem.
pub struct LeaseSetService {
    netdb: Arc<dyn NetDbGateway>,
}

impl LeaseSetService {
    /// Create a service routing gateway lookups to `netdb`.
    pub fn new(netdb: Arc<dyn NetDbGateway>) -> Self {
        Self { netdb }
    }

    /// Decode a received record of the given store type. Structural and
    /// cryptographic failures are reported through the record's validity
    /// flag; only an unknown store type is an error here.
    pub fn decode(
        &self,
        store_type_code: StoreTypeCode,
        buf: &[u8],
        store_leases: bool,
    ) -> Result<RemoteRecord<NetIdentity>, LeaseSetError> {
        RemoteRecord::decode(store_type_code, buf, store_leases, Arc::clone(&self.netdb))
    }

    /// Fast-path structural and signature check of a legacy buffer,
    /// without constructing a record. Returns the max lease end date.
    pub fn validate_buffer(&self, buf: &[u8]) -> Result<u64, LeaseSetError> {
        validate_lease_set_buffer::<NetIdentity>(buf)
    }

    /// Build the node's own legacy record, ready for external signing.
    pub fn build_local(
        &self,
        identity: Arc<NetIdentity>,
        encryption_key: &[u8; ENCRYPTION_KEY_LEN],
        tunnels: &[Arc<dyn InboundTunnelInfo>],
    ) -> LocalLeaseSet<NetIdentity> {
        LocalLeaseSet::new(identity, encryption_key, tunnels)
    }

    /// Build the node's own standard v2 record, ready for external
    /// signing.
    pub fn build_local2(
        &self,
        identity: Arc<NetIdentity>,
        key_type: u16,
        encryption_public_key: &[u8],
        tunnels: &[Arc<dyn InboundTunnelInfo>],
    ) -> LocalLeaseSet2<NetIdentity> {
        LocalLeaseSet2::new(
            StoreType::Standard,
            identity,
            key_type,
            encryption_public_key,
            tunnels,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::inbound::LeaseHolding;
    use crate::testing::{
        build_legacy_record, build_meta_record, build_standard_record, padded_encryption_key,
        test_destination, MockNetDb,
    };
    use shared_types::{time, IdentHash};

    const HOUR_MS: u64 = 3_600_000;

    /// Test: each store type dispatches to its decoder
    #[test]
    fn test_dispatch_by_store_type() {
        let netdb = MockNetDb::shared();
        let service = LeaseSetService::new(netdb);
        let (identity, signer) = test_destination();
        let now_ms = time::now_millis();
        let now_secs = time::now_secs();

        let legacy = build_legacy_record(
            &identity,
            signer.as_ref(),
            &padded_encryption_key(),
            &[(IdentHash([1; 32]), 1, now_ms + HOUR_MS)],
        );
        let record = service.decode(StoreType::Legacy.code(), &legacy, true).unwrap();
        assert_eq!(record.store_type(), StoreType::Legacy);
        assert!(record.is_valid());
        assert!(record.as_lease_holding().is_some());

        let standard = build_standard_record(
            &identity,
            signer.as_ref(),
            now_secs as u32,
            600,
            &[(IdentHash([2; 32]), 2, (now_secs + 3600) as u32)],
        );
        let record = service
            .decode(StoreType::Standard.code(), &standard, true)
            .unwrap();
        assert_eq!(record.store_type(), StoreType::Standard);
        assert!(record.is_valid());

        let meta = build_meta_record(&identity, signer.as_ref(), now_secs as u32, 600, 2, 1);
        let record = service.decode(StoreType::Meta.code(), &meta, true).unwrap();
        assert_eq!(record.store_type(), StoreType::Meta);
        assert!(record.is_valid());
        // Meta records expose no lease surface
        assert!(record.as_lease_holding().is_none());
    }

    /// Test: unknown store type codes are a hard error
    #[test]
    fn test_unknown_store_type() {
        let service = LeaseSetService::new(MockNetDb::shared());
        assert_eq!(
            service.decode(2, &[0u8; 64], true).unwrap_err(),
            LeaseSetError::UnsupportedStoreType(2)
        );
    }

    /// Test: validator agrees with the full decoder on the same buffer
    #[test]
    fn test_validator_agrees_with_decode() {
        let service = LeaseSetService::new(MockNetDb::shared());
        let (identity, signer) = test_destination();
        let now_ms = time::now_millis();

        let buf = build_legacy_record(
            &identity,
            signer.as_ref(),
            &padded_encryption_key(),
            &[
                (IdentHash([1; 32]), 1, now_ms + HOUR_MS),
                (IdentHash([2; 32]), 2, now_ms + 2 * HOUR_MS),
            ],
        );

        let expires = service.validate_buffer(&buf).unwrap();
        assert_eq!(expires, now_ms + 2 * HOUR_MS);

        let record = service.decode(StoreType::Legacy.code(), &buf, true).unwrap();
        assert!(record.is_valid());
    }

    /// Test: local build round-trips through the remote decoder
    #[test]
    fn test_local_build_decodes_remotely() {
        use crate::ports::outbound::InboundTunnelInfo;
        use crate::testing::FixedTunnel;

        let service = LeaseSetService::new(MockNetDb::shared());
        let (identity, signer) = test_destination();
        let now_secs = time::now_secs();

        let tunnels: Vec<Arc<dyn InboundTunnelInfo>> = vec![
            Arc::new(FixedTunnel {
                gateway: IdentHash([7; 32]),
                tunnel_id: 70,
                created_secs: now_secs,
            }),
            Arc::new(FixedTunnel {
                gateway: IdentHash([8; 32]),
                tunnel_id: 80,
                created_secs: now_secs - 10,
            }),
        ];

        let mut local = service.build_local(
            Arc::clone(&identity),
            &padded_encryption_key(),
            &tunnels,
        );
        let signature = signer.sign(local.unsigned_payload());
        local.apply_signature(&signature).unwrap();

        let record = service
            .decode(StoreType::Legacy.code(), local.buffer(), true)
            .unwrap();
        assert!(record.is_valid());
        let holding = record.as_lease_holding().unwrap();
        assert_eq!(holding.non_expired_leases(true).len(), 2);
    }
}
