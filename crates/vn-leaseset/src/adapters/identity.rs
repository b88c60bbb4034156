//! # Network Identity Adapter
//!
//! Concrete [`RecordIdentity`] backed by `shared-crypto`. The wire form is
//! self-describing: signature type, encryption type, declared key length,
//! then the signing public key. The lookup hash is SHA-256 over the
//! serialized identity.

use crate::domain::cursor::Cursor;
use crate::domain::errors::LeaseSetError;
use crate::ports::outbound::RecordIdentity;
use shared_crypto::{create_encryptor, create_verifier, sha256, RecordEncryptor, SigType};
use shared_types::{EncTypeCode, IdentHash};

/// A destination or router identity as carried in records.
#[derive(Clone, Debug)]
pub struct NetIdentity {
    sig_type: SigType,
    enc_type: EncTypeCode,
    public_key: Vec<u8>,
    ident_hash: IdentHash,
}

impl NetIdentity {
    /// Header bytes before the signing key: signature type, encryption
    /// type, declared key length.
    const HEADER_LEN: usize = 6;

    /// Build an identity from its parts. The key must have the exact
    /// length of the signature algorithm.
    pub fn new(
        sig_type: SigType,
        enc_type: EncTypeCode,
        public_key: Vec<u8>,
    ) -> Result<Self, LeaseSetError> {
        if public_key.len() != sig_type.public_key_len() {
            return Err(LeaseSetError::BadIdentity("signing key length mismatch"));
        }
        let mut identity = Self {
            sig_type,
            enc_type,
            public_key,
            ident_hash: IdentHash::default(),
        };
        let mut serialized = Vec::with_capacity(identity.full_len());
        identity.write_to(&mut serialized);
        identity.ident_hash = IdentHash(sha256(&serialized));
        Ok(identity)
    }

    /// Signature algorithm of this identity.
    pub fn sig_type(&self) -> SigType {
        self.sig_type
    }

    /// Encryption algorithm this identity's advertised keys use.
    pub fn enc_type(&self) -> EncTypeCode {
        self.enc_type
    }

    /// Raw signing public key bytes.
    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }
}

impl RecordIdentity for NetIdentity {
    fn from_buffer(buf: &[u8]) -> Result<Self, LeaseSetError> {
        let mut cursor = Cursor::new(buf);
        let sig_code = cursor.read_u16("identity signature type")?;
        let sig_type =
            SigType::from_code(sig_code).ok_or(LeaseSetError::UnsupportedKeyType(sig_code))?;
        let enc_type = cursor.read_u16("identity encryption type")?;
        let key_len = cursor.read_u16("identity key length")? as usize;
        if key_len != sig_type.public_key_len() {
            return Err(LeaseSetError::BadIdentity("declared key length mismatch"));
        }
        let public_key = cursor.read_bytes(key_len, "identity signing key")?;
        Self::new(sig_type, enc_type, public_key.to_vec())
    }

    fn full_len(&self) -> usize {
        Self::HEADER_LEN + self.public_key.len()
    }

    fn signing_public_key_len(&self) -> usize {
        self.public_key.len()
    }

    fn signature_len(&self) -> usize {
        self.sig_type.signature_len()
    }

    fn verify(&self, data: &[u8], signature: &[u8]) -> bool {
        let Some(mut verifier) = create_verifier(self.sig_type.code()) else {
            return false;
        };
        if verifier.set_public_key(&self.public_key).is_err() {
            return false;
        }
        verifier.verify(data, signature)
    }

    fn create_encryptor(&self, key_material: &[u8]) -> Option<Box<dyn RecordEncryptor>> {
        create_encryptor(self.enc_type, key_material)
    }

    fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.sig_type.code().to_be_bytes());
        out.extend_from_slice(&self.enc_type.to_be_bytes());
        out.extend_from_slice(&(self.public_key.len() as u16).to_be_bytes());
        out.extend_from_slice(&self.public_key);
    }

    fn ident_hash(&self) -> IdentHash {
        self.ident_hash
    }
}
