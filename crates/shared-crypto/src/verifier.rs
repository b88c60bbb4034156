//! # Wire-Format Signature Verification
//!
//! Reachability records carry a 2-byte signature type code; key and
//! signature lengths on the wire are dictated by the algorithm behind the
//! code, not by the record format. This module is the dispatch point:
//! [`create_verifier`] turns a code into a verifier (or `None` for codes
//! this build does not speak), and [`create_signer`] is the local-key
//! counterpart used by record publishers and tests.

use crate::ecdsa::{Secp256k1KeyPair, Secp256k1PublicKey, Secp256k1Signature};
use crate::signatures::{Ed25519KeyPair, Ed25519PublicKey, Ed25519Signature};
use crate::CryptoError;

/// Signature algorithm selector carried in record headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum SigType {
    /// secp256k1 ECDSA, 33-byte compressed key, 64-byte signature.
    EcdsaSecp256k1 = 1,
    /// Ed25519, 32-byte key, 64-byte signature. Default for new identities.
    Ed25519 = 7,
    /// Blinded Ed25519. Same curve and lengths as Ed25519; the distinct
    /// code marks the key as a derived (blinded) verifying key rather than
    /// a destination's long-term identity key.
    BlindedEd25519 = 11,
}

impl SigType {
    /// Decode a wire code. Returns `None` for unsupported codes.
    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            1 => Some(Self::EcdsaSecp256k1),
            7 => Some(Self::Ed25519),
            11 => Some(Self::BlindedEd25519),
            _ => None,
        }
    }

    /// Wire code of this algorithm.
    pub fn code(self) -> u16 {
        self as u16
    }

    /// Public key length on the wire.
    pub fn public_key_len(self) -> usize {
        match self {
            Self::EcdsaSecp256k1 => 33,
            Self::Ed25519 | Self::BlindedEd25519 => 32,
        }
    }

    /// Signature length on the wire.
    pub fn signature_len(self) -> usize {
        match self {
            Self::EcdsaSecp256k1 => 64,
            Self::Ed25519 | Self::BlindedEd25519 => 64,
        }
    }
}

/// A signature verifier for one algorithm, loadable with a wire-format
/// public key.
///
/// `verify` never panics: an unset or malformed key, or a signature of the
/// wrong length, verifies as `false`.
pub trait RecordVerifier: Send + Sync {
    /// Algorithm implemented by this verifier.
    fn sig_type(&self) -> SigType;

    /// Public key length this verifier expects.
    fn public_key_len(&self) -> usize {
        self.sig_type().public_key_len()
    }

    /// Signature length this verifier expects.
    fn signature_len(&self) -> usize {
        self.sig_type().signature_len()
    }

    /// Load a public key read from a record buffer.
    fn set_public_key(&mut self, bytes: &[u8]) -> Result<(), CryptoError>;

    /// Verify `signature` over `data` with the loaded key.
    fn verify(&self, data: &[u8], signature: &[u8]) -> bool;
}

/// Create a verifier for a wire signature type code.
///
/// Returns `None` for codes this build does not support; record decoders
/// treat that as a hard decode failure.
pub fn create_verifier(code: u16) -> Option<Box<dyn RecordVerifier>> {
    let sig_type = SigType::from_code(code)?;
    match sig_type {
        SigType::EcdsaSecp256k1 => Some(Box::new(EcdsaVerifier {
            sig_type,
            key: None,
        })),
        SigType::Ed25519 | SigType::BlindedEd25519 => Some(Box::new(Ed25519Verifier {
            sig_type,
            key: None,
        })),
    }
}

struct Ed25519Verifier {
    sig_type: SigType,
    key: Option<Ed25519PublicKey>,
}

impl RecordVerifier for Ed25519Verifier {
    fn sig_type(&self) -> SigType {
        self.sig_type
    }

    fn set_public_key(&mut self, bytes: &[u8]) -> Result<(), CryptoError> {
        self.key = Some(Ed25519PublicKey::from_slice(bytes)?);
        Ok(())
    }

    fn verify(&self, data: &[u8], signature: &[u8]) -> bool {
        let Some(key) = &self.key else { return false };
        let Ok(sig) = Ed25519Signature::from_slice(signature) else {
            return false;
        };
        key.verify(data, &sig).is_ok()
    }
}

struct EcdsaVerifier {
    sig_type: SigType,
    key: Option<Secp256k1PublicKey>,
}

impl RecordVerifier for EcdsaVerifier {
    fn sig_type(&self) -> SigType {
        self.sig_type
    }

    fn set_public_key(&mut self, bytes: &[u8]) -> Result<(), CryptoError> {
        self.key = Some(Secp256k1PublicKey::from_slice(bytes)?);
        Ok(())
    }

    fn verify(&self, data: &[u8], signature: &[u8]) -> bool {
        let Some(key) = &self.key else { return false };
        let Ok(sig) = Secp256k1Signature::from_slice(signature) else {
            return false;
        };
        key.verify(data, &sig).is_ok()
    }
}

/// A locally-held signing key matching one wire signature type.
pub trait RecordSigner: Send + Sync {
    /// Algorithm implemented by this signer.
    fn sig_type(&self) -> SigType;

    /// Wire-format public key bytes.
    fn public_key(&self) -> Vec<u8>;

    /// Signature length this signer produces.
    fn signature_len(&self) -> usize {
        self.sig_type().signature_len()
    }

    /// Sign `data`, returning wire-format signature bytes.
    fn sign(&self, data: &[u8]) -> Vec<u8>;
}

/// Create a signer with a freshly generated key for `sig_type`.
pub fn create_signer(sig_type: SigType) -> Box<dyn RecordSigner> {
    match sig_type {
        SigType::EcdsaSecp256k1 => Box::new(EcdsaSigner {
            keypair: Secp256k1KeyPair::generate(),
        }),
        SigType::Ed25519 | SigType::BlindedEd25519 => Box::new(Ed25519Signer {
            sig_type,
            keypair: Ed25519KeyPair::generate(),
        }),
    }
}

struct Ed25519Signer {
    sig_type: SigType,
    keypair: Ed25519KeyPair,
}

impl RecordSigner for Ed25519Signer {
    fn sig_type(&self) -> SigType {
        self.sig_type
    }

    fn public_key(&self) -> Vec<u8> {
        self.keypair.public_key().as_bytes().to_vec()
    }

    fn sign(&self, data: &[u8]) -> Vec<u8> {
        self.keypair.sign(data).as_bytes().to_vec()
    }
}

struct EcdsaSigner {
    keypair: Secp256k1KeyPair,
}

impl RecordSigner for EcdsaSigner {
    fn sig_type(&self) -> SigType {
        SigType::EcdsaSecp256k1
    }

    fn public_key(&self) -> Vec<u8> {
        self.keypair.public_key().as_bytes().to_vec()
    }

    fn sign(&self, data: &[u8]) -> Vec<u8> {
        self.keypair.sign(data).as_bytes().to_vec()
    }
}
