//! # Shared Crypto - Signature and Encryption Primitives
//!
//! ## Components
//!
//! | Module | Algorithm | Use Case |
//! |--------|-----------|----------|
//! | `signatures` | Ed25519 | Destination and router identities |
//! | `ecdsa` | secp256k1 | Alternate identity signature type |
//! | `verifier` | type-code dispatch | Wire-format signature verification |
//! | `hashing` | SHA-256 | Identity hashes |
//! | `symmetric` | XChaCha20-Poly1305 | Payload encryption |
//! | `sealed` | ECDH + XChaCha20-Poly1305 | Public-key record encryption |
//!
//! ## Security Properties
//!
//! - **Ed25519**: Deterministic nonces, no RNG dependency for signing
//! - **secp256k1**: RFC 6979 deterministic signing
//! - **XChaCha20**: 192-bit nonce, constant-time, side-channel immune
//! - Secret key material is zeroized on drop

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod ecdsa;
pub mod errors;
pub mod hashing;
pub mod sealed;
pub mod signatures;
pub mod symmetric;
pub mod verifier;

// Re-exports
pub use ecdsa::{Secp256k1KeyPair, Secp256k1PublicKey, Secp256k1Signature};
pub use errors::CryptoError;
pub use hashing::{sha256, Sha256Hasher};
pub use sealed::{
    create_encryptor, EncType, RecordEncryptor, SealedBoxDecryptor, SealedBoxEncryptor,
};
pub use signatures::{Ed25519KeyPair, Ed25519PublicKey, Ed25519Signature};
pub use symmetric::{decrypt, encrypt, Nonce, SecretKey};
pub use verifier::{create_signer, create_verifier, RecordSigner, RecordVerifier, SigType};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    #[test]
    fn test_version() {
        assert!(!super::VERSION.is_empty());
    }
}
