//! # Sealed-Box Public-Key Encryption
//!
//! Encrypts a payload to a recipient's public encryption key: an ephemeral
//! secp256k1 ECDH exchange derives an XChaCha20-Poly1305 key, and the
//! ephemeral public key travels with the ciphertext. This is the encryption
//! scheme behind the key(s) advertised in reachability records.
//!
//! Wire shape: `ephemeral key (33) || nonce (24) || ciphertext+tag`.

use crate::hashing::sha256;
use crate::symmetric::{self, Nonce, SecretKey};
use crate::CryptoError;
use k256::ecdh::{diffie_hellman, EphemeralSecret};
use k256::PublicKey;

/// Compressed SEC1 public key length.
pub const SEALED_KEY_LEN: usize = 33;

/// Fixed overhead added to every sealed payload (ephemeral key + nonce +
/// Poly1305 tag).
pub const SEALED_OVERHEAD: usize = SEALED_KEY_LEN + Nonce::SIZE + 16;

/// Encrypts payloads addressed to one public key.
///
/// Implementations must be cheap to call repeatedly; a record holds one and
/// reuses it for every message routed to the destination.
pub trait RecordEncryptor: Send + Sync {
    /// Encrypt `plaintext` for the key this encryptor was created from.
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError>;
}

/// Public-key encryption algorithm selector carried in record key
/// sections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum EncType {
    /// Classic 256-byte wire field; the leading 33 bytes hold the
    /// compressed point, the rest is padding.
    Classic = 0,
    /// Bare 33-byte compressed point.
    SealedBox = 4,
}

impl EncType {
    /// Decode a wire code. Returns `None` for unsupported codes.
    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            0 => Some(Self::Classic),
            4 => Some(Self::SealedBox),
            _ => None,
        }
    }

    /// Wire code of this algorithm.
    pub fn code(self) -> u16 {
        self as u16
    }
}

/// Create an encryptor for a wire encryption type code and its key
/// material. Returns `None` when the code is unsupported or the material
/// does not parse; an unusable advertised key is not a record defect.
pub fn create_encryptor(code: u16, key_material: &[u8]) -> Option<Box<dyn RecordEncryptor>> {
    EncType::from_code(code)?;
    SealedBoxEncryptor::new(key_material)
        .ok()
        .map(|e| Box::new(e) as Box<dyn RecordEncryptor>)
}

/// Sealed-box encryptor bound to a recipient key.
pub struct SealedBoxEncryptor {
    recipient: PublicKey,
}

impl SealedBoxEncryptor {
    /// Create from a compressed SEC1 public key. Only the leading 33 bytes
    /// of `key_material` are meaningful; longer (wire-padded) fields are
    /// accepted.
    pub fn new(key_material: &[u8]) -> Result<Self, CryptoError> {
        if key_material.len() < SEALED_KEY_LEN {
            return Err(CryptoError::InvalidKeyLength {
                expected: SEALED_KEY_LEN,
                actual: key_material.len(),
            });
        }
        let recipient = PublicKey::from_sec1_bytes(&key_material[..SEALED_KEY_LEN])
            .map_err(|_| CryptoError::InvalidPublicKey)?;
        Ok(Self { recipient })
    }
}

impl RecordEncryptor for SealedBoxEncryptor {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let ephemeral = EphemeralSecret::random(&mut rand::thread_rng());
        let ephemeral_public = PublicKey::from(&ephemeral);

        let shared = ephemeral.diffie_hellman(&self.recipient);
        let key = SecretKey::from_bytes(sha256(shared.raw_secret_bytes().as_slice()));

        let (ciphertext, nonce) = symmetric::encrypt(&key, plaintext)?;

        let mut out = Vec::with_capacity(SEALED_OVERHEAD + plaintext.len());
        out.extend_from_slice(ephemeral_public.to_sec1_bytes().as_ref());
        out.extend_from_slice(nonce.as_bytes());
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }
}

/// Sealed-box decryptor holding the recipient's secret key.
pub struct SealedBoxDecryptor {
    secret: k256::SecretKey,
}

impl SealedBoxDecryptor {
    /// Generate a fresh keypair.
    pub fn generate() -> Self {
        Self {
            secret: k256::SecretKey::random(&mut rand::thread_rng()),
        }
    }

    /// Compressed SEC1 public key to advertise in a record.
    pub fn public_key(&self) -> [u8; SEALED_KEY_LEN] {
        let mut bytes = [0u8; SEALED_KEY_LEN];
        bytes.copy_from_slice(self.secret.public_key().to_sec1_bytes().as_ref());
        bytes
    }

    /// Open a sealed payload.
    pub fn decrypt(&self, sealed: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if sealed.len() < SEALED_OVERHEAD {
            return Err(CryptoError::DecryptionFailed("sealed payload too short".into()));
        }
        let ephemeral_public = PublicKey::from_sec1_bytes(&sealed[..SEALED_KEY_LEN])
            .map_err(|_| CryptoError::InvalidPublicKey)?;

        let shared = diffie_hellman(
            self.secret.to_nonzero_scalar(),
            ephemeral_public.as_affine(),
        );
        let key = SecretKey::from_bytes(sha256(shared.raw_secret_bytes().as_slice()));

        let mut nonce = [0u8; Nonce::SIZE];
        nonce.copy_from_slice(&sealed[SEALED_KEY_LEN..SEALED_KEY_LEN + Nonce::SIZE]);

        symmetric::decrypt(
            &key,
            &sealed[SEALED_KEY_LEN + Nonce::SIZE..],
            &Nonce::from_bytes(nonce),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Test: seal then open returns the plaintext
    #[test]
    fn test_seal_open_roundtrip() {
        let recipient = SealedBoxDecryptor::generate();
        let encryptor = SealedBoxEncryptor::new(&recipient.public_key()).unwrap();

        let sealed = encryptor.encrypt(b"garlic message").unwrap();
        let opened = recipient.decrypt(&sealed).unwrap();

        assert_eq!(opened, b"garlic message");
    }

    /// Test: wire-padded key material is accepted
    #[test]
    fn test_padded_key_material() {
        let recipient = SealedBoxDecryptor::generate();
        let mut padded = [0u8; 256];
        padded[..SEALED_KEY_LEN].copy_from_slice(&recipient.public_key());

        let encryptor = SealedBoxEncryptor::new(&padded).unwrap();
        let sealed = encryptor.encrypt(b"padded").unwrap();

        assert_eq!(recipient.decrypt(&sealed).unwrap(), b"padded");
    }

    /// Test: the wrong recipient cannot open
    #[test]
    fn test_wrong_recipient_fails() {
        let recipient = SealedBoxDecryptor::generate();
        let other = SealedBoxDecryptor::generate();
        let encryptor = SealedBoxEncryptor::new(&recipient.public_key()).unwrap();

        let sealed = encryptor.encrypt(b"secret").unwrap();
        assert!(other.decrypt(&sealed).is_err());
    }

    /// Test: invalid key material is rejected
    #[test]
    fn test_invalid_key_rejected() {
        assert!(SealedBoxEncryptor::new(&[0u8; 33]).is_err());
        assert!(SealedBoxEncryptor::new(&[2u8; 10]).is_err());
    }
}
