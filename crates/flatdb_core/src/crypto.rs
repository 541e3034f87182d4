//! Per-record encryption.
//!
//! Encryption is an envelope around each record's serialized payload: the
//! nullmask and field bytes are encrypted as one unit and the record frame
//! stores the ciphertext length. The header and schema descriptor are never
//! encrypted.
//!
//! Any cipher can be plugged in through [`RecordCipher`]; the bundled
//! [`AesGcmCipher`] (behind the default-on `encryption` feature) provides
//! AES-256-GCM with a random nonce per record.

use crate::error::DbResult;

/// A two-function cipher applied to each record payload.
///
/// Implementations must be deterministic only in the round-trip sense:
/// `decrypt(encrypt(p)) == p`. Ciphertext length may differ from plaintext
/// length (the record frame stores the ciphertext length).
pub trait RecordCipher: Send + Sync {
    /// Encrypts a record payload.
    fn encrypt(&self, plaintext: &[u8]) -> Vec<u8>;

    /// Decrypts a record payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the ciphertext is malformed or the key is wrong.
    fn decrypt(&self, ciphertext: &[u8]) -> DbResult<Vec<u8>>;
}

#[cfg(feature = "encryption")]
mod aes {
    use super::RecordCipher;
    use crate::error::{DbError, DbResult};
    use aes_gcm::aead::generic_array::GenericArray;
    use aes_gcm::aead::{Aead, KeyInit};
    use aes_gcm::{Aes256Gcm, Nonce};
    use rand::RngCore;
    use zeroize::{Zeroize, ZeroizeOnDrop};

    /// AES-256 key size in bytes.
    pub const KEY_SIZE: usize = 32;
    /// GCM nonce size in bytes.
    pub const NONCE_SIZE: usize = 12;
    /// GCM authentication tag size in bytes.
    pub const TAG_SIZE: usize = 16;

    /// Key material for [`AesGcmCipher`], zeroized on drop.
    #[derive(Clone, Zeroize, ZeroizeOnDrop)]
    pub struct CipherKey {
        bytes: [u8; KEY_SIZE],
    }

    impl CipherKey {
        /// Generates a random key.
        #[must_use]
        pub fn generate() -> Self {
            let mut bytes = [0u8; KEY_SIZE];
            rand::thread_rng().fill_bytes(&mut bytes);
            Self { bytes }
        }

        /// Creates a key from exactly 32 bytes.
        ///
        /// # Errors
        ///
        /// Returns an error for any other length.
        pub fn from_bytes(bytes: &[u8]) -> DbResult<Self> {
            let bytes: [u8; KEY_SIZE] = bytes.try_into().map_err(|_| {
                DbError::invalid_operation(format!(
                    "cipher key must be {KEY_SIZE} bytes, got {}",
                    bytes.len()
                ))
            })?;
            Ok(Self { bytes })
        }

        /// Derives a key from a password and salt using HKDF-SHA256.
        ///
        /// # Errors
        ///
        /// Returns an error if key derivation fails.
        pub fn from_password(password: &[u8], salt: &[u8]) -> DbResult<Self> {
            use hkdf::Hkdf;
            use sha2::Sha256;

            let hk = Hkdf::<Sha256>::new(Some(salt), password);
            let mut bytes = [0u8; KEY_SIZE];
            hk.expand(b"flatdb-record-cipher-v1", &mut bytes)
                .map_err(|_| DbError::invalid_operation("HKDF expand failed"))?;
            Ok(Self { bytes })
        }
    }

    impl std::fmt::Debug for CipherKey {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("CipherKey")
                .field("bytes", &"[REDACTED]")
                .finish()
        }
    }

    /// AES-256-GCM record cipher.
    ///
    /// Output format: `nonce (12 bytes) || ciphertext || tag (16 bytes)`.
    pub struct AesGcmCipher {
        cipher: Aes256Gcm,
    }

    impl AesGcmCipher {
        /// Creates a cipher from a key.
        #[must_use]
        pub fn new(key: &CipherKey) -> Self {
            let key_array = GenericArray::from_slice(&key.bytes);
            Self {
                cipher: Aes256Gcm::new(key_array),
            }
        }
    }

    impl RecordCipher for AesGcmCipher {
        fn encrypt(&self, plaintext: &[u8]) -> Vec<u8> {
            let mut nonce_bytes = [0u8; NONCE_SIZE];
            rand::thread_rng().fill_bytes(&mut nonce_bytes);
            let nonce = Nonce::from_slice(&nonce_bytes);

            // AES-GCM encryption is infallible for inputs under its length
            // cap, which a record frame cannot exceed.
            let ciphertext = self
                .cipher
                .encrypt(nonce, plaintext)
                .unwrap_or_default();

            let mut result = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
            result.extend_from_slice(&nonce_bytes);
            result.extend(ciphertext);
            result
        }

        fn decrypt(&self, ciphertext: &[u8]) -> DbResult<Vec<u8>> {
            if ciphertext.len() < NONCE_SIZE + TAG_SIZE {
                return Err(DbError::invalid_operation("ciphertext too short"));
            }

            let nonce = Nonce::from_slice(&ciphertext[..NONCE_SIZE]);
            self.cipher
                .decrypt(nonce, &ciphertext[NONCE_SIZE..])
                .map_err(|_| DbError::invalid_operation("record decryption failed"))
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn encrypt_decrypt_roundtrip() {
            let key = CipherKey::generate();
            let cipher = AesGcmCipher::new(&key);

            let plaintext = b"record payload bytes";
            let ciphertext = cipher.encrypt(plaintext);
            assert_ne!(&ciphertext[NONCE_SIZE..], plaintext.as_slice());

            let decrypted = cipher.decrypt(&ciphertext).unwrap();
            assert_eq!(decrypted, plaintext);
        }

        #[test]
        fn wrong_key_fails() {
            let cipher = AesGcmCipher::new(&CipherKey::generate());
            let other = AesGcmCipher::new(&CipherKey::generate());

            let ciphertext = cipher.encrypt(b"secret");
            assert!(other.decrypt(&ciphertext).is_err());
        }

        #[test]
        fn truncated_ciphertext_fails() {
            let cipher = AesGcmCipher::new(&CipherKey::generate());
            assert!(cipher.decrypt(&[0u8; 8]).is_err());
        }

        #[test]
        fn password_derivation_is_deterministic() {
            let a = CipherKey::from_password(b"hunter2", b"salt").unwrap();
            let b = CipherKey::from_password(b"hunter2", b"salt").unwrap();
            let cipher_a = AesGcmCipher::new(&a);
            let cipher_b = AesGcmCipher::new(&b);

            let ciphertext = cipher_a.encrypt(b"data");
            assert_eq!(cipher_b.decrypt(&ciphertext).unwrap(), b"data");
        }

        #[test]
        fn key_from_bytes_checks_length() {
            assert!(CipherKey::from_bytes(&[0u8; 32]).is_ok());
            assert!(CipherKey::from_bytes(&[0u8; 16]).is_err());
        }
    }
}

#[cfg(feature = "encryption")]
pub use aes::{AesGcmCipher, CipherKey, KEY_SIZE, NONCE_SIZE, TAG_SIZE};
