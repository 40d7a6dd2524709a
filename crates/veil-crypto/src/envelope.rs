//! Whole-payload AEAD sealing
//!
//! Envelope byte form, used when the envelope travels as one opaque blob:
//! ```text
//! [12 bytes: random nonce][N bytes: ciphertext][16 bytes: tag]
//! ```
//! No AAD: the transfer key is single-use, so there is nothing else to bind.

use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::Aes256Gcm;
use chacha20poly1305::ChaCha20Poly1305;
use serde::{Deserialize, Serialize};
use veil_core::{CipherAlgorithm, VeilError, VeilResult};
use zeroize::Zeroizing;

use crate::keys::EncryptionKey;
use crate::{fill_random, NONCE_SIZE, TAG_SIZE};

/// Output of one encryption call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CipherEnvelope {
    /// Ciphertext with the 16-byte tag appended
    pub ciphertext: Vec<u8>,
    pub nonce: [u8; NONCE_SIZE],
}

impl CipherEnvelope {
    /// `nonce || ciphertext`
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(NONCE_SIZE + self.ciphertext.len());
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.ciphertext);
        out
    }

    /// Split `nonce || ciphertext`. Input too short to hold a nonce and a tag
    /// can never authenticate and is rejected as such.
    pub fn from_bytes(bytes: &[u8]) -> VeilResult<Self> {
        if bytes.len() < NONCE_SIZE + TAG_SIZE {
            tracing::debug!(len = bytes.len(), "envelope shorter than nonce + tag");
            return Err(VeilError::AuthenticationFailed);
        }
        let (nonce_bytes, ciphertext) = bytes.split_at(NONCE_SIZE);
        let mut nonce = [0u8; NONCE_SIZE];
        nonce.copy_from_slice(nonce_bytes);
        Ok(Self {
            ciphertext: ciphertext.to_vec(),
            nonce,
        })
    }

    /// Size of [`Self::to_bytes`] without building it
    pub fn encoded_len(&self) -> usize {
        NONCE_SIZE + self.ciphertext.len()
    }
}

/// Encrypt `plaintext` under `key` with a fresh random nonce.
pub fn encrypt(plaintext: &[u8], key: &EncryptionKey) -> VeilResult<CipherEnvelope> {
    let mut nonce = [0u8; NONCE_SIZE];
    fill_random(&mut nonce)?;
    let n = GenericArray::from_slice(&nonce);

    let ciphertext = match key.algorithm() {
        CipherAlgorithm::Aes256Gcm => Aes256Gcm::new(key.as_bytes().into()).encrypt(n, plaintext),
        CipherAlgorithm::ChaCha20Poly1305 => {
            ChaCha20Poly1305::new(key.as_bytes().into()).encrypt(n, plaintext)
        }
    }
    // Only reachable for plaintexts beyond the AEAD's length limit
    .map_err(|e| VeilError::ProtocolViolation(format!("payload cannot be sealed: {e}")))?;

    Ok(CipherEnvelope { ciphertext, nonce })
}

/// Decrypt and verify. On any failure no plaintext is returned.
pub fn decrypt(envelope: &CipherEnvelope, key: &EncryptionKey) -> VeilResult<Zeroizing<Vec<u8>>> {
    if envelope.ciphertext.len() < TAG_SIZE {
        return Err(VeilError::AuthenticationFailed);
    }
    let n = GenericArray::from_slice(&envelope.nonce);
    let ct = envelope.ciphertext.as_slice();

    let plaintext = match key.algorithm() {
        CipherAlgorithm::Aes256Gcm => Aes256Gcm::new(key.as_bytes().into()).decrypt(n, ct),
        CipherAlgorithm::ChaCha20Poly1305 => {
            ChaCha20Poly1305::new(key.as_bytes().into()).decrypt(n, ct)
        }
    }
    .map_err(|_| VeilError::AuthenticationFailed)?;

    Ok(Zeroizing::new(plaintext))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::generate_key;
    use proptest::prelude::*;

    fn aes_key() -> EncryptionKey {
        generate_key(CipherAlgorithm::Aes256Gcm).unwrap()
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        for alg in [CipherAlgorithm::Aes256Gcm, CipherAlgorithm::ChaCha20Poly1305] {
            let key = generate_key(alg).unwrap();
            let plaintext = b"hello, encrypted world!";
            let envelope = encrypt(plaintext, &key).unwrap();
            let decrypted = decrypt(&envelope, &key).unwrap();
            assert_eq!(decrypted.as_slice(), plaintext);
        }
    }

    #[test]
    fn test_encrypt_decrypt_empty() {
        let key = aes_key();
        let envelope = encrypt(b"", &key).unwrap();
        assert_eq!(envelope.ciphertext.len(), TAG_SIZE);
        assert!(decrypt(&envelope, &key).unwrap().is_empty());
    }

    #[test]
    fn test_ciphertext_size() {
        let key = aes_key();
        let envelope = encrypt(&[0u8; 1000], &key).unwrap();
        // plaintext (1000) + tag (16); nonce travels separately
        assert_eq!(envelope.ciphertext.len(), 1000 + TAG_SIZE);
        assert_eq!(envelope.encoded_len(), NONCE_SIZE + 1000 + TAG_SIZE);
    }

    #[test]
    fn test_nonce_freshness() {
        let key = aes_key();
        let a = encrypt(b"same input", &key).unwrap();
        let b = encrypt(b"same input", &key).unwrap();
        assert_ne!(a.nonce, b.nonce);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn test_decrypt_wrong_key() {
        let envelope = encrypt(b"secret data", &aes_key()).unwrap();
        assert!(matches!(
            decrypt(&envelope, &aes_key()),
            Err(VeilError::AuthenticationFailed)
        ));
    }

    #[test]
    fn test_decrypt_wrong_algorithm() {
        let key = aes_key();
        let envelope = encrypt(b"secret data", &key).unwrap();
        let swapped = EncryptionKey::from_bytes(*key.as_bytes(), CipherAlgorithm::ChaCha20Poly1305);
        assert!(matches!(
            decrypt(&envelope, &swapped),
            Err(VeilError::AuthenticationFailed)
        ));
    }

    #[test]
    fn test_truncated_ciphertext() {
        let key = aes_key();
        let mut envelope = encrypt(b"secret data", &key).unwrap();
        envelope.ciphertext.truncate(4);
        assert!(matches!(
            decrypt(&envelope, &key),
            Err(VeilError::AuthenticationFailed)
        ));
    }

    #[test]
    fn test_bytes_roundtrip_and_short_input() {
        let key = aes_key();
        let envelope = encrypt(b"bytes form", &key).unwrap();
        let parsed = CipherEnvelope::from_bytes(&envelope.to_bytes()).unwrap();
        assert_eq!(parsed, envelope);

        assert!(matches!(
            CipherEnvelope::from_bytes(&[0u8; NONCE_SIZE + TAG_SIZE - 1]),
            Err(VeilError::AuthenticationFailed)
        ));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn roundtrip_any_payload(data in proptest::collection::vec(any::<u8>(), 0..4096)) {
            let key = aes_key();
            let envelope = encrypt(&data, &key).unwrap();
            let out = decrypt(&envelope, &key).unwrap();
            prop_assert_eq!(out.as_slice(), data.as_slice());
        }

        /// Flipping any single bit of nonce or ciphertext must fail authentication
        #[test]
        fn any_bit_flip_is_detected(
            data in proptest::collection::vec(any::<u8>(), 1..256),
            pos in any::<prop::sample::Index>(),
            bit in 0u8..8,
        ) {
            let key = generate_key(CipherAlgorithm::ChaCha20Poly1305).unwrap();
            let envelope = encrypt(&data, &key).unwrap();
            let mut bytes = envelope.to_bytes();
            let i = pos.index(bytes.len());
            bytes[i] ^= 1 << bit;

            let tampered = CipherEnvelope::from_bytes(&bytes).unwrap();
            prop_assert!(matches!(
                decrypt(&tampered, &key),
                Err(VeilError::AuthenticationFailed)
            ));
        }
    }
}
