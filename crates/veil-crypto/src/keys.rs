//! Transfer keys and their JWK-shaped export form

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use veil_core::{CipherAlgorithm, VeilError, VeilResult};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::{fill_random, KEY_SIZE};

/// A per-transfer 256-bit key bound to one AEAD. Zeroized on drop.
#[derive(Clone)]
pub struct EncryptionKey {
    bytes: [u8; KEY_SIZE],
    algorithm: CipherAlgorithm,
}

impl EncryptionKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE], algorithm: CipherAlgorithm) -> Self {
        Self { bytes, algorithm }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }

    pub fn algorithm(&self) -> CipherAlgorithm {
        self.algorithm
    }
}

impl Drop for EncryptionKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionKey")
            .field("algorithm", &self.algorithm)
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Exported key, shaped like an `oct` JSON Web Key.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct KeyMaterial {
    pub kty: String,
    pub alg: String,
    /// base64url (no padding) key bytes
    pub k: String,
    #[serde(default = "default_ext")]
    pub ext: bool,
}

fn default_ext() -> bool {
    true
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("kty", &self.kty)
            .field("alg", &self.alg)
            .field("k", &"[REDACTED]")
            .finish()
    }
}

/// Generate a fresh random key for `algorithm`.
pub fn generate_key(algorithm: CipherAlgorithm) -> VeilResult<EncryptionKey> {
    let mut bytes = [0u8; KEY_SIZE];
    fill_random(&mut bytes)?;
    Ok(EncryptionKey::from_bytes(bytes, algorithm))
}

pub fn export_key(key: &EncryptionKey) -> KeyMaterial {
    KeyMaterial {
        kty: "oct".into(),
        alg: key.algorithm.tag().into(),
        k: URL_SAFE_NO_PAD.encode(&key.bytes),
        ext: true,
    }
}

/// Rebuild a key from its exported form.
///
/// Fails with `MalformedKey` on a non-`oct` key type, an unknown algorithm,
/// undecodable key bytes, or a length other than 256 bits.
pub fn import_key(material: &KeyMaterial) -> VeilResult<EncryptionKey> {
    if material.kty != "oct" {
        return Err(VeilError::MalformedKey(format!(
            "unsupported key type {:?}",
            material.kty
        )));
    }
    let algorithm = CipherAlgorithm::from_tag(&material.alg).ok_or_else(|| {
        VeilError::MalformedKey(format!("unsupported algorithm {:?}", material.alg))
    })?;

    let raw = Zeroizing::new(
        URL_SAFE_NO_PAD
            .decode(material.k.trim_end_matches('='))
            .map_err(|e| VeilError::MalformedKey(format!("key bytes: {e}")))?,
    );
    if raw.len() != KEY_SIZE {
        return Err(VeilError::MalformedKey(format!(
            "key is {} bits (expected {})",
            raw.len() * 8,
            KEY_SIZE * 8
        )));
    }

    let mut bytes = [0u8; KEY_SIZE];
    bytes.copy_from_slice(&raw);
    Ok(EncryptionKey::from_bytes(bytes, algorithm))
}
