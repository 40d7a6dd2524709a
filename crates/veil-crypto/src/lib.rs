//! veil-crypto: per-transfer authenticated encryption
//!
//! Every transfer gets a fresh 256-bit key. The whole file is sealed in one
//! AEAD call with a random 96-bit nonce:
//!
//! ```text
//! plaintext ──encrypt(key, random nonce)──> CipherEnvelope { nonce, ciphertext || tag }
//! ```
//!
//! The key leaves the process only as JWK-shaped [`KeyMaterial`] inside the
//! share link, never alongside the ciphertext on a wire.

pub mod envelope;
pub mod id;
pub mod keys;

pub use envelope::{decrypt, encrypt, CipherEnvelope};
pub use id::{generate_id, is_valid_id};
pub use keys::{export_key, generate_key, import_key, EncryptionKey, KeyMaterial};

/// Size of a symmetric key in bytes (256-bit)
pub const KEY_SIZE: usize = 32;

/// Size of an AES-GCM / ChaCha20-Poly1305 nonce (96-bit)
pub const NONCE_SIZE: usize = 12;

/// Size of the authentication tag appended to every ciphertext
pub const TAG_SIZE: usize = 16;

/// Bytes of entropy in a transfer id (128-bit)
pub const ID_BYTES: usize = 16;

use rand::rngs::OsRng;
use rand::RngCore;
use veil_core::{VeilError, VeilResult};

/// Fill `buf` from the OS CSPRNG, failing closed if it is unavailable.
pub(crate) fn fill_random(buf: &mut [u8]) -> VeilResult<()> {
    OsRng
        .try_fill_bytes(buf)
        .map_err(|e| VeilError::CryptoUnavailable(e.to_string()))
}
