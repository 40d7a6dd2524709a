use serde::{Deserialize, Serialize};

/// Metadata of the file being shared, carried alongside the ciphertext.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMeta {
    pub name: String,
    pub size: u64,
    /// MIME type; empty when the input surface did not know it
    #[serde(rename = "type", default)]
    pub mime: String,
}

impl FileMeta {
    pub fn new(name: impl Into<String>, size: u64, mime: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            size,
            mime: mime.into(),
        }
    }
}

/// How the ciphertext reaches the receiver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferMode {
    /// Ciphertext is staged in a transient store and redeemed once
    #[default]
    Staged,
    /// Ciphertext is streamed live over a peer channel
    Direct,
}

/// AEAD used for a transfer. Both take a 256-bit key and a 96-bit nonce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CipherAlgorithm {
    /// AES-256-GCM
    #[default]
    #[serde(rename = "A256GCM")]
    Aes256Gcm,
    /// ChaCha20-Poly1305
    #[serde(rename = "C20P")]
    ChaCha20Poly1305,
}

impl CipherAlgorithm {
    /// JWK-style `alg` tag
    pub fn tag(self) -> &'static str {
        match self {
            CipherAlgorithm::Aes256Gcm => "A256GCM",
            CipherAlgorithm::ChaCha20Poly1305 => "C20P",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "A256GCM" => Some(CipherAlgorithm::Aes256Gcm),
            "C20P" => Some(CipherAlgorithm::ChaCha20Poly1305),
            _ => None,
        }
    }
}

impl std::fmt::Display for TransferMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransferMode::Staged => f.write_str("staged"),
            TransferMode::Direct => f.write_str("direct"),
        }
    }
}
