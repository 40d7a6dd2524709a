use serde::{Deserialize, Serialize};
use veil_core::FileMeta;
use veil_crypto::KeyMaterial;

/// Current descriptor schema. Older or newer versions are rejected.
pub const DESCRIPTOR_VERSION: u32 = 1;

/// Where the receiver finds the ciphertext.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Locator {
    /// Staged in a transient store under the descriptor's transfer id
    Staged,
    /// Streamed over a peer channel; `offer` is the transport's session description
    Direct { offer: String },
}

/// Everything a receiver needs, bundled into the link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferDescriptor {
    #[serde(rename = "v")]
    pub version: u32,
    #[serde(rename = "fileId")]
    pub transfer_id: String,
    pub key: KeyMaterial,
    pub locator: Locator,
    pub meta: FileMeta,
    /// Unix milliseconds at minting
    #[serde(rename = "timestamp")]
    pub created_at: u64,
}

impl TransferDescriptor {
    pub fn new(
        transfer_id: String,
        key: KeyMaterial,
        locator: Locator,
        meta: FileMeta,
        created_at: u64,
    ) -> Self {
        Self {
            version: DESCRIPTOR_VERSION,
            transfer_id,
            key,
            locator,
            meta,
            created_at,
        }
    }
}
