//! Store entry
//!
//! Serialized shape:
//! `{ encrypted, iv, originalName, originalSize, originalType, timestamp, consumed }`
//! with `encrypted` and `iv` as standard base64. The key is never stored;
//! it travels only inside the share link.

use serde::{Deserialize, Serialize};
use veil_core::FileMeta;
use veil_crypto::{CipherEnvelope, NONCE_SIZE};

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredTransfer {
    /// Ciphertext including the tag
    #[serde(with = "b64")]
    pub encrypted: Vec<u8>,
    #[serde(with = "b64_nonce")]
    pub iv: [u8; NONCE_SIZE],
    pub original_name: String,
    pub original_size: u64,
    pub original_type: String,
    /// Unix milliseconds at staging; expiry is measured from here
    pub timestamp: u64,
    pub consumed: bool,
}

impl StoredTransfer {
    pub fn new(envelope: CipherEnvelope, meta: &FileMeta, created_at: u64) -> Self {
        Self {
            encrypted: envelope.ciphertext,
            iv: envelope.nonce,
            original_name: meta.name.clone(),
            original_size: meta.size,
            original_type: meta.mime.clone(),
            timestamp: created_at,
            consumed: false,
        }
    }

    pub fn meta(&self) -> FileMeta {
        FileMeta::new(
            self.original_name.clone(),
            self.original_size,
            self.original_type.clone(),
        )
    }

    /// Copy of the ciphertext and nonce, ready for `veil_crypto::decrypt`
    pub fn envelope(&self) -> CipherEnvelope {
        CipherEnvelope {
            ciphertext: self.encrypted.clone(),
            nonce: self.iv,
        }
    }
}

impl std::fmt::Debug for StoredTransfer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoredTransfer")
            .field("encrypted_len", &self.encrypted.len())
            .field("original_name", &self.original_name)
            .field("original_size", &self.original_size)
            .field("original_type", &self.original_type)
            .field("timestamp", &self.timestamp)
            .field("consumed", &self.consumed)
            .finish()
    }
}

mod b64 {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        STANDARD.decode(s).map_err(serde::de::Error::custom)
    }
}

mod b64_nonce {
    use serde::{Deserializer, Serializer};
    use veil_crypto::NONCE_SIZE;

    pub fn serialize<S: Serializer>(nonce: &[u8; NONCE_SIZE], s: S) -> Result<S::Ok, S::Error> {
        super::b64::serialize(nonce, s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<[u8; NONCE_SIZE], D::Error> {
        let bytes = super::b64::deserialize(d)?;
        bytes.try_into().map_err(|v: Vec<u8>| {
            serde::de::Error::custom(format!("iv is {} bytes (expected {NONCE_SIZE})", v.len()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> StoredTransfer {
        let envelope = CipherEnvelope {
            ciphertext: vec![1, 2, 3, 4],
            nonce: [9u8; NONCE_SIZE],
        };
        StoredTransfer::new(envelope, &FileMeta::new("a.txt", 4, "text/plain"), 42)
    }

    #[test]
    fn entry_uses_wire_field_names() {
        let json = serde_json::to_value(sample()).unwrap();
        for field in [
            "encrypted",
            "iv",
            "originalName",
            "originalSize",
            "originalType",
            "timestamp",
            "consumed",
        ] {
            assert!(json.get(field).is_some(), "missing {field}");
        }
        assert!(json.get("key").is_none(), "keys are never stored");
        assert_eq!(json["encrypted"], "AQIDBA==");
    }

    #[test]
    fn entry_json_roundtrip() {
        let record = sample();
        let parsed: StoredTransfer =
            serde_json::from_value(serde_json::to_value(&record).unwrap()).unwrap();
        assert_eq!(parsed, record);
        assert_eq!(parsed.meta(), FileMeta::new("a.txt", 4, "text/plain"));
    }

    #[test]
    fn envelope_carries_ciphertext_and_iv() {
        let envelope = sample().envelope();
        assert_eq!(envelope.ciphertext, vec![1, 2, 3, 4]);
        assert_eq!(envelope.nonce, [9u8; NONCE_SIZE]);
    }

    #[test]
    fn short_iv_is_rejected() {
        let mut json = serde_json::to_value(sample()).unwrap();
        json["iv"] = serde_json::Value::from("AAAA");
        assert!(serde_json::from_value::<StoredTransfer>(json).is_err());
    }

    #[test]
    fn debug_hides_ciphertext() {
        let dbg = format!("{:?}", sample());
        assert!(dbg.contains("encrypted_len: 4"), "{dbg}");
    }
}
