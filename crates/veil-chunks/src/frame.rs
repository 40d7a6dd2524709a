use serde::{Deserialize, Serialize};
use veil_core::FileMeta;

/// Header frame: what is coming and how many chunks carry it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameInfo {
    pub name: String,
    /// Plaintext size
    pub size: u64,
    #[serde(rename = "type", default)]
    pub mime: String,
    #[serde(rename = "totalChunks")]
    pub total_chunks: u64,
    /// Byte length of the reassembled envelope
    #[serde(rename = "encryptedSize")]
    pub encrypted_size: u64,
}

impl FrameInfo {
    pub fn meta(&self) -> FileMeta {
        FileMeta::new(self.name.clone(), self.size, self.mime.clone())
    }
}

/// One unit of the transfer protocol.
#[derive(Clone, PartialEq, Eq)]
pub enum Frame {
    Info(FrameInfo),
    Chunk {
        index: u64,
        total_chunks: u64,
        payload: Vec<u8>,
    },
    Complete,
}

impl Frame {
    pub fn kind(&self) -> &'static str {
        match self {
            Frame::Info(_) => "info",
            Frame::Chunk { .. } => "chunk",
            Frame::Complete => "complete",
        }
    }
}

// Chunk payloads can be large; print their length only.
impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Frame::Info(info) => f.debug_tuple("Info").field(info).finish(),
            Frame::Chunk {
                index,
                total_chunks,
                payload,
            } => f
                .debug_struct("Chunk")
                .field("index", index)
                .field("total_chunks", total_chunks)
                .field("len", &payload.len())
                .finish(),
            Frame::Complete => f.write_str("Complete"),
        }
    }
}
