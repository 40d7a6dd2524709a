//! JSON wire form of frames
//!
//! ```text
//! {"type":"info","data":{"name":..,"size":..,"type":..,"totalChunks":..,"encryptedSize":..}}
//! {"type":"chunk","data":"<base64>","chunkIndex":0,"totalChunks":4}
//! {"type":"complete","data":null}
//! ```

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use veil_core::{VeilError, VeilResult};

use crate::frame::{Frame, FrameInfo};

#[derive(Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum WireFrame {
    Info {
        data: FrameInfo,
    },
    Chunk {
        data: String,
        #[serde(rename = "chunkIndex")]
        chunk_index: u64,
        #[serde(rename = "totalChunks")]
        total_chunks: u64,
    },
    Complete {
        #[serde(default)]
        data: (),
    },
}

pub fn encode_frame(frame: &Frame) -> VeilResult<Vec<u8>> {
    let wire = match frame {
        Frame::Info(info) => WireFrame::Info { data: info.clone() },
        Frame::Chunk {
            index,
            total_chunks,
            payload,
        } => WireFrame::Chunk {
            data: STANDARD.encode(payload),
            chunk_index: *index,
            total_chunks: *total_chunks,
        },
        Frame::Complete => WireFrame::Complete { data: () },
    };
    serde_json::to_vec(&wire)
        .map_err(|e| VeilError::ProtocolViolation(format!("frame encoding: {e}")))
}

/// Parse one wire message. Anything malformed is a protocol violation.
pub fn decode_frame(bytes: &[u8]) -> VeilResult<Frame> {
    let wire: WireFrame = serde_json::from_slice(bytes)
        .map_err(|e| VeilError::ProtocolViolation(format!("frame decoding: {e}")))?;
    Ok(match wire {
        WireFrame::Info { data } => Frame::Info(data),
        WireFrame::Chunk {
            data,
            chunk_index,
            total_chunks,
        } => Frame::Chunk {
            index: chunk_index,
            total_chunks,
            payload: STANDARD.decode(data).map_err(|e| {
                VeilError::ProtocolViolation(format!("chunk {chunk_index} payload: {e}"))
            })?,
        },
        WireFrame::Complete { .. } => Frame::Complete,
    })
}
