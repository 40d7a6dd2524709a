//! Index-driven reassembly
//!
//! Chunks are buffered by index, so arrival order does not matter. On an
//! ordered channel the buffer simply fills front to back. Rules:
//!   - exactly one `Info`, before any `Chunk`
//!   - every index in `0..total_chunks` exactly once
//!   - `Complete` last; an early `Complete` is an incomplete transfer
//!   - reassembled length must equal the announced `encrypted_size`

use std::collections::BTreeMap;

use tracing::{debug, trace};
use veil_core::{VeilError, VeilResult};

use crate::frame::{Frame, FrameInfo};

/// What a single pushed frame did to the reassembly.
#[derive(Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    Started(FrameInfo),
    Progress { received: u64, total: u64 },
    Finished(Vec<u8>),
}

#[derive(Debug, Default)]
pub struct Reassembler {
    info: Option<FrameInfo>,
    chunks: BTreeMap<u64, Vec<u8>>,
    buffered: u64,
    finished: bool,
}

impl Reassembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn info(&self) -> Option<&FrameInfo> {
        self.info.as_ref()
    }

    pub fn received(&self) -> u64 {
        self.chunks.len() as u64
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn push(&mut self, frame: Frame) -> VeilResult<FrameOutcome> {
        if self.finished {
            return Err(violation(format!("{} frame after complete", frame.kind())));
        }
        match frame {
            Frame::Info(info) => {
                if self.info.is_some() {
                    return Err(violation("duplicate info frame"));
                }
                debug!(
                    total_chunks = info.total_chunks,
                    encrypted_size = info.encrypted_size,
                    "transfer started"
                );
                self.info = Some(info.clone());
                Ok(FrameOutcome::Started(info))
            }
            Frame::Chunk {
                index,
                total_chunks,
                payload,
            } => {
                let info = self
                    .info
                    .as_ref()
                    .ok_or_else(|| violation(format!("chunk {index} before info frame")))?;
                if total_chunks != info.total_chunks {
                    return Err(violation(format!(
                        "chunk {index} claims {total_chunks} chunks, info announced {}",
                        info.total_chunks
                    )));
                }
                if index >= info.total_chunks {
                    return Err(violation(format!(
                        "chunk index {index} out of range (total {})",
                        info.total_chunks
                    )));
                }
                if self.chunks.contains_key(&index) {
                    return Err(violation(format!("duplicate chunk index {index}")));
                }
                let len = payload.len() as u64;
                if self.buffered + len > info.encrypted_size {
                    return Err(violation("chunks exceed announced size"));
                }
                self.chunks.insert(index, payload);
                self.buffered += len;
                trace!(index, len, "chunk buffered");
                Ok(FrameOutcome::Progress {
                    received: self.received(),
                    total: info.total_chunks,
                })
            }
            Frame::Complete => {
                let info = self
                    .info
                    .as_ref()
                    .ok_or_else(|| violation("complete before info frame"))?;
                let total = info.total_chunks;
                let received = self.received();
                if received < total {
                    return Err(VeilError::IncompleteTransfer {
                        missing: total - received,
                        total,
                    });
                }
                if self.buffered != info.encrypted_size {
                    return Err(violation(format!(
                        "reassembled {} bytes, info announced {}",
                        self.buffered, info.encrypted_size
                    )));
                }
                self.finished = true;
                let mut out = Vec::with_capacity(self.buffered as usize);
                // BTreeMap iterates in index order
                for (_, chunk) in std::mem::take(&mut self.chunks) {
                    out.extend_from_slice(&chunk);
                }
                debug!(chunks = total, bytes = out.len(), "transfer reassembled");
                Ok(FrameOutcome::Finished(out))
            }
        }
    }

    /// Error for a stream that ended without `Complete`.
    pub fn ended_early(&self) -> VeilError {
        match &self.info {
            Some(info) => VeilError::IncompleteTransfer {
                missing: info.total_chunks - self.received(),
                total: info.total_chunks,
            },
            None => violation("stream ended before info frame"),
        }
    }
}

fn violation(msg: impl Into<String>) -> VeilError {
    VeilError::ProtocolViolation(msg.into())
}

/// Reassemble a complete frame sequence.
pub fn reassemble<I>(frames: I) -> VeilResult<Vec<u8>>
where
    I: IntoIterator<Item = Frame>,
{
    let mut r = Reassembler::new();
    for frame in frames {
        if let FrameOutcome::Finished(out) = r.push(frame)? {
            return Ok(out);
        }
    }
    Err(r.ended_early())
}
