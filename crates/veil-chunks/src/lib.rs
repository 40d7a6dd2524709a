//! veil-chunks: framing for message-oriented channels
//!
//! # Overview
//! - `frame`: the three frame kinds and their metadata
//! - `split`: envelope bytes → `Info`, `Chunk`×N, `Complete`
//! - `reassemble`: index-driven reassembly, tolerant of reordering
//! - `wire`: JSON text encoding of frames for transports

pub mod frame;
pub mod reassemble;
pub mod split;
pub mod wire;

pub use frame::{Frame, FrameInfo};
pub use reassemble::{reassemble, FrameOutcome, Reassembler};
pub use split::{split, total_chunks, SplitFrames};
pub use wire::{decode_frame, encode_frame};

/// Ciphertext bytes per chunk frame, sized to stay under typical
/// data-channel message ceilings.
pub const DEFAULT_CHUNK_SIZE: usize = 16 * 1024;
