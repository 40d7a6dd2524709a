//! Envelope → frame sequence

use veil_core::{FileMeta, VeilError, VeilResult};

use crate::frame::{Frame, FrameInfo};

/// `ceil(len / chunk_size)`
pub fn total_chunks(len: usize, chunk_size: usize) -> u64 {
    len.div_ceil(chunk_size) as u64
}

/// Lazily yields `Info`, every `Chunk` in index order, then `Complete`.
///
/// Owns the payload so a sender can hold it across awaits while streaming.
pub struct SplitFrames {
    payload: Vec<u8>,
    chunk_size: usize,
    info: Option<FrameInfo>,
    next: u64,
    total: u64,
    done: bool,
}

impl SplitFrames {
    pub fn new(payload: Vec<u8>, chunk_size: usize, meta: &FileMeta) -> VeilResult<Self> {
        if chunk_size == 0 {
            return Err(VeilError::ProtocolViolation("chunk size must be non-zero".into()));
        }
        let total = total_chunks(payload.len(), chunk_size);
        let info = FrameInfo {
            name: meta.name.clone(),
            size: meta.size,
            mime: meta.mime.clone(),
            total_chunks: total,
            encrypted_size: payload.len() as u64,
        };
        Ok(Self {
            payload,
            chunk_size,
            info: Some(info),
            next: 0,
            total,
            done: false,
        })
    }

    pub fn total_chunks(&self) -> u64 {
        self.total
    }

    /// Number of frames in the full sequence, including `Info` and `Complete`
    pub fn frame_count(&self) -> u64 {
        self.total + 2
    }
}

impl Iterator for SplitFrames {
    type Item = Frame;

    fn next(&mut self) -> Option<Frame> {
        if let Some(info) = self.info.take() {
            return Some(Frame::Info(info));
        }
        if self.next < self.total {
            let start = self.next as usize * self.chunk_size;
            let end = (start + self.chunk_size).min(self.payload.len());
            let frame = Frame::Chunk {
                index: self.next,
                total_chunks: self.total,
                payload: self.payload[start..end].to_vec(),
            };
            self.next += 1;
            return Some(frame);
        }
        if !self.done {
            self.done = true;
            return Some(Frame::Complete);
        }
        None
    }
}

/// Split `payload` into the full frame sequence.
pub fn split(payload: &[u8], chunk_size: usize, meta: &FileMeta) -> VeilResult<Vec<Frame>> {
    Ok(SplitFrames::new(payload.to_vec(), chunk_size, meta)?.collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(size: u64) -> FileMeta {
        FileMeta::new("notes.txt", size, "text/plain")
    }

    #[test]
    fn fifty_bytes_in_sixteen_byte_chunks() {
        let payload: Vec<u8> = (0..50).collect();
        let frames = split(&payload, 16, &meta(50)).unwrap();

        assert_eq!(frames.len(), 6);
        match &frames[0] {
            Frame::Info(info) => {
                assert_eq!(info.total_chunks, 4);
                assert_eq!(info.encrypted_size, 50);
                assert_eq!(info.name, "notes.txt");
            }
            other => panic!("expected info, got {other:?}"),
        }
        let sizes: Vec<usize> = frames[1..5]
            .iter()
            .map(|f| match f {
                Frame::Chunk { payload, .. } => payload.len(),
                other => panic!("expected chunk, got {other:?}"),
            })
            .collect();
        assert_eq!(sizes, vec![16, 16, 16, 2]);
        assert_eq!(frames[5], Frame::Complete);
    }

    #[test]
    fn chunk_indices_increase() {
        let frames = split(&[1u8; 100], 10, &meta(100)).unwrap();
        let indices: Vec<u64> = frames
            .iter()
            .filter_map(|f| match f {
                Frame::Chunk { index, total_chunks, .. } => {
                    assert_eq!(*total_chunks, 10);
                    Some(*index)
                }
                _ => None,
            })
            .collect();
        assert_eq!(indices, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn exact_multiple_has_no_short_tail() {
        let frames = split(&[0u8; 32], 16, &meta(32)).unwrap();
        assert_eq!(frames.len(), 4);
    }

    #[test]
    fn empty_payload_is_info_then_complete() {
        let frames = split(&[], 16, &meta(0)).unwrap();
        assert_eq!(frames.len(), 2);
        assert!(matches!(&frames[0], Frame::Info(i) if i.total_chunks == 0));
        assert_eq!(frames[1], Frame::Complete);
    }

    #[test]
    fn zero_chunk_size_is_rejected() {
        assert!(matches!(
            split(&[1, 2, 3], 0, &meta(3)),
            Err(VeilError::ProtocolViolation(_))
        ));
    }

    #[test]
    fn frame_count_matches_iteration() {
        let it = SplitFrames::new(vec![9u8; 1000], 64, &meta(1000)).unwrap();
        let expected = it.frame_count();
        assert_eq!(it.total_chunks(), 16);
        assert_eq!(expected, it.total_chunks() + 2);
        assert_eq!(it.count() as u64, expected);
    }
}
