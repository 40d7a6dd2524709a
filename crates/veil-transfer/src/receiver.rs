//! Receiving side of a transfer
//!
//! `Idle -> Resolving -> Transferring -> Decrypting -> Delivered`, or
//! `Failed(kind)` from whichever step broke. Plaintext is only ever
//! produced by a successful AEAD open, so no failure leaks partial data.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};
use veil_chunks::{FrameOutcome, Reassembler};
use veil_core::{FileMeta, VeilError, VeilResult};
use veil_crypto::{CipherEnvelope, EncryptionKey};
use veil_link::{Locator, TransferDescriptor};
use veil_store::{Stager, StoredTransfer};
use zeroize::Zeroizing;

use crate::channel::PeerTransport;
use crate::state::{ratio, Progress, ProgressFn, ReceiverState};

/// A decrypted file.
pub struct DeliveredFile {
    pub meta: FileMeta,
    pub plaintext: Zeroizing<Vec<u8>>,
}

impl DeliveredFile {
    /// Plaintext in slices of at most `size` bytes, for callers that write
    /// incrementally.
    pub fn chunks(&self, size: usize) -> std::slice::Chunks<'_, u8> {
        self.plaintext.chunks(size.max(1))
    }

    /// Write into `dir` under a sanitized version of the sender's file name.
    pub async fn write_to_dir(&self, dir: &Path) -> VeilResult<PathBuf> {
        let path = dir.join(safe_file_name(&self.meta.name));
        tokio::fs::write(&path, self.plaintext.as_slice()).await?;
        Ok(path)
    }
}

impl std::fmt::Debug for DeliveredFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeliveredFile")
            .field("meta", &self.meta)
            .field("len", &self.plaintext.len())
            .finish()
    }
}

/// The name is sender-controlled; keep only its final component.
fn safe_file_name(name: &str) -> String {
    let base = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();
    match base {
        "" | "." | ".." => "download".to_string(),
        other => other.to_string(),
    }
}

#[derive(Default)]
pub struct Receiver {
    stager: Option<Arc<dyn Stager>>,
    transport: Option<Arc<dyn PeerTransport>>,
    progress: Option<ProgressFn>,
}

impl Receiver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stager(mut self, stager: Arc<dyn Stager>) -> Self {
        self.stager = Some(stager);
        self
    }

    pub fn with_transport(mut self, transport: Arc<dyn PeerTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn with_progress(mut self, progress: ProgressFn) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Redeem a share link (or bare token).
    pub async fn receive(&self, link: &str) -> VeilResult<DeliveredFile> {
        let progress = Progress::new(self.progress.clone());
        progress.receiver(ReceiverState::Idle, 0.0);

        match self.receive_inner(link, &progress).await {
            Ok(file) => {
                progress.receiver(ReceiverState::Delivered, 1.0);
                Ok(file)
            }
            Err(e) => {
                warn!(category = e.category(), error = %e, "receive failed");
                progress.receiver(ReceiverState::Failed(e.kind()), 1.0);
                Err(e)
            }
        }
    }

    async fn receive_inner(&self, link: &str, progress: &Progress) -> VeilResult<DeliveredFile> {
        progress.receiver(ReceiverState::Resolving, 0.0);
        let descriptor = veil_link::decode(link)?;
        let key = veil_crypto::import_key(&descriptor.key)?;
        progress.receiver(ReceiverState::Resolving, 1.0);

        progress.receiver(ReceiverState::Transferring, 0.0);
        let plaintext = match &descriptor.locator {
            Locator::Staged => self.redeem_staged(&descriptor, &key, progress)?,
            Locator::Direct { offer } => {
                let envelope = self.fetch_direct(offer, progress).await?;
                progress.receiver(ReceiverState::Transferring, 1.0);
                progress.receiver(ReceiverState::Decrypting, 0.0);
                veil_crypto::decrypt(&envelope, &key)?
            }
        };
        if plaintext.len() as u64 != descriptor.meta.size {
            debug!(
                announced = descriptor.meta.size,
                actual = plaintext.len(),
                "plaintext size differs from descriptor"
            );
        }

        info!(
            transfer_id = %descriptor.transfer_id,
            bytes = plaintext.len(),
            "transfer delivered"
        );
        Ok(DeliveredFile {
            meta: descriptor.meta,
            plaintext,
        })
    }

    /// Decryption runs inside the store's redemption, so a link whose key
    /// does not open the record leaves it staged.
    fn redeem_staged(
        &self,
        descriptor: &TransferDescriptor,
        key: &EncryptionKey,
        progress: &Progress,
    ) -> VeilResult<Zeroizing<Vec<u8>>> {
        let stager = self
            .stager
            .as_ref()
            .ok_or_else(|| VeilError::Config("staged link but no transient store".into()))?;
        stager.redeem(&descriptor.transfer_id, &mut |record: &StoredTransfer| {
            progress.receiver(ReceiverState::Transferring, 1.0);
            progress.receiver(ReceiverState::Decrypting, 0.0);
            veil_crypto::decrypt(&record.envelope(), key)
        })
    }

    async fn fetch_direct(&self, offer: &str, progress: &Progress) -> VeilResult<CipherEnvelope> {
        let transport = self
            .transport
            .as_ref()
            .ok_or_else(|| VeilError::Config("direct link but no peer transport".into()))?;
        let mut source = transport.connect(offer).await?;
        let mut reassembler = Reassembler::new();

        while let Some(frame) = source.recv().await? {
            match reassembler.push(frame)? {
                FrameOutcome::Started(info) => {
                    debug!(chunks = info.total_chunks, bytes = info.encrypted_size, "receiving");
                }
                FrameOutcome::Progress { received, total } => {
                    progress.receiver(ReceiverState::Transferring, ratio(received, total));
                }
                FrameOutcome::Finished(bytes) => return CipherEnvelope::from_bytes(&bytes),
            }
        }
        Err(reassembler.ended_early())
    }
}
