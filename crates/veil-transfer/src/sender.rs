//! Sending side of a transfer
//!
//! `share` runs `Idle -> Encrypting -> Staging -> LinkReady`:
//!   1. fresh key, whole-file AEAD, plaintext dropped
//!   2. staged: envelope goes into the `Stager` under a fresh transfer id
//!      direct: a peer session is opened and the envelope is split to frames
//!   3. descriptor minted and encoded as the share link
//!
//! Direct transfers return a [`PendingDelivery`] whose `serve` waits for the
//! receiver and streams (`Streaming -> Sent`).

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};
use veil_chunks::SplitFrames;
use veil_core::config::{LinkConfig, VeilConfig};
use veil_core::{CipherAlgorithm, Clock, FileMeta, SystemClock, TransferMode, VeilError, VeilResult};
use veil_link::{Locator, TransferDescriptor};
use veil_store::{Stager, StoredTransfer};
use zeroize::Zeroizing;

use crate::channel::{PeerListener, PeerTransport};
use crate::state::{ratio, Progress, ProgressFn, SenderState};

/// Raw file bytes plus the metadata the receiver will be shown.
pub struct OutgoingFile {
    pub meta: FileMeta,
    pub bytes: Zeroizing<Vec<u8>>,
}

impl OutgoingFile {
    pub fn new(name: impl Into<String>, mime: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            meta: FileMeta::new(name, bytes.len() as u64, mime),
            bytes: Zeroizing::new(bytes),
        }
    }

    pub async fn from_path(path: &Path) -> VeilResult<Self> {
        let bytes = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".to_string());
        Ok(Self::new(name, "application/octet-stream", bytes))
    }
}

impl std::fmt::Debug for OutgoingFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutgoingFile")
            .field("meta", &self.meta)
            .finish_non_exhaustive()
    }
}

/// Result of `Sender::share`.
pub struct Share {
    pub transfer_id: String,
    pub link: String,
    /// Present in direct mode; must be served for the receiver to get anything
    pub delivery: Option<PendingDelivery>,
}

pub struct Sender {
    mode: TransferMode,
    algorithm: CipherAlgorithm,
    chunk_size: usize,
    /// Overrides the stager's default TTL when set
    ttl: Option<Duration>,
    link: LinkConfig,
    stager: Option<Arc<dyn Stager>>,
    transport: Option<Arc<dyn PeerTransport>>,
    clock: Arc<dyn Clock>,
    progress: Option<ProgressFn>,
}

impl Sender {
    pub fn new(config: &VeilConfig) -> Self {
        Self {
            mode: config.transfer.mode,
            algorithm: config.transfer.algorithm,
            chunk_size: config.transfer.chunk_size,
            ttl: None,
            link: config.link.clone(),
            stager: None,
            transport: None,
            clock: Arc::new(SystemClock),
            progress: None,
        }
    }

    pub fn with_mode(mut self, mode: TransferMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn with_stager(mut self, stager: Arc<dyn Stager>) -> Self {
        self.stager = Some(stager);
        self
    }

    pub fn with_transport(mut self, transport: Arc<dyn PeerTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_progress(mut self, progress: ProgressFn) -> Self {
        self.progress = Some(progress);
        self
    }

    pub async fn share(&self, file: OutgoingFile) -> VeilResult<Share> {
        let progress = Progress::new(self.progress.clone());
        progress.sender(SenderState::Idle, 0.0);

        match self.share_inner(file, &progress).await {
            Ok(share) => Ok(share),
            Err(e) => {
                warn!(error = %e, "share failed");
                progress.sender(SenderState::Failed(e.kind()), 1.0);
                Err(e)
            }
        }
    }

    async fn share_inner(&self, file: OutgoingFile, progress: &Progress) -> VeilResult<Share> {
        let OutgoingFile { meta, bytes } = file;

        progress.sender(SenderState::Encrypting, 0.0);
        let key = veil_crypto::generate_key(self.algorithm)?;
        let envelope = veil_crypto::encrypt(&bytes, &key)?;
        // plaintext is not retained once the envelope exists
        drop(bytes);
        progress.sender(SenderState::Encrypting, 1.0);

        progress.sender(SenderState::Staging, 0.0);
        let transfer_id = veil_crypto::generate_id()?;
        let now = self.clock.now_millis();
        let (locator, delivery) = match self.mode {
            TransferMode::Staged => {
                let stager = self.stager.as_ref().ok_or_else(|| {
                    VeilError::Config("staged mode needs a transient store".into())
                })?;
                let record = StoredTransfer::new(envelope, &meta, now);
                let ttl = self.ttl.unwrap_or_else(|| stager.default_ttl());
                stager.stage(&transfer_id, record, ttl)?;
                (Locator::Staged, None)
            }
            TransferMode::Direct => {
                let transport = self.transport.as_ref().ok_or_else(|| {
                    VeilError::Config("direct mode needs a peer transport".into())
                })?;
                let frames = SplitFrames::new(envelope.to_bytes(), self.chunk_size, &meta)?;
                let (offer, listener) = transport.open().await?;
                let delivery = PendingDelivery {
                    transfer_id: transfer_id.clone(),
                    listener,
                    frames,
                    progress: progress.clone(),
                };
                (Locator::Direct { offer }, Some(delivery))
            }
        };
        progress.sender(SenderState::Staging, 1.0);

        let descriptor = TransferDescriptor::new(
            transfer_id.clone(),
            veil_crypto::export_key(&key),
            locator,
            meta,
            now,
        );
        let link = veil_link::encode(&descriptor, &self.link)?;

        info!(
            transfer_id = %transfer_id,
            mode = %self.mode,
            size = descriptor.meta.size,
            "link ready"
        );
        progress.sender(SenderState::LinkReady, 1.0);

        Ok(Share {
            transfer_id,
            link,
            delivery,
        })
    }
}

/// A direct transfer whose link is out but whose frames are not yet sent.
pub struct PendingDelivery {
    transfer_id: String,
    listener: Box<dyn PeerListener>,
    frames: SplitFrames,
    progress: Progress,
}

impl PendingDelivery {
    pub fn transfer_id(&self) -> &str {
        &self.transfer_id
    }

    /// Frames that `serve` will send, `Info` and `Complete` included
    pub fn frame_count(&self) -> u64 {
        self.frames.frame_count()
    }

    /// Wait for the receiver, then stream every frame. Each `send` waits on
    /// the channel, so a slow receiver slows the sender.
    pub async fn serve(self) -> VeilResult<()> {
        let progress = self.progress.clone();
        let transfer_id = self.transfer_id.clone();
        match self.serve_inner().await {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!(transfer_id = %transfer_id, error = %e, "delivery failed");
                progress.sender(SenderState::Failed(e.kind()), 1.0);
                Err(e)
            }
        }
    }

    async fn serve_inner(self) -> VeilResult<()> {
        let PendingDelivery {
            transfer_id,
            mut listener,
            frames,
            progress,
        } = self;

        let mut sink = listener.accept().await?;
        let total = frames.frame_count();
        let chunks = frames.total_chunks();
        progress.sender(SenderState::Streaming, 0.0);

        for (i, frame) in frames.enumerate() {
            sink.send(frame).await?;
            progress.sender(SenderState::Streaming, ratio(i as u64 + 1, total));
        }
        sink.finish().await?;

        info!(transfer_id = %transfer_id, frames = total, chunks, "transfer sent");
        progress.sender(SenderState::Sent, 1.0);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryTransport;
    use std::sync::Mutex;
    use veil_core::config::StoreConfig;
    use veil_core::ManualClock;
    use veil_store::TransientStore;

    use crate::state::{TransferEvent, TransferState};

    fn recorder() -> (ProgressFn, Arc<Mutex<Vec<TransferEvent>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        (
            Arc::new(move |e: TransferEvent| sink.lock().unwrap().push(e)),
            seen,
        )
    }

    fn states(seen: &Mutex<Vec<TransferEvent>>) -> Vec<SenderState> {
        let mut out: Vec<SenderState> = Vec::new();
        for e in seen.lock().unwrap().iter() {
            if let TransferState::Sender(s) = e.state {
                if out.last() != Some(&s) {
                    out.push(s);
                }
            }
        }
        out
    }

    #[tokio::test]
    async fn staged_share_walks_to_link_ready() {
        let store = Arc::new(TransientStore::new(&StoreConfig::default()));
        let (cb, seen) = recorder();
        let sender = Sender::new(&VeilConfig::default())
            .with_stager(store.clone())
            .with_progress(cb);

        let share = sender
            .share(OutgoingFile::new("a.txt", "text/plain", b"hello".to_vec()))
            .await
            .unwrap();

        assert!(share.delivery.is_none());
        assert!(share.link.starts_with("https://veil.local/download/"));
        assert!(store.contains(&share.transfer_id));
        assert_eq!(
            states(&seen),
            [
                SenderState::Idle,
                SenderState::Encrypting,
                SenderState::Staging,
                SenderState::LinkReady
            ]
        );
    }

    #[tokio::test]
    async fn staged_ttl_defaults_to_the_store() {
        let clock = ManualClock::new(5_000_000);
        let store_config = StoreConfig {
            ttl_secs: 60,
            ..StoreConfig::default()
        };
        let store = Arc::new(TransientStore::with_clock(&store_config, Arc::new(clock.clone())));
        let sender = Sender::new(&VeilConfig::default()).with_stager(store.clone());
        let share = sender
            .share(OutgoingFile::new("a", "", vec![1, 2, 3]))
            .await
            .unwrap();

        clock.advance(Duration::from_secs(61));
        assert!(!store.contains(&share.transfer_id));
        assert!(matches!(
            store.fetch_and_consume(&share.transfer_id),
            Err(VeilError::Expired)
        ));
    }

    #[tokio::test]
    async fn explicit_ttl_overrides_the_store() {
        let clock = ManualClock::new(5_000_000);
        let store = Arc::new(TransientStore::with_clock(
            &StoreConfig::default(),
            Arc::new(clock.clone()),
        ));
        let sender = Sender::new(&VeilConfig::default())
            .with_stager(store.clone())
            .with_ttl(Duration::from_secs(10));
        let share = sender
            .share(OutgoingFile::new("a", "", vec![1]))
            .await
            .unwrap();

        clock.advance(Duration::from_secs(10));
        assert!(store.contains(&share.transfer_id));
        clock.advance(Duration::from_secs(1));
        assert!(!store.contains(&share.transfer_id));
    }

    #[tokio::test]
    async fn staged_record_holds_ciphertext_only() {
        let store = Arc::new(TransientStore::new(&StoreConfig::default()));
        let sender = Sender::new(&VeilConfig::default()).with_stager(store.clone());
        let secret = b"attack at dawn, attack at dawn".to_vec();
        let share = sender
            .share(OutgoingFile::new("plan.txt", "", secret.clone()))
            .await
            .unwrap();

        let record = store.fetch_and_consume(&share.transfer_id).unwrap();
        assert_eq!(record.encrypted.len(), secret.len() + veil_crypto::TAG_SIZE);
        assert!(!record.encrypted.windows(6).any(|w| w == b"attack"));
    }

    #[tokio::test]
    async fn missing_capability_is_a_config_error() {
        let (cb, seen) = recorder();
        let sender = Sender::new(&VeilConfig::default()).with_progress(cb);
        let err = sender
            .share(OutgoingFile::new("a", "", vec![1]))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, VeilError::Config(_)));
        assert!(matches!(
            states(&seen).last(),
            Some(SenderState::Failed(veil_core::ErrorKind::Config))
        ));

        let direct = Sender::new(&VeilConfig::default()).with_mode(TransferMode::Direct);
        assert!(matches!(
            direct.share(OutgoingFile::new("a", "", vec![1])).await,
            Err(VeilError::Config(_))
        ));
    }

    #[tokio::test]
    async fn direct_share_defers_streaming() {
        let transport = Arc::new(MemoryTransport::new(8));
        let mut config = VeilConfig::default();
        config.transfer.chunk_size = 16;
        let sender = Sender::new(&config)
            .with_mode(TransferMode::Direct)
            .with_transport(transport.clone());

        let share = sender
            .share(OutgoingFile::new("x.bin", "", vec![7; 34]))
            .await
            .unwrap();
        let delivery = share.delivery.unwrap();
        assert_eq!(delivery.transfer_id(), share.transfer_id);
        // 34 + 16 tag = 50 bytes of ciphertext, + 12 nonce = 62 -> 4 chunks
        assert_eq!(delivery.frame_count(), 6);
        assert_eq!(transport.pending(), 1);
    }
}
