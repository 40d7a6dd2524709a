//! In-process peer transport
//!
//! Sessions rendezvous through a shared table keyed by offer. Each offer
//! can be connected to once; frames travel over a bounded tokio mpsc, so a
//! slow receiver back-pressures the sender.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;
use veil_chunks::Frame;
use veil_core::{VeilError, VeilResult};

use crate::channel::{FrameSink, FrameSource, PeerListener, PeerTransport};

const OFFER_SCHEME: &str = "mem://";

struct Session {
    frames: mpsc::Receiver<Frame>,
    connected: oneshot::Sender<()>,
}

type Sessions = Arc<Mutex<HashMap<String, Session>>>;

/// Cloning yields a handle onto the same session table.
#[derive(Clone)]
pub struct MemoryTransport {
    sessions: Sessions,
    capacity: usize,
}

impl MemoryTransport {
    /// `capacity` frames may be in flight before `send` waits.
    pub fn new(capacity: usize) -> Self {
        Self {
            sessions: Arc::default(),
            capacity: capacity.max(1),
        }
    }

    /// Sessions opened but not yet connected to
    pub fn pending(&self) -> usize {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[async_trait]
impl PeerTransport for MemoryTransport {
    async fn open(&self) -> VeilResult<(String, Box<dyn PeerListener>)> {
        let offer = format!("{OFFER_SCHEME}{}", veil_crypto::generate_id()?);
        let (tx, rx) = mpsc::channel(self.capacity);
        let (connected_tx, connected_rx) = oneshot::channel();

        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                offer.clone(),
                Session {
                    frames: rx,
                    connected: connected_tx,
                },
            );
        debug!(offer = %offer, "memory session opened");

        let listener = MemoryListener {
            offer: offer.clone(),
            sessions: self.sessions.clone(),
            tx: Some(tx),
            connected: Some(connected_rx),
        };
        Ok((offer, Box::new(listener)))
    }

    async fn connect(&self, offer: &str) -> VeilResult<Box<dyn FrameSource>> {
        let session = self
            .sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(offer)
            .ok_or_else(|| {
                VeilError::ChannelFailure(format!("no open session for offer {offer}"))
            })?;
        // The listener may already be gone; the receiver then sees a closed channel.
        let _ = session.connected.send(());
        debug!(offer = %offer, "memory session connected");
        Ok(Box::new(MemorySource {
            rx: session.frames,
        }))
    }
}

struct MemoryListener {
    offer: String,
    sessions: Sessions,
    tx: Option<mpsc::Sender<Frame>>,
    connected: Option<oneshot::Receiver<()>>,
}

#[async_trait]
impl PeerListener for MemoryListener {
    async fn accept(&mut self) -> VeilResult<Box<dyn FrameSink>> {
        let connected = self
            .connected
            .take()
            .ok_or_else(|| VeilError::ChannelFailure("session already accepted".into()))?;
        connected
            .await
            .map_err(|_| VeilError::ChannelFailure("session closed before a peer joined".into()))?;
        let tx = self
            .tx
            .take()
            .ok_or_else(|| VeilError::ChannelFailure("session already accepted".into()))?;
        Ok(Box::new(MemorySink { tx: Some(tx) }))
    }
}

impl Drop for MemoryListener {
    fn drop(&mut self) {
        // Abandoned before anyone connected: withdraw the offer.
        if self.connected.is_some() {
            self.sessions
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&self.offer);
        }
    }
}

struct MemorySink {
    tx: Option<mpsc::Sender<Frame>>,
}

#[async_trait]
impl FrameSink for MemorySink {
    async fn send(&mut self, frame: Frame) -> VeilResult<()> {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| VeilError::ChannelFailure("send after finish".into()))?;
        tx.send(frame)
            .await
            .map_err(|_| VeilError::ChannelFailure("peer hung up".into()))
    }

    async fn finish(&mut self) -> VeilResult<()> {
        self.tx = None;
        Ok(())
    }
}

struct MemorySource {
    rx: mpsc::Receiver<Frame>,
}

#[async_trait]
impl FrameSource for MemorySource {
    async fn recv(&mut self) -> VeilResult<Option<Frame>> {
        Ok(self.rx.recv().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn frames_flow_in_order() {
        let transport = MemoryTransport::new(4);
        let (offer, mut listener) = transport.open().await.unwrap();
        assert!(offer.starts_with(OFFER_SCHEME));

        let mut source = transport.connect(&offer).await.unwrap();
        let mut sink = listener.accept().await.unwrap();

        sink.send(Frame::Complete).await.unwrap();
        sink.finish().await.unwrap();

        assert_eq!(source.recv().await.unwrap(), Some(Frame::Complete));
        assert_eq!(source.recv().await.unwrap(), None);
    }

    #[tokio::test]
    async fn second_connect_is_a_channel_failure() {
        let transport = MemoryTransport::new(1);
        let (offer, _listener) = transport.open().await.unwrap();
        let _first = transport.connect(&offer).await.unwrap();
        let err = transport.connect(&offer).await.err().unwrap();
        assert!(matches!(err, VeilError::ChannelFailure(_)));
    }

    #[tokio::test]
    async fn unknown_offer_is_a_channel_failure() {
        let transport = MemoryTransport::new(1);
        assert!(matches!(
            transport.connect("mem://nothing").await.err().unwrap(),
            VeilError::ChannelFailure(_)
        ));
    }

    #[tokio::test]
    async fn dropped_listener_withdraws_offer() {
        let transport = MemoryTransport::new(1);
        let (offer, listener) = transport.open().await.unwrap();
        assert_eq!(transport.pending(), 1);
        drop(listener);
        assert_eq!(transport.pending(), 0);
        assert!(transport.connect(&offer).await.is_err());
    }

    #[tokio::test]
    async fn bounded_channel_applies_backpressure() {
        let transport = MemoryTransport::new(1);
        let (offer, mut listener) = transport.open().await.unwrap();
        let mut source = transport.connect(&offer).await.unwrap();
        let mut sink = listener.accept().await.unwrap();

        sink.send(Frame::Complete).await.unwrap();
        let blocked = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            sink.send(Frame::Complete),
        )
        .await;
        assert!(blocked.is_err(), "second send must wait for the reader");

        assert!(source.recv().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn receiver_hangup_fails_send() {
        let transport = MemoryTransport::new(1);
        let (offer, mut listener) = transport.open().await.unwrap();
        let source = transport.connect(&offer).await.unwrap();
        let mut sink = listener.accept().await.unwrap();
        drop(source);
        assert!(matches!(
            sink.send(Frame::Complete).await,
            Err(VeilError::ChannelFailure(_))
        ));
    }
}
