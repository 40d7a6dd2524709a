//! Peer channel capability
//!
//! Direct mode needs a bidirectional session between sender and receiver.
//! How that session is established is up to the transport:
//!
//! ```text
//! sender:   open() ──> (offer, listener) ── offer goes into the link
//! receiver: connect(offer) ──> FrameSource
//! sender:   listener.accept() ──> FrameSink ── frames flow sink → source
//! ```
//!
//! - [`crate::memory::MemoryTransport`]: in-process, for tests and embedding
//! - [`crate::tcp::TcpTransport`]: length-delimited JSON frames over TCP

use async_trait::async_trait;
use veil_chunks::Frame;
use veil_core::VeilResult;

/// Outbound half of a peer session.
#[async_trait]
pub trait FrameSink: Send {
    /// Send one frame, waiting while the channel is full.
    async fn send(&mut self, frame: Frame) -> VeilResult<()>;

    /// Flush and close the outbound half.
    async fn finish(&mut self) -> VeilResult<()>;
}

/// Inbound half of a peer session.
#[async_trait]
pub trait FrameSource: Send {
    /// Next frame, or `None` once the peer has closed the channel.
    async fn recv(&mut self) -> VeilResult<Option<Frame>>;
}

/// Sender-side session waiting for its one receiver.
#[async_trait]
pub trait PeerListener: Send {
    async fn accept(&mut self) -> VeilResult<Box<dyn FrameSink>>;
}

#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Open a session and describe it as an opaque offer string.
    async fn open(&self) -> VeilResult<(String, Box<dyn PeerListener>)>;

    /// Join the session described by `offer`.
    async fn connect(&self, offer: &str) -> VeilResult<Box<dyn FrameSource>>;
}
