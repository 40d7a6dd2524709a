//! TCP peer transport
//!
//! Each frame is one length-delimited message holding the JSON wire
//! encoding from `veil_chunks::wire`. The offer is `tcp://host:port` of the
//! sender's listener.

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::{Framed, LengthDelimitedCodec};
use tracing::{debug, info};
use veil_chunks::{decode_frame, encode_frame, Frame};
use veil_core::config::TransportConfig;
use veil_core::{VeilError, VeilResult};

use crate::channel::{FrameSink, FrameSource, PeerListener, PeerTransport};

const OFFER_SCHEME: &str = "tcp://";

#[derive(Debug, Clone)]
pub struct TcpTransport {
    listen: String,
    connect_timeout: Duration,
    max_frame_bytes: usize,
}

impl TcpTransport {
    pub fn new(config: &TransportConfig) -> Self {
        Self {
            listen: config.listen.clone(),
            connect_timeout: config.connect_timeout(),
            max_frame_bytes: config.max_frame_bytes,
        }
    }

    /// Override the listen address, e.g. from a CLI flag.
    pub fn with_listen(mut self, listen: impl Into<String>) -> Self {
        self.listen = listen.into();
        self
    }

    fn codec(&self) -> LengthDelimitedCodec {
        LengthDelimitedCodec::builder()
            .max_frame_length(self.max_frame_bytes)
            .new_codec()
    }
}

fn parse_offer(offer: &str) -> VeilResult<&str> {
    offer
        .strip_prefix(OFFER_SCHEME)
        .filter(|addr| !addr.is_empty())
        .ok_or_else(|| VeilError::ChannelFailure(format!("not a tcp offer: {offer}")))
}

fn channel_err(context: &str, e: impl std::fmt::Display) -> VeilError {
    VeilError::ChannelFailure(format!("{context}: {e}"))
}

#[async_trait]
impl PeerTransport for TcpTransport {
    async fn open(&self) -> VeilResult<(String, Box<dyn PeerListener>)> {
        let listener = TcpListener::bind(&self.listen)
            .await
            .map_err(|e| channel_err(&format!("binding {}", self.listen), e))?;
        let addr = listener.local_addr().map_err(|e| channel_err("local address", e))?;
        let offer = format!("{OFFER_SCHEME}{addr}");
        info!(%addr, "listening for receiver");

        Ok((
            offer,
            Box::new(TcpPeerListener {
                listener,
                codec: self.codec(),
            }),
        ))
    }

    async fn connect(&self, offer: &str) -> VeilResult<Box<dyn FrameSource>> {
        let addr = parse_offer(offer)?;
        let stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| {
                VeilError::ChannelFailure(format!(
                    "connect to {addr} timed out after {:?}",
                    self.connect_timeout
                ))
            })?
            .map_err(|e| channel_err(&format!("connect to {addr}"), e))?;
        debug!(peer = %addr, "connected to sender");
        Ok(Box::new(TcpFrames {
            framed: Framed::new(stream, self.codec()),
        }))
    }
}

struct TcpPeerListener {
    listener: TcpListener,
    codec: LengthDelimitedCodec,
}

#[async_trait]
impl PeerListener for TcpPeerListener {
    async fn accept(&mut self) -> VeilResult<Box<dyn FrameSink>> {
        let (stream, peer): (TcpStream, SocketAddr) = self
            .listener
            .accept()
            .await
            .map_err(|e| channel_err("accept", e))?;
        info!(%peer, "receiver connected");
        Ok(Box::new(TcpFrames {
            framed: Framed::new(stream, self.codec.clone()),
        }))
    }
}

/// Both halves share one type; the sender only sends, the receiver only reads.
struct TcpFrames {
    framed: Framed<TcpStream, LengthDelimitedCodec>,
}

#[async_trait]
impl FrameSink for TcpFrames {
    async fn send(&mut self, frame: Frame) -> VeilResult<()> {
        let bytes = encode_frame(&frame)?;
        self.framed
            .send(Bytes::from(bytes))
            .await
            .map_err(|e| channel_err("send", e))
    }

    async fn finish(&mut self) -> VeilResult<()> {
        SinkExt::<Bytes>::close(&mut self.framed)
            .await
            .map_err(|e| channel_err("close", e))
    }
}

#[async_trait]
impl FrameSource for TcpFrames {
    async fn recv(&mut self) -> VeilResult<Option<Frame>> {
        match self.framed.next().await {
            None => Ok(None),
            Some(Ok(bytes)) => decode_frame(&bytes).map(Some),
            Some(Err(e)) => Err(channel_err("receive", e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use veil_chunks::FrameInfo;

    fn transport() -> TcpTransport {
        TcpTransport::new(&TransportConfig::default())
    }

    #[test]
    fn offer_parsing() {
        assert_eq!(parse_offer("tcp://127.0.0.1:9").unwrap(), "127.0.0.1:9");
        assert!(parse_offer("mem://abc").is_err());
        assert!(parse_offer("tcp://").is_err());
    }

    #[tokio::test]
    async fn frames_cross_a_socket() {
        let transport = transport();
        let (offer, mut listener) = transport.open().await.unwrap();
        assert!(offer.starts_with("tcp://127.0.0.1:"), "{offer}");

        let sender = tokio::spawn(async move {
            let mut sink = listener.accept().await.unwrap();
            sink.send(Frame::Info(FrameInfo {
                name: "a".into(),
                size: 3,
                mime: String::new(),
                total_chunks: 1,
                encrypted_size: 3,
            }))
            .await
            .unwrap();
            sink.send(Frame::Chunk {
                index: 0,
                total_chunks: 1,
                payload: vec![1, 2, 3],
            })
            .await
            .unwrap();
            sink.send(Frame::Complete).await.unwrap();
            sink.finish().await.unwrap();
        });

        let mut source = transport.connect(&offer).await.unwrap();
        let mut kinds = Vec::new();
        while let Some(frame) = source.recv().await.unwrap() {
            kinds.push(frame.kind());
        }
        sender.await.unwrap();
        assert_eq!(kinds, ["info", "chunk", "complete"]);
    }

    #[tokio::test]
    async fn oversized_message_is_a_channel_failure() {
        let config = TransportConfig {
            max_frame_bytes: 64,
            ..TransportConfig::default()
        };
        let transport = TcpTransport::new(&config);
        let (offer, mut listener) = transport.open().await.unwrap();

        let sender = tokio::spawn(async move {
            let mut sink = listener.accept().await.unwrap();
            // Encoder enforces the same limit on the way out
            let err = sink
                .send(Frame::Chunk {
                    index: 0,
                    total_chunks: 1,
                    payload: vec![0; 256],
                })
                .await
                .unwrap_err();
            assert!(matches!(err, VeilError::ChannelFailure(_)));
        });

        let mut source = transport.connect(&offer).await.unwrap();
        sender.await.unwrap();
        assert!(source.recv().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn connect_refused_is_a_channel_failure() {
        let transport = transport();
        let (offer, listener) = transport.open().await.unwrap();
        drop(listener);
        let err = transport.connect(&offer).await.err().unwrap();
        assert!(matches!(err, VeilError::ChannelFailure(_)));
        assert!(err.is_retryable());
    }
}
