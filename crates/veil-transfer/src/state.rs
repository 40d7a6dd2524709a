//! Transfer lifecycle states and progress events

use std::fmt;
use std::sync::Arc;

use veil_core::ErrorKind;

/// Sender side. Staged transfers stop at `LinkReady`; direct transfers
/// continue to `Streaming` and `Sent` once the link has been handed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenderState {
    Idle,
    Encrypting,
    Staging,
    LinkReady,
    Streaming,
    Sent,
    Failed(ErrorKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverState {
    Idle,
    Resolving,
    Transferring,
    Decrypting,
    Delivered,
    Failed(ErrorKind),
}

impl SenderState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SenderState::Sent | SenderState::Failed(_))
    }
}

impl ReceiverState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ReceiverState::Delivered | ReceiverState::Failed(_))
    }
}

impl fmt::Display for SenderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SenderState::Idle => f.write_str("idle"),
            SenderState::Encrypting => f.write_str("encrypting"),
            SenderState::Staging => f.write_str("staging"),
            SenderState::LinkReady => f.write_str("link ready"),
            SenderState::Streaming => f.write_str("streaming"),
            SenderState::Sent => f.write_str("sent"),
            SenderState::Failed(kind) => write!(f, "failed: {kind}"),
        }
    }
}

impl fmt::Display for ReceiverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReceiverState::Idle => f.write_str("idle"),
            ReceiverState::Resolving => f.write_str("resolving"),
            ReceiverState::Transferring => f.write_str("transferring"),
            ReceiverState::Decrypting => f.write_str("decrypting"),
            ReceiverState::Delivered => f.write_str("delivered"),
            ReceiverState::Failed(kind) => write!(f, "failed: {kind}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    Sender(SenderState),
    Receiver(ReceiverState),
}

impl fmt::Display for TransferState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferState::Sender(s) => s.fmt(f),
            TransferState::Receiver(s) => s.fmt(f),
        }
    }
}

/// Progress report. `fraction` is in `0.0..=1.0` within the current state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransferEvent {
    pub state: TransferState,
    pub fraction: f64,
}

/// Progress callback, shared between a sender and its pending delivery.
pub type ProgressFn = Arc<dyn Fn(TransferEvent) + Send + Sync>;

/// Optional progress sink with the `(state, fraction)` helpers both
/// orchestrators use.
#[derive(Clone, Default)]
pub(crate) struct Progress(Option<ProgressFn>);

impl Progress {
    pub(crate) fn new(callback: Option<ProgressFn>) -> Self {
        Self(callback)
    }

    pub(crate) fn emit(&self, state: TransferState, fraction: f64) {
        if let Some(cb) = &self.0 {
            cb(TransferEvent {
                state,
                fraction: fraction.clamp(0.0, 1.0),
            });
        }
    }

    pub(crate) fn sender(&self, state: SenderState, fraction: f64) {
        tracing::debug!(state = %state, "sender state");
        self.emit(TransferState::Sender(state), fraction);
    }

    pub(crate) fn receiver(&self, state: ReceiverState, fraction: f64) {
        tracing::debug!(state = %state, "receiver state");
        self.emit(TransferState::Receiver(state), fraction);
    }
}

/// `done / total`, with an empty total counting as complete.
pub(crate) fn ratio(done: u64, total: u64) -> f64 {
    if total == 0 {
        1.0
    } else {
        done as f64 / total as f64
    }
}
