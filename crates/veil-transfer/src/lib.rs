//! veil-transfer: transfer orchestration
//!
//! Ties the pieces together for one file and one recipient:
//!
//! ```text
//! Sender::share(file)
//!   encrypt ──> staged:  Stager::stage(id, record)          ──┐
//!           └─> direct:  PeerTransport::open() -> offer       ├─> link
//!                                                              ┘
//! Receiver::receive(link)
//!   decode ──> staged:  Stager::fetch(id)  (exactly once, within TTL)
//!          └─> direct:  connect(offer) -> Reassembler
//!   decrypt ──> DeliveredFile
//! ```
//!
//! The mode is configuration; frames and descriptors are identical in both.

pub mod channel;
pub mod memory;
pub mod receiver;
pub mod sender;
pub mod state;
pub mod tcp;

pub use channel::{FrameSink, FrameSource, PeerListener, PeerTransport};
pub use memory::MemoryTransport;
pub use receiver::{DeliveredFile, Receiver};
pub use sender::{OutgoingFile, PendingDelivery, Sender, Share};
pub use state::{ProgressFn, ReceiverState, SenderState, TransferEvent, TransferState};
pub use tcp::TcpTransport;
