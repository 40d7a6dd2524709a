//! veil-store: transient staging for store-and-forward transfers
//!
//! A staged transfer can be redeemed exactly once, and only within its TTL.
//! The store owns every record; callers hold nothing but the transfer id.

pub mod record;
pub mod store;

pub use record::StoredTransfer;
pub use store::{OpenFn, Stager, TransientStore};
