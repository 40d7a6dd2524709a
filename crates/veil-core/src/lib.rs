//! veil-core: shared vocabulary for the veil workspace
//!
//! - `config`: `veil.toml` schema with defaults for every section
//! - `error`: the user-facing error taxonomy shared by every crate
//! - `types`: file metadata, transfer mode, cipher algorithm tag
//! - `clock`: wall-clock abstraction so expiry can be tested deterministically

pub mod clock;
pub mod config;
pub mod error;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{ErrorKind, VeilError, VeilResult};
pub use types::{CipherAlgorithm, FileMeta, TransferMode};
