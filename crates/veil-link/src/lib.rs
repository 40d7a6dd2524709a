//! veil-link: the share link codec
//!
//! A link is `<origin>/<path>/<token>`. The token is base64url (no padding)
//! of the descriptor's JSON, so a receiver holding only the link has the
//! key, the locator, and the file metadata. The hosting layer that serves
//! the link never sees plaintext or needs to resolve anything.
//!
//! Descriptor JSON (schema `v = 1`):
//! ```text
//! {"v":1,"fileId":"<32 hex>","key":{JWK},"locator":{"kind":"staged"} | {"kind":"direct","offer":".."},
//!  "meta":{"name":..,"size":..,"type":..},"timestamp":<unix ms>}
//! ```

pub mod codec;
pub mod descriptor;

pub use codec::{decode, encode, encode_token};
pub use descriptor::{Locator, TransferDescriptor, DESCRIPTOR_VERSION};
