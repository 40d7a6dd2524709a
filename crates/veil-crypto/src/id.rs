//! Transfer identifiers: 128 random bits as lowercase hex.

use veil_core::VeilResult;

use crate::{fill_random, ID_BYTES};

/// Generate a fresh transfer id (32 lowercase hex characters).
///
/// Uniqueness rests on entropy alone; collisions are not checked for.
pub fn generate_id() -> VeilResult<String> {
    let mut bytes = [0u8; ID_BYTES];
    fill_random(&mut bytes)?;
    Ok(bytes.iter().map(|b| format!("{b:02x}")).collect())
}

/// True if `id` has the shape produced by [`generate_id`].
pub fn is_valid_id(id: &str) -> bool {
    id.len() == ID_BYTES * 2 && id.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}
