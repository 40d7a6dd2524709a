use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde_json::Value;
use tracing::debug;
use veil_core::config::LinkConfig;
use veil_core::{VeilError, VeilResult};

use crate::descriptor::{TransferDescriptor, DESCRIPTOR_VERSION};

/// Encode a descriptor as a bare token.
pub fn encode_token(descriptor: &TransferDescriptor) -> VeilResult<String> {
    let json = serde_json::to_vec(descriptor)
        .map_err(|e| VeilError::InvalidLink(format!("descriptor serialization: {e}")))?;
    Ok(URL_SAFE_NO_PAD.encode(json))
}

/// Encode a descriptor as a full share link.
pub fn encode(descriptor: &TransferDescriptor, link: &LinkConfig) -> VeilResult<String> {
    let token = encode_token(descriptor)?;
    let origin = link.origin.trim_end_matches('/');
    let path = link.path.trim_matches('/');
    if path.is_empty() {
        Ok(format!("{origin}/{token}"))
    } else {
        Ok(format!("{origin}/{path}/{token}"))
    }
}

/// Decode a full link or a bare token.
///
/// Every structural problem is reported as `InvalidLink`; a descriptor is
/// only returned when it is complete and of a supported version.
pub fn decode(input: &str) -> VeilResult<TransferDescriptor> {
    let token = extract_token(input);
    if token.is_empty() {
        return Err(invalid("empty token"));
    }

    let json = URL_SAFE_NO_PAD
        .decode(token.trim_end_matches('='))
        .map_err(|e| invalid(format!("token encoding: {e}")))?;
    let value: Value =
        serde_json::from_slice(&json).map_err(|e| invalid(format!("token payload: {e}")))?;

    match value.get("v").and_then(Value::as_u64) {
        Some(v) if v == u64::from(DESCRIPTOR_VERSION) => {}
        Some(v) => return Err(invalid(format!("unsupported schema version {v}"))),
        None => return Err(invalid("missing schema version")),
    }

    let descriptor: TransferDescriptor =
        serde_json::from_value(value).map_err(|e| invalid(format!("descriptor fields: {e}")))?;

    if !veil_crypto::is_valid_id(&descriptor.transfer_id) {
        return Err(invalid("malformed transfer id"));
    }

    debug!(transfer_id = %descriptor.transfer_id, "link decoded");
    Ok(descriptor)
}

/// The token is the last path segment; query strings and fragments are ignored.
fn extract_token(input: &str) -> &str {
    let input = input.trim();
    let input = input.split(['?', '#']).next().unwrap_or_default();
    input.trim_end_matches('/').rsplit('/').next().unwrap_or_default()
}

fn invalid(msg: impl Into<String>) -> VeilError {
    VeilError::InvalidLink(msg.into())
}
