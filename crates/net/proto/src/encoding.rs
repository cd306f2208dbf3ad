//! Payload encoding helpers.

use base64::{Engine as _, engine::general_purpose::STANDARD};

/// Input chunk length for [`encode_base64_chunked`].
///
/// Must be a multiple of 3 so each chunk encodes without padding and the
/// chunk outputs concatenate into a valid base64 string.
pub const BASE64_CHUNK_LEN: usize = 48 * 1024;

/// Base64-encode a payload in bounded chunks.
///
/// Large payloads are encoded chunk by chunk into a preallocated output so
/// no intermediate buffer ever exceeds [`BASE64_CHUNK_LEN`] input bytes.
pub fn encode_base64_chunked(payload: &[u8]) -> String {
    let mut out = String::with_capacity(payload.len().div_ceil(3) * 4);
    for chunk in payload.chunks(BASE64_CHUNK_LEN) {
        STANDARD.encode_string(chunk, &mut out);
    }
    out
}

/// Decode a base64 payload received from a peer.
pub fn decode_base64(encoded: &str) -> Result<Vec<u8>, base64::DecodeError> {
    STANDARD.decode(encoded)
}
