//! Opening handshake helpers.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use ring::digest;

/// GUID appended to the client key before hashing.
pub const WEBSOCKET_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Computes `Sec-WebSocket-Accept` for a client's `Sec-WebSocket-Key`.
///
/// ```
/// # use rampart::websocket::handshake::accept_key;
/// assert_eq!(accept_key("dGhlIHNhbXBsZSBub25jZQ=="), "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
/// ```
pub fn accept_key(key: &str) -> String {
    let mut ctx = digest::Context::new(&digest::SHA1_FOR_LEGACY_USE_ONLY);
    ctx.update(key.trim().as_bytes());
    ctx.update(WEBSOCKET_GUID.as_bytes());
    STANDARD.encode(ctx.finish().as_ref())
}

/// Random 16-byte key, base64 encoded, for client handshakes.
pub fn generate_key() -> Result<String, ring::error::Unspecified> {
    use ring::rand::{SecureRandom, SystemRandom};

    let mut nonce = [0u8; 16];
    SystemRandom::new().fill(&mut nonce)?;
    Ok(STANDARD.encode(nonce))
}

/// Random masking key for client-to-server frames.
pub fn generate_mask() -> Result<[u8; 4], ring::error::Unspecified> {
    use ring::rand::{SecureRandom, SystemRandom};

    let mut key = [0u8; 4];
    SystemRandom::new().fill(&mut key)?;
    Ok(key)
}
