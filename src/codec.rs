//! Reversible URL tokens.
//!
//! A token is [`TOKEN_PREFIX`] followed by the padded base64url encoding of
//! the absolute URL's bytes. The alphabet (`A-Z a-z 0-9 - _ =`) never
//! contains `/`, so a token always fits in a single path segment.

use base64::{engine::general_purpose::URL_SAFE, Engine as _};
use thiserror::Error;
use url::Url;

/// Marker that distinguishes our tokens from ordinary path segments.
pub const TOKEN_PREFIX: &str = "xox";

/// Why a path segment is not one of our tokens.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("token prefix missing")]
    MissingPrefix,

    #[error("invalid token payload: {0}")]
    Payload(#[from] base64::DecodeError),

    #[error("token payload is not UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("token does not name a URL: {0}")]
    Url(#[from] url::ParseError),
}

/// Encode an absolute URL (as raw bytes) into a path-safe token.
pub fn encode(absolute_url: &[u8]) -> String {
    let mut token = String::with_capacity(TOKEN_PREFIX.len() + absolute_url.len() * 4 / 3 + 4);
    token.push_str(TOKEN_PREFIX);
    URL_SAFE.encode_string(absolute_url, &mut token);
    token
}

/// Encode a parsed URL.
pub fn encode_url(url: &Url) -> String {
    encode(url.as_str().as_bytes())
}

/// Decode a token back into the URL it was built from.
///
/// Surrounding whitespace is ignored. Failure means "not one of ours" and
/// carries no side effects.
pub fn decode(token: &str) -> Result<Url, DecodeError> {
    let payload = token
        .trim()
        .strip_prefix(TOKEN_PREFIX)
        .ok_or(DecodeError::MissingPrefix)?;
    let bytes = URL_SAFE.decode(payload)?;
    let text = String::from_utf8(bytes)?;
    Ok(Url::parse(&text)?)
}
