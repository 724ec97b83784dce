//! Unverified decoding of JWT payloads.
//!
//! Only used to read claims the client needs locally (device key, username,
//! phone number). Signatures are not checked; the server does that.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde::Deserialize;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TokenClaims {
    #[serde(default)]
    pub device_key: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub exp: Option<i64>,
}

/// Decode the payload segment of a JWT. Returns `None` for anything that is
/// not three dot-separated segments with a base64url JSON middle.
pub fn decode_claims(token: &str) -> Option<TokenClaims> {
    let mut parts = token.split('.');
    let (_header, payload) = (parts.next()?, parts.next()?);
    parts.next()?;

    // Some issuers pad, most do not
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    serde_json::from_slice(&bytes).ok()
}

/// Last `n` characters of a token, for display and logs.
pub fn token_tail(token: &str, n: usize) -> String {
    let count = token.chars().count();
    if count <= n {
        return token.to_string();
    }
    let tail: String = token.chars().skip(count - n).collect();
    format!("...{}", tail)
}

#[cfg(test)]
pub(crate) fn encode_test_token(claims: &serde_json::Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"none"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{}.{}.sig", header, payload)
}
