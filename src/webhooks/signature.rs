//! Webhook signature verification using HMAC-SHA1.
//!
//! The platform signs every webhook delivery with the app secret and sends
//! the result in the `X-Hub-Signature` header as `sha1=<hex>`.
//!
//! Verification is the only authentication boundary for inbound events, so
//! it runs on the raw bytes before the body is parsed.

use hmac::{Hmac, Mac};
use sha1::Sha1;

type HmacSha1 = Hmac<Sha1>;

/// Parses a signature header (e.g., "sha1=abc123...") into raw bytes.
///
/// Returns `None` for malformed headers (missing prefix, invalid hex, etc.).
/// Never panics.
///
/// # Examples
///
/// ```
/// use confessions_bot::webhooks::parse_signature_header;
///
/// assert!(parse_signature_header("sha1=abcd1234").is_some());
///
/// // Missing prefix
/// assert!(parse_signature_header("abcd1234").is_none());
///
/// // Wrong algorithm
/// assert!(parse_signature_header("sha256=abcd1234").is_none());
///
/// // Bad hex
/// assert!(parse_signature_header("sha1=xyz").is_none());
/// ```
pub fn parse_signature_header(header: &str) -> Option<Vec<u8>> {
    let hex_sig = header.strip_prefix("sha1=")?;
    hex::decode(hex_sig).ok()
}

/// Computes the HMAC-SHA1 signature of a payload using the given secret.
///
/// Mostly useful in tests, for producing the header a real delivery would carry.
pub fn compute_signature(payload: &[u8], secret: &[u8]) -> Vec<u8> {
    let mut mac = match HmacSha1::new_from_slice(secret) {
        Ok(mac) => mac,
        // HMAC accepts keys of any length; this arm is unreachable.
        Err(_) => return Vec::new(),
    };
    mac.update(payload);
    mac.finalize().into_bytes().to_vec()
}

/// Formats a signature as a header value: `sha1=<hex>`.
pub fn format_signature_header(signature: &[u8]) -> String {
    format!("sha1={}", hex::encode(signature))
}

/// Verifies a webhook signature against the payload and secret.
///
/// Returns `true` only if the header is well formed and matches. The
/// comparison is constant-time.
///
/// # Examples
///
/// ```
/// use confessions_bot::webhooks::{compute_signature, format_signature_header, verify_signature};
///
/// let payload = br#"{"object":"page","entry":[]}"#;
/// let secret = b"app-secret";
///
/// let header = format_signature_header(&compute_signature(payload, secret));
///
/// assert!(verify_signature(payload, &header, secret));
/// assert!(!verify_signature(payload, &header, b"other-secret"));
/// ```
pub fn verify_signature(payload: &[u8], signature_header: &str, secret: &[u8]) -> bool {
    let expected_signature = match parse_signature_header(signature_header) {
        Some(sig) => sig,
        None => return false,
    };

    let mut mac = match HmacSha1::new_from_slice(secret) {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(payload);

    mac.verify_slice(&expected_signature).is_ok()
}
