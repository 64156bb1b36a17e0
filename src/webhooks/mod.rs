//! Webhook handling for messaging platform events.
//!
//! This module provides:
//! - Signature verification for webhook payloads (HMAC-SHA1)
//! - Envelope parsing into flat messaging events

pub mod events;
pub mod parser;
pub mod signature;

pub use events::MessagingEvent;
pub use parser::{ParseError, parse_webhook};
pub use signature::{
    compute_signature, format_signature_header, parse_signature_header, verify_signature,
};
