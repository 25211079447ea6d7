//! PartsDesk Core Types and Decoders
//!
//! This crate provides the ingestion layer shared by every PartsDesk client crate:
//! - Lenient per-field decoders for inconsistent document-store payloads
//! - Extended-JSON identifier normalization
//! - Dual-mode (legacy array / enveloped page) response decoding
//! - Session model, store contract and expiry parsing
//! - Core error types

pub mod error;
pub mod expiry;
pub mod lenient;
pub mod models;
pub mod oid;
pub mod page;
pub mod session;

pub use error::{Error, FieldDecodeError, Result};
pub use page::{DecodedPage, PageDecoder, PageEnvelope, PageMeta, PageShape};
pub use session::{Session, SessionStore};
