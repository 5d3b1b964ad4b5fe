//! Pipeline stages for a single extraction.
//!
//! Each submodule implements exactly one transformation step, so each can be
//! tested on its own without a host or a network.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ request ──▶ transport ──▶ response
//! (resolve)  (serialize)  (POST)        (normalize)
//! ```
//!
//! 1. [`input`]    — binary field, URL download, local path, or raw text
//! 2. [`request`]  — multipart or form-encoded body plus bearer header
//! 3. [`crate::transport`] — exactly one HTTP call, no retries
//! 4. [`response`] — success/error split and output shaping

pub mod input;
pub mod request;
pub mod response;
