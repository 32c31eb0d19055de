//! ev_report — renderers for human-facing artifacts.
//!
//! - `statement`: the deterministic Evidence Integrity Statement (two-pass
//!   self-hash; the text bytes are the authoritative artifact).
//! - `digests`: plain-text digest files included in sealed exports
//!   (timeline notes, redaction statement, integrity sweep summary).
//!
//! Presentation renders (PDF and the like) are adapter territory: they are
//! not byte-reproducible and their hashes must be recorded separately from
//! the authoritative text hash.

#![forbid(unsafe_code)]

pub mod digests;
pub mod statement;

pub use statement::{IntegrityStatement, StatementInputs};
