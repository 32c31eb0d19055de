//! Minimal error set for core-domain validation & parsing.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    #[error("invalid id: {0}")]
    InvalidId(String),
    #[error("invalid hex digest: {0}")]
    InvalidHex(String),
}
