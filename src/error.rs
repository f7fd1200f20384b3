//! Error types for the loading cache
//!
//! Provides unified error handling using thiserror. Errors produced by a
//! [`Loader`](crate::Loader) are never wrapped here: they travel back to the
//! caller verbatim inside the inner `Result` of [`Cache::get`](crate::Cache::get).

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for cache construction and cache calls.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// The loader does not satisfy the fixed-arity `(params) -> result` contract
    #[error("Invalid loader: {0}")]
    InvalidLoader(String),

    /// A configuration value is out of range
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// `get` was called with a parameter count the loader does not accept
    #[error("Arity mismatch: loader expects {expected} params, got {actual}")]
    ArityMismatch { expected: usize, actual: usize },

    /// Every completed load for the key reported resource exhaustion, so no
    /// result has ever been cached
    #[error("No cached result for key: {0}")]
    Unloaded(String),

    /// The caller's cancellation token fired while it waited on a cold load
    #[error("Cancelled while waiting for key: {0}")]
    Cancelled(String),

    /// `get_with_cancel` used on a cache built without cancellation support
    #[error("Cancellation support is not enabled for this cache")]
    CancellationUnsupported,
}

// == Result Type Alias ==
/// Convenience Result type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;
