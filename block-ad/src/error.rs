//! Error types for the block-ad library
//!
//! The library uses a hierarchical error system where:
//! - **`BlockAdError`** is the top-level error exposed by expressions and factors
//! - **Module errors** (`CoreError`, `ManifoldError`) are wrapped inside it
//! - **Error sources** are preserved, allowing full error chain inspection
//!
//! Example error chain:
//! ```text
//! BlockAdError::Manifold(
//!     ManifoldError::DegenerateGeometry("cannot project point ... with depth 0")
//! )
//! ```

use crate::{core::CoreError, manifold::ManifoldError};
use std::error::Error as StdError;
use thiserror::Error;

/// Main result type used throughout the block-ad library
pub type BlockAdResult<T> = Result<T, BlockAdError>;

/// Main error type for the block-ad library
///
/// ```rust,ignore
/// if let Err(e) = factor.linearize(&values) {
///     warn!("Linearization failed: {}", e.chain());
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BlockAdError {
    /// Variable lookup, dimension and linear-system errors
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Geometry and manifold errors raised by primitives
    #[error(transparent)]
    Manifold(#[from] ManifoldError),
}

impl BlockAdError {
    /// Get the full error chain as a multi-line string for logging and debugging.
    pub fn chain(&self) -> String {
        let mut chain = vec![self.to_string()];
        let mut source = self.source();

        while let Some(err) = source {
            chain.push(format!("  → {}", err));
            source = err.source();
        }

        chain.join("\n")
    }

    /// Get a compact single-line error chain for logging
    ///
    /// ```rust,ignore
    /// error!("Linearization failed: {}", err.chain_compact());
    /// ```
    pub fn chain_compact(&self) -> String {
        let mut chain = vec![self.to_string()];
        let mut source = self.source();

        while let Some(err) = source {
            chain.push(err.to_string());
            source = err.source();
        }

        chain.join(" → ")
    }
}
