//! Core building blocks shared by expressions and factors
//!
//! This module contains:
//! - Variable keys and the typed [`Values`](values::Values) store
//! - Gaussian noise models and whitening
//! - The linear [`JacobianFactor`](jacobian_factor::JacobianFactor) produced by linearization

pub mod jacobian_factor;
pub mod noise_model;
pub mod values;

use crate::core::values::{Key, format_key};
use thiserror::Error;
use tracing::error;

/// Core module error types for variable lookup and linear systems
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoreError {
    /// A leaf key is absent from the values store
    #[error("Missing variable: {}", format_key(.key))]
    MissingVariable { key: Key },

    /// The stored value has a different type than the expression expects
    #[error("Type mismatch for variable {}: expected {expected}, found {actual}", format_key(.key))]
    TypeMismatch {
        key: Key,
        expected: &'static str,
        actual: &'static str,
    },

    /// A key was inserted twice
    #[error("Duplicate variable: {}", format_key(.key))]
    DuplicateVariable { key: Key },

    /// Dimension mismatch between residual, Jacobian, noise model or ordering
    #[error("Dimension mismatch in {context}: expected {expected}, got {actual}")]
    DimensionMismatch {
        context: String,
        expected: usize,
        actual: usize,
    },

    /// Analytic and numerical Jacobians disagree
    #[error("Jacobian check failed: {0}")]
    JacobianCheck(String),

    /// Invalid input parameter or configuration
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl CoreError {
    /// Log the error with tracing::error and return self for chaining
    ///
    /// # Example
    /// ```ignore
    /// values.at::<SE3>(key)
    ///     .map_err(|e| e.log())?;
    /// ```
    #[must_use]
    pub fn log(self) -> Self {
        error!("{}", self);
        self
    }

    /// Log the error together with the underlying third-party error
    ///
    /// # Example
    /// ```ignore
    /// SparseColMat::try_new_from_triplets(rows, cols, &triplets)
    ///     .map_err(|e| {
    ///         CoreError::InvalidInput("Failed to assemble sparse Jacobian".to_string())
    ///             .log_with_source(e)
    ///     })?;
    /// ```
    #[must_use]
    pub fn log_with_source<E: std::fmt::Debug>(self, source_error: E) -> Self {
        error!("{} | Source: {:?}", self, source_error);
        self
    }
}

/// Result type for core module operations
pub type CoreResult<T> = Result<T, CoreError>;
