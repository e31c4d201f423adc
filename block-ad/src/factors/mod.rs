//! Nonlinear factors
//!
//! A factor binds a measurement to a prediction of it and turns the mismatch into a
//! whitened residual. Around the current values it is linearized into a
//! [`JacobianFactor`] for the outer optimizer:
//!
//! ```text
//! r(x)      = z ⊖ h(x)                       (local coordinates of the prediction)
//! error(x)  = 0.5 ‖W r(x)‖²
//! linear(δ) = 0.5 ‖Σₖ W L Jₖ δₖ + W r‖²      L = ∂(z ⊖ y)/∂y at y = h(x)
//! ```
//!
//! # Factor Types
//!
//! - [`ExpressionFactor`]: any measurement model written as an [`Expression`](crate::expression::Expression)
//! - [`ProjectionFactor`]: hand-differentiated pinhole reprojection, the reference for the
//!   expression camera model
//! - [`PriorFactor`]: unary constraint on a single variable
//! - [`BetweenFactor`]: relative constraint between two Lie group variables

pub mod between_factor;
pub mod expression_factor;
pub mod prior_factor;
pub mod projection_factor;

pub use between_factor::BetweenFactor;
pub use expression_factor::ExpressionFactor;
pub use prior_factor::PriorFactor;
pub use projection_factor::ProjectionFactor;

use crate::{
    core::{jacobian_factor::JacobianFactor, noise_model::NoiseModel, values::{Key, Values}},
    error::BlockAdResult,
};
use nalgebra::DVector;

/// A nonlinear least-squares term over keyed variables.
pub trait NonlinearFactor: Send + Sync {
    /// Sorted keys of the variables this factor reads.
    fn keys(&self) -> Vec<Key>;

    /// Residual dimension, independent of the values.
    fn dim(&self) -> usize;

    fn noise_model(&self) -> &NoiseModel;

    /// Residual before whitening, `z ⊖ h(x)`.
    fn unwhitened_error(&self, values: &Values) -> BlockAdResult<DVector<f64>>;

    /// `0.5 ‖W r‖²`
    fn error(&self, values: &Values) -> BlockAdResult<f64> {
        let residual = self.unwhitened_error(values)?;
        Ok(0.5 * self.noise_model().squared_mahalanobis_distance(&residual))
    }

    /// Whitened Jacobian blocks and residual at `values`.
    fn linearize(&self, values: &Values) -> BlockAdResult<JacobianFactor>;
}
