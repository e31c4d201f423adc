//! Factor whose measurement model is an expression tree
//!
//! Jacobians come from [`Expression::derivatives`], so a new measurement model needs no
//! derivative code beyond that of its primitives.
//!
//! # Example
//!
//! ```rust,ignore
//! use block_ad::expression::{Expression, primitives::{project, transform_to, uncalibrate}};
//! use block_ad::factors::{ExpressionFactor, NonlinearFactor};
//!
//! let prediction = uncalibrate(
//!     &Expression::leaf(calibration_key),
//!     &project(&transform_to(&Expression::leaf(pose_key), &Expression::leaf(point_key))),
//! );
//! let factor = ExpressionFactor::new(measured, prediction, NoiseModel::unit(2))?;
//! let linear = factor.linearize(&values)?;
//! ```

use crate::{
    core::{
        CoreError,
        jacobian_factor::JacobianFactor,
        noise_model::NoiseModel,
        values::{Key, ValueType, Values},
    },
    error::BlockAdResult,
    expression::Expression,
    factors::NonlinearFactor,
};
use nalgebra::{DMatrix, DVector};
use tracing::debug;

/// Measurement `z`, prediction `h(x)` and noise model.
#[derive(Debug, Clone)]
pub struct ExpressionFactor<T: ValueType> {
    measurement: T,
    expression: Expression<T>,
    noise_model: NoiseModel,
}

impl<T: ValueType> ExpressionFactor<T> {
    /// Fails with `DimensionMismatch` when the noise model does not match `T::DOF`.
    pub fn new(
        measurement: T,
        expression: Expression<T>,
        noise_model: NoiseModel,
    ) -> BlockAdResult<Self> {
        check_noise_dim(&noise_model, T::DOF)?;
        Ok(ExpressionFactor {
            measurement,
            expression,
            noise_model,
        })
    }

    pub fn measurement(&self) -> &T {
        &self.measurement
    }

    pub fn expression(&self) -> &Expression<T> {
        &self.expression
    }
}

fn check_noise_dim(noise_model: &NoiseModel, dim: usize) -> BlockAdResult<()> {
    if noise_model.dim() != dim {
        return Err(CoreError::DimensionMismatch {
            context: "noise model dimension".to_string(),
            expected: dim,
            actual: noise_model.dim(),
        }
        .log()
        .into());
    }
    Ok(())
}

impl<T: ValueType> NonlinearFactor for ExpressionFactor<T> {
    fn keys(&self) -> Vec<Key> {
        self.expression.keys()
    }

    fn dim(&self) -> usize {
        T::DOF
    }

    fn noise_model(&self) -> &NoiseModel {
        &self.noise_model
    }

    fn unwhitened_error(&self, values: &Values) -> BlockAdResult<DVector<f64>> {
        let predicted = self.expression.value(values)?;
        Ok(self.measurement.local_coordinates(&predicted, None))
    }

    fn linearize(&self, values: &Values) -> BlockAdResult<JacobianFactor> {
        check_noise_dim(&self.noise_model, T::DOF)?;

        let (predicted, jacobians) = self.expression.derivatives(values)?;
        let mut local = DMatrix::zeros(T::DOF, T::DOF);
        let residual = self
            .measurement
            .local_coordinates(&predicted, Some(&mut local));

        let terms = jacobians
            .into_iter()
            .map(|(key, jacobian)| (key, self.noise_model.whiten_matrix(&(&local * jacobian))))
            .collect();
        let whitened = self.noise_model.whiten(&residual);

        debug!(
            "Linearized expression factor over {} key(s), whitened residual norm {:.6e}",
            self.expression.keys().len(),
            whitened.norm()
        );
        Ok(JacobianFactor::new(terms, whitened)?)
    }
}
