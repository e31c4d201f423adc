//! Finite-difference Jacobians for cross-checking analytic derivatives
//!
//! For each leaf key `k` and tangent direction `eⱼ`:
//!
//! ```text
//! J[k][:, j] ≈ ( f(x) ⊖ f(x ⊕ₖ h·eⱼ) − f(x) ⊖ f(x ⊕ₖ −h·eⱼ) ) / 2h
//! ```
//!
//! where `⊖` is `local_coordinates` around the unperturbed output.

use crate::{
    core::{
        CoreError,
        values::{ValueType, Values, format_key},
    },
    error::BlockAdResult,
    expression::{Expression, JacobianMap},
    manifold::Manifold,
};
use nalgebra::{DMatrix, DVector};
use tracing::debug;

/// Configuration for finite-difference Jacobians.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NumericalDerivativeConfig {
    /// Central-difference step in tangent coordinates
    pub step: f64,
    /// Relative tolerance used by [`check_jacobians`]
    pub tolerance: f64,
}

impl Default for NumericalDerivativeConfig {
    fn default() -> Self {
        Self {
            step: 1e-5,
            tolerance: 1e-6,
        }
    }
}

impl NumericalDerivativeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_step(mut self, step: f64) -> Self {
        self.step = step;
        self
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }
}

/// Central-difference Jacobians of `expression` with respect to each of its leaf keys.
pub fn numerical_jacobians<T: ValueType>(
    expression: &Expression<T>,
    values: &Values,
    config: &NumericalDerivativeConfig,
) -> BlockAdResult<JacobianMap> {
    if !(config.step.is_finite() && config.step > 0.0) {
        return Err(CoreError::InvalidInput(format!(
            "finite-difference step must be positive, got {}",
            config.step
        ))
        .log()
        .into());
    }

    let base = expression.value(values)?;
    let mut jacobians = JacobianMap::new(T::DOF);

    for key in expression.keys() {
        let dim = values.get(key)?.dim();
        let mut block = DMatrix::zeros(T::DOF, dim);

        for j in 0..dim {
            let mut delta = DVector::zeros(dim);

            delta[j] = config.step;
            let mut plus = values.clone();
            plus.retract_key(key, &delta)?;
            let forward = base.local_coordinates(&expression.value(&plus)?, None);

            delta[j] = -config.step;
            let mut minus = values.clone();
            minus.retract_key(key, &delta)?;
            let backward = base.local_coordinates(&expression.value(&minus)?, None);

            block
                .column_mut(j)
                .copy_from(&((forward - backward) / (2.0 * config.step)));
        }

        jacobians.add_or_insert(key, block)?;
    }

    Ok(jacobians)
}

/// Compare analytic and numerical Jacobians of `expression`.
///
/// An entry passes when `|analytic − numeric| ≤ tolerance · (1 + |numeric|)`. Fails with
/// [`CoreError::JacobianCheck`] describing the first entry that does not.
pub fn check_jacobians<T: ValueType>(
    expression: &Expression<T>,
    values: &Values,
    config: &NumericalDerivativeConfig,
) -> BlockAdResult<()> {
    let (_, analytic) = expression.derivatives(values)?;
    let numeric = numerical_jacobians(expression, values, config)?;

    if analytic.keys() != numeric.keys() {
        return Err(CoreError::JacobianCheck(format!(
            "analytic keys {:?} differ from numerical keys {:?}",
            analytic.keys(),
            numeric.keys()
        ))
        .log()
        .into());
    }

    for (key, expected) in numeric.iter() {
        let Some(actual) = analytic.get(key) else {
            continue;
        };
        if actual.shape() != expected.shape() {
            return Err(CoreError::JacobianCheck(format!(
                "block for {} is {:?}, expected {:?}",
                format_key(&key),
                actual.shape(),
                expected.shape()
            ))
            .log()
            .into());
        }
        for c in 0..expected.ncols() {
            for r in 0..expected.nrows() {
                let (a, n) = (actual[(r, c)], expected[(r, c)]);
                if (a - n).abs() > config.tolerance * (1.0 + n.abs()) {
                    return Err(CoreError::JacobianCheck(format!(
                        "{} entry ({r}, {c}): analytic {a:.9e}, numerical {n:.9e}",
                        format_key(&key)
                    ))
                    .log()
                    .into());
                }
            }
        }
    }

    debug!(
        "Jacobian check passed for {} key(s), {} output rows",
        analytic.len(),
        T::DOF
    );
    Ok(())
}
