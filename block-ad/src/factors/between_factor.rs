//! Relative measurement between two Lie group variables
//!
//! # Mathematical Formulation
//!
//! Given variables `Tᵢ`, `Tⱼ` and a measured relative transform `Tᵢⱼ`:
//!
//! ```text
//! r = Tᵢⱼ ⊖ (Tᵢ⁻¹ ∘ Tⱼ)
//! ```
//!
//! The residual dimension is the group's DOF (6 for SE(3), 3 for SO(3)). Jacobians follow
//! from the `between` primitive and the local coordinates Jacobian of the measurement.

use crate::{
    core::{
        jacobian_factor::JacobianFactor,
        noise_model::NoiseModel,
        values::{Key, ValueType, Values},
    },
    error::BlockAdResult,
    expression::{Expression, primitives::between},
    factors::{ExpressionFactor, NonlinearFactor},
    manifold::LieGroup,
};
use nalgebra::DVector;

/// Relative constraint between two variables of group type `G`.
#[derive(Debug, Clone)]
pub struct BetweenFactor<G: LieGroup + ValueType> {
    keys: [Key; 2],
    inner: ExpressionFactor<G>,
}

impl<G: LieGroup + ValueType> BetweenFactor<G> {
    pub fn new(
        first: impl Into<Key>,
        second: impl Into<Key>,
        measured: G,
        noise_model: NoiseModel,
    ) -> BlockAdResult<Self> {
        let (first, second) = (first.into(), second.into());
        let prediction = between(&Expression::leaf(first), &Expression::leaf(second));
        Ok(BetweenFactor {
            keys: [first, second],
            inner: ExpressionFactor::new(measured, prediction, noise_model)?,
        })
    }

    pub fn measured(&self) -> &G {
        self.inner.measurement()
    }
}

impl<G: LieGroup + ValueType> NonlinearFactor for BetweenFactor<G> {
    fn keys(&self) -> Vec<Key> {
        self.inner.keys()
    }

    fn dim(&self) -> usize {
        self.inner.dim()
    }

    fn noise_model(&self) -> &NoiseModel {
        self.inner.noise_model()
    }

    fn unwhitened_error(&self, values: &Values) -> BlockAdResult<DVector<f64>> {
        self.inner.unwhitened_error(values)
    }

    fn linearize(&self, values: &Values) -> BlockAdResult<JacobianFactor> {
        self.inner.linearize(values)
    }
}

impl<G: LieGroup + ValueType> BetweenFactor<G> {
    /// Keys in construction order `(first, second)`.
    pub fn key_pair(&self) -> (Key, Key) {
        (self.keys[0], self.keys[1])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        core::values::symbol,
        expression::numerical::NumericalDerivativeConfig,
        manifold::{se3::SE3, so3::SO3},
    };
    use nalgebra::DMatrix;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn test_se3_between_zero_at_measurement() -> TestResult {
        let a = SE3::from_translation_euler(0.0, 0.0, 0.0, 0.0, 0.0, 0.0);
        let b = SE3::from_translation_euler(1.0, 0.0, 0.0, 0.0, 0.0, 0.5);
        let (x0, x1) = (symbol(b'x', 0), symbol(b'x', 1));

        let mut values = Values::new();
        values.insert(x0, a.clone())?;
        values.insert(x1, b.clone())?;

        let measured = a.between(&b, None, None);
        let factor = BetweenFactor::new(x0, x1, measured, NoiseModel::unit(6))?;
        assert_eq!(factor.key_pair(), (x0, x1));
        assert_eq!(factor.keys(), vec![x0, x1]);
        assert!(factor.error(&values)? < 1e-20);

        // At the measurement, J_second = I and J_first = -Ad(b⁻¹ a)
        let linear = factor.linearize(&values)?;
        let second = linear.jacobian(x1).ok_or("missing block")?;
        assert!((second - DMatrix::identity(6, 6)).amax() < 1e-12);
        let first = linear.jacobian(x0).ok_or("missing block")?;
        let expected = -b.inverse().compose(&a, None, None).adjoint();
        for r in 0..6 {
            for c in 0..6 {
                assert!((first[(r, c)] - expected[(r, c)]).abs() < 1e-12);
            }
        }
        Ok(())
    }

    #[test]
    fn test_so3_between_jacobians_numerical() -> TestResult {
        let mut values = Values::new();
        values.insert(1u64, SO3::from_euler_angles(0.1, 0.2, 0.3))?;
        values.insert(2u64, SO3::from_euler_angles(-0.4, 0.5, 0.1))?;
        let factor = BetweenFactor::new(
            1u64,
            2u64,
            SO3::from_euler_angles(-0.3, 0.2, -0.1),
            NoiseModel::unit(3),
        )?;

        let linear = factor.linearize(&values)?;
        let config = NumericalDerivativeConfig::default();
        for key in [1u64, 2u64] {
            let block = linear.jacobian(key).ok_or("missing block")?;
            for i in 0..3 {
                let mut delta = DVector::zeros(3);
                delta[i] = config.step;
                let mut plus = values.clone();
                plus.retract_key(key, &delta)?;
                delta[i] = -config.step;
                let mut minus = values.clone();
                minus.retract_key(key, &delta)?;
                let numerical = (factor.unwhitened_error(&plus)?
                    - factor.unwhitened_error(&minus)?)
                    / (2.0 * config.step);
                assert!((block.column(i) - numerical).norm() < 1e-7);
            }
        }
        Ok(())
    }
}
