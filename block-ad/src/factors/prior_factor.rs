//! Unary prior on a single variable
//!
//! ```text
//! r = prior ⊖ x
//! ```
//!
//! Built as an [`ExpressionFactor`] over a single leaf, so the Jacobian is the local
//! coordinates Jacobian `∂(prior ⊖ x)/∂x` (identity for vector spaces).

use crate::{
    core::{
        jacobian_factor::JacobianFactor,
        noise_model::NoiseModel,
        values::{Key, ValueType, Values},
    },
    error::BlockAdResult,
    expression::Expression,
    factors::{ExpressionFactor, NonlinearFactor},
};
use nalgebra::DVector;

/// Prior belief about one variable of type `T`.
#[derive(Debug, Clone)]
pub struct PriorFactor<T: ValueType> {
    key: Key,
    inner: ExpressionFactor<T>,
}

impl<T: ValueType> PriorFactor<T> {
    pub fn new(key: impl Into<Key>, prior: T, noise_model: NoiseModel) -> BlockAdResult<Self> {
        let key = key.into();
        Ok(PriorFactor {
            key,
            inner: ExpressionFactor::new(prior, Expression::leaf(key), noise_model)?,
        })
    }

    pub fn key(&self) -> Key {
        self.key
    }

    pub fn prior(&self) -> &T {
        self.inner.measurement()
    }
}

impl<T: ValueType> NonlinearFactor for PriorFactor<T> {
    fn keys(&self) -> Vec<Key> {
        vec![self.key]
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
