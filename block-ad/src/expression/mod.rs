//! Expressions: typed trees of differentiable functions over variables
//!
//! An [`Expression<T>`] evaluates to a value of manifold type `T` and, on request, to the
//! Jacobian of that value with respect to every variable key it reads:
//!
//! ```text
//! Constant(v)          value = v                 J = {}
//! Leaf(k)              value = values[k]         J = { k → I(DOF) }
//! Composed(f, c₁, c₂)  value = f(v₁, v₂)         J[k] = Σᵢ ∂f/∂vᵢ · Jᵢ[k]
//! ```
//!
//! Derivatives are accumulated bottom-up with the chain rule. A key reached through several
//! paths receives the sum of all contributions.
//!
//! # Example
//! ```rust,ignore
//! use block_ad::expression::{Expression, primitives::{project, transform_to, uncalibrate}};
//!
//! let pose = Expression::<SE3>::leaf(1u64);
//! let point = Expression::<Point3>::leaf(2u64);
//! let calibration = Expression::<Cal3S2>::leaf(3u64);
//! let pixel = uncalibrate(&calibration, &project(&transform_to(&pose, &point)));
//! let (value, jacobians) = pixel.derivatives(&values)?;
//! ```

pub mod node;
pub mod numerical;
pub mod primitives;

use crate::{
    core::{
        CoreError, CoreResult,
        values::{Key, ValueType, Values, format_key},
    },
    error::BlockAdResult,
    manifold::Manifold,
};
use nalgebra::DMatrix;
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    sync::Arc,
};

pub use node::{BinaryNode, UnaryNode};

/// Jacobian blocks of one output, keyed by variable.
///
/// Every block has `rows` rows (the output tangent dimension).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JacobianMap {
    rows: usize,
    blocks: BTreeMap<Key, DMatrix<f64>>,
}

impl JacobianMap {
    pub fn new(rows: usize) -> Self {
        JacobianMap {
            rows,
            blocks: BTreeMap::new(),
        }
    }

    /// Map with a single identity block, as contributed by a leaf.
    pub fn identity(key: Key, dim: usize) -> Self {
        let mut blocks = BTreeMap::new();
        blocks.insert(key, DMatrix::identity(dim, dim));
        JacobianMap { rows: dim, blocks }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Add `block` to the entry for `key`, inserting it when absent.
    pub fn add_or_insert(&mut self, key: Key, block: DMatrix<f64>) -> CoreResult<()> {
        if block.nrows() != self.rows {
            return Err(CoreError::DimensionMismatch {
                context: format!("Jacobian rows for {}", format_key(&key)),
                expected: self.rows,
                actual: block.nrows(),
            }
            .log());
        }

        match self.blocks.get_mut(&key) {
            Some(existing) => {
                if existing.ncols() != block.ncols() {
                    return Err(CoreError::DimensionMismatch {
                        context: format!("Jacobian columns for {}", format_key(&key)),
                        expected: existing.ncols(),
                        actual: block.ncols(),
                    }
                    .log());
                }
                *existing += block;
            }
            None => {
                self.blocks.insert(key, block);
            }
        }
        Ok(())
    }

    pub fn get(&self, key: Key) -> Option<&DMatrix<f64>> {
        self.blocks.get(&key)
    }

    /// Keys in ascending order.
    pub fn keys(&self) -> Vec<Key> {
        self.blocks.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Key, &DMatrix<f64>)> {
        self.blocks.iter().map(|(key, block)| (*key, block))
    }

    /// Fold `local · J` for every `(key, J)` of `child` into this map.
    pub fn accumulate(&mut self, local: &DMatrix<f64>, child: &JacobianMap) -> CoreResult<()> {
        for (key, block) in child.iter() {
            self.add_or_insert(key, local * block)?;
        }
        Ok(())
    }
}

impl IntoIterator for JacobianMap {
    type Item = (Key, DMatrix<f64>);
    type IntoIter = std::collections::btree_map::IntoIter<Key, DMatrix<f64>>;

    fn into_iter(self) -> Self::IntoIter {
        self.blocks.into_iter()
    }
}

/// A composed node: a primitive applied to typed children.
pub trait ExpressionNode<T>: fmt::Debug + Send + Sync {
    fn value(&self, values: &Values) -> BlockAdResult<T>;

    fn derivatives(&self, values: &Values) -> BlockAdResult<(T, JacobianMap)>;

    /// Insert the leaf keys of this subtree.
    fn collect_keys(&self, keys: &mut BTreeSet<Key>);
}

/// Immutable, cheaply clonable expression tree producing a `T`.
pub enum Expression<T> {
    Constant(Arc<T>),
    Leaf(Key),
    Composed(Arc<dyn ExpressionNode<T>>),
}

impl<T> Clone for Expression<T> {
    fn clone(&self) -> Self {
        match self {
            Expression::Constant(value) => Expression::Constant(Arc::clone(value)),
            Expression::Leaf(key) => Expression::Leaf(*key),
            Expression::Composed(node) => Expression::Composed(Arc::clone(node)),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Expression<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Constant(value) => write!(f, "Constant({:?})", value),
            Expression::Leaf(key) => write!(f, "Leaf({})", format_key(key)),
            Expression::Composed(node) => fmt::Debug::fmt(node, f),
        }
    }
}

impl<T: ValueType> Expression<T> {
    pub fn constant(value: T) -> Self {
        Expression::Constant(Arc::new(value))
    }

    pub fn leaf(key: impl Into<Key>) -> Self {
        Expression::Leaf(key.into())
    }

    /// Wrap a custom node.
    pub fn composed(node: impl ExpressionNode<T> + 'static) -> Self {
        Expression::Composed(Arc::new(node))
    }

    /// Apply a one-argument primitive.
    ///
    /// `function` receives the child value and, when the child depends on any variable, a
    /// `T::DOF × A::DOF` buffer for its local Jacobian.
    pub fn unary<A, F>(name: &'static str, function: F, child: &Expression<A>) -> Self
    where
        A: ValueType,
        F: Fn(&A, Option<&mut DMatrix<f64>>) -> BlockAdResult<T> + Send + Sync + 'static,
    {
        Expression::composed(UnaryNode::new(name, function, child.clone()))
    }

    /// Apply a two-argument primitive.
    ///
    /// Jacobian buffers are `T::DOF × A::DOF` and `T::DOF × B::DOF`.
    pub fn binary<A, B, F>(
        name: &'static str,
        function: F,
        first: &Expression<A>,
        second: &Expression<B>,
    ) -> Self
    where
        A: ValueType,
        B: ValueType,
        F: Fn(&A, &B, Option<&mut DMatrix<f64>>, Option<&mut DMatrix<f64>>) -> BlockAdResult<T>
            + Send
            + Sync
            + 'static,
    {
        Expression::composed(BinaryNode::new(
            name,
            function,
            first.clone(),
            second.clone(),
        ))
    }

    /// Evaluate the expression.
    pub fn value(&self, values: &Values) -> BlockAdResult<T> {
        match self {
            Expression::Constant(value) => Ok(value.as_ref().clone()),
            Expression::Leaf(key) => Ok(values.at::<T>(*key)?.clone()),
            Expression::Composed(node) => node.value(values),
        }
    }

    /// Evaluate the expression together with its Jacobians with respect to every leaf key.
    pub fn derivatives(&self, values: &Values) -> BlockAdResult<(T, JacobianMap)> {
        match self {
            Expression::Constant(value) => {
                Ok((value.as_ref().clone(), JacobianMap::new(T::DOF)))
            }
            Expression::Leaf(key) => {
                let value = values.at::<T>(*key)?.clone();
                let dim = value.tangent_dim();
                Ok((value, JacobianMap::identity(*key, dim)))
            }
            Expression::Composed(node) => node.derivatives(values),
        }
    }

    /// Sorted, deduplicated leaf keys.
    pub fn keys(&self) -> Vec<Key> {
        let mut keys = BTreeSet::new();
        self.collect_keys(&mut keys);
        keys.into_iter().collect()
    }

    pub fn collect_keys(&self, keys: &mut BTreeSet<Key>) {
        match self {
            Expression::Constant(_) => {}
            Expression::Leaf(key) => {
                keys.insert(*key);
            }
            Expression::Composed(node) => node.collect_keys(keys),
        }
    }

    /// Output tangent dimension.
    pub fn dim(&self) -> usize {
        T::DOF
    }

    pub fn is_constant(&self) -> bool {
        matches!(self, Expression::Constant(_))
    }
}

impl<T: ValueType> From<T> for Expression<T> {
    fn from(value: T) -> Self {
        Expression::constant(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::BlockAdError,
        manifold::{Point2, Point3, se3::SE3},
    };
    use nalgebra::dmatrix;
    use std::sync::atomic::{AtomicUsize, Ordering};

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    fn scale(factor: f64) -> impl Fn(&Point2, Option<&mut DMatrix<f64>>) -> BlockAdResult<Point2> {
        move |p: &Point2, jacobian: Option<&mut DMatrix<f64>>| {
            if let Some(jac) = jacobian {
                jac.fill_with_identity();
                *jac *= factor;
            }
            Ok(p * factor)
        }
    }

    #[test]
    fn test_jacobian_map_add_or_insert_sums() -> TestResult {
        let mut map = JacobianMap::new(2);
        map.add_or_insert(1, dmatrix![1.0, 2.0; 3.0, 4.0])?;
        map.add_or_insert(1, dmatrix![1.0, 1.0; 1.0, 1.0])?;
        map.add_or_insert(0, dmatrix![5.0; 6.0])?;
        assert_eq!(map.keys(), vec![0, 1]);
        assert_eq!(map.get(1), Some(&dmatrix![2.0, 3.0; 4.0, 5.0]));

        assert!(map.add_or_insert(1, DMatrix::zeros(3, 2)).is_err());
        assert!(map.add_or_insert(1, DMatrix::zeros(2, 3)).is_err());
        Ok(())
    }

    #[test]
    fn test_constant_has_no_derivatives() -> TestResult {
        let expr = Expression::constant(Point3::new(1.0, 2.0, 3.0));
        let (value, jacobians) = expr.derivatives(&Values::new())?;
        assert_eq!(value, Point3::new(1.0, 2.0, 3.0));
        assert!(jacobians.is_empty());
        assert!(expr.keys().is_empty());
        Ok(())
    }

    #[test]
    fn test_leaf_contributes_identity() -> TestResult {
        let mut values = Values::new();
        values.insert(4u64, SE3::identity())?;
        let (_, jacobians) = Expression::<SE3>::leaf(4u64).derivatives(&values)?;
        assert_eq!(jacobians.get(4), Some(&DMatrix::identity(6, 6)));
        assert_eq!(jacobians.rows(), 6);
        Ok(())
    }

    #[test]
    fn test_unary_chain_rule() -> TestResult {
        let mut values = Values::new();
        values.insert(1u64, Point2::new(1.0, -1.0))?;
        let leaf = Expression::<Point2>::leaf(1u64);
        let doubled = Expression::unary("scale", scale(2.0), &leaf);
        let tripled = Expression::unary("scale", scale(3.0), &doubled);

        let (value, jacobians) = tripled.derivatives(&values)?;
        assert_eq!(value, Point2::new(6.0, -6.0));
        assert_eq!(jacobians.get(1), Some(&(DMatrix::identity(2, 2) * 6.0)));
        Ok(())
    }

    #[test]
    fn test_shared_leaf_contributions_are_summed() -> TestResult {
        let mut values = Values::new();
        values.insert(1u64, Point2::new(0.5, 2.0))?;
        let x = Expression::<Point2>::leaf(1u64);
        let doubled = Expression::unary("scale", scale(2.0), &x);
        let sum = Expression::binary(
            "add",
            |a: &Point2, b: &Point2, ja: Option<&mut DMatrix<f64>>, jb: Option<&mut DMatrix<f64>>| {
                if let Some(jac) = ja {
                    jac.fill_with_identity();
                }
                if let Some(jac) = jb {
                    jac.fill_with_identity();
                }
                Ok(a + b)
            },
            &x,
            &doubled,
        );

        let (value, jacobians) = sum.derivatives(&values)?;
        assert_eq!(value, Point2::new(1.5, 6.0));
        assert_eq!(jacobians.len(), 1);
        assert_eq!(jacobians.get(1), Some(&(DMatrix::identity(2, 2) * 3.0)));
        assert_eq!(sum.keys(), vec![1]);
        Ok(())
    }

    #[test]
    fn test_missing_and_mistyped_leaf() -> TestResult {
        let mut values = Values::new();
        values.insert(1u64, Point3::zeros())?;

        let missing = Expression::<Point3>::leaf(2u64).value(&values);
        assert_eq!(
            missing,
            Err(BlockAdError::Core(CoreError::MissingVariable { key: 2 }))
        );

        let mistyped = Expression::<SE3>::leaf(1u64).derivatives(&values);
        assert!(matches!(
            mistyped,
            Err(BlockAdError::Core(CoreError::TypeMismatch { key: 1, .. }))
        ));
        Ok(())
    }

    #[test]
    fn test_local_jacobians_requested_only_when_needed() -> TestResult {
        let requests = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&requests);
        let sum = Expression::<Point2>::binary(
            "counted_sum",
            move |a: &Point2,
                  b: &Point2,
                  h_a: Option<&mut DMatrix<f64>>,
                  h_b: Option<&mut DMatrix<f64>>| {
                for jac in [h_a, h_b].into_iter().flatten() {
                    counter.fetch_add(1, Ordering::SeqCst);
                    jac.fill_with_identity();
                }
                Ok(a + b)
            },
            &Expression::leaf(1u64),
            &Expression::constant(Point2::new(1.0, 1.0)),
        );
        let mut values = Values::new();
        values.insert(1u64, Point2::new(2.0, 3.0))?;

        assert_eq!(sum.value(&values)?, Point2::new(3.0, 4.0));
        assert_eq!(requests.load(Ordering::SeqCst), 0);

        let (_, jacobians) = sum.derivatives(&values)?;
        assert_eq!(requests.load(Ordering::SeqCst), 1);
        assert_eq!(jacobians.keys(), vec![1]);
        Ok(())
    }

    #[test]
    fn test_wrongly_sized_local_jacobian_is_rejected() -> TestResult {
        let mut values = Values::new();
        values.insert(1u64, Point2::new(1.0, 1.0))?;
        let bad = Expression::<Point2>::unary(
            "resize",
            |p: &Point2, jacobian: Option<&mut DMatrix<f64>>| {
                if let Some(jac) = jacobian {
                    *jac = DMatrix::identity(3, 3);
                }
                Ok(*p)
            },
            &Expression::leaf(1u64),
        );
        assert!(matches!(
            bad.derivatives(&values),
            Err(BlockAdError::Core(CoreError::DimensionMismatch { .. }))
        ));
        Ok(())
    }
}
