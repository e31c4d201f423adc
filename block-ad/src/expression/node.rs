//! Unary and binary composed nodes
//!
//! A node evaluates its children, applies the primitive and folds the children's Jacobian
//! maps through the primitive's local Jacobians. A local Jacobian is only requested for a
//! child that depends on at least one variable.

use crate::{
    core::{
        CoreError,
        values::{Key, ValueType, Values},
    },
    error::BlockAdResult,
    expression::{Expression, ExpressionNode, JacobianMap},
    manifold::Manifold,
};
use nalgebra::DMatrix;
use std::{collections::BTreeSet, fmt, marker::PhantomData};
use tracing::trace;

fn check_local_jacobian(
    name: &str,
    jacobian: &DMatrix<f64>,
    rows: usize,
    cols: usize,
) -> BlockAdResult<()> {
    if jacobian.shape() != (rows, cols) {
        return Err(CoreError::DimensionMismatch {
            context: format!(
                "local Jacobian of '{name}' is {}x{}, expected {rows}x{cols}",
                jacobian.nrows(),
                jacobian.ncols()
            ),
            expected: rows * cols,
            actual: jacobian.len(),
        }
        .log()
        .into());
    }
    Ok(())
}

/// `f(a)` for a child producing `A`.
pub struct UnaryNode<T, A, F> {
    name: &'static str,
    function: F,
    child: Expression<A>,
    _output: PhantomData<fn() -> T>,
}

impl<T, A, F> UnaryNode<T, A, F> {
    pub fn new(name: &'static str, function: F, child: Expression<A>) -> Self {
        UnaryNode {
            name,
            function,
            child,
            _output: PhantomData,
        }
    }
}

impl<T, A: fmt::Debug, F> fmt::Debug for UnaryNode<T, A, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({:?})", self.name, self.child)
    }
}

impl<T, A, F> ExpressionNode<T> for UnaryNode<T, A, F>
where
    T: ValueType,
    A: ValueType,
    F: Fn(&A, Option<&mut DMatrix<f64>>) -> BlockAdResult<T> + Send + Sync,
{
    fn value(&self, values: &Values) -> BlockAdResult<T> {
        let a = self.child.value(values)?;
        (self.function)(&a, None)
    }

    fn derivatives(&self, values: &Values) -> BlockAdResult<(T, JacobianMap)> {
        let (a, child_jacobians) = self.child.derivatives(values)?;
        let mut jacobians = JacobianMap::new(T::DOF);

        if child_jacobians.is_empty() {
            let value = (self.function)(&a, None)?;
            return Ok((value, jacobians));
        }

        let mut local = DMatrix::zeros(T::DOF, a.tangent_dim());
        let value = (self.function)(&a, Some(&mut local))?;
        check_local_jacobian(self.name, &local, T::DOF, a.tangent_dim())?;
        jacobians.accumulate(&local, &child_jacobians)?;

        trace!(
            "{}: folded {} key(s) into {}-row Jacobian",
            self.name,
            jacobians.len(),
            T::DOF
        );
        Ok((value, jacobians))
    }

    fn collect_keys(&self, keys: &mut BTreeSet<Key>) {
        self.child.collect_keys(keys);
    }
}

/// `f(a, b)` for children producing `A` and `B`.
pub struct BinaryNode<T, A, B, F> {
    name: &'static str,
    function: F,
    first: Expression<A>,
    second: Expression<B>,
    _output: PhantomData<fn() -> T>,
}

impl<T, A, B, F> BinaryNode<T, A, B, F> {
    pub fn new(name: &'static str, function: F, first: Expression<A>, second: Expression<B>) -> Self {
        BinaryNode {
            name,
            function,
            first,
            second,
            _output: PhantomData,
        }
    }
}

impl<T, A: fmt::Debug, B: fmt::Debug, F> fmt::Debug for BinaryNode<T, A, B, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({:?}, {:?})", self.name, self.first, self.second)
    }
}

impl<T, A, B, F> ExpressionNode<T> for BinaryNode<T, A, B, F>
where
    T: ValueType,
    A: ValueType,
    B: ValueType,
    F: Fn(&A, &B, Option<&mut DMatrix<f64>>, Option<&mut DMatrix<f64>>) -> BlockAdResult<T>
        + Send
        + Sync,
{
    fn value(&self, values: &Values) -> BlockAdResult<T> {
        let a = self.first.value(values)?;
        let b = self.second.value(values)?;
        (self.function)(&a, &b, None, None)
    }

    fn derivatives(&self, values: &Values) -> BlockAdResult<(T, JacobianMap)> {
        let (a, first_jacobians) = self.first.derivatives(values)?;
        let (b, second_jacobians) = self.second.derivatives(values)?;

        let mut local_first = (!first_jacobians.is_empty())
            .then(|| DMatrix::zeros(T::DOF, a.tangent_dim()));
        let mut local_second = (!second_jacobians.is_empty())
            .then(|| DMatrix::zeros(T::DOF, b.tangent_dim()));

        let value = (self.function)(&a, &b, local_first.as_mut(), local_second.as_mut())?;

        let mut jacobians = JacobianMap::new(T::DOF);
        if let Some(local) = &local_first {
            check_local_jacobian(self.name, local, T::DOF, a.tangent_dim())?;
            jacobians.accumulate(local, &first_jacobians)?;
        }
        if let Some(local) = &local_second {
            check_local_jacobian(self.name, local, T::DOF, b.tangent_dim())?;
            jacobians.accumulate(local, &second_jacobians)?;
        }

        trace!(
            "{}: folded {} key(s) into {}-row Jacobian",
            self.name,
            jacobians.len(),
            T::DOF
        );
        Ok((value, jacobians))
    }

    fn collect_keys(&self, keys: &mut BTreeSet<Key>) {
        self.first.collect_keys(keys);
        self.second.collect_keys(keys);
    }
}
