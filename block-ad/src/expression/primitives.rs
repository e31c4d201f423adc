//! Differentiable geometric primitives
//!
//! Each primitive pairs a forward formula with its exact local Jacobians, evaluated at the
//! operand values:
//!
//! Primitive                 | Output   | Local Jacobians
//! ------------------------- | -------- | ----------------------------------------------
//! `transform_to(T, p)`      | `Rᵀ(p−t)`| `[−I, [q]ₓ]`, `Rᵀ`
//! `transform_from(T, p)`    | `R p + t`| `[R, −R[p]ₓ]`, `R`
//! `project(p)`              | `(x/z, y/z)` | `[[1/z, 0, −x/z²], [0, 1/z, −y/z²]]`
//! `uncalibrate(K, p)`       | pixel    | `[[x,0,y,1,0],[0,y,0,0,1]]`, `[[fx,s],[0,fy]]`
//! `subtract(a, b)`          | `a − b`  | `I`, `−I`
//! `add(a, b)`               | `a + b`  | `I`, `I`
//! `compose(a, b)`           | `a ∘ b`  | `Ad(b⁻¹)`, `I`
//! `between(a, b)`           | `a⁻¹ ∘ b`| `−Ad((a⁻¹b)⁻¹)`, `I`

use crate::{
    core::values::ValueType,
    error::BlockAdResult,
    expression::Expression,
    manifold::{
        LieGroup, Point2, Point3, ProjectionJacobian, VectorSpace,
        cal3_s2::{Cal3S2, CalibrationJacobian},
        project_to_camera,
        se3::{PoseJacobian3, SE3},
    },
};
use nalgebra::{DMatrix, Matrix2, Matrix3, SMatrix};
use std::ops::{Add, Sub};

/// Copy a fixed-size Jacobian into a requested dynamic buffer.
fn write_jacobian<const R: usize, const C: usize>(
    target: Option<&mut DMatrix<f64>>,
    source: &SMatrix<f64, R, C>,
) {
    if let Some(jac) = target {
        jac.copy_from(source);
    }
}

/// A world point expressed in the pose's local frame.
pub fn transform_to(pose: &Expression<SE3>, point: &Expression<Point3>) -> Expression<Point3> {
    Expression::binary(
        "transform_to",
        |pose: &SE3,
         point: &Point3,
         h_pose: Option<&mut DMatrix<f64>>,
         h_point: Option<&mut DMatrix<f64>>|
         -> BlockAdResult<Point3> {
            let mut j_pose = PoseJacobian3::zeros();
            let mut j_point = Matrix3::zeros();
            let local = pose.transform_to(
                point,
                h_pose.is_some().then_some(&mut j_pose),
                h_point.is_some().then_some(&mut j_point),
            );
            write_jacobian(h_pose, &j_pose);
            write_jacobian(h_point, &j_point);
            Ok(local)
        },
        pose,
        point,
    )
}

/// A local point expressed in world coordinates.
pub fn transform_from(pose: &Expression<SE3>, point: &Expression<Point3>) -> Expression<Point3> {
    Expression::binary(
        "transform_from",
        |pose: &SE3,
         point: &Point3,
         h_pose: Option<&mut DMatrix<f64>>,
         h_point: Option<&mut DMatrix<f64>>|
         -> BlockAdResult<Point3> {
            let mut j_pose = PoseJacobian3::zeros();
            let mut j_point = Matrix3::zeros();
            let world = pose.transform_from(
                point,
                h_pose.is_some().then_some(&mut j_pose),
                h_point.is_some().then_some(&mut j_point),
            );
            write_jacobian(h_pose, &j_pose);
            write_jacobian(h_point, &j_point);
            Ok(world)
        },
        pose,
        point,
    )
}

/// Pinhole projection onto the normalized image plane.
///
/// Evaluation fails with `DegenerateGeometry` for points at non-positive or non-finite depth.
pub fn project(point: &Expression<Point3>) -> Expression<Point2> {
    Expression::unary(
        "project",
        |point: &Point3, h_point: Option<&mut DMatrix<f64>>| -> BlockAdResult<Point2> {
            let mut j_point = ProjectionJacobian::zeros();
            let uv = project_to_camera(point, h_point.is_some().then_some(&mut j_point))?;
            write_jacobian(h_point, &j_point);
            Ok(uv)
        },
        point,
    )
}

/// Normalized image coordinates to pixels.
pub fn uncalibrate(
    calibration: &Expression<Cal3S2>,
    point: &Expression<Point2>,
) -> Expression<Point2> {
    Expression::binary(
        "uncalibrate",
        |calibration: &Cal3S2,
         point: &Point2,
         h_calibration: Option<&mut DMatrix<f64>>,
         h_point: Option<&mut DMatrix<f64>>|
         -> BlockAdResult<Point2> {
            let mut j_calibration = CalibrationJacobian::zeros();
            let mut j_point = Matrix2::zeros();
            let pixel = calibration.uncalibrate(
                point,
                h_calibration.is_some().then_some(&mut j_calibration),
                h_point.is_some().then_some(&mut j_point),
            );
            write_jacobian(h_calibration, &j_calibration);
            write_jacobian(h_point, &j_point);
            Ok(pixel)
        },
        calibration,
        point,
    )
}

/// Difference `a − b` of two vector-space values.
pub fn subtract<V: VectorSpace + ValueType>(a: &Expression<V>, b: &Expression<V>) -> Expression<V> {
    Expression::binary(
        "subtract",
        |a: &V, b: &V, h_a: Option<&mut DMatrix<f64>>, h_b: Option<&mut DMatrix<f64>>| {
            if let Some(jac) = h_a {
                jac.fill_with_identity();
            }
            if let Some(jac) = h_b {
                jac.fill_with_identity();
                jac.neg_mut();
            }
            Ok(*a - *b)
        },
        a,
        b,
    )
}

/// Sum `a + b` of two vector-space values.
pub fn add<V: VectorSpace + ValueType>(a: &Expression<V>, b: &Expression<V>) -> Expression<V> {
    Expression::binary(
        "add",
        |a: &V, b: &V, h_a: Option<&mut DMatrix<f64>>, h_b: Option<&mut DMatrix<f64>>| {
            if let Some(jac) = h_a {
                jac.fill_with_identity();
            }
            if let Some(jac) = h_b {
                jac.fill_with_identity();
            }
            Ok(*a + *b)
        },
        a,
        b,
    )
}

/// Group composition `a ∘ b`.
pub fn compose<G: LieGroup + ValueType>(a: &Expression<G>, b: &Expression<G>) -> Expression<G> {
    Expression::binary(
        "compose",
        |a: &G, b: &G, h_a: Option<&mut DMatrix<f64>>, h_b: Option<&mut DMatrix<f64>>| {
            Ok(a.compose(b, h_a, h_b))
        },
        a,
        b,
    )
}

/// Relative element `a⁻¹ ∘ b`.
pub fn between<G: LieGroup + ValueType>(a: &Expression<G>, b: &Expression<G>) -> Expression<G> {
    Expression::binary(
        "between",
        |a: &G, b: &G, h_a: Option<&mut DMatrix<f64>>, h_b: Option<&mut DMatrix<f64>>| {
            Ok(a.between(b, h_a, h_b))
        },
        a,
        b,
    )
}

impl<V: VectorSpace + ValueType> Sub for &Expression<V> {
    type Output = Expression<V>;

    fn sub(self, other: Self) -> Expression<V> {
        subtract(self, other)
    }
}

impl<V: VectorSpace + ValueType> Add for &Expression<V> {
    type Output = Expression<V>;

    fn add(self, other: Self) -> Expression<V> {
        add(self, other)
    }
}
