//! Manifold representations for values flowing through expressions.
//!
//! Every quantity an [`Expression`](crate::expression::Expression) evaluates to lives on a
//! manifold: a space that is locally parameterized by a flat tangent vector even when the
//! space itself is not a vector space (rotations, rigid poses).
//!
//! Manifold      | Type          | DOF | retract(x, δ)                 | local(a, b)
//! ------------- | ------------- | --- | ----------------------------- | ------------------------------
//! 2-D point     | `Point2`      | 2   | x + δ                         | b − a
//! 3-D point     | `Point3`      | 3   | x + δ                         | b − a
//! Rotation      | `SO3`         | 3   | R·Exp(θ)                      | Log(Raᵀ Rb)
//! Rigid motion  | `SE3`         | 6   | (R·Exp(θ), t + R·ρ)           | [Raᵀ(tb − ta), Log(Raᵀ Rb)]
//! Calibration   | `Cal3S2`      | 5   | K + δ                         | Kb − Ka
//!
//! Tangent vectors of [`SE3`](se3::SE3) are ordered `[ρ(3), θ(3)]`: translation first, rotation
//! second. All Jacobians in this crate are taken with respect to these right-hand perturbations.
//!
//! # Mathematical Background
//!
//! The two operations every manifold must provide are
//!
//! ```text
//! retract:           M × T_x M → M      x ⊕ δ
//! local coordinates: M × M → T_x M      a ⊖ b   with   a ⊕ (a ⊖ b) = b
//! ```
//!
//! An analytic Jacobian `J` of some function `f: A → B` is then the matrix satisfying
//! `f(a ⊕ δ) ≈ f(a) ⊕ (J δ)` for small `δ`.

use nalgebra::{DMatrix, DVector, Matrix3, SMatrix, Vector2, Vector3};
use std::fmt::Debug;
use std::ops::{Add, Sub};
use thiserror::Error;
use tracing::error;

pub mod cal3_s2;
pub mod se3;
pub mod so3;

/// 2-D point (image plane or normalized camera coordinates).
pub type Point2 = Vector2<f64>;

/// 3-D point in some Euclidean frame.
pub type Point3 = Vector3<f64>;

/// Errors that can occur during manifold and geometry operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ManifoldError {
    /// A primitive's geometric precondition was violated (e.g. non-positive depth)
    #[error("Degenerate geometry: {0}")]
    DegenerateGeometry(String),

    /// Tangent vector of the wrong length supplied to retract
    #[error("Invalid tangent dimension: expected {expected}, got {actual}")]
    InvalidTangentDimension { expected: usize, actual: usize },
}

impl ManifoldError {
    /// Log the error with tracing::error and return self for chaining
    ///
    /// # Example
    /// ```ignore
    /// project_to_camera(&p, None)
    ///     .map_err(|e| e.log())?;
    /// ```
    #[must_use]
    pub fn log(self) -> Self {
        error!("{}", self);
        self
    }
}

/// Result type for manifold operations.
pub type ManifoldResult<T> = Result<T, ManifoldError>;

/// Minimal algebraic interface every value type in an expression must satisfy.
///
/// The `local_coordinates` Jacobian is what lets a factor differentiate its residual
/// `measurement ⊖ predicted` exactly, even when the measurement lives on a curved manifold.
pub trait Manifold: Clone + Debug + Send + Sync + 'static {
    /// Degrees of freedom - dimension of the tangent space
    const DOF: usize;

    /// Retract: apply a tangent perturbation, `self ⊕ delta`.
    ///
    /// # Panics
    /// If `delta` is shorter than [`Self::DOF`]. Use [`Manifold::try_retract`] for
    /// vectors of unchecked length.
    fn retract(&self, delta: &DVector<f64>) -> Self;

    /// Retract after checking that `delta` has length [`Self::DOF`].
    fn try_retract(&self, delta: &DVector<f64>) -> ManifoldResult<Self> {
        if delta.len() != Self::DOF {
            return Err(ManifoldError::InvalidTangentDimension {
                expected: Self::DOF,
                actual: delta.len(),
            }
            .log());
        }
        Ok(self.retract(delta))
    }

    /// Local coordinates: the tangent vector taking `self` to `other`.
    ///
    /// # Arguments
    /// * `other` - Target element
    /// * `jacobian_other` - Optional `DOF × DOF` Jacobian of the result with respect to a
    ///   retraction of `other`
    fn local_coordinates(
        &self,
        other: &Self,
        jacobian_other: Option<&mut DMatrix<f64>>,
    ) -> DVector<f64>;

    /// Get the dimension of the tangent space for this element.
    fn tangent_dim(&self) -> usize {
        Self::DOF
    }
}

/// Manifolds whose elements form a group, with analytic Jacobians of the group operations.
///
/// Jacobians are written into `DOF × DOF` buffers when requested.
pub trait LieGroup: Manifold {
    /// Compose this element with another: `self ∘ other`.
    fn compose(
        &self,
        other: &Self,
        jacobian_self: Option<&mut DMatrix<f64>>,
        jacobian_other: Option<&mut DMatrix<f64>>,
    ) -> Self;

    /// Relative element `self⁻¹ ∘ other`.
    fn between(
        &self,
        other: &Self,
        jacobian_self: Option<&mut DMatrix<f64>>,
        jacobian_other: Option<&mut DMatrix<f64>>,
    ) -> Self;
}

/// Manifolds that are plain vector spaces, where `⊖` is subtraction.
pub trait VectorSpace: Manifold + Copy + Add<Output = Self> + Sub<Output = Self> {}

impl Manifold for Point2 {
    const DOF: usize = 2;

    fn retract(&self, delta: &DVector<f64>) -> Self {
        Point2::new(self.x + delta[0], self.y + delta[1])
    }

    fn local_coordinates(
        &self,
        other: &Self,
        jacobian_other: Option<&mut DMatrix<f64>>,
    ) -> DVector<f64> {
        if let Some(jac) = jacobian_other {
            jac.fill_with_identity();
        }
        DVector::from_column_slice((other - self).as_slice())
    }
}

impl VectorSpace for Point2 {}

impl Manifold for Point3 {
    const DOF: usize = 3;

    fn retract(&self, delta: &DVector<f64>) -> Self {
        Point3::new(self.x + delta[0], self.y + delta[1], self.z + delta[2])
    }

    fn local_coordinates(
        &self,
        other: &Self,
        jacobian_other: Option<&mut DMatrix<f64>>,
    ) -> DVector<f64> {
        if let Some(jac) = jacobian_other {
            jac.fill_with_identity();
        }
        DVector::from_column_slice((other - self).as_slice())
    }
}

impl VectorSpace for Point3 {}

/// Jacobian of a normalized image point with respect to a camera-frame point.
pub type ProjectionJacobian = SMatrix<f64, 2, 3>;

/// Minimum depth accepted by [`project_to_camera`].
pub fn min_depth() -> f64 {
    f64::EPSILON.sqrt()
}

/// Perspective divide of a camera-frame point onto the normalized image plane.
///
/// Fails with [`ManifoldError::DegenerateGeometry`] when the depth is not finite or lies
/// below [`min_depth`], so callers never see NaN or infinite pixels.
///
/// # Notes
/// ```text
/// π(p) = (x/z, y/z)
/// J    = [ 1/z   0   -x/z² ]
///        [  0   1/z  -y/z² ]
/// ```
pub fn project_to_camera(
    point: &Point3,
    jacobian: Option<&mut ProjectionJacobian>,
) -> ManifoldResult<Point2> {
    let z = point.z;
    if !z.is_finite() || z < min_depth() {
        return Err(ManifoldError::DegenerateGeometry(format!(
            "cannot project point [{:.4}, {:.4}, {:.4}] with depth {} behind or on the image plane",
            point.x, point.y, point.z, z
        ))
        .log());
    }

    let inv_z = 1.0 / z;
    let u = point.x * inv_z;
    let v = point.y * inv_z;

    if let Some(jac) = jacobian {
        *jac = ProjectionJacobian::new(
            inv_z, 0.0, -u * inv_z, //
            0.0, inv_z, -v * inv_z,
        );
    }

    Ok(Point2::new(u, v))
}

/// Skew-symmetric (cross-product) matrix `[v]ₓ` such that `[v]ₓ w = v × w`.
pub fn skew(v: &Vector3<f64>) -> Matrix3<f64> {
    Matrix3::new(0.0, -v.z, v.y, v.z, 0.0, -v.x, -v.y, v.x, 0.0)
}
