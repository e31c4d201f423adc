//! SO3 - Special Orthogonal Group in 3D
//!
//! This module implements the Special Orthogonal group SO(3), which represents
//! rotations in 3D space.
//!
//! SO(3) elements are represented using nalgebra's UnitQuaternion internally.
//! SO(3) tangent elements are axis-angle vectors in R³, applied on the right:
//! `R ⊕ θ = R·Exp(θ)`.

use crate::manifold::{LieGroup, Manifold, skew};
use nalgebra::{DMatrix, DVector, Matrix3, Quaternion, UnitQuaternion, Vector3};
use std::{
    fmt,
    fmt::{Display, Formatter},
};

/// SO(3) group element representing rotations in 3D.
#[derive(Debug, Clone, PartialEq)]
pub struct SO3 {
    /// Internal representation as a unit quaternion
    quaternion: UnitQuaternion<f64>,
}

impl Display for SO3 {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let q = self.quaternion.quaternion();
        write!(
            f,
            "SO3(quaternion: [w: {:.4}, x: {:.4}, y: {:.4}, z: {:.4}])",
            q.w, q.i, q.j, q.k
        )
    }
}

impl Default for SO3 {
    fn default() -> Self {
        Self::identity()
    }
}

impl SO3 {
    /// Get the identity rotation.
    pub fn identity() -> Self {
        SO3 {
            quaternion: UnitQuaternion::identity(),
        }
    }

    /// Create a new SO(3) element from a unit quaternion.
    pub fn new(quaternion: UnitQuaternion<f64>) -> Self {
        SO3 { quaternion }
    }

    /// Create SO(3) from Euler angles (roll, pitch, yaw).
    pub fn from_euler_angles(roll: f64, pitch: f64, yaw: f64) -> Self {
        SO3::new(UnitQuaternion::from_euler_angles(roll, pitch, yaw))
    }

    /// Create SO(3) from a scaled axis (axis-angle vector).
    pub fn from_scaled_axis(axis_angle: Vector3<f64>) -> Self {
        SO3::new(UnitQuaternion::from_scaled_axis(axis_angle))
    }

    /// Get the quaternion representation.
    pub fn quaternion(&self) -> UnitQuaternion<f64> {
        self.quaternion
    }

    /// Get the 3x3 rotation matrix.
    pub fn rotation_matrix(&self) -> Matrix3<f64> {
        self.quaternion.to_rotation_matrix().into_inner()
    }

    /// Inverse rotation `Rᵀ`.
    pub fn inverse(&self) -> Self {
        SO3 {
            quaternion: self.quaternion.inverse(),
        }
    }

    /// Rotate a vector: `R v`.
    pub fn rotate(&self, vector: &Vector3<f64>) -> Vector3<f64> {
        self.quaternion * vector
    }

    /// Rotate a vector by the inverse rotation: `Rᵀ v`.
    pub fn unrotate(&self, vector: &Vector3<f64>) -> Vector3<f64> {
        self.quaternion.inverse_transform_vector(vector)
    }

    /// Exponential map from an axis-angle vector.
    ///
    /// # Notes
    /// q = Exp(θu) = cos(θ/2) + u sin(θ/2)
    pub fn exp(theta: &Vector3<f64>) -> Self {
        let quaternion = if theta.norm_squared() > f64::EPSILON {
            UnitQuaternion::from_scaled_axis(*theta)
        } else {
            UnitQuaternion::from_quaternion(Quaternion::new(
                1.0,
                theta.x / 2.0,
                theta.y / 2.0,
                theta.z / 2.0,
            ))
        };
        SO3 { quaternion }
    }

    /// Logarithmic map to an axis-angle vector with angle in [0, π].
    ///
    /// # Notes
    /// θu = Log(q) = (2 / ||v||) * v * atan2(||v||, w)
    pub fn log(&self) -> Vector3<f64> {
        let q = self.quaternion.quaternion();
        let sin_angle_squared = q.i * q.i + q.j * q.j + q.k * q.k;

        let log_coeff = if sin_angle_squared > f64::EPSILON {
            let sin_angle = sin_angle_squared.sqrt();
            let cos_angle = q.w;

            // q and -q are the same rotation; pick the representative with w >= 0
            let two_angle = 2.0
                * if cos_angle < 0.0 {
                    f64::atan2(-sin_angle, -cos_angle)
                } else {
                    f64::atan2(sin_angle, cos_angle)
                };

            two_angle / sin_angle
        } else {
            2.0
        };

        Vector3::new(q.i * log_coeff, q.j * log_coeff, q.k * log_coeff)
    }

    /// Right Jacobian of the exponential map.
    ///
    /// # Notes
    /// J_r(θ) = I - (1 - cos θ)/θ² [θ]ₓ + (θ - sin θ)/θ³ [θ]ₓ²
    pub fn right_jacobian(theta: &Vector3<f64>) -> Matrix3<f64> {
        let theta_squared = theta.norm_squared();
        let theta_hat = skew(theta);

        if theta_squared <= f64::EPSILON {
            Matrix3::identity() - 0.5 * theta_hat + theta_hat * theta_hat / 6.0
        } else {
            let angle = theta_squared.sqrt();
            Matrix3::identity() - (1.0 - angle.cos()) / theta_squared * theta_hat
                + (angle - angle.sin()) / (theta_squared * angle) * theta_hat * theta_hat
        }
    }

    /// Inverse of the right Jacobian of the exponential map.
    ///
    /// # Notes
    /// J_r⁻¹(θ) = I + (1/2) [θ]ₓ + (1/θ² - (1 + cos θ)/(2θ sin θ)) [θ]ₓ²
    pub fn right_jacobian_inv(theta: &Vector3<f64>) -> Matrix3<f64> {
        let theta_squared = theta.norm_squared();
        let theta_hat = skew(theta);

        if theta_squared <= f64::EPSILON {
            Matrix3::identity() + 0.5 * theta_hat + theta_hat * theta_hat / 12.0
        } else {
            let angle = theta_squared.sqrt();
            let coeff = 1.0 / theta_squared - (1.0 + angle.cos()) / (2.0 * angle * angle.sin());
            Matrix3::identity() + 0.5 * theta_hat + coeff * theta_hat * theta_hat
        }
    }

    /// Generate a random rotation (useful for testing).
    pub fn random() -> Self {
        SO3::from_scaled_axis(Vector3::new(
            rand::random::<f64>() * 2.0 - 1.0,
            rand::random::<f64>() * 2.0 - 1.0,
            rand::random::<f64>() * 2.0 - 1.0,
        ))
    }
}

impl Manifold for SO3 {
    const DOF: usize = 3;

    fn retract(&self, delta: &DVector<f64>) -> Self {
        let theta = Vector3::new(delta[0], delta[1], delta[2]);
        SO3 {
            quaternion: self.quaternion * SO3::exp(&theta).quaternion,
        }
    }

    fn local_coordinates(
        &self,
        other: &Self,
        jacobian_other: Option<&mut DMatrix<f64>>,
    ) -> DVector<f64> {
        let omega = self.between(other, None, None).log();
        if let Some(jac) = jacobian_other {
            jac.copy_from(&SO3::right_jacobian_inv(&omega));
        }
        DVector::from_column_slice(omega.as_slice())
    }
}

impl LieGroup for SO3 {
    /// # Notes
    /// J_RaRb_Ra = Rbᵀ, J_RaRb_Rb = I
    fn compose(
        &self,
        other: &Self,
        jacobian_self: Option<&mut DMatrix<f64>>,
        jacobian_other: Option<&mut DMatrix<f64>>,
    ) -> Self {
        if let Some(jac) = jacobian_self {
            jac.copy_from(&other.rotation_matrix().transpose());
        }
        if let Some(jac) = jacobian_other {
            jac.fill_with_identity();
        }
        SO3 {
            quaternion: self.quaternion * other.quaternion,
        }
    }

    /// # Notes
    /// J_(Raᵀ Rb)_Ra = -(Raᵀ Rb)ᵀ, J_(Raᵀ Rb)_Rb = I
    fn between(
        &self,
        other: &Self,
        jacobian_self: Option<&mut DMatrix<f64>>,
        jacobian_other: Option<&mut DMatrix<f64>>,
    ) -> Self {
        let result = SO3 {
            quaternion: self.quaternion.inverse() * other.quaternion,
        };
        if let Some(jac) = jacobian_self {
            jac.copy_from(&(-result.rotation_matrix().transpose()));
        }
        if let Some(jac) = jacobian_other {
            jac.fill_with_identity();
        }
        result
    }
}
