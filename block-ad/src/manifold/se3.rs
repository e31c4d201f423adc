//! SE(3) - rigid body transformations in 3D (poses)
//!
//! SE(3) elements are represented as an SO(3) rotation plus a Vector3 translation.
//! Tangent vectors are `[rho(3), theta(3)]`, translation first.
//!
//! The retraction is the product retraction with body-frame translation:
//!
//! ```text
//! (R, t) ⊕ [ρ, θ] = (R·Exp(θ), t + R·ρ)
//! ```
//!
//! It agrees with the group exponential `T·Exp([ρ, θ])` to first order, so every
//! Jacobian below is also the usual right-perturbation Jacobian at the linearization
//! point, while `local_coordinates` stays its exact inverse.

use crate::manifold::{LieGroup, Manifold, so3::SO3, skew};
use nalgebra::{
    DMatrix, DVector, Isometry3, Matrix3, Matrix4, Matrix6, SMatrix, Translation3,
    UnitQuaternion, Vector3,
};
use std::{
    fmt,
    fmt::{Display, Formatter},
};

/// Jacobian of a 3-D point with respect to a pose.
pub type PoseJacobian3 = SMatrix<f64, 3, 6>;

/// SE(3) group element: a camera or body pose mapping local coordinates to world.
#[derive(Debug, Clone, PartialEq)]
pub struct SE3 {
    /// Rotation part as SO(3) element
    rotation: SO3,
    /// Translation part as Vector3
    translation: Vector3<f64>,
}

impl Display for SE3 {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let t = self.translation;
        let q = self.rotation.quaternion();
        write!(
            f,
            "SE3(translation: [{:.4}, {:.4}, {:.4}], rotation: [w: {:.4}, x: {:.4}, y: {:.4}, z: {:.4}])",
            t.x, t.y, t.z, q.w, q.i, q.j, q.k
        )
    }
}

impl Default for SE3 {
    fn default() -> Self {
        Self::identity()
    }
}

impl SE3 {
    /// Get the identity pose.
    pub fn identity() -> Self {
        SE3 {
            rotation: SO3::identity(),
            translation: Vector3::zeros(),
        }
    }

    /// Create a new SE3 element from translation and rotation.
    pub fn new(translation: Vector3<f64>, rotation: UnitQuaternion<f64>) -> Self {
        SE3 {
            rotation: SO3::new(rotation),
            translation,
        }
    }

    /// Create SE3 from translation components and Euler angles.
    pub fn from_translation_euler(x: f64, y: f64, z: f64, roll: f64, pitch: f64, yaw: f64) -> Self {
        SE3::new(
            Vector3::new(x, y, z),
            UnitQuaternion::from_euler_angles(roll, pitch, yaw),
        )
    }

    /// Create SE3 from SO3 and Vector3 components.
    pub fn from_translation_so3(translation: Vector3<f64>, rotation: SO3) -> Self {
        SE3 {
            rotation,
            translation,
        }
    }

    /// Create SE3 directly from an Isometry3.
    pub fn from_isometry(isometry: Isometry3<f64>) -> Self {
        SE3 {
            rotation: SO3::new(isometry.rotation),
            translation: isometry.translation.vector,
        }
    }

    /// Get the translation part.
    pub fn translation(&self) -> Vector3<f64> {
        self.translation
    }

    /// Get the rotation part as SO3.
    pub fn rotation(&self) -> &SO3 {
        &self.rotation
    }

    /// Get the 3x3 rotation matrix.
    pub fn rotation_matrix(&self) -> Matrix3<f64> {
        self.rotation.rotation_matrix()
    }

    /// Get as an Isometry3.
    pub fn isometry(&self) -> Isometry3<f64> {
        Isometry3::from_parts(
            Translation3::from(self.translation),
            self.rotation.quaternion(),
        )
    }

    /// Get the 4x4 homogeneous transformation matrix.
    pub fn matrix(&self) -> Matrix4<f64> {
        self.isometry().to_homogeneous()
    }

    /// Inverse pose `(Rᵀ, -Rᵀt)`.
    pub fn inverse(&self) -> Self {
        let rotation = self.rotation.inverse();
        let translation = -rotation.rotate(&self.translation);
        SE3 {
            rotation,
            translation,
        }
    }

    /// Adjoint matrix in `[ρ, θ]` ordering.
    ///
    /// ```text
    /// Ad(T) = [ R   [t]ₓR ]
    ///         [ 0     R   ]
    /// ```
    pub fn adjoint(&self) -> Matrix6<f64> {
        let rotation_matrix = self.rotation_matrix();
        let mut adjoint = Matrix6::zeros();
        adjoint
            .fixed_view_mut::<3, 3>(0, 0)
            .copy_from(&rotation_matrix);
        adjoint
            .fixed_view_mut::<3, 3>(3, 3)
            .copy_from(&rotation_matrix);
        adjoint
            .fixed_view_mut::<3, 3>(0, 3)
            .copy_from(&(skew(&self.translation) * rotation_matrix));
        adjoint
    }

    /// Transform a point from world coordinates into this pose's local frame: `Rᵀ(p - t)`.
    ///
    /// # Notes
    /// With `q = Rᵀ(p - t)`:
    /// ```text
    /// J_q_T = [ -I₃   [q]ₓ ]
    /// J_q_p = Rᵀ
    /// ```
    pub fn transform_to(
        &self,
        point: &Vector3<f64>,
        jacobian_pose: Option<&mut PoseJacobian3>,
        jacobian_point: Option<&mut Matrix3<f64>>,
    ) -> Vector3<f64> {
        let local = self.rotation.unrotate(&(point - self.translation));

        if let Some(jac) = jacobian_pose {
            jac.fixed_view_mut::<3, 3>(0, 0)
                .copy_from(&(-Matrix3::identity()));
            jac.fixed_view_mut::<3, 3>(0, 3).copy_from(&skew(&local));
        }

        if let Some(jac) = jacobian_point {
            *jac = self.rotation_matrix().transpose();
        }

        local
    }

    /// Transform a point from this pose's local frame into world coordinates: `R p + t`.
    ///
    /// # Notes
    /// ```text
    /// J_T = [ R   -R[p]ₓ ]
    /// J_p = R
    /// ```
    pub fn transform_from(
        &self,
        point: &Vector3<f64>,
        jacobian_pose: Option<&mut PoseJacobian3>,
        jacobian_point: Option<&mut Matrix3<f64>>,
    ) -> Vector3<f64> {
        let rotation_matrix = self.rotation_matrix();

        if let Some(jac) = jacobian_pose {
            jac.fixed_view_mut::<3, 3>(0, 0).copy_from(&rotation_matrix);
            jac.fixed_view_mut::<3, 3>(0, 3)
                .copy_from(&(-rotation_matrix * skew(point)));
        }

        if let Some(jac) = jacobian_point {
            *jac = rotation_matrix;
        }

        self.rotation.rotate(point) + self.translation
    }

    /// Generate a random pose (useful for testing).
    pub fn random() -> Self {
        use rand::Rng;
        let mut rng = rand::rng();

        let translation = Vector3::new(
            rng.random_range(-1.0..1.0),
            rng.random_range(-1.0..1.0),
            rng.random_range(-1.0..1.0),
        );

        SE3::from_translation_so3(translation, SO3::random())
    }
}

impl Manifold for SE3 {
    const DOF: usize = 6;

    fn retract(&self, delta: &DVector<f64>) -> Self {
        let rho = Vector3::new(delta[0], delta[1], delta[2]);
        let theta = DVector::from_column_slice(&[delta[3], delta[4], delta[5]]);
        SE3 {
            rotation: self.rotation.retract(&theta),
            translation: self.translation + self.rotation.rotate(&rho),
        }
    }

    /// # Notes
    /// ```text
    /// a ⊖ b = [ Raᵀ(tb - ta), Log(Raᵀ Rb) ]
    /// J_b   = [ Raᵀ Rb    0        ]
    ///         [ 0         J_r⁻¹(ω) ]
    /// ```
    fn local_coordinates(
        &self,
        other: &Self,
        jacobian_other: Option<&mut DMatrix<f64>>,
    ) -> DVector<f64> {
        let relative_rotation = self.rotation.between(&other.rotation, None, None);
        let omega = relative_rotation.log();
        let rho = self.rotation.unrotate(&(other.translation - self.translation));

        if let Some(jac) = jacobian_other {
            jac.fill(0.0);
            jac.view_mut((0, 0), (3, 3))
                .copy_from(&relative_rotation.rotation_matrix());
            jac.view_mut((3, 3), (3, 3))
                .copy_from(&SO3::right_jacobian_inv(&omega));
        }

        DVector::from_column_slice(&[rho.x, rho.y, rho.z, omega.x, omega.y, omega.z])
    }
}

impl LieGroup for SE3 {
    /// # Notes
    /// ```text
    /// J_TaTb_Ta = Ad(Tb⁻¹)
    /// J_TaTb_Tb = I₆
    /// ```
    fn compose(
        &self,
        other: &Self,
        jacobian_self: Option<&mut DMatrix<f64>>,
        jacobian_other: Option<&mut DMatrix<f64>>,
    ) -> Self {
        let result = SE3 {
            rotation: self.rotation.compose(&other.rotation, None, None),
            translation: self.rotation.rotate(&other.translation) + self.translation,
        };

        if let Some(jac) = jacobian_self {
            jac.copy_from(&other.inverse().adjoint());
        }

        if let Some(jac) = jacobian_other {
            jac.fill_with_identity();
        }

        result
    }

    /// # Notes
    /// ```text
    /// J_(Ta⁻¹Tb)_Ta = -Ad((Ta⁻¹Tb)⁻¹)
    /// J_(Ta⁻¹Tb)_Tb = I₆
    /// ```
    fn between(
        &self,
        other: &Self,
        jacobian_self: Option<&mut DMatrix<f64>>,
        jacobian_other: Option<&mut DMatrix<f64>>,
    ) -> Self {
        let result = self.inverse().compose(other, None, None);

        if let Some(jac) = jacobian_self {
            jac.copy_from(&(-result.inverse().adjoint()));
        }

        if let Some(jac) = jacobian_other {
            jac.fill_with_identity();
        }

        result
    }
}
