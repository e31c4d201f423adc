//! Hand-differentiated pinhole reprojection factor
//!
//! # Mathematical Formulation
//!
//! For a camera pose `T`, landmark `p`, calibration `K` and measured pixel `z`:
//!
//! ```text
//! q     = T⁻¹ p                 (transform to camera frame)
//! m     = π(q) = (qx/qz, qy/qz) (perspective divide)
//! u     = K(m)                  (uncalibrate)
//! r     = u − z
//! ```
//!
//! # Jacobian Computation
//!
//! ```text
//! ∂r/∂T = ∂u/∂m · ∂m/∂q · ∂q/∂T     (2×6)
//! ∂r/∂p = ∂u/∂m · ∂m/∂q · ∂q/∂p     (2×3)
//! ∂r/∂K = ∂u/∂K                     (2×5)
//! ```
//!
//! This computes the same quantity as the expression
//! `uncalibrate(K, project(transform_to(T, p)))` with the chain rule unrolled by hand.

use crate::{
    core::{
        CoreError,
        jacobian_factor::JacobianFactor,
        noise_model::NoiseModel,
        values::{Key, Values},
    },
    error::BlockAdResult,
    factors::NonlinearFactor,
    manifold::{
        Point2, Point3, ProjectionJacobian,
        cal3_s2::{Cal3S2, CalibrationJacobian},
        project_to_camera,
        se3::{PoseJacobian3, SE3},
    },
};
use nalgebra::{DMatrix, DVector, Matrix2, Matrix3, SMatrix};
use tracing::debug;

fn to_dynamic<const R: usize, const C: usize>(matrix: &SMatrix<f64, R, C>) -> DMatrix<f64> {
    DMatrix::from_column_slice(R, C, matrix.as_slice())
}

/// Reprojection error of a landmark in a calibrated camera.
#[derive(Debug, Clone)]
pub struct ProjectionFactor {
    pose_key: Key,
    point_key: Key,
    calibration_key: Key,
    measured: Point2,
    noise_model: NoiseModel,
}

impl ProjectionFactor {
    pub fn new(
        pose_key: impl Into<Key>,
        point_key: impl Into<Key>,
        calibration_key: impl Into<Key>,
        measured: Point2,
        noise_model: NoiseModel,
    ) -> BlockAdResult<Self> {
        if noise_model.dim() != 2 {
            return Err(CoreError::DimensionMismatch {
                context: "noise model dimension".to_string(),
                expected: 2,
                actual: noise_model.dim(),
            }
            .log()
            .into());
        }
        Ok(ProjectionFactor {
            pose_key: pose_key.into(),
            point_key: point_key.into(),
            calibration_key: calibration_key.into(),
            measured,
            noise_model,
        })
    }

    pub fn measured(&self) -> &Point2 {
        &self.measured
    }

    /// Predicted pixel at the current values.
    pub fn predict(&self, values: &Values) -> BlockAdResult<Point2> {
        let pose = values.at::<SE3>(self.pose_key)?;
        let point = values.at::<Point3>(self.point_key)?;
        let calibration = values.at::<Cal3S2>(self.calibration_key)?;

        let q = pose.transform_to(point, None, None);
        let m = project_to_camera(&q, None)?;
        Ok(calibration.uncalibrate(&m, None, None))
    }
}

impl NonlinearFactor for ProjectionFactor {
    fn keys(&self) -> Vec<Key> {
        let mut keys = vec![self.pose_key, self.point_key, self.calibration_key];
        keys.sort_unstable();
        keys.dedup();
        keys
    }

    fn dim(&self) -> usize {
        2
    }

    fn noise_model(&self) -> &NoiseModel {
        &self.noise_model
    }

    fn unwhitened_error(&self, values: &Values) -> BlockAdResult<DVector<f64>> {
        let predicted = self.predict(values)?;
        Ok(DVector::from_column_slice((predicted - self.measured).as_slice()))
    }

    fn linearize(&self, values: &Values) -> BlockAdResult<JacobianFactor> {
        let pose = values.at::<SE3>(self.pose_key)?;
        let point = values.at::<Point3>(self.point_key)?;
        let calibration = values.at::<Cal3S2>(self.calibration_key)?;

        let mut q_pose = PoseJacobian3::zeros();
        let mut q_point = Matrix3::zeros();
        let q = pose.transform_to(point, Some(&mut q_pose), Some(&mut q_point));

        let mut m_q = ProjectionJacobian::zeros();
        let m = project_to_camera(&q, Some(&mut m_q))?;

        let mut u_calibration = CalibrationJacobian::zeros();
        let mut u_m = Matrix2::zeros();
        let u = calibration.uncalibrate(&m, Some(&mut u_calibration), Some(&mut u_m));

        let u_q = u_m * m_q;
        let j_pose = u_q * q_pose;
        let j_point = u_q * q_point;

        let residual = DVector::from_column_slice((u - self.measured).as_slice());
        let terms = vec![
            (self.pose_key, to_dynamic(&j_pose)),
            (self.point_key, to_dynamic(&j_point)),
            (self.calibration_key, to_dynamic(&u_calibration)),
        ]
        .into_iter()
        .map(|(key, jacobian)| (key, self.noise_model.whiten_matrix(&jacobian)))
        .collect();
        let whitened = self.noise_model.whiten(&residual);

        debug!(
            "Linearized projection factor, whitened residual norm {:.6e}",
            whitened.norm()
        );
        Ok(JacobianFactor::new(terms, whitened)?)
    }
}
