//! Cal3S2 - 5-parameter pinhole calibration (fx, fy, skew, u0, v0)
//!
//! ```text
//!     [ fx  s  u0 ]
//! K = [  0 fy  v0 ]
//!     [  0  0   1 ]
//! ```
//!
//! The calibration is a plain vector space with tangent order `[fx, fy, s, u0, v0]`.

use crate::manifold::{Manifold, ManifoldError, ManifoldResult, Point2};
use nalgebra::{DMatrix, DVector, Matrix2, Matrix3, SMatrix};
use std::{
    fmt,
    fmt::{Display, Formatter},
};

/// Jacobian of a pixel with respect to the calibration parameters.
pub type CalibrationJacobian = SMatrix<f64, 2, 5>;

/// Pinhole intrinsics with skew.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cal3S2 {
    pub fx: f64,
    pub fy: f64,
    pub s: f64,
    pub u0: f64,
    pub v0: f64,
}

impl Default for Cal3S2 {
    /// Identity calibration: pixels equal normalized coordinates.
    fn default() -> Self {
        Cal3S2::new(1.0, 1.0, 0.0, 0.0, 0.0)
    }
}

impl Display for Cal3S2 {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Cal3S2(fx: {:.4}, fy: {:.4}, s: {:.4}, u0: {:.4}, v0: {:.4})",
            self.fx, self.fy, self.s, self.u0, self.v0
        )
    }
}

impl Cal3S2 {
    pub fn new(fx: f64, fy: f64, s: f64, u0: f64, v0: f64) -> Self {
        Cal3S2 { fx, fy, s, u0, v0 }
    }

    /// Build from a field of view in radians and an image size, zero skew.
    pub fn from_fov(fov: f64, width: usize, height: usize) -> Self {
        let u0 = width as f64 / 2.0;
        let v0 = height as f64 / 2.0;
        let f = u0 / (fov / 2.0).tan();
        Cal3S2::new(f, f, 0.0, u0, v0)
    }

    /// Parameters as a vector in tangent order.
    pub fn vector(&self) -> DVector<f64> {
        DVector::from_column_slice(&[self.fx, self.fy, self.s, self.u0, self.v0])
    }

    /// The 3x3 calibration matrix K.
    pub fn matrix(&self) -> Matrix3<f64> {
        Matrix3::new(
            self.fx, self.s, self.u0, //
            0.0, self.fy, self.v0, //
            0.0, 0.0, 1.0,
        )
    }

    /// Map normalized image coordinates to pixels.
    ///
    /// # Notes
    /// ```text
    /// u = fx·x + s·y + u0
    /// v = fy·y + v0
    ///
    /// J_K = [ x  0  y  1  0 ]      J_p = [ fx  s ]
    ///       [ 0  y  0  0  1 ]            [ 0  fy ]
    /// ```
    pub fn uncalibrate(
        &self,
        point: &Point2,
        jacobian_calibration: Option<&mut CalibrationJacobian>,
        jacobian_point: Option<&mut Matrix2<f64>>,
    ) -> Point2 {
        let (x, y) = (point.x, point.y);

        if let Some(jac) = jacobian_calibration {
            *jac = CalibrationJacobian::new(
                x, 0.0, y, 1.0, 0.0, //
                0.0, y, 0.0, 0.0, 1.0,
            );
        }

        if let Some(jac) = jacobian_point {
            *jac = Matrix2::new(self.fx, self.s, 0.0, self.fy);
        }

        Point2::new(self.fx * x + self.s * y + self.u0, self.fy * y + self.v0)
    }

    /// Map pixels back to normalized image coordinates.
    pub fn calibrate(&self, pixel: &Point2) -> ManifoldResult<Point2> {
        if self.fx * self.fy == 0.0 {
            return Err(ManifoldError::DegenerateGeometry(format!(
                "calibration {} has a zero focal length",
                self
            ))
            .log());
        }
        let y = (pixel.y - self.v0) / self.fy;
        let x = (pixel.x - self.u0 - self.s * y) / self.fx;
        Ok(Point2::new(x, y))
    }
}

impl Manifold for Cal3S2 {
    const DOF: usize = 5;

    fn retract(&self, delta: &DVector<f64>) -> Self {
        Cal3S2::new(
            self.fx + delta[0],
            self.fy + delta[1],
            self.s + delta[2],
            self.u0 + delta[3],
            self.v0 + delta[4],
        )
    }

    fn local_coordinates(
        &self,
        other: &Self,
        jacobian_other: Option<&mut DMatrix<f64>>,
    ) -> DVector<f64> {
        if let Some(jac) = jacobian_other {
            jac.fill_with_identity();
        }
        other.vector() - self.vector()
    }
}
