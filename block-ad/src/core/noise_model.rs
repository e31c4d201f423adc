//! Gaussian noise models
//!
//! A noise model is represented by its square-root information matrix `W` with
//! `WᵀW = Σ⁻¹`. Whitening a residual `r` gives `W r`, whose squared norm is the
//! Mahalanobis distance `rᵀ Σ⁻¹ r`.

use crate::core::{CoreError, CoreResult};
use nalgebra::{DMatrix, DVector};

/// Per-factor Gaussian noise model.
#[derive(Debug, Clone, PartialEq)]
pub enum NoiseModel {
    /// Identity covariance
    Unit { dim: usize },
    /// `Σ = σ² I`
    Isotropic { dim: usize, sigma: f64 },
    /// `Σ = diag(σ₁², …, σₙ²)`
    Diagonal { sigmas: DVector<f64> },
    /// Full square-root information matrix
    Gaussian { sqrt_information: DMatrix<f64> },
}

impl NoiseModel {
    pub fn unit(dim: usize) -> Self {
        NoiseModel::Unit { dim }
    }

    pub fn isotropic(dim: usize, sigma: f64) -> CoreResult<Self> {
        if !(sigma.is_finite() && sigma > 0.0) {
            return Err(
                CoreError::InvalidInput(format!("isotropic sigma must be positive, got {sigma}"))
                    .log(),
            );
        }
        Ok(NoiseModel::Isotropic { dim, sigma })
    }

    pub fn diagonal(sigmas: DVector<f64>) -> CoreResult<Self> {
        if let Some(bad) = sigmas.iter().find(|s| !(s.is_finite() && **s > 0.0)) {
            return Err(
                CoreError::InvalidInput(format!("diagonal sigmas must be positive, got {bad}"))
                    .log(),
            );
        }
        Ok(NoiseModel::Diagonal { sigmas })
    }

    /// Build from a symmetric positive-definite covariance `Σ = L Lᵀ`, with `W = L⁻¹`.
    pub fn from_covariance(covariance: DMatrix<f64>) -> CoreResult<Self> {
        let dim = Self::check_square(&covariance, "covariance")?;
        let lower = covariance
            .cholesky()
            .ok_or_else(|| {
                CoreError::InvalidInput("covariance is not positive definite".to_string()).log()
            })?
            .unpack();
        let sqrt_information = lower
            .solve_lower_triangular(&DMatrix::identity(dim, dim))
            .ok_or_else(|| {
                CoreError::InvalidInput("covariance factor is singular".to_string()).log()
            })?;
        Ok(NoiseModel::Gaussian { sqrt_information })
    }

    /// Build from an information matrix `Σ⁻¹ = L Lᵀ`, with `W = Lᵀ`.
    pub fn from_information(information: DMatrix<f64>) -> CoreResult<Self> {
        Self::check_square(&information, "information")?;
        let lower = information
            .cholesky()
            .ok_or_else(|| {
                CoreError::InvalidInput("information is not positive definite".to_string()).log()
            })?
            .unpack();
        Ok(NoiseModel::Gaussian {
            sqrt_information: lower.transpose(),
        })
    }

    pub fn from_sqrt_information(sqrt_information: DMatrix<f64>) -> CoreResult<Self> {
        Self::check_square(&sqrt_information, "square-root information")?;
        Ok(NoiseModel::Gaussian { sqrt_information })
    }

    fn check_square(matrix: &DMatrix<f64>, what: &str) -> CoreResult<usize> {
        if matrix.nrows() != matrix.ncols() {
            return Err(CoreError::DimensionMismatch {
                context: format!("{what} must be square"),
                expected: matrix.nrows(),
                actual: matrix.ncols(),
            }
            .log());
        }
        Ok(matrix.nrows())
    }

    /// Residual dimension this model applies to.
    pub fn dim(&self) -> usize {
        match self {
            NoiseModel::Unit { dim } | NoiseModel::Isotropic { dim, .. } => *dim,
            NoiseModel::Diagonal { sigmas } => sigmas.len(),
            NoiseModel::Gaussian { sqrt_information } => sqrt_information.nrows(),
        }
    }

    pub fn is_unit(&self) -> bool {
        matches!(self, NoiseModel::Unit { .. })
    }

    /// Dense square-root information matrix `W`.
    pub fn sqrt_information(&self) -> DMatrix<f64> {
        match self {
            NoiseModel::Unit { dim } => DMatrix::identity(*dim, *dim),
            NoiseModel::Isotropic { dim, sigma } => DMatrix::identity(*dim, *dim) / *sigma,
            NoiseModel::Diagonal { sigmas } => DMatrix::from_diagonal(&sigmas.map(|s| 1.0 / s)),
            NoiseModel::Gaussian { sqrt_information } => sqrt_information.clone(),
        }
    }

    /// `W r`
    pub fn whiten(&self, residual: &DVector<f64>) -> DVector<f64> {
        match self {
            NoiseModel::Unit { .. } => residual.clone(),
            NoiseModel::Isotropic { sigma, .. } => residual / *sigma,
            NoiseModel::Diagonal { sigmas } => residual.component_div(sigmas),
            NoiseModel::Gaussian { sqrt_information } => sqrt_information * residual,
        }
    }

    /// `W A`
    pub fn whiten_matrix(&self, matrix: &DMatrix<f64>) -> DMatrix<f64> {
        match self {
            NoiseModel::Unit { .. } => matrix.clone(),
            NoiseModel::Isotropic { sigma, .. } => matrix / *sigma,
            NoiseModel::Diagonal { sigmas } => {
                let mut whitened = matrix.clone();
                for (mut row, sigma) in whitened.row_iter_mut().zip(sigmas.iter()) {
                    row /= *sigma;
                }
                whitened
            }
            NoiseModel::Gaussian { sqrt_information } => sqrt_information * matrix,
        }
    }

    /// `rᵀ Σ⁻¹ r = ‖W r‖²`
    pub fn squared_mahalanobis_distance(&self, residual: &DVector<f64>) -> f64 {
        self.whiten(residual).norm_squared()
    }
}
