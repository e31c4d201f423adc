//! # block-ad
//!
//! Expression-based automatic differentiation for nonlinear least-squares factors.
//!
//! Measurement models are written as typed expression trees over keyed variables. Each tree
//! evaluates to a manifold value and, through the chain rule, to the exact Jacobian of that
//! value with respect to every variable it reads. Factors turn a measurement and its
//! expression into a whitened residual and a sparse [`JacobianFactor`] for an outer
//! Gauss-Newton or Levenberg-Marquardt solver.
//!
//! ## Features
//!
//! - **Manifold values**: SO(3), SE(3), 2-D and 3-D points, 5-parameter pinhole calibration
//! - **Geometric primitives**: rigid transforms, perspective projection, uncalibration,
//!   vector and group arithmetic, plus user primitives via closures
//! - **Factors**: generic expression factor, hand-coded projection reference, prior, between
//! - **Gaussian noise models** applied by whitening at linearization time
//! - **Sparse assembly** of many linear factors into a `faer` matrix
//!
//! ## Example
//!
//! ```rust,ignore
//! use block_ad::{Expression, ExpressionFactor, NoiseModel, NonlinearFactor, Values};
//! use block_ad::expression::primitives::{project, transform_to, uncalibrate};
//!
//! let mut values = Values::new();
//! values.insert(1u64, SE3::identity())?;
//! values.insert(2u64, Point3::new(0.0, 0.0, 1.0))?;
//! values.insert(3u64, Cal3S2::default())?;
//!
//! let pixel = uncalibrate(
//!     &Expression::leaf(3u64),
//!     &project(&transform_to(&Expression::leaf(1u64), &Expression::leaf(2u64))),
//! );
//! let factor = ExpressionFactor::new(Point2::new(0.0, 1.0), pixel, NoiseModel::unit(2))?;
//! let linear = factor.linearize(&values)?;
//! ```

pub mod core;
pub mod error;
pub mod expression;
pub mod factors;
#[cfg(feature = "logging")]
pub mod logger;
pub mod manifold;

pub use crate::core::{
    CoreError, CoreResult,
    jacobian_factor::JacobianFactor,
    noise_model::NoiseModel,
    values::{Key, Symbol, Value, ValueType, Values, symbol},
};
pub use error::{BlockAdError, BlockAdResult};
pub use expression::{Expression, JacobianMap, numerical::NumericalDerivativeConfig};
pub use factors::{
    BetweenFactor, ExpressionFactor, NonlinearFactor, PriorFactor, ProjectionFactor,
};
#[cfg(feature = "logging")]
pub use logger::{init_logger, init_logger_with_level};
pub use manifold::{
    LieGroup, Manifold, ManifoldError, Point2, Point3, VectorSpace, cal3_s2::Cal3S2, se3::SE3,
    so3::SO3,
};
