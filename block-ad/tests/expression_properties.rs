//! Behavioral properties of expressions and expression factors.

use block_ad::{
    BetweenFactor, BlockAdError, Cal3S2, CoreError, Expression, ExpressionFactor, ManifoldError,
    NoiseModel, NonlinearFactor, NumericalDerivativeConfig, Point2, Point3, PriorFactor, SE3,
    Values,
    expression::{
        numerical::{check_jacobians, numerical_jacobians},
        primitives::{compose, project, transform_from, transform_to, uncalibrate},
    },
    symbol,
};
use nalgebra::DMatrix;

type TestResult = Result<(), Box<dyn std::error::Error>>;

fn scene() -> Result<Values, Box<dyn std::error::Error>> {
    let mut values = Values::new();
    values.insert(
        symbol(b'x', 1),
        SE3::from_translation_euler(0.2, 0.1, -1.5, -0.1, 0.3, 0.2),
    )?;
    values.insert(
        symbol(b'x', 2),
        SE3::from_translation_euler(-0.4, 0.2, -1.0, 0.2, -0.1, 0.5),
    )?;
    values.insert(symbol(b'l', 1), Point3::new(0.3, -0.2, 2.5))?;
    values.insert(symbol(b'K', 1), Cal3S2::new(400.0, 410.0, 0.0, 300.0, 200.0))?;
    Ok(values)
}

fn pixel_expression() -> Expression<Point2> {
    uncalibrate(
        &Expression::leaf(symbol(b'K', 1)),
        &project(&transform_to(
            &Expression::leaf(symbol(b'x', 1)),
            &Expression::leaf(symbol(b'l', 1)),
        )),
    )
}

#[test]
fn test_value_is_deterministic() -> TestResult {
    let values = scene()?;
    let expr = pixel_expression();
    let first = expr.value(&values)?;
    for _ in 0..10 {
        assert_eq!(expr.value(&values)?, first);
    }
    let (with_derivatives, _) = expr.derivatives(&values)?;
    assert_eq!(with_derivatives, first);
    Ok(())
}

#[test]
fn test_camera_chain_matches_finite_differences() -> TestResult {
    let values = scene()?;
    check_jacobians(&pixel_expression(), &values, &NumericalDerivativeConfig::default())?;
    Ok(())
}

#[test]
fn test_shared_pose_contributions_are_summed() -> TestResult {
    let values = scene()?;
    let pose = Expression::<SE3>::leaf(symbol(b'x', 1));
    let landmark = Expression::<Point3>::leaf(symbol(b'l', 1));

    // The pose appears twice: x ∘ (x⁻¹ p) = p, so the pose Jacobian must cancel.
    let roundtrip = transform_from(&pose, &transform_to(&pose, &landmark));
    let (value, jacobians) = roundtrip.derivatives(&values)?;
    assert!((value - values.at::<Point3>(symbol(b'l', 1))?).norm() < 1e-12);
    assert_eq!(jacobians.len(), 2);

    let pose_block = jacobians.get(symbol(b'x', 1)).ok_or("missing pose block")?;
    assert!(pose_block.amax() < 1e-12);
    let point_block = jacobians.get(symbol(b'l', 1)).ok_or("missing point block")?;
    assert!((point_block - DMatrix::identity(3, 3)).amax() < 1e-12);

    let numeric = numerical_jacobians(&roundtrip, &values, &NumericalDerivativeConfig::default())?;
    let numeric_pose = numeric.get(symbol(b'x', 1)).ok_or("missing numeric block")?;
    assert!(numeric_pose.amax() < 1e-8);
    Ok(())
}

#[test]
fn test_shared_subexpression_in_composition() -> TestResult {
    let values = scene()?;
    let x1 = Expression::<SE3>::leaf(symbol(b'x', 1));
    let x2 = Expression::<SE3>::leaf(symbol(b'x', 2));
    let shared = compose(&x1, &x2);
    let twice = compose(&shared, &shared);
    assert_eq!(twice.keys(), vec![symbol(b'x', 1), symbol(b'x', 2)]);
    check_jacobians(&twice, &values, &NumericalDerivativeConfig::default())?;
    Ok(())
}

#[test]
fn test_missing_variable() -> TestResult {
    let full = scene()?;
    let mut values = Values::new();
    for key in full.keys() {
        if key != symbol(b'l', 1) {
            values.insert_value(key, full.get(key)?.clone())?;
        }
    }

    let result = pixel_expression().derivatives(&values);
    assert_eq!(
        result.err(),
        Some(BlockAdError::Core(CoreError::MissingVariable {
            key: symbol(b'l', 1)
        }))
    );
    Ok(())
}

#[test]
fn test_type_mismatch() -> TestResult {
    let mut values = scene()?;
    values.update_value(symbol(b'l', 1), block_ad::Value::Point2(Point2::new(1.0, 1.0)))?;

    match pixel_expression().value(&values) {
        Err(BlockAdError::Core(CoreError::TypeMismatch {
            key,
            expected,
            actual,
        })) => {
            assert_eq!(key, symbol(b'l', 1));
            assert_eq!(expected, "Point3");
            assert_eq!(actual, "Point2");
        }
        other => return Err(format!("expected TypeMismatch, got {other:?}").into()),
    }
    Ok(())
}

#[test]
fn test_degenerate_depth() -> TestResult {
    let mut values = scene()?;
    // Put the landmark exactly at the camera center.
    let pose = values.at::<SE3>(symbol(b'x', 1))?.clone();
    values.update(symbol(b'l', 1), pose.translation())?;

    let factor = ExpressionFactor::new(Point2::zeros(), pixel_expression(), NoiseModel::unit(2))?;
    assert!(matches!(
        factor.linearize(&values),
        Err(BlockAdError::Manifold(ManifoldError::DegenerateGeometry(_)))
    ));
    assert!(factor.error(&values).is_err());
    Ok(())
}

#[test]
fn test_dim_is_measurement_dimension() -> TestResult {
    let factor = ExpressionFactor::new(Point2::zeros(), pixel_expression(), NoiseModel::unit(2))?;
    assert_eq!(factor.dim(), 2);
    assert_eq!(factor.dim(), factor.expression().dim());

    let prior = PriorFactor::new(symbol(b'x', 1), SE3::identity(), NoiseModel::unit(6))?;
    assert_eq!(prior.dim(), 6);
    Ok(())
}

#[test]
fn test_factors_linearize_in_parallel() -> TestResult {
    let values = scene()?;
    let camera = ExpressionFactor::new(
        Point2::new(330.0, 180.0),
        pixel_expression(),
        NoiseModel::unit(2),
    )?;
    let odometry = BetweenFactor::new(
        symbol(b'x', 1),
        symbol(b'x', 2),
        SE3::from_translation_euler(-0.5, 0.1, 0.4, 0.3, -0.4, 0.3),
        NoiseModel::diagonal(nalgebra::dvector![0.1, 0.1, 0.1, 0.05, 0.05, 0.05])?,
    )?;
    let factors: Vec<&dyn NonlinearFactor> = vec![&camera, &odometry];

    let sequential = factors
        .iter()
        .map(|factor| factor.linearize(&values))
        .collect::<Result<Vec<_>, _>>()?;

    let shared = &values;
    let parallel = std::thread::scope(|scope| {
        let handles: Vec<_> = factors
            .iter()
            .map(|&factor| scope.spawn(move || factor.linearize(shared)))
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().map_err(|_| "linearization thread panicked"))
            .collect::<Result<Vec<_>, _>>()
    })?;

    for (expected, actual) in sequential.iter().zip(parallel) {
        assert_eq!(expected, &actual?);
    }
    Ok(())
}
