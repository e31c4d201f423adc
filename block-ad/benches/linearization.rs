//! Linearization cost of the expression camera model against the hand-coded projection factor.
//!
//! Both factors observe the same landmarks from the same pose, so every iteration produces
//! identical Jacobian factors. The difference measures the overhead of walking the expression
//! tree (shared nodes, dynamic Jacobian blocks, map accumulation) over a fused implementation.
//!
//! Run with:
//! ```bash
//! cargo bench --bench linearization
//! ```

use block_ad::{
    Cal3S2, Expression, ExpressionFactor, JacobianFactor, NoiseModel, NonlinearFactor, Point2,
    Point3, ProjectionFactor, SE3, Values,
    expression::primitives::{project, transform_to, uncalibrate},
    symbol,
};
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;

const LANDMARK_COUNTS: [u64; 3] = [1, 64, 512];

struct Scene {
    values: Values,
    expression_factors: Vec<ExpressionFactor<Point2>>,
    projection_factors: Vec<ProjectionFactor>,
}

fn build_scene(landmarks: u64) -> Result<Scene, Box<dyn std::error::Error>> {
    let pose = symbol(b'x', 0);
    let calibration = symbol(b'K', 0);

    let mut values = Values::new();
    values.insert(
        pose,
        SE3::from_translation_euler(0.1, -0.2, -1.0, 0.02, -0.05, 0.1),
    )?;
    values.insert(calibration, Cal3S2::new(520.0, 515.0, 0.0, 320.0, 240.0))?;

    let mut expression_factors = Vec::new();
    let mut projection_factors = Vec::new();
    for j in 0..landmarks {
        let landmark = symbol(b'l', j);
        let offset = j as f64 / landmarks as f64 - 0.5;
        values.insert(landmark, Point3::new(offset, -0.5 * offset, 3.0 + offset))?;

        let measured = Point2::new(320.0 + 10.0 * offset, 240.0 - 5.0 * offset);
        let pixel = uncalibrate(
            &Expression::leaf(calibration),
            &project(&transform_to(
                &Expression::leaf(pose),
                &Expression::leaf(landmark),
            )),
        );
        expression_factors.push(ExpressionFactor::new(measured, pixel, NoiseModel::unit(2))?);
        projection_factors.push(ProjectionFactor::new(
            pose,
            landmark,
            calibration,
            measured,
            NoiseModel::unit(2),
        )?);
    }

    Ok(Scene {
        values,
        expression_factors,
        projection_factors,
    })
}

fn linearize_all<F: NonlinearFactor>(factors: &[F], values: &Values) -> Vec<JacobianFactor> {
    factors
        .iter()
        .filter_map(|factor| factor.linearize(values).ok())
        .collect()
}

fn bench_camera_linearization(c: &mut Criterion) {
    let mut group = c.benchmark_group("camera_linearization");

    for landmarks in LANDMARK_COUNTS {
        let scene = match build_scene(landmarks) {
            Ok(scene) => scene,
            Err(e) => panic!("failed to build benchmark scene: {e}"),
        };

        group.bench_with_input(
            BenchmarkId::new("expression", landmarks),
            &scene,
            |b, scene| {
                b.iter(|| {
                    black_box(linearize_all(
                        black_box(&scene.expression_factors),
                        &scene.values,
                    ))
                })
            },
        );

        group.bench_with_input(
            BenchmarkId::new("hand_coded", landmarks),
            &scene,
            |b, scene| {
                b.iter(|| {
                    black_box(linearize_all(
                        black_box(&scene.projection_factors),
                        &scene.values,
                    ))
                })
            },
        );
    }

    group.finish();
}

fn bench_sparse_assembly(c: &mut Criterion) {
    let scene = match build_scene(512) {
        Ok(scene) => scene,
        Err(e) => panic!("failed to build benchmark scene: {e}"),
    };
    let linear = linearize_all(&scene.expression_factors, &scene.values);
    let ordering = scene.values.keys();

    c.bench_function("assemble_512_camera_factors", |b| {
        b.iter(|| black_box(JacobianFactor::assemble(black_box(&linear), &ordering)))
    });
}

criterion_group!(benches, bench_camera_linearization, bench_sparse_assembly);
criterion_main!(benches);
