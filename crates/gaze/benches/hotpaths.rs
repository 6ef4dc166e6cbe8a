use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use visioncare_gaze::blink::BlinkDetector;
use visioncare_gaze::config::CalibrationConfig;
use visioncare_gaze::{
    CalibrationPoint, CalibrationStrategy, EmaSmoother, EyeFeatureExtractor, FaceDetector,
    GazeMapper, LandmarkFrame, Point2, SimulatedDetector,
};

fn simulated_frame() -> LandmarkFrame {
    let rt = tokio::runtime::Runtime::new().expect("runtime");
    let detector = SimulatedDetector::new();
    detector.handle().set_look_at(Point2::new(0.3, 0.7));
    rt.block_on(detector.detect())
        .expect("detect")
        .expect("face")
}

fn benchmark_frame_pipeline(c: &mut Criterion) {
    let frame = simulated_frame();
    let extractor = EyeFeatureExtractor::default();
    let mut blink = BlinkDetector::default();
    let mut smoother = EmaSmoother::default();

    c.bench_function("extract_eye_data", |b| {
        b.iter(|| extractor.extract_eye_data(black_box(&frame)))
    });

    c.bench_function("frame_to_smoothed_gaze", |b| {
        b.iter(|| {
            let eye = extractor.extract_eye_data(black_box(&frame)).expect("eyes");
            if let Some((left, right)) = extractor.eye_contours(&frame) {
                blink.update_blink(&left, &right);
            }
            smoother.smooth(eye.gaze.x, eye.gaze.y)
        })
    });
}

fn benchmark_mapping(c: &mut Criterion) {
    let mut group = c.benchmark_group("calibrate_gaze");
    for grid in [3usize, 5, 9] {
        let targets = CalibrationConfig {
            grid_rows: grid,
            grid_cols: grid,
            ..Default::default()
        }
        .targets();

        for strategy in [CalibrationStrategy::Idw, CalibrationStrategy::Affine] {
            let mut mapper = GazeMapper::new(strategy, 1e-4);
            mapper.set_points(targets.iter().map(|&t| CalibrationPoint {
                screen: t,
                raw: Point2::new(t.x - 0.5, t.y - 0.5),
            }));

            group.bench_with_input(
                BenchmarkId::new(strategy.as_str(), grid * grid),
                &mapper,
                |b, mapper| b.iter(|| mapper.calibrate_gaze(black_box(Point2::new(0.1, -0.2)))),
            );
        }
    }
    group.finish();
}

criterion_group!(benches, benchmark_frame_pipeline, benchmark_mapping);
criterion_main!(benches);
