#![allow(clippy::uninlined_format_args, clippy::cast_precision_loss)]
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use approx::assert_relative_eq;
use ndarray::{Array2, ArrayView2};
use xpdview_algorithms::{ReducedSeries, ReductionEngine};
use xpdview_core::{
    DetectorBounds, Error, ExposureKey, Image, Reducer, Result, Roi, StatisticRegistry,
};

fn ones_stack(n: usize) -> Vec<(ExposureKey, Image)> {
    (0..n)
        .map(|i| (ExposureKey::new(format!("frame_{i:03}")), Array2::ones((10, 10))))
        .collect()
}

fn ramp_stack(n: usize) -> Vec<(ExposureKey, Image)> {
    (0..n)
        .map(|i| {
            (
                ExposureKey::new(format!("frame_{i:03}")),
                Array2::from_elem((8, 8), i as f64),
            )
        })
        .collect()
}

fn refs(stack: &[(ExposureKey, Image)]) -> impl Iterator<Item = (&ExposureKey, &Image)> {
    stack.iter().map(|(k, v)| (k, v))
}

struct CountingReducer {
    calls: Arc<AtomicUsize>,
}

impl Reducer for CountingReducer {
    fn reduce(&self, region: ArrayView2<'_, f64>) -> Result<f64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(region.sum())
    }
}

struct FailingReducer;

impl Reducer for FailingReducer {
    fn reduce(&self, region: ArrayView2<'_, f64>) -> Result<f64> {
        if region.iter().any(|&v| v > 5.0) {
            return Err(Error::Reducer {
                name: "fail_high".into(),
                message: "value above 5".into(),
            });
        }
        Ok(0.0)
    }
}

#[test]
fn test_all_ones_stack() {
    let stack = ones_stack(5);
    let registry = StatisticRegistry::new();
    let engine = ReductionEngine::new(4);
    let roi = Roi::new(0, 10, 0, 10);

    let sum = engine.reduce(refs(&stack), &roi, "sum", &registry).unwrap();
    assert_eq!(sum, vec![100.0; 5]);

    let min = engine.reduce(refs(&stack), &roi, "min", &registry).unwrap();
    let max = engine.reduce(refs(&stack), &roi, "max", &registry).unwrap();
    assert_eq!(min, vec![1.0; 5]);
    assert_eq!(max, vec![1.0; 5]);

    let std = engine.reduce(refs(&stack), &roi, "std", &registry).unwrap();
    for v in std {
        assert_relative_eq!(v, 0.0);
    }
}

#[test]
fn test_order_preserved_for_any_worker_count() {
    let stack = ramp_stack(11);
    let registry = StatisticRegistry::new();
    let roi = Roi::new(0, 4, 0, 4);
    let expected: Vec<f64> = (0..11).map(|i| i as f64).collect();

    for workers in [1, 2, 3, 4, 7, 11, 32] {
        let engine = ReductionEngine::new(workers);
        let values = engine.reduce(refs(&stack), &roi, "mean", &registry).unwrap();
        assert_eq!(values, expected, "workers = {}", workers);
    }
}

#[test]
fn test_invalid_roi_fails_before_work() {
    let stack = ones_stack(3);
    let calls = Arc::new(AtomicUsize::new(0));
    let mut registry = StatisticRegistry::new();
    registry
        .insert(
            "counting",
            Arc::new(CountingReducer {
                calls: Arc::clone(&calls),
            }),
        )
        .unwrap();
    let engine = ReductionEngine::new(2);

    let reversed = Roi::new(5, 5, 0, 10);
    let err = engine.reduce(refs(&stack), &reversed, "counting", &registry).unwrap_err();
    assert!(matches!(err, Error::InvalidRoi(_)));

    let too_tall = Roi::new(0, 10, 0, 4096);
    let err = engine.reduce(refs(&stack), &too_tall, "counting", &registry).unwrap_err();
    assert!(matches!(err, Error::InvalidRoi(_)));

    // inside the detector, outside the 10x10 images
    let outside = Roi::new(0, 20, 0, 10);
    let err = engine.reduce(refs(&stack), &outside, "counting", &registry).unwrap_err();
    assert!(matches!(err, Error::RoiOutOfImage { rows: 10, cols: 10, .. }));

    assert_eq!(calls.load(Ordering::SeqCst), 0);

    engine
        .reduce(refs(&stack), &Roi::new(0, 10, 0, 10), "counting", &registry)
        .unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[test]
fn test_unknown_statistic_checked_first() {
    let stack = ones_stack(2);
    let engine = ReductionEngine::new(2);
    let err = engine
        .reduce(refs(&stack), &Roi::new(5, 1, 0, 1), "median", &StatisticRegistry::new())
        .unwrap_err();
    assert!(matches!(err, Error::UnknownStatistic(name) if name == "median"));
}

#[test]
fn test_custom_bounds() {
    let stack = ones_stack(1);
    let engine = ReductionEngine::new(1).with_bounds(DetectorBounds::new(8, 8));
    let err = engine
        .reduce(refs(&stack), &Roi::new(0, 10, 0, 10), "sum", &StatisticRegistry::new())
        .unwrap_err();
    assert!(matches!(err, Error::InvalidRoi(_)));
}

#[test]
fn test_reducer_error_propagates() {
    let stack = ramp_stack(8);
    let mut registry = StatisticRegistry::new();
    registry.insert("fail_high", Arc::new(FailingReducer)).unwrap();
    let engine = ReductionEngine::new(3);
    let err = engine
        .reduce(refs(&stack), &Roi::new(0, 2, 0, 2), "fail_high", &registry)
        .unwrap_err();
    assert!(matches!(err, Error::Reducer { .. }));
}

#[test]
fn test_function_pointer_reducer() {
    fn corner(region: ArrayView2<'_, f64>) -> f64 {
        region[[0, 0]]
    }
    let stack = ramp_stack(4);
    let mut registry = StatisticRegistry::new();
    registry.add_fn("corner", corner).unwrap();
    let values = ReductionEngine::new(2)
        .reduce(refs(&stack), &Roi::new(1, 3, 1, 3), "corner", &registry)
        .unwrap();
    assert_eq!(values, vec![0.0, 1.0, 2.0, 3.0]);
}

#[test]
fn test_incremental_reduction_extends_series() {
    let stack = ramp_stack(6);
    let registry = StatisticRegistry::new();
    let engine = ReductionEngine::new(2);
    let roi = Roi::new(0, 2, 0, 2);

    let mut series = ReducedSeries::new("sum", roi);
    series.extend(engine.reduce(refs(&stack[..4]), &roi, "sum", &registry).unwrap());

    let nothing = engine
        .reduce_with_new_data(refs(&stack[4..4]), &roi, "sum", &registry)
        .unwrap();
    assert!(nothing.is_empty());
    series.extend(nothing);
    assert_eq!(series.len(), 4);

    series.extend(
        engine
            .reduce_with_new_data(refs(&stack[4..]), &roi, "sum", &registry)
            .unwrap(),
    );
    let full = engine.reduce(refs(&stack), &roi, "sum", &registry).unwrap();
    assert_eq!(series.values, full);
}

#[test]
fn test_empty_stack_is_valid() {
    let engine = ReductionEngine::new(4);
    let values = engine
        .reduce(
            std::iter::empty::<(&ExposureKey, &Image)>(),
            &Roi::new(0, 1, 0, 1),
            "sum",
            &StatisticRegistry::new(),
        )
        .unwrap();
    assert!(values.is_empty());
}
