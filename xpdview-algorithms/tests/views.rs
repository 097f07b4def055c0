#![allow(clippy::cast_precision_loss)]
use approx::assert_relative_eq;
use xpdview_algorithms::{
    OffsetMode, PeakAccumulator, PeakFinder, Waterfall, WaterfallSurface,
};
use xpdview_core::{IntegrationStore, Pattern};

fn gaussian_pattern(centers: &[f64], n: usize) -> Pattern {
    let x: Vec<f64> = (0..n).map(|i| i as f64 * 0.1).collect();
    let y = x
        .iter()
        .map(|&xv| {
            centers
                .iter()
                .map(|c| (-(xv - c).powi(2) / 0.02).exp())
                .sum::<f64>()
        })
        .collect();
    Pattern::new(x, y).unwrap()
}

#[test]
fn test_normalization_independent_per_curve() {
    let mut store = IntegrationStore::new();
    store
        .insert("small".into(), Pattern::new(vec![0.0, 1.0, 2.0], vec![1.0, 2.0, 3.0]).unwrap())
        .unwrap();
    store
        .insert("large".into(), Pattern::new(vec![0.0, 1.0, 2.0], vec![-50.0, 500.0, 1000.0]).unwrap())
        .unwrap();

    let mut waterfall = Waterfall::new(true, OffsetMode::Absolute);
    waterfall.normalize_data(store.keys(), &store);
    for curve in waterfall.curves() {
        let (min, max) = curve.y_range().unwrap();
        assert_relative_eq!(min, 0.0);
        assert_relative_eq!(max, 1.0);
    }
}

#[test]
fn test_waterfall_recomputes_on_new_keys() {
    let mut store = IntegrationStore::new();
    store
        .insert("a".into(), Pattern::new(vec![0.0, 1.0], vec![0.0, 2.0]).unwrap())
        .unwrap();
    let mut waterfall = Waterfall::default();
    waterfall.normalize_data(store.keys(), &store);
    assert_eq!(waterfall.len(), 1);

    store
        .insert("b".into(), Pattern::new(vec![0.0, 1.0], vec![4.0, 2.0]).unwrap())
        .unwrap();
    waterfall.normalize_data(store.keys(), &store);
    let curves = waterfall.generate_waterfall(0.0, 1.0);
    assert_eq!(curves.len(), 2);
    assert_eq!(curves[1].y, vec![2.0, 1.0]);

    waterfall.set_normalized(false);
    let raw = waterfall.generate_waterfall(0.0, 1.0);
    assert_eq!(raw[1].y, vec![5.0, 3.0]);
}

#[test]
fn test_peak_filter_returns_subset() {
    let pattern = gaussian_pattern(&[1.0, 2.5, 4.0], 60);
    let unfiltered = PeakFinder::new(5, 0, None).unwrap().get_peaks(&pattern);
    assert_eq!(unfiltered.len(), 3);

    let filtered = PeakFinder::new(5, 3, Some(0.5)).unwrap().get_peaks(&pattern);
    assert!(filtered.len() <= unfiltered.len());
    assert!(filtered.iter().all(|p| unfiltered.contains(p)));
}

#[test]
fn test_peak_positions_match_centers() {
    let pattern = gaussian_pattern(&[1.0, 4.0], 60);
    let peaks = PeakFinder::new(5, 0, None).unwrap().get_peaks(&pattern);
    assert_eq!(peaks.len(), 2);
    assert_relative_eq!(peaks[0], 1.0, epsilon = 1e-9);
    assert_relative_eq!(peaks[1], 4.0, epsilon = 1e-9);
}

#[test]
fn test_peak_accumulator_rescan_resets() {
    let mut store = IntegrationStore::new();
    store.insert("a".into(), gaussian_pattern(&[2.0], 40)).unwrap();
    let mut acc = PeakAccumulator::new(PeakFinder::new(3, 0, None).unwrap());
    acc.get_plot(store.keys(), &store);
    acc.get_plot(store.keys(), &store);
    assert_eq!(acc.points().len(), 1);
    assert_eq!(acc.points()[0].frame, 0);
}

#[test]
fn test_surface_matches_store() {
    let mut store = IntegrationStore::new();
    for i in 0..4_u8 {
        store
            .insert(format!("f{i}").into(), gaussian_pattern(&[f64::from(i)], 30))
            .unwrap();
    }
    let surface = WaterfallSurface::build(store.keys(), &store).unwrap();
    assert_eq!(surface.shape(), (30, 4));
    assert_relative_eq!(surface.y[[10, 3]], 3.0);
    assert_relative_eq!(surface.z[[10, 1]], store.get("f1").unwrap().y[10]);
}
