//! Viewer session: the watched directory, the exposure stores and every
//! derived view kept in step with them.
//!
//! A session starts with a synthetic placeholder image. Setting a
//! directory performs the bulk load; each later [`Session::refresh`] loads
//! only what arrived since, extends the reduced plots and peak list, and
//! recomputes the waterfall and surface.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rayon::prelude::*;
use xpdview_algorithms::{
    PeakAccumulator, PeakFinder, PeakPoint, ReducedSeries, ReductionEngine, Waterfall,
    WaterfallCurve, WaterfallSurface,
};
use xpdview_core::{
    placeholder_image, AzimuthalIntegrator, ExposureKey, Image, ImageStore, IntegrationParameters,
    IntegrationStore, Pattern, ReduceFn, Reducer, Roi, StatisticRegistry, PLACEHOLDER_KEY,
};

use crate::config::SessionConfig;
use crate::image::load_image;
use crate::layout::{AxisUnits, PairingRule};
use crate::pattern::load_pattern;
use crate::watcher::FileWatcher;
use crate::{Error, Result};

/// Side length of the placeholder image.
const PLACEHOLDER_SIZE: usize = 100;

/// Identifier of a reduced-representation plot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlotId(usize);

impl fmt::Display for PlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "plot#{}", self.0)
    }
}

/// A reduced-representation plot owned by the session.
#[derive(Debug, Clone)]
pub struct ReductionPlot {
    /// Plot identifier.
    pub id: PlotId,
    /// One value per loaded exposure.
    pub series: ReducedSeries,
}

/// What a load or refresh brought in.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RefreshReport {
    /// Keys of newly loaded images, oldest first.
    pub new_images: Vec<ExposureKey>,
    /// Keys of newly loaded or integrated patterns.
    pub new_patterns: Vec<ExposureKey>,
    /// Peaks found in the new patterns.
    pub new_peaks: usize,
    /// New image files that could not be loaded; the next refresh retries them.
    pub skipped: Vec<PathBuf>,
}

impl RefreshReport {
    /// Returns true if nothing new was found.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.new_images.is_empty() && self.new_patterns.is_empty()
    }
}

/// One frame of the stack as shown in the viewer.
#[derive(Debug, Clone)]
pub struct Frame<'a> {
    /// Arrival index.
    pub index: usize,
    /// Exposure key.
    pub key: &'a ExposureKey,
    /// Detector image.
    pub image: &'a Image,
    /// Integrated pattern, empty if not available yet.
    pub pattern: Pattern,
}

/// Images of `store` that are real exposures.
fn exposures(store: &ImageStore) -> impl Iterator<Item = (&ExposureKey, &Image)> {
    let skip_placeholder = store.has_placeholder();
    store
        .iter()
        .filter(move |(key, _)| !(skip_placeholder && key.as_str() == PLACEHOLDER_KEY))
}

fn load_one(path: &Path) -> Result<(ExposureKey, Image)> {
    let key = ExposureKey::from_path(path)
        .ok_or_else(|| Error::InvalidFormat(format!("no file stem in {}", path.display())))?;
    Ok((key, load_image(path)?))
}

fn load_images(paths: &[PathBuf]) -> Result<Vec<(ExposureKey, Image)>> {
    paths.par_iter().map(|path| load_one(path)).collect()
}

fn placeholder_store() -> ImageStore {
    ImageStore::with_placeholder(
        PLACEHOLDER_KEY.into(),
        placeholder_image(PLACEHOLDER_SIZE, PLACEHOLDER_SIZE, 1.0),
    )
}

/// Live viewing session over one data directory.
pub struct Session {
    config: SessionConfig,
    rule: PairingRule,
    directory: Option<PathBuf>,
    watcher: Option<FileWatcher>,
    images: ImageStore,
    patterns: IntegrationStore,
    pending: Vec<ExposureKey>,
    units: Option<AxisUnits>,
    registry: StatisticRegistry,
    engine: ReductionEngine,
    reductions: Vec<ReductionPlot>,
    next_plot: usize,
    waterfall: Waterfall,
    surface: Option<WaterfallSurface>,
    peaks: PeakAccumulator,
    integration: IntegrationParameters,
    integrator: Option<Box<dyn AzimuthalIntegrator>>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("directory", &self.directory)
            .field("images", &self.images.len())
            .field("patterns", &self.patterns.len())
            .field("pending", &self.pending.len())
            .field("reductions", &self.reductions.len())
            .field("integrator", &self.integrator.as_ref().map(|i| i.name()))
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Creates a session showing the placeholder image.
    ///
    /// # Errors
    /// Returns an error if the configured peak parameters are invalid.
    pub fn new(config: SessionConfig) -> Result<Self> {
        let peaks = PeakAccumulator::new(config.peak_finder()?);
        Ok(Self {
            rule: config.pairing_rule(),
            engine: config.engine(),
            waterfall: Waterfall::new(config.normalized, config.offset_mode),
            integration: config.integration,
            config,
            directory: None,
            watcher: None,
            images: placeholder_store(),
            patterns: IntegrationStore::new(),
            pending: Vec::new(),
            units: None,
            registry: StatisticRegistry::new(),
            reductions: Vec::new(),
            next_plot: 0,
            surface: None,
            peaks,
            integrator: None,
        })
    }

    /// Points the session at `directory` and loads everything in it.
    ///
    /// Previously loaded data is discarded; reduced plots are kept and
    /// recomputed over the new stack.
    ///
    /// # Errors
    /// Returns [`Error::NotADirectory`], a loading error, or the first
    /// reduction error; these leave the session unchanged. An integrator
    /// error is returned after the images are in place.
    pub fn set_directory<P: AsRef<Path>>(&mut self, directory: P) -> Result<RefreshReport> {
        let directory = directory.as_ref();
        let mut watcher = FileWatcher::new(directory, self.rule.image_filter())?;
        let loaded = load_images(&watcher.poll_new()?)?;

        let mut images = placeholder_store();
        if !loaded.is_empty() {
            images.remove_placeholder();
        }
        images.extend(loaded)?;

        let recomputed = self
            .reductions
            .iter()
            .map(|plot| {
                self.engine.reduce(
                    exposures(&images),
                    &plot.series.roi,
                    &plot.series.label,
                    &self.registry,
                )
            })
            .collect::<xpdview_core::Result<Vec<_>>>()?;

        self.directory = Some(directory.to_path_buf());
        self.watcher = Some(watcher);
        self.images = images;
        self.patterns = IntegrationStore::new();
        self.pending.clear();
        self.units = None;
        for (plot, values) in self.reductions.iter_mut().zip(recomputed) {
            plot.series.values = values;
        }

        let new_images: Vec<ExposureKey> = exposures(&self.images).map(|(k, _)| k.clone()).collect();
        let (new_patterns, failure) = self.collect_patterns(new_images.clone());
        self.peaks.get_plot(self.patterns.keys(), &self.patterns);
        self.rebuild_waterfall();
        if let Some(e) = failure {
            return Err(e);
        }

        if new_images.is_empty() {
            log::info!(
                "no .{} files in {}",
                self.rule.image_ext,
                directory.display()
            );
        } else {
            log::info!(
                "loaded {} images and {} patterns from {}",
                new_images.len(),
                new_patterns.len(),
                directory.display()
            );
        }
        if !self.pending.is_empty() {
            log::warn!(
                "{} images have no .{} file yet",
                self.pending.len(),
                self.rule.pattern_ext
            );
        }

        Ok(RefreshReport {
            new_images,
            new_patterns,
            new_peaks: self.peaks.points().len(),
            skipped: Vec::new(),
        })
    }

    /// Loads whatever arrived since the last load or refresh.
    ///
    /// Pattern files for earlier images that were missing before are
    /// picked up too. An image that cannot be read, or that does not fit
    /// the ROI of an active plot, is left out and listed in
    /// [`RefreshReport::skipped`]; the next refresh retries it.
    ///
    /// # Errors
    /// Returns [`Error::DirectoryNotSet`] before [`Self::set_directory`],
    /// a reducer error (the whole batch is then polled again), or an
    /// integrator error once the patterns integrated before it are in
    /// every derived view.
    pub fn refresh(&mut self) -> Result<RefreshReport> {
        let watcher = self.watcher.as_mut().ok_or(Error::DirectoryNotSet)?;
        let paths = watcher.poll_new()?;

        let results: Vec<Result<(ExposureKey, Image)>> =
            paths.par_iter().map(|path| load_one(path)).collect();
        let mut loaded = Vec::with_capacity(paths.len());
        let mut kept_paths = Vec::with_capacity(paths.len());
        let mut skipped = Vec::new();
        for (path, result) in paths.into_iter().zip(results) {
            let checked = result.and_then(|(key, image)| {
                for plot in &self.reductions {
                    plot.series.roi.check_fits(&image, key.as_str())?;
                }
                Ok((key, image))
            });
            match checked {
                Ok(entry) => {
                    loaded.push(entry);
                    kept_paths.push(path);
                }
                Err(e) => {
                    log::warn!("skipping {}: {e}", path.display());
                    skipped.push(path);
                }
            }
        }
        if let Some(watcher) = self.watcher.as_mut() {
            watcher.forget(&skipped);
        }

        let values = self
            .reductions
            .iter()
            .map(|plot| {
                self.engine.reduce_with_new_data(
                    loaded.iter().map(|(k, v)| (k, v)),
                    &plot.series.roi,
                    &plot.series.label,
                    &self.registry,
                )
            })
            .collect::<xpdview_core::Result<Vec<_>>>();
        let values = match values {
            Ok(values) => values,
            Err(e) => {
                if let Some(watcher) = self.watcher.as_mut() {
                    watcher.forget(&kept_paths);
                }
                return Err(e.into());
            }
        };

        let new_images: Vec<ExposureKey> = loaded.iter().map(|(k, _)| k.clone()).collect();
        if !loaded.is_empty() && self.images.remove_placeholder() {
            log::debug!("first exposure arrived, dropping the placeholder");
        }
        self.images.extend(loaded)?;
        for (plot, values) in self.reductions.iter_mut().zip(values) {
            plot.series.extend(values);
        }

        let mut candidates = std::mem::take(&mut self.pending);
        candidates.extend(new_images.iter().cloned());
        let (new_patterns, failure) = self.collect_patterns(candidates);

        let mut new_peaks = 0;
        if !new_patterns.is_empty() {
            let start = self.patterns.len() - new_patterns.len();
            new_peaks = self.peaks.update_the_plot(self.patterns.iter_from(start));
            self.rebuild_waterfall();
        }
        if let Some(e) = failure {
            return Err(e);
        }

        let report = RefreshReport {
            new_images,
            new_patterns,
            new_peaks,
            skipped,
        };
        if report.is_empty() {
            log::info!("no new files found");
        } else {
            log::info!(
                "refresh: {} new images, {} new patterns, {} new peaks",
                report.new_images.len(),
                report.new_patterns.len(),
                report.new_peaks
            );
        }
        Ok(report)
    }

    /// Loads or integrates the pattern of each key; keys with neither stay pending.
    ///
    /// Returns the keys whose pattern was added, in insertion order, and
    /// the integrator error that stopped the pass, if any. The failed key
    /// and every key after it are left pending.
    fn collect_patterns(&mut self, keys: Vec<ExposureKey>) -> (Vec<ExposureKey>, Option<Error>) {
        let mut added = Vec::new();
        let Some(directory) = self.directory.clone() else {
            self.pending.extend(keys);
            return (added, Some(Error::DirectoryNotSet));
        };
        let mut keys = keys.into_iter();
        while let Some(key) = keys.next() {
            if self.patterns.contains(key.as_str()) {
                continue;
            }
            if let Some(path) = self.rule.resolve_pattern(&directory, &key) {
                match load_pattern(&path) {
                    Ok(pattern) => {
                        if self.units.is_none() {
                            self.units = Some(self.rule.units_for(&path));
                        }
                        if let Err(e) = self.patterns.insert(key.clone(), pattern) {
                            self.pending.push(key);
                            self.pending.extend(keys);
                            return (added, Some(e.into()));
                        }
                        added.push(key);
                    }
                    Err(e) => {
                        log::warn!("cannot read {} yet: {e}", path.display());
                        self.pending.push(key);
                    }
                }
            } else if let (Some(integrator), Some(image)) =
                (&self.integrator, self.images.get(key.as_str()))
            {
                match integrator.integrate(image, &self.integration) {
                    Ok(pattern) => {
                        if let Err(e) = self.patterns.insert(key.clone(), pattern) {
                            self.pending.push(key);
                            self.pending.extend(keys);
                            return (added, Some(e.into()));
                        }
                        added.push(key);
                    }
                    Err(e) => {
                        log::warn!("{} failed on '{key}': {e}", integrator.name());
                        self.pending.push(key);
                        self.pending.extend(keys);
                        return (added, Some(e.into()));
                    }
                }
            } else {
                log::debug!("no pattern for '{key}' yet");
                self.pending.push(key);
            }
        }
        (added, None)
    }

    fn rebuild_waterfall(&mut self) {
        self.waterfall.normalize_data(self.patterns.keys(), &self.patterns);
        self.surface = if self.patterns.is_empty() {
            None
        } else {
            match WaterfallSurface::build(self.patterns.keys(), &self.patterns) {
                Ok(surface) => Some(surface),
                Err(e) => {
                    log::warn!("waterfall surface unavailable: {e}");
                    None
                }
            }
        };
    }

    /// Adds a reduced-representation plot computed over every loaded image.
    ///
    /// # Errors
    /// Returns an error if the statistic is unknown, the ROI is invalid or
    /// does not fit an image, or the reducer fails. Nothing is added then.
    pub fn add_reduction(&mut self, roi: Roi, statistic: &str) -> Result<PlotId> {
        let values = self
            .engine
            .reduce(exposures(&self.images), &roi, statistic, &self.registry)?;
        let id = PlotId(self.next_plot);
        self.next_plot += 1;
        let mut series = ReducedSeries::new(statistic, roi);
        series.extend(values);
        log::debug!("{id}: '{statistic}' over {roi}");
        self.reductions.push(ReductionPlot { id, series });
        Ok(id)
    }

    /// Removes a plot and returns its series.
    pub fn remove_reduction(&mut self, id: PlotId) -> Option<ReducedSeries> {
        let index = self.reductions.iter().position(|plot| plot.id == id)?;
        Some(self.reductions.remove(index).series)
    }

    /// Every plot, in creation order.
    #[must_use]
    pub fn reductions(&self) -> &[ReductionPlot] {
        &self.reductions
    }

    /// Series of plot `id`.
    #[must_use]
    pub fn reduction(&self, id: PlotId) -> Option<&ReducedSeries> {
        self.reductions
            .iter()
            .find(|plot| plot.id == id)
            .map(|plot| &plot.series)
    }

    /// Frame at arrival position `index`, or `None` past the end.
    #[must_use]
    pub fn frame(&self, index: usize) -> Option<Frame<'_>> {
        let (key, image) = self.images.get_index(index)?;
        Some(Frame {
            index,
            key,
            image,
            pattern: self.patterns.give_plot(key.as_str()),
        })
    }

    fn check_unused(&self, name: &str) -> Result<()> {
        match self.reductions.iter().find(|plot| plot.series.label == name) {
            Some(plot) => Err(Error::Core(xpdview_core::Error::Config(format!(
                "statistic '{name}' is used by {}",
                plot.id
            )))),
            None => Ok(()),
        }
    }

    /// Registers a statistic.
    ///
    /// # Errors
    /// Fails under the reject policy if the name exists.
    pub fn add_statistic(&mut self, name: &str, reducer: Arc<dyn Reducer>) -> Result<()> {
        self.registry.insert(name, reducer)?;
        Ok(())
    }

    /// Registers a plain function as a statistic.
    ///
    /// # Errors
    /// Fails under the reject policy if the name exists.
    pub fn add_statistic_fn(&mut self, name: &str, func: ReduceFn) -> Result<()> {
        self.registry.add_fn(name, func)?;
        Ok(())
    }

    /// Unregisters a statistic.
    ///
    /// # Errors
    /// Fails if the name is unknown or a plot still uses it.
    pub fn remove_statistic(&mut self, name: &str) -> Result<()> {
        self.check_unused(name)?;
        self.registry.remove(name)?;
        Ok(())
    }

    /// Replaces every registered statistic.
    ///
    /// # Errors
    /// Fails, leaving the registry unchanged, if a statistic used by a plot
    /// is missing from `reducers` or a name repeats under the reject policy.
    pub fn set_statistics<I>(&mut self, reducers: I) -> Result<()>
    where
        I: IntoIterator<Item = (String, Arc<dyn Reducer>)>,
    {
        let mut registry = StatisticRegistry::empty(self.registry.policy());
        registry.set(reducers)?;
        if let Some(plot) = self
            .reductions
            .iter()
            .find(|plot| !registry.contains(&plot.series.label))
        {
            return Err(Error::Core(xpdview_core::Error::Config(format!(
                "statistic '{}' is used by {}",
                plot.series.label, plot.id
            ))));
        }
        self.registry = registry;
        Ok(())
    }

    /// Registered statistics.
    #[must_use]
    pub fn statistics(&self) -> &StatisticRegistry {
        &self.registry
    }

    /// Geometry used for images integrated from now on.
    pub fn set_integration_parameters(&mut self, params: IntegrationParameters) {
        self.integration = params;
    }

    /// Current integration geometry.
    #[must_use]
    pub fn integration_parameters(&self) -> &IntegrationParameters {
        &self.integration
    }

    /// Installs the integrator used for images without a pattern file.
    ///
    /// Pending images are integrated on the next refresh.
    pub fn set_integrator(&mut self, integrator: Box<dyn AzimuthalIntegrator>) {
        log::debug!("using integrator '{}'", integrator.name());
        self.integrator = Some(integrator);
    }

    /// Sets the per-curve waterfall offsets.
    pub fn set_waterfall_offsets(&mut self, x_offset: f64, y_offset: f64) {
        self.config.x_offset = x_offset;
        self.config.y_offset = y_offset;
    }

    /// Switches the waterfall between normalized and raw curves.
    pub fn set_normalized(&mut self, normalized: bool) {
        self.config.normalized = normalized;
        self.waterfall.set_normalized(normalized);
    }

    /// Waterfall curves with the current offsets.
    #[must_use]
    pub fn waterfall_curves(&self) -> Vec<WaterfallCurve> {
        self.waterfall
            .generate_waterfall(self.config.x_offset, self.config.y_offset)
    }

    /// Waterfall cache.
    #[must_use]
    pub fn waterfall(&self) -> &Waterfall {
        &self.waterfall
    }

    /// Mutable waterfall cache, for display settings.
    pub fn waterfall_mut(&mut self) -> &mut Waterfall {
        &mut self.waterfall
    }

    /// 3D grids of every pattern, if they share one length.
    #[must_use]
    pub fn surface(&self) -> Option<&WaterfallSurface> {
        self.surface.as_ref()
    }

    /// Replaces the peak finder and rescans every pattern.
    pub fn set_peak_finder(&mut self, finder: PeakFinder) {
        self.peaks.set_finder(finder);
        self.peaks.get_plot(self.patterns.keys(), &self.patterns);
    }

    /// Every peak found so far.
    #[must_use]
    pub fn peaks(&self) -> &[PeakPoint] {
        self.peaks.points()
    }

    /// Loaded images, including the placeholder until real data arrives.
    #[must_use]
    pub fn images(&self) -> &ImageStore {
        &self.images
    }

    /// Keys of real exposures, oldest first.
    #[must_use]
    pub fn exposure_keys(&self) -> Vec<ExposureKey> {
        exposures(&self.images).map(|(k, _)| k.clone()).collect()
    }

    /// Loaded or integrated patterns.
    #[must_use]
    pub fn patterns(&self) -> &IntegrationStore {
        &self.patterns
    }

    /// Images still waiting for a pattern.
    #[must_use]
    pub fn pending(&self) -> &[ExposureKey] {
        &self.pending
    }

    /// Axis labels of the loaded pattern files.
    #[must_use]
    pub fn units(&self) -> Option<AxisUnits> {
        self.units
    }

    /// Watched directory.
    #[must_use]
    pub fn directory(&self) -> Option<&Path> {
        self.directory.as_deref()
    }

    /// Current configuration.
    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }
}
