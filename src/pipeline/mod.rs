/*
Copyright 2023 Jakub Lewandowski

This file is part of Meningitis Environmental Risk System (MERIS).

Meningitis Environmental Risk System (MERIS) is a free software: you can redistribute it and/or modify
it under the terms of the GNU General Public License as published by
the Free Software Foundation; either version 3 of the License, or
(at your option) any later version.

Meningitis Environmental Risk System (MERIS) is distributed in the hope that it will be useful,
but WITHOUT ANY WARRANTY; without even the implied warranty of
MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
GNU General Public License for more details.

You should have received a copy of the GNU General Public License
along with Meningitis Environmental Risk System (MERIS). If not, see https://www.gnu.org/licenses/.
*/

//! Pipeline producing the meningitis risk maps.
//!
//! For every configured horizon the three input variables are
//! fetched, averaged, clipped to the boundary and converted to the
//! classifier units. Temperature and dust are then resampled onto
//! the humidity grid, classified and the risk map is written and
//! registered in the catalog.
//!
//! Horizons are independent: a failed horizon is reported and the
//! remaining ones still run, but nothing is registered for it.

pub mod catalog;
pub mod configuration;

use self::catalog::{ArtifactStore, CsvCatalog, CATEGORICAL};
use self::configuration::{Config, Horizon, Processing, Provider, Source};
use crate::{
    classifier::classify,
    errors::{PipelineError, RetrievalError, StageError},
    raster::{
        adapter::Band, boundary::BoundaryPolygonSet, clip::clip, geotiff, resample::resample_to,
        units, Bounds, Raster,
    },
    sources::{expand_template, FieldRequest, ForecastSource, GribSource, OpendapSource, TimeWindow},
    ALLOCATOR,
};
use chrono::{Duration, NaiveDate, Utc};
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, error, info};
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::{
    env, fmt, fs,
    path::{Path, PathBuf},
    sync::Arc,
};

/// Completed stages of one horizon: four for each of the
/// three variables, two resamplings, classification, writing
/// and registration.
const STAGE_TICKS: u64 = 17;

/// Stage of a horizon run, used for reporting failures.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum Stage {
    Fetch,
    Decode,
    Aggregate,
    Clip,
    ConvertUnits,
    Resample,
    Classify,
    Write,
    Register,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Fetch => "fetch",
            Stage::Decode => "decode",
            Stage::Aggregate => "aggregate",
            Stage::Clip => "clip",
            Stage::ConvertUnits => "convert units",
            Stage::Resample => "resample",
            Stage::Classify => "classify",
            Stage::Write => "write",
            Stage::Register => "register",
        };

        write!(f, "{}", name)
    }
}

/// Main pipeline function, computing risk maps for all
/// configured horizons.
pub fn main() -> Result<(), PipelineError> {
    info!("Preparing the pipeline core");

    let mut core = Core::new()?;
    let run_date = Utc::now().date_naive();

    fs::create_dir_all(&core.config.paths.output_dir)?;

    let progress = ProgressBar::new(core.config.horizons.len() as u64 * STAGE_TICKS);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("{prefix} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} {msg}")
            .progress_chars("#>-"),
    );
    progress.set_prefix("Pipeline stages");

    let mut failed = vec![];

    for horizon in &core.config.horizons {
        let context = RunContext::new(horizon, run_date, &core.config, &progress);

        info!("Computing risk map {} for {}", horizon.name, context.label());

        let boundary = &core.boundary;
        let processing = core.config.processing;

        let result = core
            .threadpool
            .install(|| compute_risk_map(&context, boundary, processing))
            .and_then(|path| {
                let id = context.finish(
                    Stage::Register,
                    core.catalog.register(&path, &context.label(), CATEGORICAL),
                )?;

                Ok((path, id))
            });

        match result {
            Ok((path, id)) => info!(
                "Risk map {} written to {} and registered as layer {}",
                horizon.name,
                path.display(),
                id
            ),
            Err(err) => {
                error!("Risk map was not produced, check the details and rerun the pipeline: {}", err);
                progress.println(format!("Risk map {} failed", horizon.name));
                failed.push(horizon.name.clone());
            }
        }
    }

    progress.finish_with_message("All horizons processed");

    if failed.is_empty() {
        Ok(())
    } else {
        Err(PipelineError::HorizonsFailed(failed.join(", ")))
    }
}

/// Structure containing everything the horizons share.
#[derive(Debug)]
pub struct Core {
    pub config: Config,
    pub threadpool: ThreadPool,
    pub boundary: Arc<BoundaryPolygonSet>,
    pub catalog: CsvCatalog,
}

impl Core {
    /// Pipeline [`Core`] constructor.
    ///
    /// Configuration is read from `config.yaml` or from the file
    /// set in `MERIS_CONFIG`. The boundary is loaded once per run.
    pub fn new() -> Result<Self, PipelineError> {
        let config_path = env::var("MERIS_CONFIG").unwrap_or_else(|_| "config.yaml".to_string());

        debug!("Reading configuration from {}", config_path);
        let config = Config::new_from_file(Path::new(&config_path))?;

        debug!("Setting memory limit");
        ALLOCATOR
            .set_limit(config.resources.memory.saturating_mul(1024 * 1024))
            .map_err(|_| PipelineError::MemoryLimit(config.resources.memory))?;

        debug!("Setting up ThreadPool");
        let threadpool = ThreadPoolBuilder::new()
            .num_threads(config.resources.threads as usize)
            .stack_size(2 * 1024 * 1024)
            .build()?;

        debug!("Reading boundary from {}", config.paths.boundary.display());
        let boundary = Arc::new(BoundaryPolygonSet::from_geojson(&config.paths.boundary)?);
        info!("Loaded {} boundary polygons", boundary.len());

        let catalog = CsvCatalog::new(&config.paths.catalog, &config.paths.media_root);

        Ok(Core {
            config,
            threadpool,
            boundary,
            catalog,
        })
    }
}

/// State of one horizon run, passed explicitly to every stage.
///
/// Intermediate files of the horizon go to its own directory
/// so horizons never overwrite each other's files.
pub struct RunContext<'a> {
    horizon: &'a Horizon,
    run_date: NaiveDate,
    domain: Bounds,
    work_dir: PathBuf,
    output_dir: PathBuf,
    progress: &'a ProgressBar,
}

impl<'a> RunContext<'a> {
    pub fn new(
        horizon: &'a Horizon,
        run_date: NaiveDate,
        config: &Config,
        progress: &'a ProgressBar,
    ) -> Self {
        RunContext {
            horizon,
            run_date,
            domain: config.domain.bounds(),
            work_dir: config.paths.work_dir.join(&horizon.name),
            output_dir: config.paths.output_dir.clone(),
            progress,
        }
    }

    /// First and last day of the period the risk map is valid for.
    pub fn label_dates(&self) -> (NaiveDate, NaiveDate) {
        (
            self.run_date + Duration::days(self.horizon.label.start),
            self.run_date + Duration::days(self.horizon.label.end),
        )
    }

    /// Human-readable period, eg. `08/06/2023 - 14/06/2023`.
    pub fn label(&self) -> String {
        let (start, end) = self.label_dates();
        format!("{} - {}", start.format("%d/%m/%Y"), end.format("%d/%m/%Y"))
    }

    pub fn risk_map_path(&self) -> PathBuf {
        let (start, end) = self.label_dates();

        self.output_dir.join(format!(
            "Risk_map_{}_{}-{}.tif",
            self.horizon.name,
            start.format("%Y%m%d"),
            end.format("%Y%m%d")
        ))
    }

    fn request(&self, source: &Source) -> FieldRequest {
        let window = source.window.as_ref().unwrap_or(&self.horizon.data);

        FieldRequest {
            variable: source.variable.clone(),
            level: source.level,
            window: self.domain,
            time: TimeWindow {
                start: window.start.resolve(self.run_date),
                end: window.end.resolve(self.run_date),
            },
        }
    }

    fn open(&self, source: &Source) -> Box<dyn ForecastSource> {
        let forecast_run = self.run_date + Duration::days(source.run_offset_days);

        match &source.provider {
            Provider::Opendap { url } => Box::new(OpendapSource::new(&expand_template(
                url,
                self.run_date,
                forecast_run,
            ))),
            Provider::Grib { path, repack, band } => Box::new(GribSource::new(
                expand_template(path, self.run_date, forecast_run),
                *repack,
                band.map_or(Band::All, Band::Index),
            )),
        }
    }

    fn fail(&self, stage: Stage, source: impl Into<StageError>) -> PipelineError {
        PipelineError::Horizon {
            horizon: self.horizon.name.clone(),
            stage,
            source: source.into(),
        }
    }

    fn tick(&self, stage: Stage, field: &str) {
        debug!("{}: {} of {} done", self.horizon.name, stage, field);
        self.progress.inc(1);
    }

    fn finish<T, E: Into<StageError>>(
        &self,
        stage: Stage,
        result: Result<T, E>,
    ) -> Result<T, PipelineError> {
        match result {
            Ok(value) => {
                info!("{}: {} finished", self.horizon.name, stage);
                self.progress.inc(1);
                Ok(value)
            }
            Err(err) => Err(self.fail(stage, err)),
        }
    }

    #[cfg(feature = "raw_output")]
    fn save_intermediate(&self, name: &str, raster: &Raster) -> Result<(), PipelineError> {
        use crate::errors::OutputError;

        fs::create_dir_all(&self.work_dir).map_err(|e| self.fail(Stage::Write, OutputError::from(e)))?;

        geotiff::write(&self.work_dir.join(format!("{}.tif", name)), raster)
            .map_err(|e| self.fail(Stage::Write, e))
    }

    #[cfg(not(feature = "raw_output"))]
    fn save_intermediate(&self, name: &str, _raster: &Raster) -> Result<(), PipelineError> {
        debug!(
            "{}: skipping intermediate {} in {}",
            self.horizon.name,
            name,
            self.work_dir.display()
        );
        Ok(())
    }
}

/// Runs all stages of one horizon except registration
/// and returns the path of the written risk map.
fn compute_risk_map(
    context: &RunContext,
    boundary: &BoundaryPolygonSet,
    processing: Processing,
) -> Result<PathBuf, PipelineError> {
    let sources = &context.horizon.sources;

    let temperature = prepare_field(context, "temperature", &sources.temperature, boundary, processing)?;
    let humidity = prepare_field(context, "humidity", &sources.humidity, boundary, processing)?;
    let dust = prepare_field(context, "dust", &sources.dust, boundary, processing)?;

    let reference = humidity.grid();
    debug!("{}: reference grid {}", context.horizon.name, reference);

    let temperature = context.finish(
        Stage::Resample,
        resample_to(&temperature, &reference, processing.resampling),
    )?;
    context.save_intermediate("temperature_resampled", &temperature)?;

    let dust = context.finish(
        Stage::Resample,
        resample_to(&dust, &reference, processing.resampling),
    )?;
    context.save_intermediate("dust_resampled", &dust)?;

    let risk = context.finish(Stage::Classify, classify(&temperature, &humidity, &dust))?;

    let path = context.risk_map_path();
    context.finish(Stage::Write, geotiff::write(&path, &risk))?;

    Ok(path)
}

/// Fetches the variable and brings it to a single
/// clipped raster in classifier units.
fn prepare_field(
    context: &RunContext,
    field: &str,
    source: &Source,
    boundary: &BoundaryPolygonSet,
    processing: Processing,
) -> Result<Raster, PipelineError> {
    let request = context.request(source);

    debug!(
        "{}: averaging {} over {}",
        context.horizon.name,
        field,
        source.aggregate
    );

    let mean = context
        .open(source)
        .fetch_mean(&request, source.aggregate)
        .map_err(|err| match err {
            RetrievalError::Decode(err) => context.fail(Stage::Decode, err),
            RetrievalError::Alignment(err) => context.fail(Stage::Aggregate, err),
            err => context.fail(Stage::Fetch, err),
        })?;
    context.tick(Stage::Fetch, field);
    context.tick(Stage::Aggregate, field);
    context.save_intermediate(&format!("{}_mean", field), &mean)?;

    let clipped = context.finish(Stage::Clip, clip(&mean, boundary, processing.no_overlap))?;
    context.save_intermediate(&format!("{}_clipped", field), &clipped)?;

    let mut converted = clipped;

    if let Some(factor) = source.units.multiply {
        converted = units::multiply(&converted, factor);
    }

    if let Some(offset) = source.units.subtract {
        converted = units::subtract(&converted, offset);
    }

    context.tick(Stage::ConvertUnits, field);
    context.save_intermediate(&format!("{}_converted", field), &converted)?;

    Ok(converted)
}
