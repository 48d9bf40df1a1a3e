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

//! Module responsible for parsing and checking the configuration file.
//!
//! The configuration file uses YAML and `serde` to enforce strong
//! typing. The structures in this module directly correspond to the
//! fields inside `config.yaml`.

use crate::errors::ConfigError;
use crate::raster::{aggregate::Dimension, clip::NoOverlapPolicy, resample::ResampleMethod, Bounds};
use crate::Float;
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use rustc_hash::FxHashSet;
use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
};

/// Geographic window (in degrees) in which data is requested
/// from providers.
#[derive(Copy, Clone, PartialEq, Debug, Deserialize)]
pub struct Domain {
    pub west: Float,
    pub east: Float,
    pub south: Float,
    pub north: Float,
}

impl Domain {
    pub fn check_bounds(&self) -> Result<(), ConfigError> {
        if !(-90.0..=90.0).contains(&self.south) || !(-90.0..=90.0).contains(&self.north) {
            return Err(ConfigError::OutOfBounds(
                "Domain latitudes must be between -90 and 90",
            ));
        }

        if !(-180.0..=180.0).contains(&self.west) || !(-180.0..=180.0).contains(&self.east) {
            return Err(ConfigError::OutOfBounds(
                "Domain longitudes must be between -180 and 180",
            ));
        }

        if self.west >= self.east || self.south >= self.north {
            return Err(ConfigError::OutOfBounds(
                "Domain west/south edge must be smaller than east/north edge",
            ));
        }

        Ok(())
    }

    pub fn bounds(&self) -> Bounds {
        Bounds {
            west: self.west,
            south: self.south,
            east: self.east,
            north: self.north,
        }
    }
}

/// Locations of static inputs and produced files.
#[derive(Clone, PartialEq, Debug, Deserialize)]
pub struct Paths {
    /// GeoJSON file with the clipping boundary.
    pub boundary: PathBuf,

    /// Root of run-scoped working directories. Each horizon
    /// writes its intermediate rasters into its own subdirectory.
    pub work_dir: PathBuf,

    /// Directory in which risk maps are written.
    pub output_dir: PathBuf,

    /// Paths registered in the catalog are relative to this directory.
    pub media_root: PathBuf,

    /// CSV file with registered risk maps.
    pub catalog: PathBuf,
}

/// _(Optional)_ Choices of the grid operations.
#[derive(Copy, Clone, PartialEq, Debug, Default, Deserialize)]
pub struct Processing {
    /// Defaults to `nearest`.
    #[serde(default)]
    pub resampling: ResampleMethod,

    /// Behaviour of clipping when the boundary misses the raster.
    /// Defaults to `error`.
    #[serde(default)]
    pub no_overlap: NoOverlapPolicy,
}

/// Day offset from the run date with the time of day.
#[derive(Copy, Clone, PartialEq, Debug, Deserialize)]
pub struct DayTime {
    pub day: i64,
    pub time: NaiveTime,
}

impl DayTime {
    pub fn resolve(&self, run_date: NaiveDate) -> NaiveDateTime {
        (run_date + Duration::days(self.day)).and_time(self.time)
    }
}

/// Inclusive window of data valid times.
#[derive(Copy, Clone, PartialEq, Debug, Deserialize)]
pub struct DataWindow {
    pub start: DayTime,
    pub end: DayTime,
}

/// Inclusive day offsets of the period the risk map is valid for.
#[derive(Copy, Clone, PartialEq, Debug, Deserialize)]
pub struct LabelWindow {
    pub start: i64,
    pub end: i64,
}

/// Data provider of a source.
#[derive(Clone, PartialEq, Debug, Deserialize)]
#[serde(tag = "provider", rename_all = "lowercase")]
pub enum Provider {
    /// netCDF dataset, local or served through OPeNDAP.
    Opendap { url: String },

    /// Local GRIB file.
    Grib {
        path: String,

        /// Rewrite messages with simple packing before decoding.
        #[serde(default)]
        repack: bool,

        /// _(Optional)_ 1-based index of the only band (matching
        /// message) to use. All bands are used by default.
        band: Option<usize>,
    },
}

/// Conversion applied to the aggregated field. Multiplication
/// is applied before subtraction.
#[derive(Copy, Clone, PartialEq, Debug, Default, Deserialize)]
pub struct Units {
    pub multiply: Option<Float>,
    pub subtract: Option<Float>,
}

/// Definition of one input variable of a horizon.
#[derive(Clone, PartialEq, Debug, Deserialize)]
pub struct Source {
    #[serde(flatten)]
    pub provider: Provider,

    /// Variable name (or GRIB `shortName`) in the dataset.
    pub variable: String,

    /// _(Optional)_ Vertical level of the variable.
    pub level: Option<Float>,

    /// Dimension over which the retrieved fields are averaged.
    pub aggregate: Dimension,

    #[serde(default)]
    pub units: Units,

    /// _(Optional)_ Data window overriding the horizon one.
    pub window: Option<DataWindow>,

    /// _(Optional)_ Day offset of the forecast run date substituted
    /// for `{run_date}` in the URL or path. Defaults to `0`.
    #[serde(default)]
    pub run_offset_days: i64,
}

impl Source {
    pub fn check_bounds(&self) -> Result<(), ConfigError> {
        let finite = |v: Option<Float>| v.map_or(true, Float::is_finite);

        if !finite(self.units.multiply) || !finite(self.units.subtract) || !finite(self.level) {
            return Err(ConfigError::OutOfBounds(
                "Source level and unit conversions must be finite numbers",
            ));
        }

        if let Some(window) = &self.window {
            check_window(window)?;
        }

        Ok(())
    }
}

#[derive(Clone, PartialEq, Debug, Deserialize)]
pub struct Sources {
    pub temperature: Source,
    pub humidity: Source,
    pub dust: Source,
}

/// Single forecast horizon producing one risk map.
#[derive(Clone, PartialEq, Debug, Deserialize)]
pub struct Horizon {
    /// Used in file names, eg. `week1`.
    pub name: String,
    pub label: LabelWindow,
    pub data: DataWindow,
    pub sources: Sources,
}

impl Horizon {
    pub fn check_bounds(&self) -> Result<(), ConfigError> {
        if self.name.is_empty() || self.name.contains(['/', '\\']) {
            return Err(ConfigError::OutOfBounds(
                "Horizon name must be a non-empty file name",
            ));
        }

        if self.label.start > self.label.end {
            return Err(ConfigError::OutOfBounds(
                "Horizon label window cannot end before it starts",
            ));
        }

        check_window(&self.data)?;

        self.sources.temperature.check_bounds()?;
        self.sources.humidity.check_bounds()?;
        self.sources.dust.check_bounds()?;

        Ok(())
    }
}

fn check_window(window: &DataWindow) -> Result<(), ConfigError> {
    if (window.start.day, window.start.time) > (window.end.day, window.end.time) {
        return Err(ConfigError::OutOfBounds(
            "Data window cannot end before it starts",
        ));
    }

    Ok(())
}

/// _(Optional)_ Fields with information about
/// resources available for the pipeline.
#[derive(Clone, PartialEq, Debug, Deserialize)]
pub struct Resources {
    /// _(Optional)_ Thread count used for pixel-wise operations.
    ///
    /// Cannot be less than `1`. Defaults to `1`.
    #[serde(default = "Resources::default_threads")]
    pub threads: u16,

    /// _(Optional)_ Heap memory limit in MB.
    ///
    /// Cannot be less than `128`. Defaults to whole addressable-space.
    /// With the limit set an allocation above it aborts with an
    /// out-of-memory message instead of the process being killed
    /// by the system.
    #[serde(default = "Resources::default_memory")]
    pub memory: usize,
}

impl Resources {
    fn default_threads() -> u16 {
        1
    }

    fn default_memory() -> usize {
        usize::MAX / (1024 * 1024)
    }

    /// Checks if thread count and memory limit are
    /// above limits.
    pub fn check_bounds(&self) -> Result<(), ConfigError> {
        if self.threads < 1 {
            return Err(ConfigError::OutOfBounds(
                "Available threads cannot be less than 1",
            ));
        }

        if self.memory < 128 {
            return Err(ConfigError::OutOfBounds(
                "Available memory cannot be less than 128 MB",
            ));
        }

        Ok(())
    }
}

impl Default for Resources {
    fn default() -> Self {
        Resources {
            threads: Resources::default_threads(),
            memory: Resources::default_memory(),
        }
    }
}

/// Main config structure representing the fields in
/// configuration file.
#[derive(Clone, PartialEq, Debug, Deserialize)]
pub struct Config {
    pub domain: Domain,

    pub paths: Paths,

    #[serde(default)]
    pub processing: Processing,

    pub horizons: Vec<Horizon>,

    #[serde(default)]
    pub resources: Resources,
}

impl Config {
    /// Config structure constructor, responsible for
    /// deserializing configuration and checking it.
    pub fn new_from_file(file_path: &Path) -> Result<Config, ConfigError> {
        let data = fs::read(file_path)?;
        let config = Config::new_from_slice(&data)?;

        Ok(config)
    }

    fn new_from_slice(data: &[u8]) -> Result<Config, ConfigError> {
        let config: Config = serde_yaml::from_slice(data)?;

        config.domain.check_bounds()?;
        config.resources.check_bounds()?;

        if config.horizons.is_empty() {
            return Err(ConfigError::OutOfBounds(
                "At least one horizon must be configured",
            ));
        }

        let mut names = FxHashSet::default();

        for horizon in &config.horizons {
            horizon.check_bounds()?;

            if !names.insert(horizon.name.as_str()) {
                return Err(ConfigError::OutOfBounds("Horizon names must be unique"));
            }
        }

        Ok(config)
    }
}
