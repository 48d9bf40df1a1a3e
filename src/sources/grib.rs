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

//! Ensemble forecasts stored as GRIB files.

use super::{FieldRequest, ForecastSource};
use crate::errors::RetrievalError;
use crate::raster::adapter::{self, Band, MessageInfo};
use crate::raster::aggregate::{Dimension, MeanAccumulator};
use crate::raster::Raster;
use crate::Float;
use eccodes::codes_handle::{CodesHandle, ProductKind::GRIB};
use eccodes::FallibleIterator;
use log::debug;
use rustc_hash::FxHashSet;
use std::path::PathBuf;

/// GRIB file with one message per field, ensemble member and step.
///
/// Matching messages form the bands of the source and each
/// selected band becomes one raster. Messages are optionally
/// rewritten with simple packing before decoding.
#[derive(Clone, Debug)]
pub struct GribSource {
    path: PathBuf,
    repack: bool,
    band: Band,
}

impl GribSource {
    pub fn new(path: impl Into<PathBuf>, repack: bool, band: Band) -> Self {
        GribSource {
            path: path.into(),
            repack,
            band,
        }
    }

    /// Reads the file message by message and passes every selected
    /// band, cropped to the request window, to `sink`.
    ///
    /// Values are unpacked only for selected messages and at most one
    /// full message is held at a time. Returns the number of bands
    /// passed to `sink`.
    fn scan(
        &self,
        request: &FieldRequest,
        mut sink: impl FnMut(Raster) -> Result<(), RetrievalError>,
    ) -> Result<usize, RetrievalError> {
        debug!("Reading {} from {}", request, self.path.display());

        let mut handle = CodesHandle::new_from_file(&self.path, GRIB)?;

        let mut matched = 0;
        let mut decoded = 0;
        let mut members = FxHashSet::default();
        let mut steps = FxHashSet::default();

        while let Some(message) = handle.next()? {
            let info = adapter::describe(&message)?;

            if !matches_request(request, &info) {
                continue;
            }

            matched += 1;
            members.insert(info.ensemble_member);
            steps.insert(info.valid_time);

            if !self.band.selects(matched) {
                continue;
            }

            let message = if self.repack {
                adapter::repack(message)?
            } else {
                message
            };

            let raster = adapter::to_raster_grid(adapter::decode(&message)?)?
                .crop(&request.window)
                .ok_or_else(|| RetrievalError::EmptyWindow(request.to_string()))?;

            decoded += 1;
            sink(raster)?;
        }

        if matched == 0 {
            return Err(RetrievalError::EmptyWindow(request.to_string()));
        }

        self.band.check(matched)?;

        debug!(
            "Found {} messages of {} ({} members, {} valid times), decoded {}",
            matched,
            request.variable,
            members.len(),
            steps.len(),
            decoded
        );

        Ok(decoded)
    }
}

fn matches_request(request: &FieldRequest, info: &MessageInfo) -> bool {
    let level_matches = request
        .level
        .map_or(true, |level| (info.level as Float - level).abs() < 1.0e-6);

    info.short_name == request.variable && level_matches && request.time.contains(&info.valid_time)
}

impl ForecastSource for GribSource {
    fn fetch(&self, request: &FieldRequest) -> Result<Vec<Raster>, RetrievalError> {
        let mut rasters = vec![];

        self.scan(request, |raster| {
            rasters.push(raster);
            Ok(())
        })?;

        Ok(rasters)
    }

    fn fetch_mean(
        &self,
        request: &FieldRequest,
        dimension: Dimension,
    ) -> Result<Raster, RetrievalError> {
        let mut mean: Option<MeanAccumulator> = None;

        self.scan(request, |raster| {
            match &mut mean {
                Some(mean) => mean.add(&raster)?,
                slot @ None => *slot = Some(MeanAccumulator::new(&raster)),
            }
            Ok(())
        })?;

        let mean = mean.ok_or_else(|| RetrievalError::EmptyWindow(request.to_string()))?;

        debug!(
            "Averaged {} fields of {} along {} dimension",
            mean.members(),
            request.variable,
            dimension
        );

        Ok(mean.finish())
    }
}
