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

//! Retrieval of forecast fields from external data providers.
//!
//! Providers differ in protocol and format, but each of them
//! answers the same question: given a variable and a spatio-temporal
//! window, return the fields in that window as rasters.

pub mod grib;
pub mod opendap;

use crate::errors::RetrievalError;
use crate::raster::aggregate::{mean_over, Dimension};
use crate::raster::{Bounds, Raster};
use crate::Float;
use chrono::{NaiveDate, NaiveDateTime};
use std::fmt;

pub use grib::GribSource;
pub use opendap::OpendapSource;

/// Inclusive range of valid times.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct TimeWindow {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl TimeWindow {
    pub fn contains(&self, time: &NaiveDateTime) -> bool {
        self.start <= *time && *time <= self.end
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.start, self.end)
    }
}

/// Request for a single physical variable.
#[derive(Clone, PartialEq, Debug)]
pub struct FieldRequest {
    /// Provider-specific variable name.
    pub variable: String,
    /// Vertical level in provider units, if the variable has levels.
    pub level: Option<Float>,
    pub window: Bounds,
    pub time: TimeWindow,
}

impl fmt::Display for FieldRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.variable)?;

        if let Some(level) = self.level {
            write!(f, "@{}", level)?;
        }

        write!(f, " [{}]", self.time)
    }
}

/// Collaborator supplying forecast fields.
pub trait ForecastSource {
    /// Returns one raster per time step or ensemble member
    /// found in the requested window. An empty result is an error.
    fn fetch(&self, request: &FieldRequest) -> Result<Vec<Raster>, RetrievalError>;

    /// Returns the per-pixel mean of the fields in the requested window.
    ///
    /// Sources holding many large fields override this to average
    /// the fields while reading, without keeping the whole series.
    fn fetch_mean(
        &self,
        request: &FieldRequest,
        dimension: Dimension,
    ) -> Result<Raster, RetrievalError> {
        let series = self.fetch(request)?;
        Ok(mean_over(&series, dimension)?)
    }
}

/// Substitutes `{date}` and `{run_date}` in a URL or path template
/// with dates formatted as `YYYYMMDD`.
pub fn expand_template(template: &str, date: NaiveDate, run_date: NaiveDate) -> String {
    template
        .replace("{date}", &date.format("%Y%m%d").to_string())
        .replace("{run_date}", &run_date.format("%Y%m%d").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_dates_are_compact() {
        let date = NaiveDate::from_ymd_opt(2023, 6, 8).unwrap();
        let run_date = NaiveDate::from_ymd_opt(2023, 6, 7).unwrap();

        let url = expand_template(
            "https://opendap.nccs.nasa.gov/dods/GEOS-5/fp/0.25_deg/fcast/tavg3_2d_aer_Nx/tavg3_2d_aer_Nx.{run_date}_00",
            date,
            run_date,
        );

        assert!(url.ends_with("tavg3_2d_aer_Nx.20230607_00"));
        assert_eq!(expand_template("ens/{date}/{date}.grib2", date, run_date), "ens/20230608/20230608.grib2");
    }

    #[test]
    fn time_window_is_inclusive() {
        let day = NaiveDate::from_ymd_opt(2023, 6, 1).unwrap();
        let window = TimeWindow {
            start: day.and_hms_opt(1, 30, 0).unwrap(),
            end: day.and_hms_opt(22, 30, 0).unwrap(),
        };

        assert!(window.contains(&day.and_hms_opt(1, 30, 0).unwrap()));
        assert!(window.contains(&day.and_hms_opt(22, 30, 0).unwrap()));
        assert!(!window.contains(&day.and_hms_opt(0, 30, 0).unwrap()));
    }
}
