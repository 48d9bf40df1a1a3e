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

//! Gridded time series served as netCDF, either from a local file
//! or remotely through OPeNDAP.
//!
//! Datasets are expected to follow CF conventions: one-dimensional
//! `lat`, `lon` and `time` coordinates, an optional `lev` coordinate
//! and data variables shaped `(time, [lev,] lat, lon)`.

use super::{FieldRequest, ForecastSource};
use crate::errors::{DecodeError, RetrievalError};
use crate::raster::{Crs, DataType, GeoTransform, Raster};
use crate::Float;
use chrono::{Duration, NaiveDate, NaiveDateTime};
use log::debug;
use ndarray::{s, Array3, Axis};
use netcdf::AttributeValue;
use std::ops::Range;

/// First day of the Gregorian calendar. Earlier reference
/// dates of the standard calendar are Julian dates.
const GREGORIAN_START: (i32, u32, u32) = (1582, 10, 15);

/// Julian Day Number of 0000-12-31 in the proleptic Gregorian calendar.
const JDN_CE_OFFSET: i64 = 1_721_425;

#[derive(Clone, Debug)]
pub struct OpendapSource {
    location: String,
}

impl OpendapSource {
    /// `location` is a local path or an OPeNDAP dataset URL.
    pub fn new(location: &str) -> Self {
        OpendapSource {
            location: location.to_string(),
        }
    }
}

impl ForecastSource for OpendapSource {
    fn fetch(&self, request: &FieldRequest) -> Result<Vec<Raster>, RetrievalError> {
        debug!("Opening {} for {}", self.location, request);

        let file = netcdf::open(&self.location)?;

        let variable = file
            .variable(&request.variable)
            .ok_or_else(|| RetrievalError::Missing(format!("variable {}", request.variable)))?;

        let lons = read_coordinate(&file, &["lon", "longitude"])?;
        let lats = read_coordinate(&file, &["lat", "latitude"])?;

        let time = file
            .variable("time")
            .ok_or_else(|| RetrievalError::Missing("time coordinate".to_string()))?;
        let units = string_attribute(&time, "units")
            .ok_or_else(|| RetrievalError::TimeUnits("time has no units".to_string()))?;
        let times = decode_time(&units, &time.get_values::<f64, _>(..)?)?;

        let empty = || RetrievalError::EmptyWindow(request.to_string());

        let time_range = select_range(&times, |t| request.time.contains(t)).ok_or_else(empty)?;
        let window = &request.window;
        let lon_range = select_range(&lons, |x| (window.west..=window.east).contains(x)).ok_or_else(empty)?;
        let lat_range = select_range(&lats, |y| (window.south..=window.north).contains(y)).ok_or_else(empty)?;

        let (nt, ny, nx) = (time_range.len(), lat_range.len(), lon_range.len());

        let values: Vec<f64> = match variable.dimensions().len() {
            3 => variable.get_values([time_range.clone(), lat_range.clone(), lon_range.clone()])?,
            4 => {
                let level = request.level.ok_or_else(|| {
                    RetrievalError::Missing(format!("level of 4-dimensional {}", request.variable))
                })?;

                let levels = read_coordinate(&file, &["lev", "level", "plev"])?;
                let index = levels
                    .iter()
                    .position(|l| (l - level).abs() < 1.0e-6)
                    .ok_or_else(|| RetrievalError::Missing(format!("level {}", level)))?;

                variable.get_values([
                    time_range.clone(),
                    index..index + 1,
                    lat_range.clone(),
                    lon_range.clone(),
                ])?
            }
            n => {
                return Err(RetrievalError::Missing(format!(
                    "{} dimensions of {}, expected 3 or 4",
                    n, request.variable
                )))
            }
        };

        let fill_value = float_attribute(&variable, "_FillValue")
            .or_else(|| float_attribute(&variable, "missing_value"));
        let scale = float_attribute(&variable, "scale_factor").unwrap_or(1.0);
        let offset = float_attribute(&variable, "add_offset").unwrap_or(0.0);

        let values = values
            .into_iter()
            .map(|v| {
                if Some(v) == fill_value {
                    Float::NAN
                } else {
                    v * scale + offset
                }
            })
            .collect();

        let series = Array3::from_shape_vec((nt, ny, nx), values).map_err(DecodeError::from)?;

        if lons.len() < 2 || lats.len() < 2 {
            return Err(RetrievalError::Missing("regular lat/lon coordinates".to_string()));
        }

        let dx = lons[1] - lons[0];
        let dy = (lats[1] - lats[0]).abs();
        let lat_ascending = lats[1] > lats[0];
        let north = lats[lat_range.start].max(lats[lat_range.end - 1]);

        let transform = GeoTransform {
            origin_x: lons[lon_range.start] - dx / 2.0,
            pixel_width: dx,
            origin_y: north + dy / 2.0,
            pixel_height: -dy,
        };

        debug!(
            "Read {} steps of {}x{} pixels of {}",
            nt, ny, nx, request.variable
        );

        Ok(series
            .axis_iter(Axis(0))
            .map(|step| {
                let data = if lat_ascending {
                    step.slice(s![..;-1, ..]).to_owned()
                } else {
                    step.to_owned()
                };

                Raster::new(data, transform, Crs::wgs84(), Float::NAN, DataType::Float32)
            })
            .collect())
    }
}

/// Decodes CF time coordinate values, eg. `minutes since 2023-06-01 00:30:00`.
///
/// Reference dates before the Gregorian reform are read as Julian
/// calendar dates, as in the CF `standard` calendar.
pub fn decode_time(units: &str, values: &[f64]) -> Result<Vec<NaiveDateTime>, RetrievalError> {
    let invalid = || RetrievalError::TimeUnits(units.to_string());

    let (unit, reference) = units.split_once(" since ").ok_or_else(invalid)?;

    let seconds = match unit.trim().to_lowercase().as_str() {
        "days" | "day" | "d" => 86_400.0,
        "hours" | "hour" | "hr" | "h" => 3_600.0,
        "minutes" | "minute" | "min" => 60.0,
        "seconds" | "second" | "sec" | "s" => 1.0,
        _ => return Err(invalid()),
    };

    let reference = parse_reference(reference).ok_or_else(invalid)?;

    Ok(values
        .iter()
        .map(|v| reference + Duration::milliseconds((v * seconds * 1000.0).round() as i64))
        .collect())
}

fn parse_reference(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim().trim_end_matches("UTC").trim_end_matches('Z').trim();
    let mut parts = text.splitn(2, |c| c == ' ' || c == 'T');

    let mut date = parts.next()?.split('-');
    let year: i32 = date.next()?.parse().ok()?;
    let month: u32 = date.next()?.parse().ok()?;
    let day: u32 = date.next()?.parse().ok()?;

    let date = if (year, month, day) < GREGORIAN_START {
        julian_to_gregorian(year, month, day)?
    } else {
        NaiveDate::from_ymd_opt(year, month, day)?
    };

    let (mut hour, mut minute, mut second) = (0, 0, 0.0);

    if let Some(time) = parts.next() {
        let mut time = time.trim().split(':');
        hour = time.next().map_or(Some(0), |h| h.parse().ok())?;
        minute = time.next().map_or(Some(0), |m| m.parse().ok())?;
        second = time.next().map_or(Some(0.0), |s| s.parse().ok())?;
    }

    Some(date.and_hms_opt(hour, minute, 0)? + Duration::milliseconds((second * 1000.0_f64).round() as i64))
}

fn julian_to_gregorian(year: i32, month: u32, day: u32) -> Option<NaiveDate> {
    let (year, month, day) = (i64::from(year), i64::from(month), i64::from(day));

    let a = (14 - month) / 12;
    let y = year + 4800 - a;
    let m = month + 12 * a - 3;
    let jdn = day + (153 * m + 2) / 5 + 365 * y + y / 4 - 32_083;

    NaiveDate::from_num_days_from_ce_opt(i32::try_from(jdn - JDN_CE_OFFSET).ok()?)
}

/// Contiguous index range of monotonic coordinates accepted by `keep`.
fn select_range<T>(coordinates: &[T], keep: impl Fn(&T) -> bool) -> Option<Range<usize>> {
    let start = coordinates.iter().position(&keep)?;
    let end = coordinates.iter().rposition(&keep)?;

    Some(start..end + 1)
}

fn read_coordinate(file: &netcdf::File, names: &[&str]) -> Result<Vec<Float>, RetrievalError> {
    let variable = names
        .iter()
        .find_map(|name| file.variable(name))
        .ok_or_else(|| RetrievalError::Missing(format!("coordinate {}", names.join("/"))))?;

    Ok(variable.get_values::<f64, _>(..)?)
}

fn has_attribute(variable: &netcdf::Variable, name: &str) -> bool {
    variable.attributes().any(|attr| attr.name() == name)
}

fn float_attribute(variable: &netcdf::Variable, name: &str) -> Option<f64> {
    if !has_attribute(variable, name) {
        return None;
    }

    f64::try_from(variable.attribute_value(name)?.ok()?).ok()
}

fn string_attribute(variable: &netcdf::Variable, name: &str) -> Option<String> {
    if !has_attribute(variable, name) {
        return None;
    }

    match variable.attribute_value(name)?.ok()? {
        AttributeValue::Str(value) => Some(value),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::Bounds;
    use crate::sources::TimeWindow;
    use chrono::Datelike;
    use float_cmp::approx_eq;

    fn datetime(day: u32, hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2023, 6, day)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    #[test]
    fn decodes_cf_minutes() {
        let times = decode_time("minutes since 2023-06-01 01:30:00", &[0.0, 180.0]).unwrap();

        assert_eq!(times, vec![datetime(1, 1, 30), datetime(1, 4, 30)]);
    }

    #[test]
    fn grads_reference_uses_julian_calendar() {
        let days = f64::from(datetime(1, 0, 0).date().num_days_from_ce()) + 1.0;
        let times = decode_time("days since 1-1-1 00:00:0.0", &[days + 0.0625]).unwrap();

        assert_eq!(times[0], datetime(1, 1, 30));
    }

    #[test]
    fn unknown_units_are_rejected() {
        assert!(matches!(
            decode_time("fortnights since 2023-06-01", &[1.0]),
            Err(RetrievalError::TimeUnits(_))
        ));
        assert!(decode_time("minutes after 2023-06-01", &[1.0]).is_err());
    }

    #[test]
    fn selects_monotonic_ranges() {
        let ascending = [-1.0, 0.0, 1.0, 2.0];
        let descending = [2.0, 1.0, 0.0, -1.0];

        assert_eq!(select_range(&ascending, |v| (0.0..=1.5).contains(v)), Some(1..3));
        assert_eq!(select_range(&descending, |v| (0.0..=1.5).contains(v)), Some(1..3));
        assert_eq!(select_range(&ascending, |v| *v > 5.0), None);
    }

    #[test]
    fn reads_window_from_netcdf_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dust.nc");

        {
            let mut file = netcdf::create(&path).unwrap();
            file.add_dimension("time", 2).unwrap();
            file.add_dimension("lat", 3).unwrap();
            file.add_dimension("lon", 4).unwrap();

            let mut time = file.add_variable::<f64>("time", &["time"]).unwrap();
            time.put_attribute("units", "minutes since 2023-06-01 01:30:00").unwrap();
            time.put_values(&[0.0, 180.0], ..).unwrap();

            let mut lat = file.add_variable::<f64>("lat", &["lat"]).unwrap();
            lat.put_values(&[-1.0, 0.0, 1.0], ..).unwrap();

            let mut lon = file.add_variable::<f64>("lon", &["lon"]).unwrap();
            lon.put_values(&[10.0, 11.0, 12.0, 13.0], ..).unwrap();

            let mut dust = file
                .add_variable::<f32>("DUSMASS", &["time", "lat", "lon"])
                .unwrap();
            dust.put_attribute("_FillValue", 1.0e15_f32).unwrap();

            let mut values: Vec<f32> = (0..24).map(|v| v as f32).collect();
            values[15] = 1.0e15;
            dust.put_values(&values, ..).unwrap();
        }

        let source = OpendapSource::new(path.to_str().unwrap());
        let request = FieldRequest {
            variable: "DUSMASS".to_string(),
            level: None,
            window: Bounds {
                west: 10.5,
                south: -1.0,
                east: 13.0,
                north: 1.0,
            },
            time: TimeWindow {
                start: datetime(1, 0, 0),
                end: datetime(1, 23, 0),
            },
        };

        let rasters = source.fetch(&request).unwrap();

        assert_eq!(rasters.len(), 2);
        assert_eq!((rasters[0].height(), rasters[0].width()), (3, 3));
        assert_eq!(rasters[0].transform.origin_x, 10.5);
        assert_eq!(rasters[0].transform.origin_y, 1.5);
        // northernmost row comes first
        assert_eq!(rasters[0].value(0, 0), Some(9.0));
        assert_eq!(rasters[1].value(2, 2), None);
        assert_eq!(rasters[1].valid_count(), 8);
    }

    /// Single step at 2023-06-01 01:30 on a 2x2 grid
    /// with ascending latitudes.
    fn small_grid(file: &mut netcdf::FileMut) {
        file.add_dimension("time", 1).unwrap();
        file.add_dimension("lat", 2).unwrap();
        file.add_dimension("lon", 2).unwrap();

        let mut time = file.add_variable::<f64>("time", &["time"]).unwrap();
        time.put_attribute("units", "minutes since 2023-06-01 01:30:00").unwrap();
        time.put_values(&[0.0], ..).unwrap();

        let mut lat = file.add_variable::<f64>("lat", &["lat"]).unwrap();
        lat.put_values(&[0.0, 1.0], ..).unwrap();

        let mut lon = file.add_variable::<f64>("lon", &["lon"]).unwrap();
        lon.put_values(&[10.0, 11.0], ..).unwrap();
    }

    fn small_request(variable: &str, level: Option<Float>) -> FieldRequest {
        FieldRequest {
            variable: variable.to_string(),
            level,
            window: Bounds {
                west: 10.0,
                south: 0.0,
                east: 11.0,
                north: 1.0,
            },
            time: TimeWindow {
                start: datetime(1, 0, 0),
                end: datetime(1, 23, 0),
            },
        }
    }

    #[test]
    fn reads_requested_level() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rh.nc");

        {
            let mut file = netcdf::create(&path).unwrap();
            small_grid(&mut file);
            file.add_dimension("lev", 2).unwrap();

            let mut lev = file.add_variable::<f64>("lev", &["lev"]).unwrap();
            lev.put_values(&[71.0, 72.0], ..).unwrap();

            let mut rh = file
                .add_variable::<f32>("RH", &["time", "lev", "lat", "lon"])
                .unwrap();
            rh.put_values(&[0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8], ..)
                .unwrap();
        }

        let source = OpendapSource::new(path.to_str().unwrap());

        let rasters = source.fetch(&small_request("RH", Some(72.0))).unwrap();

        assert_eq!(rasters.len(), 1);
        assert_eq!((rasters[0].height(), rasters[0].width()), (2, 2));
        // second level, northern row first
        assert!(approx_eq!(Float, rasters[0].value(0, 0).unwrap(), 0.7, epsilon = 1.0e-6));
        assert!(approx_eq!(Float, rasters[0].value(1, 1).unwrap(), 0.6, epsilon = 1.0e-6));

        assert!(matches!(
            source.fetch(&small_request("RH", Some(73.0))),
            Err(RetrievalError::Missing(_))
        ));
        assert!(matches!(
            source.fetch(&small_request("RH", None)),
            Err(RetrievalError::Missing(_))
        ));
    }

    #[test]
    fn unpacks_scaled_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t2m.nc");

        {
            let mut file = netcdf::create(&path).unwrap();
            small_grid(&mut file);

            let mut t2m = file
                .add_variable::<i16>("T2M", &["time", "lat", "lon"])
                .unwrap();
            t2m.put_attribute("scale_factor", 0.01_f64).unwrap();
            t2m.put_attribute("add_offset", 273.15_f64).unwrap();
            t2m.put_attribute("missing_value", -32_767_i16).unwrap();
            t2m.put_values(&[0_i16, 100, -32_767, 250], ..).unwrap();
        }

        let source = OpendapSource::new(path.to_str().unwrap());

        let rasters = source.fetch(&small_request("T2M", None)).unwrap();
        let raster = &rasters[0];

        // rows are flipped, so the southern row is the last one
        assert!(approx_eq!(Float, raster.value(1, 0).unwrap(), 273.15, epsilon = 1.0e-9));
        assert!(approx_eq!(Float, raster.value(1, 1).unwrap(), 274.15, epsilon = 1.0e-9));
        assert_eq!(raster.value(0, 0), None);
        assert!(approx_eq!(Float, raster.value(0, 1).unwrap(), 275.65, epsilon = 1.0e-9));
    }
}
