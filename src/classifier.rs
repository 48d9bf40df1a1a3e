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

//! Meningitis risk classification of co-registered
//! temperature, humidity and dust fields.
//!
//! Risk categories range from 1 (highest risk) to 9, pixels
//! that match no rule keep [`RISK_NO_DATA`].

use crate::constants::RISK_NO_DATA;
use crate::errors::AlignmentError;
use crate::raster::{DataType, Raster};
use crate::Float;
use ndarray::Zip;

/// Pixel values of the three classified fields.
/// Missing inputs are `None` and fail every predicate that uses them.
#[derive(Copy, Clone, Debug)]
struct Sample {
    t: Option<Float>,
    h: Option<Float>,
    d: Option<Float>,
}

type Predicate = fn(&Sample) -> bool;

fn holds(value: Option<Float>, test: impl Fn(Float) -> bool) -> bool {
    value.map_or(false, test)
}

/// Ordered rule table. Rules are not mutually exclusive
/// and a later match overwrites an earlier one.
const RULES: [(Predicate, i16); 9] = [
    (
        |s| holds(s.t, |t| t >= 30.0) && holds(s.h, |h| h <= 20.0) && holds(s.d, |d| d >= 400.0),
        1,
    ),
    (
        |s| {
            holds(s.t, |t| t > 27.0 && t < 30.0)
                && holds(s.h, |h| h <= 20.0)
                && holds(s.d, |d| d >= 400.0)
        },
        2,
    ),
    (
        |s| {
            holds(s.t, |t| t >= 30.0)
                && holds(s.h, |h| h <= 20.0)
                && holds(s.d, |d| d > 150.0 && d < 400.0)
        },
        3,
    ),
    (
        |s| {
            holds(s.t, |t| t >= 30.0)
                && holds(s.h, |h| h > 40.0 && h <= 60.0)
                && holds(s.d, |d| d >= 400.0)
        },
        4,
    ),
    (
        |s| {
            holds(s.t, |t| t > 27.0 && t < 30.0)
                && holds(s.h, |h| h > 20.0 && h <= 40.0)
                && holds(s.d, |d| d > 150.0 && d < 400.0)
        },
        5,
    ),
    (
        |s| holds(s.t, |t| t > 27.0) && holds(s.h, |h| h < 60.0) && holds(s.d, |d| d < 150.0),
        6,
    ),
    (
        |s| {
            holds(s.t, |t| t > 27.0)
                && holds(s.h, |h| h > 40.0 && h <= 60.0)
                && holds(s.d, |d| d > 150.0 && d < 400.0)
        },
        7,
    ),
    (|s| holds(s.h, |h| h > 60.0), 8),
    (|s| holds(s.t, |t| t < 27.0), 9),
];

fn category(sample: &Sample) -> i16 {
    RULES
        .iter()
        .fold(RISK_NO_DATA, |category, (predicate, assigned)| {
            if predicate(sample) {
                *assigned
            } else {
                category
            }
        })
}

/// Classifies every pixel of the aligned inputs into a risk category.
///
/// Temperature is expected in °C, humidity in % and dust
/// in µg/m³. The inputs are not resampled here, any grid
/// difference is an [`AlignmentError`].
pub fn classify(
    temperature: &Raster,
    humidity: &Raster,
    dust: &Raster,
) -> Result<Raster, AlignmentError> {
    let grid = temperature.grid();
    grid.check_aligned(&humidity.grid())?;
    grid.check_aligned(&dust.grid())?;

    let data = Zip::from(&temperature.data)
        .and(&humidity.data)
        .and(&dust.data)
        .par_map_collect(|&t, &h, &d| {
            let sample = Sample {
                t: valid(temperature, t),
                h: valid(humidity, h),
                d: valid(dust, d),
            };

            Float::from(category(&sample))
        });

    Ok(Raster {
        data,
        transform: grid.transform,
        crs: grid.crs,
        no_data: Float::from(RISK_NO_DATA),
        dtype: DataType::Int16,
    })
}

fn valid(raster: &Raster, value: Float) -> Option<Float> {
    if raster.is_no_data(value) {
        None
    } else {
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::tests::sample_raster;
    use ndarray::array;

    fn classify_one(t: Float, h: Float, d: Float) -> Float {
        let result = classify(
            &sample_raster(array![[t]]),
            &sample_raster(array![[h]]),
            &sample_raster(array![[d]]),
        )
        .unwrap();

        result.data[[0, 0]]
    }

    #[test]
    fn later_rule_overwrites_earlier() {
        // matches rules 6 and 8
        assert_eq!(classify_one(28.0, 65.0, 100.0), 8.0);
        // matches only rule 9
        assert_eq!(classify_one(26.9, 30.0, 500.0), 9.0);
    }

    #[test]
    fn each_category_is_reachable() {
        assert_eq!(classify_one(31.0, 10.0, 500.0), 1.0);
        assert_eq!(classify_one(28.0, 15.0, 450.0), 2.0);
        assert_eq!(classify_one(35.0, 20.0, 200.0), 3.0);
        assert_eq!(classify_one(30.0, 50.0, 400.0), 4.0);
        assert_eq!(classify_one(29.0, 30.0, 300.0), 5.0);
        assert_eq!(classify_one(28.0, 30.0, 100.0), 6.0);
        assert_eq!(classify_one(28.0, 50.0, 200.0), 7.0);
        assert_eq!(classify_one(28.0, 61.0, 100.0), 8.0);
        assert_eq!(classify_one(26.0, 40.0, 150.0), 9.0);
    }

    #[test]
    fn boundary_values_match_no_rule() {
        assert_eq!(classify_one(27.0, 60.0, 150.0), Float::from(RISK_NO_DATA));
        assert_eq!(classify_one(27.0, 61.0, 100.0), 8.0);
    }

    #[test]
    fn missing_inputs_fail_their_predicates() {
        let result = classify(
            &sample_raster(array![[Float::NAN, 31.0]]),
            &sample_raster(array![[65.0, 10.0]]),
            &sample_raster(array![[100.0, Float::NAN]]),
        )
        .unwrap();

        // humidity alone decides rule 8
        assert_eq!(result.data[[0, 0]], 8.0);
        assert_eq!(result.data[[0, 1]], Float::from(RISK_NO_DATA));
        assert_eq!(result.dtype, DataType::Int16);
        assert_eq!(result.value(0, 1), None);
    }

    #[test]
    fn misaligned_inputs_are_rejected() {
        let mut shifted = sample_raster(array![[20.0]]);
        shifted.transform.origin_x = 0.5;

        let result = classify(
            &sample_raster(array![[20.0]]),
            &sample_raster(array![[20.0]]),
            &shifted,
        );

        assert!(matches!(result, Err(AlignmentError::GridMismatch { .. })));
    }
}
