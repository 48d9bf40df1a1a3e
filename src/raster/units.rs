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

//! Point-wise unit conversions of raster samples.
//!
//! Multiplication and subtraction are kept as separate operations.
//! Both keep the storage type of the input, so the result of the
//! arithmetic is truncated to that type, and both pass no-data
//! samples through untouched.

use super::Raster;
use crate::Float;

/// Multiplies every valid sample by `scalar`.
pub fn multiply(raster: &Raster, scalar: Float) -> Raster {
    map_valid(raster, |v| v * scalar)
}

/// Subtracts `scalar` from every valid sample.
pub fn subtract(raster: &Raster, scalar: Float) -> Raster {
    map_valid(raster, |v| v - scalar)
}

fn map_valid<F>(raster: &Raster, op: F) -> Raster
where
    F: Fn(Float) -> Float + Sync + Send,
{
    let dtype = raster.dtype;
    let no_data = raster.no_data;

    let data = ndarray::Zip::from(&raster.data).par_map_collect(|&v| {
        if raster.is_no_data(v) {
            no_data
        } else {
            dtype.cast(op(v))
        }
    });

    Raster {
        data,
        transform: raster.transform,
        crs: raster.crs.clone(),
        no_data,
        dtype,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::{tests::sample_raster, DataType};
    use float_cmp::approx_eq;
    use ndarray::array;

    const ZERO_CELSIUS: Float = 273.15;

    #[test]
    fn multiply_keeps_type_and_no_data() {
        let mut raster = sample_raster(array![[0.25, Float::NAN], [0.5, 1.0]]);
        raster.dtype = DataType::Float32;

        let result = multiply(&raster, 100.0);

        assert_eq!(result.dtype, DataType::Float32);
        assert!(result.data[[0, 1]].is_nan());
        assert!(approx_eq!(Float, result.data[[0, 0]], 25.0));
        assert!(approx_eq!(Float, result.data[[1, 1]], 100.0));
    }

    #[test]
    fn integer_storage_is_truncated() {
        let mut raster = sample_raster(array![[300.0, 9999.0]]);
        raster.dtype = DataType::Int16;
        raster.no_data = 9999.0;

        let result = subtract(&raster, ZERO_CELSIUS);

        assert_eq!(result.dtype, DataType::Int16);
        assert_eq!(result.data[[0, 0]], 26.0);
        assert_eq!(result.data[[0, 1]], 9999.0);
    }

    #[test]
    fn subtract_converts_kelvin() {
        let raster = sample_raster(array![[303.15, 290.0]]);
        let result = subtract(&raster, ZERO_CELSIUS);

        assert!(approx_eq!(Float, result.data[[0, 0]], 30.0, epsilon = 1.0e-4));
        assert!(approx_eq!(Float, result.data[[0, 1]], 16.85, epsilon = 1.0e-4));
        assert_eq!(result.grid(), raster.grid());
    }
}
