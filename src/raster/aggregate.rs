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

//! Reduction of raster series (time steps or ensemble members)
//! into a single mean raster.

use super::{DataType, GridDescriptor, Raster};
use crate::errors::AlignmentError;
use crate::Float;
use log::debug;
use ndarray::{Array2, Zip};
use serde::Deserialize;
use std::fmt;

/// Dimension along which the series is reduced.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dimension {
    Time,
    Ensemble,
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dimension::Time => write!(f, "time"),
            Dimension::Ensemble => write!(f, "ensemble"),
        }
    }
}

/// Computes per-pixel arithmetic mean over the series.
///
/// Missing members are skipped, so a pixel is no-data in the
/// result only when it is no-data in every member. All members
/// must share the grid of the first one.
///
/// Integer series are averaged into `Float64` storage, floating
/// series keep the storage type of the first member.
pub fn mean_over(series: &[Raster], dimension: Dimension) -> Result<Raster, AlignmentError> {
    let first = series.first().ok_or(AlignmentError::EmptySeries)?;

    debug!(
        "Averaging {} rasters along {} dimension",
        series.len(),
        dimension
    );

    let mut mean = MeanAccumulator::new(first);

    for member in &series[1..] {
        mean.add(member)?;
    }

    Ok(mean.finish())
}

/// Running per-pixel mean of a raster series with the
/// same semantics as [`mean_over`].
///
/// Only sums and counts of valid samples are kept, so each
/// member can be dropped right after it is added.
#[derive(Debug)]
pub struct MeanAccumulator {
    grid: GridDescriptor,
    no_data: Float,
    dtype: DataType,
    sum: Array2<Float>,
    count: Array2<u32>,
    members: usize,
}

impl MeanAccumulator {
    /// Starts the mean with its first member, which sets the grid.
    pub fn new(first: &Raster) -> Self {
        let grid = first.grid();
        let shape = (grid.height, grid.width);

        let dtype = if first.dtype.is_integer() {
            DataType::Float64
        } else {
            first.dtype
        };

        let mut mean = MeanAccumulator {
            grid,
            no_data: first.no_data,
            dtype,
            sum: Array2::zeros(shape),
            count: Array2::zeros(shape),
            members: 0,
        };

        mean.accumulate(first);
        mean
    }

    pub fn add(&mut self, member: &Raster) -> Result<(), AlignmentError> {
        self.grid.check_aligned(&member.grid())?;
        self.accumulate(member);
        Ok(())
    }

    pub fn members(&self) -> usize {
        self.members
    }

    pub fn finish(self) -> Raster {
        let no_data = self.no_data;
        let dtype = self.dtype;

        let data = Zip::from(&self.sum)
            .and(&self.count)
            .par_map_collect(|&sum, &count| {
                if count > 0 {
                    dtype.cast(sum / Float::from(count))
                } else {
                    no_data
                }
            });

        Raster {
            data,
            transform: self.grid.transform,
            crs: self.grid.crs,
            no_data,
            dtype,
        }
    }

    fn accumulate(&mut self, member: &Raster) {
        Zip::from(&mut self.sum)
            .and(&mut self.count)
            .and(&member.data)
            .par_for_each(|sum, count, &value| {
                if !member.is_no_data(value) {
                    *sum += value;
                    *count += 1;
                }
            });

        self.members += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::tests::sample_raster;
    use float_cmp::approx_eq;
    use ndarray::array;

    #[test]
    fn missing_members_are_skipped() {
        let series = vec![
            sample_raster(array![[Float::NAN, 1.0]]),
            sample_raster(array![[2.0, 2.0]]),
            sample_raster(array![[4.0, 3.0]]),
        ];

        let mean = mean_over(&series, Dimension::Time).unwrap();

        assert!(approx_eq!(Float, mean.data[[0, 0]], 3.0));
        assert!(approx_eq!(Float, mean.data[[0, 1]], 2.0));
    }

    #[test]
    fn all_missing_stays_missing() {
        let series = vec![
            sample_raster(array![[Float::NAN, 1.0]]),
            sample_raster(array![[Float::NAN, 5.0]]),
        ];

        let mean = mean_over(&series, Dimension::Ensemble).unwrap();

        assert_eq!(mean.value(0, 0), None);
        assert_eq!(mean.value(0, 1), Some(3.0));
    }

    #[test]
    fn misaligned_member_is_rejected() {
        let mut shifted = sample_raster(array![[1.0, 1.0]]);
        shifted.transform.origin_x = 0.5;

        let series = vec![sample_raster(array![[1.0, 1.0]]), shifted];

        assert!(matches!(
            mean_over(&series, Dimension::Time),
            Err(AlignmentError::GridMismatch { .. })
        ));
    }

    #[test]
    fn empty_series_is_rejected() {
        assert!(matches!(
            mean_over(&[], Dimension::Time),
            Err(AlignmentError::EmptySeries)
        ));
    }

    #[test]
    fn integer_series_is_averaged_as_float() {
        let mut a = sample_raster(array![[1.0]]);
        let mut b = sample_raster(array![[2.0]]);
        a.dtype = DataType::Int16;
        b.dtype = DataType::Int16;

        let mean = mean_over(&[a, b], Dimension::Time).unwrap();

        assert_eq!(mean.dtype, DataType::Float64);
        assert_eq!(mean.value(0, 0), Some(1.5));
    }

    #[test]
    fn running_mean_matches_series_mean() {
        let series = vec![
            sample_raster(array![[Float::NAN, 1.0, 7.0]]),
            sample_raster(array![[2.0, Float::NAN, 8.0]]),
            sample_raster(array![[4.0, 3.0, 9.0]]),
        ];

        let mut running = MeanAccumulator::new(&series[0]);
        for member in &series[1..] {
            running.add(member).unwrap();
        }
        assert_eq!(running.members(), 3);

        let running = running.finish();
        let mean = mean_over(&series, Dimension::Ensemble).unwrap();

        assert_eq!(running.grid(), mean.grid());
        for col in 0..3 {
            assert_eq!(running.value(0, col), mean.value(0, col));
        }
        assert_eq!(running.value(0, 1), Some(2.0));
    }

    #[test]
    fn running_mean_rejects_misaligned_member() {
        let mut running = MeanAccumulator::new(&sample_raster(array![[1.0, 1.0]]));

        assert!(matches!(
            running.add(&sample_raster(array![[1.0, 1.0, 1.0]])),
            Err(AlignmentError::GridMismatch { .. })
        ));
        assert_eq!(running.members(), 1);
    }
}
