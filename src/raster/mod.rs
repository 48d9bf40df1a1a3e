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

//! Module containing the in-memory raster representation and
//! all grid operations performed on it.
//!
//! Every operation takes rasters by reference and returns a fresh
//! [`Raster`], so intermediate results of one stage can be dropped
//! as soon as the next stage consumed them.

pub mod adapter;
pub mod aggregate;
pub mod boundary;
pub mod clip;
pub mod geotiff;
pub mod resample;
pub mod units;

use crate::constants::{GRID_TOLERANCE, WGS84_EPSG};
use crate::errors::AlignmentError;
use crate::Float;
use float_cmp::approx_eq;
use log::debug;
use ndarray::{s, Array2};
use std::fmt;

/// Tolerance for snapping window edges to pixel edges.
const EDGE_SNAP: Float = 1.0e-6;

/// Numeric storage type of raster samples.
///
/// Samples are always held as [`Float`] in memory, the storage
/// type decides how results of arithmetic are truncated and
/// how the raster is written to disk.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum DataType {
    Int16,
    Float32,
    Float64,
}

impl DataType {
    /// Casts the value to the storage type, truncating
    /// towards zero and saturating for integer types.
    pub fn cast(self, value: Float) -> Float {
        match self {
            DataType::Int16 => Float::from(value as i16),
            DataType::Float32 => Float::from(value as f32),
            DataType::Float64 => value,
        }
    }

    pub fn is_integer(self) -> bool {
        matches!(self, DataType::Int16)
    }
}

/// Coordinate reference system identifier in `AUTHORITY:CODE` form.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct Crs(String);

impl Crs {
    pub fn new(identifier: &str) -> Self {
        Crs(identifier.to_uppercase())
    }

    pub fn wgs84() -> Self {
        Crs::new(&format!("EPSG:{}", WGS84_EPSG))
    }

    /// EPSG code of the system, if it is identified by one.
    pub fn epsg(&self) -> Option<u16> {
        self.0.strip_prefix("EPSG:")?.parse().ok()
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// North-up affine geotransform without rotation terms.
///
/// `pixel_height` is negative for north-up grids, so the origin
/// is the north-west corner of the top-left pixel.
#[derive(Copy, Clone, PartialEq, Debug)]
pub struct GeoTransform {
    pub origin_x: Float,
    pub pixel_width: Float,
    pub origin_y: Float,
    pub pixel_height: Float,
}

impl GeoTransform {
    /// Coordinates of the centre of the pixel.
    pub fn pixel_centre(&self, row: usize, col: usize) -> (Float, Float) {
        (
            self.origin_x + (col as Float + 0.5) * self.pixel_width,
            self.origin_y + (row as Float + 0.5) * self.pixel_height,
        )
    }

    /// Fractional (column, row) position of the point in pixel space.
    pub fn pixel_position(&self, x: Float, y: Float) -> (Float, Float) {
        (
            (x - self.origin_x) / self.pixel_width,
            (y - self.origin_y) / self.pixel_height,
        )
    }

    fn approx_eq(&self, other: &GeoTransform) -> bool {
        approx_eq!(Float, self.origin_x, other.origin_x, epsilon = GRID_TOLERANCE)
            && approx_eq!(Float, self.origin_y, other.origin_y, epsilon = GRID_TOLERANCE)
            && approx_eq!(Float, self.pixel_width, other.pixel_width, epsilon = GRID_TOLERANCE)
            && approx_eq!(Float, self.pixel_height, other.pixel_height, epsilon = GRID_TOLERANCE)
    }
}

/// Geographic bounding box.
#[derive(Copy, Clone, PartialEq, Debug)]
pub struct Bounds {
    pub west: Float,
    pub south: Float,
    pub east: Float,
    pub north: Float,
}

impl Bounds {
    pub fn intersection(&self, other: &Bounds) -> Option<Bounds> {
        let intersection = Bounds {
            west: self.west.max(other.west),
            south: self.south.max(other.south),
            east: self.east.min(other.east),
            north: self.north.min(other.north),
        };

        if intersection.west < intersection.east && intersection.south < intersection.north {
            Some(intersection)
        } else {
            None
        }
    }
}

/// Geometry of a raster without its samples, used as
/// an alignment target and for alignment checks.
#[derive(Clone, PartialEq, Debug)]
pub struct GridDescriptor {
    pub width: usize,
    pub height: usize,
    pub transform: GeoTransform,
    pub crs: Crs,
}

impl GridDescriptor {
    /// Extent of the grid computed from the origin and
    /// pixel counts, as `[west, south, east, north]`.
    pub fn bounds(&self) -> Bounds {
        let t = &self.transform;

        Bounds {
            west: t.origin_x,
            south: t.origin_y - self.height as Float * t.pixel_height.abs(),
            east: t.origin_x + self.width as Float * t.pixel_width,
            north: t.origin_y,
        }
    }

    /// Two grids are aligned when they have the same dimensions, reference
    /// system and geotransform (within [`GRID_TOLERANCE`]).
    pub fn is_aligned_with(&self, other: &GridDescriptor) -> bool {
        self.width == other.width
            && self.height == other.height
            && self.crs == other.crs
            && self.transform.approx_eq(&other.transform)
    }

    pub fn check_aligned(&self, other: &GridDescriptor) -> Result<(), AlignmentError> {
        if self.is_aligned_with(other) {
            return Ok(());
        }

        Err(AlignmentError::GridMismatch {
            expected: self.to_string(),
            found: other.to_string(),
        })
    }
}

impl fmt::Display for GridDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let t = &self.transform;
        write!(
            f,
            "{}x{} @ ({:.4}, {:.4}) res ({:.4}, {:.4}) {}",
            self.width, self.height, t.origin_x, t.origin_y, t.pixel_width, t.pixel_height, self.crs
        )
    }
}

/// Single-band georeferenced raster.
///
/// Samples are stored as `(rows, columns)` array with the first row
/// being the northernmost one. Every sample is either a valid value
/// or exactly the `no_data` sentinel.
#[derive(Clone, Debug)]
pub struct Raster {
    pub data: Array2<Float>,
    pub transform: GeoTransform,
    pub crs: Crs,
    pub no_data: Float,
    pub dtype: DataType,
}

impl Raster {
    /// Raster constructor. Samples that are `NaN` are
    /// replaced with the `no_data` sentinel.
    pub fn new(
        data: Array2<Float>,
        transform: GeoTransform,
        crs: Crs,
        no_data: Float,
        dtype: DataType,
    ) -> Self {
        let data = if no_data.is_nan() {
            data
        } else {
            data.mapv(|v| if v.is_nan() { no_data } else { v })
        };

        Raster {
            data,
            transform,
            crs,
            no_data,
            dtype,
        }
    }

    /// Creates a raster on the grid with every pixel set to `value`.
    pub fn filled(grid: &GridDescriptor, value: Float, no_data: Float, dtype: DataType) -> Self {
        Raster {
            data: Array2::from_elem((grid.height, grid.width), value),
            transform: grid.transform,
            crs: grid.crs.clone(),
            no_data,
            dtype,
        }
    }

    pub fn width(&self) -> usize {
        self.data.ncols()
    }

    pub fn height(&self) -> usize {
        self.data.nrows()
    }

    pub fn grid(&self) -> GridDescriptor {
        GridDescriptor {
            width: self.width(),
            height: self.height(),
            transform: self.transform,
            crs: self.crs.clone(),
        }
    }

    pub fn is_no_data(&self, value: Float) -> bool {
        value.is_nan() || value == self.no_data
    }

    /// Returns the sample at the position or `None` if it is no-data.
    pub fn value(&self, row: usize, col: usize) -> Option<Float> {
        let value = *self.data.get((row, col))?;

        if self.is_no_data(value) {
            None
        } else {
            Some(value)
        }
    }

    pub fn valid_count(&self) -> usize {
        self.data.iter().filter(|v| !self.is_no_data(**v)).count()
    }

    /// Crops the raster to the smallest pixel window covering `bounds`.
    ///
    /// Bounds closer than [`EDGE_SNAP`] to a pixel edge snap to it.
    /// Returns `None` when the window has no pixels.
    pub fn crop(&self, bounds: &Bounds) -> Option<Raster> {
        let t = self.transform;
        let (width, height) = (self.width() as Float, self.height() as Float);

        let (west, north) = t.pixel_position(bounds.west, bounds.north);
        let (east, south) = t.pixel_position(bounds.east, bounds.south);

        let col_start = (west + EDGE_SNAP).floor().clamp(0.0, width) as usize;
        let col_end = (east - EDGE_SNAP).ceil().clamp(0.0, width) as usize;
        let row_start = (north + EDGE_SNAP).floor().clamp(0.0, height) as usize;
        let row_end = (south - EDGE_SNAP).ceil().clamp(0.0, height) as usize;

        if col_start >= col_end || row_start >= row_end {
            return None;
        }

        debug!(
            "Cropping to window rows {}..{} cols {}..{}",
            row_start, row_end, col_start, col_end
        );

        let transform = GeoTransform {
            origin_x: t.origin_x + col_start as Float * t.pixel_width,
            pixel_width: t.pixel_width,
            origin_y: t.origin_y + row_start as Float * t.pixel_height,
            pixel_height: t.pixel_height,
        };

        Some(Raster {
            data: self
                .data
                .slice(s![row_start..row_end, col_start..col_end])
                .to_owned(),
            transform,
            crs: self.crs.clone(),
            no_data: self.no_data,
            dtype: self.dtype,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use ndarray::array;

    /// Small north-up raster with 1 degree pixels
    /// and north-west corner at (0, 10).
    pub(crate) fn sample_raster(data: Array2<Float>) -> Raster {
        Raster::new(
            data,
            GeoTransform {
                origin_x: 0.0,
                pixel_width: 1.0,
                origin_y: 10.0,
                pixel_height: -1.0,
            },
            Crs::wgs84(),
            Float::NAN,
            DataType::Float32,
        )
    }

    #[test]
    fn bounds_follow_origin_and_shape() {
        let raster = sample_raster(Array2::zeros((3, 4)));
        let bounds = raster.grid().bounds();

        assert_eq!(bounds.west, 0.0);
        assert_eq!(bounds.east, 4.0);
        assert_eq!(bounds.north, 10.0);
        assert_eq!(bounds.south, 7.0);
    }

    #[test]
    fn alignment_tolerates_rounding() {
        let a = sample_raster(Array2::zeros((2, 2))).grid();
        let mut b = a.clone();
        b.transform.origin_x += 1.0e-9;

        assert!(a.is_aligned_with(&b));

        b.transform.pixel_width = 0.5;
        assert!(matches!(
            a.check_aligned(&b),
            Err(AlignmentError::GridMismatch { .. })
        ));
    }

    #[test]
    fn nan_becomes_sentinel() {
        let raster = Raster::new(
            array![[1.0, Float::NAN]],
            sample_raster(Array2::zeros((1, 1))).transform,
            Crs::wgs84(),
            -9999.0,
            DataType::Float64,
        );

        assert_eq!(raster.data[[0, 1]], -9999.0);
        assert_eq!(raster.value(0, 1), None);
        assert_eq!(raster.valid_count(), 1);
    }

    #[test]
    fn integer_cast_truncates() {
        assert_eq!(DataType::Int16.cast(27.9), 27.0);
        assert_eq!(DataType::Int16.cast(-3.7), -3.0);
        assert_eq!(DataType::Int16.cast(1.0e6), Float::from(i16::MAX));
        assert_eq!(DataType::Float32.cast(0.1), Float::from(0.1_f32));
    }

    #[test]
    fn crop_snaps_to_pixel_edges() {
        let raster = sample_raster(Array2::from_shape_fn((10, 10), |(r, c)| (r * 10 + c) as Float));

        let cropped = raster
            .crop(&Bounds {
                west: 2.0,
                south: 4.5,
                east: 4.0 + 1.0e-9,
                north: 8.0,
            })
            .unwrap();

        assert_eq!((cropped.height(), cropped.width()), (4, 2));
        assert_eq!(cropped.value(0, 0), Some(22.0));
        assert_eq!(cropped.transform.origin_y, 8.0);

        let outside = Bounds {
            west: 20.0,
            south: 0.0,
            east: 30.0,
            north: 5.0,
        };
        assert!(raster.crop(&outside).is_none());
    }

    #[test]
    fn crs_epsg_code() {
        assert_eq!(Crs::wgs84().epsg(), Some(4326));
        assert_eq!(Crs::new("esri:102022").epsg(), None);
    }
}
