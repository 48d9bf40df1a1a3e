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

//! Resampling of rasters onto a reference grid.
//!
//! The output always has exactly the origin, resolution and
//! dimensions of the reference grid. Output pixels are sampled
//! at their centres, pixels falling outside the source extent or
//! sampling only no-data become no-data.
//!
//! Source pixels that were masked by clipping stay masked after
//! resampling, so when the source grid is coarser than the reference
//! some pixels along the boundary are no-data even though the
//! reference has a valid value there.

use super::{GridDescriptor, Raster};
use crate::errors::AlignmentError;
use crate::Float;
use log::debug;
use ndarray::{Array2, Zip};
use serde::Deserialize;

/// Sampling method used when the grids differ.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResampleMethod {
    Nearest,
    Bilinear,
}

impl Default for ResampleMethod {
    fn default() -> Self {
        ResampleMethod::Nearest
    }
}

/// Resamples `source` onto the `reference` grid.
///
/// Both grids must use the same reference system,
/// no reprojection is performed.
pub fn resample_to(
    source: &Raster,
    reference: &GridDescriptor,
    method: ResampleMethod,
) -> Result<Raster, AlignmentError> {
    if source.crs != reference.crs {
        return Err(AlignmentError::CrsMismatch(
            source.crs.to_string(),
            reference.crs.to_string(),
        ));
    }

    if source.grid().is_aligned_with(reference) {
        debug!("Source already on the reference grid");
        let mut aligned = source.clone();
        aligned.transform = reference.transform;
        return Ok(aligned);
    }

    debug!(
        "Resampling {} onto {} with {:?}",
        source.grid(),
        reference,
        method
    );

    let mut data = Array2::from_elem((reference.height, reference.width), source.no_data);

    Zip::indexed(&mut data).par_for_each(|(row, col), v| {
        let (x, y) = reference.transform.pixel_centre(row, col);

        let sampled = match method {
            ResampleMethod::Nearest => sample_nearest(source, x, y),
            ResampleMethod::Bilinear => sample_bilinear(source, x, y),
        };

        if let Some(sampled) = sampled {
            *v = source.dtype.cast(sampled);
        }
    });

    Ok(Raster {
        data,
        transform: reference.transform,
        crs: reference.crs.clone(),
        no_data: source.no_data,
        dtype: source.dtype,
    })
}

fn sample_nearest(source: &Raster, x: Float, y: Float) -> Option<Float> {
    let (col, row) = source.transform.pixel_position(x, y);

    if col < 0.0 || row < 0.0 {
        return None;
    }

    source.value(row.floor() as usize, col.floor() as usize)
}

/// Interpolates between four closest pixel centres. Positions
/// between the extent edge and the outermost centres are clamped
/// to the edge pixels. Any no-data neighbour gives no-data.
fn sample_bilinear(source: &Raster, x: Float, y: Float) -> Option<Float> {
    let (col, row) = source.transform.pixel_position(x, y);
    let (width, height) = (source.width() as Float, source.height() as Float);

    if col < 0.0 || row < 0.0 || col >= width || row >= height {
        return None;
    }

    let col = (col - 0.5).clamp(0.0, width - 1.0);
    let row = (row - 0.5).clamp(0.0, height - 1.0);

    let c0 = col.floor() as usize;
    let r0 = row.floor() as usize;
    let c1 = (c0 + 1).min(source.width() - 1);
    let r1 = (r0 + 1).min(source.height() - 1);

    let dx = col - c0 as Float;
    let dy = row - r0 as Float;

    let v00 = source.value(r0, c0)?;
    let v01 = source.value(r0, c1)?;
    let v10 = source.value(r1, c0)?;
    let v11 = source.value(r1, c1)?;

    let top = v00 * (1.0 - dx) + v01 * dx;
    let bottom = v10 * (1.0 - dx) + v11 * dx;

    Some(top * (1.0 - dy) + bottom * dy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::boundary::BoundaryPolygonSet;
    use crate::raster::clip::{clip, NoOverlapPolicy};
    use crate::raster::tests::sample_raster;
    use crate::raster::{Crs, GeoTransform};
    use float_cmp::approx_eq;
    use geo::{LineString, Polygon};

    fn grid(origin_x: Float, origin_y: Float, res: Float, width: usize, height: usize) -> GridDescriptor {
        GridDescriptor {
            width,
            height,
            transform: GeoTransform {
                origin_x,
                pixel_width: res,
                origin_y,
                pixel_height: -res,
            },
            crs: Crs::wgs84(),
        }
    }

    fn gradient(width: usize, height: usize) -> Raster {
        sample_raster(Array2::from_shape_fn((height, width), |(r, c)| (r * 100 + c) as Float))
    }

    #[test]
    fn output_matches_reference_grid() {
        let reference = grid(0.5, 9.5, 0.5, 12, 10);
        let resampled = resample_to(&gradient(10, 10), &reference, ResampleMethod::Nearest).unwrap();

        assert_eq!(resampled.grid(), reference);
        // centre (0.75, 9.25) lies in source pixel (0, 0)
        assert_eq!(resampled.value(0, 0), Some(0.0));
        // centre (1.25, 9.25) lies in source pixel (0, 1)
        assert_eq!(resampled.value(0, 1), Some(1.0));
    }

    #[test]
    fn resampling_is_idempotent() {
        let reference = grid(-1.0, 11.0, 0.3125, 40, 44);
        let source = gradient(10, 10);

        let once = resample_to(&source, &reference, ResampleMethod::Nearest).unwrap();
        let twice = resample_to(&once, &reference, ResampleMethod::Nearest).unwrap();

        assert_eq!(once.grid(), twice.grid());
        Zip::from(&once.data).and(&twice.data).for_each(|a, b| {
            assert!((a.is_nan() && b.is_nan()) || a == b);
        });
    }

    #[test]
    fn outside_source_extent_is_no_data() {
        let reference = grid(-2.0, 12.0, 1.0, 14, 14);
        let resampled = resample_to(&gradient(10, 10), &reference, ResampleMethod::Nearest).unwrap();

        assert_eq!(resampled.value(0, 0), None);
        assert_eq!(resampled.value(2, 2), Some(0.0));
        assert_eq!(resampled.value(13, 13), None);
        assert_eq!(resampled.valid_count(), 100);
    }

    #[test]
    fn clipped_coarse_source_leaves_border_gaps() {
        let strip = Polygon::new(
            LineString::from(vec![(0.0, 0.0), (3.0, 0.0), (3.0, 10.0), (0.0, 10.0), (0.0, 0.0)]),
            vec![],
        );
        let boundary = BoundaryPolygonSet::new(vec![strip]).unwrap();

        let mut coarse = sample_raster(Array2::from_elem((5, 5), 1.0));
        coarse.transform.pixel_width = 2.0;
        coarse.transform.pixel_height = -2.0;
        let coarse = clip(&coarse, &boundary, NoOverlapPolicy::Error).unwrap();

        let fine = clip(&sample_raster(Array2::from_elem((10, 10), 1.0)), &boundary, NoOverlapPolicy::Error).unwrap();
        let reference = fine.grid();

        let resampled = resample_to(&coarse, &reference, ResampleMethod::Nearest).unwrap();

        // reference column 2 (centre 2.5) is valid in the fine raster
        // but falls into the masked coarse pixel centred at 3.0
        assert!(fine.value(0, 2).is_some());
        assert_eq!(resampled.value(0, 2), None);
        assert_eq!(resampled.value(0, 1), Some(1.0));
    }

    #[test]
    fn bilinear_reproduces_linear_field() {
        let source = sample_raster(Array2::from_shape_fn((10, 10), |(_, c)| c as Float));
        let reference = grid(1.0, 9.0, 0.5, 12, 12);

        let resampled = resample_to(&source, &reference, ResampleMethod::Bilinear).unwrap();

        // centre x = 1.25 lies 0.75 past centre of column 0
        assert!(approx_eq!(Float, resampled.value(0, 0).unwrap(), 0.75, epsilon = 1.0e-6));
        assert!(approx_eq!(Float, resampled.value(5, 5).unwrap(), 3.25, epsilon = 1.0e-6));
    }

    #[test]
    fn different_crs_is_rejected() {
        let mut reference = grid(0.0, 10.0, 1.0, 10, 10);
        reference.crs = Crs::new("EPSG:3857");

        assert!(matches!(
            resample_to(&gradient(10, 10), &reference, ResampleMethod::Nearest),
            Err(AlignmentError::CrsMismatch(_, _))
        ));
    }
}
