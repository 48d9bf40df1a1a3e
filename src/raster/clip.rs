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

//! Clipping of rasters to boundary polygons.
//!
//! The raster is cropped to the pixel window covering the boundary
//! extent and every pixel whose centre lies outside the boundary
//! is set to no-data.

use super::boundary::BoundaryPolygonSet;
use super::Raster;
use crate::errors::GeometryError;
use log::debug;
use ndarray::{Axis, Zip};
use serde::Deserialize;

/// What to do when the boundary does not overlap the raster.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoOverlapPolicy {
    /// Fail with [`GeometryError::NoOverlap`].
    Error,
    /// Return the input grid with every pixel set to no-data.
    Empty,
}

impl Default for NoOverlapPolicy {
    fn default() -> Self {
        NoOverlapPolicy::Error
    }
}

/// Crops and masks the raster with the boundary.
pub fn clip(
    raster: &Raster,
    boundary: &BoundaryPolygonSet,
    policy: NoOverlapPolicy,
) -> Result<Raster, GeometryError> {
    let grid = raster.grid();

    let cropped = grid
        .bounds()
        .intersection(&boundary.bounds())
        .and_then(|overlap| raster.crop(&overlap));

    let cropped = match cropped {
        Some(cropped) => cropped,
        None => {
            return match policy {
                NoOverlapPolicy::Error => Err(GeometryError::NoOverlap),
                NoOverlapPolicy::Empty => {
                    debug!("Boundary does not overlap raster, returning empty raster");
                    Ok(Raster::filled(&grid, raster.no_data, raster.no_data, raster.dtype))
                }
            };
        }
    };

    let transform = cropped.transform;
    let mut data = cropped.data;
    let no_data = raster.no_data;

    Zip::indexed(&mut data).par_for_each(|(row, col), v| {
        let (x, y) = transform.pixel_centre(row, col);

        if !boundary.contains(x, y) {
            *v = no_data;
        }
    });

    let clipped = Raster {
        data,
        transform,
        crs: raster.crs.clone(),
        no_data,
        dtype: raster.dtype,
    };

    debug!(
        "Clipped raster has {} valid pixels in {} rows",
        clipped.valid_count(),
        clipped.data.len_of(Axis(0))
    );

    Ok(clipped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::boundary::tests::square;
    use crate::raster::tests::sample_raster;
    use crate::Float;
    use geo::{LineString, Polygon};
    use ndarray::Array2;

    fn ten_by_ten() -> Raster {
        sample_raster(Array2::from_shape_fn((10, 10), |(r, c)| (r * 10 + c) as Float))
    }

    #[test]
    fn crops_to_boundary_extent() {
        let boundary = BoundaryPolygonSet::new(vec![square(2.0, 2.0, 3.0)]).unwrap();
        let clipped = clip(&ten_by_ten(), &boundary, NoOverlapPolicy::Error).unwrap();

        assert_eq!(clipped.width(), 3);
        assert_eq!(clipped.height(), 3);
        assert_eq!(clipped.transform.origin_x, 2.0);
        assert_eq!(clipped.transform.origin_y, 5.0);
        assert_eq!(clipped.valid_count(), 9);
        // top-left pixel of the window is row 5, col 2 of the input
        assert_eq!(clipped.value(0, 0), Some(52.0));
    }

    #[test]
    fn masks_pixels_outside_polygon() {
        let triangle = Polygon::new(
            LineString::from(vec![(0.0, 0.0), (10.0, 0.0), (0.0, 10.0), (0.0, 0.0)]),
            vec![],
        );
        let boundary = BoundaryPolygonSet::new(vec![triangle]).unwrap();
        let clipped = clip(&ten_by_ten(), &boundary, NoOverlapPolicy::Error).unwrap();

        assert_eq!(clipped.grid(), ten_by_ten().grid());
        // south-west corner pixel centre (0.5, 0.5) is inside
        assert!(clipped.value(9, 0).is_some());
        // north-east corner pixel centre (9.5, 9.5) is outside
        assert_eq!(clipped.value(0, 9), None);
        // centres on the hypotenuse are not inside
        assert_eq!(clipped.value(0, 0), None);
        assert_eq!(clipped.valid_count(), 45);
    }

    #[test]
    fn boundary_larger_than_raster_keeps_raster_extent() {
        let boundary = BoundaryPolygonSet::new(vec![square(-5.0, -5.0, 30.0)]).unwrap();
        let clipped = clip(&ten_by_ten(), &boundary, NoOverlapPolicy::Error).unwrap();

        assert_eq!(clipped.grid(), ten_by_ten().grid());
        assert_eq!(clipped.valid_count(), 100);
    }

    #[test]
    fn no_overlap_follows_policy() {
        let boundary = BoundaryPolygonSet::new(vec![square(50.0, 50.0, 1.0)]).unwrap();

        assert!(matches!(
            clip(&ten_by_ten(), &boundary, NoOverlapPolicy::Error),
            Err(GeometryError::NoOverlap)
        ));

        let empty = clip(&ten_by_ten(), &boundary, NoOverlapPolicy::Empty).unwrap();
        assert_eq!(empty.grid(), ten_by_ten().grid());
        assert_eq!(empty.valid_count(), 0);
    }
}
