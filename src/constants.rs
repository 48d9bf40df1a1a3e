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

//! Module containing constants used by the pipeline.

use crate::Float;

/// No-data value of the risk category rasters.
pub const RISK_NO_DATA: i16 = 9999;

/// Tolerance (in CRS units) under which two grids are considered aligned.
pub const GRID_TOLERANCE: Float = 1.0e-6;

/// EPSG code of the geographic WGS84 reference system used by all rasters.
pub const WGS84_EPSG: u16 = 4326;

/// Value used by ecCodes for missing grid points when bitmap is present.
pub const GRIB_MISSING_VALUE: Float = 9999.0;
