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

//! Adapter between GRIB messages and in-memory rasters.
//!
//! GRIB messages are read with ecCodes. Each message holds one
//! field on a regular latitude-longitude grid, so a set of messages
//! read from one file is treated as a multi-band dataset with
//! 1-based band indices.

use super::{Crs, DataType, GeoTransform, Raster};
use crate::constants::GRIB_MISSING_VALUE;
use crate::errors::DecodeError;
use crate::Float;
use chrono::{NaiveDate, NaiveDateTime};
use eccodes::codes_handle::{
    Key,
    KeyType::{self, FloatArray, Int, Str},
    KeyedMessage,
};
use log::debug;
use ndarray::{concatenate, s, Array2, Axis};

/// Packing type all messages are rewritten to by [`repack`].
pub const SIMPLE_PACKING: &str = "grid_simple";

/// Identification keys of a GRIB message.
///
/// Reading them does not unpack the message values, so
/// messages can be filtered before they are decoded.
#[derive(Clone, PartialEq, Debug)]
pub struct MessageInfo {
    pub short_name: String,
    pub level: i64,
    pub ensemble_member: i64,
    pub valid_time: NaiveDateTime,
}

/// Field decoded from a GRIB message with the grid
/// geometry needed to georeference it.
#[derive(Clone, PartialEq, Debug)]
pub struct GridMessage {
    pub info: MessageInfo,
    pub ni: usize,
    pub nj: usize,
    pub first_lon: Float,
    pub first_lat: Float,
    pub last_lon: Float,
    pub last_lat: Float,
    pub di: Float,
    pub dj: Float,
    pub i_scans_negatively: bool,
    pub j_scans_positively: bool,
    pub bitmap_present: bool,
    pub missing_value: Float,
    pub values: Vec<Float>,
}

/// Selection of bands converted from a multi-band source.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum Band {
    All,
    /// 1-based band index.
    Index(usize),
}

impl Band {
    /// Checks if the band with 1-based `index` is selected.
    pub fn selects(self, index: usize) -> bool {
        match self {
            Band::All => true,
            Band::Index(selected) => selected == index,
        }
    }

    /// Checks the selection against the number of bands in the source.
    pub fn check(self, count: usize) -> Result<(), DecodeError> {
        if count == 0 {
            return Err(DecodeError::NoBands);
        }

        match self {
            Band::Index(index) if index == 0 || index > count => {
                Err(DecodeError::BandOutOfRange(index, count))
            }
            _ => Ok(()),
        }
    }
}

/// Rewrites the message values with simple packing.
///
/// Decoded values are preserved within the precision of the
/// simple packing. Messages with packing that the rest of
/// the toolchain cannot read (eg. CCSDS) are normalised this way.
pub fn repack(mut message: KeyedMessage) -> Result<KeyedMessage, DecodeError> {
    let values = read_values(&message)?;

    message.write_key(Key {
        name: "packingType".to_string(),
        value: Str(SIMPLE_PACKING.to_string()),
    })?;

    message.write_key(Key {
        name: "values".to_string(),
        value: FloatArray(values),
    })?;

    Ok(message)
}

/// Reads the identification keys of the message.
pub fn describe(message: &KeyedMessage) -> Result<MessageInfo, DecodeError> {
    let validity_date = read_int(message, "validityDate")?;
    let validity_time = read_int(message, "validityTime")?;

    let valid_time = NaiveDate::from_ymd_opt(
        (validity_date / 10_000) as i32,
        ((validity_date / 100) % 100) as u32,
        (validity_date % 100) as u32,
    )
    .and_then(|d| d.and_hms_opt((validity_time / 100) as u32, (validity_time % 100) as u32, 0))
    .ok_or(DecodeError::IncorrectKeyType("validityDate"))?;

    Ok(MessageInfo {
        short_name: read_str(message, "shortName")?,
        level: read_int(message, "level")?,
        // deterministic forecasts have no ensemble number
        ensemble_member: read_int(message, "number").unwrap_or(0),
        valid_time,
    })
}

/// Reads the field and its grid geometry from the message.
pub fn decode(message: &KeyedMessage) -> Result<GridMessage, DecodeError> {
    let grid_type = read_str(message, "gridType")?;

    if grid_type != "regular_ll" {
        return Err(DecodeError::UnsupportedGrid(grid_type));
    }

    let missing_value = read_float(message, "missingValue").unwrap_or(GRIB_MISSING_VALUE);

    Ok(GridMessage {
        info: describe(message)?,
        ni: read_int(message, "Ni")? as usize,
        nj: read_int(message, "Nj")? as usize,
        first_lon: read_float(message, "longitudeOfFirstGridPointInDegrees")?,
        first_lat: read_float(message, "latitudeOfFirstGridPointInDegrees")?,
        last_lon: read_float(message, "longitudeOfLastGridPointInDegrees")?,
        last_lat: read_float(message, "latitudeOfLastGridPointInDegrees")?,
        di: read_float(message, "iDirectionIncrementInDegrees")?,
        dj: read_float(message, "jDirectionIncrementInDegrees")?,
        i_scans_negatively: read_int(message, "iScansNegatively")? == 1,
        j_scans_positively: read_int(message, "jScansPositively")? == 1,
        bitmap_present: read_int(message, "bitmapPresent")? == 1,
        missing_value,
        values: read_values(message)?,
    })
}

/// Converts one decoded band into a north-up raster with
/// longitudes in the -180..180 convention.
///
/// The values are moved into the raster, so the message
/// is consumed.
pub fn to_raster_grid(message: GridMessage) -> Result<Raster, DecodeError> {
    let mut values = message.values;

    if message.bitmap_present {
        let missing = message.missing_value;
        values
            .iter_mut()
            .filter(|v| **v == missing)
            .for_each(|v| *v = Float::NAN);
    }

    let mut data = Array2::from_shape_vec((message.nj, message.ni), values)?;

    if message.j_scans_positively {
        data.invert_axis(Axis(0));
    }

    if message.i_scans_negatively {
        data.invert_axis(Axis(1));
    }

    let north = message.first_lat.max(message.last_lat);
    let west = if message.i_scans_negatively {
        message.last_lon
    } else {
        message.first_lon
    };

    let (data, west) = wrap_longitudes(data, west, message.di)?;

    let transform = GeoTransform {
        origin_x: west - message.di / 2.0,
        pixel_width: message.di,
        origin_y: north + message.dj / 2.0,
        pixel_height: -message.dj,
    };

    Ok(Raster::new(
        data,
        transform,
        Crs::wgs84(),
        Float::NAN,
        DataType::Float64,
    ))
}

/// Moves grid columns from 0..360 to -180..180 longitude convention.
///
/// Returns the data and the longitude of the westernmost column centre.
/// Global grids have their eastern half rolled to the front, regional
/// grids lying fully east of 180 are only shifted.
fn wrap_longitudes(
    data: Array2<Float>,
    west: Float,
    di: Float,
) -> Result<(Array2<Float>, Float), DecodeError> {
    let width = data.ncols();
    let east = west + (width - 1) as Float * di;

    if east < 180.0 {
        return Ok((data, west));
    }

    if west >= 180.0 {
        return Ok((data, west - 360.0));
    }

    let is_global = (width as Float * di) >= 360.0 - di / 2.0;

    if !is_global {
        return Ok((data, west));
    }

    let split = ((180.0 - west) / di).ceil() as usize;
    let split = split.min(width);

    debug!("Rolling global grid by {} columns", width - split);

    let rolled = concatenate(
        Axis(1),
        &[data.slice(s![.., split..]), data.slice(s![.., ..split])],
    )?;

    Ok((rolled, west + split as Float * di - 360.0))
}

fn read_values(message: &KeyedMessage) -> Result<Vec<Float>, DecodeError> {
    match message.read_key("values")?.value {
        FloatArray(values) => Ok(values),
        // single point grids
        KeyType::Float(value) => Ok(vec![value]),
        _ => Err(DecodeError::IncorrectKeyType("values")),
    }
}

fn read_int(message: &KeyedMessage, key: &'static str) -> Result<i64, DecodeError> {
    if let Int(value) = message.read_key(key)?.value {
        Ok(value)
    } else {
        Err(DecodeError::IncorrectKeyType(key))
    }
}

fn read_float(message: &KeyedMessage, key: &'static str) -> Result<Float, DecodeError> {
    match message.read_key(key)?.value {
        KeyType::Float(value) => Ok(value),
        Int(value) => Ok(value as Float),
        _ => Err(DecodeError::IncorrectKeyType(key)),
    }
}

fn read_str(message: &KeyedMessage, key: &'static str) -> Result<String, DecodeError> {
    if let Str(value) = message.read_key(key)?.value {
        Ok(value)
    } else {
        Err(DecodeError::IncorrectKeyType(key))
    }
}
