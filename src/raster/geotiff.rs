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

//! Writing rasters as single-band GeoTIFF files.
//!
//! Georeferencing is stored with the ModelPixelScale, ModelTiepoint
//! and GeoKeyDirectory tags, no-data sentinel with the GDAL_NODATA
//! tag, so the files can be read by any GDAL based tool.

use super::{DataType, Raster};
use crate::errors::OutputError;
use crate::Float;
use log::debug;
use std::{fs::File, io::BufWriter, path::Path};
use tiff::encoder::{colortype, colortype::ColorType, TiffEncoder, TiffValue};
use tiff::tags::Tag;

const MODEL_PIXEL_SCALE: u16 = 33550;
const MODEL_TIEPOINT: u16 = 33922;
const GEO_KEY_DIRECTORY: u16 = 34735;
const GDAL_NODATA: u16 = 42113;

/// Writes the raster into the file, the sample format
/// follows the raster storage type.
pub fn write(file_path: &Path, raster: &Raster) -> Result<(), OutputError> {
    debug!(
        "Writing {:?} raster {}x{} to {}",
        raster.dtype,
        raster.width(),
        raster.height(),
        file_path.display()
    );

    let file = BufWriter::new(File::create(file_path)?);
    let mut encoder = TiffEncoder::new(file)?;

    match raster.dtype {
        DataType::Int16 => {
            let data: Vec<i16> = raster.data.iter().map(|v| *v as i16).collect();
            write_image::<colortype::GrayI16, _>(&mut encoder, raster, &data)
        }
        DataType::Float32 => {
            let data: Vec<f32> = raster.data.iter().map(|v| *v as f32).collect();
            write_image::<colortype::Gray32Float, _>(&mut encoder, raster, &data)
        }
        DataType::Float64 => {
            let data: Vec<f64> = raster.data.iter().copied().collect();
            write_image::<colortype::Gray64Float, _>(&mut encoder, raster, &data)
        }
    }
}

fn write_image<C, W>(
    encoder: &mut TiffEncoder<W>,
    raster: &Raster,
    data: &[C::Inner],
) -> Result<(), OutputError>
where
    C: ColorType,
    [C::Inner]: TiffValue,
    W: std::io::Write + std::io::Seek,
{
    let mut image = encoder.new_image::<C>(raster.width() as u32, raster.height() as u32)?;
    let t = &raster.transform;

    let pixel_scale = [t.pixel_width, t.pixel_height.abs(), 0.0];
    let tiepoint = [0.0, 0.0, 0.0, t.origin_x, t.origin_y, 0.0];

    image
        .encoder()
        .write_tag(Tag::Unknown(MODEL_PIXEL_SCALE), &pixel_scale[..])?;
    image
        .encoder()
        .write_tag(Tag::Unknown(MODEL_TIEPOINT), &tiepoint[..])?;

    if let Some(epsg) = raster.crs.epsg() {
        image
            .encoder()
            .write_tag(Tag::Unknown(GEO_KEY_DIRECTORY), &geo_keys(epsg)[..])?;
    }

    image
        .encoder()
        .write_tag(Tag::Unknown(GDAL_NODATA), format_no_data(raster.no_data).as_str())?;

    image.write_data(data)?;

    Ok(())
}

/// GeoKey directory of a geographic, pixel-is-area raster
/// in the reference system with given EPSG code.
fn geo_keys(epsg: u16) -> [u16; 16] {
    [
        1, 1, 0, 3, // header: version, revision, key count
        1024, 0, 1, 2, // GTModelType: geographic
        1025, 0, 1, 1, // GTRasterType: pixel is area
        2048, 0, 1, epsg, // GeographicType
    ]
}

fn format_no_data(no_data: Float) -> String {
    if no_data.is_nan() {
        "nan".to_string()
    } else {
        no_data.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::tests::sample_raster;
    use ndarray::array;
    use tiff::decoder::{Decoder, DecodingResult};

    #[test]
    fn writes_categorical_raster() {
        let mut raster = sample_raster(array![[1.0, 9999.0, 3.0], [8.0, 9.0, 9999.0]]);
        raster.dtype = DataType::Int16;
        raster.no_data = 9999.0;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("risk.tif");
        write(&path, &raster).unwrap();

        let mut decoder = Decoder::new(File::open(&path).unwrap()).unwrap();
        assert_eq!(decoder.dimensions().unwrap(), (3, 2));

        let scale = decoder
            .get_tag_f64_vec(Tag::Unknown(MODEL_PIXEL_SCALE))
            .unwrap();
        assert_eq!(scale, vec![1.0, 1.0, 0.0]);

        let tiepoint = decoder.get_tag_f64_vec(Tag::Unknown(MODEL_TIEPOINT)).unwrap();
        assert_eq!(tiepoint[3], 0.0);
        assert_eq!(tiepoint[4], 10.0);

        let no_data = decoder.get_tag_ascii_string(Tag::Unknown(GDAL_NODATA)).unwrap();
        assert_eq!(no_data.trim_end_matches('\0'), "9999");

        match decoder.read_image().unwrap() {
            DecodingResult::I16(values) => assert_eq!(values, vec![1, 9999, 3, 8, 9, 9999]),
            _ => panic!("unexpected sample format"),
        }
    }

    #[test]
    fn writes_float_raster() {
        let raster = sample_raster(array![[0.5, Float::NAN]]);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("humidity.tif");
        write(&path, &raster).unwrap();

        let mut decoder = Decoder::new(File::open(&path).unwrap()).unwrap();

        match decoder.read_image().unwrap() {
            DecodingResult::F32(values) => {
                assert_eq!(values[0], 0.5);
                assert!(values[1].is_nan());
            }
            _ => panic!("unexpected sample format"),
        }
    }
}
