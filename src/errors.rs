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

use crate::pipeline::Stage;
use eccodes::errors::CodesError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Error while reading config.yaml: {0}")]
    Config(#[from] ConfigError),

    #[error("Error while creating ThreadPool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("Error while loading boundary polygons: {0}")]
    Boundary(#[from] GeometryError),

    #[error("Error while preparing output directories: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cannot set the memory limit of {0} MB")]
    MemoryLimit(usize),

    #[error("Horizon {horizon} failed at stage {stage}: {source}")]
    Horizon {
        horizon: String,
        stage: Stage,
        #[source]
        source: StageError,
    },

    #[error("Risk maps were not produced for horizons: {0}")]
    HorizonsFailed(String),
}

/// Errors that can stop a single horizon run.
#[derive(Error, Debug)]
pub enum StageError {
    #[error(transparent)]
    Retrieval(#[from] RetrievalError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Geometry(#[from] GeometryError),

    #[error(transparent)]
    Alignment(#[from] AlignmentError),

    #[error(transparent)]
    Output(#[from] OutputError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot open config.yaml: {0}")]
    CantOpenFile(#[from] std::io::Error),

    #[error("Cannot deserialize config.yaml: {0}")]
    CantDeserialize(#[from] serde_yaml::Error),

    #[error("Configuration component is out of bounds {0}")]
    OutOfBounds(&'static str),
}

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("ecCodes cannot handle the grid message: {0}")]
    Codes(#[from] CodesError),

    #[error("Key {0} in the grid message has incorrect type")]
    IncorrectKeyType(&'static str),

    #[error("Grid message contains no bands")]
    NoBands,

    #[error("Band {0} requested but the message has {1} bands")]
    BandOutOfRange(usize, usize),

    #[error("Grid type {0} is not supported")]
    UnsupportedGrid(String),

    #[error("Grid values cannot be shaped into the grid: {0}")]
    Shape(#[from] ndarray::ShapeError),
}

#[derive(Error, Debug)]
pub enum GeometryError {
    #[error("Cannot open boundary file: {0}")]
    CantOpenFile(#[from] std::io::Error),

    #[error("Cannot deserialize boundary file: {0}")]
    CantDeserialize(#[from] serde_json::Error),

    #[error("Boundary geometry is not supported: {0}")]
    Unsupported(String),

    #[error("Boundary polygon set is empty")]
    EmptyBoundary,

    #[error("Boundary does not overlap the raster extent")]
    NoOverlap,
}

#[derive(Error, Debug)]
pub enum AlignmentError {
    #[error("Grids are not aligned: expected {expected}, found {found}")]
    GridMismatch { expected: String, found: String },

    #[error("Coordinate reference systems differ: {0} and {1}")]
    CrsMismatch(String, String),

    #[error("Cannot aggregate an empty raster series")]
    EmptySeries,
}

#[derive(Error, Debug)]
pub enum RetrievalError {
    #[error("NetCDF dataset cannot be read: {0}")]
    Netcdf(#[from] netcdf::Error),

    #[error("GRIB file cannot be read: {0}")]
    Codes(#[from] CodesError),

    #[error("Retrieved grid cannot be decoded: {0}")]
    Decode(#[from] DecodeError),

    #[error("Retrieved fields cannot be averaged: {0}")]
    Alignment(#[from] AlignmentError),

    #[error("Dataset does not contain {0}")]
    Missing(String),

    #[error("Dataset has no data in the requested window: {0}")]
    EmptyWindow(String),

    #[error("Time coordinate units cannot be interpreted: {0}")]
    TimeUnits(String),
}

#[derive(Error, Debug)]
pub enum OutputError {
    #[error("Cannot write GeoTIFF: {0}")]
    Tiff(#[from] tiff::TiffError),

    #[error("Cannot create output file: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Cannot read or write the catalog: {0}")]
    Csv(#[from] csv::Error),

    #[error("Cannot access the catalog file: {0}")]
    Io(#[from] std::io::Error),
}
