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

//! Meningitis Environmental Risk System (MERIS) computes weekly
//! maps of meningitis outbreak risk over Africa.
//!
//! Temperature, relative humidity and surface dust concentration
//! forecasts are averaged over each forecast week, brought onto
//! a common grid and classified into nine risk categories.
//! The resulting maps are written as GeoTIFF files and registered
//! for display in the web application.

mod classifier;
mod constants;
mod errors;
mod pipeline;
mod raster;
mod sources;

use cap::Cap;
use env_logger::Env;
use log::{error, info};
use std::alloc;

type Float = f64;

/// Global allocator used by the pipeline.
///
/// Use of static global allocator allows for capping the memory to the limit set by user
/// in configuration file and in effect provide better OOM error handling.
#[global_allocator]
static ALLOCATOR: Cap<alloc::System> = Cap::new(alloc::System, usize::MAX);

/// The main program function.
/// Prepares the runtime environment and calls the [`pipeline::main`].
///
/// To provide meaningful error messages the `env_logger`
/// needs to be initiated before any log messages are possible to occur.
fn main() {
    #[cfg(not(feature = "debug"))]
    let logger_env = Env::new().filter_or("MERIS_LOG_LEVEL", "info");

    #[cfg(feature = "debug")]
    let logger_env = Env::new().filter_or("MERIS_LOG_LEVEL", "debug");

    env_logger::Builder::from_env(logger_env)
        .format_timestamp_millis()
        .init();

    match pipeline::main() {
        Ok(_) => info!("Pipeline execution finished. Check the output directory and log."),
        Err(err) => {
            error!("Pipeline execution failed with error: {}", err);
            std::process::exit(1);
        }
    }
}
