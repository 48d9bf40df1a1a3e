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

//! Registration of produced risk maps for the web application.

use crate::errors::CatalogError;
use log::debug;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

/// Tag of categorical rasters.
pub const CATEGORICAL: &str = "ca";

/// Store of produced raster artifacts.
pub trait ArtifactStore {
    /// Registers the raster file under the label and returns its id.
    fn register(&mut self, path: &Path, label: &str, tag: &str) -> Result<u64, CatalogError>;
}

#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: u64,
    pub name: String,
    pub datatype: String,
    pub rasterfile: String,
}

/// Catalog kept as a CSV file with one row per raster layer.
///
/// Layers are identified by name and datatype. Registering an
/// existing layer again only updates its raster file.
#[derive(Clone, Debug)]
pub struct CsvCatalog {
    path: PathBuf,
    media_root: PathBuf,
}

impl CsvCatalog {
    pub fn new(path: &Path, media_root: &Path) -> Self {
        CsvCatalog {
            path: path.to_path_buf(),
            media_root: media_root.to_path_buf(),
        }
    }

    pub fn entries(&self) -> Result<Vec<CatalogEntry>, CatalogError> {
        if !self.path.exists() {
            return Ok(vec![]);
        }

        let mut reader = csv::Reader::from_path(&self.path)?;
        let entries = reader.deserialize().collect::<Result<Vec<CatalogEntry>, _>>()?;

        Ok(entries)
    }

    fn save(&self, entries: &[CatalogEntry]) -> Result<(), CatalogError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut writer = csv::Writer::from_path(&self.path)?;

        for entry in entries {
            writer.serialize(entry)?;
        }

        writer.flush()?;

        Ok(())
    }
}

impl ArtifactStore for CsvCatalog {
    fn register(&mut self, path: &Path, label: &str, tag: &str) -> Result<u64, CatalogError> {
        let rasterfile = path
            .strip_prefix(&self.media_root)
            .unwrap_or(path)
            .to_string_lossy()
            .into_owned();

        let mut entries = self.entries()?;

        let id = match entries
            .iter_mut()
            .find(|e| e.name == label && e.datatype == tag)
        {
            Some(entry) => {
                entry.rasterfile = rasterfile;
                entry.id
            }
            None => {
                let id = entries.iter().map(|e| e.id).max().unwrap_or(0) + 1;

                entries.push(CatalogEntry {
                    id,
                    name: label.to_string(),
                    datatype: tag.to_string(),
                    rasterfile,
                });

                id
            }
        };

        self.save(&entries)?;

        debug!("Registered {} as layer {}", label, id);

        Ok(id)
    }
}
