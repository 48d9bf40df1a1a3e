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

//! Boundary polygons used as clipping masks.
//!
//! Boundaries are read from GeoJSON files in geographic
//! coordinates. Only polygonal geometries are accepted.

use super::Bounds;
use crate::errors::GeometryError;
use crate::Float;
use geo::{BoundingRect, Contains, Coord, LineString, Point, Polygon, Rect};
use log::debug;
use serde_json::Value;
use std::{fs, path::Path};

/// Immutable, ordered set of boundary polygons.
#[derive(Clone, Debug)]
pub struct BoundaryPolygonSet {
    polygons: Vec<(Polygon<Float>, Rect<Float>)>,
}

impl BoundaryPolygonSet {
    /// Builds the set from polygons, dropping degenerate ones.
    pub fn new(polygons: Vec<Polygon<Float>>) -> Result<Self, GeometryError> {
        let polygons: Vec<(Polygon<Float>, Rect<Float>)> = polygons
            .into_iter()
            .filter_map(|p| p.bounding_rect().map(|rect| (p, rect)))
            .collect();

        if polygons.is_empty() {
            return Err(GeometryError::EmptyBoundary);
        }

        Ok(BoundaryPolygonSet { polygons })
    }

    /// Reads polygons from GeoJSON file. FeatureCollection, Feature
    /// and bare geometry documents are accepted.
    pub fn from_geojson(file_path: &Path) -> Result<Self, GeometryError> {
        debug!("Reading boundary polygons from {}", file_path.display());

        let data = fs::read(file_path)?;
        let document: Value = serde_json::from_slice(data.as_slice())?;

        let mut polygons = vec![];
        collect_polygons(&document, &mut polygons)?;

        debug!("Read {} boundary polygons", polygons.len());

        BoundaryPolygonSet::new(polygons)
    }

    pub fn len(&self) -> usize {
        self.polygons.len()
    }

    /// Bounding box of all polygons.
    pub fn bounds(&self) -> Bounds {
        self.polygons.iter().fold(
            Bounds {
                west: Float::INFINITY,
                south: Float::INFINITY,
                east: Float::NEG_INFINITY,
                north: Float::NEG_INFINITY,
            },
            |acc, (_, rect)| Bounds {
                west: acc.west.min(rect.min().x),
                south: acc.south.min(rect.min().y),
                east: acc.east.max(rect.max().x),
                north: acc.north.max(rect.max().y),
            },
        )
    }

    /// Checks if the point lies inside any of the polygons.
    pub fn contains(&self, x: Float, y: Float) -> bool {
        let point = Point::new(x, y);

        self.polygons.iter().any(|(polygon, rect)| {
            x >= rect.min().x
                && x <= rect.max().x
                && y >= rect.min().y
                && y <= rect.max().y
                && polygon.contains(&point)
        })
    }
}

fn collect_polygons(value: &Value, polygons: &mut Vec<Polygon<Float>>) -> Result<(), GeometryError> {
    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| GeometryError::Unsupported("object without type".to_string()))?;

    match kind {
        "FeatureCollection" => {
            let features = value
                .get("features")
                .and_then(Value::as_array)
                .ok_or_else(|| GeometryError::Unsupported("collection without features".to_string()))?;

            for feature in features {
                collect_polygons(feature, polygons)?;
            }
        }
        "Feature" => {
            // features with null geometry carry no area
            if let Some(geometry) = value.get("geometry").filter(|g| !g.is_null()) {
                collect_polygons(geometry, polygons)?;
            }
        }
        "GeometryCollection" => {
            if let Some(geometries) = value.get("geometries").and_then(Value::as_array) {
                for geometry in geometries {
                    collect_polygons(geometry, polygons)?;
                }
            }
        }
        "Polygon" => {
            polygons.push(parse_polygon(coordinates(value)?)?);
        }
        "MultiPolygon" => {
            let parts = coordinates(value)?
                .as_array()
                .ok_or_else(|| GeometryError::Unsupported("malformed MultiPolygon".to_string()))?;

            for part in parts {
                polygons.push(parse_polygon(part)?);
            }
        }
        other => return Err(GeometryError::Unsupported(other.to_string())),
    }

    Ok(())
}

fn coordinates(value: &Value) -> Result<&Value, GeometryError> {
    value
        .get("coordinates")
        .ok_or_else(|| GeometryError::Unsupported("geometry without coordinates".to_string()))
}

/// Parses polygon rings, first one being the exterior.
fn parse_polygon(rings: &Value) -> Result<Polygon<Float>, GeometryError> {
    let rings = rings
        .as_array()
        .ok_or_else(|| GeometryError::Unsupported("malformed Polygon".to_string()))?;

    let mut rings = rings
        .iter()
        .map(parse_ring)
        .collect::<Result<Vec<LineString<Float>>, GeometryError>>()?;

    if rings.is_empty() {
        return Err(GeometryError::Unsupported("Polygon without rings".to_string()));
    }

    let exterior = rings.remove(0);

    Ok(Polygon::new(exterior, rings))
}

fn parse_ring(ring: &Value) -> Result<LineString<Float>, GeometryError> {
    let positions = ring
        .as_array()
        .ok_or_else(|| GeometryError::Unsupported("malformed ring".to_string()))?;

    let coords = positions
        .iter()
        .map(|position| {
            let x = position.get(0).and_then(Value::as_f64);
            let y = position.get(1).and_then(Value::as_f64);

            match (x, y) {
                (Some(x), Some(y)) => Ok(Coord { x, y }),
                _ => Err(GeometryError::Unsupported("malformed position".to_string())),
            }
        })
        .collect::<Result<Vec<Coord<Float>>, GeometryError>>()?;

    Ok(LineString::new(coords))
}
