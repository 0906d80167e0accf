//! Test-only, in-memory store implementations used by unit and behaviour
//! tests.

use std::collections::{HashMap, HashSet};

use geo::{Coord, LineString, MultiPolygon, Polygon};

use crate::schema::{AttributeSchema, AttributeVector};
use crate::store::{AttributeStore, GeometryStore, JoinSummary, StoreError, ensure_width};

/// Tagged point held by [`MemoryGeoStore`].
#[derive(Debug, Clone, PartialEq)]
pub struct PointRow {
    /// Point location.
    pub location: Coord<f64>,
    /// Source timestamp.
    pub timestamp: Option<String>,
    /// Projected attributes.
    pub attributes: AttributeVector,
}

/// Appended way or relation attribute row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeRow {
    /// Element identifier.
    pub id: String,
    /// Source timestamp.
    pub timestamp: Option<String>,
    /// Projected attributes.
    pub attributes: AttributeVector,
}

/// Multipolygon row held by [`MemoryGeoStore`].
#[derive(Debug, Clone, PartialEq)]
pub struct MultipolygonRow {
    /// Relation identifier.
    pub id: String,
    /// Source timestamp.
    pub timestamp: Option<String>,
    /// Projected attributes.
    pub attributes: AttributeVector,
    /// Assembled geometry, `None` until assembly ran.
    pub geometry: Option<MultiPolygon<f64>>,
}

/// In-memory geometry and attribute store.
///
/// Mirrors the replace semantics of the SQLite store: replacing a
/// multipolygon moves it to the end of the insertion order.
#[derive(Debug, Default)]
pub struct MemoryGeoStore {
    way_width: usize,
    relation_width: usize,
    /// Tagged points with their attributes.
    pub points: HashMap<String, PointRow>,
    /// Line geometries by way identifier.
    pub lines: HashMap<String, LineString<f64>>,
    /// Polygon geometries by way identifier.
    pub polygons: HashMap<String, Polygon<f64>>,
    /// Multipolygon rows in insertion order.
    pub multipolygons: Vec<MultipolygonRow>,
    /// Way attribute rows in append order.
    pub way_attributes: Vec<AttributeRow>,
    /// Relation attribute rows in append order.
    pub relation_attributes: Vec<AttributeRow>,
    /// Number of committed batches.
    pub commits: usize,
}

impl MemoryGeoStore {
    /// Create an empty store accepting vectors shaped by the given schemas.
    #[must_use]
    pub fn new(way_schema: &AttributeSchema, relation_schema: &AttributeSchema) -> Self {
        Self {
            way_width: way_schema.len(),
            relation_width: relation_schema.len(),
            ..Self::default()
        }
    }

    /// Assembled geometry of a multipolygon, if any.
    #[must_use]
    pub fn multipolygon(&self, id: &str) -> Option<&MultiPolygon<f64>> {
        self.multipolygons
            .iter()
            .find(|row| row.id == id)
            .and_then(|row| row.geometry.as_ref())
    }
}

impl GeometryStore for MemoryGeoStore {
    fn commit_batch(&mut self) -> Result<(), StoreError> {
        self.commits += 1;
        Ok(())
    }

    fn insert_point(
        &mut self,
        id: &str,
        location: Coord<f64>,
        timestamp: Option<&str>,
        attributes: &AttributeVector,
    ) -> Result<(), StoreError> {
        ensure_width(id, attributes, self.way_width)?;
        self.points.insert(
            id.to_owned(),
            PointRow {
                location,
                timestamp: timestamp.map(str::to_owned),
                attributes: attributes.clone(),
            },
        );
        Ok(())
    }

    fn upsert_line(&mut self, id: &str, line: &LineString<f64>) -> Result<(), StoreError> {
        self.lines.insert(id.to_owned(), line.clone());
        Ok(())
    }

    fn upsert_polygon(&mut self, id: &str, polygon: &Polygon<f64>) -> Result<(), StoreError> {
        self.polygons.insert(id.to_owned(), polygon.clone());
        Ok(())
    }

    fn insert_multipolygon(
        &mut self,
        id: &str,
        timestamp: Option<&str>,
        attributes: &AttributeVector,
    ) -> Result<(), StoreError> {
        ensure_width(id, attributes, self.way_width)?;
        self.multipolygons.retain(|row| row.id != id);
        self.multipolygons.push(MultipolygonRow {
            id: id.to_owned(),
            timestamp: timestamp.map(str::to_owned),
            attributes: attributes.clone(),
            geometry: None,
        });
        Ok(())
    }

    fn multipolygon_ids(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.multipolygons.iter().map(|row| row.id.clone()).collect())
    }

    fn polygons_by_ids(&self, ids: &[&str]) -> Result<Vec<(String, Polygon<f64>)>, StoreError> {
        Ok(ids
            .iter()
            .filter_map(|id| {
                self.polygons
                    .get(*id)
                    .map(|polygon| ((*id).to_owned(), polygon.clone()))
            })
            .collect())
    }

    fn set_multipolygon_geometry(
        &mut self,
        id: &str,
        geometry: &MultiPolygon<f64>,
    ) -> Result<(), StoreError> {
        let row = self
            .multipolygons
            .iter_mut()
            .find(|row| row.id == id)
            .ok_or_else(|| StoreError::UnknownMultipolygon { id: id.to_owned() })?;
        row.geometry = Some(geometry.clone());
        Ok(())
    }

    fn join_attributes(&mut self) -> Result<JoinSummary, StoreError> {
        let attributed: HashSet<&str> = self
            .way_attributes
            .iter()
            .map(|row| row.id.as_str())
            .collect();
        let lines = self
            .lines
            .keys()
            .filter(|id| attributed.contains(id.as_str()))
            .count();
        let polygons = self
            .polygons
            .keys()
            .filter(|id| attributed.contains(id.as_str()))
            .count();
        Ok(JoinSummary {
            lines: u64::try_from(lines).unwrap_or(u64::MAX),
            polygons: u64::try_from(polygons).unwrap_or(u64::MAX),
        })
    }
}

impl AttributeStore for MemoryGeoStore {
    fn append_way_attributes(
        &mut self,
        id: &str,
        timestamp: Option<&str>,
        attributes: &AttributeVector,
    ) -> Result<(), StoreError> {
        ensure_width(id, attributes, self.way_width)?;
        self.way_attributes
            .push(AttributeRow::new(id, timestamp, attributes));
        Ok(())
    }

    fn append_relation_attributes(
        &mut self,
        id: &str,
        timestamp: Option<&str>,
        attributes: &AttributeVector,
    ) -> Result<(), StoreError> {
        ensure_width(id, attributes, self.relation_width)?;
        self.relation_attributes
            .push(AttributeRow::new(id, timestamp, attributes));
        Ok(())
    }
}

impl AttributeRow {
    fn new(id: &str, timestamp: Option<&str>, attributes: &AttributeVector) -> Self {
        Self {
            id: id.to_owned(),
            timestamp: timestamp.map(str::to_owned),
            attributes: attributes.clone(),
        }
    }
}
