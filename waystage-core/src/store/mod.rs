//! Storage traits for reconstructed geometries and projected attributes.
//!
//! The pipeline writes through [`GeometryStore`] and [`AttributeStore`] and
//! never assumes a particular backend. [`SqliteGeoStore`] persists both into a
//! single SQLite database; an in-memory implementation lives in
//! `test_support` for unit and behaviour tests.

use geo::{Coord, LineString, MultiPolygon, Polygon};
use thiserror::Error;

use crate::schema::AttributeVector;

#[cfg(feature = "store-sqlite")]
mod sqlite;

#[cfg(feature = "store-sqlite")]
pub use sqlite::SqliteGeoStore;

/// Errors raised by geometry and attribute stores.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    /// Opening the SQLite database failed.
    #[cfg(feature = "store-sqlite")]
    #[error("failed to open SQLite database at {path:?}")]
    Open {
        /// Location of the database on disk.
        path: std::path::PathBuf,
        /// Source error returned by `rusqlite`.
        #[source]
        source: rusqlite::Error,
    },
    /// Creating the output tables failed.
    #[cfg(feature = "store-sqlite")]
    #[error("failed to create table {table}")]
    CreateSchema {
        /// Table being created.
        table: &'static str,
        /// Source error returned by `rusqlite`.
        #[source]
        source: rusqlite::Error,
    },
    /// Writing a row failed.
    #[cfg(feature = "store-sqlite")]
    #[error("failed to write {table} row {id}")]
    WriteRow {
        /// Target table.
        table: &'static str,
        /// Identifier of the row.
        id: String,
        /// Source error returned by `rusqlite`.
        #[source]
        source: rusqlite::Error,
    },
    /// Generic SQLite error when querying or managing transactions.
    #[cfg(feature = "store-sqlite")]
    #[error(transparent)]
    Database(#[from] rusqlite::Error),
    /// Serializing a geometry failed.
    #[cfg(feature = "serde")]
    #[error("failed to encode geometry for {id}")]
    EncodeGeometry {
        /// Identifier of the geometry.
        id: String,
        /// Source error produced by `serde_json`.
        #[source]
        source: serde_json::Error,
    },
    /// A stored geometry payload was not valid JSON.
    #[cfg(feature = "serde")]
    #[error("failed to decode geometry for {id}")]
    DecodeGeometry {
        /// Identifier of the geometry.
        id: String,
        /// Source error produced by `serde_json`.
        #[source]
        source: serde_json::Error,
    },
    /// An attribute vector did not match the store's schema width.
    #[error("attribute vector for {id} has {found} slots, expected {expected}")]
    AttributeWidth {
        /// Identifier of the row.
        id: String,
        /// Width of the configured schema.
        expected: usize,
        /// Width of the supplied vector.
        found: usize,
    },
    /// A geometry was written for a multipolygon that was never inserted.
    #[error("multipolygon {id} does not exist")]
    UnknownMultipolygon {
        /// Identifier of the missing multipolygon row.
        id: String,
    },
}

/// Number of geometry rows that survive the inner join with way attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct JoinSummary {
    /// Line rows with a matching attribute row.
    pub lines: u64,
    /// Polygon rows with a matching attribute row.
    pub polygons: u64,
}

/// Sink and lookup for reconstructed geometries.
///
/// Identifiers are unique per geometry family; writing the same identifier
/// twice replaces the earlier row.
pub trait GeometryStore {
    /// Start grouping writes. Backends without transactions ignore this.
    fn begin_batch(&mut self) -> Result<(), StoreError> {
        Ok(())
    }

    /// Make grouped writes durable.
    fn commit_batch(&mut self) -> Result<(), StoreError> {
        Ok(())
    }

    /// Record a tagged point with its source timestamp and projected
    /// attributes.
    fn insert_point(
        &mut self,
        id: &str,
        location: Coord<f64>,
        timestamp: Option<&str>,
        attributes: &AttributeVector,
    ) -> Result<(), StoreError>;

    /// Insert or replace the line geometry of a way.
    fn upsert_line(&mut self, id: &str, line: &LineString<f64>) -> Result<(), StoreError>;

    /// Insert or replace the polygon geometry of a way.
    fn upsert_polygon(&mut self, id: &str, polygon: &Polygon<f64>) -> Result<(), StoreError>;

    /// Record a multipolygon relation with an empty geometry.
    fn insert_multipolygon(
        &mut self,
        id: &str,
        timestamp: Option<&str>,
        attributes: &AttributeVector,
    ) -> Result<(), StoreError>;

    /// Multipolygon identifiers in insertion order.
    fn multipolygon_ids(&self) -> Result<Vec<String>, StoreError>;

    /// Bulk lookup of way polygons. Unknown identifiers are skipped; the
    /// result order is unspecified.
    fn polygons_by_ids(&self, ids: &[&str]) -> Result<Vec<(String, Polygon<f64>)>, StoreError>;

    /// Replace the geometry of a previously inserted multipolygon.
    fn set_multipolygon_geometry(
        &mut self,
        id: &str,
        geometry: &MultiPolygon<f64>,
    ) -> Result<(), StoreError>;

    /// Expose way geometries joined to their attributes, dropping geometry
    /// rows without an attribute row (inner-join semantics).
    fn join_attributes(&mut self) -> Result<JoinSummary, StoreError>;
}

/// Append-only sink for projected attribute rows.
pub trait AttributeStore {
    /// Append the attribute row of a way that carries recognised tags.
    fn append_way_attributes(
        &mut self,
        id: &str,
        timestamp: Option<&str>,
        attributes: &AttributeVector,
    ) -> Result<(), StoreError>;

    /// Append the attribute row of a relation.
    fn append_relation_attributes(
        &mut self,
        id: &str,
        timestamp: Option<&str>,
        attributes: &AttributeVector,
    ) -> Result<(), StoreError>;
}

/// Check that `attributes` has the width of the configured schema.
pub(crate) fn ensure_width(
    id: &str,
    attributes: &AttributeVector,
    expected: usize,
) -> Result<(), StoreError> {
    if attributes.len() == expected {
        Ok(())
    } else {
        Err(StoreError::AttributeWidth {
            id: id.to_owned(),
            expected,
            found: attributes.len(),
        })
    }
}
