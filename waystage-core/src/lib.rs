//! Core domain types for the waystage converter.
//!
//! The crate models the three OpenStreetMap element kinds (points, ways and
//! relations), the fixed attribute schema that tags are projected onto, the
//! geometries reconstructed from ways, and the storage traits the ingestion
//! pipeline writes through.
//!
//! Invariants:
//! - Coordinates are WGS84 with `x = longitude`, `y = latitude`.
//! - Schemas are built once and shared by reference; nothing here holds
//!   global mutable state.

#![forbid(unsafe_code)]

pub mod element;
pub mod geometry;
pub mod schema;
pub mod store;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use element::{Element, Member, MemberKind, Point, Relation, Tags, Way};
pub use geometry::WayGeometry;
pub use schema::{AttributeSchema, AttributeVector, SchemaField};
pub use store::{AttributeStore, GeometryStore, JoinSummary, StoreError};

#[cfg(feature = "store-sqlite")]
pub use store::SqliteGeoStore;
