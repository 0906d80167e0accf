//! Facade crate for the waystage OpenStreetMap geometry converter.
//!
//! This crate re-exports the core domain types and, behind the `pipeline`
//! feature, the streaming ingestion and chunked resolution pipeline.

#![forbid(unsafe_code)]

pub use waystage_core::{
    AttributeSchema, AttributeStore, AttributeVector, Element, GeometryStore, Member, MemberKind,
    Point, Relation, SchemaField, StoreError, Tags, Way, WayGeometry,
};

#[cfg(feature = "store-sqlite")]
pub use waystage_core::SqliteGeoStore;

#[cfg(feature = "pipeline")]
pub use waystage_data::{
    PipelineConfig, PipelineError, PipelineReport, WayStoreKind, run_pipeline,
};
