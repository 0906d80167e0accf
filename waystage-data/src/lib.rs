//! Streaming conversion of OpenStreetMap extracts into geometry tables.
//!
//! Responsibilities:
//! - Decode OSM XML, bzip2-compressed XML and PBF into element events.
//! - Stage points and ways to flat files during a single parse pass.
//! - Resolve way references in bounded windows of points.
//! - Build line and polygon geometries and assemble multipolygons.
//!
//! Boundaries:
//! - Domain types, the attribute schema and the stores live in
//!   `waystage-core`.
//! - Argument parsing and logger setup belong to the CLI.
//!
//! Invariants:
//! - Memory is bounded by the point window, except for the in-memory way
//!   store which holds every pending way.
//! - Phases never overlap; each commits before the next starts.
//! - No global mutable state.

#![forbid(unsafe_code)]

pub mod assemble;
pub mod build;
pub mod ingest;
pub mod parse;
pub mod pipeline;
pub mod resolve;
pub mod staging;

pub use assemble::{AssembleError, AssembleReport, assemble_multipolygons};
pub use build::{BuildSummary, GeometryBuilder};
pub use ingest::{IngestError, IngestReport, StagingSink};
pub use parse::{InputFormat, ParseError, ParseSummary, parse_file};
pub use pipeline::{
    PipelineConfig, PipelineError, PipelineReport, UnknownWayStore, WayStoreKind, run_pipeline,
    run_with_store,
};
pub use resolve::{
    DEFAULT_WINDOW_SIZE, FileWayStore, MemoryWayStore, PendingWayStore, ResolveError,
    ResolveReport, Resolver, UnresolvedWay,
};
pub use staging::{StagingError, StagingPaths};
