//! Geometry builder: resolved ways to lines and polygons.

use log::warn;
use waystage_core::{GeometryStore, StoreError, WayGeometry};

use crate::staging::WayRecord;

/// Counts of geometries written by a [`GeometryBuilder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BuildSummary {
    /// Ways written to `way_lines`.
    pub lines: u64,
    /// Ways written to `way_polygons`.
    pub polygons: u64,
}

/// Converts resolved ways into geometries and upserts them into a store.
///
/// Area candidates (closed, no linear marker) become single-ring polygons;
/// every other way becomes a line. No validity checks are applied.
#[derive(Debug)]
pub struct GeometryBuilder<'s, S: ?Sized> {
    store: &'s mut S,
    summary: BuildSummary,
}

impl<'s, S> GeometryBuilder<'s, S>
where
    S: GeometryStore + ?Sized,
{
    /// Builder writing into `store`.
    pub const fn new(store: &'s mut S) -> Self {
        Self {
            store,
            summary: BuildSummary {
                lines: 0,
                polygons: 0,
            },
        }
    }

    /// Build and store the geometry of `record`.
    ///
    /// Records with empty slots are skipped with a warning.
    pub fn build(&mut self, record: WayRecord) -> Result<(), StoreError> {
        let resolved = match record.into_resolved() {
            Ok(resolved) => resolved,
            Err(record) => {
                warn!(
                    "Skipping way {} with {} unresolved references",
                    record.id(),
                    record.unresolved()
                );
                return Ok(());
            }
        };
        match WayGeometry::build(resolved.coords, resolved.area_candidate) {
            WayGeometry::Line(line) => {
                self.store.upsert_line(&resolved.id, &line)?;
                self.summary.lines += 1;
            }
            WayGeometry::Polygon(polygon) => {
                self.store.upsert_polygon(&resolved.id, &polygon)?;
                self.summary.polygons += 1;
            }
        }
        Ok(())
    }

    /// Geometries written so far.
    #[must_use]
    pub const fn summary(&self) -> BuildSummary {
        self.summary
    }
}
