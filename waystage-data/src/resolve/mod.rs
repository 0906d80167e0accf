//! Chunked, memory-bounded resolution of way references.
//!
//! The resolver streams the point stage in windows of at most `W` points.
//! For every window it makes one pass over the pending ways, fills each
//! empty slot whose reference is in the window, emits the ways that became
//! complete and carries the rest into the next pass. Only one window is held
//! in memory at a time; the pending ways live behind [`PendingWayStore`].
//!
//! Invariants:
//! - A slot is filled only by a point whose identifier equals its reference
//!   and is never overwritten, so the first occurrence of a duplicated point
//!   identifier wins.
//! - The set of resolved ways does not depend on `W` or on point order.

use std::collections::HashMap;
use std::num::NonZeroUsize;

use camino::Utf8Path;
use geo::Coord;
use log::{debug, info, warn};
use thiserror::Error;
use waystage_core::StoreError;

use crate::staging::{PointStageReader, StagingError, WayRecord};

mod file_store;
mod memory_store;

pub use file_store::FileWayStore;
pub use memory_store::MemoryWayStore;

/// Default number of points held per window.
pub const DEFAULT_WINDOW_SIZE: usize = 500_000;

/// Errors raised while resolving ways.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// Reading the point stage or a way generation failed.
    #[error(transparent)]
    Staging(#[from] StagingError),
    /// Handing a resolved way to the geometry store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Callback receiving each way as soon as every slot is filled.
pub type EmitWay<'a> = dyn FnMut(WayRecord) -> Result<(), ResolveError> + 'a;

/// Storage for ways that still have empty slots.
pub trait PendingWayStore {
    /// Number of ways still pending.
    fn pending(&self) -> u64;

    /// Stream the pending ways once against `window`, emitting and removing
    /// every way that becomes complete.
    fn resolve_pass(
        &mut self,
        window: &PointWindow,
        emit: &mut EmitWay<'_>,
    ) -> Result<PassStats, ResolveError>;

    /// Visit every way still pending.
    fn for_each_pending(
        &mut self,
        visit: &mut dyn FnMut(&WayRecord),
    ) -> Result<(), ResolveError>;

    /// Release scratch resources once resolution is over.
    fn finish(&mut self) -> Result<(), ResolveError> {
        Ok(())
    }
}

/// Outcome of one pass over the pending store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PassStats {
    /// Ways completed and emitted during the pass.
    pub resolved: u64,
    /// Ways carried into the next pass.
    pub carried: u64,
    /// Slots filled during the pass.
    pub filled: u64,
}

/// A bounded map from point identifier to coordinate.
#[derive(Debug, Default)]
pub struct PointWindow {
    points: HashMap<String, Coord<f64>>,
    rows: u64,
}

impl PointWindow {
    /// Read up to `capacity` rows from `reader`. Returns `None` once the
    /// point stage is exhausted.
    pub fn fill(
        reader: &mut PointStageReader,
        capacity: NonZeroUsize,
    ) -> Result<Option<Self>, StagingError> {
        let mut window = Self {
            points: HashMap::with_capacity(capacity.get().min(DEFAULT_WINDOW_SIZE)),
            rows: 0,
        };
        for _ in 0..capacity.get() {
            let Some(point) = reader.next_point()? else {
                break;
            };
            window.insert(point.id, point.location);
        }
        Ok((window.rows > 0).then_some(window))
    }

    /// Add a point unless its identifier is already present.
    pub fn insert(&mut self, id: String, location: Coord<f64>) {
        self.rows += 1;
        self.points.entry(id).or_insert(location);
    }

    /// Coordinate of `id`, if it is in the window.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Coord<f64>> {
        self.points.get(id).copied()
    }

    /// Number of point rows read into the window, duplicates included.
    #[must_use]
    pub const fn rows(&self) -> u64 {
        self.rows
    }
}

/// A way that never resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnresolvedWay {
    /// Way identifier.
    pub id: String,
    /// First reference that no point matched.
    pub missing: String,
}

/// Summary of a resolution run.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResolveReport {
    /// Passes made over the pending store.
    pub passes: u64,
    /// Point rows read from the stage.
    pub points_read: u64,
    /// Ways emitted to the builder.
    pub resolved: u64,
    /// Ways left with empty slots.
    pub unresolved: Vec<UnresolvedWay>,
}

/// Drives windows of points against a [`PendingWayStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolver {
    window_size: NonZeroUsize,
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new(NonZeroUsize::new(DEFAULT_WINDOW_SIZE).unwrap_or(NonZeroUsize::MIN))
    }
}

impl Resolver {
    /// Resolver holding at most `window_size` points per pass.
    #[must_use]
    pub const fn new(window_size: NonZeroUsize) -> Self {
        Self { window_size }
    }

    /// Resolve the ways in `store` against the point stage at `points`.
    ///
    /// Stops early once no way is pending. Ways still pending when the stage
    /// is exhausted are reported as unresolved and logged; they never reach
    /// `emit`.
    pub fn run<S, F>(
        &self,
        points: &Utf8Path,
        store: &mut S,
        mut emit: F,
    ) -> Result<ResolveReport, ResolveError>
    where
        S: PendingWayStore + ?Sized,
        F: FnMut(WayRecord) -> Result<(), ResolveError>,
    {
        let mut reader = PointStageReader::open(points)?;
        let mut report = ResolveReport::default();
        info!(
            "Resolving {} ways with windows of {} points",
            store.pending(),
            self.window_size
        );

        while store.pending() > 0 {
            let Some(window) = PointWindow::fill(&mut reader, self.window_size)? else {
                break;
            };
            report.passes += 1;
            report.points_read += window.rows();
            let stats = store.resolve_pass(&window, &mut emit)?;
            report.resolved += stats.resolved;
            debug!(
                "Pass {}: {} points, {} slots filled, {} ways resolved, {} carried",
                report.passes,
                window.rows(),
                stats.filled,
                stats.resolved,
                stats.carried
            );
        }

        if store.pending() > 0 {
            let unresolved = &mut report.unresolved;
            store.for_each_pending(&mut |record| {
                unresolved.push(UnresolvedWay {
                    id: record.id().to_owned(),
                    missing: record.first_missing().unwrap_or_default().to_owned(),
                });
            })?;
            for way in &report.unresolved {
                warn!(
                    "Way {} is unresolved: point {} was not found",
                    way.id, way.missing
                );
            }
            warn!("{} ways could not be resolved", report.unresolved.len());
        }
        store.finish()?;

        info!(
            "Resolved {} ways in {} passes over {} points",
            report.resolved, report.passes, report.points_read
        );
        Ok(report)
    }
}
