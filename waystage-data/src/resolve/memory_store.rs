//! Arena-backed pending-way store for small extracts and tests.

use camino::Utf8Path;

use super::{EmitWay, PassStats, PendingWayStore, PointWindow, ResolveError};
use crate::staging::{RowLayout, WayRecord, WayStageReader};

/// Pending ways held in an arena indexed by position.
///
/// Slots are updated in place; a re-queue list tracks the arena positions
/// still pending so each pass only visits unresolved ways.
#[derive(Debug, Default)]
pub struct MemoryWayStore {
    arena: Vec<Option<WayRecord>>,
    queue: Vec<usize>,
}

impl MemoryWayStore {
    /// Load every row of the way stage at `stage`.
    pub fn load(stage: &Utf8Path) -> Result<Self, ResolveError> {
        let reader = WayStageReader::open(stage, RowLayout::Stage)?;
        let records = reader.collect::<Result<Vec<_>, _>>()?;
        Ok(Self::from_records(records))
    }

    /// Build a store from records already in memory.
    pub fn from_records<I>(records: I) -> Self
    where
        I: IntoIterator<Item = WayRecord>,
    {
        let arena: Vec<Option<WayRecord>> = records.into_iter().map(Some).collect();
        let queue = (0..arena.len()).collect();
        Self { arena, queue }
    }
}

impl PendingWayStore for MemoryWayStore {
    fn pending(&self) -> u64 {
        u64::try_from(self.queue.len()).unwrap_or(u64::MAX)
    }

    fn resolve_pass(
        &mut self,
        window: &PointWindow,
        emit: &mut EmitWay<'_>,
    ) -> Result<PassStats, ResolveError> {
        let mut stats = PassStats::default();
        let queue = std::mem::take(&mut self.queue);
        for position in queue {
            let Some(slot) = self.arena.get_mut(position) else {
                continue;
            };
            let Some(record) = slot.as_mut() else {
                continue;
            };
            let filled = record.fill(|reference| window.get(reference));
            stats.filled += u64::try_from(filled).unwrap_or(u64::MAX);
            if record.is_resolved() {
                if let Some(done) = slot.take() {
                    stats.resolved += 1;
                    emit(done)?;
                }
            } else {
                stats.carried += 1;
                self.queue.push(position);
            }
        }
        Ok(stats)
    }

    fn for_each_pending(
        &mut self,
        visit: &mut dyn FnMut(&WayRecord),
    ) -> Result<(), ResolveError> {
        for position in &self.queue {
            if let Some(Some(record)) = self.arena.get(*position) {
                visit(record);
            }
        }
        Ok(())
    }
}
