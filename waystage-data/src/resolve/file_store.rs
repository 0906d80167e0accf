//! Durable pending-way store backed by generation files.

use camino::{Utf8Path, Utf8PathBuf};
use log::debug;

use super::{EmitWay, PassStats, PendingWayStore, PointWindow, ResolveError};
use crate::staging::{GenerationWriter, RowLayout, StagingError, WayRecord, WayStageReader};

const PENDING_FILE: &str = "pending.stage";
const NEXT_FILE: &str = "pending.next.stage";

/// Pending ways kept on disk, one record in memory at a time.
///
/// The first pass reads `ways.stage` directly and leaves it untouched. Each
/// pass writes the still-pending ways, with their partial fills, to a next
/// generation file that then replaces `pending.stage`.
#[derive(Debug)]
pub struct FileWayStore {
    current: Utf8PathBuf,
    layout: RowLayout,
    pending_path: Utf8PathBuf,
    next_path: Utf8PathBuf,
    pending: u64,
    generation: u64,
}

impl FileWayStore {
    /// Open a store over the way stage at `stage`, keeping generation files
    /// in `working_dir`.
    pub fn open(stage: &Utf8Path, working_dir: &Utf8Path) -> Result<Self, ResolveError> {
        let mut reader = WayStageReader::open(stage, RowLayout::Stage)?;
        let mut pending = 0;
        while let Some(record) = reader.next_record()? {
            if !record.is_resolved() {
                pending += 1;
            }
        }
        Ok(Self {
            current: stage.to_path_buf(),
            layout: RowLayout::Stage,
            pending_path: working_dir.join(PENDING_FILE),
            next_path: working_dir.join(NEXT_FILE),
            pending,
            generation: 0,
        })
    }

    /// Number of generations written so far.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    fn io_error(path: &Utf8Path, source: std::io::Error) -> ResolveError {
        ResolveError::Staging(StagingError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl PendingWayStore for FileWayStore {
    fn pending(&self) -> u64 {
        self.pending
    }

    fn resolve_pass(
        &mut self,
        window: &PointWindow,
        emit: &mut EmitWay<'_>,
    ) -> Result<PassStats, ResolveError> {
        let mut reader = WayStageReader::open(&self.current, self.layout)?;
        let mut next = GenerationWriter::create(&self.next_path)?;
        let mut stats = PassStats::default();

        while let Some(mut record) = reader.next_record()? {
            let filled = record.fill(|reference| window.get(reference));
            stats.filled += u64::try_from(filled).unwrap_or(u64::MAX);
            if record.is_resolved() {
                stats.resolved += 1;
                emit(record)?;
            } else {
                stats.carried += 1;
                next.append(&record)?;
            }
        }
        next.finish()?;
        drop(reader);

        waystage_fs::replace_file(&self.next_path, &self.pending_path)
            .map_err(|source| Self::io_error(&self.pending_path, source))?;
        self.current.clone_from(&self.pending_path);
        self.layout = RowLayout::Generation;
        self.pending = stats.carried;
        self.generation += 1;
        debug!(
            "Generation {} holds {} pending ways",
            self.generation, self.pending
        );
        Ok(stats)
    }

    fn for_each_pending(
        &mut self,
        visit: &mut dyn FnMut(&WayRecord),
    ) -> Result<(), ResolveError> {
        let mut reader = WayStageReader::open(&self.current, self.layout)?;
        while let Some(record) = reader.next_record()? {
            if !record.is_resolved() {
                visit(&record);
            }
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<(), ResolveError> {
        for path in [&self.pending_path, &self.next_path] {
            waystage_fs::remove_file_if_exists(path).map_err(|source| Self::io_error(path, source))?;
        }
        Ok(())
    }
}
