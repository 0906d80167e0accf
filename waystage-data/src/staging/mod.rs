//! Append-only staging files in the working directory.
//!
//! Three line-oriented files carry the parse phase's output to the later
//! phases:
//! - `points.stage`: `id,lon,lat`;
//! - `ways.stage`: `id,ref|ref,coord|coord,marker`, where a coordinate slot
//!   is empty until resolved and `lon lat` once filled, and `marker` is `y`
//!   for ways carrying the linear marker;
//! - `multipolygon_members.stage`: `id|way,way`.
//!
//! Rows are written in stream order and flushed when a writer finishes.
//! Coordinates use Rust's shortest round-trip float formatting so reading a
//! row back reproduces the exact `f64` values.

use std::io::{self, BufRead, BufReader, BufWriter, Write};

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::fs_utf8::File;
use thiserror::Error;

mod members;
mod points;
mod ways;

pub use members::{MemberRow, MemberStageReader, MemberStageWriter};
pub use points::{PointStageReader, PointStageWriter, StagedPoint};
pub use ways::{ResolvedWay, RowLayout, WayRecord, WayStageReader, WayStageWriter};

pub(crate) use ways::GenerationWriter;

/// File name of the point stage.
pub const POINTS_FILE: &str = "points.stage";
/// File name of the way stage.
pub const WAYS_FILE: &str = "ways.stage";
/// File name of the relation-members side-channel.
pub const MEMBERS_FILE: &str = "multipolygon_members.stage";

/// Errors raised while writing or reading staging files.
#[derive(Debug, Error)]
pub enum StagingError {
    /// Creating or opening a staging file failed.
    #[error("failed to open staging file {path}")]
    Open {
        /// Staging file path.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// Writing or reading a staging file failed.
    #[error("I/O error on staging file {path}")]
    Io {
        /// Staging file path.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// A staged row could not be decoded.
    #[error("corrupt row {line} in staging file {path}: {reason}")]
    CorruptRow {
        /// Staging file path.
        path: Utf8PathBuf,
        /// One-based line number.
        line: u64,
        /// What was wrong with the row.
        reason: String,
    },
}

/// Locations of the staging files inside a working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagingPaths {
    /// Point stage.
    pub points: Utf8PathBuf,
    /// Way stage.
    pub ways: Utf8PathBuf,
    /// Relation-members side-channel.
    pub members: Utf8PathBuf,
}

impl StagingPaths {
    /// Staging file locations under `working_dir`.
    #[must_use]
    pub fn in_dir(working_dir: &Utf8Path) -> Self {
        Self {
            points: working_dir.join(POINTS_FILE),
            ways: working_dir.join(WAYS_FILE),
            members: working_dir.join(MEMBERS_FILE),
        }
    }

    /// Remove every staging file, ignoring files that do not exist.
    pub fn remove_all(&self) -> Result<(), StagingError> {
        for path in [&self.points, &self.ways, &self.members] {
            waystage_fs::remove_file_if_exists(path).map_err(|source| StagingError::Io {
                path: path.clone(),
                source,
            })?;
        }
        Ok(())
    }
}

/// Buffered line writer shared by the staging writers.
#[derive(Debug)]
pub(crate) struct StageWriter {
    path: Utf8PathBuf,
    writer: BufWriter<File>,
    rows: u64,
}

impl StageWriter {
    pub(crate) fn create(path: &Utf8Path) -> Result<Self, StagingError> {
        let file = waystage_fs::create_utf8_file(path).map_err(|source| StagingError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
            rows: 0,
        })
    }

    pub(crate) fn write_row(
        &mut self,
        write: impl FnOnce(&mut BufWriter<File>) -> io::Result<()>,
    ) -> Result<(), StagingError> {
        write(&mut self.writer)
            .and_then(|()| self.writer.write_all(b"\n"))
            .map_err(|source| self.io_error(source))?;
        self.rows += 1;
        Ok(())
    }

    pub(crate) fn finish(mut self) -> Result<u64, StagingError> {
        self.writer
            .flush()
            .map_err(|source| self.io_error(source))?;
        Ok(self.rows)
    }

    fn io_error(&self, source: io::Error) -> StagingError {
        StagingError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

/// Line reader shared by the staging readers. Reuses one line buffer.
#[derive(Debug)]
pub(crate) struct StageReader {
    path: Utf8PathBuf,
    reader: BufReader<File>,
    line: String,
    line_number: u64,
}

impl StageReader {
    pub(crate) fn open(path: &Utf8Path) -> Result<Self, StagingError> {
        let file = waystage_fs::open_utf8_file(path).map_err(|source| StagingError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            reader: BufReader::new(file),
            line: String::new(),
            line_number: 0,
        })
    }

    /// Next line without its terminator, or `None` at end of file.
    pub(crate) fn next_line(&mut self) -> Result<Option<&str>, StagingError> {
        self.line.clear();
        let read = self
            .reader
            .read_line(&mut self.line)
            .map_err(|source| StagingError::Io {
                path: self.path.clone(),
                source,
            })?;
        if read == 0 {
            return Ok(None);
        }
        self.line_number += 1;
        Ok(Some(self.line.trim_end_matches(['\n', '\r'])))
    }

    pub(crate) fn corrupt(&self, reason: impl Into<String>) -> StagingError {
        StagingError::CorruptRow {
            path: self.path.clone(),
            line: self.line_number,
            reason: reason.into(),
        }
    }
}

/// Parse a staged coordinate component.
pub(crate) fn parse_f64(raw: &str) -> Option<f64> {
    raw.parse::<f64>().ok().filter(|value| value.is_finite())
}
