//! Point stage: `id,lon,lat` rows in stream order.

use std::io::Write;

use camino::Utf8Path;
use geo::Coord;

use super::{StageReader, StageWriter, StagingError, parse_f64};

/// A point read back from the stage.
#[derive(Debug, Clone, PartialEq)]
pub struct StagedPoint {
    /// Point identifier.
    pub id: String,
    /// Staged coordinate.
    pub location: Coord<f64>,
}

/// Writer for `points.stage`.
#[derive(Debug)]
pub struct PointStageWriter {
    inner: StageWriter,
}

impl PointStageWriter {
    /// Create (or truncate) the point stage at `path`.
    pub fn create(path: &Utf8Path) -> Result<Self, StagingError> {
        StageWriter::create(path).map(|inner| Self { inner })
    }

    /// Append one point.
    pub fn append(&mut self, id: &str, location: Coord<f64>) -> Result<(), StagingError> {
        self.inner
            .write_row(|writer| write!(writer, "{id},{},{}", location.x, location.y))
    }

    /// Flush the stage and return the number of rows written.
    pub fn finish(self) -> Result<u64, StagingError> {
        self.inner.finish()
    }
}

/// Sequential reader over `points.stage`.
#[derive(Debug)]
pub struct PointStageReader {
    stage: StageReader,
}

impl PointStageReader {
    /// Open the point stage at `path`.
    pub fn open(path: &Utf8Path) -> Result<Self, StagingError> {
        StageReader::open(path).map(|stage| Self { stage })
    }

    /// Read the next point, or `None` once the stage is exhausted.
    pub fn next_point(&mut self) -> Result<Option<StagedPoint>, StagingError> {
        let Some(line) = self.stage.next_line()? else {
            return Ok(None);
        };
        let parsed = parse_row(line);
        parsed.map(Some).map_err(|reason| self.stage.corrupt(reason))
    }
}

impl Iterator for PointStageReader {
    type Item = Result<StagedPoint, StagingError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_point().transpose()
    }
}

fn parse_row(line: &str) -> Result<StagedPoint, String> {
    let mut fields = line.split(',');
    let (Some(id), Some(lon), Some(lat), None) =
        (fields.next(), fields.next(), fields.next(), fields.next())
    else {
        return Err(format!("expected 3 fields in {line:?}"));
    };
    let (Some(x), Some(y)) = (parse_f64(lon), parse_f64(lat)) else {
        return Err(format!("invalid coordinate in {line:?}"));
    };
    if id.is_empty() {
        return Err("empty point identifier".to_owned());
    }
    Ok(StagedPoint {
        id: id.to_owned(),
        location: Coord { x, y },
    })
}
