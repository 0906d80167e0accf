//! Relation-members side-channel: `id|way,way` per multipolygon.
//!
//! Rows are written in the same order as multipolygon rows are inserted into
//! the geometry store; the assembler relies on that alignment.

use std::io::Write;

use camino::Utf8Path;

use super::{StageReader, StageWriter, StagingError};

/// One multipolygon and its way members in member-list order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberRow {
    /// Relation identifier.
    pub id: String,
    /// Way member identifiers.
    pub ways: Vec<String>,
}

/// Writer for `multipolygon_members.stage`.
#[derive(Debug)]
pub struct MemberStageWriter {
    inner: StageWriter,
}

impl MemberStageWriter {
    /// Create (or truncate) the side-channel at `path`.
    pub fn create(path: &Utf8Path) -> Result<Self, StagingError> {
        StageWriter::create(path).map(|inner| Self { inner })
    }

    /// Append a multipolygon row.
    pub fn append<'a, I>(&mut self, id: &str, ways: I) -> Result<(), StagingError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        self.inner.write_row(|writer| {
            write!(writer, "{id}|")?;
            for (index, way) in ways.into_iter().enumerate() {
                if index > 0 {
                    writer.write_all(b",")?;
                }
                writer.write_all(way.as_bytes())?;
            }
            Ok(())
        })
    }

    /// Flush the side-channel and return the number of rows written.
    pub fn finish(self) -> Result<u64, StagingError> {
        self.inner.finish()
    }
}

/// Sequential reader over the side-channel.
#[derive(Debug)]
pub struct MemberStageReader {
    stage: StageReader,
}

impl MemberStageReader {
    /// Open the side-channel at `path`.
    pub fn open(path: &Utf8Path) -> Result<Self, StagingError> {
        StageReader::open(path).map(|stage| Self { stage })
    }

    /// Read the next row, or `None` at end of file.
    pub fn next_row(&mut self) -> Result<Option<MemberRow>, StagingError> {
        let Some(line) = self.stage.next_line()? else {
            return Ok(None);
        };
        let parsed = parse_row(line);
        parsed.map(Some).map_err(|reason| self.stage.corrupt(reason))
    }
}

fn parse_row(line: &str) -> Result<MemberRow, String> {
    let (id, ways) = line
        .split_once('|')
        .ok_or_else(|| format!("missing member separator in {line:?}"))?;
    if id.is_empty() {
        return Err("empty relation identifier".to_owned());
    }
    let ways = if ways.is_empty() {
        Vec::new()
    } else {
        ways.split(',').map(str::to_owned).collect()
    };
    Ok(MemberRow {
        id: id.to_owned(),
        ways,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use rstest::rstest;
    use tempfile::TempDir;

    #[rstest]
    fn rows_round_trip_including_empty_member_lists() {
        let dir = TempDir::new().expect("create temp dir");
        let path = Utf8PathBuf::from_path_buf(dir.path().join("members.stage"))
            .expect("utf-8 temp path");
        let mut writer = MemberStageWriter::create(&path).expect("create stage");
        writer.append("r1", ["w1", "w2"]).expect("append row");
        writer.append("r2", []).expect("append empty row");
        assert_eq!(writer.finish().expect("finish"), 2);

        assert_eq!(
            std::fs::read_to_string(&path).expect("read stage"),
            "r1|w1,w2\nr2|\n"
        );

        let mut reader = MemberStageReader::open(&path).expect("open stage");
        assert_eq!(
            reader.next_row().expect("row 1"),
            Some(MemberRow {
                id: "r1".into(),
                ways: vec!["w1".into(), "w2".into()],
            })
        );
        assert_eq!(
            reader.next_row().expect("row 2"),
            Some(MemberRow {
                id: "r2".into(),
                ways: Vec::new(),
            })
        );
        assert_eq!(reader.next_row().expect("eof"), None);
    }

    #[rstest]
    fn rows_without_separator_are_corrupt() {
        assert!(parse_row("r1,w1").is_err());
    }
}
