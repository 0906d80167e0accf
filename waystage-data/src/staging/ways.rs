//! Way stage rows and the pending-way record they decode into.

use std::io::{self, Write};

use camino::Utf8Path;
use geo::Coord;
use waystage_core::{Way, element};

use super::{StageReader, StageWriter, StagingError, parse_f64};

const LINEAR: &str = "y";
const NOT_LINEAR: &str = "n";

/// Column layout of a way row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowLayout {
    /// `ways.stage`: `id,refs,coords,marker`. Handles are row ordinals.
    Stage,
    /// Resolver generation files: `handle,id,refs,coords,marker`.
    Generation,
}

/// A staged way with its coordinate slots.
///
/// Slots start empty and are filled in place by the resolver; a filled slot
/// is never overwritten.
#[derive(Debug, Clone, PartialEq)]
pub struct WayRecord {
    handle: u64,
    id: String,
    refs: Vec<String>,
    slots: Vec<Option<Coord<f64>>>,
    linear: bool,
    unresolved: usize,
}

impl WayRecord {
    /// A record with every slot empty.
    pub fn new(handle: u64, id: impl Into<String>, refs: Vec<String>, linear: bool) -> Self {
        let slots = vec![None; refs.len()];
        Self {
            handle,
            id: id.into(),
            unresolved: refs.len(),
            refs,
            slots,
            linear,
        }
    }

    /// Stable ordinal of the way in stream order.
    #[must_use]
    pub const fn handle(&self) -> u64 {
        self.handle
    }

    /// Way identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Referenced point identifiers in drawing order.
    #[must_use]
    pub fn refs(&self) -> &[String] {
        &self.refs
    }

    /// Coordinate slots aligned with [`Self::refs`].
    #[must_use]
    pub fn slots(&self) -> &[Option<Coord<f64>>] {
        &self.slots
    }

    /// Whether the way carries the linear marker.
    #[must_use]
    pub const fn is_linear(&self) -> bool {
        self.linear
    }

    /// Number of slots still empty.
    #[must_use]
    pub const fn unresolved(&self) -> usize {
        self.unresolved
    }

    /// Every slot holds a coordinate.
    #[must_use]
    pub const fn is_resolved(&self) -> bool {
        self.unresolved == 0
    }

    /// Closed ways without the linear marker become polygons.
    #[must_use]
    pub fn is_area_candidate(&self) -> bool {
        element::is_area_candidate(&self.refs, self.linear)
    }

    /// First reference whose slot is still empty.
    #[must_use]
    pub fn first_missing(&self) -> Option<&str> {
        self.refs
            .iter()
            .zip(&self.slots)
            .find(|(_, slot)| slot.is_none())
            .map(|(reference, _)| reference.as_str())
    }

    /// Fill empty slots using `lookup`; returns the number of slots filled.
    pub fn fill<F>(&mut self, mut lookup: F) -> usize
    where
        F: FnMut(&str) -> Option<Coord<f64>>,
    {
        let mut filled = 0;
        for (reference, slot) in self.refs.iter().zip(self.slots.iter_mut()) {
            if slot.is_none()
                && let Some(location) = lookup(reference)
            {
                *slot = Some(location);
                filled += 1;
            }
        }
        self.unresolved -= filled;
        filled
    }

    /// Coordinates in drawing order, or `None` while any slot is empty.
    #[must_use]
    pub fn into_coords(self) -> Option<Vec<Coord<f64>>> {
        self.slots.into_iter().collect()
    }

    /// Split a complete record into its identifier, coordinates and area
    /// classification. Returns the record unchanged while any slot is empty.
    pub fn into_resolved(self) -> Result<ResolvedWay, Self> {
        if !self.is_resolved() {
            return Err(self);
        }
        let area_candidate = self.is_area_candidate();
        let coords = self.slots.iter().flatten().copied().collect();
        Ok(ResolvedWay {
            id: self.id,
            coords,
            area_candidate,
        })
    }

    /// Encode the record as one row (without the line terminator).
    pub fn write_row<W: Write>(&self, writer: &mut W, layout: RowLayout) -> io::Result<()> {
        if layout == RowLayout::Generation {
            write!(writer, "{},", self.handle)?;
        }
        write_fields(writer, &self.id, &self.refs, self.slots.iter().copied(), self.linear)
    }

    /// Decode a row. `ordinal` becomes the handle for [`RowLayout::Stage`].
    pub fn parse_row(line: &str, layout: RowLayout, ordinal: u64) -> Result<Self, String> {
        let (handle, rest) = match layout {
            RowLayout::Stage => (ordinal, line),
            RowLayout::Generation => {
                let (raw, rest) = line
                    .split_once(',')
                    .ok_or_else(|| format!("missing handle in {line:?}"))?;
                let handle = raw
                    .parse::<u64>()
                    .map_err(|_| format!("invalid handle {raw:?}"))?;
                (handle, rest)
            }
        };

        let mut fields = rest.split(',');
        let (Some(id), Some(refs), Some(coords), Some(marker), None) = (
            fields.next(),
            fields.next(),
            fields.next(),
            fields.next(),
            fields.next(),
        ) else {
            return Err(format!("expected 4 way fields in {line:?}"));
        };
        if id.is_empty() {
            return Err("empty way identifier".to_owned());
        }
        let linear = match marker {
            LINEAR => true,
            NOT_LINEAR => false,
            other => return Err(format!("invalid linear marker {other:?}")),
        };
        let refs: Vec<String> = refs.split('|').map(str::to_owned).collect();
        let slots = coords
            .split('|')
            .map(parse_slot)
            .collect::<Result<Vec<_>, _>>()?;
        if slots.len() != refs.len() {
            return Err(format!(
                "way {id} has {} references but {} coordinate slots",
                refs.len(),
                slots.len()
            ));
        }
        let unresolved = slots.iter().filter(|slot| slot.is_none()).count();
        Ok(Self {
            handle,
            id: id.to_owned(),
            refs,
            slots,
            linear,
            unresolved,
        })
    }
}

/// A way whose every reference resolved to a coordinate.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedWay {
    /// Way identifier.
    pub id: String,
    /// Coordinates in drawing order.
    pub coords: Vec<Coord<f64>>,
    /// Closed and without the linear marker.
    pub area_candidate: bool,
}

fn parse_slot(raw: &str) -> Result<Option<Coord<f64>>, String> {
    if raw.is_empty() {
        return Ok(None);
    }
    let (lon, lat) = raw
        .split_once(' ')
        .ok_or_else(|| format!("invalid coordinate slot {raw:?}"))?;
    match (parse_f64(lon), parse_f64(lat)) {
        (Some(x), Some(y)) => Ok(Some(Coord { x, y })),
        _ => Err(format!("invalid coordinate slot {raw:?}")),
    }
}

fn write_fields<W, S>(
    writer: &mut W,
    id: &str,
    refs: &[String],
    slots: S,
    linear: bool,
) -> io::Result<()>
where
    W: Write,
    S: Iterator<Item = Option<Coord<f64>>>,
{
    write!(writer, "{id},{},", refs.join("|"))?;
    for (index, slot) in slots.enumerate() {
        if index > 0 {
            writer.write_all(b"|")?;
        }
        if let Some(location) = slot {
            write!(writer, "{} {}", location.x, location.y)?;
        }
    }
    let marker = if linear { LINEAR } else { NOT_LINEAR };
    write!(writer, ",{marker}")
}

/// Writer for `ways.stage`.
#[derive(Debug)]
pub struct WayStageWriter {
    inner: StageWriter,
}

impl WayStageWriter {
    /// Create (or truncate) the way stage at `path`.
    pub fn create(path: &Utf8Path) -> Result<Self, StagingError> {
        StageWriter::create(path).map(|inner| Self { inner })
    }

    /// Append a way with empty coordinate slots.
    pub fn append(&mut self, way: &Way) -> Result<(), StagingError> {
        let linear = way.has_linear_marker();
        self.inner.write_row(|writer| {
            write_fields(
                writer,
                &way.id,
                &way.refs,
                std::iter::repeat_n(None, way.refs.len()),
                linear,
            )
        })
    }

    /// Flush the stage and return the number of rows written.
    pub fn finish(self) -> Result<u64, StagingError> {
        self.inner.finish()
    }
}

/// Writer for resolver generation files.
#[derive(Debug)]
pub(crate) struct GenerationWriter {
    inner: StageWriter,
}

impl GenerationWriter {
    pub(crate) fn create(path: &Utf8Path) -> Result<Self, StagingError> {
        StageWriter::create(path).map(|inner| Self { inner })
    }

    pub(crate) fn append(&mut self, record: &WayRecord) -> Result<(), StagingError> {
        self.inner
            .write_row(|writer| record.write_row(writer, RowLayout::Generation))
    }

    pub(crate) fn finish(self) -> Result<u64, StagingError> {
        self.inner.finish()
    }
}

/// Sequential reader over way rows.
#[derive(Debug)]
pub struct WayStageReader {
    stage: StageReader,
    layout: RowLayout,
    ordinal: u64,
}

impl WayStageReader {
    /// Open a way file with the given layout.
    pub fn open(path: &Utf8Path, layout: RowLayout) -> Result<Self, StagingError> {
        StageReader::open(path).map(|stage| Self {
            stage,
            layout,
            ordinal: 0,
        })
    }

    /// Read the next record, or `None` at end of file.
    pub fn next_record(&mut self) -> Result<Option<WayRecord>, StagingError> {
        let Some(line) = self.stage.next_line()? else {
            return Ok(None);
        };
        let parsed = WayRecord::parse_row(line, self.layout, self.ordinal);
        self.ordinal += 1;
        parsed.map(Some).map_err(|reason| self.stage.corrupt(reason))
    }
}

impl Iterator for WayStageReader {
    type Item = Result<WayRecord, StagingError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().transpose()
    }
}
