//! Streaming element parser.
//!
//! Both decoders hand each element to a caller-supplied sink as soon as it
//! is complete and drop it before reading the next sibling, so memory stays
//! proportional to the largest single element.

use std::io::{self, BufReader};
use std::sync::Arc;

use bzip2::read::MultiBzDecoder;
use camino::{Utf8Path, Utf8PathBuf};
use log::info;
use thiserror::Error;
use waystage_core::Element;

mod pbf;
mod xml;

pub use pbf::parse_pbf;
pub use xml::parse_xml;

/// Characters that delimit staging rows and therefore may not appear in
/// identifiers.
pub const RESERVED_DELIMITERS: &[char] = &[',', '|', '\n', '\r'];

/// Errors raised while decoding the input stream.
#[derive(Debug, Error)]
pub enum ParseError {
    /// A required attribute is missing, unparsable or not stageable.
    #[error(
        "malformed {element} {}: missing or invalid `{attribute}` attribute",
        .id.as_deref().unwrap_or("<unknown id>")
    )]
    MalformedInput {
        /// Element kind as spelled in the source (`node`, `way`, ...).
        element: &'static str,
        /// Identifier of the element when it was readable.
        id: Option<String>,
        /// Offending attribute.
        attribute: &'static str,
    },
    /// The file name does not map to a supported input format.
    #[error("unsupported input format for {path}; expected .osm, .osm.bz2 or .osm.pbf")]
    UnsupportedFormat {
        /// Input path.
        path: Utf8PathBuf,
    },
    /// Opening the input failed.
    #[error("failed to open input at {path}")]
    Open {
        /// Input path.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// The XML stream is not well formed.
    #[error("invalid XML near byte {position}")]
    Xml {
        /// Byte offset reported by the reader.
        position: usize,
        /// Source error produced by `quick-xml`.
        #[source]
        source: quick_xml::Error,
    },
    /// Decoding PBF data failed.
    #[error("failed to decode PBF data at {path}")]
    Pbf {
        /// Input path.
        path: Utf8PathBuf,
        /// Source error produced by `osmpbf`.
        #[source]
        source: osmpbf::Error,
    },
    /// Reading or decompressing the byte stream failed.
    #[error("failed to read input stream")]
    Read {
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },
}

impl ParseError {
    pub(crate) const fn malformed(
        element: &'static str,
        id: Option<String>,
        attribute: &'static str,
    ) -> Self {
        Self::MalformedInput {
            element,
            id,
            attribute,
        }
    }
}

/// Element counts observed while parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ParseSummary {
    /// Points (nodes), including dense PBF nodes.
    pub points: u64,
    /// Ways.
    pub ways: u64,
    /// Relations.
    pub relations: u64,
}

impl ParseSummary {
    pub(crate) const fn record(&mut self, element: &Element) {
        match element {
            Element::Point(_) => self.points += 1,
            Element::Way(_) => self.ways += 1,
            Element::Relation(_) => self.relations += 1,
        }
    }
}

/// Encodings accepted by [`parse_file`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    /// Plain OSM XML (`.osm`, `.xml`).
    Xml,
    /// bzip2-compressed OSM XML (`.osm.bz2`, `.bz2`), possibly multi-stream.
    Bzip2Xml,
    /// OSM PBF (`.osm.pbf`, `.pbf`).
    Pbf,
}

impl InputFormat {
    /// Detect the format from the file name.
    ///
    /// # Examples
    /// ```
    /// use camino::Utf8Path;
    /// use waystage_data::parse::InputFormat;
    ///
    /// assert_eq!(
    ///     InputFormat::from_path(Utf8Path::new("luxembourg.osm.bz2")),
    ///     Some(InputFormat::Bzip2Xml)
    /// );
    /// assert_eq!(InputFormat::from_path(Utf8Path::new("notes.txt")), None);
    /// ```
    #[must_use]
    pub fn from_path(path: &Utf8Path) -> Option<Self> {
        let name = path.file_name()?.to_ascii_lowercase();
        if name.ends_with(".pbf") {
            Some(Self::Pbf)
        } else if name.ends_with(".bz2") {
            Some(Self::Bzip2Xml)
        } else if name.ends_with(".osm") || name.ends_with(".xml") {
            Some(Self::Xml)
        } else {
            None
        }
    }
}

/// Parse the file at `path`, handing every element to `sink`.
///
/// The sink's error type must absorb [`ParseError`] so decoding failures and
/// sink failures share one return channel. The first sink error stops the
/// parse.
pub fn parse_file<E, F>(path: &Utf8Path, sink: F) -> Result<ParseSummary, E>
where
    F: FnMut(Element) -> Result<(), E>,
    E: From<ParseError>,
{
    let format = InputFormat::from_path(path).ok_or_else(|| ParseError::UnsupportedFormat {
        path: path.to_path_buf(),
    })?;
    info!("Parsing {path} as {format:?}");
    let summary = match format {
        InputFormat::Pbf => parse_pbf(path, sink)?,
        InputFormat::Xml => parse_xml(BufReader::new(open(path)?), sink)?,
        InputFormat::Bzip2Xml => {
            parse_xml(BufReader::new(MultiBzDecoder::new(open(path)?)), sink)?
        }
    };
    info!(
        "Parsed {} points, {} ways and {} relations",
        summary.points, summary.ways, summary.relations
    );
    Ok(summary)
}

fn open(path: &Utf8Path) -> Result<cap_std::fs_utf8::File, ParseError> {
    waystage_fs::open_utf8_file(path).map_err(|source| ParseError::Open {
        path: path.to_path_buf(),
        source,
    })
}

/// Check that an identifier is non-empty and free of staging delimiters.
pub(crate) fn stageable_id(
    value: String,
    element: &'static str,
    owner: Option<&str>,
    attribute: &'static str,
) -> Result<String, ParseError> {
    if value.is_empty() || value.contains(RESERVED_DELIMITERS) {
        return Err(ParseError::malformed(
            element,
            owner.map(str::to_owned),
            attribute,
        ));
    }
    Ok(value)
}
