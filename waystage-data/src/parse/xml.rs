//! OSM XML decoding with `quick-xml` in pull mode.

use std::io::BufRead;

use geo::Coord;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use waystage_core::{Element, Member, MemberKind, Point, Relation, Tags, Way};

use super::{ParseError, ParseSummary, stageable_id};

/// Parse an OSM XML stream, handing each element to `sink`.
///
/// Unknown elements (`bounds`, `changeset`, ...) are skipped. `tag`, `nd`
/// and `member` children attach to the enclosing element; children outside
/// a recognised parent are ignored.
///
/// # Examples
/// ```
/// use waystage_core::Element;
/// use waystage_data::parse::{ParseError, parse_xml};
///
/// let xml = br#"<osm>
///   <node id="1" lon="6.1" lat="49.6"/>
///   <way id="2"><nd ref="1"/><nd ref="1"/></way>
/// </osm>"#;
/// let mut ids = Vec::new();
/// let summary = parse_xml(&xml[..], |element: Element| {
///     ids.push(element.id().to_owned());
///     Ok::<(), ParseError>(())
/// })?;
/// assert_eq!(ids, ["1", "2"]);
/// assert_eq!(summary.points, 1);
/// # Ok::<(), ParseError>(())
/// ```
pub fn parse_xml<R, E, F>(input: R, mut sink: F) -> Result<ParseSummary, E>
where
    R: BufRead,
    F: FnMut(Element) -> Result<(), E>,
    E: From<ParseError>,
{
    let mut reader = Reader::from_reader(input);
    let mut buf = Vec::new();
    let mut current: Option<Element> = None;
    let mut summary = ParseSummary::default();

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|source| xml_error(reader.buffer_position(), source))?;
        let position = reader.buffer_position();
        match event {
            Event::Start(start) => {
                if let Some(element) = open_element(&start, position)? {
                    current = Some(element);
                } else {
                    attach_child(current.as_mut(), &start, position)?;
                }
            }
            Event::Empty(start) => {
                if let Some(element) = open_element(&start, position)? {
                    summary.record(&element);
                    sink(element)?;
                } else {
                    attach_child(current.as_mut(), &start, position)?;
                }
            }
            Event::End(end) => {
                if matches!(end.name().as_ref(), b"node" | b"way" | b"relation")
                    && let Some(element) = current.take()
                {
                    summary.record(&element);
                    sink(element)?;
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(summary)
}

fn xml_error(position: usize, source: quick_xml::Error) -> ParseError {
    match source {
        quick_xml::Error::Io(source) => ParseError::Read { source },
        other => ParseError::Xml {
            position,
            source: other,
        },
    }
}

fn open_element(start: &BytesStart<'_>, position: usize) -> Result<Option<Element>, ParseError> {
    let element = match start.name().as_ref() {
        b"node" => {
            let id = required_id(start, "node", position)?;
            let lon = coordinate(start, "node", &id, "lon", position)?;
            let lat = coordinate(start, "node", &id, "lat", position)?;
            Element::Point(
                Point::new(id, Coord { x: lon, y: lat }, Tags::new())
                    .with_timestamp(timestamp(start, position)?),
            )
        }
        b"way" => {
            let id = required_id(start, "way", position)?;
            Element::Way(
                Way::new(id, Vec::new(), Tags::new()).with_timestamp(timestamp(start, position)?),
            )
        }
        b"relation" => {
            let id = required_id(start, "relation", position)?;
            Element::Relation(
                Relation::new(id, Tags::new(), Vec::new())
                    .with_timestamp(timestamp(start, position)?),
            )
        }
        _ => return Ok(None),
    };
    Ok(Some(element))
}

fn timestamp(start: &BytesStart<'_>, position: usize) -> Result<Option<String>, ParseError> {
    Ok(attribute(start, b"timestamp", position)?.filter(|raw| !raw.is_empty()))
}

fn attach_child(
    current: Option<&mut Element>,
    child: &BytesStart<'_>,
    position: usize,
) -> Result<(), ParseError> {
    let Some(parent) = current else {
        return Ok(());
    };
    match (child.name().as_ref(), parent) {
        (b"tag", parent) => {
            let (kind, owner) = describe(parent);
            let key = attribute(child, b"k", position)?
                .ok_or_else(|| ParseError::malformed(kind, Some(owner.to_owned()), "k"))?;
            let value = attribute(child, b"v", position)?
                .ok_or_else(|| ParseError::malformed(kind, Some(owner.to_owned()), "v"))?;
            tags_mut(parent).insert(key, value);
        }
        (b"nd", Element::Way(way)) => {
            let raw = attribute(child, b"ref", position)?
                .ok_or_else(|| ParseError::malformed("way", Some(way.id.clone()), "ref"))?;
            let reference = stageable_id(raw, "way", Some(&way.id), "ref")?;
            way.refs.push(reference);
        }
        (b"member", Element::Relation(relation)) => {
            let member = member(child, &relation.id, position)?;
            relation.members.push(member);
        }
        _ => {}
    }
    Ok(())
}

fn member(child: &BytesStart<'_>, owner: &str, position: usize) -> Result<Member, ParseError> {
    let malformed = |attribute| ParseError::malformed("relation", Some(owner.to_owned()), attribute);
    let kind = attribute(child, b"type", position)?
        .and_then(|raw| raw.parse::<MemberKind>().ok())
        .ok_or_else(|| malformed("type"))?;
    let raw = attribute(child, b"ref", position)?.ok_or_else(|| malformed("ref"))?;
    let reference = stageable_id(raw, "relation", Some(owner), "ref")?;
    let role = attribute(child, b"role", position)?.filter(|role| !role.is_empty());
    Ok(Member::new(kind, reference, role))
}

const fn describe(element: &Element) -> (&'static str, &String) {
    match element {
        Element::Point(point) => ("node", &point.id),
        Element::Way(way) => ("way", &way.id),
        Element::Relation(relation) => ("relation", &relation.id),
    }
}

const fn tags_mut(element: &mut Element) -> &mut Tags {
    match element {
        Element::Point(point) => &mut point.tags,
        Element::Way(way) => &mut way.tags,
        Element::Relation(relation) => &mut relation.tags,
    }
}

fn required_id(
    start: &BytesStart<'_>,
    element: &'static str,
    position: usize,
) -> Result<String, ParseError> {
    let raw =
        attribute(start, b"id", position)?.ok_or_else(|| ParseError::malformed(element, None, "id"))?;
    stageable_id(raw, element, None, "id")
}

fn coordinate(
    start: &BytesStart<'_>,
    element: &'static str,
    id: &str,
    name: &'static str,
    position: usize,
) -> Result<f64, ParseError> {
    attribute(start, name.as_bytes(), position)?
        .and_then(|raw| raw.trim().parse::<f64>().ok())
        .filter(|value| value.is_finite())
        .ok_or_else(|| ParseError::malformed(element, Some(id.to_owned()), name))
}

fn attribute(
    start: &BytesStart<'_>,
    key: &[u8],
    position: usize,
) -> Result<Option<String>, ParseError> {
    for attr in start.attributes() {
        let attr = attr.map_err(|source| xml_error(position, source.into()))?;
        if attr.key.as_ref() == key {
            let value = attr
                .unescape_value()
                .map_err(|source| xml_error(position, source))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}
