//! OSM PBF decoding via `osmpbf`.

use camino::Utf8Path;
use chrono::{DateTime, SecondsFormat, Utc};
use geo::Coord;
use osmpbf::{ElementReader, RelMemberType};
use waystage_core::{Element, Member, MemberKind, Point, Relation, Tags, Way};

use super::{ParseError, ParseSummary};

/// Parse an OSM PBF file, handing each element to `sink`.
///
/// Numeric identifiers are rendered as decimal strings so PBF and XML
/// inputs share one identifier space. Dense nodes are treated as points.
/// Element timestamps are rendered as RFC 3339 UTC strings, matching the
/// form OSM XML carries.
pub fn parse_pbf<E, F>(path: &Utf8Path, mut sink: F) -> Result<ParseSummary, E>
where
    F: FnMut(Element) -> Result<(), E>,
    E: From<ParseError>,
{
    let pbf_error = |source| ParseError::Pbf {
        path: path.to_path_buf(),
        source,
    };
    let reader = ElementReader::from_path(path.as_std_path()).map_err(pbf_error)?;

    let mut summary = ParseSummary::default();
    let mut failure: Option<E> = None;
    reader
        .for_each(|raw| {
            if failure.is_some() {
                return;
            }
            let element = match convert(raw) {
                Ok(element) => element,
                Err(err) => {
                    failure = Some(err.into());
                    return;
                }
            };
            summary.record(&element);
            if let Err(err) = sink(element) {
                failure = Some(err);
            }
        })
        .map_err(pbf_error)?;

    match failure {
        Some(err) => Err(err),
        None => Ok(summary),
    }
}

fn convert(raw: osmpbf::Element<'_>) -> Result<Element, ParseError> {
    let element = match raw {
        osmpbf::Element::Node(node) => {
            let timestamp = node.info().milli_timestamp().and_then(format_timestamp);
            Element::Point(
                point(node.id(), node.lon(), node.lat(), node.tags())?.with_timestamp(timestamp),
            )
        }
        osmpbf::Element::DenseNode(node) => {
            let timestamp = node
                .info()
                .map(|info| info.milli_timestamp())
                .and_then(format_timestamp);
            Element::Point(
                point(node.id(), node.lon(), node.lat(), node.tags())?.with_timestamp(timestamp),
            )
        }
        osmpbf::Element::Way(way) => Element::Way(
            Way::new(
                way.id().to_string(),
                way.refs().map(|reference| reference.to_string()).collect(),
                collect_tags(way.tags()),
            )
            .with_timestamp(way.info().milli_timestamp().and_then(format_timestamp)),
        ),
        osmpbf::Element::Relation(relation) => {
            let id = relation.id().to_string();
            let members = relation
                .members()
                .map(|member| {
                    let role = member
                        .role()
                        .map_err(|_| ParseError::malformed("relation", Some(id.clone()), "role"))?;
                    let kind = match member.member_type {
                        RelMemberType::Node => MemberKind::Node,
                        RelMemberType::Way => MemberKind::Way,
                        RelMemberType::Relation => MemberKind::Relation,
                    };
                    Ok(Member::new(
                        kind,
                        member.member_id.to_string(),
                        (!role.is_empty()).then(|| role.to_owned()),
                    ))
                })
                .collect::<Result<Vec<_>, ParseError>>()?;
            let timestamp = relation.info().milli_timestamp().and_then(format_timestamp);
            Element::Relation(
                Relation::new(id, collect_tags(relation.tags()), members).with_timestamp(timestamp),
            )
        }
    };
    Ok(element)
}

fn point<'a, T>(id: i64, lon: f64, lat: f64, tags: T) -> Result<Point, ParseError>
where
    T: IntoIterator<Item = (&'a str, &'a str)>,
{
    let id = id.to_string();
    if !lon.is_finite() {
        return Err(ParseError::malformed("node", Some(id), "lon"));
    }
    if !lat.is_finite() {
        return Err(ParseError::malformed("node", Some(id), "lat"));
    }
    Ok(Point::new(id, Coord { x: lon, y: lat }, collect_tags(tags)))
}

fn format_timestamp(millis: i64) -> Option<String> {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .map(|instant| instant.to_rfc3339_opts(SecondsFormat::Secs, true))
}

fn collect_tags<'a, T>(tags: T) -> Tags
where
    T: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut collected = Tags::new();
    for (key, value) in tags {
        collected.insert(key.to_owned(), value.to_owned());
    }
    collected
}
