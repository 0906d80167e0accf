//! OpenStreetMap element records produced by the stream parser.
//!
//! Identifiers are kept as strings exactly as they appear in the source so
//! that XML and PBF inputs share one identifier space and staging rows can be
//! written without re-encoding.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use geo::Coord;
use thiserror::Error;

/// Free-form OpenStreetMap key/value tags. Keys are unique per element.
pub type Tags = HashMap<String, String>;

/// Tag whose non-empty presence keeps a closed way linear.
///
/// Closed highways (roundabouts, service loops) stay lines rather than
/// becoming areas. The marker wins over closedness.
pub const LINEAR_MARKER_KEY: &str = "highway";

/// Tag carrying a relation's type.
pub const RELATION_TYPE_KEY: &str = "type";

/// Relation type retained for polygon assembly.
pub const MULTIPOLYGON_TYPE: &str = "multipolygon";

/// A located point.
///
/// # Examples
/// ```
/// use geo::Coord;
/// use waystage_core::{Point, Tags};
///
/// let point = Point::new("42", Coord { x: 6.13, y: 49.61 }, Tags::new());
/// assert_eq!(point.id, "42");
/// assert!(point.tags.is_empty());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    /// Identifier, stable across the whole run.
    pub id: String,
    /// WGS84 position (`x = longitude`, `y = latitude`).
    pub location: Coord<f64>,
    /// Raw tags attached to the point.
    pub tags: Tags,
    /// Last-edit time as given by the source, if any.
    pub timestamp: Option<String>,
}

impl Point {
    /// Construct a point from its parts.
    pub fn new(id: impl Into<String>, location: Coord<f64>, tags: Tags) -> Self {
        Self {
            id: id.into(),
            location,
            tags,
            timestamp: None,
        }
    }

    /// Attach the source timestamp.
    #[must_use]
    pub fn with_timestamp(mut self, timestamp: Option<String>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// An ordered sequence of point references.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Way {
    /// Identifier of the way.
    pub id: String,
    /// Referenced point identifiers in drawing order.
    pub refs: Vec<String>,
    /// Raw tags attached to the way.
    pub tags: Tags,
    /// Last-edit time as given by the source, if any.
    pub timestamp: Option<String>,
}

impl Way {
    /// Minimum number of references a way needs to describe a geometry.
    pub const MIN_REFS: usize = 2;

    /// Construct a way from its parts.
    pub fn new(id: impl Into<String>, refs: Vec<String>, tags: Tags) -> Self {
        Self {
            id: id.into(),
            refs,
            tags,
            timestamp: None,
        }
    }

    /// Attach the source timestamp.
    #[must_use]
    pub fn with_timestamp(mut self, timestamp: Option<String>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Report whether the way has enough references to form a geometry.
    #[must_use]
    pub fn has_enough_refs(&self) -> bool {
        self.refs.len() >= Self::MIN_REFS
    }

    /// A way is closed when its first and last references are equal.
    ///
    /// # Examples
    /// ```
    /// use waystage_core::{Tags, Way};
    ///
    /// let refs = ["a", "b", "c", "a"].map(String::from).to_vec();
    /// assert!(Way::new("1", refs, Tags::new()).is_closed());
    /// ```
    #[must_use]
    pub fn is_closed(&self) -> bool {
        is_closed(&self.refs)
    }

    /// Report whether the way carries a non-empty linear marker tag.
    #[must_use]
    pub fn has_linear_marker(&self) -> bool {
        has_linear_marker(&self.tags)
    }

    /// Closed ways without the linear marker become polygons.
    ///
    /// # Examples
    /// ```
    /// use waystage_core::{Tags, Way};
    ///
    /// let refs = ["a", "b", "c", "a"].map(String::from).to_vec();
    /// let area = Way::new("1", refs.clone(), Tags::new());
    /// let roundabout = Way::new(
    ///     "2",
    ///     refs,
    ///     Tags::from([("highway".into(), "primary".into())]),
    /// );
    ///
    /// assert!(area.is_area_candidate());
    /// assert!(!roundabout.is_area_candidate());
    /// ```
    #[must_use]
    pub fn is_area_candidate(&self) -> bool {
        is_area_candidate(&self.refs, self.has_linear_marker())
    }
}

/// Report whether a reference list is closed: at least two references with
/// equal first and last entries.
#[must_use]
pub fn is_closed<R: PartialEq>(refs: &[R]) -> bool {
    refs.len() >= Way::MIN_REFS && refs.first() == refs.last()
}

/// Area-candidate rule shared by parsed and staged ways.
///
/// A closed reference list becomes a polygon unless the way carries the
/// linear marker; the marker wins over closedness.
///
/// # Examples
/// ```
/// use waystage_core::element::is_area_candidate;
///
/// assert!(is_area_candidate(&["a", "b", "c", "a"], false));
/// assert!(!is_area_candidate(&["a", "b", "c", "a"], true));
/// assert!(!is_area_candidate(&["a", "b", "c"], false));
/// ```
#[must_use]
pub fn is_area_candidate<R: PartialEq>(refs: &[R], linear: bool) -> bool {
    is_closed(refs) && !linear
}

/// Report whether `tags` carry a non-empty linear marker.
#[must_use]
pub fn has_linear_marker(tags: &Tags) -> bool {
    tags.get(LINEAR_MARKER_KEY)
        .is_some_and(|value| !value.is_empty())
}

/// Kind of element a relation member points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemberKind {
    /// A point (`node` in OSM terms).
    Node,
    /// A way.
    Way,
    /// Another relation.
    Relation,
}

impl MemberKind {
    /// Source spelling of the member kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Node => "node",
            Self::Way => "way",
            Self::Relation => "relation",
        }
    }
}

impl fmt::Display for MemberKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a member type string is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown relation member type {0:?}")]
pub struct UnknownMemberKind(pub String);

impl FromStr for MemberKind {
    type Err = UnknownMemberKind;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "node" => Ok(Self::Node),
            "way" => Ok(Self::Way),
            "relation" => Ok(Self::Relation),
            other => Err(UnknownMemberKind(other.to_owned())),
        }
    }
}

/// A typed reference from a relation to another element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    /// Kind of the referenced element.
    pub kind: MemberKind,
    /// Identifier of the referenced element.
    pub reference: String,
    /// Optional role such as `outer` or `inner`.
    pub role: Option<String>,
}

impl Member {
    /// Construct a member reference.
    pub fn new(kind: MemberKind, reference: impl Into<String>, role: Option<String>) -> Self {
        Self {
            kind,
            reference: reference.into(),
            role,
        }
    }
}

/// A grouping of members with roles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relation {
    /// Identifier of the relation.
    pub id: String,
    /// Raw tags attached to the relation.
    pub tags: Tags,
    /// Members in source order.
    pub members: Vec<Member>,
    /// Last-edit time as given by the source, if any.
    pub timestamp: Option<String>,
}

impl Relation {
    /// Construct a relation from its parts.
    pub fn new(id: impl Into<String>, tags: Tags, members: Vec<Member>) -> Self {
        Self {
            id: id.into(),
            tags,
            members,
            timestamp: None,
        }
    }

    /// Attach the source timestamp.
    #[must_use]
    pub fn with_timestamp(mut self, timestamp: Option<String>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Value of the `type` tag, if present.
    #[must_use]
    pub fn relation_type(&self) -> Option<&str> {
        self.tags.get(RELATION_TYPE_KEY).map(String::as_str)
    }

    /// Report whether the relation is retained for polygon assembly.
    #[must_use]
    pub fn is_multipolygon(&self) -> bool {
        self.relation_type() == Some(MULTIPOLYGON_TYPE)
    }

    /// Identifiers of way members in member-list order.
    ///
    /// Point and relation members are skipped: only way-sourced parts can
    /// contribute rings.
    ///
    /// # Examples
    /// ```
    /// use waystage_core::{Member, MemberKind, Relation, Tags};
    ///
    /// let relation = Relation::new(
    ///     "9",
    ///     Tags::from([("type".into(), "multipolygon".into())]),
    ///     vec![
    ///         Member::new(MemberKind::Way, "1", Some("outer".into())),
    ///         Member::new(MemberKind::Node, "5", None),
    ///         Member::new(MemberKind::Way, "2", Some("inner".into())),
    ///     ],
    /// );
    ///
    /// assert!(relation.is_multipolygon());
    /// assert_eq!(relation.way_member_ids().collect::<Vec<_>>(), ["1", "2"]);
    /// ```
    pub fn way_member_ids(&self) -> impl Iterator<Item = &str> {
        self.members
            .iter()
            .filter(|member| member.kind == MemberKind::Way)
            .map(|member| member.reference.as_str())
    }
}

/// One element decoded from the input stream.
#[derive(Debug, Clone, PartialEq)]
pub enum Element {
    /// A point (`node`).
    Point(Point),
    /// A way.
    Way(Way),
    /// A relation.
    Relation(Relation),
}

impl Element {
    /// Identifier of the wrapped element.
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Point(point) => &point.id,
            Self::Way(way) => &way.id,
            Self::Relation(relation) => &relation.id,
        }
    }

    /// Source timestamp of the wrapped element.
    #[must_use]
    pub fn timestamp(&self) -> Option<&str> {
        match self {
            Self::Point(point) => point.timestamp.as_deref(),
            Self::Way(way) => way.timestamp.as_deref(),
            Self::Relation(relation) => relation.timestamp.as_deref(),
        }
    }
}
