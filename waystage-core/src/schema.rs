//! Fixed attribute schema and the tag projector.
//!
//! OpenStreetMap tags are open-ended; the stores persist a bounded set of
//! columns. [`AttributeSchema::project`] maps a tag map onto that set. The
//! projection is deliberately lossy: keys outside the schema are dropped
//! without warning, so the attribute tables never grow with the input.

use std::collections::HashMap;

use thiserror::Error;

use crate::element::{RELATION_TYPE_KEY, Tags};

/// Columns every attribute table carries ahead of the schema columns.
pub const RESERVED_COLUMNS: &[&str] = &["id", "timestamp"];

/// Tag keys persisted for points and ways, in column order.
pub const STANDARD_KEYS: &[&str] = &[
    "highway",
    "name",
    "name:en",
    "ref",
    "lanes",
    "surface",
    "oneway",
    "maxspeed",
    "tracktype",
    "access",
    "service",
    "foot",
    "bicycle",
    "bridge",
    "barrier",
    "lit",
    "layer",
    "building",
    "building:levels",
    "building:height",
    "addr:housenumber",
    "addr:street",
    "addr:city",
    "addr:postcode",
    "addr:country",
    "addr:place",
    "addr:state",
    "natural",
    "landuse",
    "waterway",
    "power",
    "amenity",
    "place",
    "height",
    "note",
    "railway",
    "public_transport",
    "operator",
    "gauge",
    "width",
    "tunnel",
    "leisure",
    "is_in",
    "ele",
    "shop",
    "man_made",
    "parking",
    "boundary",
    "aerialway",
    "aeroway",
    "craft",
    "emergency",
    "geological",
    "historic",
    "military",
    "office",
    "sport",
    "tourism",
    "traffic_calming",
    "entrance",
    "crossing",
];

/// Errors raised while building an [`AttributeSchema`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// The schema would contain no fields.
    #[error("attribute schema must contain at least one field")]
    Empty,
    /// Two keys produced the same storage column.
    #[error("tag keys {first:?} and {second:?} both map to column {column:?}")]
    DuplicateColumn {
        /// Key that claimed the column first.
        first: String,
        /// Key that collided with it.
        second: String,
        /// Column name both keys produce.
        column: String,
    },
    /// A column reserved for element metadata was requested.
    #[error("tag key {key:?} maps to the reserved column {column:?}")]
    ReservedColumn {
        /// Offending tag key.
        key: String,
        /// Reserved column it maps to.
        column: String,
    },
}

/// One recognised tag key and the column it is stored in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaField {
    key: String,
    column: String,
}

impl SchemaField {
    /// Build a field for `key`, deriving a column name by replacing every
    /// character outside `[A-Za-z0-9_]` with `_`.
    ///
    /// # Examples
    /// ```
    /// use waystage_core::SchemaField;
    ///
    /// let field = SchemaField::new("addr:street");
    /// assert_eq!(field.key(), "addr:street");
    /// assert_eq!(field.column(), "addr_street");
    /// ```
    pub fn new(key: impl Into<String>) -> Self {
        let key = key.into();
        let column = key
            .chars()
            .map(|ch| {
                if ch.is_ascii_alphanumeric() || ch == '_' {
                    ch
                } else {
                    '_'
                }
            })
            .collect();
        Self { key, column }
    }

    /// Tag key matched during projection.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Storage column name.
    #[must_use]
    pub fn column(&self) -> &str {
        &self.column
    }
}

/// Ordered, immutable set of recognised tag keys.
///
/// Build one schema per element family at start-up and pass it by reference
/// to every component that projects or stores attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeSchema {
    fields: Vec<SchemaField>,
    by_key: HashMap<String, usize>,
}

impl AttributeSchema {
    /// Build a schema from tag keys in column order.
    ///
    /// Duplicate keys are ignored after their first occurrence.
    pub fn new<I, K>(keys: I) -> Result<Self, SchemaError>
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        let mut fields: Vec<SchemaField> = Vec::new();
        let mut by_key = HashMap::new();
        let mut columns: HashMap<String, String> = HashMap::new();
        for key in keys {
            let field = SchemaField::new(key);
            if by_key.contains_key(field.key()) {
                continue;
            }
            if let Some(reserved) = RESERVED_COLUMNS
                .iter()
                .find(|reserved| field.column().eq_ignore_ascii_case(reserved))
            {
                return Err(SchemaError::ReservedColumn {
                    key: field.key().to_owned(),
                    column: (*reserved).to_owned(),
                });
            }
            if let Some(first) = columns.get(field.column()) {
                return Err(SchemaError::DuplicateColumn {
                    first: first.clone(),
                    second: field.key().to_owned(),
                    column: field.column().to_owned(),
                });
            }
            columns.insert(field.column().to_owned(), field.key().to_owned());
            by_key.insert(field.key().to_owned(), fields.len());
            fields.push(field);
        }
        if fields.is_empty() {
            return Err(SchemaError::Empty);
        }
        Ok(Self { fields, by_key })
    }

    /// Schema used for points and ways.
    #[must_use]
    pub fn standard() -> Self {
        Self::from_static(STANDARD_KEYS.iter().copied())
    }

    /// Schema used for relations: `type` followed by the standard keys.
    #[must_use]
    pub fn relation() -> Self {
        Self::from_static(std::iter::once(RELATION_TYPE_KEY).chain(STANDARD_KEYS.iter().copied()))
    }

    fn from_static<'a>(keys: impl Iterator<Item = &'a str>) -> Self {
        let mut fields = Vec::new();
        let mut by_key = HashMap::new();
        for key in keys {
            by_key.insert(key.to_owned(), fields.len());
            fields.push(SchemaField::new(key));
        }
        Self { fields, by_key }
    }

    /// Fields in column order.
    #[must_use]
    pub fn fields(&self) -> &[SchemaField] {
        &self.fields
    }

    /// Number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Report whether the schema has no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Column position of `key`, if recognised.
    #[must_use]
    pub fn position(&self, key: &str) -> Option<usize> {
        self.by_key.get(key).copied()
    }

    /// Project `tags` onto the schema.
    ///
    /// Each slot holds the value of the matching tag or `None`. Unrecognised
    /// keys are dropped.
    ///
    /// # Examples
    /// ```
    /// use waystage_core::{AttributeSchema, Tags};
    ///
    /// let schema = AttributeSchema::new(["highway", "name"])?;
    /// let tags = Tags::from([
    ///     ("name".into(), "Rue Neuve".into()),
    ///     ("wikidata".into(), "Q1".into()),
    /// ]);
    /// let vector = schema.project(&tags);
    ///
    /// assert_eq!(vector.values(), &[None, Some("Rue Neuve".to_string())]);
    /// # Ok::<(), waystage_core::schema::SchemaError>(())
    /// ```
    #[must_use]
    pub fn project(&self, tags: &Tags) -> AttributeVector {
        let values = self
            .fields
            .iter()
            .map(|field| tags.get(field.key()).cloned())
            .collect();
        AttributeVector { values }
    }
}

/// Attribute values aligned with an [`AttributeSchema`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AttributeVector {
    values: Vec<Option<String>>,
}

impl AttributeVector {
    /// Wrap pre-projected values. The caller guarantees schema alignment.
    #[must_use]
    pub const fn from_values(values: Vec<Option<String>>) -> Self {
        Self { values }
    }

    /// Values in column order.
    #[must_use]
    pub fn values(&self) -> &[Option<String>] {
        &self.values
    }

    /// Value at column `index`, if set.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&str> {
        self.values.get(index).and_then(Option::as_deref)
    }

    /// Number of slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Report whether the vector has no slots.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Report whether any slot holds a value.
    #[must_use]
    pub fn has_attributes(&self) -> bool {
        self.values.iter().any(Option::is_some)
    }
}
