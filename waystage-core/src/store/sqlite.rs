//! SQLite-backed geometry and attribute store.

use std::{fmt, path::Path};

use geo::{Coord, LineString, MultiPolygon, Polygon};
use rusqlite::{Connection, OptionalExtension, params, params_from_iter, types::Value};
use serde::{Serialize, de::DeserializeOwned};

use crate::schema::{AttributeSchema, AttributeVector};

use super::{AttributeStore, GeometryStore, JoinSummary, StoreError, ensure_width};

/// SQLite limits bound parameters per statement to 999 by default. The store
/// chunks `IN` queries to remain below that ceiling.
const SQLITE_MAX_VARIABLE_NUMBER: usize = 999;

const POINTS: &str = "points";
const WAY_LINES: &str = "way_lines";
const WAY_POLYGONS: &str = "way_polygons";
const WAY_ATTRIBUTES: &str = "way_attributes";
const RELATIONS: &str = "relations";
const MULTIPOLYGONS: &str = "multipolygons";

/// Geometry and attribute tables in one SQLite database.
///
/// Tables:
/// - `points`: tagged points with coordinates and attributes;
/// - `way_lines`, `way_polygons`: way geometries as JSON text;
/// - `way_attributes`: attribute rows of tagged ways;
/// - `relations`: attribute rows of every relation;
/// - `multipolygons`: multipolygon attributes plus a nullable geometry.
///
/// Every attribute-bearing table has a nullable `timestamp` column holding
/// the source element's timestamp. Geometries are serialized with `geo`'s
/// serde support.
pub struct SqliteGeoStore {
    connection: Connection,
    in_batch: bool,
    way_width: usize,
    relation_width: usize,
    sql: Statements,
    way_columns: Vec<String>,
}

struct Statements {
    insert_point: String,
    insert_way_attributes: String,
    insert_relation: String,
    insert_multipolygon: String,
}

impl fmt::Debug for SqliteGeoStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteGeoStore")
            .field("in_batch", &self.in_batch)
            .field("way_width", &self.way_width)
            .field("relation_width", &self.relation_width)
            .finish_non_exhaustive()
    }
}

impl SqliteGeoStore {
    /// Create (or recreate) the output tables in the database at `path`.
    ///
    /// Existing output tables are dropped so every run starts from an empty
    /// store.
    pub fn create(
        path: &Path,
        way_schema: &AttributeSchema,
        relation_schema: &AttributeSchema,
    ) -> Result<Self, StoreError> {
        let connection = Connection::open(path).map_err(|source| StoreError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        Self::with_connection(connection, way_schema, relation_schema)
    }

    /// Create the output tables in an in-memory SQLite database.
    pub fn in_memory(
        way_schema: &AttributeSchema,
        relation_schema: &AttributeSchema,
    ) -> Result<Self, StoreError> {
        let connection = Connection::open_in_memory()?;
        Self::with_connection(connection, way_schema, relation_schema)
    }

    fn with_connection(
        connection: Connection,
        way_schema: &AttributeSchema,
        relation_schema: &AttributeSchema,
    ) -> Result<Self, StoreError> {
        let way_columns = quoted_columns(way_schema);
        let relation_columns = quoted_columns(relation_schema);

        create_table(
            &connection,
            POINTS,
            &format!(
                "id TEXT PRIMARY KEY, lon REAL NOT NULL, lat REAL NOT NULL, timestamp TEXT{}",
                column_definitions(&way_columns)
            ),
        )?;
        create_table(
            &connection,
            WAY_LINES,
            "id TEXT PRIMARY KEY, geometry TEXT NOT NULL",
        )?;
        create_table(
            &connection,
            WAY_POLYGONS,
            "id TEXT PRIMARY KEY, geometry TEXT NOT NULL",
        )?;
        create_table(
            &connection,
            WAY_ATTRIBUTES,
            &format!(
                "id TEXT PRIMARY KEY, timestamp TEXT{}",
                column_definitions(&way_columns)
            ),
        )?;
        create_table(
            &connection,
            RELATIONS,
            &format!(
                "id TEXT PRIMARY KEY, timestamp TEXT{}",
                column_definitions(&relation_columns)
            ),
        )?;
        create_table(
            &connection,
            MULTIPOLYGONS,
            &format!(
                "id TEXT PRIMARY KEY, timestamp TEXT, geometry TEXT{}",
                column_definitions(&way_columns)
            ),
        )?;

        let sql = Statements {
            insert_point: insert_sql(POINTS, &["id", "lon", "lat", "timestamp"], &way_columns),
            insert_way_attributes: insert_sql(WAY_ATTRIBUTES, &["id", "timestamp"], &way_columns),
            insert_relation: insert_sql(RELATIONS, &["id", "timestamp"], &relation_columns),
            insert_multipolygon: insert_sql(MULTIPOLYGONS, &["id", "timestamp"], &way_columns),
        };

        log::debug!(
            "created output tables with {} way columns and {} relation columns",
            way_schema.len(),
            relation_schema.len()
        );
        Ok(Self {
            connection,
            in_batch: false,
            way_width: way_schema.len(),
            relation_width: relation_schema.len(),
            sql,
            way_columns,
        })
    }

    /// Borrow the underlying connection for ad-hoc queries.
    #[must_use]
    pub const fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Read back the line geometry of a way.
    pub fn line(&self, id: &str) -> Result<Option<LineString<f64>>, StoreError> {
        self.read_geometry(WAY_LINES, id)
    }

    /// Read back the polygon geometry of a way.
    pub fn polygon(&self, id: &str) -> Result<Option<Polygon<f64>>, StoreError> {
        self.read_geometry(WAY_POLYGONS, id)
    }

    /// Read back the geometry of a multipolygon. Returns `None` when the row
    /// is missing or its geometry was never assembled.
    pub fn multipolygon(&self, id: &str) -> Result<Option<MultiPolygon<f64>>, StoreError> {
        self.read_geometry(MULTIPOLYGONS, id)
    }

    fn read_geometry<G: DeserializeOwned>(
        &self,
        table: &'static str,
        id: &str,
    ) -> Result<Option<G>, StoreError> {
        let payload: Option<Option<String>> = self
            .connection
            .query_row(
                &format!("SELECT geometry FROM {table} WHERE id = ?1"),
                [id],
                |row| row.get(0),
            )
            .optional()?;
        payload
            .flatten()
            .map(|json| decode(id, &json))
            .transpose()
    }

    fn write_geometry<G: Serialize>(
        &self,
        table: &'static str,
        id: &str,
        geometry: &G,
    ) -> Result<(), StoreError> {
        let json = encode(id, geometry)?;
        let mut statement = self.connection.prepare_cached(&format!(
            "INSERT OR REPLACE INTO {table} (id, geometry) VALUES (?1, ?2)"
        ))?;
        statement
            .execute(params![id, json])
            .map_err(|source| StoreError::WriteRow {
                table,
                id: id.to_owned(),
                source,
            })?;
        Ok(())
    }

    fn insert_row(
        &self,
        table: &'static str,
        sql: &str,
        mut leading: Vec<Value>,
        id: &str,
        attributes: &AttributeVector,
    ) -> Result<(), StoreError> {
        leading.extend(
            attributes
                .values()
                .iter()
                .map(|value| nullable_text(value.as_deref())),
        );
        let mut statement = self.connection.prepare_cached(sql)?;
        statement
            .execute(params_from_iter(leading))
            .map_err(|source| StoreError::WriteRow {
                table,
                id: id.to_owned(),
                source,
            })?;
        Ok(())
    }

    fn create_join_view(&self, view: &str, geometry_table: &str) -> Result<u64, StoreError> {
        let attribute_columns: String = self
            .way_columns
            .iter()
            .map(|column| format!(", a.{column}"))
            .collect();
        self.connection.execute_batch(&format!(
            "DROP VIEW IF EXISTS {view};
             CREATE VIEW {view} AS
                 SELECT g.id, g.geometry, a.timestamp{attribute_columns}
                 FROM {geometry_table} g
                 INNER JOIN {WAY_ATTRIBUTES} a ON a.id = g.id;"
        ))?;
        let count: i64 =
            self.connection
                .query_row(&format!("SELECT COUNT(*) FROM {view}"), [], |row| {
                    row.get(0)
                })?;
        Ok(u64::try_from(count).unwrap_or_default())
    }
}

impl GeometryStore for SqliteGeoStore {
    fn begin_batch(&mut self) -> Result<(), StoreError> {
        if !self.in_batch {
            self.connection.execute_batch("BEGIN")?;
            self.in_batch = true;
        }
        Ok(())
    }

    fn commit_batch(&mut self) -> Result<(), StoreError> {
        if self.in_batch {
            self.connection.execute_batch("COMMIT")?;
            self.in_batch = false;
        }
        Ok(())
    }

    fn insert_point(
        &mut self,
        id: &str,
        location: Coord<f64>,
        timestamp: Option<&str>,
        attributes: &AttributeVector,
    ) -> Result<(), StoreError> {
        ensure_width(id, attributes, self.way_width)?;
        let leading = vec![
            Value::Text(id.to_owned()),
            Value::Real(location.x),
            Value::Real(location.y),
            nullable_text(timestamp),
        ];
        self.insert_row(POINTS, &self.sql.insert_point, leading, id, attributes)
    }

    fn upsert_line(&mut self, id: &str, line: &LineString<f64>) -> Result<(), StoreError> {
        self.write_geometry(WAY_LINES, id, line)
    }

    fn upsert_polygon(&mut self, id: &str, polygon: &Polygon<f64>) -> Result<(), StoreError> {
        self.write_geometry(WAY_POLYGONS, id, polygon)
    }

    fn insert_multipolygon(
        &mut self,
        id: &str,
        timestamp: Option<&str>,
        attributes: &AttributeVector,
    ) -> Result<(), StoreError> {
        ensure_width(id, attributes, self.way_width)?;
        let leading = vec![Value::Text(id.to_owned()), nullable_text(timestamp)];
        self.insert_row(
            MULTIPOLYGONS,
            &self.sql.insert_multipolygon,
            leading,
            id,
            attributes,
        )
    }

    fn multipolygon_ids(&self) -> Result<Vec<String>, StoreError> {
        let mut statement = self
            .connection
            .prepare(&format!("SELECT id FROM {MULTIPOLYGONS} ORDER BY rowid"))?;
        let ids = statement
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(ids)
    }

    fn polygons_by_ids(&self, ids: &[&str]) -> Result<Vec<(String, Polygon<f64>)>, StoreError> {
        let mut polygons = Vec::new();
        for chunk in ids.chunks(SQLITE_MAX_VARIABLE_NUMBER) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let query =
                format!("SELECT id, geometry FROM {WAY_POLYGONS} WHERE id IN ({placeholders})");
            let mut statement = self.connection.prepare(&query)?;
            let mut rows = statement.query(params_from_iter(chunk.iter()))?;
            while let Some(row) = rows.next()? {
                let id: String = row.get(0)?;
                let json: String = row.get(1)?;
                let polygon = decode(&id, &json)?;
                polygons.push((id, polygon));
            }
        }
        Ok(polygons)
    }

    fn set_multipolygon_geometry(
        &mut self,
        id: &str,
        geometry: &MultiPolygon<f64>,
    ) -> Result<(), StoreError> {
        let json = encode(id, geometry)?;
        let mut statement = self.connection.prepare_cached(&format!(
            "UPDATE {MULTIPOLYGONS} SET geometry = ?2 WHERE id = ?1"
        ))?;
        let updated = statement
            .execute(params![id, json])
            .map_err(|source| StoreError::WriteRow {
                table: MULTIPOLYGONS,
                id: id.to_owned(),
                source,
            })?;
        if updated == 0 {
            return Err(StoreError::UnknownMultipolygon { id: id.to_owned() });
        }
        Ok(())
    }

    fn join_attributes(&mut self) -> Result<JoinSummary, StoreError> {
        let lines = self.create_join_view("way_lines_final", WAY_LINES)?;
        let polygons = self.create_join_view("way_polygons_final", WAY_POLYGONS)?;
        Ok(JoinSummary { lines, polygons })
    }
}

impl AttributeStore for SqliteGeoStore {
    fn append_way_attributes(
        &mut self,
        id: &str,
        timestamp: Option<&str>,
        attributes: &AttributeVector,
    ) -> Result<(), StoreError> {
        ensure_width(id, attributes, self.way_width)?;
        let leading = vec![Value::Text(id.to_owned()), nullable_text(timestamp)];
        self.insert_row(
            WAY_ATTRIBUTES,
            &self.sql.insert_way_attributes,
            leading,
            id,
            attributes,
        )
    }

    fn append_relation_attributes(
        &mut self,
        id: &str,
        timestamp: Option<&str>,
        attributes: &AttributeVector,
    ) -> Result<(), StoreError> {
        ensure_width(id, attributes, self.relation_width)?;
        let leading = vec![Value::Text(id.to_owned()), nullable_text(timestamp)];
        self.insert_row(
            RELATIONS,
            &self.sql.insert_relation,
            leading,
            id,
            attributes,
        )
    }
}

fn quoted_columns(schema: &AttributeSchema) -> Vec<String> {
    schema
        .fields()
        .iter()
        .map(|field| format!("\"{}\"", field.column()))
        .collect()
}

fn nullable_text(value: Option<&str>) -> Value {
    value.map_or(Value::Null, |text| Value::Text(text.to_owned()))
}

fn column_definitions(columns: &[String]) -> String {
    columns
        .iter()
        .map(|column| format!(", {column} TEXT"))
        .collect()
}

fn insert_sql(table: &str, leading: &[&str], columns: &[String]) -> String {
    let names: Vec<&str> = leading
        .iter()
        .copied()
        .chain(columns.iter().map(String::as_str))
        .collect();
    let placeholders: Vec<String> = (1..=names.len()).map(|index| format!("?{index}")).collect();
    format!(
        "INSERT OR REPLACE INTO {table} ({}) VALUES ({})",
        names.join(", "),
        placeholders.join(", ")
    )
}

fn create_table(
    connection: &Connection,
    table: &'static str,
    columns: &str,
) -> Result<(), StoreError> {
    connection
        .execute_batch(&format!(
            "DROP TABLE IF EXISTS {table}; CREATE TABLE {table} ({columns});"
        ))
        .map_err(|source| StoreError::CreateSchema { table, source })
}

fn encode<G: Serialize>(id: &str, geometry: &G) -> Result<String, StoreError> {
    serde_json::to_string(geometry).map_err(|source| StoreError::EncodeGeometry {
        id: id.to_owned(),
        source,
    })
}

fn decode<G: DeserializeOwned>(id: &str, json: &str) -> Result<G, StoreError> {
    serde_json::from_str(json).map_err(|source| StoreError::DecodeGeometry {
        id: id.to_owned(),
        source,
    })
}
