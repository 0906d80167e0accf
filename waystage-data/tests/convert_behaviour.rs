//! Behavioural tests for converting extracts end to end.

use std::{cell::RefCell, fs, io::Write, path::PathBuf};

use bzip2::{Compression, write::BzEncoder};
use geo::LineString;
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use tempfile::TempDir;
use waystage_core::{AttributeSchema, JoinSummary, SqliteGeoStore};
use waystage_data::{
    AssembleError, IngestError, ParseError, PipelineConfig, PipelineError, PipelineReport,
    StagingPaths, assemble_multipolygons, run_with_store,
};

mod support;

const TRIANGLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<osm version="0.6" generator="hand">
  <node id="1" lat="0" lon="0"/>
  <node id="2" lat="0" lon="1"/>
  <node id="3" lat="1" lon="1"/>
  <way id="10">
    <nd ref="1"/><nd ref="2"/><nd ref="3"/><nd ref="1"/>
    <tag k="building" v="yes"/>
  </way>
</osm>
"#;

const TWO_LINES: &str = r#"<osm>
  <node id="1" lat="0" lon="0"/>
  <node id="2" lat="0" lon="1"/>
  <node id="3" lat="1" lon="1"/>
  <way id="10" timestamp="2021-03-04T05:06:07Z"><nd ref="1"/><nd ref="2"/><tag k="name" v="High Street"/></way>
  <way id="11"><nd ref="2"/><nd ref="3"/><tag k="source" v="survey"/></way>
</osm>
"#;

const TWO_MULTIPOLYGONS: &str = r#"<osm>
  <node id="1" lat="0" lon="0"/>
  <node id="2" lat="0" lon="1"/>
  <node id="3" lat="1" lon="1"/>
  <node id="4" lat="1" lon="0"/>
  <way id="10"><nd ref="1"/><nd ref="2"/><nd ref="3"/><nd ref="1"/></way>
  <way id="11"><nd ref="1"/><nd ref="3"/><nd ref="4"/><nd ref="1"/></way>
  <relation id="20">
    <member type="way" ref="10" role="outer"/>
    <tag k="type" v="multipolygon"/>
    <tag k="natural" v="water"/>
  </relation>
  <relation id="21">
    <member type="way" ref="11" role="outer"/>
    <tag k="type" v="multipolygon"/>
    <tag k="landuse" v="meadow"/>
  </relation>
</osm>
"#;

struct Conversion {
    _dir: TempDir,
    config: PipelineConfig,
    store: SqliteGeoStore,
}

impl Conversion {
    fn with_input(name: &str, bytes: &[u8]) -> Self {
        let (dir, root) = support::scratch_dir();
        let input = root.join(name);
        fs::write(&input, bytes).expect("write extract");
        let config = PipelineConfig::new(input, root.join("unused.sqlite"), root.join("work"));
        waystage_fs::ensure_dir(&config.working_dir).expect("create working dir");
        let store =
            SqliteGeoStore::in_memory(&AttributeSchema::standard(), &AttributeSchema::relation())
                .expect("open in-memory store");
        Self {
            _dir: dir,
            config,
            store,
        }
    }

    fn convert(&mut self) -> Result<PipelineReport, PipelineError> {
        let window = self.config.validate()?;
        run_with_store(
            &self.config,
            window,
            &AttributeSchema::standard(),
            &AttributeSchema::relation(),
            &mut self.store,
        )
    }

    fn staging(&self) -> StagingPaths {
        StagingPaths::in_dir(&self.config.working_dir)
    }
}

type Outcome = RefCell<Option<Result<PipelineReport, PipelineError>>>;

#[fixture]
fn conversion() -> RefCell<Option<Conversion>> {
    RefCell::new(None)
}

#[fixture]
fn outcome() -> Outcome {
    RefCell::new(None)
}

fn expect_report(outcome: &Outcome) -> PipelineReport {
    outcome
        .borrow()
        .as_ref()
        .expect("conversion was attempted")
        .as_ref()
        .expect("expected successful conversion")
        .clone()
}

#[given("an extract with a closed triangular way")]
fn triangle_extract(#[from(conversion)] conversion: &RefCell<Option<Conversion>>) {
    *conversion.borrow_mut() = Some(Conversion::with_input("triangle.osm", TRIANGLE.as_bytes()));
}

#[given("an extract with a node missing its latitude")]
fn node_without_latitude(#[from(conversion)] conversion: &RefCell<Option<Conversion>>) {
    let xml = r#"<osm><node id="7" lon="1"/></osm>"#;
    *conversion.borrow_mut() = Some(Conversion::with_input("broken.osm", xml.as_bytes()));
}

#[given("a bzip2-compressed copy of the triangle extract")]
fn compressed_triangle(#[from(conversion)] conversion: &RefCell<Option<Conversion>>) {
    let mut encoder = BzEncoder::new(Vec::new(), Compression::best());
    encoder
        .write_all(TRIANGLE.as_bytes())
        .expect("compress extract");
    let compressed = encoder.finish().expect("finish bzip2 stream");
    *conversion.borrow_mut() = Some(Conversion::with_input("triangle.osm.bz2", &compressed));
}

#[given("an extract with one tagged and one untagged line")]
fn tagged_and_untagged(#[from(conversion)] conversion: &RefCell<Option<Conversion>>) {
    *conversion.borrow_mut() = Some(Conversion::with_input("lines.osm", TWO_LINES.as_bytes()));
}

#[given("an extract with a multipolygon relation")]
fn multipolygon_extract(#[from(conversion)] conversion: &RefCell<Option<Conversion>>) {
    *conversion.borrow_mut() = Some(Conversion::with_input(
        "water.osm",
        TWO_MULTIPOLYGONS.as_bytes(),
    ));
}

#[when("I convert the extract")]
fn convert_extract(
    #[from(conversion)] conversion: &RefCell<Option<Conversion>>,
    #[from(outcome)] outcome: &Outcome,
) {
    let result = conversion
        .borrow_mut()
        .as_mut()
        .expect("extract prepared")
        .convert();
    *outcome.borrow_mut() = Some(result);
}

#[when("the relation members file is rewritten out of order")]
fn reorder_members(#[from(conversion)] conversion: &RefCell<Option<Conversion>>) {
    let guard = conversion.borrow();
    let members = guard.as_ref().expect("extract prepared").staging().members;
    let contents = fs::read_to_string(&members).expect("read members file");
    let reversed: Vec<&str> = contents.lines().rev().collect();
    fs::write(&members, format!("{}\n", reversed.join("\n"))).expect("rewrite members file");
}

#[then("the way is stored as a single-ring polygon")]
fn single_ring_polygon(
    #[from(conversion)] conversion: &RefCell<Option<Conversion>>,
    #[from(outcome)] outcome: &Outcome,
) {
    let report = expect_report(outcome);
    assert_eq!(report.build.polygons, 1, "expected one polygon");
    assert_eq!(report.build.lines, 0, "expected no lines");

    let guard = conversion.borrow();
    let store = &guard.as_ref().expect("extract prepared").store;
    let polygon = store
        .polygon("10")
        .expect("read polygon")
        .expect("polygon stored for way 10");
    assert_eq!(
        polygon.exterior(),
        &LineString::from(vec![(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 0.0)])
    );
    assert!(polygon.interiors().is_empty(), "expected a single ring");
}

#[then("a malformed input error names the lat attribute")]
fn malformed_latitude(#[from(outcome)] outcome: &Outcome) {
    let borrowed = outcome.borrow();
    match borrowed.as_ref().expect("conversion was attempted") {
        Err(PipelineError::Ingest(IngestError::Parse(ParseError::MalformedInput {
            element,
            id,
            attribute,
        }))) => {
            assert_eq!(*element, "node");
            assert_eq!(id.as_deref(), Some("7"));
            assert_eq!(*attribute, "lat");
        }
        other => panic!("expected malformed input, got {other:?}"),
    }
}

#[then("the export keeps only the tagged line")]
fn export_keeps_tagged_line(
    #[from(conversion)] conversion: &RefCell<Option<Conversion>>,
    #[from(outcome)] outcome: &Outcome,
) {
    let report = expect_report(outcome);
    assert_eq!(report.build.lines, 2, "both lines are built");
    assert_eq!(
        report.export,
        JoinSummary {
            lines: 1,
            polygons: 0
        }
    );

    let guard = conversion.borrow();
    let store = &guard.as_ref().expect("extract prepared").store;
    let (name, timestamp): (String, Option<String>) = store
        .connection()
        .query_row("SELECT name, timestamp FROM way_lines_final", [], |row| {
            Ok((row.get(0)?, row.get(1)?))
        })
        .expect("read exported line");
    assert_eq!(name, "High Street");
    assert_eq!(timestamp.as_deref(), Some("2021-03-04T05:06:07Z"));
}

#[then("assembling again raises an identifier alignment error")]
fn alignment_error(
    #[from(conversion)] conversion: &RefCell<Option<Conversion>>,
    #[from(outcome)] outcome: &Outcome,
) {
    let report = expect_report(outcome);
    assert_eq!(report.assemble.assembled, 2, "first assembly succeeds");

    let mut guard = conversion.borrow_mut();
    let conversion = guard.as_mut().expect("extract prepared");
    let members = conversion.staging().members;
    let err = assemble_multipolygons(&mut conversion.store, &members)
        .expect_err("drift must be detected");
    match err {
        AssembleError::IdentifierAlignment { expected, found } => {
            assert_eq!(expected.as_deref(), Some("20"));
            assert_eq!(found.as_deref(), Some("21"));
        }
        other => panic!("expected an alignment error, got {other:?}"),
    }
}

#[test]
fn scenario_indices_follow_feature_order() {
    let feature =
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/features/convert_extract.feature");
    let contents = fs::read_to_string(&feature).unwrap_or_else(|err| {
        panic!("failed to read feature file {feature:?}: {err}");
    });
    let titles: Vec<&str> = contents
        .lines()
        .filter_map(|line| line.trim().strip_prefix("Scenario: "))
        .collect();
    assert_eq!(
        titles,
        [
            "building a polygon from a closed way",
            "rejecting a node without a latitude",
            "reading bzip2-compressed input",
            "dropping unattributed geometry from the export",
            "detecting drift in the relation members",
        ],
        "scenario order changed in feature file"
    );
}

#[scenario(path = "tests/features/convert_extract.feature", index = 0)]
fn building_polygon_from_closed_way(conversion: RefCell<Option<Conversion>>, outcome: Outcome) {
    let _ = (conversion, outcome);
}

#[scenario(path = "tests/features/convert_extract.feature", index = 1)]
fn rejecting_node_without_latitude(conversion: RefCell<Option<Conversion>>, outcome: Outcome) {
    let _ = (conversion, outcome);
}

#[scenario(path = "tests/features/convert_extract.feature", index = 2)]
fn reading_bzip2_input(conversion: RefCell<Option<Conversion>>, outcome: Outcome) {
    let _ = (conversion, outcome);
}

#[scenario(path = "tests/features/convert_extract.feature", index = 3)]
fn dropping_unattributed_geometry(conversion: RefCell<Option<Conversion>>, outcome: Outcome) {
    let _ = (conversion, outcome);
}

#[scenario(path = "tests/features/convert_extract.feature", index = 4)]
fn detecting_member_drift(conversion: RefCell<Option<Conversion>>, outcome: Outcome) {
    let _ = (conversion, outcome);
}
