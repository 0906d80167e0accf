//! Multipolygon assembly from member-way polygons.
//!
//! Multipolygon rows are walked in store insertion order alongside the
//! relation-members side-channel. The two must stay aligned row for row;
//! any drift is fatal because attributes and geometries would otherwise be
//! attached to the wrong relation.

use std::collections::HashMap;

use camino::Utf8Path;
use geo::{MultiPolygon, Polygon};
use log::{info, warn};
use thiserror::Error;
use waystage_core::{GeometryStore, StoreError};

use crate::staging::{MemberStageReader, StagingError};

/// Errors raised while assembling multipolygons.
#[derive(Debug, Error)]
pub enum AssembleError {
    /// The side-channel row does not belong to the current store row.
    ///
    /// `expected` is `None` when the side-channel has more rows than the
    /// store; `found` is `None` when it ends early.
    #[error(
        "multipolygon identifiers mismatch: store row {}, members row {}",
        .expected.as_deref().unwrap_or("<none>"),
        .found.as_deref().unwrap_or("<none>")
    )]
    IdentifierAlignment {
        /// Identifier from the geometry store.
        expected: Option<String>,
        /// Identifier from the side-channel.
        found: Option<String>,
    },
    /// Reading the side-channel failed.
    #[error(transparent)]
    Staging(#[from] StagingError),
    /// Reading or writing the geometry store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Outcome of an assembly run.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AssembleReport {
    /// Multipolygons that received at least one ring.
    pub assembled: u64,
    /// Multipolygons left without geometry.
    pub empty: Vec<String>,
}

/// Assemble every multipolygon in `store` from the side-channel at
/// `members`.
///
/// Each member way contributes every ring of its polygon (exterior and
/// interiors, each as its own part) in member-list order. Roles are not
/// consulted and no orientation or nesting is derived.
pub fn assemble_multipolygons<S>(
    store: &mut S,
    members: &Utf8Path,
) -> Result<AssembleReport, AssembleError>
where
    S: GeometryStore + ?Sized,
{
    let mut reader = MemberStageReader::open(members)?;
    let mut report = AssembleReport::default();

    for expected in store.multipolygon_ids()? {
        let Some(row) = reader.next_row()? else {
            return Err(AssembleError::IdentifierAlignment {
                expected: Some(expected),
                found: None,
            });
        };
        if row.id != expected {
            return Err(AssembleError::IdentifierAlignment {
                expected: Some(expected),
                found: Some(row.id),
            });
        }

        let ids: Vec<&str> = row.ways.iter().map(String::as_str).collect();
        let polygons: HashMap<String, Polygon<f64>> =
            store.polygons_by_ids(&ids)?.into_iter().collect();
        let parts = ring_parts(&row.ways, &polygons);
        if parts.is_empty() {
            warn!("Multipolygon {expected} has no polygon members; geometry left empty");
            report.empty.push(expected);
            continue;
        }
        store.set_multipolygon_geometry(&expected, &MultiPolygon::new(parts))?;
        report.assembled += 1;
    }

    if let Some(extra) = reader.next_row()? {
        return Err(AssembleError::IdentifierAlignment {
            expected: None,
            found: Some(extra.id),
        });
    }

    info!(
        "Assembled {} multipolygons ({} empty)",
        report.assembled,
        report.empty.len()
    );
    Ok(report)
}

fn ring_parts(ways: &[String], polygons: &HashMap<String, Polygon<f64>>) -> Vec<Polygon<f64>> {
    ways.iter()
        .filter_map(|way| polygons.get(way))
        .flat_map(|polygon| {
            std::iter::once(polygon.exterior())
                .chain(polygon.interiors())
                .map(|ring| Polygon::new(ring.clone(), Vec::new()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use geo::{LineString, polygon};
    use rstest::{fixture, rstest};
    use tempfile::TempDir;
    use waystage_core::test_support::MemoryGeoStore;
    use waystage_core::{AttributeSchema, Tags};

    use crate::staging::MemberStageWriter;

    struct Scene {
        _dir: TempDir,
        members: Utf8PathBuf,
        store: MemoryGeoStore,
    }

    impl Scene {
        fn relation(&mut self, id: &str) {
            let attributes = AttributeSchema::standard().project(&Tags::new());
            self.store
                .insert_multipolygon(id, None, &attributes)
                .expect("insert multipolygon");
        }

        fn side_channel(&self, rows: &[(&str, &[&str])]) {
            let mut writer = MemberStageWriter::create(&self.members).expect("create stage");
            for (id, ways) in rows {
                writer
                    .append(id, ways.iter().copied())
                    .expect("append row");
            }
            writer.finish().expect("finish stage");
        }
    }

    #[fixture]
    fn scene() -> Scene {
        let dir = TempDir::new().expect("create temp dir");
        let members = Utf8PathBuf::from_path_buf(dir.path().join("members.stage"))
            .expect("utf-8 temp path");
        let mut store =
            MemoryGeoStore::new(&AttributeSchema::standard(), &AttributeSchema::relation());
        let first = polygon![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0), (x: 0.0, y: 0.0)];
        let second =
            polygon![(x: 2.0, y: 2.0), (x: 3.0, y: 2.0), (x: 3.0, y: 3.0), (x: 2.0, y: 2.0)];
        store.upsert_polygon("A", &first).expect("store A");
        store.upsert_polygon("B", &second).expect("store B");
        Scene {
            _dir: dir,
            members,
            store,
        }
    }

    fn rings(shape: &MultiPolygon<f64>) -> Vec<LineString<f64>> {
        shape.iter().map(|part| part.exterior().clone()).collect()
    }

    #[rstest]
    fn concatenates_member_rings_in_member_order(mut scene: Scene) {
        scene.relation("R");
        scene.side_channel(&[("R", &["B", "missing", "A"])]);

        let report =
            assemble_multipolygons(&mut scene.store, &scene.members).expect("assemble");
        assert_eq!(report.assembled, 1);

        let shape = scene.store.multipolygon("R").expect("geometry assigned");
        assert_eq!(
            rings(shape),
            vec![
                LineString::from(vec![(2.0, 2.0), (3.0, 2.0), (3.0, 3.0), (2.0, 2.0)]),
                LineString::from(vec![(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 0.0)]),
            ]
        );
    }

    #[rstest]
    fn interiors_become_separate_parts(mut scene: Scene) {
        let holed = Polygon::new(
            LineString::from(vec![(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 0.0)]),
            vec![LineString::from(vec![
                (1.0, 1.0),
                (2.0, 1.0),
                (2.0, 2.0),
                (1.0, 1.0),
            ])],
        );
        scene.store.upsert_polygon("H", &holed).expect("store H");
        scene.relation("R");
        scene.side_channel(&[("R", &["H"])]);

        assemble_multipolygons(&mut scene.store, &scene.members).expect("assemble");
        let shape = scene.store.multipolygon("R").expect("geometry assigned");
        assert_eq!(shape.0.len(), 2);
        assert!(shape.iter().all(|part| part.interiors().is_empty()));
    }

    #[rstest]
    fn relations_without_polygon_members_stay_empty(mut scene: Scene) {
        scene.relation("R");
        scene.side_channel(&[("R", &["line-only"])]);

        let report =
            assemble_multipolygons(&mut scene.store, &scene.members).expect("assemble");
        assert_eq!(report.empty, vec!["R".to_owned()]);
        assert!(scene.store.multipolygon("R").is_none());
    }

    #[rstest]
    #[case(&[("R1", &["A"] as &[&str]), ("R9", &["B"] as &[&str])], Some("R2"), Some("R9"))]
    #[case(&[("R1", &["A"] as &[&str])], Some("R2"), None)]
    #[case(
        &[("R1", &["A"] as &[&str]), ("R2", &["B"] as &[&str]), ("R3", &[] as &[&str])],
        None,
        Some("R3")
    )]
    fn drift_is_an_alignment_fault(
        mut scene: Scene,
        #[case] rows: &[(&str, &[&str])],
        #[case] expected: Option<&str>,
        #[case] found: Option<&str>,
    ) {
        scene.relation("R1");
        scene.relation("R2");
        scene.side_channel(rows);

        let err = assemble_multipolygons(&mut scene.store, &scene.members)
            .expect_err("side-channel drifted");
        let AssembleError::IdentifierAlignment {
            expected: actual_expected,
            found: actual_found,
        } = err
        else {
            panic!("expected alignment fault, got {err:?}");
        };
        assert_eq!(actual_expected.as_deref(), expected);
        assert_eq!(actual_found.as_deref(), found);
    }
}
