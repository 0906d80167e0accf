//! Parse-phase sink: routes elements to the staging files and the stores.

use log::{info, warn};
use thiserror::Error;
use waystage_core::{
    AttributeSchema, AttributeStore, Element, GeometryStore, Point, Relation, StoreError, Way,
};

use crate::parse::ParseError;
use crate::staging::{
    MemberStageWriter, PointStageWriter, StagingError, StagingPaths, WayStageWriter,
};

/// Errors raised during the parse phase.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Decoding the input failed.
    #[error(transparent)]
    Parse(#[from] ParseError),
    /// Writing a staging file failed.
    #[error(transparent)]
    Staging(#[from] StagingError),
    /// Writing to the stores failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Counts and recoverable conditions from the parse phase.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IngestReport {
    /// Points written to the point stage.
    pub staged_points: u64,
    /// Ways written to the way stage.
    pub staged_ways: u64,
    /// Points carrying recognised tags, written as point features.
    pub tagged_points: u64,
    /// Ways with an attribute row.
    pub attributed_ways: u64,
    /// Relations with an attribute row.
    pub relations: u64,
    /// Multipolygon relations retained for assembly.
    pub multipolygons: u64,
    /// Ways rejected for having fewer than two references.
    pub short_ways: Vec<String>,
}

/// Sink handed to the parser during the parse phase.
///
/// Points are staged and, when tagged, stored as point features. A point
/// counts as tagged only when one of its keys is in the schema; a node whose
/// tags are all unrecognised is staged for resolution but gets no point row.
/// Ways with
/// at least two references are staged; their attribute row is appended only
/// when a recognised tag is present. Every relation gets an attribute row;
/// multipolygons are also inserted into the geometry store and written to
/// the side-channel in the same order.
pub struct StagingSink<'a, S: ?Sized> {
    schema: &'a AttributeSchema,
    relation_schema: &'a AttributeSchema,
    store: &'a mut S,
    points: PointStageWriter,
    ways: WayStageWriter,
    members: MemberStageWriter,
    report: IngestReport,
}

impl<'a, S> StagingSink<'a, S>
where
    S: GeometryStore + AttributeStore + ?Sized,
{
    /// Create the staging files under `paths` and route into `store`.
    pub fn create(
        paths: &StagingPaths,
        schema: &'a AttributeSchema,
        relation_schema: &'a AttributeSchema,
        store: &'a mut S,
    ) -> Result<Self, StagingError> {
        Ok(Self {
            schema,
            relation_schema,
            store,
            points: PointStageWriter::create(&paths.points)?,
            ways: WayStageWriter::create(&paths.ways)?,
            members: MemberStageWriter::create(&paths.members)?,
            report: IngestReport::default(),
        })
    }

    /// Route one element.
    pub fn accept(&mut self, element: Element) -> Result<(), IngestError> {
        match element {
            Element::Point(point) => self.accept_point(&point),
            Element::Way(way) => self.accept_way(&way),
            Element::Relation(relation) => self.accept_relation(&relation),
        }
    }

    fn accept_point(&mut self, point: &Point) -> Result<(), IngestError> {
        self.points.append(&point.id, point.location)?;
        self.report.staged_points += 1;
        let attributes = self.schema.project(&point.tags);
        if attributes.has_attributes() {
            self.store
                .insert_point(
                &point.id,
                point.location,
                point.timestamp.as_deref(),
                &attributes,
            )?;
            self.report.tagged_points += 1;
        }
        Ok(())
    }

    fn accept_way(&mut self, way: &Way) -> Result<(), IngestError> {
        if !way.has_enough_refs() {
            warn!(
                "Skipping way {} with {} reference(s); at least {} are required",
                way.id,
                way.refs.len(),
                Way::MIN_REFS
            );
            self.report.short_ways.push(way.id.clone());
            return Ok(());
        }
        self.ways.append(way)?;
        self.report.staged_ways += 1;
        let attributes = self.schema.project(&way.tags);
        if attributes.has_attributes() {
            self.store
                .append_way_attributes(&way.id, way.timestamp.as_deref(), &attributes)?;
            self.report.attributed_ways += 1;
        }
        Ok(())
    }

    fn accept_relation(&mut self, relation: &Relation) -> Result<(), IngestError> {
        let attributes = self.relation_schema.project(&relation.tags);
        let timestamp = relation.timestamp.as_deref();
        self.store
            .append_relation_attributes(&relation.id, timestamp, &attributes)?;
        self.report.relations += 1;
        if relation.is_multipolygon() {
            let attributes = self.schema.project(&relation.tags);
            self.store
                .insert_multipolygon(&relation.id, timestamp, &attributes)?;
            self.members
                .append(&relation.id, relation.way_member_ids())?;
            self.report.multipolygons += 1;
        }
        Ok(())
    }

    /// Flush the staging files and return the phase report.
    pub fn finish(self) -> Result<IngestReport, StagingError> {
        self.points.finish()?;
        self.ways.finish()?;
        self.members.finish()?;
        let report = self.report;
        if !report.short_ways.is_empty() {
            warn!(
                "{} ways had fewer than {} references and were skipped",
                report.short_ways.len(),
                Way::MIN_REFS
            );
        }
        info!(
            "Staged {} points and {} ways; {} multipolygons retained",
            report.staged_points, report.staged_ways, report.multipolygons
        );
        Ok(report)
    }
}
