//! End-to-end conversion: parse, resolve and build, assemble, export.
//!
//! Phases run strictly in sequence. Each phase's writes are grouped in one
//! store batch, and each phase logs a summary before the next begins. A fatal
//! error aborts the run and leaves the staging files in place for
//! inspection.

use std::fmt;
use std::num::NonZeroUsize;
use std::str::FromStr;

use camino::{Utf8Path, Utf8PathBuf};
use log::info;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use waystage_core::{
    AttributeSchema, AttributeStore, GeometryStore, JoinSummary, SqliteGeoStore, StoreError,
};

use crate::assemble::{AssembleError, AssembleReport, assemble_multipolygons};
use crate::build::{BuildSummary, GeometryBuilder};
use crate::ingest::{IngestError, IngestReport, StagingSink};
use crate::parse::{ParseSummary, parse_file};
use crate::resolve::{
    DEFAULT_WINDOW_SIZE, FileWayStore, MemoryWayStore, PendingWayStore, ResolveError,
    ResolveReport, Resolver,
};
use crate::staging::{StagingError, StagingPaths};

/// Where pending ways live between resolver passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WayStoreKind {
    /// Generation files in the working directory; memory stays bounded by
    /// the point window.
    #[default]
    File,
    /// An in-memory arena; faster, but holds every pending way.
    Memory,
}

impl WayStoreKind {
    /// Lowercase name used in configuration.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Memory => "memory",
        }
    }
}

impl fmt::Display for WayStoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raised when a way store name is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown way store {0:?} (expected \"file\" or \"memory\")")]
pub struct UnknownWayStore(pub String);

impl FromStr for WayStoreKind {
    type Err = UnknownWayStore;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "file" => Ok(Self::File),
            "memory" => Ok(Self::Memory),
            _ => Err(UnknownWayStore(value.to_owned())),
        }
    }
}

/// Settings for one conversion run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// OSM extract to convert (`.osm`, `.osm.bz2` or `.osm.pbf`).
    pub input: Utf8PathBuf,
    /// SQLite database to create; existing tables are replaced.
    pub output: Utf8PathBuf,
    /// Directory for the staging files.
    pub working_dir: Utf8PathBuf,
    /// Points held in memory per resolver pass.
    pub window_size: usize,
    /// Backing for pending ways.
    pub way_store: WayStoreKind,
    /// Keep the staging files after a successful run.
    pub keep_staging: bool,
}

impl PipelineConfig {
    /// Configuration with default window, file way store and staging files
    /// removed on success.
    pub fn new(
        input: impl Into<Utf8PathBuf>,
        output: impl Into<Utf8PathBuf>,
        working_dir: impl Into<Utf8PathBuf>,
    ) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            working_dir: working_dir.into(),
            window_size: DEFAULT_WINDOW_SIZE,
            way_store: WayStoreKind::default(),
            keep_staging: false,
        }
    }

    /// Check the settings before any file is touched.
    pub fn validate(&self) -> Result<NonZeroUsize, PipelineError> {
        let window = NonZeroUsize::new(self.window_size).ok_or_else(|| {
            PipelineError::InvalidConfig {
                reason: "window size must be greater than zero".into(),
            }
        })?;
        match waystage_fs::file_is_file(&self.input) {
            Ok(true) => {}
            Ok(false) => {
                return Err(PipelineError::InvalidConfig {
                    reason: format!("input {} is not a file", self.input),
                });
            }
            Err(source) => {
                return Err(PipelineError::Filesystem {
                    path: self.input.clone(),
                    source,
                });
            }
        }
        if self.output.as_str().is_empty() {
            return Err(PipelineError::InvalidConfig {
                reason: "output path is empty".into(),
            });
        }
        Ok(window)
    }
}

/// Errors that abort a conversion run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The configuration was rejected before the run started.
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// What was wrong.
        reason: String,
    },
    /// A directory or file could not be prepared.
    #[error("filesystem error at {path}")]
    Filesystem {
        /// Offending path.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The parse phase failed.
    #[error("parse phase failed")]
    Ingest(#[from] IngestError),
    /// The resolve phase failed.
    #[error("resolve phase failed")]
    Resolve(#[from] ResolveError),
    /// The assemble phase failed.
    #[error("assemble phase failed")]
    Assemble(#[from] AssembleError),
    /// A store operation outside a phase failed.
    #[error("geometry store failed")]
    Store(#[from] StoreError),
    /// Staging file housekeeping failed.
    #[error("staging cleanup failed")]
    Staging(#[from] StagingError),
}

/// Aggregated per-phase outcome of a run.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PipelineReport {
    /// Elements decoded.
    pub parse: ParseSummary,
    /// Staging and attribute counts, plus short ways.
    pub ingest: IngestReport,
    /// Resolver passes and unresolved ways.
    pub resolve: ResolveReport,
    /// Lines and polygons written.
    pub build: BuildSummary,
    /// Multipolygons assembled or left empty.
    pub assemble: AssembleReport,
    /// Rows in the attribute-joined export views.
    pub export: JoinSummary,
}

/// Convert `config.input` into a fresh SQLite database at `config.output`.
pub fn run_pipeline(config: &PipelineConfig) -> Result<PipelineReport, PipelineError> {
    let window = config.validate()?;
    prepare_dirs(config)?;

    let schema = AttributeSchema::standard();
    let relation_schema = AttributeSchema::relation();
    let mut store =
        SqliteGeoStore::create(config.output.as_std_path(), &schema, &relation_schema)?;
    let report = run_with_store(config, window, &schema, &relation_schema, &mut store)?;

    if config.keep_staging {
        info!("Keeping staging files in {}", config.working_dir);
    } else {
        StagingPaths::in_dir(&config.working_dir).remove_all()?;
    }
    Ok(report)
}

fn prepare_dirs(config: &PipelineConfig) -> Result<(), PipelineError> {
    let filesystem = |path: &Utf8Path| {
        let path = path.to_path_buf();
        move |source| PipelineError::Filesystem { path, source }
    };
    waystage_fs::ensure_parent_dir(&config.output).map_err(filesystem(&config.output))?;
    waystage_fs::ensure_dir(&config.working_dir).map_err(filesystem(&config.working_dir))
}

/// Run every phase against an already opened store.
///
/// Staging files are written to `config.working_dir` and left in place;
/// [`run_pipeline`] decides whether to remove them.
pub fn run_with_store<S>(
    config: &PipelineConfig,
    window: NonZeroUsize,
    schema: &AttributeSchema,
    relation_schema: &AttributeSchema,
    store: &mut S,
) -> Result<PipelineReport, PipelineError>
where
    S: GeometryStore + AttributeStore + ?Sized,
{
    let paths = StagingPaths::in_dir(&config.working_dir);

    info!("Phase 1/4: parsing {}", config.input);
    store.begin_batch()?;
    let mut sink = StagingSink::create(&paths, schema, relation_schema, store)
        .map_err(IngestError::from)?;
    let parse = parse_file(&config.input, |element| sink.accept(element))?;
    let ingest = sink.finish().map_err(IngestError::from)?;
    store.commit_batch()?;

    info!("Phase 2/4: resolving ways ({} store)", config.way_store);
    store.begin_batch()?;
    let (resolve, build) = match config.way_store {
        WayStoreKind::File => {
            let mut pending = FileWayStore::open(&paths.ways, &config.working_dir)?;
            resolve_and_build(&paths, window, &mut pending, store)?
        }
        WayStoreKind::Memory => {
            let mut pending = MemoryWayStore::load(&paths.ways)?;
            resolve_and_build(&paths, window, &mut pending, store)?
        }
    };
    store.commit_batch()?;
    info!(
        "Built {} lines and {} polygons",
        build.lines, build.polygons
    );

    info!("Phase 3/4: assembling multipolygons");
    store.begin_batch()?;
    let assemble = assemble_multipolygons(store, &paths.members)?;
    store.commit_batch()?;

    info!("Phase 4/4: joining attributes");
    let export = store.join_attributes()?;
    info!(
        "Export holds {} attributed lines and {} attributed polygons",
        export.lines, export.polygons
    );

    Ok(PipelineReport {
        parse,
        ingest,
        resolve,
        build,
        assemble,
        export,
    })
}

fn resolve_and_build<P, S>(
    paths: &StagingPaths,
    window: NonZeroUsize,
    pending: &mut P,
    store: &mut S,
) -> Result<(ResolveReport, BuildSummary), ResolveError>
where
    P: PendingWayStore + ?Sized,
    S: GeometryStore + ?Sized,
{
    let mut builder = GeometryBuilder::new(store);
    let report = Resolver::new(window).run(&paths.points, pending, |record| {
        builder.build(record).map_err(ResolveError::from)
    })?;
    Ok((report, builder.summary()))
}
