//! Convert command implementation for the waystage CLI.

use camino::{Utf8Path, Utf8PathBuf};
use clap::Parser;
use log::{info, warn};
use ortho_config::{OrthoConfig, SubcmdConfigMerge};
use serde::{Deserialize, Serialize};
use waystage_data::{PipelineConfig, PipelineReport, WayStoreKind, run_pipeline};

use crate::{
    ARG_INPUT, ARG_KEEP_STAGING, ARG_OUTPUT, ARG_WAY_STORE, ARG_WINDOW_SIZE, ARG_WORKING_DIR,
    CliError, ENV_INPUT, ENV_OUTPUT,
};

/// Extension appended to the output path to name the default working
/// directory.
const STAGING_EXTENSION: &str = "staging";

/// CLI arguments for the `convert` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(
    long_about = "Convert an OpenStreetMap extract (.osm, .osm.bz2 or \
                 .osm.pbf) into a SQLite database of point, line, polygon \
                 and multipolygon geometries. Way references are resolved \
                 in bounded windows of points so memory stays flat on large \
                 extracts. Paths can come from CLI flags, configuration \
                 files, or environment variables.",
    about = "Convert an OSM extract into geometry tables"
)]
#[ortho_config(prefix = "WAYSTAGE")]
pub(crate) struct ConvertArgs {
    /// Path to the OSM extract.
    #[arg(long = ARG_INPUT, value_name = "path")]
    #[serde(default)]
    pub(crate) input: Option<Utf8PathBuf>,
    /// Path of the SQLite database to create.
    #[arg(long = ARG_OUTPUT, value_name = "path")]
    #[serde(default)]
    pub(crate) output: Option<Utf8PathBuf>,
    /// Directory for staging files (defaults to `<output>.staging`).
    #[arg(long = ARG_WORKING_DIR, value_name = "dir")]
    #[serde(default)]
    pub(crate) working_dir: Option<Utf8PathBuf>,
    /// Points held in memory per resolver pass.
    #[arg(long = ARG_WINDOW_SIZE, value_name = "points")]
    #[serde(default)]
    pub(crate) window_size: Option<usize>,
    /// Where pending ways live between passes: `file` or `memory`.
    #[arg(long = ARG_WAY_STORE, value_name = "kind")]
    #[serde(default)]
    pub(crate) way_store: Option<WayStoreKind>,
    /// Keep the staging files after a successful run.
    #[arg(
        long = ARG_KEEP_STAGING,
        value_name = "bool",
        num_args = 0..=1,
        default_missing_value = "true"
    )]
    #[serde(default)]
    pub(crate) keep_staging: Option<bool>,
}

impl ConvertArgs {
    pub(crate) fn into_config(self) -> Result<ConvertConfig, CliError> {
        let merged = self.load_and_merge().map_err(CliError::Configuration)?;
        ConvertConfig::try_from(merged)
    }
}

/// Resolved `convert` command configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ConvertConfig {
    pub(crate) pipeline: PipelineConfig,
}

impl ConvertConfig {
    pub(crate) fn validate_sources(&self) -> Result<(), CliError> {
        Self::require_existing(&self.pipeline.input, ARG_INPUT)
    }

    fn require_existing(path: &Utf8Path, field: &'static str) -> Result<(), CliError> {
        match waystage_fs::file_is_file(path) {
            Ok(true) => Ok(()),
            Ok(false) => Err(CliError::SourcePathNotFile {
                field,
                path: path.to_path_buf(),
            }),
            Err(source) if source.kind() == std::io::ErrorKind::NotFound => {
                Err(CliError::MissingSourceFile {
                    field,
                    path: path.to_path_buf(),
                })
            }
            Err(source) => Err(CliError::InspectSourcePath {
                field,
                path: path.to_path_buf(),
                source,
            }),
        }
    }
}

impl TryFrom<ConvertArgs> for ConvertConfig {
    type Error = CliError;

    fn try_from(args: ConvertArgs) -> Result<Self, Self::Error> {
        let input = args.input.ok_or(CliError::MissingArgument {
            field: ARG_INPUT,
            env: ENV_INPUT,
        })?;
        let output = args.output.ok_or(CliError::MissingArgument {
            field: ARG_OUTPUT,
            env: ENV_OUTPUT,
        })?;
        let working_dir = args
            .working_dir
            .unwrap_or_else(|| default_working_dir(&output));

        let mut pipeline = PipelineConfig::new(input, output, working_dir);
        if let Some(window_size) = args.window_size {
            pipeline.window_size = window_size;
        }
        if let Some(way_store) = args.way_store {
            pipeline.way_store = way_store;
        }
        pipeline.keep_staging = args.keep_staging.unwrap_or(false);
        Ok(Self { pipeline })
    }
}

fn default_working_dir(output: &Utf8Path) -> Utf8PathBuf {
    let mut name = output.file_name().unwrap_or("waystage").to_owned();
    name.push('.');
    name.push_str(STAGING_EXTENSION);
    output.with_file_name(name)
}

/// Merge, validate and run the `convert` command.
pub(crate) fn run_convert(args: ConvertArgs) -> Result<PipelineReport, CliError> {
    let config = args.into_config()?;
    config.validate_sources()?;
    config.pipeline.validate()?;
    let report = run_pipeline(&config.pipeline)?;
    log_report(&report, &config.pipeline.output);
    Ok(report)
}

fn log_report(report: &PipelineReport, output: &Utf8Path) {
    info!(
        "Wrote {output}: {} points, {} lines, {} polygons, {} multipolygons",
        report.ingest.tagged_points,
        report.build.lines,
        report.build.polygons,
        report.assemble.assembled
    );
    let skipped =
        report.ingest.short_ways.len() + report.resolve.unresolved.len() + report.assemble.empty.len();
    if skipped > 0 {
        warn!(
            "Skipped {} short ways, {} unresolved ways and {} empty multipolygons",
            report.ingest.short_ways.len(),
            report.resolve.unresolved.len(),
            report.assemble.empty.len()
        );
    }
}
