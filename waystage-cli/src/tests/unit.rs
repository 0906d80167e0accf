//! Focused unit tests covering convert CLI configuration and execution.

use super::helpers::DatasetFiles;
use super::*;
use crate::convert::ConvertConfig;
use camino::Utf8PathBuf;
use rstest::rstest;
use std::fs;
use waystage_data::{PipelineError, StagingPaths, WayStoreKind};

fn args(dataset: &DatasetFiles) -> ConvertArgs {
    ConvertArgs {
        input: Some(dataset.input().to_path_buf()),
        output: Some(dataset.output()),
        ..ConvertArgs::default()
    }
}

#[rstest]
#[case(None, Some(Utf8PathBuf::from("db.sqlite")), ARG_INPUT, ENV_INPUT)]
#[case(Some(Utf8PathBuf::from("extract.osm")), None, ARG_OUTPUT, ENV_OUTPUT)]
fn converting_without_required_fields_errors(
    #[case] input: Option<Utf8PathBuf>,
    #[case] output: Option<Utf8PathBuf>,
    #[case] field: &'static str,
    #[case] env_var: &'static str,
) {
    let args = ConvertArgs {
        input,
        output,
        ..ConvertArgs::default()
    };
    let err = ConvertConfig::try_from(args).expect_err("missing field should error");
    match err {
        CliError::MissingArgument {
            field: missing,
            env,
        } => {
            assert_eq!(missing, field);
            assert_eq!(env, env_var);
        }
        other => panic!("expected MissingArgument, found {other:?}"),
    }
}

#[rstest]
#[case("out/db.sqlite", "out/db.sqlite.staging")]
#[case("db.sqlite", "db.sqlite.staging")]
fn working_dir_defaults_next_to_output(#[case] output: &str, #[case] expected: &str) {
    let args = ConvertArgs {
        input: Some(Utf8PathBuf::from("extract.osm")),
        output: Some(Utf8PathBuf::from(output)),
        ..ConvertArgs::default()
    };
    let config = ConvertConfig::try_from(args).expect("complete arguments");
    assert_eq!(config.pipeline.working_dir, Utf8PathBuf::from(expected));
}

#[rstest]
fn validate_sources_reports_missing_files() {
    let dataset = DatasetFiles::new();
    let mut config = ConvertConfig::try_from(args(&dataset)).expect("complete arguments");
    config.pipeline.input = config.pipeline.input.with_file_name("missing.osm");
    let err = config.validate_sources().expect_err("expected failure");
    match err {
        CliError::MissingSourceFile { field, .. } => assert_eq!(field, ARG_INPUT),
        other => panic!("unexpected error {other:?}"),
    }
}

#[rstest]
fn validate_sources_rejects_directories() {
    let dataset = DatasetFiles::new();
    let mut config = ConvertConfig::try_from(args(&dataset)).expect("complete arguments");
    let dir = config.pipeline.input.with_file_name("extract.osm");
    fs::create_dir(&dir).expect("create directory");
    config.pipeline.input = dir;
    let err = config
        .validate_sources()
        .expect_err("expected directory rejection");
    match err {
        CliError::SourcePathNotFile { field, .. } => assert_eq!(field, ARG_INPUT),
        other => panic!("unexpected error {other:?}"),
    }
}

#[rstest]
fn unknown_way_store_is_a_parse_error() {
    let err = Cli::try_parse_from([
        "waystage",
        "convert",
        "--way-store",
        "tape",
        "--input",
        "a.osm",
    ])
    .expect_err("unknown store");
    assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
}

#[rstest]
#[case(&["--keep-staging"], Some(true))]
#[case(&["--keep-staging", "false"], Some(false))]
#[case(&[], None)]
fn keep_staging_accepts_a_bare_flag(#[case] extra: &[&str], #[case] expected: Option<bool>) {
    let mut invocation = vec!["waystage", "convert", "--way-store", "memory"];
    invocation.extend_from_slice(extra);
    let cli = Cli::try_parse_from(invocation).expect("valid invocation");
    let Command::Convert(args) = cli.command;
    assert_eq!(args.keep_staging, expected);
    assert_eq!(args.way_store, Some(WayStoreKind::Memory));
}

#[rstest]
fn zero_window_is_rejected_before_running() {
    let dataset = DatasetFiles::new();
    let args = ConvertArgs {
        window_size: Some(0),
        ..args(&dataset)
    };
    let err = run_convert(args).expect_err("zero window");
    assert!(
        matches!(
            err,
            CliError::Pipeline(PipelineError::InvalidConfig { .. })
        ),
        "unexpected error {err:?}"
    );
    assert!(!dataset.output().exists(), "nothing is written");
}

#[rstest]
fn convert_writes_the_database_and_cleans_up() {
    let dataset = DatasetFiles::new();
    let report = run_convert(args(&dataset)).expect("conversion succeeds");
    assert_eq!(report.build.polygons, 1);
    assert_eq!(report.ingest.tagged_points, 1);
    assert_eq!(report.export.polygons, 1);
    assert!(dataset.output().exists(), "database written");

    let working_dir = dataset.output().with_file_name("cli.sqlite.staging");
    let staging = StagingPaths::in_dir(&working_dir);
    assert!(!staging.points.exists());
    assert!(!staging.ways.exists());
    assert!(!staging.members.exists());
}
