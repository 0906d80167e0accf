//! Behaviour-driven step definitions driving the convert CLI scenarios.

use super::helpers::{DatasetFiles, LayerOverrides, merge_layers};
use super::*;
use crate::convert::ConvertConfig;
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use std::cell::RefCell;
use waystage_data::WayStoreKind;

const TUNED_WINDOW: usize = 64;
const ENV_WINDOW: usize = 1_000;

/// Aggregates convert CLI scenario state so each step only needs a single
/// world argument.
#[derive(Debug)]
struct ConvertWorld {
    dataset_files: DatasetFiles,
    cli_args: RefCell<Vec<String>>,
    cli_result: RefCell<Option<Result<ConvertConfig, CliError>>>,
    config_layer: RefCell<Option<LayerOverrides>>,
    env_layer: RefCell<Option<LayerOverrides>>,
}

impl ConvertWorld {
    fn new() -> Self {
        Self {
            dataset_files: DatasetFiles::new(),
            cli_args: RefCell::new(Vec::new()),
            cli_result: RefCell::new(None),
            config_layer: RefCell::new(None),
            env_layer: RefCell::new(None),
        }
    }

    fn expect_config(&self) -> ConvertConfig {
        self.cli_result
            .borrow()
            .as_ref()
            .expect("result recorded")
            .as_ref()
            .expect("expected success")
            .clone()
    }
}

#[fixture]
fn world() -> ConvertWorld {
    ConvertWorld::new()
}

#[given("an extract exists on disk")]
fn extract_exists(#[from(world)] world: &ConvertWorld) {
    assert!(
        world.dataset_files.input().exists(),
        "expected the extract to exist on disk",
    );
}

#[given("I pass the input and output paths with CLI flags")]
fn cli_provides_paths(#[from(world)] world: &ConvertWorld) {
    let dataset = &world.dataset_files;
    world.cli_args.borrow_mut().extend([
        format!("--{ARG_INPUT}"),
        dataset.input().to_string(),
        format!("--{ARG_OUTPUT}"),
        dataset.output().to_string(),
    ]);
}

#[given("I omit all conversion configuration")]
fn omit_configuration(#[from(world)] world: &ConvertWorld) {
    world.cli_args.borrow_mut().clear();
    *world.config_layer.borrow_mut() = None;
    *world.env_layer.borrow_mut() = None;
}

#[given("the input and output paths are provided via a config file")]
fn provided_via_config(#[from(world)] world: &ConvertWorld) {
    let dataset = &world.dataset_files;
    *world.config_layer.borrow_mut() = Some(LayerOverrides {
        input: Some(dataset.config_input().to_path_buf()),
        output: Some(dataset.config_output()),
        ..LayerOverrides::default()
    });
}

#[given("the window size is overridden via environment variables")]
fn window_overridden_by_env(#[from(world)] world: &ConvertWorld) {
    *world.env_layer.borrow_mut() = Some(LayerOverrides {
        window_size: Some(ENV_WINDOW),
        ..LayerOverrides::default()
    });
}

#[given("I pass only the input CLI flag")]
fn cli_only_input(#[from(world)] world: &ConvertWorld) {
    let input = world.dataset_files.input().to_string();
    world
        .cli_args
        .borrow_mut()
        .extend([format!("--{ARG_INPUT}"), input]);
}

#[given("I select the memory way store with a small window and keep staging files")]
fn cli_tunes_resolver(#[from(world)] world: &ConvertWorld) {
    world.cli_args.borrow_mut().extend([
        format!("--{ARG_WAY_STORE}"),
        "memory".to_owned(),
        format!("--{ARG_WINDOW_SIZE}"),
        TUNED_WINDOW.to_string(),
        format!("--{ARG_KEEP_STAGING}"),
    ]);
}

#[when("I configure the convert command")]
fn configure_convert(#[from(world)] world: &ConvertWorld) {
    let mut invocation = vec!["waystage".to_owned(), "convert".to_owned()];
    invocation.extend(world.cli_args.borrow().iter().cloned());
    let file_layer = world.config_layer.borrow().clone();
    let env_layer = world.env_layer.borrow().clone();
    let outcome = Cli::try_parse_from(invocation)
        .map_err(CliError::ArgumentParsing)
        .and_then(|cli| match cli.command {
            Command::Convert(cmd) => {
                if file_layer.is_some() || env_layer.is_some() {
                    merge_layers(cmd, file_layer, env_layer)
                } else {
                    cmd.into_config()
                }
            }
        });
    world.cli_result.replace(Some(outcome));
}

#[then("the conversion plan uses the CLI-provided paths")]
fn plan_uses_cli_paths(#[from(world)] world: &ConvertWorld) {
    let config = world.expect_config().pipeline;
    assert_eq!(config.input, world.dataset_files.input());
    assert_eq!(config.output, world.dataset_files.output());
    assert_eq!(
        config.working_dir,
        world.dataset_files.output().with_file_name("cli.sqlite.staging")
    );
    assert_eq!(config.way_store, WayStoreKind::File);
    assert!(!config.keep_staging);
}

#[then("the CLI reports that the \"input\" flag is missing")]
fn reports_missing_input(#[from(world)] world: &ConvertWorld) {
    let borrowed = world.cli_result.borrow();
    let error = borrowed
        .as_ref()
        .expect("result recorded")
        .as_ref()
        .expect_err("expected error");
    match error {
        CliError::MissingArgument { field, .. } => assert_eq!(*field, ARG_INPUT),
        other => panic!("unexpected error {other:?}"),
    }
}

#[then("CLI and environment layers override configuration defaults")]
fn precedence_holds(#[from(world)] world: &ConvertWorld) {
    let config = world.expect_config().pipeline;
    assert_eq!(config.input, world.dataset_files.input());
    assert_eq!(config.output, world.dataset_files.config_output());
    assert_eq!(config.window_size, ENV_WINDOW);
}

#[then("the conversion plan uses the tuned resolver settings")]
fn plan_uses_tuned_resolver(#[from(world)] world: &ConvertWorld) {
    let config = world.expect_config().pipeline;
    assert_eq!(config.way_store, WayStoreKind::Memory);
    assert_eq!(config.window_size, TUNED_WINDOW);
    assert!(config.keep_staging);
}

macro_rules! register_convert_scenario {
    ($fn_name:ident, $scenario_title:literal) => {
        #[scenario(path = "tests/features/convert_command.feature", name = $scenario_title)]
        fn $fn_name(#[from(world)] world: ConvertWorld) {
            let _ = world;
        }
    };
}

register_convert_scenario!(cli_flag_selection, "selecting paths via CLI flags");
register_convert_scenario!(rejecting_missing_args, "rejecting missing arguments");
register_convert_scenario!(
    layering_cli_config_env,
    "layering CLI, config file, and environment values"
);
register_convert_scenario!(tuning_resolver, "tuning the resolver from the command line");
