//! Test helpers for composing convert CLI datasets and layered overrides.

use super::*;
use crate::convert::ConvertConfig;
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use tempfile::TempDir;

/// A closed triangle with a building tag and a tagged bench.
pub(super) const TRIANGLE_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<osm version="0.6">
  <node id="1" lat="0" lon="0"/>
  <node id="2" lat="0" lon="1"/>
  <node id="3" lat="1" lon="1"/>
  <node id="4" lat="2" lon="2"><tag k="amenity" v="bench"/></node>
  <way id="10"><nd ref="1"/><nd ref="2"/><nd ref="3"/><nd ref="1"/><tag k="building" v="yes"/></way>
</osm>
"#;

#[derive(Debug, Clone, Default)]
pub(super) struct LayerOverrides {
    pub(super) input: Option<Utf8PathBuf>,
    pub(super) output: Option<Utf8PathBuf>,
    pub(super) window_size: Option<usize>,
}

#[derive(Debug)]
pub(super) struct DatasetFiles {
    _dir: TempDir,
    root: Utf8PathBuf,
    cli_input: Utf8PathBuf,
    config_input: Utf8PathBuf,
}

impl DatasetFiles {
    pub(super) fn new() -> Self {
        let dir = TempDir::new().expect("tempdir");
        let root =
            Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf-8 temp dir");
        let cli_input = root.join("cli.osm");
        let config_input = root.join("config.osm");
        for path in [&cli_input, &config_input] {
            fs::write(path, TRIANGLE_XML).expect("write extract");
        }
        Self {
            _dir: dir,
            root,
            cli_input,
            config_input,
        }
    }

    pub(super) fn input(&self) -> &Utf8Path {
        &self.cli_input
    }

    pub(super) fn output(&self) -> Utf8PathBuf {
        self.root.join("cli.sqlite")
    }

    pub(super) fn config_input(&self) -> &Utf8Path {
        &self.config_input
    }

    pub(super) fn config_output(&self) -> Utf8PathBuf {
        self.root.join("config.sqlite")
    }
}

pub(super) fn merge_layers(
    mut cli_args: ConvertArgs,
    file_layer: Option<LayerOverrides>,
    env_layer: Option<LayerOverrides>,
) -> Result<ConvertConfig, CliError> {
    merge_field(
        &mut cli_args.input,
        extract_field(&env_layer, |layer| &layer.input),
        extract_field(&file_layer, |layer| &layer.input),
    );
    merge_field(
        &mut cli_args.output,
        extract_field(&env_layer, |layer| &layer.output),
        extract_field(&file_layer, |layer| &layer.output),
    );
    merge_field(
        &mut cli_args.window_size,
        extract_field(&env_layer, |layer| &layer.window_size),
        extract_field(&file_layer, |layer| &layer.window_size),
    );
    cli_args.into_config()
}

fn merge_field<T: Clone>(target: &mut Option<T>, env_value: Option<T>, file_value: Option<T>) {
    if target.is_none()
        && let Some(value) = env_value.or(file_value)
    {
        *target = Some(value);
    }
}

fn extract_field<T: Clone>(
    layer: &Option<LayerOverrides>,
    accessor: fn(&LayerOverrides) -> &Option<T>,
) -> Option<T> {
    layer.as_ref().and_then(|entry| accessor(entry).clone())
}
