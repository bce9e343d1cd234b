//! Configuration files and end-to-end command runs.

use cube_cli::commands;
use cube_cli::config::{ConfigError, CubeConfig};
use cube_cli::output::OutputFormat;
use cube_engine::presets::wind;
use std::io::Write;
use tempfile::NamedTempFile;

fn config_file(text: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(text.as_bytes()).unwrap();
    file
}

#[test]
fn test_load_or_default_without_file() {
    let dir = tempfile::tempdir().unwrap();
    let config = CubeConfig::load_or_default(&dir.path().join("cube.toml")).unwrap();
    assert_eq!(config, CubeConfig::default());
}

#[test]
fn test_malformed_file_is_an_error() {
    let file = config_file("percentiles = [10, 50");
    match CubeConfig::load_or_default(file.path()) {
        Err(ConfigError::Parse(_)) => {}
        other => panic!("Expected parse error, got {other:?}"),
    }
}

#[test]
fn test_file_scenario_drives_run() {
    let mut scenario = NamedTempFile::new().unwrap();
    let document = wind::sample_scenario(&[20, 50, 80], 8);
    scenario
        .write_all(serde_json::to_string(&document).unwrap().as_bytes())
        .unwrap();

    let file = config_file(&format!(
        r#"
        percentiles = [20, 50, 80]
        output_format = "json"
        scenario = "{}"
        "#,
        scenario.path().display()
    ));
    let config = CubeConfig::load(file.path()).unwrap();
    config.validate().unwrap();

    let mut buffer = Vec::new();
    commands::run::run(&config, None, config.output_format, &mut buffer).unwrap();
    let rows: serde_json::Value = serde_json::from_slice(&buffer).unwrap();
    let npv = rows
        .as_array()
        .unwrap()
        .iter()
        .find(|row| row["id"] == wind::PROJECT_NPV)
        .unwrap();
    assert!(npv["values"]["P20"].is_number());
    assert!(npv["values"]["P80"].is_number());
}

#[test]
fn test_tornado_from_config_file() {
    let file = config_file(
        r#"
        [sensitivity]
        lower = 25
        upper = 75
        sort = "percent-spread"
        target_metric = "projectIrr"
        "#,
    );
    let config = CubeConfig::load(file.path()).unwrap();
    config.validate().unwrap();

    let mut buffer = Vec::new();
    commands::tornado::run(&config, None, OutputFormat::Csv, &mut buffer).unwrap();
    let text = String::from_utf8(buffer).unwrap();
    assert!(text.starts_with("variable,low_value,base_value,high_value,impact,percent_spread"));
    assert_eq!(text.lines().count(), 3);
}
