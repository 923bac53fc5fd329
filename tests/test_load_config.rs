use arxiv_latex::load_config::load_config;
use arxiv_latex_core::contract::TextEncoding;
use chrono::NaiveDate;
use std::fs::write;
use std::path::PathBuf;
use tempfile::NamedTempFile;

/// A full config file maps onto every core setting.
#[test]
fn test_load_config_reads_all_fields() {
    let config_yaml = r#"
archive_dir: ./tmp/archives
output_dir: ./tmp/extracted
work_dir: ./tmp/work
max_files: 50
workers: 4
compress: true
filter: "tikzpicture"
cutoff: 2007-04-01
exclude: ["_0001_"]
delete_processed: true
expand_macros: false
encodings: [latin1]
flattener:
  program: /usr/local/bin/latexpand
  timeout_secs: 60
"#;
    let config_file = NamedTempFile::new().expect("temp file");
    write(config_file.path(), config_yaml).unwrap();

    let config = load_config(config_file.path()).expect("Config should load");

    assert_eq!(config.archive_dir, PathBuf::from("./tmp/archives"));
    assert_eq!(config.cutoff, NaiveDate::from_ymd_opt(2007, 4, 1));
    assert_eq!(config.exclude, vec!["_0001_".to_string()]);
    assert!(config.delete_processed);

    let cleaner = config.cleaner_config(true);
    assert_eq!(cleaner.target_dir, PathBuf::from("./tmp/extracted"));
    assert_eq!(cleaner.work_dir, Some(PathBuf::from("./tmp/work")));
    assert_eq!(cleaner.max_files(), Some(50));
    assert_eq!(cleaner.workers(), 4);
    assert!(cleaner.compress);
    assert!(!cleaner.expand_macros);
    assert!(cleaner.verbose);
    assert_eq!(cleaner.encodings, vec![TextEncoding::Latin1]);
    assert_eq!(cleaner.flattener.program, "/usr/local/bin/latexpand");
    assert_eq!(cleaner.flattener.timeout_secs, 60);

    let plan = config.plan_options();
    assert_eq!(plan.processed_dir, Some(PathBuf::from("./tmp/extracted")));
    assert!(plan.lazy);

    let filter = config.content_filter().unwrap();
    assert!(filter.matches(b"\\begin{tikzpicture}"));
    assert!(!filter.matches(b"\\begin{figure}"));
}

/// An empty file is a valid config: every field has a default.
#[test]
fn test_load_config_empty_file_uses_defaults() {
    let config_file = NamedTempFile::new().expect("temp file");
    write(config_file.path(), "\n").unwrap();

    let config = load_config(config_file.path()).expect("Config should load");

    assert_eq!(config.archive_dir, PathBuf::from("archives"));
    assert_eq!(config.output_dir, PathBuf::from("extracted"));
    assert_eq!(config.max_files, -1);
    assert_eq!(config.cleaner_config(false).max_files(), None);
    assert!(config.expand_macros);
    assert_eq!(
        config.encodings,
        vec![TextEncoding::Utf8, TextEncoding::Latin1]
    );
    assert!(config.content_filter().unwrap().matches(b"anything"));
}

#[test]
fn test_load_config_errors_for_invalid_file() {
    let config_file = NamedTempFile::new().expect("temp file");
    write(config_file.path(), b"not-yaml: [:::").unwrap();

    let err = load_config(config_file.path()).unwrap_err();
    let msg = err.to_string();
    assert!(
        msg.contains("parse") || msg.contains("YAML"),
        "Parse error expected, got: {msg}"
    );
}

#[test]
fn test_load_config_errors_for_missing_file() {
    let err = load_config("/nonexistent/arxiv-latex.yaml").unwrap_err();
    assert!(err.to_string().contains("Failed to read config file"));
}

#[test]
fn test_invalid_filter_pattern_is_reported() {
    let config_file = NamedTempFile::new().expect("temp file");
    write(config_file.path(), "filter: \"(unclosed\"\n").unwrap();

    let config = load_config(config_file.path()).expect("Config should load");
    let err = config.content_filter().unwrap_err();
    assert!(err.to_string().contains("Invalid content filter pattern"));
}
