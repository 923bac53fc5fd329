/// `load_config` module: reads the static YAML run configuration and adapts it
/// into the core's [`CleanerConfig`], [`PlanOptions`] and [`ContentFilter`].
///
/// This is the only place where user-supplied YAML is parsed. Every field has
/// a default, so an empty file is a valid configuration.
///
/// # Errors
/// All errors use `anyhow::Error` and are surfaced at the CLI boundary.
use anyhow::{Context, Result};
use arxiv_latex_core::acquire::PlanOptions;
use arxiv_latex_core::config::CleanerConfig;
use arxiv_latex_core::contract::{ContentFilter, TextEncoding};
use arxiv_latex_core::flatten::FlattenerConfig;
use chrono::NaiveDate;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Directory holding the shards to process.
    pub archive_dir: PathBuf,
    /// Directory receiving finished `.jsonl` files.
    pub output_dir: PathBuf,
    pub work_dir: Option<PathBuf>,
    pub max_files: i64,
    pub workers: Option<usize>,
    pub compress: bool,
    /// Byte regex a project must match somewhere in its `.tex` files.
    pub filter: Option<String>,
    pub cutoff: Option<NaiveDate>,
    pub exclude: Vec<String>,
    /// Remove each shard from `archive_dir` once its output is written.
    pub delete_processed: bool,
    pub expand_macros: bool,
    pub encodings: Vec<TextEncoding>,
    pub flattener: FlattenerConfig,
}

impl Default for CliConfig {
    fn default() -> Self {
        let core = CleanerConfig::default();
        Self {
            archive_dir: PathBuf::from("archives"),
            output_dir: core.target_dir,
            work_dir: core.work_dir,
            max_files: core.max_files,
            workers: core.workers,
            compress: core.compress,
            filter: None,
            cutoff: None,
            exclude: Vec::new(),
            delete_processed: false,
            expand_macros: core.expand_macros,
            encodings: core.encodings,
            flattener: core.flattener,
        }
    }
}

impl CliConfig {
    pub fn cleaner_config(&self, verbose: bool) -> CleanerConfig {
        CleanerConfig {
            target_dir: self.output_dir.clone(),
            work_dir: self.work_dir.clone(),
            max_files: self.max_files,
            workers: self.workers,
            compress: self.compress,
            expand_macros: self.expand_macros,
            encodings: self.encodings.clone(),
            flattener: self.flattener.clone(),
            verbose,
        }
    }

    pub fn plan_options(&self) -> PlanOptions {
        PlanOptions {
            cutoff: self.cutoff,
            exclude: self.exclude.clone(),
            processed_dir: Some(self.output_dir.clone()),
            lazy: true,
        }
    }

    pub fn content_filter(&self) -> Result<ContentFilter> {
        match &self.filter {
            Some(pattern) => {
                let re = regex::bytes::Regex::new(pattern)
                    .with_context(|| format!("Invalid content filter pattern {pattern:?}"))?;
                Ok(ContentFilter::from_regex(re))
            }
            None => Ok(ContentFilter::accept_all()),
        }
    }
}

/// Loads the YAML config file at `path`.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<CliConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => content,
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow::anyhow!(
                "Failed to read config file {:?}: {}",
                path_ref,
                e
            ));
        }
    };

    if config_content.trim().is_empty() {
        info!(config_path = ?path_ref, "Config file is empty, using defaults");
        return Ok(CliConfig::default());
    }

    match serde_yaml::from_str::<CliConfig>(&config_content) {
        Ok(conf) => {
            info!(config_path = ?path_ref, "Parsed config YAML successfully");
            Ok(conf)
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            Err(anyhow::anyhow!("Failed to parse config YAML: {e}"))
        }
    }
}
