//! High-level run: drives the pipeline and writes surviving records.
//!
//! The [`Cleaner`] owns the output stream for a run and can execute the
//! per-entry work in two ways:
//!   - [`Cleaner::run`]: in-process and sequential; output order follows shard
//!     traversal order.
//!   - [`Cleaner::run_parallel`]: a fixed-size pool of blocking workers, each
//!     running load → flatten → decode → build for one entry. Results are
//!     consumed as they complete, so output order is unspecified.
//!
//! # Responsibilities
//! - Per-entry failures are logged and counted, never propagated.
//! - Records that failed to build or have empty text are dropped before
//!   emission.
//! - Only this module writes to the output file; workers hand back values.
//! - With a `max_files` cap, dispatch stops once the cap is reached. Work
//!   already in flight is drained, and any success beyond the cap is
//!   discarded.
//!
//! # Errors
//! Only run-level conditions surface as [`CleanError`]: scratch space that
//! cannot be created, output I/O, or a worker panic.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::CleanerConfig;
use crate::contract::{ContentFilter, EntryTask, Flatten};
use crate::error::{CleanError, LoadError, RecordError};
use crate::loader::ProjectLoader;
use crate::output::RecordWriter;
use crate::pipeline::{Pipeline, PipelineStats};
use crate::progress::Progress;
use crate::record::{Record, RecordBuilder};

/// Summary of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub output: PathBuf,
    /// Entries that loaded successfully.
    pub processed: usize,
    /// Entries skipped by the loader (filter miss, tool error, ...).
    pub failed: usize,
    /// Records written to the output.
    pub emitted: usize,
    /// Loaded entries whose record came out empty.
    pub dropped_empty: usize,
    /// Loaded entries whose record could not be built.
    pub dropped_failed: usize,
}

/// What a worker hands back for one entry.
#[derive(Debug)]
pub enum EntryOutcome {
    Loaded {
        raw_id: String,
        built: Result<(Record, String), RecordError>,
    },
    Skipped {
        raw_id: String,
        error: LoadError,
    },
}

/// The full per-entry pipeline, as run on a worker.
pub fn process_entry(loader: &ProjectLoader, builder: RecordBuilder, task: EntryTask) -> EntryOutcome {
    match loader.load(&task.path) {
        Ok(project) => EntryOutcome::Loaded {
            built: builder.build(&project.text, &task.yymm, &task.raw_id, project.timestamp),
            raw_id: task.raw_id,
        },
        Err(error) => EntryOutcome::Skipped {
            raw_id: task.raw_id,
            error,
        },
    }
}

#[derive(Clone)]
pub struct Cleaner {
    config: CleanerConfig,
    loader: ProjectLoader,
    builder: RecordBuilder,
}

impl Cleaner {
    pub fn new(config: CleanerConfig, flattener: Arc<dyn Flatten>) -> Self {
        let loader = ProjectLoader::new(flattener)
            .with_encodings(config.encodings.clone())
            .with_scratch_root(config.work_dir.clone());
        let builder = RecordBuilder::new(config.expand_macros);
        Self {
            config,
            loader,
            builder,
        }
    }

    pub fn with_filter(mut self, filter: ContentFilter) -> Self {
        self.loader = self.loader.with_filter(filter);
        self
    }

    pub fn config(&self) -> &CleanerConfig {
        &self.config
    }

    pub fn pipeline(&self, shards: Vec<PathBuf>) -> Pipeline {
        Pipeline::new(shards)
            .with_work_dir(self.config.work_dir.clone())
            .with_max_files(self.config.max_files())
    }

    /// Process `shards` in-process, writing `<out_name>.jsonl[.gz]` into the
    /// target directory. Without a name, a random `arxiv_<uuid>` is used.
    pub fn run(&self, shards: Vec<PathBuf>, out_name: Option<&str>) -> Result<RunReport, CleanError> {
        let pipeline = self.pipeline(shards);
        let stats = pipeline.stats();
        let mut writer = self.open_writer(out_name)?;
        let mut report = RunReport::default();
        let progress = Progress::new(self.config.verbose, "sequential");

        info!(shards = pipeline.shards().len(), "[CLEAN] Starting sequential run");
        for item in pipeline.iter(&self.loader) {
            let entry = item?;
            let built = self
                .builder
                .build(&entry.text, &entry.yymm, &entry.raw_id, entry.timestamp);
            emit(&mut writer, &mut report, &entry.raw_id, built)?;
            progress.inc(1);
        }

        self.finish(writer, report, &stats, &progress)
    }

    /// Process `shards` on a pool of `workers` blocking tasks.
    pub async fn run_parallel(
        &self,
        shards: Vec<PathBuf>,
        out_name: Option<&str>,
    ) -> Result<RunReport, CleanError> {
        let pipeline = self.pipeline(shards);
        let stats = pipeline.stats();
        let cap = pipeline.max_files();
        let workers = self.config.workers();
        let mut writer = self.open_writer(out_name)?;
        let mut report = RunReport::default();
        let progress = Progress::new(self.config.verbose, "parallel");

        info!(shards = pipeline.shards().len(), workers, "[CLEAN] Starting parallel run");

        // Shard traversal does blocking I/O, so it runs on its own blocking
        // task and feeds entries through a channel sized to the pool.
        let (tx, mut rx) = mpsc::channel(workers);
        // The producer also waits for a shard's tasks to finish before
        // unpacking the next one, and gives up once the receiver is gone.
        let closed = tx.clone();
        let producer = tokio::task::spawn_blocking(move || {
            for item in pipeline.entries().cancel_when(move || closed.is_closed()) {
                let fatal = item.is_err();
                if tx.blocking_send(item).is_err() || fatal {
                    break;
                }
            }
        });

        let mut in_flight = JoinSet::new();
        loop {
            if cap.is_some_and(|cap| stats.processed() >= cap) {
                info!(max_files = ?cap, in_flight = in_flight.len(), "Reached max_files, draining workers");
                break;
            }
            if in_flight.len() >= workers {
                if let Some(joined) = in_flight.join_next().await {
                    self.consume(joined?, &stats, cap, &mut writer, &mut report)?;
                    progress.inc(1);
                }
                continue;
            }
            match rx.recv().await {
                Some(Ok(task)) => {
                    let loader = self.loader.clone();
                    let builder = self.builder;
                    in_flight.spawn_blocking(move || process_entry(&loader, builder, task));
                }
                Some(Err(e)) => return Err(e.into()),
                None => break,
            }
        }

        // Stop the producer, then let in-flight entries finish.
        drop(rx);
        while let Some(joined) = in_flight.join_next().await {
            self.consume(joined?, &stats, cap, &mut writer, &mut report)?;
            progress.inc(1);
        }
        producer.await?;

        self.finish(writer, report, &stats, &progress)
    }

    fn consume(
        &self,
        outcome: EntryOutcome,
        stats: &PipelineStats,
        cap: Option<usize>,
        writer: &mut RecordWriter,
        report: &mut RunReport,
    ) -> Result<(), CleanError> {
        match outcome {
            EntryOutcome::Skipped { raw_id, error } if error.is_fatal() => Err(CleanError::Entry {
                id: raw_id,
                source: error,
            }),
            EntryOutcome::Skipped { .. } => {
                stats.record_failed();
                Ok(())
            }
            EntryOutcome::Loaded { raw_id, built } => {
                if cap.is_some_and(|cap| stats.processed() >= cap) {
                    debug!(arxiv_id = %raw_id, "Discarding result beyond max_files");
                    return Ok(());
                }
                stats.record_processed();
                emit(writer, report, &raw_id, built)
            }
        }
    }

    fn open_writer(&self, out_name: Option<&str>) -> Result<RecordWriter, CleanError> {
        let name = out_name.map_or_else(|| format!("arxiv_{}", Uuid::new_v4()), str::to_owned);
        RecordWriter::create(&self.config.target_dir, &name, self.config.compress)
    }

    fn finish(
        &self,
        writer: RecordWriter,
        mut report: RunReport,
        stats: &PipelineStats,
        progress: &Progress,
    ) -> Result<RunReport, CleanError> {
        report.processed = stats.processed();
        report.failed = stats.failed();
        report.output = writer.finish()?;
        progress.finish("done");
        info!(
            output = %report.output.display(),
            processed = report.processed,
            failed = report.failed,
            emitted = report.emitted,
            "[CLEAN] Run complete"
        );
        Ok(report)
    }
}

fn emit(
    writer: &mut RecordWriter,
    report: &mut RunReport,
    raw_id: &str,
    built: Result<(Record, String), RecordError>,
) -> Result<(), CleanError> {
    match built {
        Err(e) => {
            error!(arxiv_id = raw_id, error = %e, "Failed to process entry");
            report.dropped_failed += 1;
        }
        Ok((record, arxiv_id)) if record.is_empty() => {
            warn!(arxiv_id = %arxiv_id, "Empty text, dropping record");
            report.dropped_empty += 1;
        }
        Ok((record, arxiv_id)) => {
            writer.write_record(&record)?;
            report.emitted += 1;
            info!(arxiv_id = %arxiv_id, "Processed entry");
        }
    }
    Ok(())
}
