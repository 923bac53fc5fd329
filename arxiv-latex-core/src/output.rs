//! Newline-delimited JSON output, optionally gzip-compressed as a whole.
//!
//! Records go to a temporary file next to the final destination and are only
//! moved into place by [`RecordWriter::finish`], so a run that dies halfway
//! leaves nothing behind in the output directory.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use flate2::write::GzEncoder;
use flate2::Compression;
use tempfile::NamedTempFile;
use tracing::info;

use crate::error::CleanError;
use crate::record::Record;

enum Sink {
    Plain(BufWriter<File>),
    Gzip(GzEncoder<BufWriter<File>>),
}

impl Write for Sink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self {
            Sink::Plain(w) => w.write(buf),
            Sink::Gzip(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self {
            Sink::Plain(w) => w.flush(),
            Sink::Gzip(w) => w.flush(),
        }
    }
}

pub struct RecordWriter {
    staging: NamedTempFile,
    sink: Sink,
    destination: PathBuf,
    written: usize,
}

impl RecordWriter {
    /// Open `<dir>/<file_name>` (plus `.gz` when compressing) for writing.
    pub fn create(dir: &Path, file_name: &str, compress: bool) -> Result<Self, CleanError> {
        let destination = dir.join(output_file_name(file_name, compress));
        let staging = tempfile::Builder::new()
            .prefix(".partial-")
            .tempfile_in(dir)?;
        let file = staging.reopen()?;
        let buffered = BufWriter::new(file);
        let sink = if compress {
            Sink::Gzip(GzEncoder::new(buffered, Compression::default()))
        } else {
            Sink::Plain(buffered)
        };
        Ok(Self {
            staging,
            sink,
            destination,
            written: 0,
        })
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    pub fn written(&self) -> usize {
        self.written
    }

    /// Serialize one record as a single line.
    pub fn write_record(&mut self, record: &Record) -> Result<(), CleanError> {
        serde_json::to_writer(&mut self.sink, record)?;
        self.sink.write_all(b"\n")?;
        self.written += 1;
        Ok(())
    }

    /// Flush everything and move the file to its final name.
    pub fn finish(self) -> Result<PathBuf, CleanError> {
        let mut buffered = match self.sink {
            Sink::Plain(w) => w,
            Sink::Gzip(w) => w.finish()?,
        };
        buffered.flush()?;
        buffered.get_ref().sync_all()?;
        drop(buffered);

        self.staging
            .persist(&self.destination)
            .map_err(|e| CleanError::Output(e.error))?;
        info!(path = %self.destination.display(), records = self.written, "Wrote output file");
        Ok(self.destination)
    }
}

/// `name` with `.jsonl` (and `.gz`) appended unless already present.
pub fn output_file_name(name: &str, compress: bool) -> String {
    let mut file_name = if name.ends_with(".jsonl") {
        name.to_string()
    } else {
        format!("{name}.jsonl")
    };
    if compress {
        file_name.push_str(".gz");
    }
    file_name
}
