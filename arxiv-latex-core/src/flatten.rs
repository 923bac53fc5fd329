//! `latexpand` subprocess wrapper implementing [`Flatten`].

use std::fs;
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::contract::Flatten;
use crate::error::FlattenError;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Settings for the external flattening tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlattenerConfig {
    pub program: String,
    pub timeout_secs: u64,
}

impl Default for FlattenerConfig {
    fn default() -> Self {
        Self {
            program: "latexpand".to_string(),
            timeout_secs: 300,
        }
    }
}

/// Runs `<program> <root> --output <scratch>` and returns the scratch file's
/// contents.
#[derive(Debug, Clone)]
pub struct Latexpand {
    program: String,
    timeout: Duration,
}

impl Latexpand {
    pub fn new(config: &FlattenerConfig) -> Self {
        Self {
            program: config.program.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for Latexpand {
    fn default() -> Self {
        Self::new(&FlattenerConfig::default())
    }
}

impl Flatten for Latexpand {
    fn flatten(&self, root: &Path) -> Result<Vec<u8>, FlattenError> {
        // Removed on drop, whichever way this function returns.
        let output = tempfile::Builder::new()
            .prefix("flat-")
            .suffix(".tex")
            .tempfile()?;

        // Run from the root's directory so relative \input paths resolve.
        let mut command = Command::new(&self.program);
        match (root.parent().filter(|d| !d.as_os_str().is_empty()), root.file_name()) {
            (Some(dir), Some(name)) => {
                command.current_dir(dir).arg(name);
            }
            _ => {
                command.arg(root);
            }
        }
        command
            .arg("--output")
            .arg(output.path())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        let mut child = command.spawn().map_err(|source| {
            error!(program = %self.program, error = ?source, "Failed to launch flattener");
            FlattenError::Launch {
                program: self.program.clone(),
                source,
            }
        })?;

        let deadline = Instant::now() + self.timeout;
        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if Instant::now() >= deadline {
                let _ = child.kill();
                let _ = child.wait();
                error!(program = %self.program, root = %root.display(), timeout = ?self.timeout, "Flattener timed out");
                return Err(FlattenError::Timeout {
                    program: self.program.clone(),
                    timeout: self.timeout,
                });
            }
            thread::sleep(POLL_INTERVAL);
        };

        if !status.success() {
            debug!(program = %self.program, root = %root.display(), %status, "Flattener exited with non-zero code");
            return Err(FlattenError::Exit {
                program: self.program.clone(),
                status: status.to_string(),
            });
        }

        let mut bytes = fs::read(output.path())?;
        let trimmed = bytes.trim_ascii_end().len();
        bytes.truncate(trimmed);
        Ok(bytes)
    }
}
