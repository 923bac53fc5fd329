//! Record builder: identifier normalisation and output record assembly.

use std::sync::LazyLock;

use chrono::DateTime;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{IdFormatError, RecordError};
use crate::macros::expand_macros;

pub const ARXIV_URL: &str = "https://arxiv.org/abs/";
pub const SOURCE_TAG: &str = "arxiv";

static ARXIV_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Za-z-]*)(\d[\d.]*)$").expect("static regex is valid"));

/// One output line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub text: String,
    /// `None` only for the degenerate empty-text record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Meta>,
}

impl Record {
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meta {
    pub timestamp: Option<String>,
    pub yymm: String,
    pub arxiv_id: String,
    pub url: String,
    pub source: String,
}

/// Bring a raw id into arXiv's canonical form.
///
/// - new style `0704.0001` stays as is
/// - old style `hep-th9901001` becomes `hep-th/9901001`
pub fn format_arxiv_id(raw_id: &str) -> Result<String, IdFormatError> {
    let caps = ARXIV_ID
        .captures(raw_id)
        .ok_or_else(|| IdFormatError(raw_id.to_string()))?;
    let (prefix, number) = (&caps[1], &caps[2]);
    if prefix.is_empty() {
        Ok(number.to_string())
    } else {
        Ok(format!("{prefix}/{number}"))
    }
}

/// Seconds since the epoch as naive UTC ISO-8601. Microseconds are only
/// printed when non-zero.
pub fn format_timestamp(secs: f64) -> Option<String> {
    if !secs.is_finite() {
        return None;
    }
    let whole = secs.floor();
    let micros = ((secs - whole) * 1_000_000.0).round() as u32;
    let (whole, micros) = if micros >= 1_000_000 {
        (whole + 1.0, 0)
    } else {
        (whole, micros)
    };
    let dt = DateTime::from_timestamp(whole as i64, micros * 1_000)?.naive_utc();
    let rendered = if micros == 0 {
        dt.format("%Y-%m-%dT%H:%M:%S").to_string()
    } else {
        dt.format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
    };
    Some(rendered)
}

/// Assembles records from flattened text.
#[derive(Debug, Clone, Copy)]
pub struct RecordBuilder {
    expand_macros: bool,
}

impl Default for RecordBuilder {
    fn default() -> Self {
        Self {
            expand_macros: true,
        }
    }
}

impl RecordBuilder {
    pub fn new(expand_macros: bool) -> Self {
        Self { expand_macros }
    }

    /// Build the record for one project. Returns the record together with the
    /// identifier used for it (normalised when possible).
    pub fn build(
        &self,
        text: &str,
        yymm: &str,
        raw_id: &str,
        timestamp: Option<f64>,
    ) -> Result<(Record, String), RecordError> {
        let text = if self.expand_macros {
            expand_macros(text)?
        } else {
            text.to_string()
        };

        if text.is_empty() {
            return Ok((
                Record {
                    text: String::new(),
                    meta: None,
                },
                raw_id.to_string(),
            ));
        }

        let arxiv_id = match format_arxiv_id(raw_id) {
            Ok(id) => id,
            Err(e) => {
                warn!(raw_id, error = %e, "Failed to format arxiv id, using raw id");
                raw_id.to_string()
            }
        };

        let meta = Meta {
            timestamp: timestamp.and_then(format_timestamp),
            yymm: yymm.to_string(),
            url: format!("{ARXIV_URL}{arxiv_id}"),
            arxiv_id: arxiv_id.clone(),
            source: SOURCE_TAG.to_string(),
        };

        Ok((
            Record {
                text,
                meta: Some(meta),
            },
            arxiv_id,
        ))
    }
}
