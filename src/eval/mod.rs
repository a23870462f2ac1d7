// Evaluation log
// One JSON file per answered question, for offline review of answer quality


use chrono::{DateTime, Local, SecondsFormat};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::{Result, ToolsyError};

/// Upper bound on `_N` suffixes tried for one second
const MAX_NAME_ATTEMPTS: u32 = 1000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionRecord {
    /// RFC 3339 creation time
    pub timestamp: String,
    pub query: String,
    pub answer: String,
    pub sources: Vec<String>,
    pub k: usize,
}

impl InteractionRecord {
    #[inline]
    pub fn at(
        time: DateTime<Local>,
        query: &str,
        answer: &str,
        sources: &[String],
        k: usize,
    ) -> Self {
        Self {
            timestamp: time.to_rfc3339_opts(SecondsFormat::Secs, false),
            query: query.to_string(),
            answer: answer.to_string(),
            sources: sources.to_vec(),
            k,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EvalLogger {
    dir: PathBuf,
}

impl EvalLogger {
    #[inline]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[inline]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Persist one interaction, returning the path written
    #[inline]
    pub fn log(&self, query: &str, answer: &str, sources: &[String], k: usize) -> Result<PathBuf> {
        let now = Local::now();
        self.write_record(now, &InteractionRecord::at(now, query, answer, sources, k))
    }

    /// Persist a record under a file name derived from `time`; never overwrites
    #[inline]
    pub fn write_record(&self, time: DateTime<Local>, record: &InteractionRecord) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir).map_err(|e| {
            ToolsyError::Storage(format!("Failed to create log directory {:?}: {}", self.dir, e))
        })?;

        let json = serde_json::to_string_pretty(record)
            .map_err(|e| ToolsyError::Storage(format!("Failed to serialize interaction: {}", e)))?;

        let stem = format!("query_{}_k{}", time.format("%Y%m%d_%H%M%S"), record.k);
        for attempt in 0..MAX_NAME_ATTEMPTS {
            let file_name = if attempt == 0 {
                format!("{stem}.json")
            } else {
                format!("{stem}_{attempt}.json")
            };
            let path = self.dir.join(file_name);

            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    write_or_remove(&path, &mut file, &json)?;
                    info!("Saved interaction log to {:?}", path);
                    return Ok(path);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    debug!("Log file {:?} exists, trying next suffix", path);
                }
                Err(e) => {
                    return Err(ToolsyError::Storage(format!(
                        "Failed to create log file {:?}: {}",
                        path, e
                    )));
                }
            }
        }

        Err(ToolsyError::Storage(format!(
            "No free log file name for {} in {:?}",
            stem, self.dir
        )))
    }

    /// Number of logged interactions
    #[inline]
    pub fn count(&self) -> Result<usize> {
        if !self.dir.exists() {
            return Ok(0);
        }

        let mut count = 0;
        for entry in fs::read_dir(&self.dir)? {
            let name = entry?.file_name();
            let name = name.to_string_lossy();
            if name.starts_with("query_") && name.ends_with(".json") {
                count += 1;
            }
        }
        Ok(count)
    }
}

/// Write `json` to a freshly created log file, removing it again if the write fails
fn write_or_remove(path: &Path, file: &mut impl Write, json: &str) -> Result<()> {
    let written = file
        .write_all(json.as_bytes())
        .and_then(|()| file.write_all(b"\n"))
        .and_then(|()| file.flush());

    if let Err(e) = written {
        if let Err(remove_error) = fs::remove_file(path) {
            warn!("Failed to remove partial log file {:?}: {}", path, remove_error);
        }
        return Err(ToolsyError::Storage(format!(
            "Failed to write log file {:?}: {}",
            path, e
        )));
    }
    Ok(())
}
