// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! End-of-session run recording.
//!
//! The run-history store is an append-only collaborator. Two implementations
//! are provided:
//!
//! - [`MemoryRunRecorder`]: keeps records in memory (tests, dry runs)
//! - [`JsonLinesRunRecorder`]: appends one JSON object per run to a file

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::{RecorderError, ValidationError};

// =============================================================================
// RunSummary
// =============================================================================

/// Statistics reported by the dashboard when a session ends.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Session length in seconds.
    pub run_time: f64,
    /// Fuel consumed over the session.
    pub total_consumption: f64,
    /// Console configuration the session ran with.
    pub configuration_number: i64,
    /// Mean vessel speed.
    #[serde(rename = "avg_speed")]
    pub average_speed: f64,
    /// Mean propeller RPM.
    #[serde(rename = "avg_rpm")]
    pub average_rpm: f64,
}

impl RunSummary {
    /// Rejects NaN, infinite and negative statistics.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let fields = [
            ("run_time", self.run_time),
            ("total_consumption", self.total_consumption),
            ("avg_speed", self.average_speed),
            ("avg_rpm", self.average_rpm),
        ];

        for (field, value) in fields {
            if !value.is_finite() {
                return Err(ValidationError::NotFinite { field });
            }
            if value < 0.0 {
                return Err(ValidationError::Negative { field, value });
            }
        }

        if self.configuration_number < 0 {
            return Err(ValidationError::Negative {
                field: "configuration_number",
                value: self.configuration_number as f64,
            });
        }

        Ok(())
    }
}

/// A stored run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedRun {
    /// When the run was stored.
    pub recorded_at: DateTime<Utc>,
    /// The reported statistics.
    #[serde(flatten)]
    pub summary: RunSummary,
}

impl RecordedRun {
    fn now(summary: RunSummary) -> Self {
        Self {
            recorded_at: Utc::now(),
            summary,
        }
    }
}

// =============================================================================
// RunRecorder Trait
// =============================================================================

/// Persists end-of-session summaries.
#[async_trait]
pub trait RunRecorder: Send + Sync {
    /// Stores one run. Earlier records are never modified.
    async fn store(&self, summary: &RunSummary) -> Result<(), RecorderError>;

    /// Recorder name for logs.
    fn name(&self) -> &str;
}

// =============================================================================
// MemoryRunRecorder
// =============================================================================

/// In-memory recorder.
#[derive(Debug, Default)]
pub struct MemoryRunRecorder {
    runs: Mutex<Vec<RecordedRun>>,
}

impl MemoryRunRecorder {
    /// Creates an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all stored runs in order.
    pub fn runs(&self) -> Vec<RecordedRun> {
        self.runs.lock().clone()
    }

    /// Number of stored runs.
    pub fn len(&self) -> usize {
        self.runs.lock().len()
    }

    /// Returns `true` if nothing was stored.
    pub fn is_empty(&self) -> bool {
        self.runs.lock().is_empty()
    }
}

#[async_trait]
impl RunRecorder for MemoryRunRecorder {
    async fn store(&self, summary: &RunSummary) -> Result<(), RecorderError> {
        summary.validate()?;
        self.runs.lock().push(RecordedRun::now(*summary));
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

// =============================================================================
// JsonLinesRunRecorder
// =============================================================================

/// Append-only JSON-lines file recorder.
pub struct JsonLinesRunRecorder {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
    records_written: AtomicU64,
}

impl JsonLinesRunRecorder {
    /// Opens (or creates) the file for appending, creating parent directories.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RecorderError> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| RecorderError::io(parent, e))?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| RecorderError::io(&path, e))?;

        Ok(Self {
            path,
            writer: Mutex::new(BufWriter::new(file)),
            records_written: AtomicU64::new(0),
        })
    }

    /// Target file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Records written by this instance.
    pub fn records_written(&self) -> u64 {
        self.records_written.load(Ordering::Relaxed)
    }

    /// Reads every record back from the file.
    pub fn read_all(&self) -> Result<Vec<RecordedRun>, RecorderError> {
        let content = fs::read_to_string(&self.path).map_err(|e| RecorderError::io(&self.path, e))?;
        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(RecorderError::from))
            .collect()
    }
}

#[async_trait]
impl RunRecorder for JsonLinesRunRecorder {
    async fn store(&self, summary: &RunSummary) -> Result<(), RecorderError> {
        summary.validate()?;
        let line = serde_json::to_string(&RecordedRun::now(*summary))?;

        let mut writer = self.writer.lock();
        writeln!(writer, "{}", line).map_err(|e| RecorderError::io(&self.path, e))?;
        writer.flush().map_err(|e| RecorderError::io(&self.path, e))?;
        drop(writer);

        self.records_written.fetch_add(1, Ordering::Relaxed);
        tracing::info!(
            path = %self.path.display(),
            configuration = summary.configuration_number,
            run_time = summary.run_time,
            "Run recorded"
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "jsonl"
    }
}

impl std::fmt::Debug for JsonLinesRunRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonLinesRunRecorder")
            .field("path", &self.path)
            .field("records_written", &self.records_written())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn summary(configuration_number: i64) -> RunSummary {
        RunSummary {
            run_time: 300.0,
            total_consumption: 12.4,
            configuration_number,
            average_speed: 7.5,
            average_rpm: 610.0,
        }
    }

    #[test]
    fn test_summary_validation() {
        assert!(summary(1).validate().is_ok());

        let mut bad = summary(1);
        bad.run_time = f64::NAN;
        assert_eq!(bad.validate().unwrap_err().field(), "run_time");

        let mut bad = summary(1);
        bad.average_rpm = -1.0;
        assert_eq!(bad.validate().unwrap_err().field(), "avg_rpm");

        assert!(summary(-2).validate().is_err());
    }

    #[tokio::test]
    async fn test_memory_recorder() {
        let recorder = MemoryRunRecorder::new();
        recorder.store(&summary(1)).await.unwrap();
        recorder.store(&summary(2)).await.unwrap();

        let runs = recorder.runs();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[1].summary.configuration_number, 2);
    }

    #[tokio::test]
    async fn test_jsonl_recorder_appends() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("history").join("runs.jsonl");

        {
            let recorder = JsonLinesRunRecorder::open(&path).unwrap();
            recorder.store(&summary(1)).await.unwrap();
        }

        let recorder = JsonLinesRunRecorder::open(&path).unwrap();
        recorder.store(&summary(2)).await.unwrap();
        assert_eq!(recorder.records_written(), 1);

        let runs = recorder.read_all().unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].summary.configuration_number, 1);
        assert_eq!(runs[1].summary.configuration_number, 2);

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.lines().next().unwrap().contains("\"avg_speed\":7.5"));
    }

    #[tokio::test]
    async fn test_jsonl_recorder_rejects_invalid_summary() {
        let dir = tempdir().unwrap();
        let recorder = JsonLinesRunRecorder::open(dir.path().join("runs.jsonl")).unwrap();

        let mut bad = summary(1);
        bad.total_consumption = f64::INFINITY;
        assert!(matches!(
            recorder.store(&bad).await,
            Err(RecorderError::Invalid(_))
        ));
        assert_eq!(recorder.records_written(), 0);
    }
}
