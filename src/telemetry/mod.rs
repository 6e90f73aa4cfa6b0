//! # Telemetry Module
//!
//! Handles telemetry logging to JSONL files with rotation.
//!
//! This module handles:
//! - The per-tick [`TelemetrySample`] published by the control loop
//! - Formatting samples as JSONL (JSON Lines)
//! - Writing to rotating log files (max N records per file)
//! - Retaining only the last M files
//!
//! The logger runs as its own task and reads through a [`slot`], so a slow
//! disk only costs skipped samples, never loop latency.

pub mod slot;

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::TelemetryConfig;
use crate::control::calibration::{ControlMode, SteeringDemand};
use crate::error::Result;
use crate::sbus::protocol::SBUS_NUM_CHANNELS;
use slot::{LatestReceiver, WaitOutcome};

const FILE_PREFIX: &str = "telemetry_";
const FILE_SUFFIX: &str = ".jsonl";

/// How long the logger waits for a sample before checking again
const IDLE_WAIT: Duration = Duration::from_secs(1);

/// Snapshot of one control loop iteration
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetrySample {
    pub timestamp: DateTime<Utc>,
    pub tick: u64,
    pub connected: bool,
    pub mode: ControlMode,
    pub steering: SteeringDemand,
    pub throttle: f32,
    pub camera_pan: f32,
    pub channels: [u16; SBUS_NUM_CHANNELS],
    pub frames_decoded: u64,
}

/// JSONL writer with size-based rotation
#[derive(Debug)]
pub struct TelemetryLogger {
    dir: PathBuf,
    max_records_per_file: usize,
    max_files_to_keep: usize,
    interval: Duration,
    writer: Option<BufWriter<File>>,
    records_in_file: usize,
    file_seq: u32,
}

impl TelemetryLogger {
    /// Creates the logger, creating `log_dir` if needed.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the directory cannot be created.
    pub fn new(config: &TelemetryConfig) -> Result<Self> {
        let dir = PathBuf::from(&config.log_dir);
        fs::create_dir_all(&dir)?;

        Ok(Self {
            dir,
            max_records_per_file: config.max_records_per_file.max(1),
            max_files_to_keep: config.max_files_to_keep.max(1),
            interval: Duration::from_millis(config.log_interval_ms),
            writer: None,
            records_in_file: 0,
            file_seq: 0,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Append one record, rotating first if the current file is full.
    pub fn write_sample(&mut self, sample: &TelemetrySample) -> Result<()> {
        if self.writer.is_none() || self.records_in_file >= self.max_records_per_file {
            self.rotate()?;
        }

        if let Some(writer) = self.writer.as_mut() {
            serde_json::to_writer(&mut *writer, sample)?;
            writer.write_all(b"\n")?;
            writer.flush()?;
            self.records_in_file += 1;
        }
        Ok(())
    }

    /// Consume samples until the publisher goes away.
    ///
    /// At most one sample is written per `log_interval_ms`; anything
    /// published in between is superseded.
    pub async fn run(mut self, mut samples: LatestReceiver<TelemetrySample>) -> Result<()> {
        info!("Telemetry logging to {}", self.dir.display());

        loop {
            match samples.wait(IDLE_WAIT).await {
                WaitOutcome::New(_, sample) => {
                    if let Err(e) = self.write_sample(&sample) {
                        warn!("Failed to write telemetry record: {}", e);
                    }
                    tokio::time::sleep(self.interval).await;
                }
                WaitOutcome::Timeout => debug!("No telemetry sample in {:?}", IDLE_WAIT),
                WaitOutcome::Closed => break,
            }
        }

        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
        }
        info!("Telemetry logger stopped");
        Ok(())
    }

    fn rotate(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
        }

        self.file_seq += 1;
        let name = format!(
            "{}{}_{:04}{}",
            FILE_PREFIX,
            Utc::now().format("%Y%m%d_%H%M%S"),
            self.file_seq,
            FILE_SUFFIX
        );
        let path = self.dir.join(name);
        debug!("Opening telemetry file {}", path.display());

        self.writer = Some(BufWriter::new(File::create(&path)?));
        self.records_in_file = 0;
        self.prune()
    }

    /// Delete the oldest files beyond `max_files_to_keep`.
    fn prune(&self) -> Result<()> {
        let mut files = log_files(&self.dir)?;
        if files.len() <= self.max_files_to_keep {
            return Ok(());
        }

        files.sort();
        let excess = files.len() - self.max_files_to_keep;
        for old in files.into_iter().take(excess) {
            debug!("Removing old telemetry file {}", old.display());
            fs::remove_file(&old)?;
        }
        Ok(())
    }
}

/// Telemetry files in `dir`, unordered
pub fn log_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let is_log = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with(FILE_PREFIX) && n.ends_with(FILE_SUFFIX));
        if is_log {
            files.push(path);
        }
    }
    Ok(files)
}
