//! # Calibration Store
//!
//! Persistence of the steering [`CalibrationRecord`].
//!
//! The on-disk format is a small JSON object:
//!
//! ```json
//! {
//!   "steering_mid": 1471,
//!   "steering_min": 1321,
//!   "steering_max": 1621
//! }
//! ```
//!
//! Only `steering_mid` is authoritative; min and max are always re-derived as
//! mid ± the configured half-range when loading. A stored mid outside the trim
//! window is rejected so the caller falls back to its default.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::control::calibration::CalibrationRecord;
use crate::error::{Result, RoverError};

/// Get/set interface for the persisted calibration record
#[cfg_attr(test, mockall::automock)]
pub trait CalibrationStore: Send {
    /// Load the stored record, `None` when nothing has been stored yet
    fn load(&self) -> Result<Option<CalibrationRecord>>;

    /// Persist a record
    fn save(&mut self, record: &CalibrationRecord) -> Result<()>;
}

/// Load the stored record, falling back to `mid_us ± half_range_us`.
///
/// Store failures are logged and never fatal.
pub fn load_or_default<S>(store: &S, default_mid_us: u32, half_range_us: u32) -> CalibrationRecord
where
    S: CalibrationStore + ?Sized,
{
    match store.load() {
        Ok(Some(record)) => {
            info!(
                "Loaded steering calibration: Mid={}, Range=[{}, {}]",
                record.mid_us, record.min_us, record.max_us
            );
            record
        }
        Ok(None) => {
            info!("No stored steering calibration, using default Mid={}", default_mid_us);
            CalibrationRecord::centered(default_mid_us, half_range_us)
        }
        Err(e) => {
            warn!("Failed to load steering calibration ({}), using default Mid={}", e, default_mid_us);
            CalibrationRecord::centered(default_mid_us, half_range_us)
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredCalibration {
    steering_mid: u32,
    #[serde(default)]
    steering_min: Option<u32>,
    #[serde(default)]
    steering_max: Option<u32>,
}

/// JSON file backed calibration store
#[derive(Debug, Clone)]
pub struct JsonCalibrationStore {
    path: PathBuf,
    half_range_us: u32,
    mid_window: RangeInclusive<u32>,
}

impl JsonCalibrationStore {
    /// # Arguments
    ///
    /// * `path` - JSON file holding the record
    /// * `half_range_us` - Steering travel either side of mid
    /// * `mid_window` - Accepted `steering_mid` values (the trim window)
    pub fn new<P: AsRef<Path>>(path: P, half_range_us: u32, mid_window: RangeInclusive<u32>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            half_range_us,
            mid_window,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CalibrationStore for JsonCalibrationStore {
    fn load(&self) -> Result<Option<CalibrationRecord>> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let stored: StoredCalibration = serde_json::from_str(&contents)?;
        if !self.mid_window.contains(&stored.steering_mid) {
            return Err(RoverError::CalibrationStore(format!(
                "Stored steering_mid {} in {} is outside {}..={}",
                stored.steering_mid,
                self.path.display(),
                self.mid_window.start(),
                self.mid_window.end()
            )));
        }

        let record = CalibrationRecord::centered(stored.steering_mid, self.half_range_us);

        if stored.steering_min.is_some_and(|min| min != record.min_us)
            || stored.steering_max.is_some_and(|max| max != record.max_us)
        {
            warn!(
                "Stored steering range in {} does not match Mid={} ± {}, re-deriving",
                self.path.display(),
                record.mid_us,
                self.half_range_us
            );
        }

        Ok(Some(record))
    }

    fn save(&mut self, record: &CalibrationRecord) -> Result<()> {
        let stored = StoredCalibration {
            steering_mid: record.mid_us,
            steering_min: Some(record.min_us),
            steering_max: Some(record.max_us),
        };
        let json = serde_json::to_string_pretty(&stored)?;

        // Write-then-rename so a crash never leaves a truncated file behind
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, json)
            .and_then(|()| fs::rename(&tmp_path, &self.path))
            .map_err(|e| {
                RoverError::CalibrationStore(format!(
                    "Failed to write {}: {}",
                    self.path.display(),
                    e
                ))
            })?;

        info!("Saved steering calibration to {}: Mid={}", self.path.display(), record.mid_us);
        Ok(())
    }
}
