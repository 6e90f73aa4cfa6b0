//! # Steering Calibration Module
//!
//! Live steering-trim calibration driven from the transmitter.
//!
//! ## Modes
//!
//! - **Normal**: the steering channel drives the steering servo.
//! - **Calibrating**: entered while the switch channel reads above the
//!   threshold (1500). The knob channel is mapped onto the trim window and the
//!   resulting pulse width is sent straight to the steering servo, so the
//!   operator can watch the wheels while centering them. The steering stick
//!   is ignored.
//!
//! Dropping the switch back to or below the threshold commits the trim target
//! computed from the knob on that very tick as the new
//! [`CalibrationRecord`], persists it once, and hands steering back to the
//! stick in the same tick.
//!
//! ## Usage
//!
//! ```
//! use sbus_rover::control::calibration::{CalibrationRecord, CalibrationStateMachine, SteeringDemand};
//! use sbus_rover::control::channel_mapper::TrimMapping;
//! use sbus_rover::store::JsonCalibrationStore;
//!
//! let store = JsonCalibrationStore::new(std::env::temp_dir().join("doc_servo_config.json"), 150, 1350..=1650);
//! let mut machine = CalibrationStateMachine::new(
//!     store,
//!     CalibrationRecord::centered(1471, 150),
//!     TrimMapping::default(),
//!     1500,
//!     150,
//! );
//!
//! let update = machine.update(1600, 1000, 0.3);
//! assert_eq!(update.steering, SteeringDemand::Microseconds(1500));
//! ```

use serde::Serialize;
use tracing::{debug, info, warn};

use super::channel_mapper::TrimMapping;
use crate::store::CalibrationStore;

/// Steering servo neutral and travel limits, in microseconds.
///
/// `min_us` and `max_us` are always `mid_us ∓ half-range`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CalibrationRecord {
    pub mid_us: u32,
    pub min_us: u32,
    pub max_us: u32,
}

impl CalibrationRecord {
    /// Builds a record spanning `mid_us ± half_range_us`.
    #[must_use]
    pub fn centered(mid_us: u32, half_range_us: u32) -> Self {
        Self {
            mid_us,
            min_us: mid_us.saturating_sub(half_range_us),
            max_us: mid_us.saturating_add(half_range_us),
        }
    }
}

/// Operating mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlMode {
    #[default]
    Normal,
    Calibrating,
}

/// What the steering servo should do this tick
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SteeringDemand {
    /// Normalized command in -1.0..=1.0
    Command(f32),
    /// Direct pulse width
    Microseconds(u32),
}

/// Result of one state machine step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationUpdate {
    pub steering: SteeringDemand,

    /// Set on the tick a calibration session ends
    pub committed: Option<CalibrationRecord>,
}

/// Normal/Calibrating state machine; the sole owner of [`ControlMode`].
pub struct CalibrationStateMachine<S: CalibrationStore> {
    mode: ControlMode,
    record: CalibrationRecord,
    trim: TrimMapping,
    switch_threshold: u16,
    half_range_us: u32,
    store: S,
}

impl<S: CalibrationStore> std::fmt::Debug for CalibrationStateMachine<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CalibrationStateMachine")
            .field("mode", &self.mode)
            .field("record", &self.record)
            .finish_non_exhaustive()
    }
}

impl<S: CalibrationStore> CalibrationStateMachine<S> {
    /// Creates the state machine in [`ControlMode::Normal`].
    ///
    /// # Arguments
    ///
    /// * `store` - Where committed records are persisted
    /// * `record` - Record in force at startup (usually loaded from `store`)
    /// * `trim` - Knob to trim target mapping
    /// * `switch_threshold` - Switch values strictly above this select calibration
    /// * `half_range_us` - Steering travel either side of mid
    pub fn new(
        store: S,
        record: CalibrationRecord,
        trim: TrimMapping,
        switch_threshold: u16,
        half_range_us: u32,
    ) -> Self {
        Self {
            mode: ControlMode::Normal,
            record,
            trim,
            switch_threshold,
            half_range_us,
            store,
        }
    }

    /// Advance one tick.
    ///
    /// # Arguments
    ///
    /// * `switch` - Raw calibration switch channel value
    /// * `knob` - Raw calibration knob channel value
    /// * `steering` - Normalized steering stick command
    pub fn update(&mut self, switch: u16, knob: u16, steering: f32) -> CalibrationUpdate {
        let calibrate = switch > self.switch_threshold;

        match (self.mode, calibrate) {
            (_, true) => {
                if self.mode == ControlMode::Normal {
                    info!("Entering steering calibration (switch={})", switch);
                    self.mode = ControlMode::Calibrating;
                }

                let target = self.trim.target_us(knob);
                debug!("Calibrating: knob {} -> {}us", knob, target);
                CalibrationUpdate {
                    steering: SteeringDemand::Microseconds(target),
                    committed: None,
                }
            }
            (ControlMode::Calibrating, false) => {
                let target = self.trim.target_us(knob);
                let record = CalibrationRecord::centered(target, self.half_range_us);
                info!("Exiting steering calibration, new Mid={}", target);

                self.commit(record);
                self.mode = ControlMode::Normal;
                CalibrationUpdate {
                    steering: SteeringDemand::Command(steering),
                    committed: Some(record),
                }
            }
            (ControlMode::Normal, false) => CalibrationUpdate {
                steering: SteeringDemand::Command(steering),
                committed: None,
            },
        }
    }

    pub fn mode(&self) -> ControlMode {
        self.mode
    }

    /// Record currently in force
    pub fn record(&self) -> CalibrationRecord {
        self.record
    }

    fn commit(&mut self, record: CalibrationRecord) {
        self.record = record;
        if let Err(e) = self.store.save(&record) {
            warn!(
                "Failed to persist steering calibration Mid={} ({}); keeping it for this run",
                record.mid_us, e
            );
        }
    }
}
