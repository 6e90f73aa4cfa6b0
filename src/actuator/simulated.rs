//! Stand-in outputs for `--dry-run` and for hardware that failed to open.
//!
//! They accept every write and only trace it, so the real [`Servo`] and
//! [`Motor`] logic still runs on top of them.
//!
//! [`Servo`]: super::servo::Servo
//! [`Motor`]: super::motor::Motor

use tracing::trace;

use super::sysfs::{DigitalOutput, PwmOutput};
use crate::error::Result;

#[derive(Debug, Clone)]
pub struct SimulatedPwm {
    label: String,
    period_ns: u64,
}

impl SimulatedPwm {
    pub fn new(label: impl Into<String>, period_ns: u64) -> Self {
        Self {
            label: label.into(),
            period_ns,
        }
    }
}

impl PwmOutput for SimulatedPwm {
    fn period_ns(&self) -> u64 {
        self.period_ns
    }

    fn set_duty_cycle(&mut self, duty_ns: u64) -> Result<()> {
        trace!("[sim] {} duty_cycle={}ns", self.label, duty_ns.min(self.period_ns));
        Ok(())
    }

    fn disable(&mut self) -> Result<()> {
        trace!("[sim] {} disabled", self.label);
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct SimulatedPin {
    label: String,
}

impl SimulatedPin {
    pub fn new(label: impl Into<String>) -> Self {
        Self { label: label.into() }
    }
}

impl DigitalOutput for SimulatedPin {
    fn set_level(&mut self, high: bool) -> Result<()> {
        trace!("[sim] {} value={}", self.label, u8::from(high));
        Ok(())
    }
}
