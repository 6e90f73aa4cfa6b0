//! # Linux sysfs PWM and GPIO outputs
//!
//! Thin wrappers over `/sys/class/pwm` and `/sys/class/gpio`.
//!
//! This module handles:
//! - Exporting PWM channels and GPIO pins on demand
//! - Programming period and duty cycle in a kernel-accepted order
//! - Driving direction pins high or low
//!
//! The roots are configurable so the same code runs against a fake tree in
//! tests.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{Result, RoverError};

/// Give udev a moment to create the attribute files after an export
const EXPORT_SETTLE: Duration = Duration::from_millis(100);

/// A PWM channel with a fixed period
pub trait PwmOutput: Send {
    /// Configured period in nanoseconds
    fn period_ns(&self) -> u64;

    /// Set the high time in nanoseconds; values above the period are capped
    fn set_duty_cycle(&mut self, duty_ns: u64) -> Result<()>;

    /// Stop generating pulses
    fn disable(&mut self) -> Result<()>;
}

/// A single push-pull output pin
pub trait DigitalOutput: Send {
    fn set_level(&mut self, high: bool) -> Result<()>;
}

fn write_attr(path: &Path, value: &str) -> Result<()> {
    fs::write(path, value).map_err(|e| {
        RoverError::Actuator(format!("Failed to write '{}' to {}: {}", value, path.display(), e))
    })
}

fn read_u64_attr(path: &Path) -> u64 {
    fs::read_to_string(path)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(0)
}

/// `/sys/class/pwm/pwmchipN/pwmM`
#[derive(Debug)]
pub struct SysfsPwm {
    path: PathBuf,
    period_ns: u64,
}

impl SysfsPwm {
    /// Export and enable a PWM channel under the default sysfs root.
    pub fn open(chip: u32, channel: u32, period_ns: u64) -> Result<Self> {
        Self::open_at("/sys/class/pwm", chip, channel, period_ns)
    }

    /// Export and enable a PWM channel under `root`.
    ///
    /// The sequence mirrors what the kernel accepts after a fresh boot as well
    /// as after a previous run: the duty cycle may never exceed the period,
    /// and polarity can only change while disabled.
    ///
    /// # Errors
    ///
    /// Returns [`RoverError::Actuator`] if the chip does not exist, the
    /// channel cannot be exported, or any attribute write fails.
    pub fn open_at<P: AsRef<Path>>(root: P, chip: u32, channel: u32, period_ns: u64) -> Result<Self> {
        let chip_path = root.as_ref().join(format!("pwmchip{}", chip));
        if !chip_path.exists() {
            return Err(RoverError::Actuator(format!(
                "PWM chip {} not found at {}",
                chip,
                chip_path.display()
            )));
        }

        let path = chip_path.join(format!("pwm{}", channel));
        if !path.exists() {
            debug!("Exporting pwm{} on {}", channel, chip_path.display());
            write_attr(&chip_path.join("export"), &channel.to_string())?;
            std::thread::sleep(EXPORT_SETTLE);
            if !path.exists() {
                return Err(RoverError::Actuator(format!(
                    "{} did not appear after export",
                    path.display()
                )));
            }
        }

        let mut pwm = Self { path, period_ns };

        // A zero period means the channel was never configured
        if read_u64_attr(&pwm.path.join("period")) == 0 {
            pwm.write_period()?;
            pwm.write_duty(0)?;
        } else {
            pwm.write_duty(0)?;
            pwm.write_period()?;
        }

        pwm.disable()?;
        // Not every PWM driver exposes a writable polarity
        if let Err(e) = write_attr(&pwm.path.join("polarity"), "normal") {
            warn!("Keeping default polarity on {}: {}", pwm.path.display(), e);
        }
        write_attr(&pwm.path.join("enable"), "1")?;

        info!("Opened PWM {} (period {}ns)", pwm.path.display(), period_ns);
        Ok(pwm)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_period(&self) -> Result<()> {
        write_attr(&self.path.join("period"), &self.period_ns.to_string())
    }

    fn write_duty(&self, duty_ns: u64) -> Result<()> {
        write_attr(&self.path.join("duty_cycle"), &duty_ns.to_string())
    }
}

impl PwmOutput for SysfsPwm {
    fn period_ns(&self) -> u64 {
        self.period_ns
    }

    fn set_duty_cycle(&mut self, duty_ns: u64) -> Result<()> {
        self.write_duty(duty_ns.min(self.period_ns))
    }

    fn disable(&mut self) -> Result<()> {
        write_attr(&self.path.join("enable"), "0")
    }
}

/// `/sys/class/gpio/gpioN` configured as an output
#[derive(Debug)]
pub struct SysfsGpio {
    pin: u32,
    value_path: PathBuf,
}

impl SysfsGpio {
    pub fn open(pin: u32) -> Result<Self> {
        Self::open_at("/sys/class/gpio", pin)
    }

    /// Export `pin` if needed and set its direction to output.
    pub fn open_at<P: AsRef<Path>>(root: P, pin: u32) -> Result<Self> {
        let root = root.as_ref();
        let path = root.join(format!("gpio{}", pin));

        if !path.exists() {
            debug!("Exporting gpio{}", pin);
            write_attr(&root.join("export"), &pin.to_string())?;
            std::thread::sleep(EXPORT_SETTLE);
            if !path.exists() {
                return Err(RoverError::Actuator(format!(
                    "{} did not appear after export",
                    path.display()
                )));
            }
        }

        write_attr(&path.join("direction"), "out")?;

        Ok(Self {
            pin,
            value_path: path.join("value"),
        })
    }

    pub fn pin(&self) -> u32 {
        self.pin
    }
}

impl DigitalOutput for SysfsGpio {
    fn set_level(&mut self, high: bool) -> Result<()> {
        write_attr(&self.value_path, if high { "1" } else { "0" })
    }
}
