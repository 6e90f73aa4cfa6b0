//! # Servo
//!
//! Hobby servo on a 50 Hz PWM channel. A normalized angle maps linearly from
//! the mid pulse towards the max pulse, with the direction set by the
//! configured [`Polarity`]; the result is always clamped to `[min_us, max_us]`.

use tracing::{debug, info};

use super::sysfs::PwmOutput;
use super::{Actuator, TrimmableActuator};
use crate::config::CameraServoConfig;
use crate::control::calibration::CalibrationRecord;
use crate::control::channel_mapper::Polarity;
use crate::error::Result;

/// 20 ms servo frame
pub const SERVO_PERIOD_NS: u64 = 20_000_000;

/// Where a servo's pulse limits came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSource {
    /// Calibration record (stored or committed at runtime)
    Loaded,
    /// Fixed values from the configuration file
    Provided,
}

/// Pulse limits and direction for one servo
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ServoConfig {
    pub min_us: u32,
    pub max_us: u32,
    pub mid_us: u32,
    pub polarity: Polarity,
    pub source: ConfigSource,
}

impl ServoConfig {
    /// Steering limits from a calibration record
    pub fn from_calibration(record: &CalibrationRecord, polarity: Polarity) -> Self {
        Self {
            min_us: record.min_us,
            max_us: record.max_us,
            mid_us: record.mid_us,
            polarity,
            source: ConfigSource::Loaded,
        }
    }

    pub fn camera(config: &CameraServoConfig) -> Self {
        Self {
            min_us: config.min_us,
            max_us: config.max_us,
            mid_us: config.mid_us,
            polarity: config.polarity,
            source: ConfigSource::Provided,
        }
    }

    /// Pulse width for a normalized angle, clamped to the limits.
    ///
    /// # Examples
    ///
    /// ```
    /// use sbus_rover::actuator::servo::{ConfigSource, ServoConfig};
    /// use sbus_rover::control::channel_mapper::Polarity;
    ///
    /// let config = ServoConfig {
    ///     min_us: 800,
    ///     max_us: 2200,
    ///     mid_us: 1500,
    ///     polarity: Polarity::Inverted,
    ///     source: ConfigSource::Provided,
    /// };
    /// assert_eq!(config.pulse_us(0.0), 1500);
    /// assert_eq!(config.pulse_us(-1.0), 2200);
    /// assert_eq!(config.pulse_us(1.0), 800);
    /// ```
    pub fn pulse_us(&self, angle: f32) -> u32 {
        let angle = f64::from(angle.clamp(-1.0, 1.0) * self.polarity.sign());
        let span = f64::from(self.max_us) - f64::from(self.mid_us);
        let us = (f64::from(self.mid_us) + angle * span).trunc();
        us.clamp(f64::from(self.min_us), f64::from(self.max_us)) as u32
    }

    fn clamp_us(&self, us: u32) -> u32 {
        us.clamp(self.min_us, self.max_us)
    }
}

/// A servo driven by any [`PwmOutput`]
pub struct Servo<P: PwmOutput> {
    name: String,
    pwm: P,
    config: ServoConfig,
    last_us: Option<u32>,
}

impl<P: PwmOutput> Servo<P> {
    /// Creates the servo and parks it at its mid pulse.
    pub fn new(name: impl Into<String>, pwm: P, config: ServoConfig) -> Result<Self> {
        let mut servo = Self {
            name: name.into(),
            pwm,
            config,
            last_us: None,
        };
        info!(
            "{} servo: Mid={}, Range=[{}, {}] ({:?})",
            servo.name, config.mid_us, config.min_us, config.max_us, config.source
        );
        servo.set_microseconds(config.mid_us)?;
        Ok(servo)
    }

    pub fn config(&self) -> &ServoConfig {
        &self.config
    }

    /// Last pulse width written
    pub fn last_us(&self) -> Option<u32> {
        self.last_us
    }
}

impl<P: PwmOutput> Actuator for Servo<P> {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_command(&mut self, value: f32) -> Result<()> {
        let us = self.config.pulse_us(value);
        self.set_microseconds(us)
    }

    fn release(&mut self) -> Result<()> {
        debug!("Releasing {} servo", self.name);
        self.pwm.disable()
    }
}

impl<P: PwmOutput> TrimmableActuator for Servo<P> {
    fn set_microseconds(&mut self, us: u32) -> Result<()> {
        let us = self.config.clamp_us(us);
        self.pwm.set_duty_cycle(u64::from(us) * 1000)?;
        self.last_us = Some(us);
        Ok(())
    }

    fn apply_calibration(&mut self, record: &CalibrationRecord) -> Result<()> {
        self.config = ServoConfig::from_calibration(record, self.config.polarity);
        info!(
            "{} servo recalibrated: Mid={}, Range=[{}, {}]",
            self.name, record.mid_us, record.min_us, record.max_us
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actuator::sysfs::mocks::RecordingPwm;

    fn steering(pwm: &RecordingPwm) -> Servo<RecordingPwm> {
        let record = CalibrationRecord::centered(1471, 150);
        Servo::new(
            "steering",
            pwm.clone(),
            ServoConfig::from_calibration(&record, Polarity::Inverted),
        )
        .unwrap()
    }

    #[test]
    fn test_new_parks_at_mid() {
        let pwm = RecordingPwm::new(SERVO_PERIOD_NS);
        let servo = steering(&pwm);

        assert_eq!(pwm.last_duty(), Some(1_471_000));
        assert_eq!(servo.last_us(), Some(1471));
    }

    #[test]
    fn test_inverted_command_direction() {
        let pwm = RecordingPwm::new(SERVO_PERIOD_NS);
        let mut servo = steering(&pwm);

        servo.set_command(-1.0).unwrap();
        assert_eq!(servo.last_us(), Some(1621));

        servo.set_command(1.0).unwrap();
        assert_eq!(servo.last_us(), Some(1321));

        servo.set_command(0.0).unwrap();
        assert_eq!(servo.last_us(), Some(1471));
    }

    #[test]
    fn test_normal_polarity() {
        let config = ServoConfig {
            min_us: 800,
            max_us: 2200,
            mid_us: 1500,
            polarity: Polarity::Normal,
            source: ConfigSource::Provided,
        };
        assert_eq!(config.pulse_us(1.0), 2200);
        assert_eq!(config.pulse_us(-1.0), 800);
        assert_eq!(config.pulse_us(0.5), 1850);
    }

    #[test]
    fn test_microseconds_clamped() {
        let pwm = RecordingPwm::new(SERVO_PERIOD_NS);
        let mut servo = steering(&pwm);

        servo.set_microseconds(1000).unwrap();
        assert_eq!(servo.last_us(), Some(1321));
        servo.set_microseconds(3000).unwrap();
        assert_eq!(pwm.last_duty(), Some(1_621_000));
    }

    #[test]
    fn test_apply_calibration_moves_limits() {
        let pwm = RecordingPwm::new(SERVO_PERIOD_NS);
        let mut servo = steering(&pwm);

        servo.apply_calibration(&CalibrationRecord::centered(1650, 150)).unwrap();
        assert_eq!(servo.config().mid_us, 1650);
        assert_eq!(servo.config().source, ConfigSource::Loaded);

        servo.set_command(0.0).unwrap();
        assert_eq!(servo.last_us(), Some(1650));
        servo.set_microseconds(1790).unwrap();
        assert_eq!(servo.last_us(), Some(1790));
    }

    #[test]
    fn test_camera_defaults() {
        let config = ServoConfig::camera(&CameraServoConfig::default());
        assert_eq!(config.source, ConfigSource::Provided);
        assert_eq!(config.pulse_us(0.0), 1500);
        assert_eq!(config.pulse_us(-1.0), 2200);
        assert_eq!(config.pulse_us(1.0), 800);
    }

    #[test]
    fn test_release_disables_pwm() {
        let pwm = RecordingPwm::new(SERVO_PERIOD_NS);
        let mut servo = steering(&pwm);

        servo.release().unwrap();
        assert!(!pwm.is_enabled());
    }
}
