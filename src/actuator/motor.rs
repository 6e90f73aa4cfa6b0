//! # Drive Motor
//!
//! H-bridge channel: a 1 kHz PWM sets the speed and two direction pins select
//! forward, reverse or coast.
//!
//! | speed | forward pin | reverse pin |
//! |-------|-------------|-------------|
//! | > 0   | high        | low         |
//! | < 0   | low         | high        |
//! | 0     | low         | low         |

use tracing::debug;

use super::sysfs::{DigitalOutput, PwmOutput};
use super::Actuator;
use crate::error::Result;

/// 1 ms motor PWM period
pub const MOTOR_PERIOD_NS: u64 = 1_000_000;

pub struct Motor<P: PwmOutput, G: DigitalOutput> {
    name: String,
    pwm: P,
    forward: G,
    reverse: G,
}

impl<P: PwmOutput, G: DigitalOutput> Motor<P, G> {
    /// Creates a stopped motor.
    pub fn new(name: impl Into<String>, pwm: P, forward: G, reverse: G) -> Result<Self> {
        let mut motor = Self {
            name: name.into(),
            pwm,
            forward,
            reverse,
        };
        motor.set_command(0.0)?;
        Ok(motor)
    }
}

impl<P: PwmOutput, G: DigitalOutput> Actuator for Motor<P, G> {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_command(&mut self, value: f32) -> Result<()> {
        let speed = value.clamp(-1.0, 1.0);
        let duty = (f64::from(speed.abs()) * self.pwm.period_ns() as f64) as u64;
        self.pwm.set_duty_cycle(duty)?;

        self.forward.set_level(speed > 0.0)?;
        self.reverse.set_level(speed < 0.0)?;
        Ok(())
    }

    fn release(&mut self) -> Result<()> {
        debug!("Releasing {} motor", self.name);
        let stopped = self.set_command(0.0);
        let disabled = self.pwm.disable();
        stopped.and(disabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actuator::sysfs::mocks::{RecordingPin, RecordingPwm};

    struct Rig {
        pwm: RecordingPwm,
        forward: RecordingPin,
        reverse: RecordingPin,
        motor: Motor<RecordingPwm, RecordingPin>,
    }

    fn rig() -> Rig {
        let pwm = RecordingPwm::new(MOTOR_PERIOD_NS);
        let forward = RecordingPin::new();
        let reverse = RecordingPin::new();
        let motor = Motor::new("left", pwm.clone(), forward.clone(), reverse.clone()).unwrap();
        Rig { pwm, forward, reverse, motor }
    }

    #[test]
    fn test_starts_stopped() {
        let rig = rig();
        assert_eq!(rig.pwm.last_duty(), Some(0));
        assert_eq!(rig.forward.level(), Some(false));
        assert_eq!(rig.reverse.level(), Some(false));
    }

    #[test]
    fn test_forward() {
        let mut rig = rig();
        rig.motor.set_command(0.5).unwrap();

        assert_eq!(rig.pwm.last_duty(), Some(500_000));
        assert_eq!(rig.forward.level(), Some(true));
        assert_eq!(rig.reverse.level(), Some(false));
    }

    #[test]
    fn test_reverse_full() {
        let mut rig = rig();
        rig.motor.set_command(-2.0).unwrap();

        assert_eq!(rig.pwm.last_duty(), Some(MOTOR_PERIOD_NS));
        assert_eq!(rig.forward.level(), Some(false));
        assert_eq!(rig.reverse.level(), Some(true));
    }

    #[test]
    fn test_release_stops_and_disables() {
        let mut rig = rig();
        rig.motor.set_command(1.0).unwrap();
        rig.motor.release().unwrap();

        assert_eq!(rig.pwm.last_duty(), Some(0));
        assert_eq!(rig.forward.level(), Some(false));
        assert!(!rig.pwm.is_enabled());
        assert_eq!(rig.motor.name(), "left");
    }
}
