//! # Actuator Module
//!
//! Output side of the rover: steering servo, drive motors and camera pan servo.
//!
//! This module handles:
//! - The [`Actuator`] / [`TrimmableActuator`] traits the control loop talks to
//! - Building the [`Drivetrain`] from configuration, including the
//!   degraded-mode fallback to simulated outputs
//! - Fan-out of one throttle command to every drive motor
//! - Neutral and release sequencing for shutdown

pub mod motor;
pub mod servo;
pub mod simulated;
pub mod sysfs;

use tracing::{info, warn};

use crate::config::ActuatorsConfig;
use crate::control::calibration::{CalibrationRecord, SteeringDemand};
use crate::error::{Result, RoverError};
use motor::{Motor, MOTOR_PERIOD_NS};
use servo::{Servo, ServoConfig, SERVO_PERIOD_NS};
use simulated::{SimulatedPin, SimulatedPwm};
use sysfs::{SysfsGpio, SysfsPwm};

/// Output accepting a normalized command
pub trait Actuator: Send {
    fn name(&self) -> &str;

    /// Drive to `value` in -1.0..=1.0 (0.0 is neutral)
    fn set_command(&mut self, value: f32) -> Result<()>;

    /// Stop driving the hardware
    fn release(&mut self) -> Result<()>;
}

/// Actuator with a runtime-adjustable pulse window (the steering servo)
pub trait TrimmableActuator: Actuator {
    /// Drive an explicit pulse width, clamped to the current limits
    fn set_microseconds(&mut self, us: u32) -> Result<()>;

    /// Adopt a new mid and limits
    fn apply_calibration(&mut self, record: &CalibrationRecord) -> Result<()>;
}

/// Everything the control loop drives
pub struct Drivetrain {
    steering: Box<dyn TrimmableActuator>,
    motors: Vec<Box<dyn Actuator>>,
    camera_pan: Box<dyn Actuator>,
}

impl std::fmt::Debug for Drivetrain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Drivetrain")
            .field("steering", &self.steering.name())
            .field("motors", &self.motors.iter().map(|m| m.name()).collect::<Vec<_>>())
            .field("camera_pan", &self.camera_pan.name())
            .finish()
    }
}

/// Apply the degraded-mode policy to a failed hardware init.
fn degraded(allow: bool, name: &str, error: RoverError) -> Result<()> {
    if !allow {
        return Err(error);
    }
    warn!("{} unavailable ({}), continuing with a simulated output", name, error);
    Ok(())
}

fn motor_name(index: usize) -> String {
    format!("motor{}", index)
}

impl Drivetrain {
    pub fn new(
        steering: Box<dyn TrimmableActuator>,
        motors: Vec<Box<dyn Actuator>>,
        camera_pan: Box<dyn Actuator>,
    ) -> Self {
        Self {
            steering,
            motors,
            camera_pan,
        }
    }

    /// Open every configured output through sysfs.
    ///
    /// # Arguments
    ///
    /// * `config` - Actuator wiring
    /// * `record` - Steering calibration in force at startup
    ///
    /// # Errors
    ///
    /// With `allow_degraded = false`, the first output that fails to open is
    /// returned as an error. Otherwise it is replaced by a simulated output
    /// and a warning is logged.
    pub fn from_config(config: &ActuatorsConfig, record: &CalibrationRecord) -> Result<Self> {
        let allow = config.allow_degraded;
        let pwm_root = &config.pwm_root;
        let gpio_root = &config.gpio_root;

        let steering_config = ServoConfig::from_calibration(record, config.steering.polarity);
        let steering: Box<dyn TrimmableActuator> = match SysfsPwm::open_at(
            pwm_root,
            config.steering.chip,
            config.steering.channel,
            SERVO_PERIOD_NS,
        )
        .and_then(|pwm| Servo::new("steering", pwm, steering_config))
        {
            Ok(servo) => Box::new(servo),
            Err(e) => {
                degraded(allow, "steering", e)?;
                Box::new(Servo::new(
                    "steering",
                    SimulatedPwm::new("steering", SERVO_PERIOD_NS),
                    steering_config,
                )?)
            }
        };

        let mut motors: Vec<Box<dyn Actuator>> = Vec::with_capacity(config.motors.len());
        for (index, wiring) in config.motors.iter().enumerate() {
            let name = motor_name(index);
            let opened = SysfsPwm::open_at(pwm_root, wiring.chip, wiring.channel, MOTOR_PERIOD_NS)
                .and_then(|pwm| {
                    let forward = SysfsGpio::open_at(gpio_root, wiring.pin_forward)?;
                    let reverse = SysfsGpio::open_at(gpio_root, wiring.pin_reverse)?;
                    Motor::new(name.clone(), pwm, forward, reverse)
                });

            match opened {
                Ok(motor) => motors.push(Box::new(motor)),
                Err(e) => {
                    degraded(allow, &name, e)?;
                    motors.push(Box::new(simulated_motor(&name)?));
                }
            }
        }

        let camera_config = ServoConfig::camera(&config.camera);
        let camera_pan: Box<dyn Actuator> = match SysfsPwm::open_at(
            pwm_root,
            config.camera.chip,
            config.camera.channel,
            SERVO_PERIOD_NS,
        )
        .and_then(|pwm| Servo::new("camera_pan", pwm, camera_config))
        {
            Ok(servo) => Box::new(servo),
            Err(e) => {
                degraded(allow, "camera_pan", e)?;
                Box::new(Servo::new(
                    "camera_pan",
                    SimulatedPwm::new("camera_pan", SERVO_PERIOD_NS),
                    camera_config,
                )?)
            }
        };

        info!("Drivetrain ready: steering, {} motor(s), camera pan", motors.len());
        Ok(Self::new(steering, motors, camera_pan))
    }

    /// Same layout as [`Drivetrain::from_config`] with every output simulated.
    pub fn simulated(config: &ActuatorsConfig, record: &CalibrationRecord) -> Result<Self> {
        let steering = Servo::new(
            "steering",
            SimulatedPwm::new("steering", SERVO_PERIOD_NS),
            ServoConfig::from_calibration(record, config.steering.polarity),
        )?;

        let motors = (0..config.motors.len())
            .map(|index| simulated_motor(&motor_name(index)).map(|m| Box::new(m) as Box<dyn Actuator>))
            .collect::<Result<Vec<_>>>()?;

        let camera_pan = Servo::new(
            "camera_pan",
            SimulatedPwm::new("camera_pan", SERVO_PERIOD_NS),
            ServoConfig::camera(&config.camera),
        )?;

        info!("Drivetrain simulated (dry run)");
        Ok(Self::new(Box::new(steering), motors, Box::new(camera_pan)))
    }

    pub fn steer(&mut self, demand: SteeringDemand) -> Result<()> {
        match demand {
            SteeringDemand::Command(value) => self.steering.set_command(value),
            SteeringDemand::Microseconds(us) => self.steering.set_microseconds(us),
        }
    }

    /// Send the same throttle to every motor
    pub fn drive(&mut self, throttle: f32) -> Result<()> {
        first_error(self.motors.iter_mut().map(|m| m.set_command(throttle)).collect())
    }

    pub fn pan(&mut self, value: f32) -> Result<()> {
        self.camera_pan.set_command(value)
    }

    pub fn apply_calibration(&mut self, record: &CalibrationRecord) -> Result<()> {
        self.steering.apply_calibration(record)
    }

    /// Command every output to neutral, attempting all of them.
    ///
    /// # Errors
    ///
    /// Returns the first failure after every output has been tried.
    pub fn neutral(&mut self) -> Result<()> {
        let mut results = vec![self.steering.set_command(0.0)];
        results.extend(self.motors.iter_mut().map(|m| m.set_command(0.0)));
        results.push(self.camera_pan.set_command(0.0));
        first_error(results)
    }

    /// Release every output, attempting all of them.
    pub fn release(&mut self) -> Result<()> {
        let mut results = vec![self.steering.release()];
        results.extend(self.motors.iter_mut().map(|m| m.release()));
        results.push(self.camera_pan.release());
        first_error(results)
    }

    pub fn motor_count(&self) -> usize {
        self.motors.len()
    }
}

fn simulated_motor(name: &str) -> Result<Motor<SimulatedPwm, SimulatedPin>> {
    Motor::new(
        name,
        SimulatedPwm::new(name, MOTOR_PERIOD_NS),
        SimulatedPin::new(format!("{}.forward", name)),
        SimulatedPin::new(format!("{}.reverse", name)),
    )
}

fn first_error(results: Vec<Result<()>>) -> Result<()> {
    results.into_iter().collect()
}
