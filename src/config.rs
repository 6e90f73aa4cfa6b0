//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.
//!
//! Every section and every field is optional; omitted values fall back to the
//! `default_*` functions below, which describe the stock rover wiring.

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::control::channel_mapper::Polarity;
use crate::error::{Result, RoverError};
use crate::sbus::protocol::{SBUS_CHANNEL_VALUE_MAX, SBUS_NUM_CHANNELS};

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub serial: SerialConfig,
    #[serde(default)]
    pub channels: ChannelConfig,
    #[serde(default)]
    pub mapping: MappingConfig,
    #[serde(default)]
    pub calibration: CalibrationConfig,
    #[serde(default)]
    pub safety: SafetyConfig,
    #[serde(default)]
    pub control: ControlConfig,
    #[serde(default)]
    pub actuators: ActuatorsConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Receiver serial port configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SerialConfig {
    #[serde(default = "default_serial_port")]
    pub port: String,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

/// Channel assignment (0-based indices into the 16 SBUS channels)
#[derive(Debug, Deserialize, Clone)]
pub struct ChannelConfig {
    #[serde(default = "default_steering_channel")]
    pub steering: usize,

    #[serde(default = "default_throttle_channel")]
    pub throttle: usize,

    #[serde(default = "default_camera_pan_channel")]
    pub camera_pan: usize,

    #[serde(default = "default_calibration_switch_channel")]
    pub calibration_switch: usize,

    #[serde(default = "default_calibration_knob_channel")]
    pub calibration_knob: usize,
}

/// Raw channel to normalized command mapping
#[derive(Debug, Deserialize, Clone)]
pub struct MappingConfig {
    #[serde(default = "default_center")]
    pub center: u16,

    #[serde(default = "default_deadband")]
    pub deadband: u16,

    #[serde(default = "default_half_span")]
    pub half_span: u16,

    #[serde(default = "default_span_min")]
    pub min: u16,

    #[serde(default = "default_span_max")]
    pub max: u16,
}

/// Steering trim calibration
#[derive(Debug, Deserialize, Clone)]
pub struct CalibrationConfig {
    #[serde(default = "default_switch_threshold")]
    pub switch_threshold: u16,

    #[serde(default = "default_trim_min_us")]
    pub trim_min_us: u32,

    #[serde(default = "default_trim_max_us")]
    pub trim_max_us: u32,

    #[serde(default = "default_knob_polarity")]
    pub knob_polarity: Polarity,

    #[serde(default = "default_steering_mid_us")]
    pub default_mid_us: u32,

    #[serde(default = "default_half_range_us")]
    pub half_range_us: u32,

    #[serde(default = "default_store_path")]
    pub store_path: String,
}

/// Link-loss failsafe
#[derive(Debug, Deserialize, Clone)]
pub struct SafetyConfig {
    #[serde(default = "default_failsafe_timeout_ms")]
    pub failsafe_timeout_ms: u64,

    #[serde(default)]
    pub honor_failsafe_flag: bool,
}

/// Control loop timing
#[derive(Debug, Deserialize, Clone)]
pub struct ControlConfig {
    #[serde(default = "default_loop_period_ms")]
    pub loop_period_ms: u64,
}

/// Actuator hardware
#[derive(Debug, Deserialize, Clone)]
pub struct ActuatorsConfig {
    #[serde(default = "default_allow_degraded")]
    pub allow_degraded: bool,

    #[serde(default = "default_pwm_root")]
    pub pwm_root: String,

    #[serde(default = "default_gpio_root")]
    pub gpio_root: String,

    #[serde(default)]
    pub steering: SteeringServoConfig,

    #[serde(default)]
    pub camera: CameraServoConfig,

    #[serde(default = "default_motors")]
    pub motors: Vec<MotorConfig>,
}

/// Steering servo output; pulse limits come from the calibration record
#[derive(Debug, Deserialize, Clone)]
pub struct SteeringServoConfig {
    #[serde(default = "default_steering_chip")]
    pub chip: u32,

    #[serde(default)]
    pub channel: u32,

    #[serde(default = "default_servo_polarity")]
    pub polarity: Polarity,
}

/// Camera pan servo output
#[derive(Debug, Deserialize, Clone)]
pub struct CameraServoConfig {
    #[serde(default = "default_camera_chip")]
    pub chip: u32,

    #[serde(default)]
    pub channel: u32,

    #[serde(default = "default_camera_min_us")]
    pub min_us: u32,

    #[serde(default = "default_camera_max_us")]
    pub max_us: u32,

    #[serde(default = "default_camera_mid_us")]
    pub mid_us: u32,

    #[serde(default = "default_servo_polarity")]
    pub polarity: Polarity,
}

/// One drive motor (PWM speed + two direction pins)
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct MotorConfig {
    pub chip: u32,

    #[serde(default)]
    pub channel: u32,

    /// Driven high for forward
    pub pin_forward: u32,

    /// Driven high for reverse
    pub pin_reverse: u32,
}

/// Telemetry configuration
#[derive(Debug, Deserialize, Clone)]
pub struct TelemetryConfig {
    #[serde(default = "default_telemetry_enabled")]
    pub enabled: bool,

    #[serde(default = "default_log_dir")]
    pub log_dir: String,

    #[serde(default = "default_max_records_per_file")]
    pub max_records_per_file: usize,

    #[serde(default = "default_max_files_to_keep")]
    pub max_files_to_keep: usize,

    #[serde(default = "default_log_interval_ms")]
    pub log_interval_ms: u64,

    #[serde(default = "default_log_format")]
    pub format: String,
}

/// Diagnostic logging
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Also write a daily-rolling log file here when set
    #[serde(default)]
    pub directory: Option<String>,
}

// Default value functions
fn default_serial_port() -> String { "/dev/ttyS3".to_string() }
fn default_baud_rate() -> u32 { 100_000 }
fn default_timeout_ms() -> u64 { 20 }

fn default_steering_channel() -> usize { 3 }
fn default_throttle_channel() -> usize { 1 }
fn default_camera_pan_channel() -> usize { 9 }
fn default_calibration_switch_channel() -> usize { 6 }
fn default_calibration_knob_channel() -> usize { 8 }

fn default_center() -> u16 { 992 }
fn default_deadband() -> u16 { 100 }
fn default_half_span() -> u16 { 800 }
fn default_span_min() -> u16 { 200 }
fn default_span_max() -> u16 { 1800 }

fn default_switch_threshold() -> u16 { 1500 }
fn default_trim_min_us() -> u32 { 1350 }
fn default_trim_max_us() -> u32 { 1650 }
fn default_knob_polarity() -> Polarity { Polarity::Inverted }
fn default_steering_mid_us() -> u32 { 1471 }
fn default_half_range_us() -> u32 { 150 }
fn default_store_path() -> String { "servo_config.json".to_string() }

fn default_failsafe_timeout_ms() -> u64 { 500 }

fn default_loop_period_ms() -> u64 { 10 }

fn default_allow_degraded() -> bool { true }
fn default_pwm_root() -> String { "/sys/class/pwm".to_string() }
fn default_gpio_root() -> String { "/sys/class/gpio".to_string() }
fn default_steering_chip() -> u32 { 4 }
fn default_camera_chip() -> u32 { 1 }
fn default_camera_min_us() -> u32 { 800 }
fn default_camera_max_us() -> u32 { 2200 }
fn default_camera_mid_us() -> u32 { 1500 }
fn default_servo_polarity() -> Polarity { Polarity::Inverted }
fn default_motors() -> Vec<MotorConfig> {
    vec![
        MotorConfig { chip: 2, channel: 0, pin_forward: 21, pin_reverse: 19 },
        MotorConfig { chip: 0, channel: 0, pin_forward: 129, pin_reverse: 98 },
    ]
}

fn default_telemetry_enabled() -> bool { true }
fn default_log_dir() -> String { "./logs".to_string() }
fn default_max_records_per_file() -> usize { 10000 }
fn default_max_files_to_keep() -> usize { 10 }
fn default_log_interval_ms() -> u64 { 100 }
fn default_log_format() -> String { "jsonl".to_string() }

fn default_log_level() -> String { "info".to_string() }

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: default_serial_port(),
            baud_rate: default_baud_rate(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            steering: default_steering_channel(),
            throttle: default_throttle_channel(),
            camera_pan: default_camera_pan_channel(),
            calibration_switch: default_calibration_switch_channel(),
            calibration_knob: default_calibration_knob_channel(),
        }
    }
}

impl Default for MappingConfig {
    fn default() -> Self {
        Self {
            center: default_center(),
            deadband: default_deadband(),
            half_span: default_half_span(),
            min: default_span_min(),
            max: default_span_max(),
        }
    }
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            switch_threshold: default_switch_threshold(),
            trim_min_us: default_trim_min_us(),
            trim_max_us: default_trim_max_us(),
            knob_polarity: default_knob_polarity(),
            default_mid_us: default_steering_mid_us(),
            half_range_us: default_half_range_us(),
            store_path: default_store_path(),
        }
    }
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            failsafe_timeout_ms: default_failsafe_timeout_ms(),
            honor_failsafe_flag: false,
        }
    }
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            loop_period_ms: default_loop_period_ms(),
        }
    }
}

impl Default for ActuatorsConfig {
    fn default() -> Self {
        Self {
            allow_degraded: default_allow_degraded(),
            pwm_root: default_pwm_root(),
            gpio_root: default_gpio_root(),
            steering: SteeringServoConfig::default(),
            camera: CameraServoConfig::default(),
            motors: default_motors(),
        }
    }
}

impl Default for SteeringServoConfig {
    fn default() -> Self {
        Self {
            chip: default_steering_chip(),
            channel: 0,
            polarity: default_servo_polarity(),
        }
    }
}

impl Default for CameraServoConfig {
    fn default() -> Self {
        Self {
            chip: default_camera_chip(),
            channel: 0,
            min_us: default_camera_min_us(),
            max_us: default_camera_max_us(),
            mid_us: default_camera_mid_us(),
            polarity: default_servo_polarity(),
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: default_telemetry_enabled(),
            log_dir: default_log_dir(),
            max_records_per_file: default_max_records_per_file(),
            max_files_to_keep: default_max_files_to_keep(),
            log_interval_ms: default_log_interval_ms(),
            format: default_log_format(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            directory: None,
        }
    }
}

fn invalid(message: impl std::fmt::Display) -> RoverError {
    RoverError::Config(toml::de::Error::custom(message))
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use sbus_rover::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parse and validate configuration from a TOML string
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        // Serial
        if self.serial.port.is_empty() {
            return Err(invalid("serial port cannot be empty"));
        }

        if ![100_000, 200_000].contains(&self.serial.baud_rate) {
            return Err(invalid("baud_rate must be one of: 100000, 200000"));
        }

        // A read must never stall the loop much longer than one frame period
        if self.serial.timeout_ms == 0 || self.serial.timeout_ms > 100 {
            return Err(invalid("timeout_ms must be between 1 and 100"));
        }

        // Channel indices (SBUS has 16 channels: 0-15)
        for (name, index) in [
            ("steering", self.channels.steering),
            ("throttle", self.channels.throttle),
            ("camera_pan", self.channels.camera_pan),
            ("calibration_switch", self.channels.calibration_switch),
            ("calibration_knob", self.channels.calibration_knob),
        ] {
            if index >= SBUS_NUM_CHANNELS {
                return Err(invalid(format!(
                    "{} channel {} is out of bounds (must be 0-15)",
                    name, index
                )));
            }
        }

        // Mapping
        let mapping = &self.mapping;
        if mapping.min >= mapping.max || mapping.max > SBUS_CHANNEL_VALUE_MAX {
            return Err(invalid("mapping min must be less than max, and max at most 2047"));
        }

        if mapping.center <= mapping.min || mapping.center >= mapping.max {
            return Err(invalid("mapping center must lie strictly between min and max"));
        }

        if mapping.half_span == 0 {
            return Err(invalid("half_span must be greater than 0"));
        }

        if mapping.deadband >= mapping.half_span {
            return Err(invalid("deadband must be smaller than half_span"));
        }

        // Calibration
        let calibration = &self.calibration;
        if calibration.switch_threshold > SBUS_CHANNEL_VALUE_MAX {
            return Err(invalid("switch_threshold must be between 0 and 2047"));
        }

        if calibration.trim_min_us >= calibration.trim_max_us {
            return Err(invalid("trim_min_us must be less than trim_max_us"));
        }

        if calibration.half_range_us == 0 || calibration.half_range_us >= calibration.trim_min_us {
            return Err(invalid("half_range_us must be greater than 0 and below trim_min_us"));
        }

        if !(calibration.trim_min_us..=calibration.trim_max_us).contains(&calibration.default_mid_us) {
            return Err(invalid("default_mid_us must be within trim_min_us..=trim_max_us"));
        }

        if calibration.store_path.is_empty() {
            return Err(invalid("calibration store_path cannot be empty"));
        }

        // Safety and timing
        if self.safety.failsafe_timeout_ms == 0 || self.safety.failsafe_timeout_ms > 60000 {
            return Err(invalid("failsafe_timeout_ms must be between 1 and 60000"));
        }

        if self.control.loop_period_ms == 0 || self.control.loop_period_ms > 1000 {
            return Err(invalid("loop_period_ms must be between 1 and 1000"));
        }

        if self.control.loop_period_ms >= self.safety.failsafe_timeout_ms {
            return Err(invalid("loop_period_ms must be shorter than failsafe_timeout_ms"));
        }

        // Actuators
        let camera = &self.actuators.camera;
        if camera.min_us >= camera.max_us
            || camera.mid_us <= camera.min_us
            || camera.mid_us >= camera.max_us
        {
            return Err(invalid("camera servo must satisfy min_us < mid_us < max_us"));
        }

        if camera.max_us > 20_000 {
            return Err(invalid("camera max_us must fit in the 20ms servo period"));
        }

        if self.actuators.motors.is_empty() {
            return Err(invalid("at least one drive motor must be configured"));
        }

        for motor in &self.actuators.motors {
            if motor.pin_forward == motor.pin_reverse {
                return Err(invalid(format!(
                    "motor on pwmchip{} uses pin {} for both directions",
                    motor.chip, motor.pin_forward
                )));
            }
        }

        // Telemetry
        if self.telemetry.enabled && self.telemetry.log_dir.is_empty() {
            return Err(invalid("telemetry log_dir cannot be empty when enabled"));
        }

        if self.telemetry.log_interval_ms == 0 || self.telemetry.log_interval_ms > 60000 {
            return Err(invalid("log_interval_ms must be between 1 and 60000"));
        }

        if self.telemetry.max_records_per_file == 0 {
            return Err(invalid("max_records_per_file must be greater than 0"));
        }

        if self.telemetry.max_files_to_keep == 0 {
            return Err(invalid("max_files_to_keep must be greater than 0"));
        }

        if self.telemetry.format != "jsonl" {
            return Err(invalid("log format must be 'jsonl' (only supported format)"));
        }

        // Logging
        if self.logging.level.parse::<tracing::Level>().is_err() {
            return Err(invalid(format!(
                "logging level '{}' must be one of: trace, debug, info, warn, error",
                self.logging.level
            )));
        }

        Ok(())
    }
}
