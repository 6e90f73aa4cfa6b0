//! # Control Loop Driver
//!
//! Fixed-period orchestrator tying the receiver to the actuators.
//!
//! Each tick:
//! 1. Poll the SBUS receiver for whatever bytes are available
//! 2. Refresh and evaluate the failsafe watchdog
//! 3. Disconnected: every actuator goes to neutral, calibration is skipped
//! 4. Connected: map throttle and camera pan, run the calibration state
//!    machine on switch/knob/steering, emit all three commands
//! 5. Publish a telemetry sample without blocking
//!
//! On stop every actuator is commanded to neutral first and released after.

use chrono::Utc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::calibration::{
    CalibrationRecord, CalibrationStateMachine, ControlMode, SteeringDemand,
};
use super::channel_mapper::{ChannelMapper, TrimMapping};
use super::failsafe::Watchdog;
use crate::actuator::Drivetrain;
use crate::clock::Clock;
use crate::config::{ChannelConfig, Config};
use crate::error::Result;
use crate::sbus::receiver::{DecoderStats, SbusReceiver};
use crate::serial::SerialSource;
use crate::store::CalibrationStore;
use crate::telemetry::slot::LatestSender;
use crate::telemetry::TelemetrySample;

/// Number of ticks between status log messages (~5 s at 100 Hz)
pub const LOG_INTERVAL_TICKS: u64 = 500;

/// Commands emitted in one tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActuatorCommands {
    pub steering: SteeringDemand,
    pub throttle: f32,
    pub camera_pan: f32,
}

impl ActuatorCommands {
    /// Everything centered and stopped
    pub const NEUTRAL: Self = Self {
        steering: SteeringDemand::Command(0.0),
        throttle: 0.0,
        camera_pan: 0.0,
    };
}

/// The rover's main loop
pub struct ControlLoop<Src, C, St>
where
    Src: SerialSource,
    C: Clock,
    St: CalibrationStore,
{
    receiver: SbusReceiver,
    source: Src,
    clock: C,
    watchdog: Watchdog,
    mapper: ChannelMapper,
    calibration: CalibrationStateMachine<St>,
    drivetrain: Drivetrain,
    channels: ChannelConfig,
    period: Duration,
    honor_failsafe_flag: bool,
    telemetry: Option<LatestSender<TelemetrySample>>,
    tick_count: u64,
    read_errors: u64,
    read_error_streak: u64,
}

impl<Src, C, St> ControlLoop<Src, C, St>
where
    Src: SerialSource,
    C: Clock,
    St: CalibrationStore,
{
    /// Wire up a control loop.
    ///
    /// # Arguments
    ///
    /// * `config` - Validated configuration
    /// * `source` - Receiver byte stream
    /// * `clock` - Monotonic time for the watchdog
    /// * `store` - Where calibration commits are persisted
    /// * `record` - Steering calibration in force at startup
    /// * `drivetrain` - Output actuators, already parked at neutral
    pub fn new(
        config: &Config,
        source: Src,
        clock: C,
        store: St,
        record: CalibrationRecord,
        drivetrain: Drivetrain,
    ) -> Self {
        let calibration = CalibrationStateMachine::new(
            store,
            record,
            TrimMapping::from_config(&config.mapping, &config.calibration),
            config.calibration.switch_threshold,
            config.calibration.half_range_us,
        );

        Self {
            receiver: SbusReceiver::new(Duration::from_millis(config.serial.timeout_ms)),
            source,
            clock,
            watchdog: Watchdog::new(Duration::from_millis(config.safety.failsafe_timeout_ms)),
            mapper: ChannelMapper::from_config(&config.mapping),
            calibration,
            drivetrain,
            channels: config.channels.clone(),
            period: Duration::from_millis(config.control.loop_period_ms),
            honor_failsafe_flag: config.safety.honor_failsafe_flag,
            telemetry: None,
            tick_count: 0,
            read_errors: 0,
            read_error_streak: 0,
        }
    }

    /// Publish a [`TelemetrySample`] every tick through `sender`.
    pub fn with_telemetry(mut self, sender: LatestSender<TelemetrySample>) -> Self {
        self.telemetry = Some(sender);
        self
    }

    /// Run one iteration and return what was sent to the actuators.
    pub async fn tick(&mut self) -> ActuatorCommands {
        let frame = match self.receiver.poll(&mut self.source).await {
            Ok(frame) => {
                if self.read_error_streak > 0 {
                    info!("Serial reads recovered after {} failures", self.read_error_streak);
                    self.read_error_streak = 0;
                }
                frame
            }
            Err(e) => {
                self.read_errors += 1;
                self.read_error_streak += 1;
                // Only the first failure of a streak is a warning
                if self.read_error_streak == 1 {
                    warn!("Serial read failed: {}", e);
                } else {
                    debug!("Serial read failed ({} in a row): {}", self.read_error_streak, e);
                }
                None
            }
        };

        let now = self.clock.now();
        if let Some(frame) = frame {
            if self.honor_failsafe_flag && frame.flags.failsafe {
                debug!("Receiver failsafe flag set, link not refreshed");
            } else {
                self.watchdog.feed(now);
            }
        }

        let connected = self.watchdog.evaluate(now);
        let commands = if connected {
            self.connected_commands()
        } else {
            ActuatorCommands::NEUTRAL
        };

        self.emit(&commands);
        self.publish(connected, &commands);

        self.tick_count += 1;
        if self.tick_count % LOG_INTERVAL_TICKS == 0 {
            let stats = self.receiver.stats();
            info!(
                "Tick {}: link {}, mode {:?}, {} frames ({} rejected, {} bytes discarded, {} read errors)",
                self.tick_count,
                if connected { "up" } else { "down" },
                self.calibration.mode(),
                stats.frames_decoded,
                stats.frames_rejected,
                stats.bytes_discarded,
                self.read_errors
            );
        }

        commands
    }

    /// Tick every period until `stop` reads `true` (or its sender is
    /// dropped), then run [`ControlLoop::shutdown`].
    ///
    /// # Errors
    ///
    /// Only shutdown errors are returned; per-tick failures are logged.
    pub async fn run(&mut self, mut stop: watch::Receiver<bool>) -> Result<()> {
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!("Control loop running every {}ms", self.period.as_millis());

        loop {
            if *stop.borrow() {
                break;
            }

            tokio::select! {
                _ = ticker.tick() => {
                    self.tick().await;
                }
                changed = stop.changed() => {
                    if changed.is_err() {
                        info!("Stop signal source dropped");
                        break;
                    }
                }
            }
        }

        info!("Control loop stopping after {} ticks", self.tick_count);
        self.shutdown()
    }

    /// Neutral every actuator, then release them all.
    ///
    /// # Errors
    ///
    /// Returns the neutral failure, if any, after release has still been
    /// attempted on every actuator. Release failures are only logged.
    pub fn shutdown(&mut self) -> Result<()> {
        info!("Commanding all actuators to neutral");
        let neutral = self.drivetrain.neutral();
        if let Err(e) = &neutral {
            error!("Failed to reach neutral during shutdown: {}", e);
        }

        if let Err(e) = self.drivetrain.release() {
            warn!("Failed to release actuators: {}", e);
        }

        neutral
    }

    pub fn mode(&self) -> ControlMode {
        self.calibration.mode()
    }

    /// Link status as of the last tick
    pub fn is_connected(&self) -> bool {
        self.watchdog.is_connected()
    }

    pub fn calibration_record(&self) -> CalibrationRecord {
        self.calibration.record()
    }

    pub fn decoder_stats(&self) -> DecoderStats {
        self.receiver.stats()
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    fn connected_commands(&mut self) -> ActuatorCommands {
        let channels = *self.receiver.channels();

        let throttle = self.mapper.map(channels.get(self.channels.throttle));
        let camera_pan = self.mapper.map(channels.get(self.channels.camera_pan));
        let steering = self.mapper.map(channels.get(self.channels.steering));

        let update = self.calibration.update(
            channels.get(self.channels.calibration_switch),
            channels.get(self.channels.calibration_knob),
            steering,
        );

        if let Some(record) = update.committed {
            if let Err(e) = self.drivetrain.apply_calibration(&record) {
                warn!("Failed to apply steering calibration: {}", e);
            }
        }

        ActuatorCommands {
            steering: update.steering,
            throttle,
            camera_pan,
        }
    }

    fn emit(&mut self, commands: &ActuatorCommands) {
        if let Err(e) = self.drivetrain.steer(commands.steering) {
            warn!("Steering command failed: {}", e);
        }
        if let Err(e) = self.drivetrain.drive(commands.throttle) {
            warn!("Throttle command failed: {}", e);
        }
        if let Err(e) = self.drivetrain.pan(commands.camera_pan) {
            warn!("Camera pan command failed: {}", e);
        }
    }

    fn publish(&self, connected: bool, commands: &ActuatorCommands) {
        if let Some(sender) = &self.telemetry {
            sender.publish(TelemetrySample {
                timestamp: Utc::now(),
                tick: self.tick_count,
                connected,
                mode: self.calibration.mode(),
                steering: commands.steering,
                throttle: commands.throttle,
                camera_pan: commands.camera_pan,
                channels: *self.receiver.channels().values(),
                frames_decoded: self.receiver.stats().frames_decoded,
            });
        }
    }
}
