//! # Control Module
//!
//! Everything between a decoded channel set and the actuator commands.
//!
//! This module handles:
//! - Mapping raw channel values to normalized commands and trim targets
//! - The steering calibration state machine
//! - The link-loss failsafe watchdog
//! - The fixed-period control loop tying them together

pub mod calibration;
pub mod channel_mapper;
pub mod driver;
pub mod failsafe;
