//! # SBUS Rover Library
//!
//! Drive an RC ground vehicle from an SBUS receiver.
//!
//! This library provides the core functionality for decoding the receiver's
//! SBUS stream, mapping channels to steering, throttle and camera pan,
//! calibrating the steering trim live from the transmitter, and forcing every
//! actuator to neutral when the radio link is lost.

pub mod actuator;
pub mod clock;
pub mod config;
pub mod control;
pub mod error;
pub mod sbus;
pub mod serial;
pub mod store;
pub mod telemetry;
