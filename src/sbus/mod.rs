//! # SBUS Protocol Module
//!
//! Implementation of the SBUS serial RC protocol as emitted by the receiver.
//!
//! This module handles:
//! - Frame layout constants and channel/flag types
//! - 11-bit channel unpacking (and packing for simulation)
//! - Byte-stream synchronization and frame validation

pub mod protocol;
pub mod encoder;
pub mod decoder;
pub mod receiver;
