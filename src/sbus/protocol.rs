//! # SBUS Protocol Constants and Types
//!
//! Core protocol definitions for SBUS receiver frames.
//!
//! ```text
//! +--------+---------------------------+-------+--------+
//! | 0x0F   | 22 bytes packed channels  | flags | 0x00   |
//! +--------+---------------------------+-------+--------+
//!   byte 0        bytes 1..=22          byte 23  byte 24
//! ```

/// SBUS frame header byte (always 0x0F)
pub const SBUS_HEADER: u8 = 0x0F;

/// SBUS frame terminator byte (always 0x00)
pub const SBUS_FOOTER: u8 = 0x00;

/// Complete frame length including header and terminator
pub const SBUS_FRAME_LEN: usize = 25;

/// Packed channel data length (16 channels × 11 bits = 176 bits)
pub const SBUS_DATA_LEN: usize = 22;

/// Number of proportional channels per frame
pub const SBUS_NUM_CHANNELS: usize = 16;

/// Bits per channel
pub const SBUS_CHANNEL_BITS: usize = 11;

/// Channel value range (11-bit: 0-2047)
pub const SBUS_CHANNEL_VALUE_MAX: u16 = 0x07FF;

/// Protocol mid value, reported for every channel until the first frame
pub const SBUS_CHANNEL_VALUE_MID: u16 = 1024;

/// SBUS line rate (inverted UART, 8E2)
pub const SBUS_BAUD_RATE: u32 = 100_000;

/// Flags byte: digital channel 17
pub const FLAG_CH17: u8 = 0x01;
/// Flags byte: digital channel 18
pub const FLAG_CH18: u8 = 0x02;
/// Flags byte: receiver reports a lost frame
pub const FLAG_FRAME_LOST: u8 = 0x04;
/// Flags byte: receiver is in failsafe
pub const FLAG_FAILSAFE: u8 = 0x08;

/// A raw 25-byte frame as it arrives on the wire
pub type RawFrame = [u8; SBUS_FRAME_LEN];

/// The 16 proportional channel values of the most recent frame.
///
/// Values are 11-bit (0-2047). A `ChannelSet` only changes as a whole, when a
/// complete frame has been validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelSet([u16; SBUS_NUM_CHANNELS]);

impl Default for ChannelSet {
    fn default() -> Self {
        Self([SBUS_CHANNEL_VALUE_MID; SBUS_NUM_CHANNELS])
    }
}

impl ChannelSet {
    /// Builds a channel set, masking every value to 11 bits.
    #[must_use]
    pub fn new(values: [u16; SBUS_NUM_CHANNELS]) -> Self {
        Self(values.map(|v| v & SBUS_CHANNEL_VALUE_MAX))
    }

    /// Returns the raw value of channel `index` (0-based).
    ///
    /// Out-of-range indices read as the protocol mid value.
    #[must_use]
    pub fn get(&self, index: usize) -> u16 {
        self.0.get(index).copied().unwrap_or(SBUS_CHANNEL_VALUE_MID)
    }

    /// Returns all channel values.
    #[must_use]
    pub fn values(&self) -> &[u16; SBUS_NUM_CHANNELS] {
        &self.0
    }
}

/// Decoded contents of the flags byte
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameFlags {
    /// Digital channel 17
    pub ch17: bool,

    /// Digital channel 18
    pub ch18: bool,

    /// Receiver missed a frame from the transmitter
    pub frame_lost: bool,

    /// Receiver has entered its own failsafe
    pub failsafe: bool,
}

impl FrameFlags {
    /// Decode a flags byte (upper nibble is ignored)
    #[must_use]
    pub fn from_byte(byte: u8) -> Self {
        Self {
            ch17: byte & FLAG_CH17 != 0,
            ch18: byte & FLAG_CH18 != 0,
            frame_lost: byte & FLAG_FRAME_LOST != 0,
            failsafe: byte & FLAG_FAILSAFE != 0,
        }
    }

    /// Encode back into a flags byte
    #[must_use]
    pub fn to_byte(self) -> u8 {
        let mut byte = 0;
        if self.ch17 {
            byte |= FLAG_CH17;
        }
        if self.ch18 {
            byte |= FLAG_CH18;
        }
        if self.frame_lost {
            byte |= FLAG_FRAME_LOST;
        }
        if self.failsafe {
            byte |= FLAG_FAILSAFE;
        }
        byte
    }
}

/// A validated SBUS frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SbusFrame {
    /// Proportional channels 1-16
    pub channels: ChannelSet,

    /// Flags byte contents
    pub flags: FrameFlags,
}
