//! # SBUS Frame Encoder
//!
//! Packs channel values into 25-byte SBUS frames. The rover only ever
//! receives SBUS, so this is used to synthesize receiver traffic for tests
//! and bench simulation.

use super::protocol::*;

/// Encode 16 channels and a flags byte into a complete SBUS frame
///
/// # Arguments
///
/// * `channels` - Array of 16 channel values (11-bit: 0-2047, larger values are clamped)
/// * `flags` - Flags byte contents
///
/// # Returns
///
/// * `RawFrame` - Complete 25-byte frame (header + 22-byte data + flags + terminator)
///
/// # Examples
///
/// ```
/// use sbus_rover::sbus::encoder::encode_frame;
/// use sbus_rover::sbus::protocol::FrameFlags;
///
/// let frame = encode_frame(&[992u16; 16], FrameFlags::default());
/// assert_eq!(frame[0], 0x0F);
/// assert_eq!(frame[24], 0x00);
/// ```
pub fn encode_frame(channels: &[u16; SBUS_NUM_CHANNELS], flags: FrameFlags) -> RawFrame {
    let mut frame = [0u8; SBUS_FRAME_LEN];
    frame[0] = SBUS_HEADER;
    frame[1..=SBUS_DATA_LEN].copy_from_slice(&pack_channels(channels));
    frame[SBUS_FRAME_LEN - 2] = flags.to_byte();
    frame[SBUS_FRAME_LEN - 1] = SBUS_FOOTER;
    frame
}

/// Pack 16 channels into the 22-byte data block
///
/// Channels are packed as a continuous bitstream, LSB first:
/// ```text
/// Byte 0: Ch1[0:7]
/// Byte 1: Ch1[8:10] | Ch2[0:4]
/// Byte 2: Ch2[5:10] | Ch3[0:1]
/// ...
/// ```
pub fn pack_channels(channels: &[u16; SBUS_NUM_CHANNELS]) -> [u8; SBUS_DATA_LEN] {
    let mut data = [0u8; SBUS_DATA_LEN];
    let mut bit_index = 0;

    for &channel in channels.iter() {
        let value = channel.min(SBUS_CHANNEL_VALUE_MAX);

        for bit in 0..SBUS_CHANNEL_BITS {
            if (value >> bit) & 1 == 1 {
                data[bit_index / 8] |= 1 << (bit_index % 8);
            }
            bit_index += 1;
        }
    }

    data
}
