//! # SBUS Frame Decoder
//!
//! Validates 25-byte SBUS frames and unpacks their 16 11-bit channels.

use super::protocol::*;
use crate::error::{Result, RoverError};

/// Decode a complete SBUS frame
///
/// # Arguments
///
/// * `frame` - Frame bytes (header, 22 data bytes, flags, terminator)
///
/// # Returns
///
/// * `Result<SbusFrame>` - Decoded frame, or error if invalid
///
/// # Errors
///
/// Returns error if:
/// - Frame is not exactly 25 bytes
/// - Header byte is not 0x0F
/// - Terminator byte is not 0x00
pub fn decode_frame(frame: &[u8]) -> Result<SbusFrame> {
    if frame.len() != SBUS_FRAME_LEN {
        return Err(RoverError::Sbus(format!(
            "Invalid frame length: expected {} bytes, got {}",
            SBUS_FRAME_LEN,
            frame.len()
        )));
    }

    if frame[0] != SBUS_HEADER {
        return Err(RoverError::Sbus(format!(
            "Invalid header byte: 0x{:02X}",
            frame[0]
        )));
    }

    let footer = frame[SBUS_FRAME_LEN - 1];
    if footer != SBUS_FOOTER {
        return Err(RoverError::Sbus(format!(
            "Invalid terminator byte: 0x{:02X}",
            footer
        )));
    }

    let mut data = [0u8; SBUS_DATA_LEN];
    data.copy_from_slice(&frame[1..=SBUS_DATA_LEN]);

    Ok(SbusFrame {
        channels: ChannelSet::new(unpack_channels(&data)),
        flags: FrameFlags::from_byte(frame[SBUS_FRAME_LEN - 2]),
    })
}

/// Unpack 16 channels from the 22-byte data block
///
/// Channel `i` starts at bit `i * 11`, LSB first, and spans two or three
/// consecutive bytes.
pub fn unpack_channels(data: &[u8; SBUS_DATA_LEN]) -> [u16; SBUS_NUM_CHANNELS] {
    let mut channels = [0u16; SBUS_NUM_CHANNELS];

    for (i, channel) in channels.iter_mut().enumerate() {
        let bit = i * SBUS_CHANNEL_BITS;
        let byte = bit / 8;
        let shift = bit % 8;

        let mut word = u32::from(data[byte]) | u32::from(data[byte + 1]) << 8;
        if byte + 2 < SBUS_DATA_LEN {
            word |= u32::from(data[byte + 2]) << 16;
        }

        *channel = ((word >> shift) as u16) & SBUS_CHANNEL_VALUE_MAX;
    }

    channels
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sbus::encoder::{encode_frame, pack_channels};

    /// Byte-wise unpacking as receivers document it, used as an independent reference.
    fn reference_unpack(d: &[u8; SBUS_DATA_LEN]) -> [u16; SBUS_NUM_CHANNELS] {
        let d: [u16; SBUS_DATA_LEN] = d.map(u16::from);
        [
            (d[0] | d[1] << 8) & 0x07FF,
            (d[1] >> 3 | d[2] << 5) & 0x07FF,
            (d[2] >> 6 | d[3] << 2 | d[4] << 10) & 0x07FF,
            (d[4] >> 1 | d[5] << 7) & 0x07FF,
            (d[5] >> 4 | d[6] << 4) & 0x07FF,
            (d[6] >> 7 | d[7] << 1 | d[8] << 9) & 0x07FF,
            (d[8] >> 2 | d[9] << 6) & 0x07FF,
            (d[9] >> 5 | d[10] << 3) & 0x07FF,
            (d[11] | d[12] << 8) & 0x07FF,
            (d[12] >> 3 | d[13] << 5) & 0x07FF,
            (d[13] >> 6 | d[14] << 2 | d[15] << 10) & 0x07FF,
            (d[15] >> 1 | d[16] << 7) & 0x07FF,
            (d[16] >> 4 | d[17] << 4) & 0x07FF,
            (d[17] >> 7 | d[18] << 1 | d[19] << 9) & 0x07FF,
            (d[19] >> 2 | d[20] << 6) & 0x07FF,
            (d[20] >> 5 | d[21] << 3) & 0x07FF,
        ]
    }

    #[test]
    fn test_decode_frame_wrong_length() {
        assert!(decode_frame(&[SBUS_HEADER; 24]).is_err());
        assert!(decode_frame(&[SBUS_HEADER; 26]).is_err());
        assert!(decode_frame(&[]).is_err());
    }

    #[test]
    fn test_decode_frame_invalid_header() {
        let mut frame = encode_frame(&[992; SBUS_NUM_CHANNELS], FrameFlags::default());
        frame[0] = 0x0E;
        match decode_frame(&frame) {
            Err(RoverError::Sbus(msg)) => assert!(msg.contains("0x0E")),
            other => panic!("Expected Sbus error, got: {:?}", other),
        }
    }

    #[test]
    fn test_decode_frame_invalid_terminator() {
        let mut frame = encode_frame(&[992; SBUS_NUM_CHANNELS], FrameFlags::default());
        frame[24] = 0x04;
        assert!(decode_frame(&frame).is_err());
    }

    #[test]
    fn test_decode_center_scenario() {
        let mut channels = [0u16; SBUS_NUM_CHANNELS];
        channels[1] = 992;
        channels[3] = 992;
        let frame = encode_frame(&channels, FrameFlags::default());

        let decoded = decode_frame(&frame).unwrap();
        assert_eq!(decoded.channels.get(1), 992);
        assert_eq!(decoded.channels.get(3), 992);
        assert_eq!(decoded.channels.get(0), 0);
        assert_eq!(decoded.flags, FrameFlags::default());
    }

    #[test]
    fn test_decode_flags() {
        let flags = FrameFlags {
            ch18: true,
            failsafe: true,
            ..FrameFlags::default()
        };
        let frame = encode_frame(&[1500; SBUS_NUM_CHANNELS], flags);
        assert_eq!(decode_frame(&frame).unwrap().flags, flags);
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        // Distinct values that exercise every bit position
        let channels: [u16; SBUS_NUM_CHANNELS] = [
            0, 2047, 992, 172, 1811, 1, 1024, 1023, 0x555, 0x2AA, 200, 1800, 1500, 1400, 7, 2040,
        ];
        let frame = encode_frame(&channels, FrameFlags::default());
        let decoded = decode_frame(&frame).unwrap();
        assert_eq!(decoded.channels.values(), &channels);
    }

    #[test]
    fn test_unpack_matches_reference_layout() {
        let data: [u8; SBUS_DATA_LEN] = core::array::from_fn(|i| (i as u8).wrapping_mul(37) ^ 0xA5);
        assert_eq!(unpack_channels(&data), reference_unpack(&data));
    }

    #[test]
    fn test_unpack_all_ones() {
        assert_eq!(unpack_channels(&[0xFF; SBUS_DATA_LEN]), [2047; SBUS_NUM_CHANNELS]);
    }

    #[test]
    fn test_unpack_last_channel() {
        let mut channels = [0u16; SBUS_NUM_CHANNELS];
        channels[15] = 0x7FF;
        let data = pack_channels(&channels);

        // Ch16 occupies bits 165..176: top 3 bits of byte 20 and all of byte 21
        assert_eq!(data[20], 0xE0);
        assert_eq!(data[21], 0xFF);
        assert_eq!(unpack_channels(&data)[15], 0x7FF);
    }
}
