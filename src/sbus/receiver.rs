//! # SBUS Receiver
//!
//! Byte-synchronizing frame extraction on top of a [`SerialSource`].
//!
//! Bytes are scanned one at a time for the 0x0F header. A candidate is only
//! accepted when the byte 24 positions later is the 0x00 terminator; otherwise
//! the header byte is dropped and scanning resumes at the very next byte, so a
//! misaligned stream recovers as soon as one clean frame is buffered.
//!
//! Each [`SbusReceiver::poll`] drains everything the port reported as
//! available and never waits for alignment. After a stall only the trailing
//! [`MAX_BACKLOG_BYTES`] are decoded, so the newest frame is what gets applied.

use bytes::{Buf, BytesMut};
use std::time::Duration;
use tracing::{debug, trace};

use super::decoder::decode_frame;
use super::protocol::*;
use crate::error::Result;
use crate::serial::SerialSource;

/// Bytes kept for decoding after a poll (~10 frames); older backlog is dropped
pub const MAX_BACKLOG_BYTES: usize = 256;

/// Decoder counters, mainly for periodic status logging
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecoderStats {
    /// Frames that passed validation
    pub frames_decoded: u64,

    /// Header candidates whose terminator did not match
    pub frames_rejected: u64,

    /// Bytes dropped while searching for a frame boundary
    pub bytes_discarded: u64,
}

/// Stateful SBUS frame extractor
#[derive(Debug)]
pub struct SbusReceiver {
    buffer: BytesMut,
    channels: ChannelSet,
    stats: DecoderStats,
    read_timeout: Duration,
}

impl SbusReceiver {
    /// Creates a receiver whose port reads give up after `read_timeout`.
    pub fn new(read_timeout: Duration) -> Self {
        Self {
            buffer: BytesMut::with_capacity(MAX_BACKLOG_BYTES + SBUS_FRAME_LEN),
            channels: ChannelSet::default(),
            stats: DecoderStats::default(),
            read_timeout,
        }
    }

    /// Pull the currently available bytes from `source` and decode them.
    ///
    /// # Returns
    ///
    /// The newest valid frame found in this poll, if any. Older frames from
    /// the same poll have already been applied and are superseded.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the port cannot be queried or read. Buffered
    /// bytes and the last channel values are kept.
    pub async fn poll<S>(&mut self, source: &mut S) -> Result<Option<SbusFrame>>
    where
        S: SerialSource + ?Sized,
    {
        let available = source.bytes_available()?;
        if available > 0 {
            let bytes = source.read(available, self.read_timeout).await?;
            trace!("Read {} of {} available bytes", bytes.len(), available);
            self.buffer.extend_from_slice(&bytes);
            self.trim_backlog();
        }

        Ok(self.drain_frames())
    }

    /// Append raw bytes and decode whatever complete frames they yield.
    pub fn feed(&mut self, bytes: &[u8]) -> Option<SbusFrame> {
        self.buffer.extend_from_slice(bytes);
        self.drain_frames()
    }

    /// Last decoded channel values (protocol mid before the first frame)
    pub fn channels(&self) -> &ChannelSet {
        &self.channels
    }

    pub fn stats(&self) -> DecoderStats {
        self.stats
    }

    /// Bytes held back waiting for the rest of a frame
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Drop all but the trailing [`MAX_BACKLOG_BYTES`] of the buffer.
    fn trim_backlog(&mut self) {
        let excess = self.buffer.len().saturating_sub(MAX_BACKLOG_BYTES);
        if excess > 0 {
            debug!("Skipping {} stale bytes of receiver backlog", excess);
            self.buffer.advance(excess);
            self.stats.bytes_discarded += excess as u64;
        }
    }

    fn drain_frames(&mut self) -> Option<SbusFrame> {
        let mut latest = None;

        while self.buffer.len() >= SBUS_FRAME_LEN {
            if self.buffer[0] != SBUS_HEADER {
                self.buffer.advance(1);
                self.stats.bytes_discarded += 1;
                continue;
            }

            if self.buffer[SBUS_FRAME_LEN - 1] != SBUS_FOOTER {
                debug!(
                    "Dropping frame candidate with terminator 0x{:02X}",
                    self.buffer[SBUS_FRAME_LEN - 1]
                );
                self.buffer.advance(1);
                self.stats.bytes_discarded += 1;
                self.stats.frames_rejected += 1;
                continue;
            }

            let raw = self.buffer.split_to(SBUS_FRAME_LEN);
            match decode_frame(&raw) {
                Ok(frame) => {
                    self.channels = frame.channels;
                    self.stats.frames_decoded += 1;
                    latest = Some(frame);
                }
                Err(e) => {
                    debug!("Dropping malformed frame: {}", e);
                    self.stats.frames_rejected += 1;
                }
            }
        }

        latest
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RoverError;
    use crate::sbus::encoder::encode_frame;
    use crate::serial::port_trait::mocks::MockSerialSource;
    use std::io;

    fn frame_with(value: u16) -> RawFrame {
        encode_frame(&[value; SBUS_NUM_CHANNELS], FrameFlags::default())
    }

    fn receiver() -> SbusReceiver {
        SbusReceiver::new(Duration::from_millis(20))
    }

    #[test]
    fn test_single_clean_frame() {
        let mut rx = receiver();
        let frame = rx.feed(&frame_with(992)).expect("frame should decode");

        assert_eq!(frame.channels.get(0), 992);
        assert_eq!(rx.channels().get(15), 992);
        assert_eq!(rx.stats().frames_decoded, 1);
        assert_eq!(rx.buffered(), 0);
    }

    #[test]
    fn test_no_frame_before_first_decode_keeps_mid() {
        let rx = receiver();
        assert_eq!(rx.channels(), &ChannelSet::default());
    }

    #[test]
    fn test_resync_after_garbage_prefix() {
        let mut rx = receiver();
        let mut stream = vec![0x0F, 0x00, 0xFF, 0x0F, 0x12];
        stream.extend_from_slice(&frame_with(992));

        let frame = rx.feed(&stream).expect("frame after garbage should decode");
        assert_eq!(frame.channels.get(3), 992);
        assert_eq!(rx.stats().bytes_discarded, 5);
    }

    #[test]
    fn test_corrupted_header_is_dropped_then_resyncs() {
        let mut rx = receiver();
        let mut corrupt = frame_with(1500);
        corrupt[0] = 0x1F;

        assert!(rx.feed(&corrupt).is_none());
        assert_eq!(rx.channels(), &ChannelSet::default());

        let frame = rx.feed(&frame_with(992)).expect("clean frame should resync");
        assert_eq!(frame.channels.get(1), 992);
        assert_eq!(rx.stats().frames_decoded, 1);
    }

    #[test]
    fn test_corrupted_terminator_is_dropped_then_resyncs() {
        let mut rx = receiver();
        let mut corrupt = frame_with(1500);
        corrupt[24] = 0x04;

        assert!(rx.feed(&corrupt).is_none());
        assert_eq!(rx.channels(), &ChannelSet::default());
        assert_eq!(rx.stats().frames_rejected, 1);

        let frame = rx.feed(&frame_with(992)).expect("clean frame should resync");
        assert_eq!(frame.channels.get(1), 992);
    }

    #[test]
    fn test_corruption_does_not_touch_previous_values() {
        let mut rx = receiver();
        rx.feed(&frame_with(300));

        let mut corrupt = frame_with(1700);
        corrupt[24] = 0xAA;
        assert!(rx.feed(&corrupt).is_none());

        // Last-known values survive a bad frame
        assert_eq!(rx.channels().get(0), 300);
    }

    #[test]
    fn test_partial_frame_waits_for_rest() {
        let mut rx = receiver();
        let frame = frame_with(1200);

        assert!(rx.feed(&frame[..10]).is_none());
        assert_eq!(rx.buffered(), 10);

        let decoded = rx.feed(&frame[10..]).expect("completed frame should decode");
        assert_eq!(decoded.channels.get(7), 1200);
    }

    #[test]
    fn test_latest_frame_wins() {
        let mut rx = receiver();
        let mut stream = Vec::new();
        stream.extend_from_slice(&frame_with(400));
        stream.extend_from_slice(&frame_with(1500));

        let frame = rx.feed(&stream).unwrap();
        assert_eq!(frame.channels.get(0), 1500);
        assert_eq!(rx.stats().frames_decoded, 2);
    }

    #[tokio::test]
    async fn test_poll_reads_from_source() {
        let mut rx = receiver();
        let mut source = MockSerialSource::new();
        source.push(&frame_with(1100));

        let frame = rx.poll(&mut source).await.unwrap();
        assert_eq!(frame.unwrap().channels.get(5), 1100);
        assert_eq!(source.pending(), 0);
    }

    #[tokio::test]
    async fn test_poll_with_nothing_available_does_not_read() {
        let mut rx = receiver();
        let mut source = MockSerialSource::new();

        assert!(rx.poll(&mut source).await.unwrap().is_none());
        assert_eq!(source.read_calls(), 0);
    }

    #[tokio::test]
    async fn test_poll_drains_garbage_backlog() {
        let mut rx = receiver();
        let mut source = MockSerialSource::new();
        source.push(&[0xAB; 1000]);

        assert!(rx.poll(&mut source).await.unwrap().is_none());
        assert_eq!(source.pending(), 0);
        assert!(rx.buffered() < SBUS_FRAME_LEN);
        assert_eq!(rx.stats().bytes_discarded, 1000 - rx.buffered() as u64);
    }

    #[tokio::test]
    async fn test_poll_after_stall_applies_newest_frame() {
        let mut rx = receiver();
        let mut source = MockSerialSource::new();
        for _ in 0..19 {
            source.push(&frame_with(300));
        }
        source.push(&frame_with(1700));

        let frame = rx.poll(&mut source).await.unwrap().expect("newest frame should decode");

        assert_eq!(frame.channels.get(0), 1700);
        assert_eq!(rx.channels().get(0), 1700);
        assert_eq!(source.pending(), 0);
        assert_eq!(source.read_calls(), 1);
        // 244 bytes of backlog skipped, then 6 bytes of a cut frame scanned past
        assert_eq!(rx.stats().bytes_discarded, 250);
        assert_eq!(rx.stats().frames_decoded, 10);
    }

    #[tokio::test]
    async fn test_poll_read_error_keeps_state() {
        let mut rx = receiver();
        rx.feed(&frame_with(700));

        let mut source = MockSerialSource::new();
        source.push(&frame_with(1500));
        source.set_read_error(Some(io::ErrorKind::BrokenPipe));

        match rx.poll(&mut source).await {
            Err(RoverError::Io(e)) => assert_eq!(e.kind(), io::ErrorKind::BrokenPipe),
            other => panic!("Expected Io error, got: {:?}", other),
        }
        assert_eq!(rx.channels().get(0), 700);
    }
}
