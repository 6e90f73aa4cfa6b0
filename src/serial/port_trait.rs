//! Trait abstraction for the receiver byte stream to enable testing

use async_trait::async_trait;
use bytes::Bytes;
use std::io;
use std::time::Duration;

/// Trait for the serial byte source feeding the SBUS decoder
#[async_trait]
pub trait SerialSource: Send {
    /// Number of bytes that can be read without waiting
    fn bytes_available(&self) -> io::Result<usize>;

    /// Read up to `n` bytes, giving up after `timeout`.
    ///
    /// Returns fewer than `n` bytes when the timeout expires first.
    async fn read(&mut self, n: usize, timeout: Duration) -> io::Result<Bytes>;
}

#[cfg(test)]
pub mod mocks {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// Mock serial source for testing
    ///
    /// Clones share the same byte queue, so a test can keep a handle and feed
    /// bytes while the decoder owns another.
    #[derive(Clone, Default)]
    pub struct MockSerialSource {
        pub incoming: Arc<Mutex<VecDeque<u8>>>,
        pub read_error: Arc<Mutex<Option<io::ErrorKind>>>,
        pub read_calls: Arc<Mutex<usize>>,
    }

    impl MockSerialSource {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn push(&self, bytes: &[u8]) {
            self.incoming.lock().unwrap().extend(bytes.iter().copied());
        }

        pub fn pending(&self) -> usize {
            self.incoming.lock().unwrap().len()
        }

        pub fn set_read_error(&self, error: Option<io::ErrorKind>) {
            *self.read_error.lock().unwrap() = error;
        }

        pub fn read_calls(&self) -> usize {
            *self.read_calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl SerialSource for MockSerialSource {
        fn bytes_available(&self) -> io::Result<usize> {
            Ok(self.incoming.lock().unwrap().len())
        }

        async fn read(&mut self, n: usize, _timeout: Duration) -> io::Result<Bytes> {
            *self.read_calls.lock().unwrap() += 1;
            if let Some(error) = *self.read_error.lock().unwrap() {
                return Err(io::Error::new(error, "Mock read error"));
            }
            let mut incoming = self.incoming.lock().unwrap();
            let count = n.min(incoming.len());
            Ok(incoming.drain(..count).collect::<Vec<u8>>().into())
        }
    }
}
