//! Latest-value slot between the control loop and side consumers.
//!
//! The publisher overwrites a single value and bumps a generation counter; it
//! never blocks and never fails, even with no receiver attached. Receivers
//! either peek at the newest value or wait for the next one with a bounded
//! timeout. Intermediate values a slow receiver misses are simply skipped.

use std::time::Duration;
use tokio::sync::watch;

#[derive(Debug, Clone)]
struct Slot<T> {
    generation: u64,
    value: Option<T>,
}

/// Result of [`LatestReceiver::wait`]
#[derive(Debug, Clone, PartialEq)]
pub enum WaitOutcome<T> {
    /// A value newer than the last one seen, with its generation
    New(u64, T),
    /// Nothing new within the timeout
    Timeout,
    /// The publisher is gone
    Closed,
}

/// Create a connected publisher/receiver pair.
pub fn latest<T: Clone>() -> (LatestSender<T>, LatestReceiver<T>) {
    let (tx, rx) = watch::channel(Slot {
        generation: 0,
        value: None,
    });
    (LatestSender { tx }, LatestReceiver { rx })
}

/// Writing half, owned by the control loop
#[derive(Debug)]
pub struct LatestSender<T> {
    tx: watch::Sender<Slot<T>>,
}

impl<T: Clone> LatestSender<T> {
    /// Replace the current value. Returns the new generation.
    pub fn publish(&self, value: T) -> u64 {
        let mut generation = 0;
        self.tx.send_modify(|slot| {
            slot.generation += 1;
            slot.value = Some(value);
            generation = slot.generation;
        });
        generation
    }

    /// Another receiver observing the same slot
    pub fn subscribe(&self) -> LatestReceiver<T> {
        LatestReceiver {
            rx: self.tx.subscribe(),
        }
    }
}

/// Reading half
#[derive(Debug, Clone)]
pub struct LatestReceiver<T> {
    rx: watch::Receiver<Slot<T>>,
}

impl<T: Clone> LatestReceiver<T> {
    /// Newest value and its generation, without waiting
    pub fn latest(&self) -> Option<(u64, T)> {
        let slot = self.rx.borrow();
        slot.value.clone().map(|value| (slot.generation, value))
    }

    /// Wait up to `timeout` for a value newer than the last one returned.
    pub async fn wait(&mut self, timeout: Duration) -> WaitOutcome<T> {
        match tokio::time::timeout(timeout, self.rx.changed()).await {
            Err(_) => WaitOutcome::Timeout,
            Ok(Err(_)) => WaitOutcome::Closed,
            Ok(Ok(())) => {
                let slot = self.rx.borrow_and_update();
                match &slot.value {
                    Some(value) => WaitOutcome::New(slot.generation, value.clone()),
                    None => WaitOutcome::Timeout,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_pending, assert_ready_eq, task};

    #[test]
    fn test_empty_slot() {
        let (_tx, rx) = latest::<u32>();
        assert_eq!(rx.latest(), None);
    }

    #[test]
    fn test_publish_without_receivers() {
        let (tx, rx) = latest::<u32>();
        drop(rx);

        assert_eq!(tx.publish(1), 1);
        assert_eq!(tx.publish(2), 2);
        assert_eq!(tx.subscribe().latest(), Some((2, 2)));
    }

    #[test]
    fn test_latest_overwrites() {
        let (tx, rx) = latest();
        tx.publish("a");
        tx.publish("b");
        assert_eq!(rx.latest(), Some((2, "b")));
    }

    #[tokio::test]
    async fn test_wait_returns_newest_value() {
        let (tx, mut rx) = latest();
        tx.publish(10);
        tx.publish(20);

        assert_eq!(rx.wait(Duration::from_millis(50)).await, WaitOutcome::New(2, 20));
    }

    #[tokio::test]
    async fn test_wait_times_out_when_nothing_new() {
        let (tx, mut rx) = latest();
        tx.publish(1);
        assert_eq!(rx.wait(Duration::from_millis(50)).await, WaitOutcome::New(1, 1));

        assert_eq!(rx.wait(Duration::from_millis(10)).await, WaitOutcome::Timeout);
    }

    #[tokio::test]
    async fn test_wait_wakes_on_publish() {
        let (tx, mut rx) = latest();

        let publisher = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            tx.publish(7u32);
            tx
        });

        assert_eq!(rx.wait(Duration::from_secs(2)).await, WaitOutcome::New(1, 7));
        drop(publisher.await.unwrap());
    }

    #[tokio::test]
    async fn test_wait_pending_until_publish() {
        let (tx, mut rx) = latest();
        let mut wait = task::spawn(rx.wait(Duration::from_secs(5)));

        assert_pending!(wait.poll());
        assert_pending!(wait.poll());

        tx.publish(3u32);
        assert!(wait.is_woken());
        assert_ready_eq!(wait.poll(), WaitOutcome::New(1, 3));
    }

    #[tokio::test]
    async fn test_wait_wakes_on_close() {
        let (tx, mut rx) = latest::<u32>();
        let mut wait = task::spawn(rx.wait(Duration::from_secs(5)));
        assert_pending!(wait.poll());

        drop(tx);
        assert!(wait.is_woken());
        assert_ready_eq!(wait.poll(), WaitOutcome::Closed);
    }

    #[tokio::test]
    async fn test_wait_reports_closed() {
        let (tx, mut rx) = latest::<u32>();
        drop(tx);
        assert_eq!(rx.wait(Duration::from_millis(50)).await, WaitOutcome::Closed);
    }
}
