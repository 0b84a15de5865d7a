//! Awaitable jitter buffer
//!
//! Wraps a [`ReorderingBuffer`] for the case where producer and consumer run on
//! different tasks. The consumer awaits [`WaitedBuffer::wait`], which sleeps
//! until the head packet is due or a new packet arrives.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::debug;

use sfu_rtp_core::RtpPacket;

use super::{PacketBuffer, ReorderingBuffer};
use crate::clock::MediaClock;

#[derive(Debug)]
struct Inner {
    buffer: ReorderingBuffer,
    cancelled: bool,
}

/// Jitter buffer shared between a producer and an awaiting consumer
#[derive(Debug)]
pub struct WaitedBuffer {
    inner: Mutex<Inner>,
    notify: Notify,
    clock: MediaClock,
}

impl WaitedBuffer {
    /// Create an empty buffer reading time from `clock`
    pub fn new(max_wait_time: u64, clock: MediaClock) -> Self {
        Self {
            inner: Mutex::new(Inner {
                buffer: ReorderingBuffer::new(max_wait_time),
                cancelled: false,
            }),
            notify: Notify::new(),
            clock,
        }
    }

    /// Queue a packet and wake the consumer
    pub fn add(&self, packet: Arc<RtpPacket>) -> bool {
        let added = self.inner.lock().buffer.add(packet);
        if added {
            self.notify.notify_one();
        }
        added
    }

    /// Wait for the next packet in order
    ///
    /// Returns `None` once the buffer is cancelled.
    pub async fn wait(&self) -> Option<Arc<RtpPacket>> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Registered before checking, so an add between check and await is not lost
            notified.as_mut().enable();

            let wait = {
                let mut inner = self.inner.lock();
                if inner.cancelled {
                    return None;
                }

                let now = self.clock.now_ms();
                if let Some(packet) = inner.buffer.get_ordered(now) {
                    return Some(packet);
                }
                inner.buffer.get_wait_time(now)
            };

            match wait {
                Some(ms) => {
                    tokio::select! {
                        _ = notified => {}
                        _ = tokio::time::sleep(Duration::from_millis(ms)) => {}
                    }
                }
                None => notified.await,
            }
        }
    }

    /// Release the head packet on the next wait
    pub fn hurry_up(&self) {
        self.inner.lock().buffer.hurry_up();
        self.notify.notify_one();
    }

    /// Set the maximum wait time in ms
    pub fn set_max_wait_time(&self, max_wait_time: u64) {
        self.inner.lock().buffer.set_max_wait_time(max_wait_time);
        self.notify.notify_one();
    }

    /// Clear all state
    pub fn reset(&self) {
        self.inner.lock().buffer.reset();
    }

    /// Wake the consumer and make every further wait return `None`
    pub fn cancel(&self) {
        debug!("Cancelling waited buffer");
        self.inner.lock().cancelled = true;
        self.notify.notify_waiters();
        self.notify.notify_one();
    }

    /// Number of queued packets
    pub fn len(&self) -> usize {
        self.inner.lock().buffer.len()
    }

    /// Whether nothing is queued
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Padding packets consumed so far
    pub fn discarded(&self) -> u64 {
        self.inner.lock().buffer.discarded()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet(ext_seq: u64, time: u64) -> Arc<RtpPacket> {
        let mut packet = RtpPacket::new(1, 0, 0, time).with_payload(vec![0xAB; 4]);
        packet.set_ext_seq_num(ext_seq);
        Arc::new(packet)
    }

    #[test]
    fn test_wait_pending_until_add() {
        let buffer = WaitedBuffer::new(50, MediaClock::new());
        let mut wait = tokio_test::task::spawn(buffer.wait());
        tokio_test::assert_pending!(wait.poll());

        buffer.add(packet(1, 0));
        assert!(wait.is_woken());
        let released = tokio_test::assert_ready!(wait.poll());
        assert_eq!(released.unwrap().ext_seq_num(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_returns_in_order() {
        let buffer = Arc::new(WaitedBuffer::new(50, MediaClock::new()));
        buffer.add(packet(1, 0));
        assert_eq!(buffer.wait().await.unwrap().ext_seq_num(), 1);

        let producer = buffer.clone();
        tokio::spawn(async move {
            producer.add(packet(3, 0));
            tokio::time::sleep(Duration::from_millis(10)).await;
            producer.add(packet(2, 10));
        });

        assert_eq!(buffer.wait().await.unwrap().ext_seq_num(), 2);
        assert_eq!(buffer.wait().await.unwrap().ext_seq_num(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_skips_gap_after_max_wait() {
        let clock = MediaClock::new();
        let buffer = WaitedBuffer::new(50, clock);
        buffer.add(packet(1, 0));
        buffer.wait().await;

        buffer.add(packet(3, 0));
        let released = buffer.wait().await.unwrap();
        assert_eq!(released.ext_seq_num(), 3);
        assert_eq!(clock.now_ms(), 50);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_wakes_waiter() {
        let buffer = Arc::new(WaitedBuffer::new(50, MediaClock::new()));
        let waiter = {
            let buffer = buffer.clone();
            tokio::spawn(async move { buffer.wait().await })
        };

        tokio::task::yield_now().await;
        buffer.cancel();
        assert!(waiter.await.unwrap().is_none());
        assert!(buffer.wait().await.is_none());
    }
}
