//! The heartbeat keep-alive driver.
//!
//! Runs as its own task so a dead socket is noticed even while the receive
//! loop is blocked on a read. Every `interval` it pushes the codec's
//! keep-alive frame into the connection's outbound channel; the connection
//! loop owns the socket and performs the actual send. If the channel is
//! gone the connection has already torn down, so the driver just exits.
//!
//! Latency is the wall time between a heartbeat send and the matching ack,
//! reported as `f64::INFINITY` until the first ack arrives.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::frame::OutboundFrame;

/// Latency considered "can't keep up" territory, seconds.
const BEHIND_THRESHOLD: f64 = 10.0;

/// Shared send/ack bookkeeping between the driver and the receive loop.
#[derive(Debug)]
pub struct HeartbeatState {
    last_send: Mutex<Option<Instant>>,
    latency: Mutex<f64>,
}

impl Default for HeartbeatState {
    fn default() -> Self {
        Self {
            last_send: Mutex::new(None),
            latency: Mutex::new(f64::INFINITY),
        }
    }
}

impl HeartbeatState {
    /// Creates fresh state with infinite latency.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that a heartbeat was just handed to the socket.
    pub fn record_send(&self) {
        *self.last_send.lock() = Some(Instant::now());
    }

    /// Records the matching ack and updates the measured latency.
    pub fn record_ack(&self) {
        let Some(sent) = *self.last_send.lock() else {
            return;
        };
        let elapsed = sent.elapsed().as_secs_f64();
        *self.latency.lock() = elapsed;
        if elapsed > BEHIND_THRESHOLD {
            warn!(latency_secs = elapsed, "Can't keep up, websocket is behind");
        }
    }

    /// The last measured round-trip time in seconds, `INFINITY` before the
    /// first ack.
    pub fn latency(&self) -> f64 {
        *self.latency.lock()
    }

    /// Clears measurements; called on every successful reconnect.
    pub fn reset(&self) {
        *self.last_send.lock() = None;
        *self.latency.lock() = f64::INFINITY;
    }
}

/// A running heartbeat task.
pub struct Heartbeat {
    cancel: CancellationToken,
}

impl Heartbeat {
    /// Spawns the driver.
    ///
    /// `frame` is the protocol-appropriate keep-alive produced by the
    /// connection's codec.
    pub fn spawn(
        interval: Duration,
        frame: OutboundFrame,
        outbound: mpsc::Sender<OutboundFrame>,
        state: Arc<HeartbeatState>,
    ) -> Self {
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();

        tokio::spawn(async move {
            debug!(interval_secs = interval.as_secs_f64(), "Heartbeat started");
            loop {
                tokio::select! {
                    _ = task_cancel.cancelled() => {
                        debug!("Heartbeat stopped");
                        break;
                    }
                    _ = tokio::time::sleep(interval) => {
                        trace!("Sending heartbeat");
                        state.record_send();
                        if outbound.send(frame.clone()).await.is_err() {
                            // Receiver gone: the connection loop already
                            // tore down and will reconnect on its own.
                            warn!("Heartbeat could not reach the connection, exiting");
                            break;
                        }
                    }
                }
            }
        });

        Self { cancel }
    }

    /// Stops the driver immediately, cancelling any pending sleep.
    pub fn stop(&self) {
        self.cancel.cancel();
    }
}

impl Drop for Heartbeat {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_sends_on_interval() {
        let (tx, mut rx) = mpsc::channel(8);
        let state = Arc::new(HeartbeatState::new());
        let heartbeat = Heartbeat::spawn(
            Duration::from_secs(25),
            OutboundFrame::Ping,
            tx,
            Arc::clone(&state),
        );

        tokio::time::advance(Duration::from_secs(26)).await;
        assert_eq!(rx.recv().await, Some(OutboundFrame::Ping));

        tokio::time::advance(Duration::from_secs(25)).await;
        assert_eq!(rx.recv().await, Some(OutboundFrame::Ping));

        heartbeat.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_pending_sleep() {
        let (tx, mut rx) = mpsc::channel(8);
        let state = Arc::new(HeartbeatState::new());
        let heartbeat = Heartbeat::spawn(
            Duration::from_secs(25),
            OutboundFrame::Ping,
            tx,
            Arc::clone(&state),
        );

        heartbeat.stop();
        tokio::time::advance(Duration::from_secs(60)).await;
        // Channel closes without ever delivering a frame.
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_latency_infinite_until_first_ack() {
        let state = HeartbeatState::new();
        assert!(state.latency().is_infinite());

        state.record_send();
        tokio::time::advance(Duration::from_millis(120)).await;
        state.record_ack();

        let latency = state.latency();
        assert!(latency.is_finite());
        assert!(latency >= 0.0);

        state.reset();
        assert!(state.latency().is_infinite());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ack_without_send_is_ignored() {
        let state = HeartbeatState::new();
        state.record_ack();
        assert!(state.latency().is_infinite());
    }
}
