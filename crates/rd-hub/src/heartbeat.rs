//! Connection liveness tracking.
//!
//! The transport pings the server after a period of silence and treats a
//! missing pong as a dead connection.

use parking_lot::Mutex;
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug)]
struct Timings {
    last_ping: Option<Instant>,
    last_message: Instant,
    waiting_for_pong: bool,
}

/// Ping/pong bookkeeping for one session.
#[derive(Debug)]
pub struct Heartbeat {
    interval: Duration,
    timeout: Duration,
    timings: Mutex<Timings>,
}

impl Heartbeat {
    pub fn new(interval_ms: u64, timeout_ms: u64) -> Self {
        Self {
            interval: Duration::from_millis(interval_ms),
            timeout: Duration::from_millis(timeout_ms),
            timings: Mutex::new(Timings {
                last_ping: None,
                last_message: Instant::now(),
                waiting_for_pong: false,
            }),
        }
    }

    /// Reset on every (re)connection.
    pub fn reset(&self) {
        *self.timings.lock() = Timings {
            last_ping: None,
            last_message: Instant::now(),
            waiting_for_pong: false,
        };
    }

    pub fn record_ping(&self) {
        let mut t = self.timings.lock();
        t.last_ping = Some(Instant::now());
        t.waiting_for_pong = true;
    }

    pub fn record_pong(&self) {
        let mut t = self.timings.lock();
        t.waiting_for_pong = false;
        t.last_message = Instant::now();
        if let Some(ping) = t.last_ping {
            debug!(rtt_ms = ping.elapsed().as_millis() as u64, "Received pong");
        }
    }

    /// Any inbound frame counts as proof of life.
    pub fn record_message(&self) {
        self.timings.lock().last_message = Instant::now();
    }

    pub fn is_timed_out(&self) -> bool {
        let t = self.timings.lock();
        match (t.waiting_for_pong, t.last_ping) {
            (true, Some(ping)) => ping.elapsed() > self.timeout,
            _ => false,
        }
    }

    /// A ping is due after `interval` of silence, unless one is outstanding.
    pub fn should_ping(&self) -> bool {
        let t = self.timings.lock();
        !t.waiting_for_pong && t.last_message.elapsed() >= self.interval
    }

    /// Sleep until the next liveness check.
    pub async fn tick(&self) {
        tokio::time::sleep(self.interval / 2).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let hb = Heartbeat::new(25_000, 20_000);
        assert!(!hb.is_timed_out());
        assert!(!hb.should_ping());
    }

    #[test]
    fn test_ping_pong_cycle() {
        let hb = Heartbeat::new(0, 20_000);
        assert!(hb.should_ping());

        hb.record_ping();
        assert!(!hb.should_ping());
        assert!(!hb.is_timed_out());

        hb.record_pong();
        assert!(!hb.is_timed_out());
    }

    #[test]
    fn test_timeout_after_unanswered_ping() {
        let hb = Heartbeat::new(0, 0);
        hb.record_ping();
        std::thread::sleep(Duration::from_millis(2));
        assert!(hb.is_timed_out());

        hb.reset();
        assert!(!hb.is_timed_out());
    }
}
