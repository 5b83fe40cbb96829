//! Clock synchronization.
//!
//! While the player entity is in the autonomous role, the client pings on
//! a fixed cadence. Each pong yields one RTT sample, smoothed with an
//! exponential moving average, and a fresh integer clock offset so that
//! `server_time ≈ local_time + offset`. Lost pings are never retried; a
//! missed pong simply leaves both values unchanged until the next one.

use crate::messages::{Ping, Pong};

/// Fraction of the previous RTT estimate retained per sample.
pub const RTT_RETAIN: f32 = 0.8;

/// Default ping cadence in seconds.
pub const PING_INTERVAL: f32 = 1.0;

/// Smoothed RTT and server clock offset for one connection.
#[derive(Debug, Clone)]
pub struct ClockSync {
    rtt: f32,
    offset: i32,
    ping_interval: f32,
    next_ping_time: f32,
}

impl Default for ClockSync {
    fn default() -> Self {
        Self::new(PING_INTERVAL)
    }
}

impl ClockSync {
    pub fn new(ping_interval: f32) -> Self {
        Self {
            // Starting guess until the first pong lands.
            rtt: 0.1,
            offset: 0,
            ping_interval,
            next_ping_time: 0.0,
        }
    }

    /// Current smoothed round-trip time in seconds.
    pub fn rtt(&self) -> f32 {
        self.rtt
    }

    pub fn offset(&self) -> i32 {
        self.offset
    }

    /// Returns the ping to send if one is due at `now`.
    pub fn ping_due(&mut self, now: f32) -> Option<Ping> {
        if now < self.next_ping_time {
            return None;
        }
        self.next_ping_time = now + self.ping_interval;
        Some(Ping { t: now })
    }

    /// Folds a pong into the RTT estimate and recomputes the offset.
    pub fn on_pong(&mut self, pong: &Pong, now: f32) {
        let sample = now - pong.t;
        self.rtt = self.rtt * RTT_RETAIN + (1.0 - RTT_RETAIN) * sample;

        // The server's reading is half an RTT stale by the time it lands.
        let server_now = pong.server_t + self.rtt * 0.5;
        self.offset = (server_now - now).ceil() as i32;
    }

    /// Estimated server time at local time `now`, in integer ticks.
    pub fn server_time(&self, now: f32) -> i32 {
        now.ceil() as i32 + self.offset
    }

    /// Fresh state for a new connection.
    pub fn reset(&mut self) {
        *self = Self::new(self.ping_interval);
    }
}
