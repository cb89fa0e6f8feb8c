//! Canonical show time on the control side and its interpolated projection on
//! rendering clients.
//!
//! The control side owns the only authoritative elapsed value and broadcasts
//! it periodically. Clients never derive truth locally: they keep the last
//! `(canonical, receipt)` pair and add their own monotonic time on top.

use std::time::Instant;

use crate::config::ClockConfig;

/// Monotonic millisecond source anchored at construction.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn start() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    pub fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::start()
    }
}

/// Elapsed time within the current item, as seen by the control side.
#[derive(Debug, Clone)]
pub struct ControlClock {
    /// Instant the clock last started running; `None` while frozen.
    start_instant: Option<u64>,
    /// Elapsed value accumulated before `start_instant`.
    offset_ms: u64,
    last_broadcast_ms: Option<u64>,
    config: ClockConfig,
}

impl ControlClock {
    pub fn new(config: ClockConfig) -> Self {
        Self {
            start_instant: None,
            offset_ms: 0,
            last_broadcast_ms: None,
            config,
        }
    }

    /// `now - start_instant + offset` while running, the frozen value otherwise.
    pub fn elapsed(&self, now_ms: u64) -> u64 {
        match self.start_instant {
            Some(start) => now_ms.saturating_sub(start) + self.offset_ms,
            None => self.offset_ms,
        }
    }

    pub fn is_running(&self) -> bool {
        self.start_instant.is_some()
    }

    pub fn start(&mut self, now_ms: u64) {
        if self.start_instant.is_none() {
            self.start_instant = Some(now_ms);
        }
    }

    /// Stops the clock, keeping the current elapsed value.
    pub fn freeze(&mut self, now_ms: u64) {
        self.offset_ms = self.elapsed(now_ms);
        self.start_instant = None;
    }

    /// Moves the clock to `elapsed_ms`, preserving the running state. Seeks
    /// always force the next broadcast.
    pub fn seek(&mut self, elapsed_ms: u64, now_ms: u64) {
        self.offset_ms = elapsed_ms;
        if self.start_instant.is_some() {
            self.start_instant = Some(now_ms);
        }
        self.last_broadcast_ms = None;
    }

    pub fn reset(&mut self) {
        self.start_instant = None;
        self.offset_ms = 0;
        self.last_broadcast_ms = None;
    }

    /// Whether a periodic broadcast is due.
    pub fn broadcast_due(&self, now_ms: u64) -> bool {
        match self.last_broadcast_ms {
            None => true,
            Some(last) => now_ms.saturating_sub(last) >= self.config.broadcast_interval_ms,
        }
    }

    /// Records a broadcast and returns the value to send.
    pub fn mark_broadcast(&mut self, now_ms: u64) -> u64 {
        self.last_broadcast_ms = Some(now_ms);
        self.elapsed(now_ms)
    }

    /// Compares a client-reported elapsed value with the projection. Returns
    /// the signed drift (client minus control) when it exceeds the tolerance.
    pub fn drift(&self, reported_ms: u64, now_ms: u64) -> Option<i64> {
        let drift = reported_ms as i64 - self.elapsed(now_ms) as i64;
        (drift.unsigned_abs() > self.config.drift_tolerance_ms).then_some(drift)
    }
}

/// Client-side projection of the canonical elapsed value.
#[derive(Debug, Clone, Default)]
pub struct ClientClock {
    canonical_ms: u64,
    receipt_ms: u64,
    running: bool,
}

impl ClientClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a canonical value received from the control side.
    pub fn sync(&mut self, canonical_ms: u64, now_ms: u64) {
        self.canonical_ms = canonical_ms;
        self.receipt_ms = now_ms;
    }

    /// Starts or stops local interpolation, folding the elapsed time in.
    pub fn set_running(&mut self, running: bool, now_ms: u64) {
        if running == self.running {
            return;
        }
        let projected = self.project(now_ms);
        self.sync(projected, now_ms);
        self.running = running;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// `canonical + (now - receipt)` while running.
    pub fn project(&self, now_ms: u64) -> u64 {
        if self.running {
            self.canonical_ms + now_ms.saturating_sub(self.receipt_ms)
        } else {
            self.canonical_ms
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn control() -> ControlClock {
        ControlClock::new(ClockConfig::default())
    }

    #[test]
    fn elapsed_tracks_start_and_offset() {
        let mut clock = control();
        assert_eq!(clock.elapsed(1_000), 0);
        clock.start(1_000);
        assert_eq!(clock.elapsed(1_750), 750);
        clock.freeze(2_000);
        assert_eq!(clock.elapsed(9_000), 1_000);
        clock.start(10_000);
        assert_eq!(clock.elapsed(10_250), 1_250);
    }

    #[test]
    fn seek_resets_start_and_forces_broadcast() {
        let mut clock = control();
        clock.start(0);
        assert_eq!(clock.mark_broadcast(100), 100);
        assert!(!clock.broadcast_due(400));
        assert!(clock.broadcast_due(600));

        clock.seek(0, 450);
        assert!(clock.broadcast_due(450));
        assert_eq!(clock.elapsed(700), 250);
    }

    #[test]
    fn drift_beyond_tolerance_is_reported() {
        let mut clock = control();
        clock.start(0);
        assert_eq!(clock.drift(1_050, 1_000), None);
        assert_eq!(clock.drift(1_000 - 101, 1_000), Some(-101));
        assert_eq!(clock.drift(1_250, 1_000), Some(250));
    }

    #[test]
    fn client_projection_is_monotonic_between_syncs() {
        let mut client = ClientClock::new();
        client.set_running(true, 0);
        client.sync(2_000, 100);
        let mut last = 0;
        for now in (100..1_000).step_by(16) {
            let projected = client.project(now);
            assert!(projected >= last);
            last = projected;
        }
        assert_eq!(client.project(600), 2_500);
    }

    #[test]
    fn paused_client_holds_its_value() {
        let mut client = ClientClock::new();
        client.set_running(true, 0);
        client.sync(1_000, 0);
        client.set_running(false, 400);
        assert_eq!(client.project(5_000), 1_400);
        client.set_running(true, 5_000);
        assert_eq!(client.project(5_100), 1_500);
    }
}
