use std::collections::VecDeque;

use crate::config::PerformanceConfig;

/// One observed frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PerformanceSample {
    pub interval_ms: f64,
    pub timestamp_ms: u64,
}

impl PerformanceSample {
    pub fn fps(&self) -> f64 {
        if self.interval_ms <= 0.0 {
            f64::INFINITY
        } else {
            1000.0 / self.interval_ms
        }
    }
}

/// Outcome of a governor check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GovernorAction {
    Idle,
    /// Call the active scene's complexity-reduction hook.
    Degrade,
    /// Frame rate is back above the floor. Reduced parameters stay reduced.
    Recovered,
}

/// Rolling frame-rate monitor for one rendering client.
#[derive(Debug, Clone)]
pub struct PerformanceGovernor {
    config: PerformanceConfig,
    samples: VecDeque<PerformanceSample>,
    last_frame_ms: Option<u64>,
    last_check_ms: Option<u64>,
    degraded: bool,
}

impl PerformanceGovernor {
    pub fn new(config: PerformanceConfig) -> Self {
        Self {
            samples: VecDeque::with_capacity(config.window_size),
            config,
            last_frame_ms: None,
            last_check_ms: None,
            degraded: false,
        }
    }

    /// Records a frame presented at `now_ms`, deriving the interval from the
    /// previous frame.
    pub fn record_frame(&mut self, now_ms: u64) {
        if let Some(last) = self.last_frame_ms {
            self.record(PerformanceSample {
                interval_ms: now_ms.saturating_sub(last) as f64,
                timestamp_ms: now_ms,
            });
        } else if self.last_check_ms.is_none() {
            self.last_check_ms = Some(now_ms);
        }
        self.last_frame_ms = Some(now_ms);
    }

    pub fn record(&mut self, sample: PerformanceSample) {
        if self.last_check_ms.is_none() {
            self.last_check_ms = Some(sample.timestamp_ms);
        }
        self.samples.push_back(sample);
        while self.samples.len() > self.config.window_size.max(1) {
            self.samples.pop_front();
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    pub fn samples(&self) -> impl Iterator<Item = &PerformanceSample> {
        self.samples.iter()
    }

    /// Average frame rate over the retained window.
    pub fn fps(&self) -> Option<f64> {
        average_fps(self.samples.iter())
    }

    /// Runs the degrade/recover decision once per check interval.
    pub fn check(&mut self, now_ms: u64) -> GovernorAction {
        let interval = self.config.check_interval_ms;
        match self.last_check_ms {
            Some(last) if now_ms.saturating_sub(last) < interval => return GovernorAction::Idle,
            None => return GovernorAction::Idle,
            _ => {}
        }
        self.last_check_ms = Some(now_ms);

        let since = now_ms.saturating_sub(interval);
        let recent: Vec<&PerformanceSample> = self
            .samples
            .iter()
            .filter(|sample| sample.timestamp_ms >= since)
            .collect();
        let slow = recent
            .iter()
            .filter(|sample| sample.fps() < self.config.fps_floor)
            .count();

        if !self.degraded {
            if slow >= self.config.min_slow_samples {
                self.degraded = true;
                tracing::warn!(slow, fps = ?self.fps(), "frame rate below floor; reducing scene complexity");
                return GovernorAction::Degrade;
            }
        } else if average_fps(recent.iter().copied()).is_some_and(|fps| fps >= self.config.fps_floor) {
            self.degraded = false;
            tracing::info!(fps = ?self.fps(), "frame rate recovered");
            return GovernorAction::Recovered;
        }
        GovernorAction::Idle
    }

    /// Forgets history, e.g. when a new scene goes on screen. The degraded
    /// flag is kept so a struggling client is not re-triggered immediately.
    pub fn reset_window(&mut self) {
        self.samples.clear();
        self.last_frame_ms = None;
    }
}

fn average_fps<'a>(samples: impl Iterator<Item = &'a PerformanceSample>) -> Option<f64> {
    let (total, count) = samples.fold((0.0, 0usize), |(total, count), sample| {
        (total + sample.interval_ms, count + 1)
    });
    if count == 0 || total <= 0.0 {
        None
    } else {
        Some(1000.0 / (total / count as f64))
    }
}
