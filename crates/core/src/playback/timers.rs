/// Internal deadlines driving the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// LOADING gave up waiting for readiness.
    LoadTimeout,
    /// The current item ran for its full duration.
    ItemEnd,
    /// The blend window of a TRANSITIONING step is over.
    TransitionDone,
    /// The fallback window after an error is over.
    ErrorHold,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timer {
    pub kind: TimerKind,
    pub due_ms: u64,
    /// Epoch active when the timer was armed.
    pub epoch: u64,
}

/// Deadlines kept sorted by due time. At most one timer per kind.
#[derive(Debug, Default, Clone)]
pub struct TimerQueue {
    timers: Vec<Timer>,
}

impl TimerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms `kind`, replacing any earlier timer of the same kind.
    pub fn arm(&mut self, kind: TimerKind, due_ms: u64, epoch: u64) {
        self.cancel(kind);
        let timer = Timer { kind, due_ms, epoch };
        let at = self.timers.partition_point(|t| t.due_ms <= due_ms);
        self.timers.insert(at, timer);
    }

    pub fn cancel(&mut self, kind: TimerKind) {
        self.timers.retain(|t| t.kind != kind);
    }

    /// Carries a pending timer of `kind` over into `epoch`.
    pub fn retag(&mut self, kind: TimerKind, epoch: u64) {
        if let Some(timer) = self.timers.iter_mut().find(|t| t.kind == kind) {
            timer.epoch = epoch;
        }
    }

    /// Removes and returns the earliest timer due at `now_ms`.
    pub fn pop_due(&mut self, now_ms: u64) -> Option<Timer> {
        match self.timers.first() {
            Some(timer) if timer.due_ms <= now_ms => Some(self.timers.remove(0)),
            _ => None,
        }
    }

    pub fn get(&self, kind: TimerKind) -> Option<&Timer> {
        self.timers.iter().find(|t| t.kind == kind)
    }

    pub fn next_due(&self) -> Option<u64> {
        self.timers.first().map(|t| t.due_ms)
    }

    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }
}
