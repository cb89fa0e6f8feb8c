use crate::scene::Params;

/// Bounded-rate channel for operator parameter tweaks: updates merge
/// latest-value-wins and are released at most once per interval.
#[derive(Debug, Clone)]
pub struct ParamThrottle {
    min_interval_ms: u64,
    pending: Params,
    last_emit_ms: Option<u64>,
}

impl ParamThrottle {
    pub fn new(min_interval_ms: u64) -> Self {
        Self {
            min_interval_ms,
            pending: Params::new(),
            last_emit_ms: None,
        }
    }

    /// Merges `partial` into the pending batch; later values overwrite
    /// earlier ones for the same key.
    pub fn push(&mut self, partial: &Params) {
        for (key, value) in partial {
            self.pending.insert(key.clone(), value.clone());
        }
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Releases the pending batch if the interval since the last emit has
    /// passed.
    pub fn poll(&mut self, now_ms: u64) -> Option<Params> {
        if self.pending.is_empty() {
            return None;
        }
        if let Some(last) = self.last_emit_ms {
            if now_ms.saturating_sub(last) < self.min_interval_ms {
                return None;
            }
        }
        self.last_emit_ms = Some(now_ms);
        Some(std::mem::take(&mut self.pending))
    }

    /// Drops anything pending, e.g. when the item changes.
    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn partial(value: serde_json::Value) -> Params {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn first_update_goes_out_immediately() {
        let mut throttle = ParamThrottle::new(50);
        throttle.push(&partial(json!({ "speed": 1.5 })));
        assert_eq!(throttle.poll(0), Some(partial(json!({ "speed": 1.5 }))));
        assert!(throttle.poll(1).is_none());
    }

    #[test]
    fn latest_value_wins_within_interval() {
        let mut throttle = ParamThrottle::new(50);
        throttle.push(&partial(json!({ "speed": 1.0 })));
        throttle.poll(0);

        throttle.push(&partial(json!({ "speed": 1.2, "a": 3 })));
        throttle.push(&partial(json!({ "speed": 2.0 })));
        assert!(throttle.poll(20).is_none());
        assert!(throttle.has_pending());
        assert_eq!(
            throttle.poll(50),
            Some(partial(json!({ "speed": 2.0, "a": 3 })))
        );
        assert!(!throttle.has_pending());
    }
}
