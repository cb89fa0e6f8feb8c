//! Readiness scheduling for upcoming items.
//!
//! Work is ordered `current > current+1 > current+2`. Every task is tagged with
//! the epoch active when it was queued; once a newer epoch is observed the task
//! is dropped without running, and results that complete under a stale epoch
//! are handed back to the caller for disposal.

use std::{
    cmp::Ordering,
    collections::{BTreeMap, BinaryHeap},
};

use crate::config::{EndBehavior, PreloadConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreloadTask {
    pub index: usize,
    /// Distance from the current item; 0 runs first.
    pub priority: usize,
    pub epoch: u64,
    seq: u64,
}

impl Ord for PreloadTask {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for PreloadTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Priority queue of preparation work plus the results that are ready.
#[derive(Debug)]
pub struct PreloadCoordinator<T> {
    config: PreloadConfig,
    queue: BinaryHeap<PreloadTask>,
    prepared: BTreeMap<usize, T>,
    epoch: u64,
    seq: u64,
    lookahead_from: Option<(usize, u64)>,
}

impl<T> PreloadCoordinator<T> {
    pub fn new(config: PreloadConfig) -> Self {
        Self {
            config,
            queue: BinaryHeap::new(),
            prepared: BTreeMap::new(),
            epoch: 0,
            seq: 0,
            lookahead_from: None,
        }
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn tasks_per_frame(&self) -> usize {
        self.config.tasks_per_frame.max(1)
    }

    /// Observes `epoch`; queued tasks from older epochs are cancelled.
    /// Returns how many were cancelled.
    pub fn observe_epoch(&mut self, epoch: u64) -> usize {
        if epoch <= self.epoch {
            return 0;
        }
        self.epoch = epoch;
        let before = self.queue.len();
        self.queue.retain(|task| task.epoch >= epoch);
        let cancelled = before - self.queue.len();
        if cancelled > 0 {
            tracing::debug!(cancelled, epoch, "cancelled superseded preload work");
        }
        cancelled
    }

    /// Retargets after a jump: cancels stale work, drops lookahead queued
    /// for the old position, evicts every prepared result other than
    /// `target`, and queues `target` at top priority. Evicted results are
    /// returned for cleanup.
    pub fn retarget(&mut self, target: usize, epoch: u64) -> Vec<T> {
        self.observe_epoch(epoch);
        self.queue.clear();
        let keep = self.prepared.remove(&target);
        let evicted = std::mem::take(&mut self.prepared).into_values().collect();
        match keep {
            Some(value) => {
                self.prepared.insert(target, value);
            }
            None => self.enqueue(target, 0),
        }
        self.lookahead_from = None;
        evicted
    }

    /// Queues `index` unless it is already prepared or queued.
    pub fn enqueue(&mut self, index: usize, priority: usize) {
        if self.prepared.contains_key(&index) || self.is_queued(index) {
            return;
        }
        self.seq += 1;
        self.queue.push(PreloadTask {
            index,
            priority,
            epoch: self.epoch,
            seq: self.seq,
        });
    }

    /// Starts preparing the next `lookahead` items once the current item's
    /// elapsed fraction crosses the threshold. Runs at most once per
    /// `(current, epoch)`.
    pub fn maybe_lookahead(
        &mut self,
        current: usize,
        fraction: f64,
        len: usize,
        end_behavior: EndBehavior,
    ) -> bool {
        if fraction < self.config.threshold || self.lookahead_from == Some((current, self.epoch)) {
            return false;
        }
        self.lookahead_from = Some((current, self.epoch));
        for offset in 1..=self.config.lookahead {
            if let Some(index) = end_behavior.resolve(current, offset as i64, len) {
                if index != current {
                    self.enqueue(index, offset);
                }
            }
        }
        true
    }

    /// Pops the next task for the current epoch, skipping stale ones.
    pub fn next_task(&mut self) -> Option<PreloadTask> {
        while let Some(task) = self.queue.pop() {
            if task.epoch >= self.epoch {
                return Some(task);
            }
        }
        None
    }

    /// Stores a finished result. A result for a superseded epoch is returned
    /// as `Err` so the caller can dispose of it.
    pub fn complete(&mut self, task: PreloadTask, value: T) -> Result<(), T> {
        if task.epoch < self.epoch {
            return Err(value);
        }
        if let Some(previous) = self.prepared.insert(task.index, value) {
            return Err(previous);
        }
        Ok(())
    }

    pub fn take(&mut self, index: usize) -> Option<T> {
        self.prepared.remove(&index)
    }

    pub fn is_prepared(&self, index: usize) -> bool {
        self.prepared.contains_key(&index)
    }

    pub fn is_queued(&self, index: usize) -> bool {
        self.queue
            .iter()
            .any(|task| task.index == index && task.epoch >= self.epoch)
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn prepared_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.prepared.keys().copied()
    }

    /// Drops all queued work and returns every prepared result.
    pub fn clear(&mut self) -> Vec<T> {
        self.queue.clear();
        self.lookahead_from = None;
        std::mem::take(&mut self.prepared).into_values().collect()
    }
}
