//! Sequence - Timed steps advanced by the caller's clock
//!
//! Stands in for "wait N seconds, then do X" chains. Nothing here sleeps:
//! the owner feeds elapsed time through [`Timeline::advance`] and gets back
//! whichever steps came due.

use std::collections::VecDeque;

#[derive(Debug, Clone)]
pub struct Timeline<T> {
    /// (delay after the previous step, step)
    steps: VecDeque<(f32, T)>,
    elapsed: f32,
    cancelled: bool,
}

impl<T> Timeline<T> {
    pub fn new() -> Self {
        Self {
            steps: VecDeque::new(),
            elapsed: 0.0,
            cancelled: false,
        }
    }

    /// Append a step that fires `delay` seconds after the previous one
    pub fn then(mut self, delay: f32, step: T) -> Self {
        self.steps.push_back((delay.max(0.0), step));
        self
    }

    /// Single step after `delay` seconds
    pub fn after(delay: f32, step: T) -> Self {
        Self::new().then(delay, step)
    }

    /// Move the clock forward and collect every step that is now due, in
    /// order. A large `delta` can release several steps at once.
    pub fn advance(&mut self, delta: f32) -> Vec<T> {
        let mut due = Vec::new();
        if self.cancelled {
            return due;
        }

        self.elapsed += delta;
        while let Some((delay, _)) = self.steps.front() {
            if self.elapsed < *delay {
                break;
            }
            self.elapsed -= *delay;
            if let Some((_, step)) = self.steps.pop_front() {
                due.push(step);
            }
        }
        due
    }

    /// Abort; pending steps never fire
    pub fn cancel(&mut self) {
        self.cancelled = true;
        self.steps.clear();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn is_finished(&self) -> bool {
        self.steps.is_empty()
    }

    /// Seconds until the next step fires
    pub fn remaining_to_next(&self) -> Option<f32> {
        self.steps
            .front()
            .map(|(delay, _)| (delay - self.elapsed).max(0.0))
    }
}

impl<T> Default for Timeline<T> {
    fn default() -> Self {
        Self::new()
    }
}
