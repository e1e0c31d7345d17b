//! Discrete simulation clock
//!
//! The simulator advances in whole steps of `step_length_ms`. Elapsed time
//! that does not reach the next step boundary is carried over, so many small
//! advances eventually add up to a step.
//!
//! ```text
//! advance(5000) → accumulated 5000, 5 steps due
//! advance(500)  → accumulated 5500, 0 steps due
//! advance(500)  → accumulated 6000, 1 step due
//! ```

/// Step counter and accumulated simulated time of one session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulationClock {
    step: u64,
    accumulated_ms: u64,
    step_length_ms: u64,
}

impl SimulationClock {
    pub fn new(step_length_ms: u64) -> Self {
        Self {
            step: 0,
            accumulated_ms: 0,
            step_length_ms: step_length_ms.max(1),
        }
    }

    /// Number of steps executed so far
    #[inline]
    pub fn step(&self) -> u64 {
        self.step
    }

    /// Simulated milliseconds requested so far, remainder included
    #[inline]
    pub fn accumulated_ms(&self) -> u64 {
        self.accumulated_ms
    }

    #[inline]
    pub fn step_length_ms(&self) -> u64 {
        self.step_length_ms
    }

    /// Adds elapsed time and returns how many steps are now due
    pub fn add_elapsed(&mut self, elapsed_ms: u64) -> u64 {
        self.accumulated_ms = self.accumulated_ms.saturating_add(elapsed_ms);
        self.steps_due()
    }

    /// Steps needed for the counter to catch up with the accumulated time
    pub fn steps_due(&self) -> u64 {
        (self.accumulated_ms / self.step_length_ms).saturating_sub(self.step)
    }

    /// Records one executed step
    ///
    /// Returns the simulated time reached by that step: the step boundary for
    /// catch-up steps, or the accumulated time for the step that catches up.
    pub fn complete_step(&mut self) -> u64 {
        self.step += 1;
        let boundary = self.step.saturating_mul(self.step_length_ms);
        if self.steps_due() == 0 {
            self.accumulated_ms.max(boundary)
        } else {
            boundary
        }
    }
}
