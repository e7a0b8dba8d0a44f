//! Time-based button debouncing
//!
//! Each button owns a [`DebounceState`]. Every edge in the raw signal restarts the stability
//! timer, and the stable state only follows the raw state once the raw level has held for the
//! full debounce window measured from its most recent edge. A signal that keeps toggling faster
//! than the window never changes the stable state.

use crate::snapshot::InputId;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

/// Per-button debounce bookkeeping
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DebounceState {
    /// Last raw level seen, `true` = pressed
    pub raw_state: bool,
    /// Time of the most recent raw edge
    pub last_change: Duration,
    /// Debounced level reported to consumers
    pub stable_state: bool,
}

impl DebounceState {
    fn update(&mut self, raw_level: bool, now: Duration, threshold: Duration) -> bool {
        if raw_level != self.raw_state {
            self.last_change = now;
            self.raw_state = raw_level;
        }

        if now.saturating_sub(self.last_change) >= threshold {
            self.stable_state = self.raw_state;
        }

        self.stable_state
    }
}

/// Debounce table for all configured buttons
#[derive(Debug)]
pub struct Debouncer {
    threshold: Duration,
    states: HashMap<InputId, DebounceState>,
}

impl Debouncer {
    pub fn new<'a>(threshold: Duration, inputs: impl IntoIterator<Item = &'a InputId>) -> Self {
        let states: HashMap<InputId, DebounceState> = inputs
            .into_iter()
            .map(|id| (id.clone(), DebounceState::default()))
            .collect();
        debug!(
            "Created debouncer for {} inputs with {}ms window",
            states.len(),
            threshold.as_millis()
        );
        Self { threshold, states }
    }

    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    /// Feeds one polarity-normalized raw reading and returns the stable state
    pub fn debounce(&mut self, id: &InputId, raw_level: bool, now: Duration) -> bool {
        let threshold = self.threshold;
        let state = self.states.entry(id.clone()).or_default();

        let previous = state.stable_state;
        let stable = state.update(raw_level, now, threshold);
        if stable != previous {
            debug!(
                "Input {} settled {} at {}ms",
                id,
                if stable { "pressed" } else { "released" },
                now.as_millis()
            );
        }
        stable
    }

    /// Stable state without feeding a new reading
    pub fn stable(&self, id: &InputId) -> bool {
        self.states
            .get(id)
            .map(|state| state.stable_state)
            .unwrap_or(false)
    }

    pub fn state(&self, id: &InputId) -> Option<&DebounceState> {
        self.states.get(id)
    }
}
