use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// One iteration's worth of short-term memory: what was seen and what was done.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    pub iteration: u64,
    pub description: String,
    /// One-line digest of the plan and clicks, empty when nothing was executed.
    pub actions: String,
}

impl Observation {
    pub fn new(iteration: u64, description: impl Into<String>, actions: impl Into<String>) -> Self {
        Self {
            iteration,
            description: description.into(),
            actions: actions.into(),
        }
    }

    /// Stand-in entry for an iteration whose model response was unusable.
    pub fn placeholder(iteration: u64, reason: &str) -> Self {
        Self {
            iteration,
            description: format!("(no observation: {reason})"),
            actions: String::new(),
        }
    }
}

/// Bounded FIFO of the most recent observations. Pushing onto a full window
/// evicts the oldest entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollingWindow {
    capacity: usize,
    entries: VecDeque<Observation>,
}

impl RollingWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, obs: Observation) {
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(obs);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Observation> {
        self.entries.iter()
    }
}
