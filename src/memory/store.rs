use serde::{Deserialize, Serialize};

use crate::memory::objectives::{Objectives, ObjectivesUpdate};
use crate::memory::rolling::{Observation, RollingWindow};
use crate::memory::world_map::{ConflictPolicy, MapUpdate, MergeStats, MostRecentWins, WorldMap};

/// Result of one successful consolidation, applied atomically.
#[derive(Debug, Clone)]
pub struct Consolidation {
    pub map: MapUpdate,
    pub objectives: ObjectivesUpdate,
    pub narrative: String,
}

/// Read-only view handed to the planner prompt and the status board.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryDigest {
    pub narrative: String,
    pub map: String,
    pub objectives: String,
    pub recent: Vec<Observation>,
}

/// Short-term rolling observations plus the three long-term artifacts.
/// Only the loop mutates it.
pub struct MemoryStore {
    rolling: RollingWindow,
    world_map: WorldMap,
    objectives: Objectives,
    narrative: String,
    policy: Box<dyn ConflictPolicy>,
    consolidations: u32,
}

impl MemoryStore {
    pub fn new(history_size: usize, initial_narrative: impl Into<String>) -> Self {
        Self::with_policy(history_size, initial_narrative, Box::new(MostRecentWins))
    }

    pub fn with_policy(
        history_size: usize,
        initial_narrative: impl Into<String>,
        policy: Box<dyn ConflictPolicy>,
    ) -> Self {
        Self {
            rolling: RollingWindow::new(history_size),
            world_map: WorldMap::new(),
            objectives: Objectives::new(),
            narrative: initial_narrative.into(),
            policy,
            consolidations: 0,
        }
    }

    pub fn record(&mut self, obs: Observation) {
        self.rolling.push(obs);
    }

    pub fn rolling(&self) -> &RollingWindow {
        &self.rolling
    }

    pub fn world_map(&self) -> &WorldMap {
        &self.world_map
    }

    pub fn objectives(&self) -> &Objectives {
        &self.objectives
    }

    pub fn narrative(&self) -> &str {
        &self.narrative
    }

    pub fn consolidations(&self) -> u32 {
        self.consolidations
    }

    pub fn policy_name(&self) -> &'static str {
        self.policy.name()
    }

    pub fn digest(&self) -> MemoryDigest {
        MemoryDigest {
            narrative: self.narrative.clone(),
            map: self.world_map.digest(),
            objectives: self.objectives.digest(),
            recent: self.rolling.iter().cloned().collect(),
        }
    }

    /// Apply a consolidation. The map is merged, objectives updated and the
    /// narrative replaced; the rolling window is left untouched.
    pub fn apply(&mut self, consolidation: Consolidation, iteration: u64) -> MergeStats {
        let stats = self
            .world_map
            .merge(&consolidation.map, iteration, self.policy.as_ref());
        self.objectives.apply(&consolidation.objectives, iteration);
        if !consolidation.narrative.trim().is_empty() {
            self.narrative = consolidation.narrative;
        }
        self.consolidations += 1;
        tracing::info!(
            iteration,
            rooms = self.world_map.len(),
            rooms_added = stats.rooms_added,
            facts_added = stats.facts_added,
            facts_replaced = stats.facts_replaced,
            objectives = self.objectives.len(),
            "memory consolidated"
        );
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::world_map::KeepFirst;

    fn consolidation(map: &str, objectives: &str, narrative: &str) -> Consolidation {
        Consolidation {
            map: serde_json::from_str(map).unwrap(),
            objectives: serde_json::from_str(objectives).unwrap(),
            narrative: narrative.into(),
        }
    }

    #[test]
    fn test_apply_replaces_narrative_and_keeps_rolling() {
        let mut store = MemoryStore::new(10, "start");
        store.record(Observation::new(1, "a hallway", "clicked door"));
        store.apply(
            consolidation(
                r#"{"rooms":[{"name":"Hallway"}]}"#,
                r#"{"added":[{"description":"Open the door"}]}"#,
                "We are in a hallway.",
            ),
            10,
        );
        assert_eq!(store.narrative(), "We are in a hallway.");
        assert_eq!(store.rolling().len(), 1);
        assert_eq!(store.world_map().len(), 1);
        assert_eq!(store.objectives().len(), 1);
        assert_eq!(store.consolidations(), 1);

        let digest = store.digest();
        assert!(digest.map.contains("Hallway"));
        assert!(digest.objectives.contains("Open the door"));
        assert_eq!(digest.recent.len(), 1);
    }

    #[test]
    fn test_custom_policy_is_used() {
        let mut store = MemoryStore::with_policy(10, "", Box::new(KeepFirst));
        assert_eq!(store.policy_name(), "keep_first");
        store.apply(
            consolidation(r#"{"rooms":[{"name":"Lab","attributes":{"door":"locked"}}]}"#, "{}", "x"),
            10,
        );
        store.apply(
            consolidation(r#"{"rooms":[{"name":"Lab","attributes":{"door":"open"}}]}"#, "{}", "y"),
            20,
        );
        assert_eq!(store.world_map().room("Lab").unwrap().attributes["door"].value, "locked");
    }

    #[test]
    fn test_empty_narrative_keeps_previous() {
        let mut store = MemoryStore::new(10, "initial");
        store.apply(consolidation(r#"{"rooms":[]}"#, "{}", "   "), 10);
        assert_eq!(store.narrative(), "initial");
    }
}
