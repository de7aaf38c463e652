/// Long-term room graph built up by consolidation.
///
/// The map only grows: rooms, exits and attribute keys are never removed.
/// When an incoming fact contradicts a stored one the configured
/// [`ConflictPolicy`] decides which value survives.
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A single stored value together with the iteration it was observed at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fact {
    pub value: String,
    pub observed_at: u64,
}

impl Fact {
    pub fn new(value: impl Into<String>, observed_at: u64) -> Self {
        Self {
            value: value.into(),
            observed_at,
        }
    }
}

/// Decides whether an incoming fact replaces a conflicting stored one.
pub trait ConflictPolicy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Called only when the two values differ.
    fn prefer_incoming(&self, existing: &Fact, incoming: &Fact) -> bool;
}

/// The latest observation wins; ties go to the incoming fact.
#[derive(Debug, Default, Clone, Copy)]
pub struct MostRecentWins;

impl ConflictPolicy for MostRecentWins {
    fn name(&self) -> &'static str {
        "most_recent_wins"
    }

    fn prefer_incoming(&self, existing: &Fact, incoming: &Fact) -> bool {
        incoming.observed_at >= existing.observed_at
    }
}

/// The first recorded value is never overwritten.
#[derive(Debug, Default, Clone, Copy)]
pub struct KeepFirst;

impl ConflictPolicy for KeepFirst {
    fn name(&self) -> &'static str {
        "keep_first"
    }

    fn prefer_incoming(&self, _existing: &Fact, _incoming: &Fact) -> bool {
        false
    }
}

/// Look up a policy by its config name.
pub fn policy_by_name(name: &str) -> Option<Box<dyn ConflictPolicy>> {
    match name {
        "most_recent_wins" => Some(Box::new(MostRecentWins)),
        "keep_first" => Some(Box::new(KeepFirst)),
        _ => None,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    /// exit label → destination room
    pub connections: BTreeMap<String, Fact>,
    pub attributes: BTreeMap<String, Fact>,
    pub first_seen: u64,
}

// ── Model payload ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct MapUpdate {
    pub rooms: Vec<RoomUpdate>,
    #[serde(default)]
    pub summary: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RoomUpdate {
    pub name: String,
    #[serde(default)]
    pub connections: Vec<ConnectionUpdate>,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConnectionUpdate {
    pub exit: String,
    pub to: String,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MergeStats {
    pub rooms_added: usize,
    pub facts_added: usize,
    pub facts_replaced: usize,
    pub conflicts_kept: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorldMap {
    rooms: BTreeMap<String, Room>,
    summary: String,
}

impl WorldMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn room(&self, name: &str) -> Option<&Room> {
        self.rooms.get(name)
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    pub fn summary(&self) -> &str {
        &self.summary
    }

    /// Total number of stored keys (rooms, exits, attributes).
    pub fn fact_count(&self) -> usize {
        self.rooms
            .values()
            .map(|r| 1 + r.connections.len() + r.attributes.len())
            .sum()
    }

    /// Union `update` into the map. Destination rooms named by a connection
    /// are created if unknown.
    pub fn merge(&mut self, update: &MapUpdate, observed_at: u64, policy: &dyn ConflictPolicy) -> MergeStats {
        let mut stats = MergeStats::default();

        for room_update in &update.rooms {
            let name = room_update.name.trim();
            if name.is_empty() {
                continue;
            }
            let room = self.ensure_room(name, observed_at, &mut stats);

            for conn in &room_update.connections {
                let exit = conn.exit.trim();
                let to = conn.to.trim();
                if exit.is_empty() || to.is_empty() {
                    continue;
                }
                upsert(&mut room.connections, exit, Fact::new(to, observed_at), policy, &mut stats);
            }
            for (key, value) in &room_update.attributes {
                let key = key.trim();
                if key.is_empty() {
                    continue;
                }
                upsert(&mut room.attributes, key, Fact::new(value.trim(), observed_at), policy, &mut stats);
            }

            let destinations: Vec<String> = room_update
                .connections
                .iter()
                .map(|c| c.to.trim().to_string())
                .filter(|to| !to.is_empty())
                .collect();
            for to in destinations {
                self.ensure_room(&to, observed_at, &mut stats);
            }
        }

        if !update.summary.trim().is_empty() {
            self.summary = update.summary.trim().to_string();
        }
        stats
    }

    fn ensure_room(&mut self, name: &str, observed_at: u64, stats: &mut MergeStats) -> &mut Room {
        self.rooms.entry(name.to_string()).or_insert_with(|| {
            stats.rooms_added += 1;
            Room {
                first_seen: observed_at,
                ..Room::default()
            }
        })
    }

    /// Compact text rendering for prompts and status display.
    pub fn digest(&self) -> String {
        if self.rooms.is_empty() {
            return "No map data available yet.".into();
        }
        let mut out = String::new();
        if !self.summary.is_empty() {
            out.push_str(&self.summary);
            out.push('\n');
        }
        for (name, room) in &self.rooms {
            out.push_str("- ");
            out.push_str(name);
            if !room.connections.is_empty() {
                let exits: Vec<String> = room
                    .connections
                    .iter()
                    .map(|(exit, to)| format!("{exit} → {}", to.value))
                    .collect();
                out.push_str(&format!(" [exits: {}]", exits.join(", ")));
            }
            if !room.attributes.is_empty() {
                let attrs: Vec<String> = room
                    .attributes
                    .iter()
                    .map(|(k, v)| format!("{k}: {}", v.value))
                    .collect();
                out.push_str(&format!(" ({})", attrs.join("; ")));
            }
            out.push('\n');
        }
        out.trim_end().to_string()
    }
}

fn upsert(
    facts: &mut BTreeMap<String, Fact>,
    key: &str,
    incoming: Fact,
    policy: &dyn ConflictPolicy,
    stats: &mut MergeStats,
) {
    match facts.get_mut(key) {
        None => {
            facts.insert(key.to_string(), incoming);
            stats.facts_added += 1;
        }
        Some(existing) if existing.value == incoming.value => {
            existing.observed_at = existing.observed_at.max(incoming.observed_at);
        }
        Some(existing) => {
            if policy.prefer_incoming(existing, &incoming) {
                tracing::debug!(
                    key,
                    old = %existing.value,
                    new = %incoming.value,
                    policy = policy.name(),
                    "map fact replaced"
                );
                *existing = incoming;
                stats.facts_replaced += 1;
            } else {
                stats.conflicts_kept += 1;
            }
        }
    }
}
