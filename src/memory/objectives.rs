use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectiveStatus {
    Active,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    /// Lenient mapping of whatever label the model wrote.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "high" | "urgent" | "critical" | "1" => Priority::High,
            "low" | "optional" | "3" => Priority::Low,
            _ => Priority::Medium,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Objective {
    pub id: u32,
    pub description: String,
    pub priority: Priority,
    pub status: ObjectiveStatus,
    pub created_at: u64,
    pub completed_at: Option<u64>,
}

// ── Model payload ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ObjectivesUpdate {
    #[serde(default)]
    pub completed: Vec<u32>,
    #[serde(default)]
    pub added: Vec<NewObjective>,
    #[serde(default)]
    pub summary: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NewObjective {
    pub description: String,
    #[serde(default)]
    pub priority: String,
}

/// Ordered goal list. Entries are only ever appended or marked completed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Objectives {
    items: Vec<Objective>,
    next_id: u32,
    summary: String,
}

impl Default for Objectives {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            next_id: 1,
            summary: String::new(),
        }
    }
}

impl Objectives {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> &[Objective] {
        &self.items
    }

    pub fn active(&self) -> impl Iterator<Item = &Objective> {
        self.items.iter().filter(|o| o.status == ObjectiveStatus::Active)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, id: u32) -> Option<&Objective> {
        self.items.iter().find(|o| o.id == id)
    }

    /// Append an objective unless an active one with the same text exists.
    /// Returns the new id, or None for a duplicate.
    pub fn add(&mut self, description: &str, priority: Priority, iteration: u64) -> Option<u32> {
        let description = description.trim();
        if description.is_empty() {
            return None;
        }
        let duplicate = self
            .active()
            .any(|o| o.description.eq_ignore_ascii_case(description));
        if duplicate {
            return None;
        }
        let id = self.next_id;
        self.next_id += 1;
        self.items.push(Objective {
            id,
            description: description.to_string(),
            priority,
            status: ObjectiveStatus::Active,
            created_at: iteration,
            completed_at: None,
        });
        Some(id)
    }

    /// Mark an objective completed. Unknown ids and already completed
    /// objectives are left alone.
    pub fn complete(&mut self, id: u32, iteration: u64) -> bool {
        match self.items.iter_mut().find(|o| o.id == id) {
            Some(o) if o.status == ObjectiveStatus::Active => {
                o.status = ObjectiveStatus::Completed;
                o.completed_at = Some(iteration);
                true
            }
            _ => false,
        }
    }

    pub fn apply(&mut self, update: &ObjectivesUpdate, iteration: u64) {
        for id in &update.completed {
            if !self.complete(*id, iteration) {
                tracing::debug!(id, "completion ignored for unknown or finished objective");
            }
        }
        for new in &update.added {
            self.add(&new.description, Priority::from_label(&new.priority), iteration);
        }
        if !update.summary.trim().is_empty() {
            self.summary = update.summary.trim().to_string();
        }
    }

    /// Active objectives by priority, for the planner prompt.
    pub fn digest(&self) -> String {
        let mut active: Vec<&Objective> = self.active().collect();
        if active.is_empty() {
            return "No objectives identified yet.".into();
        }
        active.sort_by_key(|o| (o.priority, o.id));
        let mut out: Vec<String> = active
            .iter()
            .map(|o| format!("#{} [{:?}] {}", o.id, o.priority, o.description))
            .collect();
        let done = self.items.len() - active.len();
        if done > 0 {
            out.push(format!("({done} completed)"));
        }
        out.join("\n")
    }

    /// Every objective with its id and status, for the consolidation prompt.
    pub fn listing(&self) -> String {
        if self.items.is_empty() {
            return "No objectives identified yet.".into();
        }
        self.items
            .iter()
            .map(|o| {
                let status = match o.status {
                    ObjectiveStatus::Active => "active",
                    ObjectiveStatus::Completed => "completed",
                };
                format!("{}: {} ({status})", o.id, o.description)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completed_objectives_are_retained() {
        let mut objectives = Objectives::new();
        let id = objectives.add("Find the key", Priority::High, 10).unwrap();
        assert!(objectives.complete(id, 20));
        assert_eq!(objectives.len(), 1);
        let o = objectives.get(id).unwrap();
        assert_eq!(o.status, ObjectiveStatus::Completed);
        assert_eq!(o.completed_at, Some(20));
        assert_eq!(objectives.active().count(), 0);
    }

    #[test]
    fn test_duplicate_active_objective_skipped() {
        let mut objectives = Objectives::new();
        assert!(objectives.add("Open the door", Priority::Medium, 1).is_some());
        assert!(objectives.add("open the door", Priority::High, 2).is_none());
        assert_eq!(objectives.len(), 1);
    }

    #[test]
    fn test_apply_update() {
        let mut objectives = Objectives::new();
        objectives.add("Enter the mansion", Priority::High, 10);
        let update: ObjectivesUpdate = serde_json::from_str(
            r#"{"completed":[1, 99],"added":[{"description":"Find the attic","priority":"low"}],"summary":"inside now"}"#,
        )
        .unwrap();
        objectives.apply(&update, 20);
        assert_eq!(objectives.len(), 2);
        assert_eq!(objectives.get(1).unwrap().status, ObjectiveStatus::Completed);
        assert_eq!(objectives.get(2).unwrap().priority, Priority::Low);
        assert!(objectives.digest().contains("Find the attic"));
        assert!(objectives.digest().contains("(1 completed)"));
        assert!(objectives.listing().contains("1: Enter the mansion (completed)"));
    }

    #[test]
    fn test_priority_labels() {
        assert_eq!(Priority::from_label("HIGH"), Priority::High);
        assert_eq!(Priority::from_label(""), Priority::Medium);
        assert_eq!(Priority::from_label("low"), Priority::Low);
    }
}
