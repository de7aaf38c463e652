use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::arbiter::arbitration::Arbitration;
use crate::executor::types::{ClickSource, ExecutedClick};
use crate::memory::rolling::Observation;
use crate::perception::types::WindowRect;
use crate::planner::types::{ActionPlan, DroppedClick};

/// Everything that happened in one pass of the loop. Written to the
/// session log as one JSON line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Iteration {
    pub number: u64,
    pub started_at: DateTime<Utc>,
    pub window: Option<WindowRect>,
    pub raw_response: Option<String>,
    pub plan: Option<ActionPlan>,
    /// Planner clicks that could not be resolved against the grid.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dropped: Vec<DroppedClick>,
    pub chat: Option<Arbitration>,
    pub executed: Vec<ExecutedClick>,
    pub consolidated: Option<bool>,
    pub error: Option<String>,
}

impl Iteration {
    pub fn new(number: u64) -> Self {
        Self {
            number,
            started_at: Utc::now(),
            window: None,
            raw_response: None,
            plan: None,
            dropped: Vec::new(),
            chat: None,
            executed: Vec::new(),
            consolidated: None,
            error: None,
        }
    }

    /// The rolling-memory entry for this iteration. Iterations without a
    /// usable plan still leave a placeholder so the history stays contiguous.
    pub fn observation(&self) -> Observation {
        let Some(plan) = &self.plan else {
            let reason = self.error.as_deref().unwrap_or("no plan");
            return Observation::placeholder(self.number, reason);
        };
        let clicks = if self.executed.is_empty() {
            "no clicks executed".to_string()
        } else {
            self.executed.iter().map(describe_click).collect::<Vec<_>>().join("; ")
        };
        Observation::new(self.number, plan.description.clone(), format!("{} | clicks: {clicks}", plan.plan))
    }
}

fn describe_click(click: &ExecutedClick) -> String {
    let who = match &click.source {
        ClickSource::Planner => click.reason.clone().unwrap_or_else(|| "planner".into()),
        ClickSource::Chat { user } => format!("chat: {user}"),
    };
    format!("{who} (cell {})", click.cell)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::perception::types::ScreenPoint;

    fn click(cell: u32, source: ClickSource, reason: Option<&str>) -> ExecutedClick {
        ExecutedClick {
            point: ScreenPoint::new(0, 0),
            cell,
            source,
            reason: reason.map(Into::into),
            executed_at: Utc::now(),
        }
    }

    #[test]
    fn test_observation_from_plan_and_clicks() {
        let mut it = Iteration::new(3);
        it.plan = Some(ActionPlan {
            description: "A dark hallway".into(),
            plan: "Open the door".into(),
            clicks: vec![],
        });
        it.executed = vec![
            click(12, ClickSource::Planner, Some("Open verb")),
            click(40, ClickSource::Chat { user: "viewer".into() }, Some("chat: viewer")),
        ];
        let obs = it.observation();
        assert_eq!(obs.iteration, 3);
        assert_eq!(obs.description, "A dark hallway");
        assert_eq!(obs.actions, "Open the door | clicks: Open verb (cell 12); chat: viewer (cell 40)");
    }

    #[test]
    fn test_failed_iteration_leaves_placeholder() {
        let mut it = Iteration::new(7);
        it.error = Some("malformed model response: missing field `clicks`".into());
        let obs = it.observation();
        assert_eq!(obs.iteration, 7);
        assert!(obs.description.starts_with("(no observation:"));
    }
}
