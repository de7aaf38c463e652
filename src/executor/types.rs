use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::perception::types::ScreenPoint;

/// Who asked for a click.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum ClickSource {
    Planner,
    Chat { user: String },
}

/// Audit record of one performed click.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutedClick {
    pub point: ScreenPoint,
    pub cell: u32,
    #[serde(flatten)]
    pub source: ClickSource,
    pub reason: Option<String>,
    pub executed_at: DateTime<Utc>,
}
