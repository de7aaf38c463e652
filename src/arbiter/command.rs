use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::errors::{PointClawError, PointClawResult};
use crate::planner::types::{ClickTarget, ResolvedClick};

/// One chat message as delivered by the chat collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatLine {
    pub user: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatLine {
    pub fn new(user: impl Into<String>, text: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            user: user.into(),
            text: text.into(),
            timestamp,
        }
    }
}

/// A chat line that parsed as a click command, with its validation verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatCommand {
    /// Arrival order across the whole session.
    pub seq: u64,
    pub source: String,
    pub raw_text: String,
    pub target: ClickTarget,
    pub timestamp: DateTime<Utc>,
    pub valid: bool,
    pub reject_reason: Option<String>,
    /// Set once the target resolved inside the grid.
    pub resolved: Option<ResolvedClick>,
}

/// Turns chat text into click targets.
///
/// Recognises `click 42`, `click(42)`, `click 123,456` and `click (123, 456)`,
/// case-insensitive. The pixel form is tried first so `click 12,34` is never
/// read as cell 12.
pub struct CommandParser {
    pixel: Regex,
    cell: Regex,
}

impl CommandParser {
    pub fn new() -> PointClawResult<Self> {
        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|e| PointClawError::Chat(format!("command pattern: {e}")))
        };
        Ok(Self {
            pixel: compile(r"(?i)\bclick\s*\(?\s*(\d+)\s*,\s*(\d+)\s*\)?")?,
            cell: compile(r"(?i)\bclick\s*\(?\s*(\d+)\s*\)?")?,
        })
    }

    pub fn parse(&self, text: &str) -> Option<ClickTarget> {
        if let Some(caps) = self.pixel.captures(text) {
            let x = caps.get(1)?.as_str().parse().ok()?;
            let y = caps.get(2)?.as_str().parse().ok()?;
            return Some(ClickTarget::Pixel { x, y });
        }
        let caps = self.cell.captures(text)?;
        // Digits too long for u32 are not a usable cell.
        let index = caps.get(1)?.as_str().parse().ok()?;
        Some(ClickTarget::Cell { index })
    }
}
