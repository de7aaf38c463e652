/// Single validation pass from model text to [`ActionPlan`].
///
/// The only leniency is an optional Markdown code fence around the JSON. Any
/// other deviation from `{description, plan, clicks: [{cell} | {x, y}]}`
/// (extra keys, wrong types, missing fields, no clicks) is a malformed response.
use serde::Deserialize;

use crate::errors::{PointClawError, PointClawResult};
use crate::llm::fence::strip_code_fence;
use crate::planner::types::{ActionPlan, ClickTarget, PlannedClick};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct WireResponse {
    description: String,
    plan: String,
    clicks: Vec<WireClick>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireClick {
    Cell(WireCell),
    Pixel(WirePixel),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct WireCell {
    cell: i64,
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct WirePixel {
    x: i64,
    y: i64,
    #[serde(default)]
    reason: Option<String>,
}

const EXCERPT_LEN: usize = 160;

pub fn parse_action_plan(text: &str) -> PointClawResult<ActionPlan> {
    let body = strip_code_fence(text);
    let wire: WireResponse = serde_json::from_str(body).map_err(|e| {
        PointClawError::MalformedResponse(format!("{e}; response starts with: {}", excerpt(body)))
    })?;

    if wire.clicks.is_empty() {
        return Err(PointClawError::MalformedResponse("clicks is empty".into()));
    }

    let clicks = wire
        .clicks
        .into_iter()
        .map(|click| match click {
            // Negative or oversized cells become index 0, which the grid rejects.
            WireClick::Cell(c) => PlannedClick {
                target: ClickTarget::Cell {
                    index: u32::try_from(c.cell).unwrap_or(0),
                },
                reason: non_empty(c.reason),
            },
            WireClick::Pixel(p) => PlannedClick {
                target: ClickTarget::Pixel { x: p.x, y: p.y },
                reason: non_empty(p.reason),
            },
        })
        .collect();

    Ok(ActionPlan {
        description: wire.description.trim().to_string(),
        plan: wire.plan.trim().to_string(),
        clicks,
    })
}

fn non_empty(reason: Option<String>) -> Option<String> {
    reason
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty())
}

fn excerpt(text: &str) -> String {
    let mut out: String = text.chars().take(EXCERPT_LEN).collect();
    if text.chars().count() > EXCERPT_LEN {
        out.push('…');
    }
    out
}
