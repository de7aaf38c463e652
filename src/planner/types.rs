use serde::{Deserialize, Serialize};

use crate::errors::PointClawResult;
use crate::perception::grid::GridMapping;
use crate::perception::types::ScreenPoint;

/// Where to click, as the model (or a chat user) named it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClickTarget {
    /// 1-based grid cell.
    Cell { index: u32 },
    /// Pixel of the transmitted image, origin at its top-left corner.
    Pixel { x: i64, y: i64 },
}

impl ClickTarget {
    /// Resolve to a screen point. Cells go through the grid; pixels are
    /// translated as-is and only mapped to a cell for logging.
    pub fn resolve(&self, mapping: &GridMapping) -> PointClawResult<(ScreenPoint, u32)> {
        match *self {
            ClickTarget::Cell { index } => Ok((mapping.cell_to_pixel(index)?, index)),
            ClickTarget::Pixel { x, y } => {
                let point = mapping.image_to_screen(x, y)?;
                let cell = mapping.pixel_to_cell(point)?;
                Ok((point, cell))
            }
        }
    }
}

impl std::fmt::Display for ClickTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClickTarget::Cell { index } => write!(f, "cell {index}"),
            ClickTarget::Pixel { x, y } => write!(f, "pixel ({x}, {y})"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedClick {
    pub target: ClickTarget,
    pub reason: Option<String>,
}

/// Validated model answer. Targets are not yet resolved against the grid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionPlan {
    pub description: String,
    pub plan: String,
    pub clicks: Vec<PlannedClick>,
}

/// A click target turned into a concrete screen point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedClick {
    pub point: ScreenPoint,
    /// Cell containing the point.
    pub cell: u32,
    pub target: ClickTarget,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DroppedClick {
    pub target: ClickTarget,
    pub error: String,
}

impl ActionPlan {
    /// Resolve every target against `mapping`. Targets outside the grid are
    /// dropped, never clamped.
    pub fn resolve(&self, mapping: &GridMapping) -> (Vec<ResolvedClick>, Vec<DroppedClick>) {
        let mut resolved = Vec::with_capacity(self.clicks.len());
        let mut dropped = Vec::new();
        for click in &self.clicks {
            match click.target.resolve(mapping) {
                Ok((point, cell)) => resolved.push(ResolvedClick {
                    point,
                    cell,
                    target: click.target,
                    reason: click.reason.clone(),
                }),
                Err(e) => dropped.push(DroppedClick {
                    target: click.target,
                    error: e.to_string(),
                }),
            }
        }
        (resolved, dropped)
    }

    /// One-line digest of the plan and its clicks for the rolling memory.
    pub fn summary(&self) -> String {
        let clicks: Vec<String> = self
            .clicks
            .iter()
            .map(|c| match &c.reason {
                Some(reason) => format!("{reason} ({})", c.target),
                None => c.target.to_string(),
            })
            .collect();
        format!("{} | clicks: {}", self.plan.trim(), clicks.join("; "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::perception::types::{CropMargins, WindowRect};

    fn mapping() -> GridMapping {
        GridMapping::new(WindowRect::new(0, 0, 800, 600), CropMargins::default(), 10, 8).unwrap()
    }

    #[test]
    fn test_cell_one_resolves_to_center() {
        let (point, cell) = ClickTarget::Cell { index: 1 }.resolve(&mapping()).unwrap();
        assert_eq!(point, ScreenPoint::new(40, 37));
        assert_eq!(cell, 1);
    }

    #[test]
    fn test_pixel_keeps_coordinate_and_reports_cell() {
        let (point, cell) = ClickTarget::Pixel { x: 85, y: 10 }.resolve(&mapping()).unwrap();
        assert_eq!(point, ScreenPoint::new(85, 10));
        assert_eq!(cell, 2);
    }

    #[test]
    fn test_out_of_bounds_targets_dropped() {
        let plan = ActionPlan {
            description: "d".into(),
            plan: "p".into(),
            clicks: vec![
                PlannedClick { target: ClickTarget::Cell { index: 81 }, reason: None },
                PlannedClick { target: ClickTarget::Pixel { x: 900, y: 10 }, reason: None },
                PlannedClick { target: ClickTarget::Cell { index: 5 }, reason: Some("door".into()) },
            ],
        };
        let (resolved, dropped) = plan.resolve(&mapping());
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].cell, 5);
        assert_eq!(dropped.len(), 2);
    }

    #[test]
    fn test_summary_mentions_reasons() {
        let plan = ActionPlan {
            description: "d".into(),
            plan: "open the door".into(),
            clicks: vec![PlannedClick {
                target: ClickTarget::Cell { index: 42 },
                reason: Some("Open verb".into()),
            }],
        };
        assert_eq!(plan.summary(), "open the door | clicks: Open verb (cell 42)");
    }
}
