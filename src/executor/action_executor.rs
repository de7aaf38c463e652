use std::time::Duration;

use crate::errors::PointClawError;
use crate::executor::input::MouseDriver;
use crate::executor::safety::{ensure_inside, verify_window};
use crate::executor::types::{ClickSource, ExecutedClick};
use crate::perception::grid::GridMapping;
use crate::perception::window::WindowSource;
use crate::planner::types::ResolvedClick;

/// A click queued for execution together with its origin.
#[derive(Debug, Clone)]
pub struct QueuedClick {
    pub click: ResolvedClick,
    pub source: ClickSource,
}

#[derive(Debug, Default)]
pub struct ExecutionReport {
    pub executed: Vec<ExecutedClick>,
    /// First error that ended the batch early, if any.
    pub error: Option<PointClawError>,
}

/// Performs a batch of clicks with a fixed pause between them.
///
/// The batch always runs to completion or to its first error; a stop request
/// is only honoured between batches so multi-click gestures (verb, then
/// object) are never cut in half.
pub struct ActionExecutor<M: MouseDriver> {
    mouse: M,
    click_interval: Duration,
}

impl<M: MouseDriver> ActionExecutor<M> {
    pub fn new(mouse: M, click_interval: Duration) -> Self {
        Self { mouse, click_interval }
    }

    pub fn mouse(&self) -> &M {
        &self.mouse
    }

    pub async fn execute(
        &mut self,
        iteration: u64,
        windows: &dyn WindowSource,
        window_id: u32,
        mapping: &GridMapping,
        batch: &[QueuedClick],
    ) -> ExecutionReport {
        let mut report = ExecutionReport::default();
        if batch.is_empty() {
            return report;
        }

        // Remaining clicks are abandoned, not retried within this iteration.
        if let Err(e) = verify_window(windows, window_id, mapping.window()) {
            tracing::warn!(iteration, error = %e, clicks = batch.len(), "target window lost before first click");
            report.error = Some(e);
            return report;
        }

        for (i, queued) in batch.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.click_interval).await;
            }
            let point = queued.click.point;
            if let Err(e) = ensure_inside(point, mapping.window()) {
                report.error = Some(e);
                break;
            }
            if let Err(e) = self.mouse.click_at(point) {
                tracing::error!(iteration, error = %e, x = point.x, y = point.y, "click failed");
                report.error = Some(e);
                break;
            }
            tracing::info!(
                iteration,
                x = point.x,
                y = point.y,
                cell = queued.click.cell,
                source = ?queued.source,
                reason = queued.click.reason.as_deref().unwrap_or(""),
                "click executed"
            );
            report.executed.push(ExecutedClick {
                point,
                cell: queued.click.cell,
                source: queued.source.clone(),
                reason: queued.click.reason.clone(),
                executed_at: chrono::Utc::now(),
            });
        }
        report
    }
}
