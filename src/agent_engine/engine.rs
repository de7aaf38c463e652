use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::agent_engine::history::IterationRecorder;
use crate::agent_engine::iteration::Iteration;
use crate::agent_engine::loop_control::LoopController;
use crate::agent_engine::state::{LoopState, StopReason};
use crate::agent_engine::status::StatusBoard;
use crate::arbiter::arbitration::CommandArbiter;
use crate::config::{GridConfig, LoopSettings};
use crate::errors::{PointClawError, PointClawResult};
use crate::executor::action_executor::{ActionExecutor, QueuedClick};
use crate::executor::input::MouseDriver;
use crate::executor::types::ClickSource;
use crate::memory::consolidation::Consolidator;
use crate::memory::store::MemoryStore;
use crate::perception::grid::GridMapping;
use crate::perception::pipeline::capture_frame;
use crate::perception::types::{CaptureFrame, WindowInfo};
use crate::perception::window::{ScreenCapture, WindowSource};
use crate::planner::action_planner::ActionPlanner;

/// Everything the loop talks to, injected so tests can swap in fakes.
pub struct Collaborators<M: MouseDriver> {
    pub windows: Arc<dyn WindowSource>,
    pub capture: Arc<dyn ScreenCapture>,
    pub planner: ActionPlanner,
    pub consolidator: Consolidator,
    pub arbiter: Option<CommandArbiter>,
    pub mouse: M,
    pub recorder: Box<dyn IterationRecorder>,
    pub status: StatusBoard,
}

/// The capture → plan → act → remember loop for one game window.
///
/// Owns the memory store and the arbiter outright; the chat reader and the
/// status display only reach it through channels.
pub struct GameEngine<M: MouseDriver> {
    target: WindowInfo,
    grid: GridConfig,
    settings: LoopSettings,
    windows: Arc<dyn WindowSource>,
    capture: Arc<dyn ScreenCapture>,
    planner: ActionPlanner,
    consolidator: Consolidator,
    arbiter: Option<CommandArbiter>,
    executor: ActionExecutor<M>,
    memory: MemoryStore,
    recorder: Box<dyn IterationRecorder>,
    status: StatusBoard,
    control: LoopController,
    mapping: Option<GridMapping>,
}

impl<M: MouseDriver> GameEngine<M> {
    pub fn new(
        settings: LoopSettings,
        grid: GridConfig,
        target: WindowInfo,
        memory: MemoryStore,
        parts: Collaborators<M>,
    ) -> Self {
        Self {
            target,
            grid,
            executor: ActionExecutor::new(parts.mouse, settings.click_interval()),
            control: LoopController::new(settings.clone()),
            settings,
            windows: parts.windows,
            capture: parts.capture,
            planner: parts.planner,
            consolidator: parts.consolidator,
            arbiter: parts.arbiter,
            memory,
            recorder: parts.recorder,
            status: parts.status,
            mapping: None,
        }
    }

    pub fn memory(&self) -> &MemoryStore {
        &self.memory
    }

    pub fn control(&self) -> &LoopController {
        &self.control
    }

    pub fn executor(&self) -> &ActionExecutor<M> {
        &self.executor
    }

    /// Run until cancelled or until a budget or the iteration limit stops the loop.
    ///
    /// Cancellation is checked at the top of every iteration and again before
    /// the model call. A click batch that already started runs to completion.
    pub async fn run(&mut self, cancel: CancellationToken) -> StopReason {
        let model = self.planner.model_label();
        let title = self.target.title.clone();
        self.status.update(|s| {
            s.model = Some(model.clone());
            s.window_title = Some(title.clone());
        });
        self.status.set_state(LoopState::Running);
        tracing::info!(
            window = %title,
            model = %model,
            conflict_policy = self.memory.policy_name(),
            "game loop started"
        );

        let reason = loop {
            if cancel.is_cancelled() {
                break StopReason::Cancelled;
            }

            let n = self.control.begin_iteration();
            let mut it = Iteration::new(n);
            let mut frame = None;
            tracing::debug!(iteration = n, "iteration started");

            if let Some(halt) = self.step(&mut it, &mut frame, &cancel).await {
                if it.error.is_none() {
                    it.error = Some(halt.to_string());
                }
                self.record(&it, frame.as_ref());
                break halt;
            }
            if self.control.is_merge_iteration(n) && it.chat.is_none() {
                self.discard_chat(n);
            }

            self.memory.record(it.observation());
            if self.control.is_consolidation_iteration(n) {
                it.consolidated = self.consolidate(n, &cancel).await;
            }

            self.record(&it, frame.as_ref());
            self.publish(&it);

            if let Some(reason) = self.control.stop_reason() {
                break reason;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.settings.screenshot_interval()) => {}
                _ = cancel.cancelled() => {}
            }
        };

        tracing::info!(reason = %reason, iterations = self.control.iteration(), "game loop stopped");
        self.status.set_state(LoopState::Stopped { reason: reason.clone() });
        reason
    }

    /// One capture → plan → arbitrate → execute pass. Failures are written
    /// into `it` and counted; only cancellation and fatal errors return.
    async fn step(
        &mut self,
        it: &mut Iteration,
        frame_slot: &mut Option<CaptureFrame>,
        cancel: &CancellationToken,
    ) -> Option<StopReason> {
        let mapping = match self.refresh_mapping() {
            Ok(m) => m,
            Err(e) => return self.fail(it, e),
        };
        it.window = Some(mapping.window());

        let frame = match self.capture(&mapping).await {
            Ok(f) => frame_slot.insert(f),
            Err(e) => return self.fail(it, e),
        };

        if cancel.is_cancelled() {
            return Some(StopReason::Cancelled);
        }

        let reply = self.planner.request(frame, &mapping, &self.memory.digest()).await;
        it.raw_response = reply.raw;
        let plan = match reply.plan {
            Ok(p) => p,
            Err(e) => return self.fail(it, e),
        };

        let (resolved, dropped) = plan.resolve(&mapping);
        tracing::info!(iteration = it.number, plan = %plan.summary(), "action plan received");
        for d in &dropped {
            tracing::warn!(iteration = it.number, click = %d.target, error = %d.error, "click target dropped");
        }
        let mut batch: Vec<QueuedClick> = resolved
            .into_iter()
            .map(|click| QueuedClick {
                click,
                source: ClickSource::Planner,
            })
            .collect();
        it.dropped = dropped;
        it.plan = Some(plan);

        if self.control.is_merge_iteration(it.number) {
            if let Some(arbiter) = self.arbiter.as_mut() {
                let arbitration = arbiter.arbitrate(&mapping, chrono::Utc::now());
                for cmd in &arbitration.rejected {
                    tracing::info!(
                        iteration = it.number,
                        user = %cmd.source,
                        text = %cmd.raw_text,
                        reason = cmd.reject_reason.as_deref().unwrap_or(""),
                        "chat command rejected"
                    );
                }
                if let (Some(cmd), Some(click)) = (&arbitration.selected, arbitration.selected_click()) {
                    tracing::info!(
                        iteration = it.number,
                        user = %cmd.source,
                        command = %cmd.target,
                        discarded = arbitration.discarded.len(),
                        replaced = batch.len(),
                        "chat command overrides planner clicks"
                    );
                    batch = vec![QueuedClick {
                        click: click.clone(),
                        source: ClickSource::Chat {
                            user: cmd.source.clone(),
                        },
                    }];
                }
                it.chat = Some(arbitration);
            }
        }

        let report = self
            .executor
            .execute(it.number, self.windows.as_ref(), self.target.id, &mapping, &batch)
            .await;
        it.executed = report.executed;
        match report.error {
            Some(e) => self.fail(it, e),
            None => {
                self.control.record_success();
                None
            }
        }
    }

    /// A merge window that never reached arbitration still ends its cycle.
    fn discard_chat(&mut self, n: u64) {
        if let Some(arbiter) = self.arbiter.as_mut() {
            let discarded = arbiter.discard_pending();
            if discarded > 0 {
                tracing::info!(iteration = n, discarded, "iteration failed, pending chat commands discarded");
            }
        }
    }

    /// Re-query the window and recompute the grid when it moved or resized.
    fn refresh_mapping(&mut self) -> PointClawResult<GridMapping> {
        let rect = self.windows.window_rect(self.target.id)?;
        if let Some(mapping) = &self.mapping {
            if mapping.window() == rect {
                return Ok(mapping.clone());
            }
            tracing::info!(old = ?mapping.window(), new = ?rect, "target window moved or resized, recomputing grid");
        }
        let mapping = GridMapping::new(rect, self.grid.crop, self.grid.columns, self.grid.rows)?;
        self.mapping = Some(mapping.clone());
        Ok(mapping)
    }

    async fn capture(&self, mapping: &GridMapping) -> PointClawResult<CaptureFrame> {
        let capture = Arc::clone(&self.capture);
        let mapping = mapping.clone();
        let id = self.target.id;
        tokio::task::spawn_blocking(move || capture_frame(capture.as_ref(), id, &mapping))
            .await
            .map_err(|e| PointClawError::Perception(format!("capture task failed: {e}")))?
    }

    fn fail(&mut self, it: &mut Iteration, error: PointClawError) -> Option<StopReason> {
        it.error = Some(error.to_string());
        match &error {
            PointClawError::WindowUnavailable(_) => {
                self.control.record_window_lost();
                tracing::warn!(
                    iteration = it.number,
                    error = %error,
                    streak = self.control.window_streak(),
                    "target window unavailable"
                );
                None
            }
            PointClawError::Config(_) => Some(StopReason::Fatal {
                message: error.to_string(),
            }),
            _ => {
                self.control.record_failure();
                tracing::warn!(
                    iteration = it.number,
                    error = %error,
                    failures = self.control.consecutive_failures(),
                    "iteration failed"
                );
                None
            }
        }
    }

    /// All-or-nothing: the store only changes when every stage succeeded.
    /// Returns None when a stop request interrupted the attempt.
    async fn consolidate(&mut self, n: u64, cancel: &CancellationToken) -> Option<bool> {
        self.status.set_state(LoopState::Consolidating);
        let result = tokio::select! {
            r = self.consolidator.consolidate(&self.memory) => r,
            _ = cancel.cancelled() => Err(PointClawError::Cancelled),
        };
        let ok = match result {
            Ok(consolidation) => {
                let stats = self.memory.apply(consolidation, n);
                tracing::info!(
                    iteration = n,
                    rooms_added = stats.rooms_added,
                    facts_added = stats.facts_added,
                    facts_replaced = stats.facts_replaced,
                    facts = self.memory.world_map().fact_count(),
                    "memory consolidated"
                );
                Some(true)
            }
            Err(PointClawError::Cancelled) => None,
            Err(e) => {
                tracing::warn!(iteration = n, error = %e, "consolidation failed, keeping previous memory");
                Some(false)
            }
        };
        if let Some(ok) = ok {
            self.control.record_consolidation(ok);
        }
        self.status.set_state(LoopState::Running);
        ok
    }

    fn record(&mut self, it: &Iteration, frame: Option<&CaptureFrame>) {
        if let Err(e) = self.recorder.record(it, frame) {
            tracing::warn!(iteration = it.number, error = %e, "failed to write session record");
        }
    }

    fn publish(&self, it: &Iteration) {
        let digest = self.memory.digest();
        let failures = self.control.consecutive_failures();
        self.status.update(|s| {
            s.iteration = it.number;
            s.last_description = it.plan.as_ref().map(|p| p.description.clone());
            s.last_plan = it.plan.as_ref().map(|p| p.plan.clone());
            s.last_clicks = it.executed.clone();
            s.last_error = it.error.clone();
            if let Some(chat) = &it.chat {
                s.selected_chat = chat.selected.clone();
                s.rejected_chat = chat.rejected.clone();
            }
            s.narrative = digest.narrative;
            s.map = digest.map;
            s.objectives = digest.objectives;
            s.consecutive_failures = failures;
        });
    }
}
