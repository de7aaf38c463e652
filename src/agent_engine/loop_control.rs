use crate::agent_engine::state::StopReason;
use crate::config::LoopSettings;

/// Iteration counter, periodic-task predicates and failure budgets.
///
/// Periodic work is keyed on the iteration number, never on timers, so a
/// slow consolidation shifts wall-clock timing but not the schedule.
pub struct LoopController {
    settings: LoopSettings,
    iteration: u64,
    consecutive_failures: u32,
    window_streak: u32,
    consolidation_streak: u32,
}

impl LoopController {
    pub fn new(settings: LoopSettings) -> Self {
        Self {
            settings,
            iteration: 0,
            consecutive_failures: 0,
            window_streak: 0,
            consolidation_streak: 0,
        }
    }

    /// Advance and return the new 1-based iteration number.
    pub fn begin_iteration(&mut self) -> u64 {
        self.iteration += 1;
        self.iteration
    }

    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    pub fn is_merge_iteration(&self, n: u64) -> bool {
        n > 0 && n % self.settings.chat_merge_every.max(1) == 0
    }

    pub fn is_consolidation_iteration(&self, n: u64) -> bool {
        n > 0 && n % self.settings.consolidation_every.max(1) == 0
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn window_streak(&self) -> u32 {
        self.window_streak
    }

    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
        self.window_streak = 0;
    }

    /// Any transient failure other than a lost window.
    pub fn record_failure(&mut self) {
        self.consecutive_failures += 1;
        self.window_streak = 0;
    }

    /// Window unavailable. Counts against both budgets.
    pub fn record_window_lost(&mut self) {
        self.consecutive_failures += 1;
        self.window_streak += 1;
    }

    pub fn record_consolidation(&mut self, ok: bool) {
        if ok {
            self.consolidation_streak = 0;
        } else {
            self.consolidation_streak += 1;
        }
    }

    /// Budget or limit that forces `Stopped`, if any.
    pub fn stop_reason(&self) -> Option<StopReason> {
        if self.settings.window_retry_budget > 0 && self.window_streak >= self.settings.window_retry_budget {
            return Some(StopReason::WindowLost {
                attempts: self.window_streak,
            });
        }
        if self.settings.max_consecutive_failures > 0
            && self.consecutive_failures >= self.settings.max_consecutive_failures
        {
            return Some(StopReason::FailureBudget {
                failures: self.consecutive_failures,
            });
        }
        if self.settings.max_consolidation_failures > 0
            && self.consolidation_streak >= self.settings.max_consolidation_failures
        {
            return Some(StopReason::ConsolidationFailures {
                failures: self.consolidation_streak,
            });
        }
        match self.settings.max_iterations {
            Some(max) if self.iteration >= max => Some(StopReason::IterationLimit { iterations: max }),
            _ => None,
        }
    }
}
