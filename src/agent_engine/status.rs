use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::agent_engine::state::LoopState;
use crate::arbiter::command::ChatCommand;
use crate::executor::types::ExecutedClick;

/// Everything a status display needs, published after every state change
/// and every iteration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub state: LoopState,
    pub iteration: u64,
    pub model: Option<String>,
    pub window_title: Option<String>,
    pub last_description: Option<String>,
    pub last_plan: Option<String>,
    pub last_clicks: Vec<ExecutedClick>,
    pub last_error: Option<String>,
    pub selected_chat: Option<ChatCommand>,
    pub rejected_chat: Vec<ChatCommand>,
    pub narrative: String,
    pub map: String,
    pub objectives: String,
    pub consecutive_failures: u32,
    pub updated_at: DateTime<Utc>,
}

impl Default for StatusSnapshot {
    fn default() -> Self {
        Self {
            state: LoopState::SelectingWindow,
            iteration: 0,
            model: None,
            window_title: None,
            last_description: None,
            last_plan: None,
            last_clicks: Vec::new(),
            last_error: None,
            selected_chat: None,
            rejected_chat: Vec::new(),
            narrative: String::new(),
            map: String::new(),
            objectives: String::new(),
            consecutive_failures: 0,
            updated_at: Utc::now(),
        }
    }
}

/// Write side, owned by the loop. Readers never block it and only ever
/// see the latest snapshot.
pub struct StatusBoard {
    tx: watch::Sender<StatusSnapshot>,
}

/// Read side handed to displays.
#[derive(Clone)]
pub struct StatusView {
    rx: watch::Receiver<StatusSnapshot>,
}

impl StatusBoard {
    pub fn new() -> (Self, StatusView) {
        let (tx, rx) = watch::channel(StatusSnapshot::default());
        (Self { tx }, StatusView { rx })
    }

    pub fn update(&self, f: impl FnOnce(&mut StatusSnapshot)) {
        self.tx.send_modify(|snapshot| {
            f(snapshot);
            snapshot.updated_at = Utc::now();
        });
    }

    pub fn set_state(&self, state: LoopState) {
        tracing::info!(state = ?state, "loop state changed");
        self.update(|s| s.state = state);
    }
}

impl StatusView {
    pub fn latest(&self) -> StatusSnapshot {
        self.rx.borrow().clone()
    }

    /// Wait for the next publish. Returns false once the loop is gone.
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent_engine::state::StopReason;

    #[tokio::test]
    async fn test_view_sees_latest_snapshot() {
        let (board, mut view) = StatusBoard::new();
        board.set_state(LoopState::Running);
        board.update(|s| s.iteration = 4);
        assert!(view.changed().await);
        let latest = view.latest();
        assert_eq!(latest.state, LoopState::Running);
        assert_eq!(latest.iteration, 4);
    }

    #[tokio::test]
    async fn test_changed_reports_closed_board() {
        let (board, mut view) = StatusBoard::new();
        board.set_state(LoopState::Stopped {
            reason: StopReason::Cancelled,
        });
        drop(board);
        // The pending change is still delivered, then the view reports closure.
        assert!(view.changed().await);
        assert!(!view.changed().await);
        assert!(view.latest().state.is_stopped());
    }
}
