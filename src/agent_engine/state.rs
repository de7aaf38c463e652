use serde::{Deserialize, Serialize};

/// Lifecycle states of the game loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LoopState {
    SelectingWindow,
    SelectingModel,
    Running,
    Consolidating,
    Stopped { reason: StopReason },
}

impl LoopState {
    pub fn is_stopped(&self) -> bool {
        matches!(self, LoopState::Stopped { .. })
    }
}

/// Why the loop reached `Stopped`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum StopReason {
    /// Stop signal from the user.
    Cancelled,
    /// `loop.max_iterations` reached.
    IterationLimit { iterations: u64 },
    /// The target window stayed unavailable for too many iterations in a row.
    WindowLost { attempts: u32 },
    /// Too many consecutive failed iterations.
    FailureBudget { failures: u32 },
    /// Consolidation kept failing.
    ConsolidationFailures { failures: u32 },
    /// Unrecoverable configuration or programming error.
    Fatal { message: String },
}

impl StopReason {
    /// Normal stops exit 0; everything else is an error exit.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, StopReason::Cancelled | StopReason::IterationLimit { .. })
    }
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopReason::Cancelled => write!(f, "stopped by user"),
            StopReason::IterationLimit { iterations } => write!(f, "iteration limit of {iterations} reached"),
            StopReason::WindowLost { attempts } => {
                write!(f, "target window unavailable for {attempts} consecutive iterations")
            }
            StopReason::FailureBudget { failures } => write!(f, "{failures} consecutive iterations failed"),
            StopReason::ConsolidationFailures { failures } => {
                write!(f, "memory consolidation failed {failures} times in a row")
            }
            StopReason::Fatal { message } => write!(f, "fatal error: {message}"),
        }
    }
}
