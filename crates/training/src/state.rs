use std::fmt;

/// Lifecycle of one training run. `Failed` is reachable from every state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainingState {
    Initialized,
    Splitting,
    EpochRunning { epoch: usize },
    Validating { epoch: usize },
    Checkpointing { epoch: usize },
    Completed,
    Failed,
}

impl TrainingState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TrainingState::Completed | TrainingState::Failed)
    }
}

impl fmt::Display for TrainingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrainingState::Initialized => write!(f, "initializing"),
            TrainingState::Splitting => write!(f, "splitting the dataset"),
            TrainingState::EpochRunning { epoch } => write!(f, "training epoch {epoch}"),
            TrainingState::Validating { epoch } => write!(f, "validating epoch {epoch}"),
            TrainingState::Checkpointing { epoch } => write!(f, "checkpointing epoch {epoch}"),
            TrainingState::Completed => write!(f, "completed"),
            TrainingState::Failed => write!(f, "failed"),
        }
    }
}
