//! Effects produced by state transitions

use crate::history::Turn;
use std::time::Duration;

/// Effects to be executed after state transition
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Prepare the speech devices
    PrepareSpeech,

    /// Start a listen cycle
    Listen,

    /// Speak an utterance
    Speak { text: String },

    /// Query the backend for available models
    ListModels,

    /// Run the contradiction check against a history snapshot
    RequestContradictionCheck,

    /// Generate a reply from a history snapshot
    RequestReply,

    /// Schedule a retry of the outstanding backend call
    ScheduleRetry { delay: Duration, attempt: u32 },

    /// Store the discovered model names
    SetAvailableModels { models: Vec<String> },

    /// Prepend the greeting to history
    SeedGreeting { turn: Turn },

    /// Append a turn to history
    AppendTurn { turn: Turn },

    /// Remember the latest contradiction verdict
    RecordVerdict { verdict: String },

    /// Notify subscribers of the new state
    PublishState,
}

impl Effect {
    pub fn append(turn: Turn) -> Self {
        Effect::AppendTurn { turn }
    }

    pub fn speak(text: impl Into<String>) -> Self {
        Effect::Speak { text: text.into() }
    }

    /// Whether this effect issues a language backend call
    pub fn is_backend_request(&self) -> bool {
        matches!(
            self,
            Effect::ListModels | Effect::RequestContradictionCheck | Effect::RequestReply
        )
    }
}
