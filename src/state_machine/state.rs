//! Dialogue state types

use crate::history::ConversationHistory;
use serde::{Deserialize, Serialize};
use std::time::Duration;

// ============================================================================
// Dialogue State
// ============================================================================

/// Dialogue state
///
/// Grouped in two phases. Setup: `Preparing`, `GetModels`. Dialogue loop:
/// `Greeting`, `SpeakGreeting`, `Listening`, `ContradictionCheck`,
/// `GenerateReply`, `Speaking`. There is no terminal state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DialogueState {
    /// Speech devices are being prepared
    #[default]
    Preparing,

    /// Model listing in flight, with retry tracking
    GetModels { attempt: u32 },

    /// History seeded, waiting for the user to start the dialogue
    Greeting { greeting: String },

    /// Greeting is being spoken
    SpeakGreeting,

    /// Listening for the user's turn
    Listening {
        /// Latest transcript recognised during this listen cycle
        #[serde(default)]
        transcript: Option<String>,
    },

    /// Contradiction check in flight
    ContradictionCheck { attempt: u32 },

    /// Reply generation in flight
    GenerateReply { attempt: u32 },

    /// Assistant reply is being spoken
    Speaking { utterance: String },
}

/// Coarse grouping of states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Setup,
    Dialogue,
}

impl DialogueState {
    pub fn listening() -> Self {
        DialogueState::Listening { transcript: None }
    }

    pub fn phase(&self) -> Phase {
        match self {
            DialogueState::Preparing | DialogueState::GetModels { .. } => Phase::Setup,
            _ => Phase::Dialogue,
        }
    }

    /// Short name for logs and notifications
    pub fn name(&self) -> &'static str {
        match self {
            DialogueState::Preparing => "preparing",
            DialogueState::GetModels { .. } => "get_models",
            DialogueState::Greeting { .. } => "greeting",
            DialogueState::SpeakGreeting => "speak_greeting",
            DialogueState::Listening { .. } => "listening",
            DialogueState::ContradictionCheck { .. } => "contradiction_check",
            DialogueState::GenerateReply { .. } => "generate_reply",
            DialogueState::Speaking { .. } => "speaking",
        }
    }

    /// Whether a language backend call is outstanding
    pub fn awaiting_backend(&self) -> bool {
        matches!(
            self,
            DialogueState::GetModels { .. }
                | DialogueState::ContradictionCheck { .. }
                | DialogueState::GenerateReply { .. }
        )
    }

    /// Retry attempt of the outstanding backend call, if any
    pub fn attempt(&self) -> Option<u32> {
        match self {
            DialogueState::GetModels { attempt }
            | DialogueState::ContradictionCheck { attempt }
            | DialogueState::GenerateReply { attempt } => Some(*attempt),
            _ => None,
        }
    }
}

// ============================================================================
// Session Context
// ============================================================================

/// Working data of a dialogue session
///
/// Read by the transition function, mutated only by the runtime when it
/// applies effects.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub session_id: String,
    pub available_models: Vec<String>,
    pub history: ConversationHistory,
    pub last_contradiction_verdict: Option<String>,
    /// Retry ceiling for backend calls
    pub max_attempts: u32,
    /// Delay before the first retry, doubled on each further attempt
    pub retry_base_delay: Duration,
}

/// Default retry ceiling for backend calls
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

pub const DEFAULT_RETRY_BASE_DELAY: Duration = Duration::from_secs(1);

impl SessionContext {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            available_models: Vec::new(),
            history: ConversationHistory::new(),
            last_contradiction_verdict: None,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_base_delay: DEFAULT_RETRY_BASE_DELAY,
        }
    }

    pub fn with_retry_policy(mut self, max_attempts: u32, base_delay: Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.retry_base_delay = base_delay;
        self
    }
}
