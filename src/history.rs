//! Conversation history
//!
//! The ordered transcript sent to the language backend on every turn.
//! Append-only, with one exception: a single system greeting may be
//! prepended once at startup.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Prefix of the system turn recording a contradiction verdict
pub const ANNOTATION_PREFIX: &str = "Contradiction analysis result:";

/// Speaker of a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One utterance in the conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// System turn carrying a contradiction verdict
    pub fn annotation(verdict: &str) -> Self {
        Self::system(format!("{ANNOTATION_PREFIX} {verdict}"))
    }

    /// Verdict text if this is a contradiction annotation
    pub fn verdict(&self) -> Option<&str> {
        if self.role != Role::System {
            return None;
        }
        self.content
            .strip_prefix(ANNOTATION_PREFIX)
            .map(str::trim_start)
    }

    pub fn is_annotation(&self) -> bool {
        self.verdict().is_some()
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HistoryError {
    #[error("History has already been seeded with a greeting")]
    AlreadySeeded,
}

/// Ordered, append-only sequence of turns
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversationHistory {
    turns: Vec<Turn>,
    seeded: bool,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prepend the startup greeting. Allowed exactly once per session.
    pub fn seed(&mut self, greeting: Turn) -> Result<(), HistoryError> {
        if self.seeded {
            return Err(HistoryError::AlreadySeeded);
        }
        self.turns.insert(0, greeting);
        self.seeded = true;
        Ok(())
    }

    pub fn append(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// Owned copy handed to collaborators at call-issue time
    pub fn snapshot(&self) -> Vec<Turn> {
        self.turns.clone()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Most recent contradiction verdict recorded in the transcript
    pub fn latest_verdict(&self) -> Option<&str> {
        self.turns.iter().rev().find_map(Turn::verdict)
    }

    /// Contents of all user turns, oldest first
    pub fn user_utterances(&self) -> Vec<String> {
        self.turns
            .iter()
            .filter(|t| t.role == Role::User)
            .map(|t| t.content.clone())
            .collect()
    }
}
