//! Pure state transition function
//!
//! Given the current state, a read-only view of the session and one event,
//! produce the next state and the effects the runtime must execute. No I/O.

use super::event::BackendCall;
use super::{DialogueState, Effect, Event, SessionContext};
use crate::history::Turn;
use crate::llm::LlmErrorKind;
use crate::prompt;
use std::time::Duration;
use thiserror::Error;

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub new_state: DialogueState,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(state: DialogueState) -> Self {
        Self {
            new_state: state,
            effects: vec![],
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    pub fn with_effects(mut self, effects: impl IntoIterator<Item = Effect>) -> Self {
        self.effects.extend(effects);
        self
    }
}

/// Errors that can occur during transition
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("Speech service unavailable: {0}")]
    SpeechUnavailable(String),
    #[error("Stale retry timer for attempt {0}")]
    StaleRetry(u32),
    #[error("Stale backend failure from attempt {0}")]
    StaleCompletion(u32),
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),
}

impl TransitionError {
    /// Errors after which the session cannot continue
    pub fn is_fatal(&self) -> bool {
        matches!(self, TransitionError::SpeechUnavailable(_))
    }
}

/// Pure transition function
#[allow(clippy::too_many_lines)] // One arm per row of the transition table
pub fn transition(
    state: &DialogueState,
    context: &SessionContext,
    event: Event,
) -> Result<TransitionResult, TransitionError> {
    match (state, event) {
        // ============================================================
        // Setup
        // ============================================================

        (DialogueState::Preparing, Event::SpeechReady) => {
            Ok(TransitionResult::new(DialogueState::GetModels { attempt: 1 })
                .with_effect(Effect::PublishState)
                .with_effect(Effect::ListModels))
        }

        (DialogueState::Preparing, Event::SpeechUnavailable { message }) => {
            Err(TransitionError::SpeechUnavailable(message))
        }

        (DialogueState::GetModels { .. }, Event::ModelsListed { models }) => Ok(greet(models)),

        // Failures from an attempt that is no longer outstanding
        (state, Event::BackendError { attempt, .. })
            if state.attempt().is_some_and(|current| current != attempt) =>
        {
            Err(TransitionError::StaleCompletion(attempt))
        }

        (
            DialogueState::GetModels { attempt },
            Event::BackendError {
                call: BackendCall::ListModels,
                error_kind,
                ..
            },
        ) => Ok(retry_or_else(
            *attempt,
            error_kind,
            context,
            |attempt| DialogueState::GetModels { attempt },
            || greet(vec![]),
        )),

        // ============================================================
        // Greeting
        // ============================================================

        (DialogueState::Greeting { greeting }, Event::Trigger) => {
            Ok(TransitionResult::new(DialogueState::SpeakGreeting)
                .with_effect(Effect::PublishState)
                .with_effect(Effect::speak(greeting.clone())))
        }

        (DialogueState::SpeakGreeting | DialogueState::Speaking { .. }, Event::SpeakFinished) => {
            Ok(TransitionResult::new(DialogueState::listening())
                .with_effect(Effect::PublishState)
                .with_effect(Effect::Listen))
        }

        // ============================================================
        // Listening
        // ============================================================

        // Transcripts accumulate; only listen-complete or no-input advance
        (DialogueState::Listening { .. }, Event::Recognized { text }) => Ok(TransitionResult::new(
            DialogueState::Listening {
                transcript: Some(text),
            },
        )
        .with_effect(Effect::PublishState)),

        (DialogueState::Listening { transcript }, Event::ListenComplete) => {
            Ok(close_listen(transcript.clone().unwrap_or_default()))
        }

        // Interim transcripts are discarded when the no-input window closes
        (DialogueState::Listening { .. }, Event::NoInputTimeout) => Ok(close_listen(String::new())),

        // ============================================================
        // Contradiction check
        // ============================================================

        (DialogueState::ContradictionCheck { .. }, Event::ContradictionChecked { content }) => {
            Ok(record_verdict(prompt::normalize_verdict(content.as_deref())))
        }

        (
            DialogueState::ContradictionCheck { attempt },
            Event::BackendError {
                call: BackendCall::ContradictionCheck,
                error_kind,
                ..
            },
        ) => Ok(retry_or_else(
            *attempt,
            error_kind,
            context,
            |attempt| DialogueState::ContradictionCheck { attempt },
            || record_verdict(prompt::UNKNOWN_VERDICT.to_string()),
        )),

        // ============================================================
        // Reply generation
        // ============================================================

        (DialogueState::GenerateReply { .. }, Event::ReplyGenerated { content }) => {
            Ok(speak_reply(prompt::normalize_reply(content.as_deref())))
        }

        (
            DialogueState::GenerateReply { attempt },
            Event::BackendError {
                call: BackendCall::GenerateReply,
                error_kind,
                ..
            },
        ) => Ok(retry_or_else(
            *attempt,
            error_kind,
            context,
            |attempt| DialogueState::GenerateReply { attempt },
            || speak_reply(prompt::APOLOGY.to_string()),
        )),

        // ============================================================
        // Retry timers
        // ============================================================

        (state, Event::RetryTimeout { attempt }) if state.attempt() == Some(attempt) => {
            let request = match state {
                DialogueState::GetModels { .. } => Effect::ListModels,
                DialogueState::ContradictionCheck { .. } => Effect::RequestContradictionCheck,
                _ => Effect::RequestReply,
            };
            Ok(TransitionResult::new(state.clone()).with_effect(request))
        }

        (_, Event::RetryTimeout { attempt }) => Err(TransitionError::StaleRetry(attempt)),

        // ============================================================
        // Invalid Transitions
        // ============================================================

        (state, event) => Err(TransitionError::InvalidTransition(format!(
            "No transition from {} with event {}",
            state.name(),
            event.name()
        ))),
    }
}

// Helper functions

fn close_listen(content: String) -> TransitionResult {
    TransitionResult::new(DialogueState::ContradictionCheck { attempt: 1 })
        .with_effect(Effect::append(Turn::user(content)))
        .with_effect(Effect::PublishState)
        .with_effect(Effect::RequestContradictionCheck)
}

fn greet(models: Vec<String>) -> TransitionResult {
    let greeting = prompt::greeting(&models);
    TransitionResult::new(DialogueState::Greeting {
        greeting: greeting.clone(),
    })
    .with_effect(Effect::SetAvailableModels { models })
    .with_effect(Effect::SeedGreeting {
        turn: Turn::system(greeting),
    })
    .with_effect(Effect::PublishState)
}

fn record_verdict(verdict: String) -> TransitionResult {
    TransitionResult::new(DialogueState::GenerateReply { attempt: 1 })
        .with_effect(Effect::append(Turn::annotation(&verdict)))
        .with_effect(Effect::RecordVerdict { verdict })
        .with_effect(Effect::PublishState)
        .with_effect(Effect::RequestReply)
}

fn speak_reply(reply: String) -> TransitionResult {
    TransitionResult::new(DialogueState::Speaking {
        utterance: reply.clone(),
    })
    .with_effect(Effect::append(Turn::assistant(reply.clone())))
    .with_effect(Effect::PublishState)
    .with_effect(Effect::speak(reply))
}

/// Retry a failed backend call, or fall back once retries are exhausted
fn retry_or_else(
    attempt: u32,
    error_kind: LlmErrorKind,
    context: &SessionContext,
    retry_state: impl FnOnce(u32) -> DialogueState,
    fallback: impl FnOnce() -> TransitionResult,
) -> TransitionResult {
    if error_kind.is_retryable() && attempt < context.max_attempts {
        let next = attempt + 1;
        TransitionResult::new(retry_state(next)).with_effects([
            Effect::PublishState,
            Effect::ScheduleRetry {
                delay: retry_delay(context.retry_base_delay, next),
                attempt: next,
            },
        ])
    } else {
        fallback()
    }
}

/// Exponential backoff: base, 2x base, 4x base, ...
pub(crate) fn retry_delay(base: Duration, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(2).min(16);
    base.saturating_mul(1 << exponent)
}
