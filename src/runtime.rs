//! Runtime for executing dialogue sessions
//!
//! Owns the session, feeds events through the pure transition function and
//! executes the resulting effects. Speech and backend work runs in background
//! tasks that report back over the event channel.

mod executor;
pub mod traits;

#[cfg(test)]
pub mod testing;

pub use executor::DialogueRuntime;
pub use traits::*;

use crate::history::Turn;
use crate::state_machine::{DialogueState, Event, TransitionError};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error("Dialogue session has stopped")]
    Stopped,
}

/// Notifications for observers of a session
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DialogueUpdate {
    StateChanged { state: DialogueState },
    TurnAppended { turn: Turn },
    Error { message: String },
}

/// Handle to interact with a running session
#[derive(Clone)]
pub struct DialogueHandle {
    event_tx: mpsc::Sender<Event>,
    shutdown: CancellationToken,
}

impl DialogueHandle {
    pub async fn send(&self, event: Event) -> Result<(), RuntimeError> {
        if self.shutdown.is_cancelled() {
            return Err(RuntimeError::Stopped);
        }
        self.event_tx
            .send(event)
            .await
            .map_err(|_| RuntimeError::Stopped)
    }

    /// Deliver the "advance" signal
    pub async fn trigger(&self) -> Result<(), RuntimeError> {
        self.send(Event::Trigger).await
    }

    /// Stop the session; in-flight work is abandoned
    pub fn stop(&self) {
        self.shutdown.cancel();
    }

    pub async fn stopped(&self) {
        self.shutdown.cancelled().await;
    }
}
