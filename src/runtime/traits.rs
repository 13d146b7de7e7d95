//! Trait abstractions for runtime I/O
//!
//! These traits enable testing the executor with mock implementations.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SpeechError {
    #[error("Speech device unavailable: {0}")]
    Device(String),
    #[error("Speech recognition failed: {0}")]
    Recognition(String),
    #[error("Speech synthesis failed: {0}")]
    Synthesis(String),
}

/// How a listen cycle ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenOutcome {
    /// Recognition finished normally
    Complete,
    /// Nothing was heard within the no-input window
    NoInput,
}

/// Speech capture and synthesis
#[async_trait]
pub trait SpeechService: Send + Sync {
    /// Negotiate audio devices. Resolves when ready.
    async fn prepare(&self) -> Result<(), SpeechError>;

    /// Listen for one user turn.
    ///
    /// Every transcript recognised along the way is sent on `transcripts`;
    /// the sender must not outlive the call.
    async fn listen(
        &self,
        no_input_timeout: Duration,
        transcripts: mpsc::Sender<String>,
    ) -> Result<ListenOutcome, SpeechError>;

    /// Speak an utterance. Resolves when playback has finished.
    async fn speak(&self, text: &str) -> Result<(), SpeechError>;
}

// ============================================================================
// Arc implementations for trait objects
// ============================================================================

#[async_trait]
impl<T: SpeechService + ?Sized> SpeechService for Arc<T> {
    async fn prepare(&self) -> Result<(), SpeechError> {
        (**self).prepare().await
    }

    async fn listen(
        &self,
        no_input_timeout: Duration,
        transcripts: mpsc::Sender<String>,
    ) -> Result<ListenOutcome, SpeechError> {
        (**self).listen(no_input_timeout, transcripts).await
    }

    async fn speak(&self, text: &str) -> Result<(), SpeechError> {
        (**self).speak(text).await
    }
}
