//! Terminal stand-in for speech I/O
//!
//! Each line typed on stdin is one recognised transcript. An empty line, or
//! silence for the whole no-input window, counts as no input. Spoken
//! utterances are printed to stdout.

use crate::runtime::{ListenOutcome, SpeechError, SpeechService};
use async_trait::async_trait;
use std::io::Write;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};

const LINE_BUFFER: usize = 16;

pub struct ConsoleSpeech {
    lines: Mutex<mpsc::Receiver<String>>,
}

impl ConsoleSpeech {
    /// Read lines from the process's stdin
    ///
    /// Uses a detached thread, so a pending read never holds up shutdown.
    pub fn stdin() -> Self {
        let (tx, rx) = mpsc::channel(LINE_BUFFER);
        std::thread::spawn(move || {
            for line in std::io::stdin().lines() {
                match line {
                    Ok(line) => {
                        if tx.blocking_send(line).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to read console input");
                        break;
                    }
                }
            }
            tracing::debug!("Console input closed");
        });

        Self {
            lines: Mutex::new(rx),
        }
    }

    /// Next input line. `None` at end of input or when `timeout` elapses.
    pub async fn next_line(&self, timeout: Option<Duration>) -> Option<String> {
        let mut lines = self.lines.lock().await;
        match timeout {
            Some(timeout) => tokio::time::timeout(timeout, lines.recv())
                .await
                .ok()
                .flatten(),
            None => lines.recv().await,
        }
    }
}

#[async_trait]
impl SpeechService for ConsoleSpeech {
    async fn prepare(&self) -> Result<(), SpeechError> {
        // Input is already being read; only the output side can be missing
        std::io::stdout()
            .flush()
            .map_err(|e| SpeechError::Device(format!("stdout unavailable: {e}")))
    }

    async fn listen(
        &self,
        no_input_timeout: Duration,
        transcripts: mpsc::Sender<String>,
    ) -> Result<ListenOutcome, SpeechError> {
        println!("(listening...)");
        match self.next_line(Some(no_input_timeout)).await {
            Some(line) if !line.trim().is_empty() => {
                transcripts
                    .send(line.trim().to_string())
                    .await
                    .map_err(|e| SpeechError::Recognition(e.to_string()))?;
                Ok(ListenOutcome::Complete)
            }
            _ => Ok(ListenOutcome::NoInput),
        }
    }

    async fn speak(&self, text: &str) -> Result<(), SpeechError> {
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "assistant: {text}")
            .and_then(|()| stdout.flush())
            .map_err(|e| SpeechError::Synthesis(e.to_string()))
    }
}
