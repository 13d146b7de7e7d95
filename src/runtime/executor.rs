//! Dialogue runtime executor

use super::traits::{ListenOutcome, SpeechService};
use super::{DialogueHandle, DialogueUpdate, RuntimeError};

use crate::config::DialogueConfig;
use crate::llm::{ChatRequest, LlmError, LlmService, PredictRequest, PredictorService};
use crate::prompt;
use crate::state_machine::{
    transition, BackendCall, DialogueState, Effect, Event, SessionContext, TransitionError,
};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

const EVENT_CHANNEL_CAPACITY: usize = 64;
const UPDATE_CHANNEL_CAPACITY: usize = 128;
const TRANSCRIPT_CHANNEL_CAPACITY: usize = 16;

/// Generic dialogue runtime that can work with any speech and LLM implementations
pub struct DialogueRuntime<S, L>
where
    S: SpeechService + 'static,
    L: LlmService + 'static,
{
    context: SessionContext,
    state: DialogueState,
    config: DialogueConfig,
    speech: Arc<S>,
    llm: Arc<L>,
    /// Dedicated contradiction classifier, replaces the chat model for verdicts
    predictor: Option<Arc<dyn PredictorService>>,
    event_rx: mpsc::Receiver<Event>,
    event_tx: mpsc::Sender<Event>,
    broadcast_tx: broadcast::Sender<DialogueUpdate>,
    /// Cancelled by `DialogueHandle::stop` or a fatal error; in-flight tasks race against it
    shutdown: CancellationToken,
}

impl<S, L> DialogueRuntime<S, L>
where
    S: SpeechService + 'static,
    L: LlmService + 'static,
{
    pub fn new(session_id: impl Into<String>, config: DialogueConfig, speech: S, llm: L) -> Self {
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (broadcast_tx, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        let context = SessionContext::new(session_id)
            .with_retry_policy(config.max_attempts, config.retry_base_delay);

        Self {
            context,
            state: DialogueState::default(),
            config,
            speech: Arc::new(speech),
            llm: Arc::new(llm),
            predictor: None,
            event_rx,
            event_tx,
            broadcast_tx,
            shutdown: CancellationToken::new(),
        }
    }

    /// Route contradiction checks to a dedicated classifier
    pub fn with_predictor(mut self, predictor: Arc<dyn PredictorService>) -> Self {
        self.predictor = Some(predictor);
        self
    }

    pub fn handle(&self) -> DialogueHandle {
        DialogueHandle {
            event_tx: self.event_tx.clone(),
            shutdown: self.shutdown.clone(),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DialogueUpdate> {
        self.broadcast_tx.subscribe()
    }

    /// Drive the session until stopped. Returns the final session context.
    pub async fn run(mut self) -> Result<SessionContext, RuntimeError> {
        tracing::info!(
            session_id = %self.context.session_id,
            endpoint = %self.llm.endpoint(),
            predictor = self.predictor.is_some(),
            "Starting dialogue runtime"
        );

        self.execute_effect(Effect::PublishState);
        self.execute_effect(Effect::PrepareSpeech);

        let shutdown = self.shutdown.clone();
        loop {
            tokio::select! {
                biased;

                () = shutdown.cancelled() => break,

                Some(event) = self.event_rx.recv() => {
                    if let Err(e) = self.process_event(event) {
                        tracing::error!(
                            session_id = %self.context.session_id,
                            error = %e,
                            "Dialogue cannot continue"
                        );
                        let _ = self.broadcast_tx.send(DialogueUpdate::Error {
                            message: e.to_string(),
                        });
                        self.shutdown.cancel();
                        return Err(e);
                    }
                }
            }
        }

        tracing::info!(
            session_id = %self.context.session_id,
            state = self.state.name(),
            turns = self.context.history.len(),
            abandoned_call = self.state.awaiting_backend(),
            "Dialogue runtime stopped"
        );
        Ok(self.context)
    }

    fn process_event(&mut self, event: Event) -> Result<(), RuntimeError> {
        // Effects may generate follow-up events synchronously
        let mut events_to_process = vec![event];

        while let Some(current_event) = events_to_process.pop() {
            let event_name = current_event.name();

            // Pure state transition
            let result = match transition(&self.state, &self.context, current_event) {
                Ok(r) => r,
                Err(e) if e.is_fatal() => return Err(e.into()),
                Err(e @ (TransitionError::StaleRetry(_) | TransitionError::StaleCompletion(_))) => {
                    tracing::debug!(error = %e, "Dropping stale backend signal");
                    continue;
                }
                Err(e) => {
                    tracing::debug!(event = event_name, error = %e, "Ignoring event");
                    continue;
                }
            };

            self.state = result.new_state;

            for effect in result.effects {
                if effect.is_backend_request() {
                    tracing::debug!(
                        session_id = %self.context.session_id,
                        effect = ?effect,
                        attempt = self.current_attempt(),
                        "Issuing backend call"
                    );
                }
                if let Some(generated_event) = self.execute_effect(effect) {
                    events_to_process.push(generated_event);
                }
            }
        }

        Ok(())
    }

    /// Execute an effect and optionally return a generated event
    #[allow(clippy::too_many_lines)] // One arm per effect
    fn execute_effect(&mut self, effect: Effect) -> Option<Event> {
        match effect {
            Effect::PrepareSpeech => {
                let speech = self.speech.clone();
                self.spawn_until_shutdown(async move {
                    match speech.prepare().await {
                        Ok(()) => Event::SpeechReady,
                        Err(e) => Event::SpeechUnavailable {
                            message: e.to_string(),
                        },
                    }
                });
                None
            }

            Effect::Listen => {
                let speech = self.speech.clone();
                let event_tx = self.event_tx.clone();
                let no_input_timeout = self.config.no_input_timeout;

                self.spawn_until_shutdown(async move {
                    let (transcript_tx, mut transcript_rx) =
                        mpsc::channel(TRANSCRIPT_CHANNEL_CAPACITY);

                    // Forward transcripts until the listen call drops its sender,
                    // so every Recognized lands before the completion event
                    let forward = async {
                        while let Some(text) = transcript_rx.recv().await {
                            let _ = event_tx.send(Event::Recognized { text }).await;
                        }
                    };
                    let (outcome, ()) =
                        tokio::join!(speech.listen(no_input_timeout, transcript_tx), forward);

                    match outcome {
                        Ok(ListenOutcome::Complete) => Event::ListenComplete,
                        Ok(ListenOutcome::NoInput) => Event::NoInputTimeout,
                        Err(e) => {
                            tracing::warn!(error = %e, "Listen failed, treating as no input");
                            Event::NoInputTimeout
                        }
                    }
                });
                None
            }

            Effect::Speak { text } => {
                let speech = self.speech.clone();
                self.spawn_until_shutdown(async move {
                    if let Err(e) = speech.speak(&text).await {
                        tracing::warn!(error = %e, "Speech synthesis failed, continuing");
                    }
                    Event::SpeakFinished
                });
                None
            }

            Effect::ListModels => {
                let llm = self.llm.clone();
                let attempt = self.current_attempt();
                self.spawn_until_shutdown(async move {
                    match llm.list_models().await {
                        Ok(models) => Event::ModelsListed { models },
                        Err(e) => backend_error(BackendCall::ListModels, e, attempt),
                    }
                });
                None
            }

            Effect::RequestContradictionCheck => self.request_contradiction_check(),

            Effect::RequestReply => {
                let verdict = self
                    .context
                    .last_contradiction_verdict
                    .as_deref()
                    .or_else(|| self.context.history.latest_verdict());
                let request = ChatRequest::new(
                    &self.config.reply_model,
                    prompt::reply_messages(self.context.history.turns(), verdict),
                    self.config.reply_temperature,
                );
                let llm = self.llm.clone();
                let attempt = self.current_attempt();

                self.spawn_until_shutdown(async move {
                    match llm.chat(&request).await {
                        Ok(reply) => Event::ReplyGenerated {
                            content: reply.content,
                        },
                        Err(e) => backend_error(BackendCall::GenerateReply, e, attempt),
                    }
                });
                None
            }

            Effect::ScheduleRetry { delay, attempt } => {
                tracing::info!(
                    session_id = %self.context.session_id,
                    state = self.state.name(),
                    attempt,
                    delay_ms = %delay.as_millis(),
                    "Scheduling retry"
                );
                self.spawn_until_shutdown(async move {
                    tokio::time::sleep(delay).await;
                    Event::RetryTimeout { attempt }
                });
                None
            }

            Effect::SetAvailableModels { models } => {
                if models.is_empty() {
                    tracing::error!(
                        session_id = %self.context.session_id,
                        endpoint = %self.llm.endpoint(),
                        "No models available, continuing without them"
                    );
                }
                self.context.available_models = models;
                None
            }

            Effect::SeedGreeting { turn } => {
                match self.context.history.seed(turn.clone()) {
                    Ok(()) => {
                        let _ = self.broadcast_tx.send(DialogueUpdate::TurnAppended { turn });
                    }
                    Err(e) => tracing::warn!(error = %e, "Greeting not seeded"),
                }
                None
            }

            Effect::AppendTurn { turn } => {
                tracing::debug!(
                    session_id = %self.context.session_id,
                    role = ?turn.role,
                    index = self.context.history.len(),
                    "Appending turn"
                );
                self.context.history.append(turn.clone());
                let _ = self.broadcast_tx.send(DialogueUpdate::TurnAppended { turn });
                None
            }

            Effect::RecordVerdict { verdict } => {
                tracing::info!(
                    session_id = %self.context.session_id,
                    verdict = %verdict,
                    "Contradiction verdict recorded"
                );
                self.context.last_contradiction_verdict = Some(verdict);
                None
            }

            Effect::PublishState => {
                tracing::info!(
                    session_id = %self.context.session_id,
                    state = self.state.name(),
                    phase = ?self.state.phase(),
                    "Dialogue state changed"
                );
                let _ = self.broadcast_tx.send(DialogueUpdate::StateChanged {
                    state: self.state.clone(),
                });
                None
            }
        }
    }

    /// Issue the contradiction check against the history as it stands now
    fn request_contradiction_check(&self) -> Option<Event> {
        let attempt = self.current_attempt();

        if let Some(predictor) = &self.predictor {
            let Some(request) = PredictRequest::latest_pair(self.context.history.user_utterances())
            else {
                tracing::debug!("Fewer than two user utterances, nothing to compare");
                return Some(Event::ContradictionChecked {
                    content: Some(prompt::NO_CONTRADICTION.to_string()),
                });
            };

            let predictor = predictor.clone();
            self.spawn_until_shutdown(async move {
                match predictor.predict(&request).await {
                    Ok(content) => Event::ContradictionChecked { content },
                    Err(e) => backend_error(BackendCall::ContradictionCheck, e, attempt),
                }
            });
            return None;
        }

        let request = ChatRequest::new(
            &self.config.contradiction_model,
            self.context.history.snapshot(),
            self.config.contradiction_temperature,
        );
        let llm = self.llm.clone();
        self.spawn_until_shutdown(async move {
            match llm.chat(&request).await {
                Ok(reply) => Event::ContradictionChecked {
                    content: reply.content,
                },
                Err(e) => backend_error(BackendCall::ContradictionCheck, e, attempt),
            }
        });
        None
    }

    fn current_attempt(&self) -> u32 {
        self.state.attempt().unwrap_or(1)
    }

    /// Run a background task whose result is fed back as an event, unless
    /// the session stops first
    fn spawn_until_shutdown<F>(&self, task: F)
    where
        F: Future<Output = Event> + Send + 'static,
    {
        let event_tx = self.event_tx.clone();
        let shutdown = self.shutdown.clone();

        tokio::spawn(async move {
            tokio::select! {
                biased;

                () = shutdown.cancelled() => {
                    tracing::debug!("Background task cancelled by shutdown");
                }

                event = task => {
                    let _ = event_tx.send(event).await;
                }
            }
        });
    }
}

fn backend_error(call: BackendCall, error: LlmError, attempt: u32) -> Event {
    tracing::warn!(
        call = ?call,
        attempt,
        kind = ?error.kind,
        error = %error.message,
        "Backend call failed"
    );
    Event::BackendError {
        call,
        error_kind: error.kind,
        attempt,
    }
}
