//! Mock implementations for testing
//!
//! These mocks enable integration testing without real I/O.

use super::traits::*;
use crate::llm::{ChatReply, ChatRequest, LlmError, LlmService, PredictRequest, PredictorService};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::{mpsc, Notify};

// ============================================================================
// Mock Speech
// ============================================================================

/// One scripted listen cycle
#[derive(Debug, Clone)]
pub struct ListenScript {
    pub transcripts: Vec<String>,
    pub outcome: Result<ListenOutcome, SpeechError>,
}

impl ListenScript {
    /// The user says one thing and recognition completes
    pub fn says(text: impl Into<String>) -> Self {
        Self {
            transcripts: vec![text.into()],
            outcome: Ok(ListenOutcome::Complete),
        }
    }

    /// Nothing is heard before the no-input window closes
    pub fn silent() -> Self {
        Self {
            transcripts: vec![],
            outcome: Ok(ListenOutcome::NoInput),
        }
    }
}

/// Mock speech service with scripted listen cycles
///
/// Once the script is exhausted, `listen` never returns, like a user who
/// has walked away.
pub struct MockSpeech {
    prepare_error: Option<SpeechError>,
    listens: Mutex<VecDeque<ListenScript>>,
    /// Record of every spoken utterance
    pub spoken: Mutex<Vec<String>>,
    idle: Notify,
}

#[allow(dead_code)]
impl MockSpeech {
    pub fn new() -> Self {
        Self {
            prepare_error: None,
            listens: Mutex::new(VecDeque::new()),
            spoken: Mutex::new(Vec::new()),
            idle: Notify::new(),
        }
    }

    pub fn failing_prepare(message: impl Into<String>) -> Self {
        Self {
            prepare_error: Some(SpeechError::Device(message.into())),
            ..Self::new()
        }
    }

    pub fn with_listen(self, script: ListenScript) -> Self {
        self.listens.lock().unwrap().push_back(script);
        self
    }

    pub fn spoken(&self) -> Vec<String> {
        self.spoken.lock().unwrap().clone()
    }

    /// Resolves once a listen cycle finds the script exhausted
    pub async fn wait_idle(&self) {
        self.idle.notified().await;
    }
}

impl Default for MockSpeech {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SpeechService for MockSpeech {
    async fn prepare(&self) -> Result<(), SpeechError> {
        match &self.prepare_error {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    async fn listen(
        &self,
        _no_input_timeout: Duration,
        transcripts: mpsc::Sender<String>,
    ) -> Result<ListenOutcome, SpeechError> {
        let script = self.listens.lock().unwrap().pop_front();
        let Some(script) = script else {
            self.idle.notify_one();
            return std::future::pending().await;
        };

        for text in script.transcripts {
            let _ = transcripts.send(text).await;
        }
        script.outcome
    }

    async fn speak(&self, text: &str) -> Result<(), SpeechError> {
        self.spoken.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

// ============================================================================
// Mock LLM
// ============================================================================

/// Mock chat backend that returns queued responses
pub struct MockLlm {
    model_lists: Mutex<VecDeque<Result<Vec<String>, LlmError>>>,
    replies: Mutex<VecDeque<Result<ChatReply, LlmError>>>,
    /// Record of all chat requests made
    pub requests: Mutex<Vec<ChatRequest>>,
}

#[allow(dead_code)]
impl MockLlm {
    pub fn new() -> Self {
        Self {
            model_lists: Mutex::new(VecDeque::new()),
            replies: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn queue_models(&self, models: &[&str]) {
        let models = models.iter().map(ToString::to_string).collect();
        self.model_lists.lock().unwrap().push_back(Ok(models));
    }

    pub fn queue_models_error(&self, error: LlmError) {
        self.model_lists.lock().unwrap().push_back(Err(error));
    }

    /// Queue a chat response with the given content
    pub fn queue_text(&self, text: &str) {
        self.replies
            .lock()
            .unwrap()
            .push_back(Ok(ChatReply::text(text)));
    }

    pub fn queue_reply(&self, reply: ChatReply) {
        self.replies.lock().unwrap().push_back(Ok(reply));
    }

    pub fn queue_error(&self, error: LlmError) {
        self.replies.lock().unwrap().push_back(Err(error));
    }

    pub fn recorded_requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Default for MockLlm {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmService for MockLlm {
    async fn list_models(&self) -> Result<Vec<String>, LlmError> {
        self.model_lists
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::network("No mock model list queued")))
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatReply, LlmError> {
        self.requests.lock().unwrap().push(request.clone());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::network("No mock response queued")))
    }

    fn endpoint(&self) -> &str {
        "mock://llm"
    }
}

// ============================================================================
// Mock Predictor
// ============================================================================

/// Mock contradiction classifier
pub struct MockPredictor {
    predictions: Mutex<VecDeque<Result<Option<String>, LlmError>>>,
    pub requests: Mutex<Vec<PredictRequest>>,
}

#[allow(dead_code)]
impl MockPredictor {
    pub fn new() -> Self {
        Self {
            predictions: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn queue_prediction(&self, prediction: &str) {
        self.predictions
            .lock()
            .unwrap()
            .push_back(Ok(Some(prediction.to_string())));
    }

    pub fn queue_error(&self, error: LlmError) {
        self.predictions.lock().unwrap().push_back(Err(error));
    }

    pub fn recorded_requests(&self) -> Vec<PredictRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Default for MockPredictor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PredictorService for MockPredictor {
    async fn predict(&self, request: &PredictRequest) -> Result<Option<String>, LlmError> {
        self.requests.lock().unwrap().push(request.clone());
        self.predictions
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::network("No mock prediction queued")))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DialogueConfig;
    use crate::history::Turn;
    use crate::prompt;
    use crate::runtime::{DialogueHandle, DialogueRuntime, DialogueUpdate, RuntimeError};
    use crate::state_machine::{DialogueState, SessionContext, TransitionError};
    use std::sync::Arc;
    use tokio::sync::broadcast;
    use tokio::task::JoinHandle;

    const WAIT: Duration = Duration::from_secs(5);

    fn test_config() -> DialogueConfig {
        DialogueConfig {
            no_input_timeout: Duration::from_millis(50),
            retry_base_delay: Duration::from_millis(5),
            ..DialogueConfig::default()
        }
    }

    struct TestSession {
        handle: DialogueHandle,
        updates: broadcast::Receiver<DialogueUpdate>,
        task: JoinHandle<Result<SessionContext, RuntimeError>>,
    }

    fn start(
        speech: &Arc<MockSpeech>,
        llm: &Arc<MockLlm>,
        predictor: Option<Arc<MockPredictor>>,
    ) -> TestSession {
        let mut runtime =
            DialogueRuntime::new("test-session", test_config(), speech.clone(), llm.clone());
        if let Some(predictor) = predictor {
            runtime = runtime.with_predictor(predictor);
        }

        let handle = runtime.handle();
        let updates = runtime.subscribe();
        let task = tokio::spawn(runtime.run());
        TestSession {
            handle,
            updates,
            task,
        }
    }

    async fn wait_for_state(
        updates: &mut broadcast::Receiver<DialogueUpdate>,
        predicate: impl Fn(&DialogueState) -> bool,
    ) -> DialogueState {
        tokio::time::timeout(WAIT, async {
            loop {
                match updates.recv().await {
                    Ok(DialogueUpdate::StateChanged { state }) if predicate(&state) => {
                        return state
                    }
                    Ok(_) => {}
                    Err(e) => panic!("Update stream ended: {e}"),
                }
            }
        })
        .await
        .expect("Timed out waiting for state")
    }

    /// Wait for the greeting and press the trigger
    async fn begin(session: &mut TestSession) -> String {
        let state = wait_for_state(&mut session.updates, |s| {
            matches!(s, DialogueState::Greeting { .. })
        })
        .await;
        session.handle.trigger().await.unwrap();
        match state {
            DialogueState::Greeting { greeting } => greeting,
            other => panic!("Expected Greeting, got {other:?}"),
        }
    }

    /// Wait until the scripted user goes quiet, then stop the session
    async fn finish(session: TestSession, speech: &MockSpeech) -> SessionContext {
        tokio::time::timeout(WAIT, speech.wait_idle())
            .await
            .expect("Timed out waiting for the dialogue to go idle");
        session.handle.stop();
        session.task.await.unwrap().unwrap()
    }

    fn assert_temperature(request: &ChatRequest, expected: f32) {
        assert!(
            (request.temperature - expected).abs() < f32::EPSILON,
            "temperature {} != {expected}",
            request.temperature
        );
    }

    #[tokio::test]
    async fn test_mock_llm() {
        let mock = MockLlm::new();
        mock.queue_text("Hello");

        let request = ChatRequest::new("llama3:latest", vec![Turn::user("hi")], 0.8);
        assert_eq!(mock.chat(&request).await.unwrap(), ChatReply::text("Hello"));

        // Second call should fail (no more responses)
        assert!(mock.chat(&request).await.is_err());
        assert_eq!(mock.recorded_requests().len(), 2);
    }

    #[tokio::test]
    async fn test_mock_speech_script() {
        let speech = MockSpeech::new().with_listen(ListenScript::says("hello"));
        let (tx, mut rx) = mpsc::channel(4);

        let outcome = speech.listen(Duration::from_secs(1), tx).await.unwrap();
        assert_eq!(outcome, ListenOutcome::Complete);
        assert_eq!(rx.recv().await.as_deref(), Some("hello"));
        assert_eq!(rx.recv().await, None);
    }

    /// Integration test: one full cycle through every dialogue state
    #[tokio::test]
    async fn test_round_trip() {
        let speech = Arc::new(MockSpeech::new().with_listen(ListenScript::says("hello")));
        let llm = Arc::new(MockLlm::new());
        llm.queue_models(&["llama3:latest"]);
        llm.queue_text("no_contradiction");
        llm.queue_text("Hi there!");

        let mut session = start(&speech, &llm, None);
        let greeting = begin(&mut session).await;
        assert_eq!(greeting, "Hello! The models are llama3:latest");

        let context = finish(session, &speech).await;

        assert_eq!(
            speech.spoken(),
            vec!["Hello! The models are llama3:latest", "Hi there!"]
        );
        assert_eq!(
            context.history.turns(),
            &[
                Turn::system("Hello! The models are llama3:latest"),
                Turn::user("hello"),
                Turn::annotation("no_contradiction"),
                Turn::assistant("Hi there!"),
            ]
        );
        assert_eq!(context.available_models, vec!["llama3:latest"]);
        assert_eq!(
            context.last_contradiction_verdict.as_deref(),
            Some("no_contradiction")
        );
    }

    #[tokio::test]
    async fn test_backend_requests_use_snapshots() {
        let speech = Arc::new(MockSpeech::new().with_listen(ListenScript::says("hello")));
        let llm = Arc::new(MockLlm::new());
        llm.queue_models(&["llama3:latest"]);
        llm.queue_text("Contradiction");
        llm.queue_text("Hi there!");

        let mut session = start(&speech, &llm, None);
        begin(&mut session).await;
        finish(session, &speech).await;

        let requests = llm.recorded_requests();
        assert_eq!(requests.len(), 2);

        // Contradiction check sees the history including the new user turn
        let check = &requests[0];
        assert_eq!(check.model, "contradiction-model:latest");
        assert_temperature(check, 0.0);
        assert_eq!(
            check.messages,
            vec![
                Turn::system("Hello! The models are llama3:latest"),
                Turn::user("hello"),
            ]
        );

        // Reply request carries the verdict instruction but not the annotation
        let reply = &requests[1];
        assert_eq!(reply.model, "llama3:latest");
        assert_temperature(reply, 0.8);
        assert_eq!(
            reply.messages,
            vec![
                prompt::reply_instruction(Some("contradiction")),
                Turn::system("Hello! The models are llama3:latest"),
                Turn::user("hello"),
            ]
        );
    }

    #[tokio::test]
    async fn test_latest_transcript_wins() {
        let script = ListenScript {
            transcripts: vec!["hel".to_string(), "hello there".to_string()],
            outcome: Ok(ListenOutcome::Complete),
        };
        let speech = Arc::new(MockSpeech::new().with_listen(script));
        let llm = Arc::new(MockLlm::new());
        llm.queue_models(&["llama3:latest"]);
        llm.queue_text("no_contradiction");
        llm.queue_text("Hello!");

        let mut session = start(&speech, &llm, None);
        begin(&mut session).await;
        let context = finish(session, &speech).await;

        assert_eq!(context.history.turns()[1], Turn::user("hello there"));
    }

    #[tokio::test]
    async fn test_two_silent_cycles_append_two_turns() {
        let speech = Arc::new(
            MockSpeech::new()
                .with_listen(ListenScript::silent())
                .with_listen(ListenScript::silent()),
        );
        let llm = Arc::new(MockLlm::new());
        llm.queue_models(&["llama3:latest"]);
        llm.queue_text("no_contradiction");
        llm.queue_text("Are you there?");
        llm.queue_text("no_contradiction");
        llm.queue_text("Take your time.");

        let mut session = start(&speech, &llm, None);
        begin(&mut session).await;
        let context = finish(session, &speech).await;

        let turns = context.history.turns();
        assert_eq!(turns.len(), 7);
        assert_eq!(turns[1], Turn::user(""));
        assert_eq!(turns[4], Turn::user(""));
        assert_eq!(turns[6], Turn::assistant("Take your time."));
        assert_eq!(speech.spoken().len(), 3);
    }

    #[tokio::test]
    async fn test_listen_error_counts_as_silence() {
        let script = ListenScript {
            transcripts: vec![],
            outcome: Err(SpeechError::Recognition("microphone unplugged".to_string())),
        };
        let speech = Arc::new(MockSpeech::new().with_listen(script));
        let llm = Arc::new(MockLlm::new());
        llm.queue_models(&["llama3:latest"]);
        llm.queue_text("no_contradiction");
        llm.queue_text("Sorry, I didn't catch that.");

        let mut session = start(&speech, &llm, None);
        begin(&mut session).await;
        let context = finish(session, &speech).await;

        assert_eq!(context.history.turns()[1], Turn::user(""));
        assert_eq!(context.history.len(), 4);
    }

    #[tokio::test]
    async fn test_model_listing_retries_then_succeeds() {
        let speech = Arc::new(MockSpeech::new());
        let llm = Arc::new(MockLlm::new());
        llm.queue_models_error(LlmError::server_error("loading"));
        llm.queue_models(&["llama3:latest", "mistral:7b"]);

        let mut session = start(&speech, &llm, None);
        let state = wait_for_state(&mut session.updates, |s| {
            matches!(s, DialogueState::Greeting { .. })
        })
        .await;
        assert_eq!(
            state,
            DialogueState::Greeting {
                greeting: "Hello! The models are llama3:latest mistral:7b".to_string()
            }
        );

        session.handle.stop();
        let context = session.task.await.unwrap().unwrap();
        assert_eq!(context.available_models, vec!["llama3:latest", "mistral:7b"]);
        assert_eq!(context.history.len(), 1);
    }

    #[tokio::test]
    async fn test_model_listing_gives_up_with_empty_list() {
        let speech = Arc::new(MockSpeech::new());
        let llm = Arc::new(MockLlm::new());
        for _ in 0..3 {
            llm.queue_models_error(LlmError::network("connection refused"));
        }

        let mut session = start(&speech, &llm, None);
        let state = wait_for_state(&mut session.updates, |s| {
            matches!(s, DialogueState::Greeting { .. })
        })
        .await;
        assert_eq!(
            state,
            DialogueState::Greeting {
                greeting: "Hello! No models were found.".to_string()
            }
        );

        session.handle.stop();
        let context = session.task.await.unwrap().unwrap();
        assert!(context.available_models.is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_reply_backend_apologizes() {
        let speech = Arc::new(MockSpeech::new().with_listen(ListenScript::says("hello")));
        let llm = Arc::new(MockLlm::new());
        llm.queue_models(&["llama3:latest"]);
        llm.queue_text("no_contradiction");
        for _ in 0..3 {
            llm.queue_error(LlmError::server_error("overloaded"));
        }

        let mut session = start(&speech, &llm, None);
        begin(&mut session).await;
        let context = finish(session, &speech).await;

        // One contradiction check plus three reply attempts
        assert_eq!(llm.recorded_requests().len(), 4);
        assert_eq!(context.history.turns().last(), Some(&Turn::assistant(prompt::APOLOGY)));
        assert_eq!(speech.spoken().last().map(String::as_str), Some(prompt::APOLOGY));
    }

    #[tokio::test]
    async fn test_non_retryable_error_skips_retries() {
        let speech = Arc::new(MockSpeech::new().with_listen(ListenScript::says("hello")));
        let llm = Arc::new(MockLlm::new());
        llm.queue_models(&["llama3:latest"]);
        llm.queue_error(LlmError::invalid_request("model not found"));
        llm.queue_text("Hi there!");

        let mut session = start(&speech, &llm, None);
        begin(&mut session).await;
        let context = finish(session, &speech).await;

        assert_eq!(llm.recorded_requests().len(), 2);
        assert_eq!(context.history.turns()[2], Turn::annotation(prompt::UNKNOWN_VERDICT));
        assert_eq!(
            context.last_contradiction_verdict.as_deref(),
            Some(prompt::UNKNOWN_VERDICT)
        );
    }

    #[tokio::test]
    async fn test_predictor_compares_latest_user_pair() {
        let speech = Arc::new(
            MockSpeech::new()
                .with_listen(ListenScript::says("I love cats."))
                .with_listen(ListenScript::says("I hate cats.")),
        );
        let llm = Arc::new(MockLlm::new());
        llm.queue_models(&["llama3:latest"]);
        llm.queue_text("Cats are great.");
        llm.queue_text("Earlier you said you love cats.");
        let predictor = Arc::new(MockPredictor::new());
        predictor.queue_prediction("Contradiction");

        let mut session = start(&speech, &llm, Some(predictor.clone()));
        begin(&mut session).await;
        let context = finish(session, &speech).await;

        // First cycle has nothing to compare and never reaches the classifier
        let predictions = predictor.recorded_requests();
        assert_eq!(predictions.len(), 1);
        assert_eq!(predictions[0].utterances, vec!["I love cats.", "I hate cats."]);
        assert_eq!(predictions[0].annotation_target_pair, [0, 1]);

        let turns = context.history.turns();
        assert_eq!(turns[2], Turn::annotation(prompt::NO_CONTRADICTION));
        assert_eq!(turns[5], Turn::annotation("contradiction"));

        // Only reply requests reach the chat backend
        let requests = llm.recorded_requests();
        assert_eq!(requests.len(), 2);
        assert!(requests.iter().all(|r| r.model == "llama3:latest"));
        assert_eq!(
            requests[1].messages[0],
            prompt::reply_instruction(Some("contradiction"))
        );
    }

    #[tokio::test]
    async fn test_predictor_ignores_silent_cycles() {
        let speech = Arc::new(
            MockSpeech::new()
                .with_listen(ListenScript::says("I love cats."))
                .with_listen(ListenScript::silent())
                .with_listen(ListenScript::says("I hate cats.")),
        );
        let llm = Arc::new(MockLlm::new());
        llm.queue_models(&["llama3:latest"]);
        llm.queue_text("Cats are great.");
        llm.queue_text("Still there?");
        llm.queue_text("Earlier you said you love cats.");
        let predictor = Arc::new(MockPredictor::new());
        predictor.queue_prediction("contradiction");

        let mut session = start(&speech, &llm, Some(predictor.clone()));
        begin(&mut session).await;
        let context = finish(session, &speech).await;

        // The silent turn is in history but never reaches the classifier
        assert_eq!(context.history.turns()[4], Turn::user(""));
        let predictions = predictor.recorded_requests();
        assert_eq!(predictions.len(), 1);
        assert_eq!(predictions[0].utterances, vec!["I love cats.", "I hate cats."]);
        assert_eq!(predictions[0].annotation_target_pair, [0, 1]);
        assert_eq!(context.history.turns()[8], Turn::annotation("contradiction"));
    }

    #[tokio::test]
    async fn test_speech_unavailable_is_fatal() {
        let speech = Arc::new(MockSpeech::failing_prepare("no audio device"));
        let llm = Arc::new(MockLlm::new());

        let mut session = start(&speech, &llm, None);
        let result = tokio::time::timeout(WAIT, session.task)
            .await
            .expect("Runtime did not stop");

        assert!(matches!(
            result.unwrap(),
            Err(RuntimeError::Transition(TransitionError::SpeechUnavailable(_)))
        ));

        let mut saw_error = false;
        while let Ok(update) = session.updates.try_recv() {
            saw_error |= matches!(update, DialogueUpdate::Error { .. });
        }
        assert!(saw_error);
        assert!(llm.recorded_requests().is_empty());
    }

    #[tokio::test]
    async fn test_stop_returns_context() {
        let speech = Arc::new(MockSpeech::new());
        let llm = Arc::new(MockLlm::new());
        llm.queue_models(&["llama3:latest"]);

        let mut session = start(&speech, &llm, None);
        wait_for_state(&mut session.updates, |s| {
            matches!(s, DialogueState::Greeting { .. })
        })
        .await;

        session.handle.stop();
        let context = session.task.await.unwrap().unwrap();
        assert_eq!(context.session_id, "test-session");
        assert_eq!(
            context.history.turns(),
            &[Turn::system("Hello! The models are llama3:latest")]
        );

        assert!(matches!(
            session.handle.trigger().await,
            Err(RuntimeError::Stopped)
        ));
    }
}
