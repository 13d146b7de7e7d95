//! Events that can occur in a dialogue session

use crate::llm::LlmErrorKind;

/// Which backend call an error or retry belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendCall {
    ListModels,
    ContradictionCheck,
    GenerateReply,
}

/// Events that trigger state transitions
#[derive(Debug, Clone)]
pub enum Event {
    // UI events
    /// The external "advance" signal (button click, Enter key)
    Trigger,

    // Speech events
    SpeechReady,
    SpeechUnavailable {
        message: String,
    },
    /// A transcript produced while listening; the latest one wins
    Recognized {
        text: String,
    },
    ListenComplete,
    NoInputTimeout,
    SpeakFinished,

    // Backend events
    ModelsListed {
        models: Vec<String>,
    },
    /// Raw content of the contradiction check, `None` if the response had
    /// no recognisable message
    ContradictionChecked {
        content: Option<String>,
    },
    ReplyGenerated {
        content: Option<String>,
    },
    /// A backend call failed; the error itself is logged where it happened
    BackendError {
        call: BackendCall,
        error_kind: LlmErrorKind,
        attempt: u32,
    },
    RetryTimeout {
        attempt: u32,
    },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::Trigger => "trigger",
            Event::SpeechReady => "speech_ready",
            Event::SpeechUnavailable { .. } => "speech_unavailable",
            Event::Recognized { .. } => "recognized",
            Event::ListenComplete => "listen_complete",
            Event::NoInputTimeout => "no_input_timeout",
            Event::SpeakFinished => "speak_finished",
            Event::ModelsListed { .. } => "models_listed",
            Event::ContradictionChecked { .. } => "contradiction_checked",
            Event::ReplyGenerated { .. } => "reply_generated",
            Event::BackendError { .. } => "backend_error",
            Event::RetryTimeout { .. } => "retry_timeout",
        }
    }
}
