//! Prompt construction for the greeting and reply generation
//!
//! The reply model is steered by a synthesized system instruction that
//! embeds the latest contradiction verdict. Annotation turns themselves are
//! stripped from the transcript sent to the reply model.

use crate::history::Turn;

/// Verdict used when the contradiction check yields nothing usable
pub const UNKNOWN_VERDICT: &str = "unknown";

/// Verdict recorded when there is nothing to compare yet
pub const NO_CONTRADICTION: &str = "no_contradiction";

/// Reply used when the backend answered with an unrecognised shape
pub const NO_REPLY: &str = "(no reply)";

/// Reply used when the backend could not be reached at all
pub const APOLOGY: &str =
    "Sorry, I'm having trouble reaching the language model right now. Could you say that again?";

const REPLY_INSTRUCTION: &str = "You are a contradiction-resolving dialogue assistant.";

/// Greeting spoken when the session starts
pub fn greeting(models: &[String]) -> String {
    if models.is_empty() {
        "Hello! No models were found.".to_string()
    } else {
        format!("Hello! The models are {}", models.join(" "))
    }
}

/// System instruction prefixed to every reply-generation request
pub fn reply_instruction(verdict: Option<&str>) -> Turn {
    let verdict = verdict.unwrap_or(UNKNOWN_VERDICT);
    Turn::system(format!(
        "{REPLY_INSTRUCTION}\n\
         The contradiction detection result is: \"{verdict}\".\n\
         If there is a contradiction, politely explain or correct it before continuing the conversation."
    ))
}

/// Messages for the reply model: instruction first, then the transcript
/// without contradiction annotations
pub fn reply_messages(history: &[Turn], verdict: Option<&str>) -> Vec<Turn> {
    std::iter::once(reply_instruction(verdict))
        .chain(history.iter().filter(|t| !t.is_annotation()).cloned())
        .collect()
}

/// Normalise raw contradiction output into a verdict
pub fn normalize_verdict(content: Option<&str>) -> String {
    content
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map_or_else(|| UNKNOWN_VERDICT.to_string(), str::to_lowercase)
}

/// Reply text, or the placeholder when the backend gave none
pub fn normalize_reply(content: Option<&str>) -> String {
    content
        .filter(|c| !c.trim().is_empty())
        .map_or_else(|| NO_REPLY.to_string(), ToString::to_string)
}
