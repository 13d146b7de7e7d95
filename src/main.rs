//! Recap - spoken dialogue assistant that catches contradictions
//!
//! Listens to the user, asks a language model whether the latest turn
//! contradicts the conversation so far, then speaks a reply steered by that
//! verdict.

mod config;
mod history;
mod llm;
mod prompt;
mod runtime;
mod speech;
mod state_machine;

use config::DialogueConfig;
use llm::{HttpPredictor, LoggingService, OllamaService};
use runtime::{DialogueRuntime, DialogueUpdate};
use speech::ConsoleSpeech;
use state_machine::DialogueState;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging; stdout belongs to the dialogue
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "recap=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let config = DialogueConfig::from_env()?;
    tracing::info!(
        ollama_url = %config.ollama_url,
        reply_model = %config.reply_model,
        contradiction_model = %config.contradiction_model,
        predictor_url = ?config.predictor_url,
        "Configuration loaded"
    );

    let llm = LoggingService::new(OllamaService::new(
        &config.ollama_url,
        config.request_timeout,
    )?);
    let predictor = match &config.predictor_url {
        Some(url) => Some(HttpPredictor::new(url, config.request_timeout)?),
        None => None,
    };

    let speech = Arc::new(ConsoleSpeech::stdin());
    let session_id = uuid::Uuid::new_v4().to_string();
    let mut runtime = DialogueRuntime::new(session_id, config, speech.clone(), llm);
    if let Some(predictor) = predictor {
        runtime = runtime.with_predictor(Arc::new(predictor));
    }

    let handle = runtime.handle();
    let mut updates = runtime.subscribe();
    let session = tokio::spawn(runtime.run());

    {
        let handle = handle.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Interrupted, stopping dialogue");
                handle.stop();
            }
        });
    }

    loop {
        let update = tokio::select! {
            update = updates.recv() => update,
            () = handle.stopped() => break,
        };

        match update {
            Ok(DialogueUpdate::StateChanged {
                state: DialogueState::Greeting { greeting },
            }) => {
                println!("{greeting}");
                println!("Press Enter to start.");
                tokio::select! {
                    line = speech.next_line(None) => {
                        if line.is_none() {
                            handle.stop();
                            break;
                        }
                    }
                    () = handle.stopped() => break,
                }
                if handle.trigger().await.is_err() {
                    break;
                }
            }
            Ok(DialogueUpdate::TurnAppended { turn }) if turn.is_annotation() => {
                println!("[{}]", turn.content);
            }
            Ok(DialogueUpdate::Error { message }) => {
                eprintln!("error: {message}");
            }
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Dropped dialogue updates");
            }
            Err(RecvError::Closed) => break,
        }
    }

    let context = session.await??;
    tracing::info!(
        session_id = %context.session_id,
        turns = context.history.len(),
        "Session ended"
    );
    Ok(())
}
