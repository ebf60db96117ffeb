//! Conversation session: input -> proxy -> history + context
//!
//! A [`Session`] owns the rolling context window and the displayed history of
//! one conversation, plus handles to the two proxies. State is only mutated
//! after a proxy call fully succeeds, and at most one submit may be in flight
//! at a time; an overlapping submit is rejected with [`ParleyError::Busy`]
//! rather than queued.

use crate::integration::config::SessionConfig;
use crate::llm::ContextStore;
use crate::messages::{AudioClip, ContextMessage, ConversationHistory, Storage, Turn};
use crate::proxy::{CompletionProxy, TranscriptionProxy};
use crate::{ParleyError, Result};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// The two turns recorded by a successful submit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exchange {
    pub user: Turn,
    pub assistant: Turn,
}

impl Exchange {
    pub fn reply(&self) -> &str {
        &self.assistant.content
    }
}

/// Releases the in-flight slot when dropped
struct InFlightGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// One conversation with injected storage and proxies
pub struct Session {
    config: SessionConfig,
    context: ContextStore,
    history: ConversationHistory,
    completion: Arc<dyn CompletionProxy>,
    transcription: Arc<dyn TranscriptionProxy>,
    in_flight: AtomicBool,
}

impl Session {
    /// Open a session over `storage`, restoring any persisted history and context
    pub fn new(
        config: SessionConfig,
        storage: Arc<dyn Storage>,
        completion: Arc<dyn CompletionProxy>,
        transcription: Arc<dyn TranscriptionProxy>,
    ) -> Self {
        let context = ContextStore::load(Arc::clone(&storage), config.context_window);
        let history = ConversationHistory::load(storage);

        info!(
            "Session opened with {} history turns, {}/{} context messages",
            history.len(),
            context.len(),
            context.capacity()
        );

        Self {
            config,
            context,
            history,
            completion,
            transcription,
            in_flight: AtomicBool::new(false),
        }
    }

    /// Send typed input and record the exchange
    pub async fn submit_text(&self, input: &str) -> Result<Exchange> {
        let _guard = self.begin()?;

        let input = input.trim();
        if input.is_empty() {
            return Err(ParleyError::InvalidInput("Message is empty".to_string()));
        }

        let context = self.context.current();
        debug!("Submitting text with {} context messages", context.len());

        let reply = self
            .with_timeout(self.completion.complete(input, &context))
            .await?;

        Ok(self.record(input, false, reply))
    }

    /// Transcribe recorded audio, complete it, and record the exchange
    ///
    /// The user turn is tagged as audio-sourced. If the transcription proxy
    /// already returned a completion it is used as the reply; otherwise the
    /// completion proxy is called with the transcript.
    pub async fn submit_audio(&self, audio: &AudioClip) -> Result<Exchange> {
        let _guard = self.begin()?;

        if audio.is_empty() {
            return Err(ParleyError::InvalidInput("Recording is empty".to_string()));
        }

        let context = self.context.current();
        debug!(
            "Submitting {} bytes of {} with {} context messages",
            audio.len(),
            audio.mime_type,
            context.len()
        );

        let transcription = self
            .with_timeout(self.transcription.transcribe(audio, &context))
            .await?;

        let transcript = transcription.text.trim();
        if transcript.is_empty() {
            return Err(ParleyError::InvalidInput("No speech detected".to_string()));
        }
        debug!("Transcribed: {}", transcript);

        let reply = match transcription.response {
            Some(reply) => reply,
            None => {
                self.with_timeout(self.completion.complete(transcript, &context))
                    .await?
            }
        };

        Ok(self.record(transcript, true, reply))
    }

    /// Snapshot of the full history
    pub fn history(&self) -> Vec<Turn> {
        self.history.get_all()
    }

    /// Snapshot of the context window, oldest first
    pub fn context(&self) -> Vec<ContextMessage> {
        self.context.current()
    }

    /// The latest assistant turn, for replaying it through speech
    pub fn last_assistant_reply(&self) -> Option<Turn> {
        self.history.last_assistant()
    }

    /// Empty the context window only
    pub fn clear_context(&self) {
        self.context.clear();
        info!("Context window cleared");
    }

    /// Empty the displayed history only
    pub fn clear_history(&self) {
        self.history.clear();
        info!("Conversation history cleared");
    }

    /// Empty both the history and the context window
    pub fn reset(&self) {
        self.history.clear();
        self.context.clear();
        info!("Session reset");
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    fn begin(&self) -> Result<InFlightGuard<'_>> {
        self.in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| {
                debug!("Rejected submit while another is in flight");
                ParleyError::Busy
            })?;
        Ok(InFlightGuard {
            flag: &self.in_flight,
        })
    }

    async fn with_timeout<T>(&self, call: impl Future<Output = Result<T>>) -> Result<T> {
        let timeout = self.config.request_timeout();
        match tokio::time::timeout(timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                warn!("Proxy call failed: {}", e);
                // Input the proxy rejected before sending keeps its own kind
                Err(match e {
                    ParleyError::Upstream(_)
                    | ParleyError::InvalidInput(_)
                    | ParleyError::Serialization(_) => e,
                    other => ParleyError::Upstream(other.to_string()),
                })
            }
            Err(_) => {
                warn!("Proxy call timed out after {:?}", timeout);
                Err(ParleyError::Upstream(format!(
                    "Request timed out after {}s",
                    timeout.as_secs()
                )))
            }
        }
    }

    fn record(&self, input: &str, is_audio: bool, reply: String) -> Exchange {
        let (user, assistant) = self.history.append_exchange(input, is_audio, reply);
        self.context
            .extend([user.to_context(), assistant.to_context()]);
        debug!(
            "Recorded exchange {}/{}; context now {} messages",
            user.sequence,
            assistant.sequence,
            self.context.len()
        );
        Exchange { user, assistant }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("config", &self.config)
            .field("history", &self.history)
            .field("context", &self.context)
            .field("busy", &self.is_busy())
            .finish()
    }
}
