use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::{Stream, StreamExt};
use thiserror::Error;
use tracing::debug;

use crate::advisor::prompts::build_system_instruction;
use crate::llm_client::{FragmentStream, GenerativeModel, LlmError};
use crate::models::{ChatMessage, RecommendationResponse, SubjectEntry};

#[derive(Debug, Error)]
pub enum ChatStreamError {
    #[error("Message must not be empty")]
    EmptyMessage,

    #[error("Model call failed: {0}")]
    Model(#[from] LlmError),

    #[error("Reply abandoned because the workspace was reset")]
    Cancelled,
}

/// One advisory conversation, bound to a single recommendation result.
///
/// The system instruction is fixed at creation. History holds completed turns
/// only, so every `send_message` sees everything said before it.
pub struct AdvisorSession {
    model: Arc<dyn GenerativeModel>,
    system_instruction: String,
    history: Vec<ChatMessage>,
}

impl fmt::Debug for AdvisorSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdvisorSession")
            .field("turns", &(self.history.len() / 2))
            .finish_non_exhaustive()
    }
}

impl AdvisorSession {
    /// `subjects` must carry percentage-formatted grades.
    pub fn new(
        model: Arc<dyn GenerativeModel>,
        context: &RecommendationResponse,
        subjects: &[SubjectEntry],
    ) -> Self {
        Self {
            model,
            system_instruction: build_system_instruction(context, subjects),
            history: Vec::new(),
        }
    }

    /// Sends `text` and returns the reply as a lazy stream of fragments.
    ///
    /// The turn is recorded in the history only once the stream has ended
    /// without error and with a non-blank reply; any other turn leaves the
    /// history as it was.
    pub async fn send_message(&mut self, text: &str) -> Result<ReplyStream<'_>, ChatStreamError> {
        let message = text.trim();
        if message.is_empty() {
            return Err(ChatStreamError::EmptyMessage);
        }

        debug!("Sending advisor message after {} turns", self.history.len() / 2);
        let fragments = self
            .model
            .stream_chat(&self.system_instruction, &self.history, message)
            .await?;

        Ok(ReplyStream {
            history: &mut self.history,
            message: message.to_string(),
            reply: String::new(),
            fragments,
            finished: false,
        })
    }
}

/// Fragments of one advisor reply, in arrival order. Finite; an `Err` item
/// is always the last one.
pub struct ReplyStream<'a> {
    history: &'a mut Vec<ChatMessage>,
    message: String,
    reply: String,
    fragments: FragmentStream,
    finished: bool,
}

impl Stream for ReplyStream<'_> {
    type Item = Result<String, ChatStreamError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(None);
        }

        match this.fragments.poll_next_unpin(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Some(Ok(fragment))) => {
                this.reply.push_str(&fragment);
                Poll::Ready(Some(Ok(fragment)))
            }
            Poll::Ready(Some(Err(e))) => {
                this.finished = true;
                Poll::Ready(Some(Err(e.into())))
            }
            Poll::Ready(None) => {
                this.finished = true;
                // An empty reply is not a turn; the model rejects empty parts.
                if this.reply.trim().is_empty() {
                    debug!("Advisor reply was empty; history left unchanged");
                } else {
                    this.history
                        .push(ChatMessage::user(std::mem::take(&mut this.message)));
                    this.history
                        .push(ChatMessage::model(std::mem::take(&mut this.reply)));
                }
                Poll::Ready(None)
            }
        }
    }
}
