//! Workspace: the state of one browser session and its transitions.
//!
//! Form → Submitting → Results { chat: Idle ⇄ AwaitingReply }, and Reset back
//! to Form from anywhere. Everything here is synchronous and performs no I/O;
//! the orchestrator calls these transitions around its model calls.

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::advisor::{AdvisorSession, ChatStreamError};
use crate::models::subject::GradeError;
use crate::models::{ChatMessage, RecommendationResponse, SubjectEntry, SubjectUpdate, Transcript};
use crate::recommendation::RecommendationError;

/// Minimum number of fully filled-in subjects before a request is made.
pub const MIN_SUBJECTS: usize = 3;

pub const NOT_ENOUGH_SUBJECTS_MESSAGE: &str =
    "Please add at least 3 subjects with grades for a better analysis.";
pub const GENERIC_FAILURE_MESSAGE: &str = "Something went wrong. Please try again.";
pub const GREETING_MESSAGE: &str = "I've analyzed your subjects and percentages! Feel free to ask me anything about these career paths or how to get started.";
pub const APOLOGY_MESSAGE: &str =
    "I'm sorry, I encountered an error. Could you try rephrasing that?";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatPhase {
    Idle,
    AwaitingReply,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Form,
    Submitting,
    Results(ChatPhase),
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Form => "form",
            Phase::Submitting => "submitting",
            Phase::Results(_) => "results",
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("Subject {0} not found")]
    SubjectNotFound(Uuid),

    #[error(transparent)]
    InvalidGrade(#[from] GradeError),

    #[error("Please add at least 3 subjects with grades for a better analysis.")]
    NotEnoughSubjects,

    #[error("Cannot {action} while the workspace is in the {phase} phase")]
    WrongPhase {
        action: &'static str,
        phase: &'static str,
    },

    #[error("Message must not be empty")]
    EmptyMessage,

    #[error("A reply is already being written")]
    ReplyInFlight,
}

/// Issued by `begin_submit`; identifies the request it belongs to.
#[derive(Debug, Clone)]
pub struct SubmitTicket {
    pub epoch: u64,
    /// Complete subjects only, grades formatted as percentages.
    pub subjects: Vec<SubjectEntry>,
    pub cancel: CancellationToken,
}

/// Issued by `begin_chat` together with the session for the turn.
#[derive(Debug, Clone)]
pub struct ChatTicket {
    pub epoch: u64,
    pub message: String,
    pub cancel: CancellationToken,
}

/// Serializable snapshot handed to the front-end.
#[derive(Debug, Clone, Serialize)]
pub struct WorkspaceView {
    pub workspace_id: Uuid,
    pub phase: &'static str,
    pub chat: Option<ChatPhase>,
    pub subjects: Vec<SubjectEntry>,
    pub error: Option<String>,
    pub result: Option<RecommendationResponse>,
    pub transcript: Transcript,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
}

#[derive(Debug)]
pub struct Workspace {
    id: Uuid,
    subjects: Vec<SubjectEntry>,
    phase: Phase,
    error: Option<String>,
    result: Option<RecommendationResponse>,
    transcript: Transcript,
    /// Present exactly while results are shown and no reply is in flight.
    session: Option<AdvisorSession>,
    /// Bumped on reset; tickets from an older epoch are ignored.
    epoch: u64,
    cancel: CancellationToken,
    created_at: DateTime<Utc>,
    last_active: DateTime<Utc>,
}

impl Workspace {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            subjects: vec![SubjectEntry::empty()],
            phase: Phase::Form,
            error: None,
            result: None,
            transcript: Transcript::default(),
            session: None,
            epoch: 0,
            cancel: CancellationToken::new(),
            created_at: now,
            last_active: now,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn last_active(&self) -> DateTime<Utc> {
        self.last_active
    }

    pub fn view(&self) -> WorkspaceView {
        WorkspaceView {
            workspace_id: self.id,
            phase: self.phase.as_str(),
            chat: match self.phase {
                Phase::Results(chat) => Some(chat),
                _ => None,
            },
            subjects: self.subjects.clone(),
            error: self.error.clone(),
            result: self.result.clone(),
            transcript: self.transcript.clone(),
            created_at: self.created_at,
            last_active: self.last_active,
        }
    }

    fn touch(&mut self) {
        self.last_active = Utc::now();
    }

    fn require_form(&self, action: &'static str) -> Result<(), WorkflowError> {
        if self.phase == Phase::Form {
            Ok(())
        } else {
            Err(WorkflowError::WrongPhase {
                action,
                phase: self.phase.as_str(),
            })
        }
    }

    // ── Form editing ─────────────────────────────────────────────────────────

    pub fn add_subject(&mut self) -> Result<&SubjectEntry, WorkflowError> {
        self.require_form("add a subject")?;
        self.touch();
        self.subjects.push(SubjectEntry::empty());
        Ok(&self.subjects[self.subjects.len() - 1])
    }

    /// Removing the only remaining subject is a no-op.
    pub fn remove_subject(&mut self, subject_id: Uuid) -> Result<(), WorkflowError> {
        self.require_form("remove a subject")?;
        if !self.subjects.iter().any(|s| s.id == subject_id) {
            return Err(WorkflowError::SubjectNotFound(subject_id));
        }
        self.touch();
        if self.subjects.len() > 1 {
            self.subjects.retain(|s| s.id != subject_id);
        }
        Ok(())
    }

    /// Invalid grades are rejected and leave the entry unchanged.
    pub fn update_subject(
        &mut self,
        subject_id: Uuid,
        update: SubjectUpdate,
    ) -> Result<&SubjectEntry, WorkflowError> {
        self.require_form("edit a subject")?;
        self.touch();
        let entry = self
            .subjects
            .iter_mut()
            .find(|s| s.id == subject_id)
            .ok_or(WorkflowError::SubjectNotFound(subject_id))?;
        entry.apply(update)?;
        Ok(entry)
    }

    // ── Recommendation request ───────────────────────────────────────────────

    /// Form → Submitting, guarded by the minimum subject count. When the guard
    /// fails the validation message becomes the workspace error and no ticket
    /// is issued.
    pub fn begin_submit(&mut self) -> Result<SubmitTicket, WorkflowError> {
        self.require_form("submit")?;
        self.touch();

        let complete: Vec<SubjectEntry> = self
            .subjects
            .iter()
            .filter(|s| s.is_complete())
            .map(SubjectEntry::with_percent_grade)
            .collect();

        if complete.len() < MIN_SUBJECTS {
            debug!(
                workspace_id = %self.id,
                "Submission blocked: {} complete subjects",
                complete.len()
            );
            self.error = Some(NOT_ENOUGH_SUBJECTS_MESSAGE.to_string());
            return Err(WorkflowError::NotEnoughSubjects);
        }

        self.phase = Phase::Submitting;
        self.error = None;
        self.result = None;
        self.transcript.clear();
        self.session = None;
        info!(
            workspace_id = %self.id,
            "Submitting {} subjects for recommendations",
            complete.len()
        );

        Ok(SubmitTicket {
            epoch: self.epoch,
            subjects: complete,
            cancel: self.cancel.clone(),
        })
    }

    /// Submitting → Results on success, Submitting → Form with the error on
    /// failure. Returns false when the ticket is stale and nothing changed.
    pub fn complete_submit(
        &mut self,
        ticket: &SubmitTicket,
        outcome: Result<(RecommendationResponse, AdvisorSession), RecommendationError>,
    ) -> bool {
        if ticket.epoch != self.epoch || self.phase != Phase::Submitting {
            debug!(workspace_id = %self.id, "Discarding stale recommendation result");
            return false;
        }
        self.touch();

        match outcome {
            Ok((response, session)) => {
                self.result = Some(response);
                self.session = Some(session);
                self.transcript.push(ChatMessage::model(GREETING_MESSAGE));
                self.phase = Phase::Results(ChatPhase::Idle);
                info!(workspace_id = %self.id, "Recommendations ready, advisor chat open");
            }
            Err(e) => {
                let message = e.to_string();
                warn!(workspace_id = %self.id, "Recommendation request failed: {message}");
                self.error = Some(if message.trim().is_empty() {
                    GENERIC_FAILURE_MESSAGE.to_string()
                } else {
                    message
                });
                self.phase = Phase::Form;
            }
        }
        true
    }

    // ── Advisory chat ────────────────────────────────────────────────────────

    /// Results/Idle → Results/AwaitingReply. Appends the user message and an
    /// empty model placeholder, and hands the session out for the turn.
    pub fn begin_chat(&mut self, input: &str) -> Result<(ChatTicket, AdvisorSession), WorkflowError> {
        match self.phase {
            Phase::Results(ChatPhase::Idle) => {}
            Phase::Results(ChatPhase::AwaitingReply) => return Err(WorkflowError::ReplyInFlight),
            other => {
                return Err(WorkflowError::WrongPhase {
                    action: "chat",
                    phase: other.as_str(),
                })
            }
        }

        let message = input.trim();
        if message.is_empty() {
            return Err(WorkflowError::EmptyMessage);
        }
        let session = self.session.take().ok_or(WorkflowError::WrongPhase {
            action: "chat",
            phase: self.phase.as_str(),
        })?;

        self.touch();
        self.transcript.push(ChatMessage::user(message));
        self.transcript.push(ChatMessage::model(""));
        self.phase = Phase::Results(ChatPhase::AwaitingReply);

        Ok((
            ChatTicket {
                epoch: self.epoch,
                message: message.to_string(),
                cancel: self.cancel.clone(),
            },
            session,
        ))
    }

    /// Writes the accumulated reply into the trailing model message.
    /// Returns false when the ticket is stale.
    pub fn apply_fragment(&mut self, ticket: &ChatTicket, accumulated: &str) -> bool {
        if !self.owns_chat(ticket) {
            return false;
        }
        self.touch();
        self.transcript.replace_tail(accumulated)
    }

    /// Ends the turn: the tail receives the full reply, or the apology when the
    /// turn failed or produced nothing. Returns the final tail text, or None
    /// when the ticket is stale (the session is then dropped).
    pub fn finish_chat(
        &mut self,
        ticket: &ChatTicket,
        session: AdvisorSession,
        outcome: Result<String, ChatStreamError>,
    ) -> Option<String> {
        if !self.owns_chat(ticket) {
            debug!(workspace_id = %self.id, "Discarding stale advisor reply");
            return None;
        }
        self.touch();

        let text = match outcome {
            Ok(reply) if !reply.trim().is_empty() => reply,
            Ok(_) => {
                warn!(workspace_id = %self.id, "Advisor returned an empty reply");
                APOLOGY_MESSAGE.to_string()
            }
            Err(e) => {
                warn!(workspace_id = %self.id, "Advisor chat failed: {e}");
                APOLOGY_MESSAGE.to_string()
            }
        };

        self.transcript.replace_tail(text.clone());
        self.session = Some(session);
        self.phase = Phase::Results(ChatPhase::Idle);
        Some(text)
    }

    fn owns_chat(&self, ticket: &ChatTicket) -> bool {
        ticket.epoch == self.epoch && self.phase == Phase::Results(ChatPhase::AwaitingReply)
    }

    // ── Reset ────────────────────────────────────────────────────────────────

    /// Back to the initial form from any state. In-flight work is cancelled
    /// and any late result is ignored.
    pub fn reset(&mut self) {
        self.cancel.cancel();
        self.cancel = CancellationToken::new();
        self.epoch += 1;

        self.subjects = vec![SubjectEntry::empty()];
        self.phase = Phase::Form;
        self.error = None;
        self.result = None;
        self.transcript.clear();
        self.session = None;
        self.touch();
        info!(workspace_id = %self.id, "Workspace reset");
    }
}

// Outside tests the workspace is only read through `view`.
#[cfg(test)]
impl Workspace {
    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn subjects(&self) -> &[SubjectEntry] {
        &self.subjects
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn result(&self) -> Option<&RecommendationResponse> {
        self.result.as_ref()
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }
}

impl Default for Workspace {
    fn default() -> Self {
        Self::new()
    }
}
