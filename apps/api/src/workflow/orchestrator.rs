//! Orchestrator: drives the recommendation client and the advisor session
//! against a workspace.
//!
//! The workspace lock is only held for the synchronous transitions; every
//! model call happens with the lock released.

use std::sync::Arc;

use futures::StreamExt;
use serde::Serialize;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info};

use crate::advisor::{AdvisorSession, ChatStreamError};
use crate::llm_client::GenerativeModel;
use crate::recommendation::{RecommendationClient, RecommendationError};
use crate::workflow::registry::SharedWorkspace;
use crate::workflow::workspace::{ChatTicket, SubmitTicket, Workspace, WorkflowError};

/// Progress of one advisor reply, as pushed to the front-end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "text", rename_all = "snake_case")]
pub enum ReplyEvent {
    /// Accumulated reply so far; replaces the previous value.
    Reply(String),
    /// Final text of the transcript tail.
    Done(String),
}

#[derive(Clone)]
pub struct Orchestrator {
    recommender: RecommendationClient,
    model: Arc<dyn GenerativeModel>,
}

impl Orchestrator {
    pub fn new(model: Arc<dyn GenerativeModel>) -> Self {
        Self {
            recommender: RecommendationClient::new(model.clone()),
            model,
        }
    }

    /// Runs one recommendation request for the workspace.
    ///
    /// Model failures never surface here: they end up as the workspace error.
    /// `Err` means the request was not started (validation or phase guard).
    /// The request runs in its own task, so the workspace leaves `Submitting`
    /// even if the caller stops waiting.
    pub async fn submit(&self, workspace: &SharedWorkspace) -> Result<(), WorkflowError> {
        let ticket = workspace.lock().await.begin_submit()?;

        let task = tokio::spawn(self.clone().run_submit(workspace.clone(), ticket.clone()));
        if let Err(e) = task.await {
            error!("Recommendation task aborted: {e}");
            // Empty message: the workspace falls back to its generic error text.
            let outcome = Err(RecommendationError::ModelInvocation(String::new()));
            workspace.lock().await.complete_submit(&ticket, outcome);
        }
        Ok(())
    }

    async fn run_submit(self, workspace: SharedWorkspace, ticket: SubmitTicket) {
        let outcome = tokio::select! {
            _ = ticket.cancel.cancelled() => {
                info!("Recommendation request abandoned after reset");
                return;
            }
            outcome = self.recommender.fetch_recommendations(&ticket.subjects) => outcome,
        };

        let outcome = outcome.map(|response| {
            let session = AdvisorSession::new(self.model.clone(), &response, &ticket.subjects);
            (response, session)
        });

        workspace.lock().await.complete_submit(&ticket, outcome);
    }

    /// Opens a chat turn. The user message and the reply placeholder are in the
    /// transcript when this returns; `ChatTurn::run` produces the reply.
    pub async fn start_chat(
        &self,
        workspace: &Mutex<Workspace>,
        input: &str,
    ) -> Result<ChatTurn, WorkflowError> {
        let (ticket, session) = workspace.lock().await.begin_chat(input)?;
        Ok(ChatTurn { ticket, session })
    }

    /// One full chat turn, start to finish. The HTTP handler splits this in
    /// two so that guard failures are answered before the stream opens.
    #[cfg(test)]
    pub async fn chat(
        &self,
        workspace: &Mutex<Workspace>,
        input: &str,
        updates: &mpsc::Sender<ReplyEvent>,
    ) -> Result<(), WorkflowError> {
        self.start_chat(workspace, input)
            .await?
            .run(workspace, updates)
            .await;
        Ok(())
    }
}

/// A chat turn in flight. Owns the session until the reply is finished.
#[derive(Debug)]
pub struct ChatTurn {
    ticket: ChatTicket,
    session: AdvisorSession,
}

impl ChatTurn {
    /// Streams the reply into the workspace transcript, mirroring every update
    /// to `updates`. A closed `updates` channel does not stop the turn.
    pub async fn run(self, workspace: &Mutex<Workspace>, updates: &mpsc::Sender<ReplyEvent>) {
        let ChatTurn {
            ticket,
            mut session,
        } = self;

        let outcome = tokio::select! {
            _ = ticket.cancel.cancelled() => Err(ChatStreamError::Cancelled),
            outcome = stream_reply(&mut session, &ticket, workspace, updates) => outcome,
        };

        let finished = workspace.lock().await.finish_chat(&ticket, session, outcome);
        match finished {
            Some(text) => {
                let _ = updates.send(ReplyEvent::Done(text)).await;
            }
            None => debug!("Advisor reply dropped: workspace moved on"),
        }
    }
}

async fn stream_reply(
    session: &mut AdvisorSession,
    ticket: &ChatTicket,
    workspace: &Mutex<Workspace>,
    updates: &mpsc::Sender<ReplyEvent>,
) -> Result<String, ChatStreamError> {
    let mut stream = session.send_message(&ticket.message).await?;
    let mut accumulated = String::new();

    while let Some(fragment) = stream.next().await {
        accumulated.push_str(&fragment?);
        if !workspace.lock().await.apply_fragment(ticket, &accumulated) {
            return Err(ChatStreamError::Cancelled);
        }
        let _ = updates.send(ReplyEvent::Reply(accumulated.clone())).await;
    }

    Ok(accumulated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm_client::testing::{ChatReply, JsonReply, ScriptedModel, VALID_RESPONSE};
    use crate::llm_client::LlmError;
    use crate::models::{ChatMessage, SubjectUpdate};
    use crate::workflow::workspace::{
        ChatPhase, Phase, APOLOGY_MESSAGE, GREETING_MESSAGE, NOT_ENOUGH_SUBJECTS_MESSAGE,
    };

    fn workspace_with(subjects: &[(&str, &str)]) -> Arc<Mutex<Workspace>> {
        let mut ws = Workspace::new();
        for (i, (name, grade)) in subjects.iter().enumerate() {
            let id = if i == 0 {
                ws.subjects()[0].id
            } else {
                ws.add_subject().unwrap().id
            };
            ws.update_subject(
                id,
                SubjectUpdate {
                    name: Some(name.to_string()),
                    grade: Some(grade.to_string()),
                },
            )
            .unwrap();
        }
        Arc::new(Mutex::new(ws))
    }

    fn scenario_subjects() -> Arc<Mutex<Workspace>> {
        workspace_with(&[("Mathematics", "90"), ("Physics", "85"), ("Chemistry", "78")])
    }

    async fn ready(model: &Arc<ScriptedModel>) -> (Orchestrator, Arc<Mutex<Workspace>>) {
        model.push_json_text(VALID_RESPONSE);
        let orchestrator = Orchestrator::new(model.clone());
        let ws = scenario_subjects();
        orchestrator.submit(&ws).await.unwrap();
        (orchestrator, ws)
    }

    async fn drain(mut rx: mpsc::Receiver<ReplyEvent>) -> Vec<ReplyEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_scenario_a_successful_submission() {
        let model = ScriptedModel::new();
        let (_, ws) = ready(&model).await;

        let prompts = model.json_prompts();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("Mathematics: 90%"));
        assert!(prompts[0].contains("Physics: 85%"));
        assert!(prompts[0].contains("Chemistry: 78%"));

        let ws = ws.lock().await;
        assert_eq!(ws.phase(), Phase::Results(ChatPhase::Idle));
        assert_eq!(ws.result().unwrap().recommendations.len(), 4);
        assert_eq!(ws.transcript().len(), 1);
        assert_eq!(ws.transcript().messages()[0], ChatMessage::model(GREETING_MESSAGE));
    }

    #[tokio::test]
    async fn test_scenario_b_too_few_subjects_makes_no_call() {
        let model = ScriptedModel::new();
        let orchestrator = Orchestrator::new(model.clone());
        let ws = workspace_with(&[("Mathematics", "90"), ("Physics", "85")]);

        let result = orchestrator.submit(&ws).await;
        assert_eq!(result, Err(WorkflowError::NotEnoughSubjects));
        assert_eq!(model.json_call_count(), 0);

        let ws = ws.lock().await;
        assert_eq!(ws.phase(), Phase::Form);
        assert_eq!(ws.error(), Some(NOT_ENOUGH_SUBJECTS_MESSAGE));
    }

    #[tokio::test]
    async fn test_scenario_c_model_failure_returns_to_form() {
        let model = ScriptedModel::new();
        model.push_json(JsonReply::Fail(LlmError::Api {
            status: 429,
            message: "quota exceeded".to_string(),
        }));
        let orchestrator = Orchestrator::new(model.clone());
        let ws = scenario_subjects();
        let before = ws.lock().await.subjects().to_vec();

        orchestrator.submit(&ws).await.unwrap();

        let ws = ws.lock().await;
        assert_eq!(ws.phase(), Phase::Form);
        assert_eq!(ws.error(), Some("quota exceeded"));
        assert_eq!(ws.subjects(), before.as_slice());
        assert!(ws.result().is_none());
    }

    #[tokio::test]
    async fn test_scenario_d_unparseable_response() {
        let model = ScriptedModel::new();
        model.push_json_text("not json");
        let orchestrator = Orchestrator::new(model.clone());
        let ws = scenario_subjects();

        orchestrator.submit(&ws).await.unwrap();

        let ws = ws.lock().await;
        assert_eq!(ws.phase(), Phase::Form);
        assert_eq!(
            ws.error(),
            Some("Could not interpret recommendations. Please try again.")
        );
    }

    #[tokio::test]
    async fn test_resubmit_after_failure_succeeds() {
        let model = ScriptedModel::new();
        model.push_json_text("not json");
        model.push_json_text(VALID_RESPONSE);
        let orchestrator = Orchestrator::new(model.clone());
        let ws = scenario_subjects();

        orchestrator.submit(&ws).await.unwrap();
        orchestrator.submit(&ws).await.unwrap();

        let ws = ws.lock().await;
        assert_eq!(ws.phase(), Phase::Results(ChatPhase::Idle));
        assert!(ws.error().is_none());
        assert_eq!(model.json_call_count(), 2);
    }

    #[tokio::test]
    async fn test_scenario_e_streamed_reply_progresses() {
        let model = ScriptedModel::new();
        let (orchestrator, ws) = ready(&model).await;
        model.push_fragments(&["You", " should", " consider..."]);

        let turn = orchestrator
            .start_chat(&ws, "What degree should I pursue?")
            .await
            .unwrap();
        {
            let ws = ws.lock().await;
            assert_eq!(ws.phase(), Phase::Results(ChatPhase::AwaitingReply));
            assert_eq!(ws.transcript().last().unwrap(), &ChatMessage::model(""));
        }

        let (tx, rx) = mpsc::channel(16);
        turn.run(&ws, &tx).await;

        assert_eq!(
            drain(rx).await,
            vec![
                ReplyEvent::Reply("You".to_string()),
                ReplyEvent::Reply("You should".to_string()),
                ReplyEvent::Reply("You should consider...".to_string()),
                ReplyEvent::Done("You should consider...".to_string()),
            ]
        );

        let ws = ws.lock().await;
        assert_eq!(ws.phase(), Phase::Results(ChatPhase::Idle));
        let messages = ws.transcript().messages();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1], ChatMessage::user("What degree should I pursue?"));
        assert_eq!(messages[2], ChatMessage::model("You should consider..."));
    }

    #[tokio::test]
    async fn test_session_is_reused_across_turns() {
        let model = ScriptedModel::new();
        let (orchestrator, ws) = ready(&model).await;
        model.push_fragments(&["Engineering."]);
        model.push_fragments(&["Try Imperial."]);
        let (tx, _rx) = mpsc::channel(16);

        orchestrator
            .chat(&ws, "What should I study?", &tx)
            .await
            .unwrap();
        orchestrator.chat(&ws, "Where?", &tx).await.unwrap();

        let chats = model.chats();
        assert_eq!(chats.len(), 2);
        assert_eq!(chats[1].history.len(), 2);
        assert_eq!(chats[1].history[1], ChatMessage::model("Engineering."));
        assert!(chats[0]
            .system_instruction
            .contains("Mathematics (90%), Physics (85%), Chemistry (78%)"));
        assert_eq!(ws.lock().await.transcript().len(), 5);
    }

    #[tokio::test]
    async fn test_chat_failure_before_first_fragment() {
        let model = ScriptedModel::new();
        let (orchestrator, ws) = ready(&model).await;
        model.push_chat(ChatReply::Reject(LlmError::Api {
            status: 503,
            message: "unavailable".to_string(),
        }));

        let (tx, rx) = mpsc::channel(16);
        orchestrator
            .start_chat(&ws, "hello")
            .await
            .unwrap()
            .run(&ws, &tx)
            .await;

        assert_eq!(
            drain(rx).await,
            vec![ReplyEvent::Done(APOLOGY_MESSAGE.to_string())]
        );
        let ws = ws.lock().await;
        assert_eq!(ws.phase(), Phase::Results(ChatPhase::Idle));
        assert_eq!(ws.transcript().len(), 3);
        assert_eq!(ws.transcript().last().unwrap(), &ChatMessage::model(APOLOGY_MESSAGE));
    }

    #[tokio::test]
    async fn test_chat_failure_mid_stream_replaces_partial_text() {
        let model = ScriptedModel::new();
        let (orchestrator, ws) = ready(&model).await;
        model.push_chat(ChatReply::BreakAfter(
            vec!["You".to_string(), " sho".to_string()],
            LlmError::Api {
                status: 500,
                message: "reset".to_string(),
            },
        ));
        model.push_fragments(&["Fine now."]);

        let (tx, _rx) = mpsc::channel(16);
        orchestrator
            .start_chat(&ws, "hello")
            .await
            .unwrap()
            .run(&ws, &tx)
            .await;
        assert_eq!(
            ws.lock().await.transcript().last().unwrap().text,
            APOLOGY_MESSAGE
        );

        // The session survives a failed turn.
        orchestrator
            .start_chat(&ws, "again")
            .await
            .unwrap()
            .run(&ws, &tx)
            .await;
        let ws = ws.lock().await;
        assert_eq!(ws.transcript().last().unwrap().text, "Fine now.");
        assert_eq!(ws.transcript().len(), 5);
    }

    #[tokio::test]
    async fn test_reset_cancels_in_flight_submit() {
        let model = ScriptedModel::new();
        model.push_json(JsonReply::Hang);
        let orchestrator = Orchestrator::new(model.clone());
        let ws = scenario_subjects();

        let task = {
            let orchestrator = orchestrator.clone();
            let ws = ws.clone();
            tokio::spawn(async move { orchestrator.submit(&ws).await })
        };
        while model.json_call_count() == 0 {
            tokio::task::yield_now().await;
        }

        ws.lock().await.reset();
        task.await.unwrap().unwrap();

        let ws = ws.lock().await;
        assert_eq!(ws.phase(), Phase::Form);
        assert!(ws.result().is_none());
        assert_eq!(ws.subjects().len(), 1);
    }

    #[tokio::test]
    async fn test_abandoned_submit_still_completes() {
        let model = ScriptedModel::new();
        let (release, gate) = tokio::sync::oneshot::channel();
        model.push_json(JsonReply::Gated(gate));
        let orchestrator = Orchestrator::new(model.clone());
        let ws = scenario_subjects();
        let before = ws.lock().await.subjects().to_vec();

        // The caller gives up while the model call is still pending.
        let waited =
            tokio::time::timeout(std::time::Duration::from_millis(20), orchestrator.submit(&ws))
                .await;
        assert!(waited.is_err());
        assert_eq!(ws.lock().await.phase(), Phase::Submitting);

        release
            .send(Err(LlmError::Api {
                status: 504,
                message: "deadline exceeded".to_string(),
            }))
            .unwrap();
        while ws.lock().await.phase() == Phase::Submitting {
            tokio::task::yield_now().await;
        }

        {
            let ws = ws.lock().await;
            assert_eq!(ws.phase(), Phase::Form);
            assert_eq!(ws.error(), Some("deadline exceeded"));
            assert_eq!(ws.subjects(), before.as_slice());
        }

        // The workspace is usable again.
        model.push_json_text(VALID_RESPONSE);
        orchestrator.submit(&ws).await.unwrap();
        assert_eq!(ws.lock().await.phase(), Phase::Results(ChatPhase::Idle));
    }

    #[tokio::test]
    async fn test_empty_reply_keeps_session_history_clean() {
        let model = ScriptedModel::new();
        let (orchestrator, ws) = ready(&model).await;
        model.push_fragments(&[]);
        model.push_fragments(&["Engineering."]);
        let (tx, _rx) = mpsc::channel(16);

        orchestrator.chat(&ws, "first", &tx).await.unwrap();
        assert_eq!(
            ws.lock().await.transcript().last().unwrap().text,
            APOLOGY_MESSAGE
        );

        orchestrator.chat(&ws, "second", &tx).await.unwrap();
        assert!(model.chats()[1].history.is_empty());
        assert_eq!(
            ws.lock().await.transcript().last().unwrap().text,
            "Engineering."
        );
    }

    #[tokio::test]
    async fn test_reset_cancels_in_flight_reply() {
        let model = ScriptedModel::new();
        let (orchestrator, ws) = ready(&model).await;
        model.push_chat(ChatReply::StallAfter(vec!["Thinking".to_string()]));

        let turn = orchestrator.start_chat(&ws, "hello").await.unwrap();
        let (tx, rx) = mpsc::channel(16);
        let task = {
            let ws = ws.clone();
            tokio::spawn(async move { turn.run(&ws, &tx).await })
        };
        while ws.lock().await.transcript().last().map(|m| m.text.as_str()) != Some("Thinking") {
            tokio::task::yield_now().await;
        }

        ws.lock().await.reset();
        task.await.unwrap();

        assert_eq!(
            drain(rx).await,
            vec![ReplyEvent::Reply("Thinking".to_string())]
        );
        let ws = ws.lock().await;
        assert_eq!(ws.phase(), Phase::Form);
        assert!(ws.transcript().is_empty());
        assert!(!ws.has_session());
    }

    #[tokio::test]
    async fn test_second_chat_rejected_while_reply_in_flight() {
        let model = ScriptedModel::new();
        let (orchestrator, ws) = ready(&model).await;

        let _turn = orchestrator.start_chat(&ws, "first").await.unwrap();
        let err = orchestrator.start_chat(&ws, "second").await.unwrap_err();
        assert_eq!(err, WorkflowError::ReplyInFlight);
        assert!(model.chats().is_empty());
    }

    #[test]
    fn test_reply_event_serialization() {
        let json = serde_json::to_value(ReplyEvent::Reply("Hi".to_string())).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "reply", "text": "Hi"}));
    }
}
