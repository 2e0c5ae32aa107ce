//! Scripted `GenerativeModel` used by unit and router tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;
use tokio::sync::oneshot;

use super::{FragmentStream, GenerativeModel, LlmError};
use crate::models::ChatMessage;

/// A well-formed recommendation payload with four careers.
pub const VALID_RESPONSE: &str = r#"{
    "recommendations": [
        {
            "title": "Data Scientist",
            "description": "Turns data into decisions.",
            "whyFit": "Your 90% in Mathematics shows quantitative strength.",
            "nextSteps": ["Learn Python", "Study statistics"],
            "growthPotential": "High"
        },
        {
            "title": "Chemical Engineer",
            "description": "Designs industrial processes.",
            "whyFit": "Chemistry and Physics together.",
            "nextSteps": ["Pursue a BEng"],
            "growthPotential": "Medium"
        },
        {
            "title": "Physicist",
            "description": "Studies the laws of nature.",
            "whyFit": "Strong Physics grade.",
            "nextSteps": ["Join a physics olympiad", "Read Feynman"],
            "growthPotential": "Medium"
        },
        {
            "title": "Lab Technician",
            "description": "Runs experiments and maintains equipment.",
            "whyFit": "Hands-on chemistry aptitude.",
            "nextSteps": [],
            "growthPotential": "Low"
        }
    ],
    "overallSummary": "You have a strong STEM profile."
}"#;

pub enum JsonReply {
    Text(String),
    Fail(LlmError),
    /// Never resolves.
    Hang,
    /// Resolves with whatever is sent through the paired sender.
    Gated(oneshot::Receiver<Result<String, LlmError>>),
}

pub enum ChatReply {
    Fragments(Vec<String>),
    /// The request is rejected before any fragment.
    Reject(LlmError),
    /// Some fragments, then a mid-stream failure.
    BreakAfter(Vec<String>, LlmError),
    /// Some fragments, then the stream stalls forever.
    StallAfter(Vec<String>),
}

#[derive(Debug, Clone)]
pub struct RecordedChat {
    pub system_instruction: String,
    pub history: Vec<ChatMessage>,
    pub message: String,
}

#[derive(Default)]
pub struct ScriptedModel {
    json_replies: Mutex<VecDeque<JsonReply>>,
    chat_replies: Mutex<VecDeque<ChatReply>>,
    json_prompts: Mutex<Vec<String>>,
    chats: Mutex<Vec<RecordedChat>>,
}

impl ScriptedModel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_json(&self, reply: JsonReply) {
        self.json_replies.lock().unwrap().push_back(reply);
    }

    pub fn push_json_text(&self, text: impl Into<String>) {
        self.push_json(JsonReply::Text(text.into()));
    }

    pub fn push_chat(&self, reply: ChatReply) {
        self.chat_replies.lock().unwrap().push_back(reply);
    }

    pub fn push_fragments(&self, fragments: &[&str]) {
        self.push_chat(ChatReply::Fragments(
            fragments.iter().map(|f| f.to_string()).collect(),
        ));
    }

    pub fn json_prompts(&self) -> Vec<String> {
        self.json_prompts.lock().unwrap().clone()
    }

    pub fn json_call_count(&self) -> usize {
        self.json_prompts.lock().unwrap().len()
    }

    pub fn chats(&self) -> Vec<RecordedChat> {
        self.chats.lock().unwrap().clone()
    }
}

fn ok_items(fragments: Vec<String>) -> Vec<Result<String, LlmError>> {
    fragments.into_iter().map(Ok).collect()
}

#[async_trait]
impl GenerativeModel for ScriptedModel {
    async fn generate_json(&self, prompt: &str, _schema: &Value) -> Result<String, LlmError> {
        self.json_prompts.lock().unwrap().push(prompt.to_string());
        let reply = self
            .json_replies
            .lock()
            .unwrap()
            .pop_front()
            .expect("no scripted JSON reply left");
        match reply {
            JsonReply::Text(text) => Ok(text),
            JsonReply::Fail(e) => Err(e),
            JsonReply::Hang => futures::future::pending().await,
            JsonReply::Gated(gate) => match gate.await {
                Ok(reply) => reply,
                Err(_) => futures::future::pending().await,
            },
        }
    }

    async fn stream_chat(
        &self,
        system_instruction: &str,
        history: &[ChatMessage],
        message: &str,
    ) -> Result<FragmentStream, LlmError> {
        self.chats.lock().unwrap().push(RecordedChat {
            system_instruction: system_instruction.to_string(),
            history: history.to_vec(),
            message: message.to_string(),
        });
        let reply = self
            .chat_replies
            .lock()
            .unwrap()
            .pop_front()
            .expect("no scripted chat reply left");
        let stream = match reply {
            ChatReply::Fragments(fragments) => futures::stream::iter(ok_items(fragments)).boxed(),
            ChatReply::Reject(e) => return Err(e),
            ChatReply::BreakAfter(fragments, e) => {
                let mut items = ok_items(fragments);
                items.push(Err(e));
                futures::stream::iter(items).boxed()
            }
            ChatReply::StallAfter(fragments) => futures::stream::iter(ok_items(fragments))
                .chain(futures::stream::pending())
                .boxed(),
        };
        Ok(stream)
    }
}
