use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Model,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::User => "user",
            ChatRole::Model => "model",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub text: String,
}

impl ChatMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            text: text.into(),
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Model,
            text: text.into(),
        }
    }
}

/// Ordered chat turns shown to the student.
///
/// Append-only, except that the trailing model message may be rewritten
/// while its reply is still streaming in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Transcript(Vec<ChatMessage>);

impl Transcript {
    pub fn push(&mut self, message: ChatMessage) {
        self.0.push(message);
    }

    /// Overwrites the text of the last message if it is a model message.
    /// Returns false (and changes nothing) otherwise.
    pub fn replace_tail(&mut self, text: impl Into<String>) -> bool {
        match self.0.last_mut() {
            Some(last) if last.role == ChatRole::Model => {
                last.text = text.into();
                true
            }
            _ => false,
        }
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }
}

#[cfg(test)]
impl Transcript {
    pub fn last(&self) -> Option<&ChatMessage> {
        self.0.last()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
