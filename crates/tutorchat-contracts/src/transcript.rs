use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::attachments::InlineImage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Model => "model",
        }
    }
}

/// One entry of the visible conversation. Entries are never edited once
/// appended; a failed turn is recorded as a separate model entry flagged
/// with `is_error`.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub text: String,
    pub image: Option<InlineImage>,
    pub timestamp: DateTime<Local>,
    pub is_error: bool,
}

impl Message {
    fn new(role: Role, text: impl Into<String>, image: Option<InlineImage>, is_error: bool) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            text: text.into(),
            image,
            timestamp: Local::now(),
            is_error,
        }
    }

    pub fn user(text: impl Into<String>, image: Option<InlineImage>) -> Self {
        Self::new(Role::User, text, image, false)
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self::new(Role::Model, text, None, false)
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self::new(Role::Model, text, None, true)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transcript {
    messages: Vec<Message>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_greeting(greeting: &str) -> Self {
        let mut transcript = Self::new();
        transcript.push(Message::model(greeting));
        transcript
    }

    pub fn push(&mut self, message: Message) -> &Message {
        self.messages.push(message);
        &self.messages[self.messages.len() - 1]
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn user_turns(&self) -> usize {
        self.messages
            .iter()
            .filter(|message| message.role == Role::User)
            .count()
    }

    /// Role-tagged lines (`user: ...`, `model: ...`), one message per line.
    pub fn conversation_text(&self) -> String {
        self.messages
            .iter()
            .map(|message| format!("{}: {}", message.role.as_str(), message.text))
            .collect::<Vec<String>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use crate::attachments::InlineImage;

    use super::{Message, Role, Transcript};

    #[test]
    fn conversation_text_tags_roles() {
        let mut transcript = Transcript::with_greeting("Hello!");
        transcript.push(Message::user("What is 2 + 2?", None));
        transcript.push(Message::model("Try counting on your fingers."));
        assert_eq!(
            transcript.conversation_text(),
            "model: Hello!\nuser: What is 2 + 2?\nmodel: Try counting on your fingers."
        );
        assert_eq!(transcript.user_turns(), 1);
    }

    #[test]
    fn empty_transcript_has_empty_conversation() {
        let transcript = Transcript::new();
        assert!(transcript.is_empty());
        assert_eq!(transcript.conversation_text(), "");
    }

    #[test]
    fn constructors_set_role_and_flags() {
        let image = InlineImage::from_data_url("data:image/png;base64,AAAA").ok();
        let user = Message::user("see picture", image.clone());
        assert_eq!(user.role, Role::User);
        assert_eq!(user.image, image);
        assert!(!user.is_error);

        let error = Message::error("network trouble");
        assert_eq!(error.role, Role::Model);
        assert!(error.is_error);
        assert_ne!(user.id, error.id);
    }

    #[test]
    fn push_returns_the_appended_message() {
        let mut transcript = Transcript::new();
        let id = transcript.push(Message::model("first")).id.clone();
        assert_eq!(transcript.last().map(|message| message.id.clone()), Some(id));
        assert_eq!(transcript.len(), 1);
    }
}
