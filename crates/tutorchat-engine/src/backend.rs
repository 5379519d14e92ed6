use crate::credentials::Credential;
use crate::errors::ServiceError;

/// One piece of a user turn as the chat service receives it.
#[derive(Debug, Clone, PartialEq)]
pub enum Part {
    Text(String),
    InlineData { mime_type: String, data: Vec<u8> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub model: String,
    pub system_instruction: String,
    pub temperature: f64,
    pub max_output_tokens: u32,
}

/// Entry point to a hosted chat service.
pub trait ChatBackend: Send + Sync {
    fn name(&self) -> &str;
    fn connect(&self, credential: &Credential) -> Result<Box<dyn ChatClient>, ServiceError>;
}

/// A client bound to one credential.
pub trait ChatClient: Send {
    /// Starts a conversation with an empty history.
    fn create_session(&self, config: &SessionConfig) -> Result<Box<dyn ChatSession>, ServiceError>;

    /// Single stateless request.
    fn generate(
        &self,
        model: &str,
        system_instruction: Option<&str>,
        prompt: &str,
    ) -> Result<String, ServiceError>;
}

/// A conversation that keeps its own history between turns.
pub trait ChatSession: Send {
    /// Sends one user turn and returns the reply text, which may be empty.
    fn send(&mut self, parts: &[Part]) -> Result<String, ServiceError>;

    fn history_len(&self) -> usize;
}
