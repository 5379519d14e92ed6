use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::backend::{ChatBackend, ChatClient, ChatSession, Part, SessionConfig};
use crate::credentials::Credential;
use crate::errors::ServiceError;

type Reply = Result<String, ServiceError>;

#[derive(Default)]
struct ScriptState {
    replies: VecDeque<Reply>,
    generations: VecDeque<Reply>,
    connect_failures: VecDeque<ServiceError>,
    session_failures: VecDeque<ServiceError>,
    connected_secrets: Vec<String>,
    session_models: Vec<String>,
    sent_turns: Vec<Vec<Part>>,
    generate_calls: Vec<GenerateCall>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct GenerateCall {
    pub model: String,
    pub system_instruction: Option<String>,
    pub prompt: String,
}

/// In-memory backend that replays queued results and records every call.
/// An empty queue answers `"ok"`.
#[derive(Clone, Default)]
pub(crate) struct ScriptedBackend {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, ScriptState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn push_reply(&self, reply: Reply) {
        self.state().replies.push_back(reply);
    }

    pub fn push_generate(&self, reply: Reply) {
        self.state().generations.push_back(reply);
    }

    /// The next `connect` records the secret and then fails with `err`.
    pub fn fail_next_connect(&self, err: ServiceError) {
        self.state().connect_failures.push_back(err);
    }

    pub fn fail_next_session(&self, err: ServiceError) {
        self.state().session_failures.push_back(err);
    }

    pub fn connects(&self) -> usize {
        self.state().connected_secrets.len()
    }

    pub fn connected_secrets(&self) -> Vec<String> {
        self.state().connected_secrets.clone()
    }

    pub fn sessions_created(&self) -> usize {
        self.state().session_models.len()
    }

    pub fn session_models(&self) -> Vec<String> {
        self.state().session_models.clone()
    }

    pub fn sent_turns(&self) -> Vec<Vec<Part>> {
        self.state().sent_turns.clone()
    }

    pub fn generate_calls(&self) -> Vec<GenerateCall> {
        self.state().generate_calls.clone()
    }
}

impl ChatBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    fn connect(&self, credential: &Credential) -> Result<Box<dyn ChatClient>, ServiceError> {
        let mut state = self.state();
        state
            .connected_secrets
            .push(credential.secret().to_string());
        if let Some(err) = state.connect_failures.pop_front() {
            return Err(err);
        }
        Ok(Box::new(ScriptedClient {
            backend: self.clone(),
        }))
    }
}

struct ScriptedClient {
    backend: ScriptedBackend,
}

impl ChatClient for ScriptedClient {
    fn create_session(&self, config: &SessionConfig) -> Result<Box<dyn ChatSession>, ServiceError> {
        let mut state = self.backend.state();
        if let Some(err) = state.session_failures.pop_front() {
            return Err(err);
        }
        state.session_models.push(config.model.clone());
        Ok(Box::new(ScriptedSession {
            backend: self.backend.clone(),
            history: 0,
        }))
    }

    fn generate(
        &self,
        model: &str,
        system_instruction: Option<&str>,
        prompt: &str,
    ) -> Result<String, ServiceError> {
        let mut state = self.backend.state();
        state.generate_calls.push(GenerateCall {
            model: model.to_string(),
            system_instruction: system_instruction.map(str::to_string),
            prompt: prompt.to_string(),
        });
        state
            .generations
            .pop_front()
            .unwrap_or_else(|| Ok("ok".to_string()))
    }
}

struct ScriptedSession {
    backend: ScriptedBackend,
    history: usize,
}

impl ChatSession for ScriptedSession {
    fn send(&mut self, parts: &[Part]) -> Result<String, ServiceError> {
        let reply = {
            let mut state = self.backend.state();
            state.sent_turns.push(parts.to_vec());
            state
                .replies
                .pop_front()
                .unwrap_or_else(|| Ok("ok".to_string()))
        };
        if reply.is_ok() {
            self.history += 2;
        }
        reply
    }

    fn history_len(&self) -> usize {
        self.history
    }
}
