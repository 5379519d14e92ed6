use std::sync::Arc;

use serde_json::json;
use tutorchat_contracts::events::EventWriter;

use crate::backend::{ChatBackend, ChatClient, ChatSession, SessionConfig};
use crate::credentials::{Credential, CredentialPicker, CredentialPool, NO_CREDENTIALS_MESSAGE};
use crate::errors::ChatError;
use crate::map_object;

struct ActiveClient {
    credential: Credential,
    client: Box<dyn ChatClient>,
}

/// Owns the memoized client and the active conversation.
///
/// Both are created lazily and dropped together by `invalidate_session`, so
/// the next use draws a credential again. There is no locking: callers hold
/// the manager mutably for the whole turn.
pub struct SessionManager {
    pool: CredentialPool,
    picker: Box<dyn CredentialPicker>,
    backend: Arc<dyn ChatBackend>,
    config: SessionConfig,
    pending_model: Option<String>,
    client: Option<ActiveClient>,
    session: Option<Box<dyn ChatSession>>,
    selections: u64,
    events: EventWriter,
}

impl SessionManager {
    pub fn new(
        pool: CredentialPool,
        picker: Box<dyn CredentialPicker>,
        backend: Arc<dyn ChatBackend>,
        config: SessionConfig,
        events: EventWriter,
    ) -> Self {
        Self {
            pool,
            picker,
            backend,
            config,
            pending_model: None,
            client: None,
            session: None,
            selections: 0,
            events,
        }
    }

    pub fn pool(&self) -> &CredentialPool {
        &self.pool
    }

    pub fn has_credentials(&self) -> bool {
        !self.pool.is_empty()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Model for the next session; the active one keeps its model.
    pub fn set_model(&mut self, model: impl Into<String>) {
        self.pending_model = Some(model.into());
    }

    pub fn next_model(&self) -> &str {
        self.pending_model
            .as_deref()
            .unwrap_or(self.config.model.as_str())
    }

    /// Swaps in a freshly loaded pool and drops whatever was bound to the old one.
    pub fn replace_pool(&mut self, pool: CredentialPool) {
        self.pool = pool;
        self.invalidate_session();
    }

    pub fn selections(&self) -> u64 {
        self.selections
    }

    pub fn active_credential(&self) -> Option<&Credential> {
        self.client.as_ref().map(|active| &active.credential)
    }

    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    /// Entries in the active conversation's own history.
    pub fn history_len(&self) -> usize {
        self.session
            .as_ref()
            .map_or(0, |session| session.history_len())
    }

    pub fn ensure_client(&mut self) -> Result<&dyn ChatClient, ChatError> {
        if self.client.is_none() {
            if self.pool.is_empty() {
                return Err(ChatError::configuration(NO_CREDENTIALS_MESSAGE));
            }
            let credential = self
                .picker
                .pick(&self.pool)
                .cloned()
                .ok_or_else(|| ChatError::configuration(NO_CREDENTIALS_MESSAGE))?;
            self.selections += 1;
            self.events.record(
                "credential_selected",
                map_object(json!({
                    "slot": credential.slot(),
                    "fingerprint": credential.fingerprint(),
                    "pool_size": self.pool.len(),
                    "selection": self.selections,
                })),
            );
            let client = self
                .backend
                .connect(&credential)
                .map_err(ChatError::from_service)?;
            self.client = Some(ActiveClient { credential, client });
        }
        match self.client.as_ref() {
            Some(active) => Ok(active.client.as_ref()),
            None => Err(ChatError::configuration(NO_CREDENTIALS_MESSAGE)),
        }
    }

    pub fn ensure_session(&mut self) -> Result<&mut dyn ChatSession, ChatError> {
        if self.session.is_none() {
            if let Some(model) = self.pending_model.take() {
                self.config.model = model;
            }
            let config = self.config.clone();
            let session = self
                .ensure_client()?
                .create_session(&config)
                .map_err(ChatError::from_service)?;
            self.events.record(
                "session_created",
                map_object(json!({
                    "backend": self.backend.name(),
                    "model": self.config.model,
                    "fingerprint": self.active_credential().map(Credential::fingerprint),
                    "temperature": self.config.temperature,
                    "max_output_tokens": self.config.max_output_tokens,
                })),
            );
            self.session = Some(session);
        }
        match self.session.as_deref_mut() {
            Some(session) => Ok(session),
            None => Err(ChatError::configuration(NO_CREDENTIALS_MESSAGE)),
        }
    }

    pub fn invalidate_session(&mut self) {
        let had_session = self.session.take().is_some();
        let dropped = self.client.take().map(|active| active.credential);
        self.events.record(
            "session_invalidated",
            map_object(json!({
                "had_session": had_session,
                "fingerprint": dropped.as_ref().map(Credential::fingerprint),
            })),
        );
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tutorchat_contracts::events::EventWriter;

    use super::SessionManager;
    use crate::config::session_config;
    use crate::credentials::{CredentialPool, RandomPicker, RoundRobinPicker};
    use crate::errors::ErrorKind;
    use crate::testing::ScriptedBackend;

    fn pool(keys: &[&str]) -> CredentialPool {
        CredentialPool::from_slots(
            keys.iter()
                .enumerate()
                .map(|(idx, key)| (format!("GEMINI_API_KEY_{}", idx + 1), Some(key.to_string()))),
        )
    }

    fn manager(keys: &[&str], backend: &ScriptedBackend) -> SessionManager {
        SessionManager::new(
            pool(keys),
            Box::new(RandomPicker),
            Arc::new(backend.clone()),
            session_config("gemini-3-flash-preview"),
            EventWriter::discard("chat-test"),
        )
    }

    #[test]
    fn ensure_session_binds_a_pool_member() {
        let backend = ScriptedBackend::new();
        let mut sessions = manager(&["k1", "k2", "k3"], &backend);
        for _ in 0..20 {
            sessions.invalidate_session();
            assert!(sessions.ensure_session().is_ok());
            let secret = sessions
                .active_credential()
                .map(|credential| credential.secret().to_string())
                .unwrap_or_default();
            assert!(["k1", "k2", "k3"].contains(&secret.as_str()));
        }
        assert_eq!(sessions.selections(), 20);
    }

    #[test]
    fn empty_pool_fails_with_configuration_and_never_connects() {
        let backend = ScriptedBackend::new();
        let mut sessions = manager(&[], &backend);
        let err = sessions.ensure_session().err().map(|err| err.kind());
        assert_eq!(err, Some(ErrorKind::Configuration));
        assert!(sessions.ensure_client().is_err());
        assert_eq!(backend.connects(), 0);
        assert_eq!(sessions.selections(), 0);
    }

    #[test]
    fn session_is_cached_until_invalidated() {
        let backend = ScriptedBackend::new();
        let mut sessions = manager(&["k1"], &backend);
        assert!(sessions.ensure_session().is_ok());
        assert!(sessions.ensure_session().is_ok());
        assert_eq!(backend.sessions_created(), 1);
        assert_eq!(backend.connects(), 1);

        sessions.invalidate_session();
        assert!(!sessions.has_session());
        assert!(sessions.active_credential().is_none());
        assert!(sessions.ensure_session().is_ok());
        assert_eq!(backend.sessions_created(), 2);
        assert_eq!(backend.connects(), 2);
    }

    #[test]
    fn model_change_applies_to_next_session_only() {
        let backend = ScriptedBackend::new();
        let mut sessions = manager(&["k1"], &backend);
        assert!(sessions.ensure_session().is_ok());
        sessions.set_model("gemini-2.5-pro");
        assert_eq!(sessions.config().model, "gemini-3-flash-preview");
        assert_eq!(sessions.next_model(), "gemini-2.5-pro");

        sessions.invalidate_session();
        assert!(sessions.ensure_session().is_ok());
        assert_eq!(sessions.config().model, "gemini-2.5-pro");
        assert_eq!(
            backend.session_models(),
            vec!["gemini-3-flash-preview", "gemini-2.5-pro"]
        );
    }

    #[test]
    fn replace_pool_drops_bound_client() {
        let backend = ScriptedBackend::new();
        let mut sessions = SessionManager::new(
            pool(&["k1", "k2"]),
            Box::new(RoundRobinPicker::default()),
            Arc::new(backend.clone()),
            session_config("gemini-3-flash-preview"),
            EventWriter::discard("chat-test"),
        );
        assert!(sessions.ensure_session().is_ok());
        assert_eq!(
            sessions.active_credential().map(|c| c.secret().to_string()),
            Some("k1".to_string())
        );

        sessions.replace_pool(pool(&["k9"]));
        assert!(!sessions.has_session());
        assert!(sessions.ensure_session().is_ok());
        assert_eq!(
            sessions.active_credential().map(|c| c.secret().to_string()),
            Some("k9".to_string())
        );
    }
}
