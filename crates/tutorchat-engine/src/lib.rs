use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use serde_json::{json, Map, Value};
use tutorchat_contracts::attachments::InlineImage;
use tutorchat_contracts::events::{EventPayload, EventWriter};
use tutorchat_contracts::models::ModelSelection;
use tutorchat_contracts::modes::SupportMode;
use tutorchat_contracts::summary::{write_summary, ChatSummary};
use tutorchat_contracts::transcript::{Message, Transcript};

pub mod attachments;
pub mod backend;
pub mod config;
pub mod credentials;
pub mod dispatcher;
pub mod errors;
pub mod export;
pub mod gemini;
pub mod prompts;
pub mod report;
pub mod session;
pub mod settings;

#[cfg(test)]
pub(crate) mod testing;

use backend::ChatBackend;
use config::{resolve_model, session_config};
use credentials::{env_slots, CredentialPicker, CredentialPool, RandomPicker};
use dispatcher::{DispatchStats, Dispatcher, TurnReply, DEFAULT_IMAGE_PROMPT};
use errors::{ChatError, ErrorKind};
use export::export_transcript_html;
use gemini::GeminiBackend;
use prompts::INITIAL_GREETING;
use report::report_message_text;
use session::SessionManager;
use settings::{Settings, SettingsStore};

pub use credentials::NO_CREDENTIALS_MESSAGE;

/// Where a chat process keeps its files, and which environment credentials
/// it starts from.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub out_dir: PathBuf,
    pub events_path: PathBuf,
    pub settings_path: PathBuf,
    pub model_override: Option<String>,
    pub env_slots: Vec<(String, Option<String>)>,
}

impl EngineOptions {
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        let out_dir = out_dir.into();
        Self {
            events_path: out_dir.join("events.jsonl"),
            settings_path: out_dir.join(settings::SETTINGS_FILE_NAME),
            out_dir,
            model_override: None,
            env_slots: env_slots(),
        }
    }
}

/// One chat process: transcript, support mode, settings, and the dispatcher
/// that talks to the chat service.
pub struct TutorEngine {
    out_dir: PathBuf,
    chat_id: String,
    events: EventWriter,
    settings: SettingsStore,
    env_slots: Vec<(String, Option<String>)>,
    model_override: Option<String>,
    dispatcher: Dispatcher,
    transcript: Transcript,
    mode: SupportMode,
    summary_path: PathBuf,
    started_at: String,
}

impl TutorEngine {
    pub fn new(options: EngineOptions) -> Result<Self> {
        Self::with_backend(
            options,
            Arc::new(GeminiBackend::from_env()),
            Box::new(RandomPicker),
        )
    }

    pub fn with_backend(
        options: EngineOptions,
        backend: Arc<dyn ChatBackend>,
        picker: Box<dyn CredentialPicker>,
    ) -> Result<Self> {
        let EngineOptions {
            out_dir,
            events_path,
            settings_path,
            model_override,
            env_slots,
        } = options;
        fs::create_dir_all(&out_dir)?;
        let chat_id = out_dir
            .file_name()
            .and_then(|value| value.to_str())
            .filter(|value| !value.is_empty())
            .unwrap_or("chat-rs")
            .to_string();
        let events = EventWriter::new(events_path, chat_id.clone());
        let settings = SettingsStore::new(settings_path);
        let loaded = settings.load_or_default();

        let pool = CredentialPool::with_settings_key(env_slots.clone(), loaded.usable_api_key());
        let selection = resolve_model(model_override.as_deref().or(loaded.preferred_model()));
        if let Some(warning) = selection.warning() {
            eprintln!("tutorchat warning: {warning}");
        }

        events.emit(
            "chat_started",
            map_object(json!({
                "out_dir": out_dir.to_string_lossy().to_string(),
                "backend": backend.name(),
                "model": selection.model.name,
                "fallback_reason": selection.fallback.as_ref().map(ToString::to_string),
                "credential_slots": pool.slots(),
            })),
        )?;

        let sessions = SessionManager::new(
            pool,
            picker,
            backend,
            session_config(selection.model.name.clone()),
            events.clone(),
        );
        Ok(Self {
            summary_path: out_dir.join("summary.json"),
            out_dir,
            chat_id,
            dispatcher: Dispatcher::new(sessions, events.clone()),
            events,
            settings,
            env_slots,
            model_override,
            transcript: Transcript::with_greeting(INITIAL_GREETING),
            mode: SupportMode::default(),
            started_at: now_utc_iso(),
        })
    }

    pub fn chat_id(&self) -> &str {
        &self.chat_id
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    pub fn emit_event(&self, event_type: &str, payload: EventPayload) -> Result<Value> {
        self.events.emit(event_type, payload)
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn mode(&self) -> SupportMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: SupportMode) {
        self.mode = mode;
    }

    pub fn has_credentials(&self) -> bool {
        self.dispatcher.sessions().has_credentials()
    }

    pub fn credential_slots(&self) -> Vec<String> {
        self.dispatcher.sessions().pool().slots()
    }

    /// Model the next session will use.
    pub fn model(&self) -> &str {
        self.dispatcher.sessions().next_model()
    }

    pub fn stats(&self) -> DispatchStats {
        self.dispatcher.stats()
    }

    pub fn settings(&self) -> Result<Settings> {
        self.settings.load()
    }

    pub fn settings_path(&self) -> &Path {
        self.settings.path()
    }

    /// Sends one student turn and appends both sides to the transcript.
    ///
    /// Nothing is appended when the turn cannot go out at all (no
    /// credential, bad attachment, nothing to send). Service failures are
    /// appended as an error entry and returned as `Ok`.
    pub fn send_message(
        &mut self,
        text: &str,
        image: Option<InlineImage>,
    ) -> Result<&Message, ChatError> {
        let text = match (text.trim(), image.is_some()) {
            ("", false) => {
                return Err(ChatError::new(
                    ErrorKind::EmptyTurn,
                    "Type a question or attach an image first.",
                ))
            }
            ("", true) => DEFAULT_IMAGE_PROMPT,
            (text, _) => text,
        };
        if !self.has_credentials() {
            return Err(ChatError::configuration(NO_CREDENTIALS_MESSAGE));
        }

        let student = Message::user(text, image);
        let reply: TurnReply = self.dispatcher.send_turn(
            text,
            self.mode,
            self.transcript.messages(),
            student.image.as_ref(),
        )?;
        self.transcript.push(student);
        let entry = if reply.is_error() {
            Message::error(reply.text)
        } else {
            Message::model(reply.text)
        };
        Ok(self.transcript.push(entry))
    }

    /// Appends a bannered report entry. Only a missing credential is an error.
    pub fn generate_report(&mut self) -> Result<&Message, ChatError> {
        if !self.has_credentials() {
            return Err(ChatError::configuration(NO_CREDENTIALS_MESSAGE));
        }
        let report = self.dispatcher.generate_report(&self.transcript);
        Ok(self
            .transcript
            .push(Message::model(report_message_text(&report))))
    }

    /// Without a target the export lands in the chat directory.
    pub fn export(&self, target: Option<&Path>) -> Result<PathBuf> {
        let target = target.unwrap_or(&self.out_dir);
        let path = export_transcript_html(&self.transcript, target)?;
        self.events.record(
            "transcript_exported",
            map_object(json!({
                "path": path.to_string_lossy().to_string(),
                "messages": self.transcript.len(),
            })),
        );
        Ok(path)
    }

    pub fn save_api_key(&mut self, key: &str) -> Result<()> {
        self.settings.set_api_key(key)?;
        self.reload_settings()
    }

    pub fn clear_api_key(&mut self) -> Result<()> {
        self.settings.clear_api_key()?;
        self.reload_settings()
    }

    /// Persists the preference; the active conversation keeps its model.
    pub fn set_model(&mut self, requested: &str) -> Result<ModelSelection> {
        let selection = resolve_model(Some(requested));
        self.settings
            .set_preferred_model(Some(selection.model.name.as_str()))?;
        self.dispatcher
            .sessions_mut()
            .set_model(selection.model.name.clone());
        Ok(selection)
    }

    /// Rebuilds the credential pool from the environment captured at start
    /// plus the freshly loaded settings key.
    pub fn reload_settings(&mut self) -> Result<()> {
        let loaded = self.settings.load_or_default();
        let pool = CredentialPool::with_settings_key(self.env_slots.clone(), loaded.usable_api_key());
        let sessions = self.dispatcher.sessions_mut();
        sessions.replace_pool(pool);
        if self.model_override.is_none() {
            if let Some(model) = loaded.preferred_model() {
                sessions.set_model(resolve_model(Some(model)).model.name);
            }
        }
        Ok(())
    }

    /// Starts over with only the greeting; the tutor forgets the old turns too.
    pub fn clear_transcript(&mut self) {
        self.transcript = Transcript::with_greeting(INITIAL_GREETING);
        self.dispatcher.sessions_mut().invalidate_session();
    }

    pub fn finish(&mut self) -> Result<()> {
        let stats = self.dispatcher.stats();
        let summary = ChatSummary {
            chat_id: self.chat_id.clone(),
            started_at: self.started_at.clone(),
            finished_at: now_utc_iso(),
            model: self.dispatcher.sessions().config().model.clone(),
            total_turns: stats.turns,
            quota_retries: stats.quota_retries,
            failed_turns: stats.failed_turns,
            reports: stats.reports,
        };
        write_summary(&self.summary_path, &summary)?;
        self.events.emit(
            "chat_finished",
            map_object(json!({
                "summary_path": self.summary_path.to_string_lossy().to_string(),
                "messages": self.transcript.len(),
            })),
        )?;
        Ok(())
    }
}

pub(crate) fn map_object(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}

fn now_utc_iso() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, false)
}
