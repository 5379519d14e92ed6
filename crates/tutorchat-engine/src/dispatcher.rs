use serde_json::json;
use tutorchat_contracts::attachments::InlineImage;
use tutorchat_contracts::events::EventWriter;
use tutorchat_contracts::modes::SupportMode;
use tutorchat_contracts::transcript::{Message, Transcript};

use crate::backend::Part;
use crate::credentials::NO_CREDENTIALS_MESSAGE;
use crate::errors::{ChatError, ErrorKind};
use crate::map_object;
use crate::prompts::turn_text;
use crate::report;
use crate::session::SessionManager;

pub const EMPTY_REPLY_FALLBACK: &str = "I'm still thinking about that one, give me a moment...";
pub const SEND_FAILURE_MESSAGE: &str =
    "Oops, my connection is a bit unstable right now. Could you ask me again?";
pub const DEFAULT_IMAGE_PROMPT: &str = "Sent a picture of an exercise";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnStatus {
    Answered,
    AnsweredAfterRetry,
    Failed,
}

impl TurnStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TurnStatus::Answered => "answered",
            TurnStatus::AnsweredAfterRetry => "answered_after_retry",
            TurnStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TurnReply {
    pub text: String,
    pub status: TurnStatus,
    pub attempts: u8,
    /// Last underlying failure, kept for diagnostics only.
    pub error: Option<ChatError>,
}

impl TurnReply {
    pub fn is_error(&self) -> bool {
        self.status == TurnStatus::Failed
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub turns: u64,
    pub quota_retries: u64,
    pub failed_turns: u64,
    pub reports: u64,
}

/// Text part first, then at most one inline image part.
pub fn build_turn_parts(
    text: &str,
    mode: SupportMode,
    image: Option<&InlineImage>,
) -> Result<Vec<Part>, ChatError> {
    let mut parts = vec![Part::Text(turn_text(text, mode))];
    if let Some(image) = image {
        parts.push(Part::InlineData {
            mime_type: image.media_type().to_string(),
            data: image.decode()?,
        });
    }
    Ok(parts)
}

/// Sends turns through the session manager with the quota-rotation policy:
/// a quota failure drops the session and credential and the turn is sent
/// once more on a fresh session; nothing is retried a second time.
pub struct Dispatcher {
    sessions: SessionManager,
    events: EventWriter,
    stats: DispatchStats,
}

impl Dispatcher {
    pub fn new(sessions: SessionManager, events: EventWriter) -> Self {
        Self {
            sessions,
            events,
            stats: DispatchStats::default(),
        }
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn sessions_mut(&mut self) -> &mut SessionManager {
        &mut self.sessions
    }

    pub fn stats(&self) -> DispatchStats {
        self.stats
    }

    /// `prior` is the visible conversation before this turn. It is not
    /// resent; the session carries its own history.
    ///
    /// Only local problems are returned as `Err`: a missing credential or a
    /// bad attachment, both detected before anything goes out. Service
    /// failures, including those from connecting or opening the session,
    /// end in a reply with status `Failed`.
    pub fn send_turn(
        &mut self,
        text: &str,
        mode: SupportMode,
        prior: &[Message],
        image: Option<&InlineImage>,
    ) -> Result<TurnReply, ChatError> {
        let parts = build_turn_parts(text, mode, image)?;
        if !self.sessions.has_credentials() {
            return Err(ChatError::configuration(NO_CREDENTIALS_MESSAGE));
        }

        self.stats.turns += 1;
        self.events.record(
            "turn_started",
            map_object(json!({
                "mode": mode.id(),
                "prior_messages": prior.len(),
                "has_image": image.is_some(),
                "chars": text.chars().count(),
            })),
        );

        let reply = match self.attempt(&parts) {
            Ok(text) => self.finish(text, TurnStatus::Answered, 1),
            Err(err) if err.is_configuration() => return Err(err),
            Err(err) if err.kind() == ErrorKind::QuotaExhausted => {
                self.stats.quota_retries += 1;
                self.events.record(
                    "turn_retry",
                    map_object(json!({
                        "reason": err.kind().as_str(),
                        "error": err.message(),
                        "fingerprint": self
                            .sessions
                            .active_credential()
                            .map(|credential| credential.fingerprint()),
                    })),
                );
                self.sessions.invalidate_session();
                match self.attempt(&parts) {
                    Ok(text) => self.finish(text, TurnStatus::AnsweredAfterRetry, 2),
                    Err(retry_err) => self.fail(retry_err, 2),
                }
            }
            Err(err) => self.fail(err, 1),
        };
        Ok(reply)
    }

    pub fn generate_report(&mut self, transcript: &Transcript) -> String {
        self.stats.reports += 1;
        report::generate_report(&mut self.sessions, transcript, &self.events)
    }

    fn attempt(&mut self, parts: &[Part]) -> Result<String, ChatError> {
        let session = self.sessions.ensure_session()?;
        session.send(parts).map_err(ChatError::from_service)
    }

    fn finish(&mut self, text: String, status: TurnStatus, attempts: u8) -> TurnReply {
        let text = if text.trim().is_empty() {
            EMPTY_REPLY_FALLBACK.to_string()
        } else {
            text
        };
        self.events.record(
            "turn_finished",
            map_object(json!({
                "status": status.as_str(),
                "attempts": attempts,
                "reply_chars": text.chars().count(),
                "history_len": self.sessions.history_len(),
            })),
        );
        TurnReply {
            text,
            status,
            attempts,
            error: None,
        }
    }

    fn fail(&mut self, err: ChatError, attempts: u8) -> TurnReply {
        self.stats.failed_turns += 1;
        eprintln!("tutorchat: chat request failed: {err}");
        self.events.record(
            "turn_failed",
            map_object(json!({
                "attempts": attempts,
                "kind": err.kind().as_str(),
                "error": err.message(),
            })),
        );
        TurnReply {
            text: SEND_FAILURE_MESSAGE.to_string(),
            status: TurnStatus::Failed,
            attempts,
            error: Some(err),
        }
    }
}
