use std::fmt;

use tutorchat_contracts::attachments::AttachmentError;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    /// No usable credential; the user has to configure one.
    Configuration,
    QuotaExhausted,
    /// Any other failure of the chat service or the network.
    Service,
    PayloadTooLarge,
    InvalidAttachment,
    /// Neither text nor an image to send.
    EmptyTurn,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Configuration => "configuration",
            ErrorKind::QuotaExhausted => "quota_exhausted",
            ErrorKind::Service => "service",
            ErrorKind::PayloadTooLarge => "payload_too_large",
            ErrorKind::InvalidAttachment => "invalid_attachment",
            ErrorKind::EmptyTurn => "empty_turn",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatError {
    kind: ErrorKind,
    message: String,
}

impl ChatError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Configuration, message)
    }

    pub fn from_service(err: ServiceError) -> Self {
        let kind = if err.is_quota_exhausted() {
            ErrorKind::QuotaExhausted
        } else {
            ErrorKind::Service
        };
        Self::new(kind, err.to_string())
    }

    pub fn from_attachment(err: AttachmentError) -> Self {
        let kind = if err.is_too_large() {
            ErrorKind::PayloadTooLarge
        } else {
            ErrorKind::InvalidAttachment
        };
        Self::new(kind, err.to_string())
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_configuration(&self) -> bool {
        self.kind == ErrorKind::Configuration
    }

    pub fn is_quota_exhausted(&self) -> bool {
        self.kind == ErrorKind::QuotaExhausted
    }
}

impl fmt::Display for ChatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ChatError {}

impl From<AttachmentError> for ChatError {
    fn from(err: AttachmentError) -> Self {
        Self::from_attachment(err)
    }
}

pub const RESOURCE_EXHAUSTED: &str = "RESOURCE_EXHAUSTED";

/// Failure reported by the chat service transport.
///
/// `status` is the HTTP status when the service answered, `service_status`
/// the canonical status string from the error body (`RESOURCE_EXHAUSTED`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceError {
    pub status: Option<u16>,
    pub service_status: Option<String>,
    pub message: String,
}

impl ServiceError {
    pub fn http(status: u16, service_status: Option<String>, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            service_status,
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            status: None,
            service_status: None,
            message: message.into(),
        }
    }

    /// Structured status wins. Only when the transport gave neither an HTTP
    /// status nor a service status is the message text searched for `429`,
    /// `quota` or `resource_exhausted`; that fallback is a heuristic.
    pub fn is_quota_exhausted(&self) -> bool {
        let structured_status = self
            .service_status
            .as_deref()
            .map(|status| status.eq_ignore_ascii_case(RESOURCE_EXHAUSTED));
        match (self.status, structured_status) {
            (Some(code), service) => code == 429 || service.unwrap_or(false),
            (None, Some(service)) => service,
            (None, None) => {
                let lowered = self.message.to_ascii_lowercase();
                lowered.contains("429")
                    || lowered.contains("quota")
                    || lowered.contains("resource_exhausted")
            }
        }
    }
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.status, self.service_status.as_deref()) {
            (Some(code), Some(status)) => {
                write!(f, "chat service error {code} {status}: {}", self.message)
            }
            (Some(code), None) => write!(f, "chat service error {code}: {}", self.message),
            (None, Some(status)) => write!(f, "chat service error {status}: {}", self.message),
            (None, None) => write!(f, "chat service unreachable: {}", self.message),
        }
    }
}

impl std::error::Error for ServiceError {}
