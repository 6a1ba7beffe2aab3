use std::fmt::Display;

/// The action whose failure produced a [`UiError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorSource {
    Load,
    SendMessage,
    DeleteMessage,
    GenerateResponse,
    AddParticipant,
    RemoveParticipant,
    UpdateSettings,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UiError {
    source: ErrorSource,
    message: String,
    timestamp: chrono::DateTime<chrono::Utc>,
}

impl UiError {
    pub fn new(source: ErrorSource, message: impl Into<String>) -> Self {
        Self {
            source,
            message: message.into(),
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn source(&self) -> ErrorSource {
        self.source
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn timestamp(&self) -> chrono::DateTime<chrono::Utc> {
        self.timestamp
    }
}

impl Display for ErrorSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorSource::Load => write!(f, "load"),
            ErrorSource::SendMessage => write!(f, "send message"),
            ErrorSource::DeleteMessage => write!(f, "delete message"),
            ErrorSource::GenerateResponse => write!(f, "generate response"),
            ErrorSource::AddParticipant => write!(f, "add participant"),
            ErrorSource::RemoveParticipant => write!(f, "remove participant"),
            ErrorSource::UpdateSettings => write!(f, "update settings"),
        }
    }
}

impl Display for UiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.source, self.message)
    }
}
