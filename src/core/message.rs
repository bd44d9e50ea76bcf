use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Author of a transcript entry.
///
/// `AppError` entries are rendered in the transcript but never transmitted
/// to or received from the Mentora backend; they record a failed exchange
/// in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TranscriptRole {
    User,
    Assistant,
    AppError,
}

impl TranscriptRole {
    pub fn as_str(self) -> &'static str {
        match self {
            TranscriptRole::User => "user",
            TranscriptRole::Assistant => "assistant",
            TranscriptRole::AppError => "app/error",
        }
    }

    pub fn is_user(self) -> bool {
        self == TranscriptRole::User
    }

    pub fn is_assistant(self) -> bool {
        self == TranscriptRole::Assistant
    }
}

impl AsRef<str> for TranscriptRole {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl TryFrom<&str> for TranscriptRole {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "user" => Ok(TranscriptRole::User),
            "assistant" => Ok(TranscriptRole::Assistant),
            "app/error" => Ok(TranscriptRole::AppError),
            _ => Err(format!("invalid transcript role: {value}")),
        }
    }
}

impl TryFrom<String> for TranscriptRole {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::try_from(value.as_str())
    }
}

impl From<TranscriptRole> for String {
    fn from(value: TranscriptRole) -> Self {
        value.as_str().to_string()
    }
}

/// One transcript entry. Immutable once a newer entry has been appended;
/// only the last entry may be rewritten, and only while an assistant reply
/// is still streaming.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: TranscriptRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn new(role: TranscriptRole, content: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            role,
            content: content.into(),
            created_at,
        }
    }

    pub fn user(content: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self::new(TranscriptRole::User, content, created_at)
    }

    pub fn assistant(content: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self::new(TranscriptRole::Assistant, content, created_at)
    }

    pub fn app_error(content: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self::new(TranscriptRole::AppError, content, created_at)
    }

    pub fn is_user(&self) -> bool {
        self.role.is_user()
    }

    pub fn is_assistant(&self) -> bool {
        self.role.is_assistant()
    }
}
