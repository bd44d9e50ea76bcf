use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::message::{Message, TranscriptRole};

/// Body of `POST /chat/send`.
#[derive(Debug, Clone, Serialize)]
pub struct SendMessageRequest {
    pub message: String,
}

/// One persisted transcript entry as the backend stores it. App-authored
/// error entries never cross the wire, so the boolean author flag is
/// enough here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessageDto {
    pub is_user: bool,
    pub content: String,
    pub created_at_utc: DateTime<Utc>,
}

impl From<ChatMessageDto> for Message {
    fn from(dto: ChatMessageDto) -> Self {
        let role = if dto.is_user {
            TranscriptRole::User
        } else {
            TranscriptRole::Assistant
        };
        Message::new(role, dto.content, dto.created_at_utc)
    }
}

/// One SSE delta from the send-message stream. Anything else on the wire
/// (an error body, a malformed payload) must fail to parse so the stream
/// task can route it to the error path.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StreamChunkDto {
    pub text: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub first_name: String,
    pub avatar_url: Option<String>,
}

/// The signed-in learner, resolved by the dashboard's session layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalUser {
    pub id: String,
    pub profile: UserProfile,
}

/// The assigned AI instructor, resolved by the dashboard's profile layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteParty {
    pub name: String,
    pub avatar_url: Option<String>,
}

pub mod history;
