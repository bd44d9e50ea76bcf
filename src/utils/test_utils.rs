#[cfg(test)]
use crate::api::{LocalUser, RemoteParty, UserProfile};
#[cfg(test)]
use crate::core::chat::ChatController;
#[cfg(test)]
use crate::core::config::Config;

#[cfg(test)]
pub fn create_test_config() -> Config {
    Config {
        base_url: "https://api.test.mentora.app/v1".to_string(),
        api_token: "test-token".to_string(),
        stream_idle_timeout_secs: 5,
        history_fetch_attempts: 3,
        history_retry_base_ms: 0,
    }
}

#[cfg(test)]
pub fn test_local_user() -> LocalUser {
    LocalUser {
        id: "user-1".to_string(),
        profile: UserProfile {
            first_name: "Sofia".to_string(),
            avatar_url: Some("https://cdn.test.mentora.app/avatars/sofia.png".to_string()),
        },
    }
}

#[cfg(test)]
pub fn test_remote_party() -> RemoteParty {
    RemoteParty {
        name: "Prof. Byte".to_string(),
        avatar_url: Some("https://cdn.test.mentora.app/avatars/prof-byte.png".to_string()),
    }
}

#[cfg(test)]
pub fn create_test_controller() -> ChatController {
    let mut controller = ChatController::new(create_test_config());
    controller.set_local_user(test_local_user());
    controller.set_remote_party(test_remote_party());
    controller
}
