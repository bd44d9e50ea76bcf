use std::time::Duration;

use chrono::Utc;
use tracing::{debug, warn};

use crate::api::history::{ApiError, ChatBackend};
use crate::core::chat::ChatController;
use crate::core::config::Config;
use crate::core::message::Message;

const STARTING_POINT_GREETING: &str =
    "Is there anywhere you'd like to start, or would you like me to help identify a good starting point for you?";

fn welcome_greeting(first_name: &str, instructor_name: &str) -> String {
    format!(
        "Hello, {first_name}! Welcome to Mentora - I'm {instructor_name}, your instructor.\n\
         Now that you've completed the onboarding process, let's get started with planning your first few courses!"
    )
}

/// Result of one seeding attempt.
#[derive(Debug)]
pub enum SeedOutcome {
    /// One or both identities are still unresolved; nothing happened.
    NotReady,
    /// This identity pair already seeded the transcript; nothing happened.
    AlreadySeeded,
    /// Greetings plus the fetched history landed in the store.
    Seeded { history_len: usize },
    /// Every fetch attempt failed; the store holds the greetings alone.
    GreetingsOnly { error: ApiError },
}

/// Seeds the transcript exactly once per resolved identity pair: two
/// synthesized greetings (never persisted remotely, fresh each session)
/// followed by the fetched history in its returned order.
pub struct HistoryLoader {
    seeded_for: Option<(String, String)>,
    fetch_attempts: u32,
    retry_base: Duration,
}

impl HistoryLoader {
    pub fn new(fetch_attempts: u32, retry_base: Duration) -> Self {
        Self {
            seeded_for: None,
            fetch_attempts: fetch_attempts.max(1),
            retry_base,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.history_fetch_attempts, config.history_retry_base())
    }

    /// Seed the controller's transcript if both identities have resolved
    /// and this pair has not seeded before. Transcript changes alone never
    /// re-trigger seeding; only a different identity pair re-arms it.
    ///
    /// The seed vector is assembled in full before the store is touched,
    /// so the transcript is never left partially seeded.
    pub async fn seed_if_ready(
        &mut self,
        controller: &mut ChatController,
        backend: &dyn ChatBackend,
    ) -> SeedOutcome {
        let (pair, first_name, instructor_name) = {
            let (Some(user), Some(party)) = (controller.local_user(), controller.remote_party())
            else {
                return SeedOutcome::NotReady;
            };
            (
                (user.id.clone(), party.name.clone()),
                user.profile.first_name.clone(),
                party.name.clone(),
            )
        };

        if self.seeded_for.as_ref() == Some(&pair) {
            return SeedOutcome::AlreadySeeded;
        }

        let now = Utc::now();
        let mut seed = vec![
            Message::assistant(welcome_greeting(&first_name, &instructor_name), now),
            Message::assistant(STARTING_POINT_GREETING, now),
        ];

        let outcome = match self.fetch_with_retry(backend).await {
            Ok(history) => {
                let history_len = history.len();
                seed.extend(history.into_iter().map(Message::from));
                debug!(history_len, "seeding transcript with fetched history");
                SeedOutcome::Seeded { history_len }
            }
            Err(error) => {
                warn!(error = %error, "history fetch failed; seeding greetings only");
                SeedOutcome::GreetingsOnly { error }
            }
        };

        controller.seed_transcript(seed);
        self.seeded_for = Some(pair);
        outcome
    }

    async fn fetch_with_retry(
        &self,
        backend: &dyn ChatBackend,
    ) -> Result<Vec<crate::api::ChatMessageDto>, ApiError> {
        let mut attempt = 1;
        loop {
            match backend.get_history().await {
                Ok(history) => return Ok(history),
                Err(error) if attempt < self.fetch_attempts => {
                    let delay = self.retry_base * 2u32.pow(attempt - 1);
                    debug!(attempt, delay_ms = delay.as_millis() as u64, error = %error,
                        "history fetch failed; retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ChatMessageDto;
    use crate::core::message::TranscriptRole;
    use crate::utils::test_utils::{
        create_test_controller, test_local_user, test_remote_party,
    };
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct FakeBackend {
        responses: Mutex<VecDeque<Result<Vec<ChatMessageDto>, ApiError>>>,
        calls: AtomicUsize,
    }

    impl FakeBackend {
        fn new(responses: Vec<Result<Vec<ChatMessageDto>, ApiError>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ChatBackend for FakeBackend {
        async fn get_history(&self) -> Result<Vec<ChatMessageDto>, ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Vec::new()))
        }
    }

    fn server_error() -> ApiError {
        ApiError::Status {
            status: reqwest::StatusCode::INTERNAL_SERVER_ERROR,
            body: "boom".to_string(),
        }
    }

    fn history_dto(is_user: bool, content: &str) -> ChatMessageDto {
        ChatMessageDto {
            is_user,
            content: content.to_string(),
            created_at_utc: Utc::now(),
        }
    }

    fn test_loader() -> HistoryLoader {
        HistoryLoader::new(3, Duration::ZERO)
    }

    #[tokio::test]
    async fn defers_until_both_identities_resolve() {
        let mut controller = crate::core::chat::ChatController::new(Config::default());
        let backend = FakeBackend::new(vec![]);
        let mut loader = test_loader();

        assert!(matches!(
            loader.seed_if_ready(&mut controller, &backend).await,
            SeedOutcome::NotReady
        ));

        controller.set_local_user(test_local_user());
        assert!(matches!(
            loader.seed_if_ready(&mut controller, &backend).await,
            SeedOutcome::NotReady
        ));
        assert_eq!(backend.calls(), 0);
        assert!(controller.transcript().is_empty());

        controller.set_remote_party(test_remote_party());
        assert!(matches!(
            loader.seed_if_ready(&mut controller, &backend).await,
            SeedOutcome::Seeded { .. }
        ));
    }

    #[tokio::test]
    async fn seeds_two_greetings_then_history_in_order() {
        let mut controller = create_test_controller();
        let backend = FakeBackend::new(vec![Ok(vec![
            history_dto(true, "How do lifetimes work?"),
            history_dto(false, "Let's walk through borrowing first."),
        ])]);
        let mut loader = test_loader();

        let outcome = loader.seed_if_ready(&mut controller, &backend).await;
        assert!(matches!(outcome, SeedOutcome::Seeded { history_len: 2 }));

        let messages = controller.transcript().messages();
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].role, TranscriptRole::Assistant);
        assert!(messages[0].content.contains("Hello, Sofia!"));
        assert!(messages[0].content.contains("Prof. Byte"));
        assert_eq!(messages[1].content, STARTING_POINT_GREETING);
        assert_eq!(messages[2].content, "How do lifetimes work?");
        assert_eq!(messages[2].role, TranscriptRole::User);
        assert_eq!(messages[3].content, "Let's walk through borrowing first.");
    }

    #[tokio::test]
    async fn never_refires_for_the_same_identity_pair() {
        let mut controller = create_test_controller();
        let backend = FakeBackend::new(vec![Ok(vec![history_dto(true, "hi")])]);
        let mut loader = test_loader();

        loader.seed_if_ready(&mut controller, &backend).await;
        let seeded_len = controller.transcript().len();

        // Mutating the transcript must not re-arm the loader.
        let command = controller.send_message("new question").unwrap();
        drop(command);

        assert!(matches!(
            loader.seed_if_ready(&mut controller, &backend).await,
            SeedOutcome::AlreadySeeded
        ));
        assert_eq!(backend.calls(), 1);
        assert_eq!(controller.transcript().len(), seeded_len + 1);
    }

    #[tokio::test]
    async fn a_new_identity_pair_rearms_the_loader() {
        let mut controller = create_test_controller();
        let backend = FakeBackend::new(vec![Ok(vec![]), Ok(vec![])]);
        let mut loader = test_loader();

        loader.seed_if_ready(&mut controller, &backend).await;

        let mut other = test_remote_party();
        other.name = "Dr. Stack".to_string();
        controller.set_remote_party(other);

        let outcome = loader.seed_if_ready(&mut controller, &backend).await;
        assert!(matches!(outcome, SeedOutcome::Seeded { .. }));
        assert_eq!(backend.calls(), 2);
        assert!(controller
            .transcript()
            .messages()[0]
            .content
            .contains("Dr. Stack"));
    }

    #[tokio::test]
    async fn retries_then_succeeds() {
        let mut controller = create_test_controller();
        let backend = FakeBackend::new(vec![
            Err(server_error()),
            Ok(vec![history_dto(false, "Welcome back.")]),
        ]);
        let mut loader = test_loader();

        let outcome = loader.seed_if_ready(&mut controller, &backend).await;

        assert!(matches!(outcome, SeedOutcome::Seeded { history_len: 1 }));
        assert_eq!(backend.calls(), 2);
    }

    #[tokio::test]
    async fn falls_back_to_greetings_when_every_attempt_fails() {
        let mut controller = create_test_controller();
        let backend = FakeBackend::new(vec![
            Err(server_error()),
            Err(server_error()),
            Err(server_error()),
        ]);
        let mut loader = test_loader();

        let outcome = loader.seed_if_ready(&mut controller, &backend).await;

        assert!(matches!(outcome, SeedOutcome::GreetingsOnly { .. }));
        assert_eq!(backend.calls(), 3);

        let messages = controller.transcript().messages();
        assert_eq!(messages.len(), 2);
        assert!(messages.iter().all(|m| m.role == TranscriptRole::Assistant));

        // The failed pair is considered handled; no background re-fire.
        assert!(matches!(
            loader.seed_if_ready(&mut controller, &backend).await,
            SeedOutcome::AlreadySeeded
        ));
    }
}
