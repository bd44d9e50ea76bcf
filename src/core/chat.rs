use chrono::Utc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::api::{LocalUser, RemoteParty};
use crate::core::chat_stream::{ExchangeParams, StreamMessage};
use crate::core::config::Config;
use crate::core::message::Message;
use crate::core::transcript::Transcript;

#[derive(Debug, Error)]
pub enum ChatError {
    /// A second send arrived while an exchange was still streaming. The
    /// caller may retry after the current exchange retires.
    #[error("an exchange is already in flight")]
    ExchangeInFlight,
    /// The session identity pair has not resolved yet; no transcript
    /// activity is allowed.
    #[error("session identities are not resolved yet")]
    IdentityNotReady,
}

/// Work the controller asks its host to perform. Returned instead of
/// executed so state mutation stays synchronous and directly testable.
pub enum ChatCommand {
    SpawnExchange(ExchangeParams),
}

/// Read-only snapshot handed to the chat view.
#[derive(Debug, Clone)]
pub struct ChatView {
    pub remote_party_avatar_url: Option<String>,
    pub local_party_avatar_url: Option<String>,
    pub messages: Vec<Message>,
}

struct ExchangeHandle {
    id: u64,
    cancel: CancellationToken,
}

/// Orchestrates one instructor conversation: optimistic user appends, the
/// exchange lifecycle, and folding stream events into the transcript.
///
/// All mutation happens on the task that owns the controller, in
/// event-arrival order; the receive buffer is owned here and cleared on
/// every completion path, so it can never leak into a later exchange.
pub struct ChatController {
    transcript: Transcript,
    receive_buffer: String,
    client: reqwest::Client,
    config: Config,
    local_user: Option<LocalUser>,
    remote_party: Option<RemoteParty>,
    current_exchange: Option<ExchangeHandle>,
    exchange_counter: u64,
}

impl ChatController {
    pub fn new(config: Config) -> Self {
        Self {
            transcript: Transcript::new(),
            receive_buffer: String::new(),
            client: reqwest::Client::new(),
            config,
            local_user: None,
            remote_party: None,
            current_exchange: None,
            exchange_counter: 0,
        }
    }

    pub fn set_local_user(&mut self, user: LocalUser) {
        self.local_user = Some(user);
    }

    pub fn set_remote_party(&mut self, party: RemoteParty) {
        self.remote_party = Some(party);
    }

    pub fn local_user(&self) -> Option<&LocalUser> {
        self.local_user.as_ref()
    }

    pub fn remote_party(&self) -> Option<&RemoteParty> {
        self.remote_party.as_ref()
    }

    pub fn identities_ready(&self) -> bool {
        self.local_user.is_some() && self.remote_party.is_some()
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn receive_buffer(&self) -> &str {
        &self.receive_buffer
    }

    pub fn is_exchange_in_flight(&self) -> bool {
        self.current_exchange.is_some()
    }

    pub(crate) fn seed_transcript(&mut self, messages: Vec<Message>) {
        self.transcript.seed(messages);
    }

    pub fn view(&self) -> ChatView {
        ChatView {
            remote_party_avatar_url: self
                .remote_party
                .as_ref()
                .and_then(|party| party.avatar_url.clone()),
            local_party_avatar_url: self
                .local_user
                .as_ref()
                .and_then(|user| user.profile.avatar_url.clone()),
            messages: self.transcript.messages().to_vec(),
        }
    }

    /// Open an exchange for one user message.
    ///
    /// The user's message is appended before any network activity; the
    /// returned command carries everything the host needs to start the
    /// stream via [`crate::core::chat_stream::ExchangeStreamService`].
    pub fn send_message(&mut self, text: impl Into<String>) -> Result<ChatCommand, ChatError> {
        if self.current_exchange.is_some() {
            return Err(ChatError::ExchangeInFlight);
        }
        if !self.identities_ready() {
            return Err(ChatError::IdentityNotReady);
        }

        let text = text.into();
        self.transcript.append(Message::user(text.clone(), Utc::now()));

        self.exchange_counter += 1;
        let exchange_id = self.exchange_counter;
        let cancel_token = CancellationToken::new();
        self.current_exchange = Some(ExchangeHandle {
            id: exchange_id,
            cancel: cancel_token.clone(),
        });
        debug!(exchange_id, "opening exchange");

        Ok(ChatCommand::SpawnExchange(ExchangeParams {
            client: self.client.clone(),
            base_url: self.config.base_url.clone(),
            api_token: self.config.api_token.clone(),
            message: text,
            idle_timeout: self.config.stream_idle_timeout(),
            cancel_token,
            exchange_id,
        }))
    }

    fn is_current_exchange(&self, exchange_id: u64) -> bool {
        self.current_exchange
            .as_ref()
            .is_some_and(|exchange| exchange.id == exchange_id)
    }

    /// Fold one stream event into the conversation. Events from any
    /// exchange other than the current one are inert.
    pub fn apply_event(&mut self, event: (StreamMessage, u64)) {
        let (message, exchange_id) = event;
        if !self.is_current_exchange(exchange_id) {
            debug!(exchange_id, "dropping stale stream event");
            return;
        }

        match message {
            StreamMessage::Chunk(text) => {
                self.receive_buffer.push_str(&text);
                if let Err(err) = self
                    .transcript
                    .ingest_buffer(&self.receive_buffer, Utc::now())
                {
                    error!(exchange_id, error = %err, "failed to ingest receive buffer");
                }
            }
            StreamMessage::Error(text) => {
                error!(exchange_id, "exchange failed: {text}");
                self.transcript.append(Message::app_error(text, Utc::now()));
            }
            StreamMessage::End => {
                debug!(exchange_id, "exchange completed");
                self.receive_buffer.clear();
                self.transcript.complete_exchange();
                self.current_exchange = None;
            }
        }
    }

    /// Abort the in-flight exchange, if any. The stream task stops
    /// emitting after cancellation, so retirement happens here instead of
    /// waiting for an `End` that will never arrive.
    pub fn cancel_exchange(&mut self) {
        if let Some(exchange) = self.current_exchange.take() {
            exchange.cancel.cancel();
            self.receive_buffer.clear();
            self.transcript.complete_exchange();
            debug!(exchange_id = exchange.id, "exchange cancelled locally");
        }
    }
}
