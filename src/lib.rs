//! Mentora's streaming chat core: the transcript synchronizer behind the
//! dashboard's AI-instructor conversation.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`core`] owns the transcript store, the exchange lifecycle, history
//!   seeding, streaming transport, and configuration.
//! - [`api`] defines the wire payloads exchanged with the Mentora backend
//!   and the [`api::history::ChatBackend`] collaborator trait.
//! - [`utils`] holds URL normalization, tracing setup, and test helpers.
//!
//! A host application wires the pieces together by creating an
//! [`core::chat_stream::ExchangeStreamService`] (which yields the event
//! receiver), a [`core::chat::ChatController`], and a
//! [`core::history::HistoryLoader`], then draining stream events into
//! [`core::chat::ChatController::apply_event`] in arrival order.

pub mod api;
pub mod core;
pub mod utils;
