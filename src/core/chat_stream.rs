use std::time::Duration;

use futures_util::StreamExt;
use memchr::memchr;
use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::api::{SendMessageRequest, StreamChunkDto};
use crate::utils::url::construct_api_url;

/// One event from an in-flight exchange, delivered in arrival order.
#[derive(Clone, Debug)]
pub enum StreamMessage {
    Chunk(String),
    Error(String),
    End,
}

fn extract_data_payload(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim_start)
}

fn handle_data_payload(
    payload: &str,
    tx: &mpsc::UnboundedSender<(StreamMessage, u64)>,
    exchange_id: u64,
) -> bool {
    if payload == "[DONE]" {
        let _ = tx.send((StreamMessage::End, exchange_id));
        return true;
    }

    match serde_json::from_str::<StreamChunkDto>(payload) {
        Ok(delta) => {
            if let Some(text) = delta.text {
                let _ = tx.send((StreamMessage::Chunk(text), exchange_id));
            }
            false
        }
        Err(_) => {
            if payload.trim().is_empty() {
                return false;
            }

            let _ = tx.send((StreamMessage::Error(format_stream_error(payload)), exchange_id));
            let _ = tx.send((StreamMessage::End, exchange_id));
            true
        }
    }
}

fn process_sse_line(
    line: &str,
    tx: &mpsc::UnboundedSender<(StreamMessage, u64)>,
    exchange_id: u64,
) -> bool {
    extract_data_payload(line)
        .map(|payload| handle_data_payload(payload, tx, exchange_id))
        .unwrap_or(false)
}

fn format_stream_error(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return "instructor stream failed with an empty error body".to_string();
    }

    if let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) {
        let summary = value
            .pointer("/error/message")
            .and_then(|v| v.as_str())
            .or_else(|| value.get("detail").and_then(|v| v.as_str()))
            .or_else(|| value.get("message").and_then(|v| v.as_str()));
        if let Some(summary) = summary {
            let collapsed = summary.split_whitespace().collect::<Vec<_>>().join(" ");
            if !collapsed.is_empty() {
                return format!("instructor stream failed: {collapsed}");
            }
        }
    }

    format!("instructor stream failed: {trimmed}")
}

/// Everything a spawned exchange task needs to run independently of the
/// controller that prepared it.
pub struct ExchangeParams {
    pub client: reqwest::Client,
    pub base_url: String,
    pub api_token: String,
    pub message: String,
    pub idle_timeout: Duration,
    pub cancel_token: tokio_util::sync::CancellationToken,
    pub exchange_id: u64,
}

/// Spawns exchange tasks and fans their events into one unbounded channel.
/// The channel preserves chunk-arrival order; the receiver half is handed
/// to whatever drives [`crate::core::chat::ChatController::apply_event`].
#[derive(Clone)]
pub struct ExchangeStreamService {
    tx: mpsc::UnboundedSender<(StreamMessage, u64)>,
}

impl ExchangeStreamService {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<(StreamMessage, u64)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Run one exchange to completion on a background task. Every path out
    /// of the task ends with `StreamMessage::End` except cancellation,
    /// which the controller retires locally.
    pub fn spawn_exchange(&self, params: ExchangeParams) {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let ExchangeParams {
                client,
                base_url,
                api_token,
                message,
                idle_timeout,
                cancel_token,
                exchange_id,
            } = params;

            tokio::select! {
                _ = run_exchange(
                    client,
                    base_url,
                    api_token,
                    message,
                    idle_timeout,
                    exchange_id,
                    &tx,
                ) => {}
                _ = cancel_token.cancelled() => {
                    debug!(exchange_id, "exchange cancelled");
                }
            }
        });
    }

    #[cfg(test)]
    pub fn send_for_test(&self, message: StreamMessage, exchange_id: u64) {
        let _ = self.tx.send((message, exchange_id));
    }
}

async fn run_exchange(
    client: reqwest::Client,
    base_url: String,
    api_token: String,
    message: String,
    idle_timeout: Duration,
    exchange_id: u64,
    tx: &mpsc::UnboundedSender<(StreamMessage, u64)>,
) {
    let send_url = construct_api_url(&base_url, "chat/send");
    let request = SendMessageRequest { message };

    let response = match client
        .post(send_url)
        .header("Content-Type", "application/json")
        .header("Authorization", format!("Bearer {api_token}"))
        .json(&request)
        .send()
        .await
    {
        Ok(response) => response,
        Err(e) => {
            error!(exchange_id, error = %e, "exchange request failed");
            let _ = tx.send((StreamMessage::Error(format_stream_error(&e.to_string())), exchange_id));
            let _ = tx.send((StreamMessage::End, exchange_id));
            return;
        }
    };

    if !response.status().is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<no body>".to_string());
        let _ = tx.send((StreamMessage::Error(format_stream_error(&body)), exchange_id));
        let _ = tx.send((StreamMessage::End, exchange_id));
        return;
    }

    let mut stream = response.bytes_stream();
    let mut buffer: Vec<u8> = Vec::new();

    loop {
        let next = match tokio::time::timeout(idle_timeout, stream.next()).await {
            Ok(next) => next,
            Err(_) => {
                let _ = tx.send((
                    StreamMessage::Error(format!(
                        "instructor stream stalled: no data for {}s",
                        idle_timeout.as_secs()
                    )),
                    exchange_id,
                ));
                let _ = tx.send((StreamMessage::End, exchange_id));
                return;
            }
        };

        let chunk = match next {
            Some(Ok(bytes)) => bytes,
            Some(Err(e)) => {
                let _ = tx.send((StreamMessage::Error(format_stream_error(&e.to_string())), exchange_id));
                let _ = tx.send((StreamMessage::End, exchange_id));
                return;
            }
            None => break,
        };

        buffer.extend_from_slice(&chunk);

        while let Some(newline_pos) = memchr(b'\n', &buffer) {
            let line = match std::str::from_utf8(&buffer[..newline_pos]) {
                Ok(s) => s.trim(),
                Err(e) => {
                    debug!(exchange_id, error = %e, "skipping invalid UTF-8 stream line");
                    buffer.drain(..=newline_pos);
                    continue;
                }
            };

            let should_end = process_sse_line(line, tx, exchange_id);
            buffer.drain(..=newline_pos);
            if should_end {
                return;
            }
        }
    }

    // Connection closed without a terminator; the completion path still runs.
    let _ = tx.send((StreamMessage::End, exchange_id));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn process_sse_line_handles_spacing_variants() {
        let (service, mut rx) = ExchangeStreamService::new();
        let variants = [
            (r#"data: {"text":"Hel"}"#, "Hel", "data: [DONE]"),
            (r#"data:{"text":"lo"}"#, "lo", "data:[DONE]"),
        ];

        for (index, (chunk_line, expected, done_line)) in variants.iter().enumerate() {
            let exchange_id = (index + 1) as u64;

            assert!(!process_sse_line(chunk_line, &service.tx, exchange_id));
            let (message, received_id) = rx.try_recv().expect("expected chunk event");
            assert_eq!(received_id, exchange_id);
            match message {
                StreamMessage::Chunk(text) => assert_eq!(text, *expected),
                other => panic!("expected chunk event, got {other:?}"),
            }

            assert!(process_sse_line(done_line, &service.tx, exchange_id));
            let (message, received_id) = rx.try_recv().expect("expected end event");
            assert_eq!(received_id, exchange_id);
            assert!(matches!(message, StreamMessage::End));
        }

        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn payloads_without_text_emit_nothing() {
        let (service, mut rx) = ExchangeStreamService::new();

        assert!(!process_sse_line(r#"data: {"text":null}"#, &service.tx, 7));
        assert!(!process_sse_line("event: ping", &service.tx, 7));

        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn malformed_payloads_route_error_then_end() {
        let (service, mut rx) = ExchangeStreamService::new();

        assert!(process_sse_line(
            r#"data: {"error":{"message":"model  overloaded"}}"#,
            &service.tx,
            3,
        ));

        let (message, id) = rx.try_recv().expect("expected error event");
        assert_eq!(id, 3);
        match message {
            StreamMessage::Error(text) => {
                assert_eq!(text, "instructor stream failed: model overloaded");
            }
            other => panic!("expected error event, got {other:?}"),
        }

        let (message, _) = rx.try_recv().expect("expected end event");
        assert!(matches!(message, StreamMessage::End));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn format_stream_error_prefers_structured_summaries() {
        assert_eq!(
            format_stream_error(r#"{"detail":"Not authenticated"}"#),
            "instructor stream failed: Not authenticated"
        );
        assert_eq!(
            format_stream_error(r#"{"error":{"message":"quota exceeded"}}"#),
            "instructor stream failed: quota exceeded"
        );
        assert_eq!(
            format_stream_error("connection reset"),
            "instructor stream failed: connection reset"
        );
        assert_eq!(
            format_stream_error("   "),
            "instructor stream failed with an empty error body"
        );
    }
}
