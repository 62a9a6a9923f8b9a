//! Mock upstream providers for integration testing
//!
//! Each mock is a wiremock server answering in one provider's wire format.

use serde_json::{json, Value};
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn received(server: &MockServer) -> usize {
    server.received_requests().await.map_or(0, |requests| requests.len())
}

async fn last_body(server: &MockServer) -> Option<Value> {
    let requests = server.received_requests().await?;
    let last = requests.last()?;
    serde_json::from_slice(&last.body).ok()
}

fn sse(events: &[(Option<&str>, Value)]) -> String {
    let mut body = String::new();
    for (event, data) in events {
        if let Some(event) = event {
            body.push_str(&format!("event: {event}\n"));
        }
        body.push_str(&format!("data: {data}\n\n"));
    }
    body
}

/// Mock OpenAI chat completions server
pub struct MockOpenAI {
    /// Underlying server
    pub server: MockServer,
}

impl MockOpenAI {
    /// Start a server with no routes mounted
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// Base URL including the version segment
    pub fn endpoint(&self) -> String {
        format!("{}/v1", self.server.uri())
    }

    /// Requests received so far
    pub async fn calls(&self) -> usize {
        received(&self.server).await
    }

    /// JSON body of the most recent request
    pub async fn last_body(&self) -> Option<Value> {
        last_body(&self.server).await
    }

    /// Answer every completion with `content`
    pub async fn reply(&self, model: &str, content: &str) {
        self.reply_after(model, content, Duration::ZERO).await;
    }

    /// Answer every completion with `content` after `delay`
    pub async fn reply_after(&self, model: &str, content: &str, delay: Duration) {
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({
                        "id": "chatcmpl-test",
                        "object": "chat.completion",
                        "model": model,
                        "choices": [{
                            "index": 0,
                            "message": {"role": "assistant", "content": content},
                            "finish_reason": "stop"
                        }],
                        "usage": {"prompt_tokens": 12, "completion_tokens": 8, "total_tokens": 20}
                    }))
                    .set_delay(delay),
            )
            .mount(&self.server)
            .await;
    }

    /// Stream `pieces` followed by a usage chunk and `[DONE]`
    pub async fn stream(&self, model: &str, pieces: &[&str]) {
        let mut events: Vec<(Option<&str>, Value)> = pieces
            .iter()
            .map(|piece| {
                (
                    None,
                    json!({
                        "id": "chatcmpl-test",
                        "model": model,
                        "choices": [
                            {"index": 0, "delta": {"content": piece}, "finish_reason": null}
                        ]
                    }),
                )
            })
            .collect();
        events.push((
            None,
            json!({
                "id": "chatcmpl-test",
                "model": model,
                "choices": [{"index": 0, "delta": {}, "finish_reason": "stop"}]
            }),
        ));
        events.push((
            None,
            json!({
                "choices": [],
                "usage": {"prompt_tokens": 9, "completion_tokens": 4, "total_tokens": 13}
            }),
        ));
        let mut body = sse(&events);
        body.push_str("data: [DONE]\n\n");

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .mount(&self.server)
            .await;
    }

    /// Fail every completion with `status`
    pub async fn fail(&self, status: u16, message: &str) {
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(status).set_body_json(json!({
                "error": {"message": message, "type": "server_error"}
            })))
            .mount(&self.server)
            .await;
    }

    /// Drop every mounted route
    pub async fn reset(&self) {
        self.server.reset().await;
    }
}

/// Mock Anthropic messages server
pub struct MockAnthropic {
    /// Underlying server
    pub server: MockServer,
}

impl MockAnthropic {
    /// Start a server with no routes mounted
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// Base URL
    pub fn endpoint(&self) -> String {
        self.server.uri()
    }

    /// Requests received so far
    pub async fn calls(&self) -> usize {
        received(&self.server).await
    }

    /// JSON body of the most recent request
    pub async fn last_body(&self) -> Option<Value> {
        last_body(&self.server).await
    }

    /// Answer every message request with `content`
    pub async fn reply(&self, model: &str, content: &str) {
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "msg_test",
                "type": "message",
                "role": "assistant",
                "model": model,
                "content": [{"type": "text", "text": content}],
                "stop_reason": "end_turn",
                "usage": {"input_tokens": 15, "output_tokens": 6}
            })))
            .mount(&self.server)
            .await;
    }

    /// Stream `pieces` as content block deltas
    pub async fn stream(&self, model: &str, pieces: &[&str]) {
        let mut events = vec![
            (
                Some("message_start"),
                json!({
                    "type": "message_start",
                    "message": {
                        "id": "msg_test",
                        "model": model,
                        "usage": {"input_tokens": 11, "output_tokens": 1}
                    }
                }),
            ),
            (
                Some("content_block_start"),
                json!({
                    "type": "content_block_start",
                    "index": 0,
                    "content_block": {"type": "text", "text": ""}
                }),
            ),
            (Some("ping"), json!({"type": "ping"})),
        ];
        for piece in pieces {
            events.push((
                Some("content_block_delta"),
                json!({
                    "type": "content_block_delta",
                    "index": 0,
                    "delta": {"type": "text_delta", "text": piece}
                }),
            ));
        }
        events.push((
            Some("content_block_stop"),
            json!({"type": "content_block_stop", "index": 0}),
        ));
        events.push((
            Some("message_delta"),
            json!({
                "type": "message_delta",
                "delta": {"stop_reason": "end_turn"},
                "usage": {"output_tokens": 7}
            }),
        ));
        events.push((Some("message_stop"), json!({"type": "message_stop"})));

        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(sse(&events), "text/event-stream"),
            )
            .mount(&self.server)
            .await;
    }

    /// Fail every message request with `status`
    pub async fn fail(&self, status: u16, message: &str) {
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(status).set_body_json(json!({
                "type": "error",
                "error": {"type": "overloaded_error", "message": message}
            })))
            .mount(&self.server)
            .await;
    }
}

/// Mock Ollama chat server
pub struct MockOllama {
    /// Underlying server
    pub server: MockServer,
}

impl MockOllama {
    /// Start a server with no routes mounted
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// Base URL
    pub fn endpoint(&self) -> String {
        self.server.uri()
    }

    /// Requests received so far
    pub async fn calls(&self) -> usize {
        received(&self.server).await
    }

    /// JSON body of the most recent request
    pub async fn last_body(&self) -> Option<Value> {
        last_body(&self.server).await
    }

    /// Answer every chat with `content`
    pub async fn reply(&self, model: &str, content: &str) {
        self.reply_after(model, content, Duration::ZERO).await;
    }

    /// Answer every chat with `content` after `delay`
    pub async fn reply_after(&self, model: &str, content: &str, delay: Duration) {
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({
                        "model": model,
                        "message": {"role": "assistant", "content": content},
                        "done": true,
                        "done_reason": "stop",
                        "prompt_eval_count": 10,
                        "eval_count": 5
                    }))
                    .set_delay(delay),
            )
            .mount(&self.server)
            .await;
    }

    /// Stream `pieces` as newline-delimited JSON
    pub async fn stream(&self, model: &str, pieces: &[&str]) {
        let mut body = String::new();
        for piece in pieces {
            let line = json!({
                "model": model,
                "message": {"role": "assistant", "content": piece},
                "done": false
            });
            body.push_str(&line.to_string());
            body.push('\n');
        }
        body.push_str(
            &json!({
                "model": model,
                "message": {"role": "assistant", "content": ""},
                "done": true,
                "done_reason": "stop",
                "prompt_eval_count": 10,
                "eval_count": pieces.len()
            })
            .to_string(),
        );
        body.push('\n');

        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "application/x-ndjson"))
            .mount(&self.server)
            .await;
    }

    /// Fail every chat with `status`
    pub async fn fail(&self, status: u16, message: &str) {
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(status).set_body_json(json!({"error": message})))
            .mount(&self.server)
            .await;
    }
}
