//! Provider client tests against each wire format

use crate::mock_providers::*;
use futures::StreamExt;
use gateway_core::{
    ChatMessage, CompletionRequest, ErrorKind, GatewayError, LLMProvider, Locality, Usage,
};
use gateway_providers::{
    AnthropicConfig, AnthropicProvider, OllamaConfig, OllamaProvider, OpenAIConfig, OpenAIProvider,
};
use std::time::Duration;

fn request(model: &str) -> CompletionRequest {
    CompletionRequest {
        model: model.to_string(),
        messages: vec![ChatMessage::system("be brief"), ChatMessage::user("Hello!")],
        max_tokens: Some(64),
        temperature: Some(0.2),
        stream: false,
    }
}

async fn collect(
    provider: &dyn LLMProvider,
    request: &CompletionRequest,
) -> (String, Option<Usage>, Option<String>) {
    let mut stream = provider.stream(request).await.expect("stream opens");
    let mut text = String::new();
    let mut usage = None;
    let mut finish = None;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.expect("chunk");
        text.push_str(&chunk.delta);
        if chunk.is_final() {
            usage = chunk.usage;
            finish = chunk.finish_reason.clone();
        }
    }
    (text, usage, finish)
}

fn openai(mock: &MockOpenAI) -> OpenAIProvider {
    OpenAIProvider::new(OpenAIConfig::openai("openai", "sk-test").with_base_url(mock.endpoint()))
        .expect("client builds")
}

fn anthropic(mock: &MockAnthropic) -> AnthropicProvider {
    let config = AnthropicConfig::new("anthropic", "sk-ant-test").with_base_url(mock.endpoint());
    AnthropicProvider::new(config).expect("client builds")
}

fn ollama(mock: &MockOllama) -> OllamaProvider {
    OllamaProvider::new(OllamaConfig::new("ollama").with_base_url(mock.endpoint()))
        .expect("client builds")
}

#[tokio::test]
async fn test_openai_complete() {
    let mock = MockOpenAI::start().await;
    mock.reply("gpt-4o-mini", "Hi there").await;
    let provider = openai(&mock);

    let response = provider.complete(&request("gpt-4o-mini")).await.unwrap();

    assert_eq!(response.provider, "openai");
    assert_eq!(response.text, "Hi there");
    assert_eq!(response.usage.prompt_tokens, 12);
    assert_eq!(response.usage.completion_tokens, 8);
    assert_eq!(response.finish_reason.as_deref(), Some("stop"));
    assert_eq!(provider.locality(), Locality::Cloud);

    let sent = mock.last_body().await.unwrap();
    assert_eq!(sent["model"], "gpt-4o-mini");
    assert_eq!(sent["messages"][0]["role"], "system");
    assert_eq!(sent["max_tokens"], 64);
    assert_eq!(sent["stream"], false);
}

#[tokio::test]
async fn test_openai_stream() {
    let mock = MockOpenAI::start().await;
    mock.stream("gpt-4o-mini", &["Hel", "lo", "!"]).await;
    let provider = openai(&mock);

    let (text, usage, finish) = collect(&provider, &request("gpt-4o-mini")).await;

    assert_eq!(text, "Hello!");
    assert_eq!(usage, Some(Usage::new(9, 4)));
    assert_eq!(finish.as_deref(), Some("stop"));
    let sent = mock.last_body().await.unwrap();
    assert_eq!(sent["stream"], true);
    assert_eq!(sent["stream_options"]["include_usage"], true);
}

#[tokio::test]
async fn test_openai_upstream_errors() {
    let mock = MockOpenAI::start().await;
    mock.fail(503, "overloaded").await;
    let provider = openai(&mock);

    let err = provider.complete(&request("gpt-4o-mini")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ProviderError);
    assert!(err.is_retryable());
    assert!(err.to_string().contains("overloaded"));

    let err = provider.stream(&request("gpt-4o-mini")).await.err().expect("stream should fail");
    assert!(matches!(err, GatewayError::Provider { status_code: Some(503), .. }));
}

#[tokio::test]
async fn test_openai_auth_error_is_not_retryable() {
    let mock = MockOpenAI::start().await;
    mock.fail(401, "Incorrect API key provided").await;

    let err = openai(&mock).complete(&request("gpt-4o-mini")).await.unwrap_err();
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_transport_timeout_is_provider_error() {
    let mock = MockOpenAI::start().await;
    mock.reply_after("gpt-4o-mini", "late", Duration::from_secs(2)).await;
    let provider = OpenAIProvider::new(
        OpenAIConfig::openai("openai", "sk-test")
            .with_base_url(mock.endpoint())
            .with_timeout(Duration::from_millis(100)),
    )
    .unwrap();

    let err = provider.complete(&request("gpt-4o-mini")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ProviderError);
    assert!(err.to_string().contains("timed out"));
}

#[tokio::test]
async fn test_anthropic_complete_lifts_system_prompt() {
    let mock = MockAnthropic::start().await;
    mock.reply("claude-3-haiku", "Hello from Claude").await;
    let provider = anthropic(&mock);

    let response = provider.complete(&request("claude-3-haiku")).await.unwrap();

    assert_eq!(response.text, "Hello from Claude");
    assert_eq!(response.usage, Usage::new(15, 6));
    assert_eq!(response.finish_reason.as_deref(), Some("end_turn"));

    let sent = mock.last_body().await.unwrap();
    assert_eq!(sent["system"], "be brief");
    assert_eq!(sent["messages"].as_array().unwrap().len(), 1);
    assert_eq!(sent["messages"][0]["role"], "user");

    let received = mock.server.received_requests().await.unwrap();
    let headers = &received[0].headers;
    assert_eq!(headers.get("x-api-key").unwrap(), "sk-ant-test");
    assert!(headers.get("anthropic-version").is_some());
}

#[tokio::test]
async fn test_anthropic_stream() {
    let mock = MockAnthropic::start().await;
    mock.stream("claude-3-haiku", &["Hi", " there"]).await;

    let (text, usage, finish) = collect(&anthropic(&mock), &request("claude-3-haiku")).await;

    assert_eq!(text, "Hi there");
    assert_eq!(usage, Some(Usage::new(11, 7)));
    assert_eq!(finish.as_deref(), Some("end_turn"));
}

#[tokio::test]
async fn test_anthropic_error() {
    let mock = MockAnthropic::start().await;
    mock.fail(529, "Overloaded").await;

    let err = anthropic(&mock).complete(&request("claude-3-haiku")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ProviderError);
    assert!(err.to_string().contains("Overloaded"));
}

#[tokio::test]
async fn test_ollama_complete() {
    let mock = MockOllama::start().await;
    mock.reply("llama3.2", "local answer").await;
    let provider = ollama(&mock);

    let response = provider.complete(&request("llama3.2")).await.unwrap();

    assert_eq!(response.text, "local answer");
    assert_eq!(response.usage, Usage::new(10, 5));
    assert_eq!(provider.locality(), Locality::Local);

    let sent = mock.last_body().await.unwrap();
    assert_eq!(sent["options"]["num_predict"], 64);
    assert_eq!(sent["stream"], false);
}

#[tokio::test]
async fn test_ollama_stream() {
    let mock = MockOllama::start().await;
    mock.stream("llama3.2", &["a", "b", "c"]).await;

    let (text, usage, finish) = collect(&ollama(&mock), &request("llama3.2")).await;

    assert_eq!(text, "abc");
    assert_eq!(usage, Some(Usage::new(10, 3)));
    assert_eq!(finish.as_deref(), Some("stop"));
}

#[tokio::test]
async fn test_ollama_missing_model() {
    let mock = MockOllama::start().await;
    mock.fail(404, "model 'llama3.2' not found").await;

    let err = ollama(&mock).complete(&request("llama3.2")).await.unwrap_err();
    assert!(err.to_string().contains("not found"));
    assert!(!err.is_retryable());
}
