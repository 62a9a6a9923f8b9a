//! Test fixtures: gateway configurations and request bodies

use crate::mock_providers::{MockAnthropic, MockOllama, MockOpenAI};
use gateway_config::{parse_str, ConfigFormat, GatewayConfig};
use gateway_core::{ChatMessage, GatewayRequest};
use serde_json::{json, Value};

/// One mock server per provider kind
pub struct Upstreams {
    /// Cloud, OpenAI wire format
    pub openai: MockOpenAI,
    /// Cloud, Anthropic wire format
    pub anthropic: MockAnthropic,
    /// Local, Ollama wire format
    pub ollama: MockOllama,
}

impl Upstreams {
    /// Start all three servers
    pub async fn start() -> Self {
        Self {
            openai: MockOpenAI::start().await,
            anthropic: MockAnthropic::start().await,
            ollama: MockOllama::start().await,
        }
    }

    /// Gateway configuration pointing every provider at its mock.
    ///
    /// Tenants:
    /// - `ada`: local only, `llama3.2` on ollama
    /// - `david`: cloud only, `gpt-4o-mini` on openai then `claude-3-haiku` on anthropic
    /// - `mixed`: hybrid over ollama and openai
    /// - `burst`: local only with a two request bucket that barely refills
    pub fn config(&self) -> GatewayConfig {
        let yaml = format!(
            r#"
providers:
  - id: openai
    type: openai
    endpoint: "{openai}"
    api_key: sk-test
    timeout: 5s
  - id: anthropic
    type: anthropic
    endpoint: "{anthropic}"
    api_key: sk-ant-test
    timeout: 5s
  - id: ollama
    type: ollama
    endpoint: "{ollama}"
    timeout: 5s

breaker:
  failure_threshold: 2
  cooldown: 60s
  max_cooldown: 120s

cache:
  default_ttl: 60s

cost:
  pricing:
    - model: gpt-4o-mini
      input_per_million: 0.15
      output_per_million: 0.6

tenants:
  - id: ada
    model_tier: local_slm
    models:
      - provider: ollama
        model: llama3.2
  - id: david
    model_tier: cloud_llm
    models:
      - provider: openai
        model: gpt-4o-mini
        quality: 2
      - provider: anthropic
        model: claude-3-haiku
        quality: 1
  - id: mixed
    model_tier: hybrid
    models:
      - provider: ollama
        model: llama3.2
      - provider: openai
        model: gpt-4o-mini
  - id: burst
    model_tier: local_slm
    rate_limit:
      capacity: 2
      refill_per_sec: 0.001
    models:
      - provider: ollama
        model: llama3.2
"#,
            openai = self.openai.endpoint(),
            anthropic = self.anthropic.endpoint(),
            ollama = self.ollama.endpoint(),
        );
        parse_str(&yaml, ConfigFormat::Yaml).expect("fixture config parses")
    }
}

/// JSON chat body with a single user message
pub fn chat_body(tenant: &str, content: &str) -> Value {
    json!({
        "tenantId": tenant,
        "taskType": "chat",
        "messages": [{"role": "user", "content": content}]
    })
}

/// JSON chat body with a latency budget
pub fn chat_body_with_budget(tenant: &str, content: &str, latency_budget_ms: u64) -> Value {
    let mut body = chat_body(tenant, content);
    body["latencyBudgetMs"] = json!(latency_budget_ms);
    body
}

/// Typed request with a single user message
pub fn gateway_request(tenant: &str, content: &str, latency_budget_ms: u64) -> GatewayRequest {
    GatewayRequest::builder()
        .tenant(tenant)
        .task_type("chat")
        .message(ChatMessage::user(content))
        .latency_budget_ms(latency_budget_ms)
        .build()
        .expect("fixture request is valid")
}
