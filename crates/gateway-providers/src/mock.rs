//! In-process scripted provider.
//!
//! Used for offline runs (`type: mock` in configuration) and throughout the
//! test suites. Behaviour is scripted per call; once the script is exhausted
//! the default behaviour applies.

use async_trait::async_trait;
use gateway_core::{
    ChatChunk, ChunkStream, CompletionRequest, CompletionResponse, GatewayError, LLMProvider,
    Locality, MessageRole, ProviderType, Usage,
};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// What a mock call does
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockBehavior {
    /// Reply with the last user message prefixed by `Echo: `
    Echo,
    /// Reply with fixed text
    Reply(String),
    /// Fail as an upstream returning `status`
    Fail {
        /// HTTP status to report
        status: u16,
        /// Error message
        message: String,
    },
    /// Never complete
    Hang,
}

impl MockBehavior {
    /// Upstream failure with the given status
    #[must_use]
    pub fn fail(status: u16, message: impl Into<String>) -> Self {
        Self::Fail {
            status,
            message: message.into(),
        }
    }
}

/// Scripted provider
#[derive(Debug)]
pub struct MockProvider {
    id: String,
    locality: Locality,
    latency: Duration,
    default: MockBehavior,
    script: Mutex<VecDeque<MockBehavior>>,
    calls: AtomicU64,
    last_request: Mutex<Option<CompletionRequest>>,
}

impl MockProvider {
    /// Create a local echo provider
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            locality: Locality::Local,
            latency: Duration::ZERO,
            default: MockBehavior::Echo,
            script: Mutex::new(VecDeque::new()),
            calls: AtomicU64::new(0),
            last_request: Mutex::new(None),
        }
    }

    /// Set locality
    #[must_use]
    pub fn with_locality(mut self, locality: Locality) -> Self {
        self.locality = locality;
        self
    }

    /// Delay every call
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Reply with fixed text once the script is exhausted
    #[must_use]
    pub fn with_reply(mut self, text: impl Into<String>) -> Self {
        self.default = MockBehavior::Reply(text.into());
        self
    }

    /// Set the behaviour used once the script is exhausted
    #[must_use]
    pub fn with_default(mut self, behavior: MockBehavior) -> Self {
        self.default = behavior;
        self
    }

    /// Queue a behaviour for the next unscripted call
    #[must_use]
    pub fn then(self, behavior: MockBehavior) -> Self {
        self.script.lock().push_back(behavior);
        self
    }

    /// Queue a behaviour on a shared provider
    pub fn push(&self, behavior: MockBehavior) {
        self.script.lock().push_back(behavior);
    }

    /// Calls received so far
    #[must_use]
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Most recent request
    #[must_use]
    pub fn last_request(&self) -> Option<CompletionRequest> {
        self.last_request.lock().clone()
    }

    async fn begin(&self, request: &CompletionRequest) -> Result<String, GatewayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock() = Some(request.clone());
        let behavior = self
            .script
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.default.clone());

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        match behavior {
            MockBehavior::Echo => {
                let last = request
                    .messages
                    .iter()
                    .rev()
                    .find(|m| m.role == MessageRole::User)
                    .map_or("", |m| m.content.as_str());
                Ok(format!("Echo: {last}"))
            }
            MockBehavior::Reply(text) => Ok(text),
            MockBehavior::Fail { status, message } => Err(GatewayError::provider(
                &self.id,
                message,
                Some(status),
                status == 429 || status >= 500,
            )),
            MockBehavior::Hang => std::future::pending().await,
        }
    }

    fn usage(request: &CompletionRequest, text: &str) -> Usage {
        let prompt: usize = request.messages.iter().map(|m| m.content.chars().count()).sum();
        let estimate = |chars: usize| u32::try_from(chars.div_ceil(4)).unwrap_or(u32::MAX).max(1);
        Usage::new(estimate(prompt), estimate(text.chars().count()))
    }
}

#[async_trait]
impl LLMProvider for MockProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn provider_type(&self) -> ProviderType {
        ProviderType::Mock
    }

    fn locality(&self) -> Locality {
        self.locality
    }

    async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse, GatewayError> {
        let text = self.begin(request).await?;
        let usage = Self::usage(request, &text);
        Ok(CompletionResponse::new(&self.id, &request.model, text, usage))
    }

    async fn stream(&self, request: &CompletionRequest) -> Result<ChunkStream, GatewayError> {
        let text = self.begin(request).await?;
        let usage = Self::usage(request, &text);

        let mut chunks: Vec<Result<ChatChunk, GatewayError>> = text
            .split_inclusive(' ')
            .map(|word| Ok(ChatChunk::delta(word)))
            .collect();
        chunks.push(Ok(ChatChunk::finished("stop", Some(usage))));
        Ok(Box::pin(futures::stream::iter(chunks)))
    }
}
