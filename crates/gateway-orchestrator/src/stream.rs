//! Streaming responses with usage accounting.

use futures::{Stream, StreamExt};
use gateway_core::{AttemptFailure, ChatChunk, ChunkStream, GatewayError, Usage};
use gateway_telemetry::{CostTracker, Metrics};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tracing::{debug, warn};

/// An opened upstream stream
pub struct GatewayStream {
    /// Provider serving the stream
    pub provider: String,
    /// Model serving the stream
    pub model: String,
    /// Candidates that failed to open before this one
    pub fallbacks: Vec<AttemptFailure>,
    /// Chunks, metered into the usage ledger
    pub chunks: ChunkStream,
}

impl std::fmt::Debug for GatewayStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayStream")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("fallbacks", &self.fallbacks)
            .finish_non_exhaustive()
    }
}

/// Records usage exactly once: at the final chunk, at end of stream, on a
/// stream error, or when the consumer drops it early.
pub(crate) struct MeteredStream {
    inner: ChunkStream,
    tenant_id: String,
    provider: String,
    model: String,
    costs: Arc<CostTracker>,
    metrics: Arc<Metrics>,
    prompt_tokens: u32,
    completion_chars: usize,
    usage: Option<Usage>,
    settled: bool,
}

impl MeteredStream {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        inner: ChunkStream,
        tenant_id: &str,
        provider: &str,
        model: &str,
        costs: Arc<CostTracker>,
        metrics: Arc<Metrics>,
        prompt_tokens: u32,
    ) -> Self {
        Self {
            inner,
            tenant_id: tenant_id.to_string(),
            provider: provider.to_string(),
            model: model.to_string(),
            costs,
            metrics,
            prompt_tokens,
            completion_chars: 0,
            usage: None,
            settled: false,
        }
    }

    fn settle(&mut self, outcome: &'static str) {
        if self.settled {
            return;
        }
        self.settled = true;

        let usage = self.usage.unwrap_or_else(|| {
            let completion = u32::try_from(self.completion_chars.div_ceil(4)).unwrap_or(u32::MAX);
            Usage::new(self.prompt_tokens, completion)
        });
        let record = self
            .costs
            .record(&self.tenant_id, &self.provider, &self.model, &usage);
        self.metrics.record_usage(
            &self.tenant_id,
            usage.prompt_tokens,
            usage.completion_tokens,
            record.cost_usd,
        );
        debug!(
            tenant = %self.tenant_id,
            provider = %self.provider,
            model = %self.model,
            outcome,
            reported = self.usage.is_some(),
            cost = record.cost_usd,
            "Stream settled"
        );
    }
}

impl Stream for MeteredStream {
    type Item = Result<ChatChunk, GatewayError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.settled {
            return Poll::Ready(None);
        }

        let polled = this.inner.poll_next_unpin(cx);
        match &polled {
            Poll::Ready(Some(Ok(chunk))) => {
                this.completion_chars += chunk.delta.chars().count();
                if chunk.usage.is_some() {
                    this.usage = chunk.usage;
                }
                if chunk.is_final() {
                    this.settle("completed");
                }
            }
            Poll::Ready(Some(Err(err))) => {
                warn!(provider = %this.provider, error = %err, "Stream failed after opening");
                this.settle("failed");
            }
            Poll::Ready(None) => this.settle("ended"),
            Poll::Pending => {}
        }
        polled
    }
}

impl Drop for MeteredStream {
    fn drop(&mut self) {
        self.settle("abandoned");
    }
}
