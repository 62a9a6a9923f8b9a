//! Streaming response types.

use crate::error::GatewayError;
use crate::response::Usage;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

/// Stream of chunks from an opened upstream stream
pub type ChunkStream = BoxStream<'static, Result<ChatChunk, GatewayError>>;

/// One incremental piece of a streamed completion
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ChatChunk {
    /// Text delta
    pub delta: String,
    /// Set on the final chunk
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
    /// Usage, when the provider reports it on the stream
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl ChatChunk {
    /// Create a text delta chunk
    #[must_use]
    pub fn delta(text: impl Into<String>) -> Self {
        Self {
            delta: text.into(),
            ..Self::default()
        }
    }

    /// Create a final chunk
    #[must_use]
    pub fn finished(reason: impl Into<String>, usage: Option<Usage>) -> Self {
        Self {
            delta: String::new(),
            finish_reason: Some(reason.into()),
            usage,
        }
    }

    /// Whether this chunk ends the stream
    #[must_use]
    pub fn is_final(&self) -> bool {
        self.finish_reason.is_some()
    }
}
