//! Agent output chunks and the emitter that stamps and sends them.
//!
//! Chunks go to the caller over a bounded channel. The caller pulls them at
//! its own pace; dropping the receiving end is how a caller stops a stream
//! early.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// The payload of one streamed chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChunkKind {
    /// Incremental text from the model.
    Content { content: String },

    /// A tool finished successfully.
    ToolCall {
        name: String,
        input: serde_json::Value,
        result: serde_json::Value,
    },

    /// Free-form key/value data.
    Metadata {
        metadata: serde_json::Map<String, serde_json::Value>,
    },

    /// The stream failed; nothing follows.
    Error { message: String },

    /// The stream finished; nothing follows.
    Complete {
        metadata: serde_json::Map<String, serde_json::Value>,
    },
}

/// The unit streamed to the caller of `Agent::stream`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentChunk {
    #[serde(flatten)]
    pub kind: ChunkKind,

    pub timestamp: DateTime<Utc>,
}

impl AgentChunk {
    pub fn new(kind: ChunkKind) -> Self {
        Self {
            kind,
            timestamp: Utc::now(),
        }
    }

    pub fn content(text: impl Into<String>) -> Self {
        Self::new(ChunkKind::Content {
            content: text.into(),
        })
    }

    pub fn tool_call(
        name: impl Into<String>,
        input: serde_json::Value,
        result: serde_json::Value,
    ) -> Self {
        Self::new(ChunkKind::ToolCall {
            name: name.into(),
            input,
            result,
        })
    }

    pub fn metadata(metadata: serde_json::Map<String, serde_json::Value>) -> Self {
        Self::new(ChunkKind::Metadata { metadata })
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(ChunkKind::Error {
            message: message.into(),
        })
    }

    pub fn complete(metadata: serde_json::Map<String, serde_json::Value>) -> Self {
        Self::new(ChunkKind::Complete { metadata })
    }

    /// `complete` and `error` end a stream.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.kind,
            ChunkKind::Complete { .. } | ChunkKind::Error { .. }
        )
    }

    /// Chunk type name, as used on the wire.
    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            ChunkKind::Content { .. } => "content",
            ChunkKind::ToolCall { .. } => "tool_call",
            ChunkKind::Metadata { .. } => "metadata",
            ChunkKind::Error { .. } => "error",
            ChunkKind::Complete { .. } => "complete",
        }
    }
}

/// The receiving half handed to callers of `stream()`.
pub type ChunkStream = mpsc::Receiver<AgentChunk>;

/// Sending half of a chunk stream.
///
/// Every `emit_*` returns `false` once the caller has gone away or a terminal
/// chunk was already sent; the producer should stop at that point.
pub struct ChunkEmitter {
    tx: mpsc::Sender<AgentChunk>,
    terminated: bool,
}

impl ChunkEmitter {
    /// Create an emitter and the stream it feeds.
    pub fn channel(buffer: usize) -> (Self, ChunkStream) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (
            Self {
                tx,
                terminated: false,
            },
            rx,
        )
    }

    pub async fn emit(&mut self, chunk: AgentChunk) -> bool {
        if self.terminated {
            tracing::warn!(kind = chunk.kind_name(), "Dropping chunk emitted after stream end");
            return false;
        }
        self.terminated = chunk.is_terminal();
        self.tx.send(chunk).await.is_ok() && !self.terminated
    }

    pub async fn content(&mut self, text: impl Into<String>) -> bool {
        self.emit(AgentChunk::content(text)).await
    }

    pub async fn tool_call(
        &mut self,
        name: impl Into<String>,
        input: serde_json::Value,
        result: serde_json::Value,
    ) -> bool {
        self.emit(AgentChunk::tool_call(name, input, result)).await
    }

    pub async fn metadata(&mut self, metadata: serde_json::Map<String, serde_json::Value>) -> bool {
        self.emit(AgentChunk::metadata(metadata)).await
    }

    pub async fn error(&mut self, message: impl Into<String>) {
        self.emit(AgentChunk::error(message)).await;
    }

    pub async fn complete(&mut self, metadata: serde_json::Map<String, serde_json::Value>) {
        self.emit(AgentChunk::complete(metadata)).await;
    }

    /// Whether the caller is still listening.
    pub fn is_open(&self) -> bool {
        !self.terminated && !self.tx.is_closed()
    }
}
