//! Streaming response support.
//!
//! Token streams carry `Result` items so a provider failure halfway through a
//! reply reaches the consumer as an item instead of a silent end of stream.

use futures::Stream;
use pin_project_lite::pin_project;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;

use crate::backend::traits::{CompletionResponse, FinishReason, LlmError, Usage};

/// A chunk of streamed response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamChunk {
    /// Token content (may be empty on the final chunk)
    pub content: String,
    /// Whether this is the final chunk
    pub is_final: bool,
    /// Finish reason (only on final chunk)
    pub finish_reason: Option<FinishReason>,
}

impl StreamChunk {
    /// Create a content chunk.
    pub fn content(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_final: false,
            finish_reason: None,
        }
    }

    /// Create a final chunk.
    pub fn final_chunk(content: impl Into<String>, reason: FinishReason) -> Self {
        Self {
            content: content.into(),
            is_final: true,
            finish_reason: Some(reason),
        }
    }
}

type ChunkResult = Result<StreamChunk, LlmError>;

pin_project! {
    /// Stream of tokens from LLM completion.
    pub struct TokenStream {
        #[pin]
        receiver: mpsc::Receiver<ChunkResult>,
        accumulated: String,
        complete: bool,
        failed: bool,
    }
}

impl TokenStream {
    /// Create a new token stream.
    pub fn new(receiver: mpsc::Receiver<ChunkResult>) -> Self {
        Self {
            receiver,
            accumulated: String::new(),
            complete: false,
            failed: false,
        }
    }

    /// Create a sender/receiver pair for streaming.
    pub fn channel(buffer: usize) -> (TokenStreamSender, Self) {
        let (tx, rx) = mpsc::channel(buffer);
        let sender = TokenStreamSender { sender: tx };
        let stream = Self::new(rx);
        (sender, stream)
    }

    /// Get accumulated content so far.
    pub fn accumulated(&self) -> &str {
        &self.accumulated
    }

    /// True once the final chunk or end of stream was observed without error.
    pub fn is_complete(&self) -> bool {
        self.complete && !self.failed
    }

    /// Drain the stream into a complete response, failing on the first error item.
    pub async fn collect(mut self) -> Result<CompletionResponse, LlmError> {
        use futures::StreamExt;

        let mut finish_reason = FinishReason::Stop;

        while let Some(item) = self.next().await {
            let chunk = item?;
            if let Some(reason) = chunk.finish_reason {
                finish_reason = reason;
            }
        }

        Ok(CompletionResponse {
            content: self.accumulated,
            finish_reason,
            // Providers report no usage on streamed replies
            usage: Usage::default(),
        })
    }
}

impl Stream for TokenStream {
    type Item = ChunkResult;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        if *this.failed {
            return Poll::Ready(None);
        }

        match this.receiver.as_mut().poll_recv(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                this.accumulated.push_str(&chunk.content);
                if chunk.is_final {
                    *this.complete = true;
                }
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(err))) => {
                // Nothing after an error is meaningful
                *this.failed = true;
                Poll::Ready(Some(Err(err)))
            }
            Poll::Ready(None) => {
                *this.complete = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Sender for a token stream.
pub struct TokenStreamSender {
    sender: mpsc::Sender<ChunkResult>,
}

impl TokenStreamSender {
    /// Send a content chunk.
    pub async fn send(&self, content: impl Into<String>) -> Result<(), StreamError> {
        self.sender
            .send(Ok(StreamChunk::content(content)))
            .await
            .map_err(|_| StreamError::Closed)
    }

    /// Send the final chunk.
    pub async fn finish(
        self,
        content: impl Into<String>,
        reason: FinishReason,
    ) -> Result<(), StreamError> {
        self.sender
            .send(Ok(StreamChunk::final_chunk(content, reason)))
            .await
            .map_err(|_| StreamError::Closed)
    }

    /// Terminate the stream with an error.
    pub async fn fail(self, error: LlmError) -> Result<(), StreamError> {
        self.sender
            .send(Err(error))
            .await
            .map_err(|_| StreamError::Closed)
    }

    /// True when the consumer has dropped the stream.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// Error during streaming.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// Stream was closed by the consumer
    #[error("Stream closed")]
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_token_stream() {
        let (sender, mut stream) = TokenStream::channel(10);

        tokio::spawn(async move {
            sender.send("Hello").await.unwrap();
            sender.send(", ").await.unwrap();
            sender.send("world").await.unwrap();
            sender.finish("!", FinishReason::Stop).await.unwrap();
        });

        let mut chunks = Vec::new();
        while let Some(chunk) = stream.next().await {
            chunks.push(chunk.unwrap());
        }

        assert_eq!(chunks.len(), 4);
        assert_eq!(stream.accumulated(), "Hello, world!");
        assert!(stream.is_complete());
    }

    #[tokio::test]
    async fn test_error_ends_stream() {
        let (sender, mut stream) = TokenStream::channel(10);

        tokio::spawn(async move {
            sender.send("partial").await.unwrap();
            sender
                .fail(LlmError::StreamInterrupted("connection reset".into()))
                .await
                .unwrap();
        });

        assert_eq!(stream.next().await.unwrap().unwrap().content, "partial");
        assert!(stream.next().await.unwrap().is_err());
        assert!(stream.next().await.is_none());
        assert!(!stream.is_complete());
    }

    #[tokio::test]
    async fn test_collect_propagates_error() {
        let (sender, stream) = TokenStream::channel(4);
        tokio::spawn(async move {
            sender.send("a").await.unwrap();
            sender.fail(LlmError::NetworkError("down".into())).await.unwrap();
        });

        assert!(stream.collect().await.is_err());
    }

    #[tokio::test]
    async fn test_collect_keeps_finish_reason() {
        let (sender, stream) = TokenStream::channel(4);
        tokio::spawn(async move {
            sender.send("Complete").await.unwrap();
            sender.finish(" response", FinishReason::Length).await.unwrap();
        });

        let collected = stream.collect().await.unwrap();
        assert_eq!(collected.content, "Complete response");
        assert_eq!(collected.finish_reason, FinishReason::Length);
    }

    #[tokio::test]
    async fn test_sender_sees_dropped_consumer() {
        let (sender, stream) = TokenStream::channel(1);
        drop(stream);
        assert!(sender.is_closed());
        assert!(sender.send("x").await.is_err());
    }
}
