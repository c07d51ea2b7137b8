//! Mock LLM backend for testing.
//!
//! Replies are scripted as a list of chunks: `complete` returns their
//! concatenation, `complete_stream` emits them one by one. Failure can be
//! injected before the stream starts or after a number of chunks.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;

use super::traits::*;
use crate::stream::TokenStream;

/// Mock backend for testing.
pub struct MockBackend {
    model_id: String,
    available: AtomicBool,
    chunks: Vec<String>,
    fail_after_chunks: Option<usize>,
    call_count: AtomicU32,
    last_request: Mutex<Option<CompletionRequest>>,
}

impl MockBackend {
    /// Create a new mock backend.
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            available: AtomicBool::new(true),
            chunks: vec!["Mock response".to_string()],
            fail_after_chunks: None,
            call_count: AtomicU32::new(0),
            last_request: Mutex::new(None),
        }
    }

    /// Reply with a single chunk.
    pub fn with_response(mut self, content: impl Into<String>) -> Self {
        self.chunks = vec![content.into()];
        self
    }

    /// Reply with the given chunks, streamed in order.
    pub fn with_chunks<I, S>(mut self, chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.chunks = chunks.into_iter().map(Into::into).collect();
        self
    }

    /// Break the stream after `n` chunks have been delivered.
    pub fn with_failure_after(mut self, n: usize) -> Self {
        self.fail_after_chunks = Some(n);
        self
    }

    /// Set availability. An unavailable backend fails every call outright.
    pub fn with_available(self, available: bool) -> Self {
        self.available.store(available, Ordering::SeqCst);
        self
    }

    /// Get the number of completion calls (streaming or not).
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::SeqCst)
    }

    /// The most recent request seen.
    pub fn last_request(&self) -> Option<CompletionRequest> {
        self.last_request.lock().ok().and_then(|guard| guard.clone())
    }

    /// The full scripted reply.
    pub fn scripted_reply(&self) -> String {
        self.chunks.concat()
    }

    fn record(&self, request: CompletionRequest) -> Result<(), LlmError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut guard) = self.last_request.lock() {
            *guard = Some(request);
        }

        if !self.available.load(Ordering::SeqCst) {
            return Err(LlmError::Unavailable("Mock backend disabled".to_string()));
        }
        Ok(())
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new("mock-model")
    }
}

#[async_trait]
impl LlmBackend for MockBackend {
    fn id(&self) -> &str {
        &self.model_id
    }

    async fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let prompt_tokens: u32 = request
            .messages
            .iter()
            .map(|m| m.content.len() as u32 / 4)
            .sum();
        self.record(request)?;

        if self.fail_after_chunks.is_some() {
            return Err(LlmError::RequestFailed("Mock failure".to_string()));
        }

        let content = self.scripted_reply();
        let completion_tokens = content.len() as u32 / 4;

        Ok(CompletionResponse {
            content,
            finish_reason: FinishReason::Stop,
            usage: Usage {
                prompt_tokens,
                completion_tokens,
            },
        })
    }

    async fn complete_stream(&self, request: CompletionRequest) -> Result<TokenStream, LlmError> {
        self.record(request)?;

        let (sender, stream) = TokenStream::channel(self.chunks.len().max(1) + 1);
        let chunks = self.chunks.clone();
        let fail_after = self.fail_after_chunks;

        tokio::spawn(async move {
            for (index, chunk) in chunks.into_iter().enumerate() {
                if fail_after == Some(index) {
                    let _ = sender
                        .fail(LlmError::StreamInterrupted("Mock failure".to_string()))
                        .await;
                    return;
                }
                if sender.send(chunk).await.is_err() {
                    return;
                }
            }
            if fail_after.is_some() {
                let _ = sender
                    .fail(LlmError::StreamInterrupted("Mock failure".to_string()))
                    .await;
                return;
            }
            let _ = sender.finish("", FinishReason::Stop).await;
        });

        Ok(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use tokio_test::assert_err;

    #[tokio::test]
    async fn test_mock_backend() {
        let backend = MockBackend::new("test-model").with_response("Hello, world!");

        assert!(backend.is_available().await);
        assert_eq!(backend.call_count(), 0);

        let response = backend
            .complete(CompletionRequest::user("Hi"))
            .await
            .unwrap();

        assert_eq!(response.content, "Hello, world!");
        assert_eq!(backend.call_count(), 1);
        assert_eq!(backend.last_request().unwrap().messages[0].content, "Hi");
    }

    #[tokio::test]
    async fn test_mock_unavailable() {
        let backend = MockBackend::new("test-model").with_available(false);

        assert!(!backend.is_available().await);
        let err = assert_err!(backend.complete(CompletionRequest::user("Hi")).await);
        assert!(matches!(err, LlmError::Unavailable(_)));
        assert!(backend
            .complete_stream(CompletionRequest::user("Hi"))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_stream_matches_complete() {
        let backend = MockBackend::default().with_chunks(["Wel", "come", "!"]);

        let streamed = backend
            .complete_stream(CompletionRequest::user("hi"))
            .await
            .unwrap()
            .collect()
            .await
            .unwrap();
        let buffered = backend.complete(CompletionRequest::user("hi")).await.unwrap();

        assert_eq!(streamed.content, "Welcome!");
        assert_eq!(streamed.content, buffered.content);
    }

    #[tokio::test]
    async fn test_failure_after_chunks() {
        let backend = MockBackend::default()
            .with_chunks(["one ", "two ", "three"])
            .with_failure_after(2);

        let mut stream = backend
            .complete_stream(CompletionRequest::user("count"))
            .await
            .unwrap();

        assert_eq!(stream.next().await.unwrap().unwrap().content, "one ");
        assert_eq!(stream.next().await.unwrap().unwrap().content, "two ");
        assert!(stream.next().await.unwrap().is_err());
        assert!(stream.next().await.is_none());
    }
}
