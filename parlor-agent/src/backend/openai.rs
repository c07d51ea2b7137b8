//! OpenAI-compatible LLM backend.
//!
//! Works with any OpenAI-compatible chat completions API:
//! - OpenRouter
//! - vLLM / Ollama
//! - OpenAI API

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::traits::*;
use crate::stream::{TokenStream, TokenStreamSender};

/// Buffered chunks between the provider reader task and the consumer.
const STREAM_BUFFER: usize = 64;

/// OpenAI-compatible backend.
pub struct OpenAiBackend {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl OpenAiBackend {
    /// Create a new OpenAI-compatible backend.
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
    ) -> Result<Self, LlmError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );

        let client = Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| LlmError::Unavailable(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            model: model.into(),
        })
    }

    /// Create a backend pointing to OpenRouter.
    pub fn openrouter(model: &str, api_key: impl Into<String>) -> Result<Self, LlmError> {
        Self::new("https://openrouter.ai/api/v1", model, Some(api_key.into()))
    }

    /// Create a backend pointing to Ollama.
    pub fn ollama(model: &str) -> Result<Self, LlmError> {
        Self::new("http://localhost:11434/v1", model, None)
    }

    fn chat_completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn auth_header(&self) -> Option<String> {
        self.api_key.as_ref().map(|k| format!("Bearer {}", k))
    }

    fn build_body(&self, request: &CompletionRequest, stream: bool) -> ChatRequest {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);

        if let Some(system) = &request.system_prompt {
            messages.push(ChatMessage {
                role: MessageRole::System.as_str(),
                content: system.clone(),
            });
        }

        messages.extend(request.messages.iter().map(|msg| ChatMessage {
            role: msg.role.as_str(),
            content: msg.content.clone(),
        }));

        ChatRequest {
            model: self.model.clone(),
            messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            response_format: request.json_output.then(|| ResponseFormatRequest {
                format_type: "json_object",
            }),
            stream,
        }
    }

    async fn send(&self, body: &ChatRequest) -> Result<reqwest::Response, LlmError> {
        let mut http_request = self.client.post(self.chat_completions_url());

        if let Some(auth) = self.auth_header() {
            http_request = http_request.header(header::AUTHORIZATION, auth);
        }

        let response = http_request
            .json(body)
            .send()
            .await
            .map_err(|e| LlmError::NetworkError(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();

            if status.as_u16() == 429 {
                return Err(LlmError::RateLimited { retry_after_ms: None });
            }

            return Err(LlmError::RequestFailed(format!("HTTP {}: {}", status, body)));
        }

        Ok(response)
    }
}

/// OpenAI chat completion request body.
#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormatRequest>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormatRequest {
    #[serde(rename = "type")]
    format_type: &'static str,
}

/// OpenAI chat completion response.
#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    usage: Option<UsageResponse>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: MessageResponse,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UsageResponse {
    prompt_tokens: u32,
    completion_tokens: u32,
}

/// One `data:` payload of a streamed completion.
#[derive(Debug, Deserialize)]
struct StreamPayload {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    content: Option<String>,
}

/// A parsed server-sent event line from the provider.
#[derive(Debug, PartialEq, Eq)]
enum SseLine {
    Delta {
        content: String,
        finish_reason: Option<String>,
    },
    Done,
    Ignored,
}

fn parse_sse_line(line: &str) -> Result<SseLine, LlmError> {
    let line = line.trim();
    let Some(data) = line.strip_prefix("data:") else {
        // Comments (": keep-alive"), event names and blank lines
        return Ok(SseLine::Ignored);
    };
    let data = data.trim();

    if data == "[DONE]" {
        return Ok(SseLine::Done);
    }

    let payload: StreamPayload =
        serde_json::from_str(data).map_err(|e| LlmError::ParseError(e.to_string()))?;

    let Some(choice) = payload.choices.into_iter().next() else {
        return Ok(SseLine::Ignored);
    };

    Ok(SseLine::Delta {
        content: choice.delta.content.unwrap_or_default(),
        finish_reason: choice.finish_reason,
    })
}

/// Splits the response body into lines. Bytes are held until a newline
/// arrives, so a character split across network chunks decodes whole.
#[derive(Debug, Default)]
struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    fn push(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
    }

    fn next_line(&mut self) -> Option<Result<String, LlmError>> {
        let end = self.pending.iter().position(|b| *b == b'\n')?;
        let line: Vec<u8> = self.pending.drain(..=end).collect();
        Some(decode_line(line))
    }

    /// Unterminated tail left when the body ends.
    fn take_remainder(&mut self) -> Option<Result<String, LlmError>> {
        let rest = std::mem::take(&mut self.pending);
        if rest.iter().all(u8::is_ascii_whitespace) {
            return None;
        }
        Some(decode_line(rest))
    }
}

fn decode_line(bytes: Vec<u8>) -> Result<String, LlmError> {
    String::from_utf8(bytes)
        .map_err(|e| LlmError::ParseError(format!("Invalid UTF-8 in stream: {}", e)))
}

/// Outcome of forwarding one provider line to the consumer.
enum Step {
    Continue,
    Done,
    Closed,
    Failed(LlmError),
}

async fn forward_line(
    line: Result<String, LlmError>,
    sender: &TokenStreamSender,
    finish_reason: &mut FinishReason,
) -> Step {
    match line.and_then(|line| parse_sse_line(&line)) {
        Ok(SseLine::Delta {
            content,
            finish_reason: reason,
        }) => {
            if reason.is_some() {
                *finish_reason = FinishReason::from_provider(reason.as_deref());
            }
            if !content.is_empty() && sender.send(content).await.is_err() {
                return Step::Closed;
            }
            Step::Continue
        }
        Ok(SseLine::Done) => Step::Done,
        Ok(SseLine::Ignored) => Step::Continue,
        Err(e) => Step::Failed(e),
    }
}

#[async_trait]
impl LlmBackend for OpenAiBackend {
    fn id(&self) -> &str {
        &self.model
    }

    async fn is_available(&self) -> bool {
        let url = format!("{}/models", self.base_url);
        let mut request = self.client.get(&url);

        if let Some(auth) = self.auth_header() {
            request = request.header(header::AUTHORIZATION, auth);
        }

        request
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let body = self.build_body(&request, false);
        let response = self.send(&body).await?;

        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::ParseError(e.to_string()))?;

        let choice = chat_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::ParseError("No choices in response".to_string()))?;

        let usage = chat_response
            .usage
            .map(|u| Usage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
            })
            .unwrap_or_default();

        Ok(CompletionResponse {
            content: choice.message.content.unwrap_or_default(),
            finish_reason: FinishReason::from_provider(choice.finish_reason.as_deref()),
            usage,
        })
    }

    async fn complete_stream(&self, request: CompletionRequest) -> Result<TokenStream, LlmError> {
        let body = self.build_body(&request, true);
        let response = self.send(&body).await?;

        let (sender, stream) = TokenStream::channel(STREAM_BUFFER);
        let model = self.model.clone();

        tokio::spawn(async move {
            let mut bytes = response.bytes_stream();
            let mut lines = LineBuffer::default();
            let mut finish_reason = FinishReason::Stop;

            while let Some(next) = bytes.next().await {
                let chunk = match next {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        warn!(model = %model, "Provider stream broke: {}", e);
                        let _ = sender.fail(LlmError::StreamInterrupted(e.to_string())).await;
                        return;
                    }
                };

                lines.push(&chunk);

                while let Some(line) = lines.next_line() {
                    match forward_line(line, &sender, &mut finish_reason).await {
                        Step::Continue => {}
                        Step::Done => {
                            let _ = sender.finish("", finish_reason).await;
                            return;
                        }
                        Step::Closed => {
                            debug!(model = %model, "Consumer dropped stream, aborting");
                            return;
                        }
                        Step::Failed(e) => {
                            let _ = sender.fail(e).await;
                            return;
                        }
                    }
                }
            }

            // Some providers close the connection without [DONE] or a final newline
            if let Some(line) = lines.take_remainder() {
                match forward_line(line, &sender, &mut finish_reason).await {
                    Step::Continue | Step::Done => {}
                    Step::Closed => return,
                    Step::Failed(e) => {
                        let _ = sender.fail(e).await;
                        return;
                    }
                }
            }

            let _ = sender.finish("", finish_reason).await;
        });

        Ok(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one chat completion whose SSE body is written as the given
    /// transfer chunks, returning the base URL.
    async fn serve_sse(parts: Vec<Vec<u8>>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();

            let mut received = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                received.extend_from_slice(&buf[..n]);
                if let Some(head_end) = received.windows(4).position(|w| w == b"\r\n\r\n") {
                    let head = String::from_utf8_lossy(&received[..head_end]).to_lowercase();
                    let length = head
                        .lines()
                        .find_map(|l| l.strip_prefix("content-length:"))
                        .and_then(|v| v.trim().parse::<usize>().ok())
                        .unwrap_or(0);
                    if received.len() >= head_end + 4 + length {
                        break;
                    }
                }
                if n == 0 {
                    break;
                }
            }

            socket
                .write_all(
                    b"HTTP/1.1 200 OK\r\n\
                      Content-Type: text/event-stream\r\n\
                      Transfer-Encoding: chunked\r\n\
                      Connection: close\r\n\r\n",
                )
                .await
                .unwrap();
            for part in parts {
                socket
                    .write_all(format!("{:x}\r\n", part.len()).as_bytes())
                    .await
                    .unwrap();
                socket.write_all(&part).await.unwrap();
                socket.write_all(b"\r\n").await.unwrap();
                socket.flush().await.unwrap();
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
            socket.write_all(b"0\r\n\r\n").await.unwrap();
            socket.flush().await.unwrap();
        });

        format!("http://{}/v1", addr)
    }

    fn delta_event(content: &str) -> String {
        let payload = serde_json::json!({
            "choices": [{ "delta": { "content": content }, "finish_reason": null }]
        });
        format!("data: {}\n\n", payload)
    }

    #[test]
    fn test_openrouter_creation() {
        let backend = OpenAiBackend::openrouter("google/gemini-2.0-flash-exp:free", "key").unwrap();
        assert_eq!(backend.id(), "google/gemini-2.0-flash-exp:free");
        assert_eq!(backend.auth_header().as_deref(), Some("Bearer key"));
        assert_eq!(
            backend.chat_completions_url(),
            "https://openrouter.ai/api/v1/chat/completions"
        );
    }

    #[test]
    fn test_trailing_slash_trimmed() {
        let backend = OpenAiBackend::new("http://localhost:8000/v1/", "m", None).unwrap();
        assert_eq!(
            backend.chat_completions_url(),
            "http://localhost:8000/v1/chat/completions"
        );
        assert!(backend.auth_header().is_none());
    }

    #[test]
    fn test_body_puts_system_prompt_first() {
        let backend = OpenAiBackend::ollama("llama3.2").unwrap();
        let request = CompletionRequest::default()
            .with_system("You are a hotel receptionist")
            .with_message(Message::user("Hello"))
            .with_json_output();

        let body = serde_json::to_value(backend.build_body(&request, true)).unwrap();

        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "Hello");
        assert_eq!(body["response_format"]["type"], "json_object");
        assert_eq!(body["stream"], true);
    }

    #[test]
    fn test_parse_sse_delta() {
        let line = r#"data: {"choices":[{"delta":{"content":"Hel"},"finish_reason":null}]}"#;
        assert_eq!(
            parse_sse_line(line).unwrap(),
            SseLine::Delta {
                content: "Hel".into(),
                finish_reason: None
            }
        );
    }

    #[test]
    fn test_parse_sse_markers() {
        assert_eq!(parse_sse_line("data: [DONE]").unwrap(), SseLine::Done);
        assert_eq!(parse_sse_line(": OPENROUTER PROCESSING").unwrap(), SseLine::Ignored);
        assert_eq!(parse_sse_line("").unwrap(), SseLine::Ignored);
        assert!(parse_sse_line("data: {not json").is_err());
    }

    #[test]
    fn test_parse_sse_finish_reason() {
        let line = r#"data: {"choices":[{"delta":{},"finish_reason":"length"}]}"#;
        assert_eq!(
            parse_sse_line(line).unwrap(),
            SseLine::Delta {
                content: String::new(),
                finish_reason: Some("length".into())
            }
        );
    }

    #[test]
    fn test_line_buffer_waits_for_whole_character() {
        let mut lines = LineBuffer::default();
        let text = "data: こ\n".as_bytes();
        // "こ" is three bytes; stop after the first
        let split = text.iter().position(|b| *b == 0xE3).unwrap() + 1;

        lines.push(&text[..split]);
        assert!(lines.next_line().is_none());

        lines.push(&text[split..]);
        assert_eq!(lines.next_line().unwrap().unwrap(), "data: こ\n");
        assert!(lines.next_line().is_none());
        assert!(lines.take_remainder().is_none());
    }

    #[test]
    fn test_line_buffer_remainder() {
        let mut lines = LineBuffer::default();
        lines.push(b"data: [DONE]\n\ndata: tail");

        assert_eq!(lines.next_line().unwrap().unwrap(), "data: [DONE]\n");
        assert_eq!(lines.next_line().unwrap().unwrap(), "\n");
        assert!(lines.next_line().is_none());
        assert_eq!(lines.take_remainder().unwrap().unwrap(), "data: tail");
        assert!(lines.take_remainder().is_none());
    }

    #[test]
    fn test_line_buffer_rejects_invalid_utf8() {
        let mut lines = LineBuffer::default();
        lines.push(&[b'd', 0xFF, b'\n']);
        assert!(matches!(lines.next_line(), Some(Err(LlmError::ParseError(_)))));
    }

    #[tokio::test]
    async fn test_stream_keeps_character_split_across_chunks() {
        let event = delta_event("こんにちは").into_bytes();
        let split = event.iter().position(|b| *b == 0xE3).unwrap() + 1;
        let base_url = serve_sse(vec![
            event[..split].to_vec(),
            event[split..].to_vec(),
            b"data: [DONE]\n\n".to_vec(),
        ])
        .await;

        let backend = OpenAiBackend::new(base_url, "m", None).unwrap();
        let stream = backend
            .complete_stream(CompletionRequest::user("hi"))
            .await
            .unwrap();
        let response = stream.collect().await.unwrap();

        assert_eq!(response.content, "こんにちは");
        assert_eq!(response.finish_reason, FinishReason::Stop);
    }

    #[tokio::test]
    async fn test_stream_keeps_unterminated_last_line() {
        let last = delta_event(" there");
        let base_url = serve_sse(vec![
            delta_event("Hello").into_bytes(),
            last.trim_end().as_bytes().to_vec(),
        ])
        .await;

        let backend = OpenAiBackend::new(base_url, "m", None).unwrap();
        let stream = backend
            .complete_stream(CompletionRequest::user("hi"))
            .await
            .unwrap();

        assert_eq!(stream.collect().await.unwrap().content, "Hello there");
    }
}
