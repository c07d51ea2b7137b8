//! The conversation partner
//!
//! Frames every LLM call with the scenario prompts: chat turns get the
//! role-play system prompt plus the caller's history, analysis gets the
//! report prompt over the rendered transcript.

use parlor_agent::{CompletionRequest, LlmBackend, LlmError, Message, TokenStream};
use std::sync::Arc;
use tracing::debug;

use crate::models::{ChatMessage, Language, Scenario};
use crate::prompts::{format_transcript, report_prompt, system_prompt};

#[derive(Clone)]
pub struct Tutor {
    backend: Arc<dyn LlmBackend>,
    temperature: f32,
}

impl Tutor {
    pub fn new(backend: Arc<dyn LlmBackend>, temperature: f32) -> Self {
        Self {
            backend,
            temperature,
        }
    }

    pub fn model(&self) -> &str {
        self.backend.id()
    }

    fn turn_request(
        &self,
        language: Language,
        scenario: Scenario,
        history: &[ChatMessage],
        message: &str,
    ) -> CompletionRequest {
        CompletionRequest::default()
            .with_system(system_prompt(language, scenario))
            .with_messages(history.iter().map(Message::from))
            .with_message(Message::user(message))
            .with_temperature(self.temperature)
    }

    /// Whole reply to one user message
    pub async fn converse(
        &self,
        language: Language,
        scenario: Scenario,
        history: &[ChatMessage],
        message: &str,
    ) -> Result<String, LlmError> {
        let request = self.turn_request(language, scenario, history, message);
        let response = self.backend.complete(request).await?;
        debug!(
            model = self.backend.id(),
            tokens = response.usage.total(),
            "Conversation reply"
        );
        Ok(response.content)
    }

    /// Reply to one user message as a chunk stream
    pub async fn converse_stream(
        &self,
        language: Language,
        scenario: Scenario,
        history: &[ChatMessage],
        message: &str,
    ) -> Result<TokenStream, LlmError> {
        let request = self.turn_request(language, scenario, history, message);
        self.backend.complete_stream(request).await
    }

    /// Raw analysis text for a transcript; parsing is the caller's job
    pub async fn analyze(
        &self,
        language: Language,
        scenario: Scenario,
        conversation: &[ChatMessage],
    ) -> Result<String, LlmError> {
        let transcript = format_transcript(conversation);
        let request = CompletionRequest::user(report_prompt(language, scenario, &transcript))
            .with_temperature(self.temperature);

        let response = self.backend.complete(request).await?;
        Ok(response.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parlor_agent::{MessageRole, MockBackend};

    #[tokio::test]
    async fn test_converse_frames_history() {
        let backend = Arc::new(MockBackend::default().with_response("Sure, right this way."));
        let tutor = Tutor::new(backend.clone(), 0.7);

        let history = vec![
            ChatMessage::assistant("Welcome!"),
            ChatMessage::user("Hi"),
            ChatMessage::assistant("How many?"),
        ];
        let reply = tutor
            .converse(Language::English, Scenario::Restaurant, &history, "Two please")
            .await
            .unwrap();
        assert_eq!(reply, "Sure, right this way.");

        let request = backend.last_request().unwrap();
        assert!(request
            .system_prompt
            .unwrap()
            .contains("Restaurant server"));
        assert_eq!(request.messages.len(), 4);
        assert_eq!(request.messages[0].role, MessageRole::Assistant);
        assert_eq!(request.messages[3], Message::user("Two please"));
        assert_eq!(request.temperature, Some(0.7));
    }

    #[tokio::test]
    async fn test_analyze_sends_transcript() {
        let backend = Arc::new(MockBackend::default().with_response("{}"));
        let tutor = Tutor::new(backend.clone(), 0.7);

        tutor
            .analyze(
                Language::Japanese,
                Scenario::Hotel,
                &[ChatMessage::user("チェックインお願いします")],
            )
            .await
            .unwrap();

        let request = backend.last_request().unwrap();
        assert!(request.system_prompt.is_none());
        assert!(request.messages[0]
            .content
            .contains("User: チェックインお願いします"));
    }
}
