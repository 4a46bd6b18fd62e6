use crate::error::ProviderError;
use crate::models::{ChatRole, ChatTurn};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use url::Url;

const GROUNDED_SYSTEM_PROMPT: &str = "You are a study assistant.\n\n\
Rules:\n\
- Answer ONLY from the provided context\n\
- If the context does not answer the question, say so clearly";

const GENERAL_SYSTEM_PROMPT: &str = "You are a study assistant for students.\n\n\
Rules:\n\
- Answer ONLY academic or study-related questions.\n\
- Allowed topics: academics, exams, programming, science, engineering, medicine, \
mathematics, research papers, document analysis, summarization of academic \
documents, reports, and any uploaded study material.\n\
- Use clear explanations and examples.\n\
- If the question is clearly not study-related (e.g. cooking, entertainment, \
personal chat), reply exactly: \
\"This assistant is designed only for academic and study-related questions.\"\n\
- Do NOT reject questions about summarizing, analyzing, or explaining documents \
or reports; those are valid academic tasks.";

const GROUNDED_TEMPERATURE: f32 = 0.6;
const GENERAL_TEMPERATURE: f32 = 0.4;

/// Language-model provider for answer synthesis. `synthesize` grounds
/// the answer in retrieved chunks; `general_answer` uses the question
/// and history alone.
#[async_trait]
pub trait AnswerSynthesizer: Send + Sync {
    async fn synthesize(
        &self,
        context: &[String],
        question: &str,
        history: &[ChatTurn],
    ) -> Result<String, ProviderError>;

    async fn general_answer(
        &self,
        question: &str,
        history: &[ChatTurn],
    ) -> Result<String, ProviderError>;
}

#[derive(Debug, Clone, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
}

#[derive(Debug, Clone, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatReply {
    content: String,
}

/// Client for an OpenAI-compatible chat-completions endpoint.
pub struct HttpChatSynthesizer {
    endpoint: Url,
    model: String,
    api_key: Option<String>,
    client: Client,
}

impl HttpChatSynthesizer {
    pub fn new(
        endpoint: &str,
        model: impl Into<String>,
        api_key: Option<String>,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            endpoint: Url::parse(endpoint)?,
            model: model.into(),
            api_key,
            client: Client::new(),
        })
    }

    async fn complete(
        &self,
        system_prompt: &str,
        history: &[ChatTurn],
        user_content: String,
        temperature: f32,
    ) -> Result<String, ProviderError> {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage {
            role: "system",
            content: system_prompt.to_string(),
        });
        for turn in history {
            messages.push(ChatMessage {
                role: match turn.role {
                    ChatRole::User => "user",
                    ChatRole::Assistant => "assistant",
                },
                content: turn.text.clone(),
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: user_content,
        });

        let payload = ChatRequest {
            model: &self.model,
            messages,
            temperature,
        };

        let mut request = self.client.post(self.endpoint.clone()).json(&payload);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(ProviderError::BackendResponse {
                backend: "chat".to_string(),
                details: response.status().to_string(),
            });
        }

        let parsed: ChatResponse = response.json().await?;
        let reply = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::BackendResponse {
                backend: "chat".to_string(),
                details: "response has no choices".to_string(),
            })?;

        Ok(reply.message.content.trim().to_string())
    }
}

#[async_trait]
impl AnswerSynthesizer for HttpChatSynthesizer {
    async fn synthesize(
        &self,
        context: &[String],
        question: &str,
        history: &[ChatTurn],
    ) -> Result<String, ProviderError> {
        let user_content = format!(
            "Context:\n{}\n\nQuestion:\n{}",
            context.join("\n\n"),
            question
        );
        self.complete(GROUNDED_SYSTEM_PROMPT, history, user_content, GROUNDED_TEMPERATURE)
            .await
    }

    async fn general_answer(
        &self,
        question: &str,
        history: &[ChatTurn],
    ) -> Result<String, ProviderError> {
        self.complete(
            GENERAL_SYSTEM_PROMPT,
            history,
            question.to_string(),
            GENERAL_TEMPERATURE,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_endpoint_is_rejected() {
        let result = HttpChatSynthesizer::new("::definitely not a url::", "any-model", None);
        assert!(matches!(result, Err(ProviderError::Url(_))));
    }
}
