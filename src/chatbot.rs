//! Chatbot replies for support rooms, generated by a chat-completion API.

use std::sync::Arc;

use rocket::http::Status;
use thiserror::Error;

use crate::config::Config;
use crate::resp::problem::Problem;

#[derive(Debug, Error)]
pub enum ChatbotError {
    #[error("OpenAI API key not configured")]
    NotConfigured,
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("OpenAI API error: {0}")]
    Api(String),
    #[error("completion API returned no reply")]
    EmptyReply,
}

impl From<ChatbotError> for Problem {
    fn from(e: ChatbotError) -> Self {
        tracing::error!("chatbot failure: {}", e);
        Problem::new_untyped(Status::InternalServerError, e.to_string())
    }
}

#[rocket::async_trait]
pub trait CompletionClient: Send + Sync {
    /// Reply to a single user message.
    async fn complete(&self, message: &str) -> Result<String, ChatbotError>;
}

#[derive(Debug, Serialize)]
struct CompletionMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<CompletionMessage<'a>>,
}

#[derive(Debug, Deserialize)]
struct ReplyMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ReplyMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

/// Client for OpenAI compatible `chat/completions` endpoints.
pub struct OpenAiClient {
    http: reqwest::Client,
    url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl OpenAiClient {
    pub fn new(config: &Config, api_key: impl ToString) -> OpenAiClient {
        OpenAiClient {
            http: reqwest::Client::new(),
            url: config.openai_url.clone(),
            api_key: api_key.to_string(),
            model: config.chatbot_model.clone(),
            max_tokens: config.chatbot_max_tokens,
            temperature: config.chatbot_temperature,
        }
    }

    fn request<'a>(&'a self, message: &'a str) -> CompletionRequest<'a> {
        CompletionRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            messages: vec![CompletionMessage {
                role: "user",
                content: message,
            }],
        }
    }
}

#[rocket::async_trait]
impl CompletionClient for OpenAiClient {
    async fn complete(&self, message: &str) -> Result<String, ChatbotError> {
        let response = self
            .http
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&self.request(message))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ChatbotError::Api(
                status.canonical_reason().unwrap_or("request failed").to_string(),
            ));
        }

        let body: CompletionResponse = response.json().await?;
        body.choices
            .into_iter()
            .next()
            .and_then(|it| it.message.content)
            .ok_or(ChatbotError::EmptyReply)
    }
}

/// Managed handle to the configured completion client, if any.
#[derive(Clone)]
pub struct Chatbot(Option<Arc<dyn CompletionClient>>);

impl Chatbot {
    pub fn new(client: impl CompletionClient + 'static) -> Chatbot {
        Chatbot(Some(Arc::new(client)))
    }

    pub fn disabled() -> Chatbot {
        Chatbot(None)
    }

    pub fn from_config(config: &Config) -> Chatbot {
        match &config.openai_api_key {
            Some(key) => Chatbot::new(OpenAiClient::new(config, key)),
            None => {
                tracing::warn!("No OpenAI API key configured, chatbot replies are disabled.");
                Chatbot::disabled()
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.0.is_some()
    }

    pub async fn reply(&self, message: &str) -> Result<String, ChatbotError> {
        match &self.0 {
            Some(client) => client.complete(message).await,
            None => Err(ChatbotError::NotConfigured),
        }
    }
}

impl std::fmt::Debug for Chatbot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Chatbot(enabled: {})", self.is_enabled())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Replies with a fixed prefix and the prompt.
    pub struct EchoClient;

    #[rocket::async_trait]
    impl CompletionClient for EchoClient {
        async fn complete(&self, message: &str) -> Result<String, ChatbotError> {
            Ok(format!("bot: {}", message))
        }
    }

    #[test]
    fn request_carries_configured_parameters() {
        let client = OpenAiClient::new(&Config::ephemeral(), "key");
        let body = serde_json::to_value(client.request("How do I pay?")).unwrap();

        assert_eq!(body["model"], "gpt-3.5-turbo");
        assert_eq!(body["max_tokens"], 150);
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"], "How do I pay?");
        assert!((body["temperature"].as_f64().unwrap() - 0.3).abs() < 1e-6);
    }

    #[test]
    fn replies_are_read_from_first_choice() {
        let body: CompletionResponse = serde_json::from_str(
            r#"{"choices":[{"message":{"role":"assistant","content":"Hello!"}}]}"#,
        )
        .unwrap();
        assert_eq!(body.choices[0].message.content.as_deref(), Some("Hello!"));
    }

    #[rocket::async_test]
    async fn disabled_chatbot_reports_missing_key() {
        let error = Chatbot::disabled().reply("hi").await.unwrap_err();
        assert!(matches!(error, ChatbotError::NotConfigured));
        assert_eq!(Problem::from(error).title, "OpenAI API key not configured");

        assert_eq!(Chatbot::new(EchoClient).reply("hi").await.unwrap(), "bot: hi");
    }
}
