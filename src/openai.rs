use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const MODEL: &str = "gpt-4o-mini";
const TEMPERATURE: f64 = 0.7;

/// A slow provider should stall one reply, not hold its task forever.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    System,
    User,
}

impl Role {
    fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
        }
    }
}

/// Chat-completion seam, implemented by [`OpenAiClient`] and by test stubs.
///
/// `Ok(None)` means the API answered but returned no usable content;
/// callers decide what to do with that.
#[async_trait]
pub trait CompletionApi: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<Option<String>, Error>;
}

pub struct OpenAiClient {
    api_key: String,
    http: reqwest::Client,
}

#[derive(Serialize)]
struct ApiRequest {
    model: &'static str,
    temperature: f64,
    messages: Vec<ApiMessage>,
}

#[derive(Serialize)]
struct ApiMessage {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct ApiResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

impl OpenAiClient {
    pub fn new(api_key: String) -> Self {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("Failed to build HTTP client");
        Self { api_key, http }
    }
}

#[async_trait]
impl CompletionApi for OpenAiClient {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<Option<String>, Error> {
        let request = ApiRequest {
            model: MODEL,
            temperature: TEMPERATURE,
            messages: messages
                .iter()
                .map(|m| ApiMessage {
                    role: m.role.as_str(),
                    content: m.content.clone(),
                })
                .collect(),
        };

        let response = self
            .http
            .post("https://api.openai.com/v1/chat/completions")
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Api(format!("{status}: {body}")));
        }

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| Error::Parse(e.to_string()))?;

        Ok(api_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content))
    }
}

#[derive(Debug)]
pub enum Error {
    Http(String),
    Api(String),
    Parse(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Http(e) => write!(f, "HTTP error: {e}"),
            Error::Api(e) => write!(f, "API error: {e}"),
            Error::Parse(e) => write!(f, "Parse error: {e}"),
        }
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_wire_shape() {
        let request = ApiRequest {
            model: MODEL,
            temperature: TEMPERATURE,
            messages: vec![
                ApiMessage { role: "system", content: "frame".into() },
                ApiMessage { role: "user", content: "hello".into() },
            ],
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "gpt-4o-mini");
        assert_eq!(json["temperature"], 0.7);
        assert_eq!(json["messages"][1]["role"], "user");
        assert_eq!(json["messages"][1]["content"], "hello");
    }

    #[test]
    fn test_response_first_choice_content() {
        let raw = r#"{ "choices": [ { "message": { "content": "hi there" } },
                                     { "message": { "content": "second" } } ] }"#;
        let response: ApiResponse = serde_json::from_str(raw).unwrap();
        let content = response.choices.into_iter().next().and_then(|c| c.message.content);
        assert_eq!(content.as_deref(), Some("hi there"));
    }

    #[test]
    fn test_response_without_choices() {
        let response: ApiResponse = serde_json::from_str("{}").unwrap();
        assert!(response.choices.is_empty());
    }

    #[test]
    fn test_response_with_null_content() {
        let raw = r#"{ "choices": [ { "message": { "content": null } } ] }"#;
        let response: ApiResponse = serde_json::from_str(raw).unwrap();
        let content = response.choices.into_iter().next().and_then(|c| c.message.content);
        assert_eq!(content, None);
    }
}
