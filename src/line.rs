//! LINE Messaging API: webhook payload types, signature verification, and
//! the reply/push client.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::time::Duration;

const API_BASE: &str = "https://api.line.me/v2/bot";

/// Reply tokens expire within the platform's validity window, so there is
/// no point waiting longer than this on a single call.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Webhook delivery body: `{ "events": [...] }`.
#[derive(Debug, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub events: Vec<WebhookEvent>,
}

/// A single webhook event. LINE sends many event types; fields that only
/// some of them carry are optional, and unknown types still deserialize.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookEvent {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub reply_token: Option<String>,
    #[serde(default)]
    pub source: Option<EventSource>,
    #[serde(default)]
    pub message: Option<EventMessage>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventSource {
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventMessage {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub text: Option<String>,
}

impl WebhookEvent {
    pub fn user_id(&self) -> Option<&str> {
        self.source.as_ref().and_then(|s| s.user_id.as_deref())
    }

    /// The message text, only for `message` events carrying a text message.
    pub fn text(&self) -> Option<&str> {
        let message = self.message.as_ref()?;
        if message.kind != "text" {
            return None;
        }
        message.text.as_deref()
    }
}

type HmacSha256 = Hmac<Sha256>;

/// Check the `x-line-signature` header against the raw request body:
/// base64(HMAC-SHA256(channel secret, body)).
pub fn verify_signature(channel_secret: &str, body: &[u8], signature: &str) -> bool {
    let Ok(mut mac) = HmacSha256::new_from_slice(channel_secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    let Ok(provided) = BASE64.decode(signature) else {
        return false;
    };
    mac.verify_slice(&provided).is_ok()
}

/// Outbound side of the Messaging API. The webhook processor and the
/// reminder scheduler only see this trait.
#[async_trait]
pub trait MessagingApi: Send + Sync {
    /// Send a text message through an event's single-use reply token.
    async fn reply(&self, reply_token: &str, text: &str) -> Result<(), Error>;
    /// Send a text message directly to a user, outside any reply window.
    async fn push(&self, user_id: &str, text: &str) -> Result<(), Error>;
}

pub struct LineClient {
    access_token: String,
    http: reqwest::Client,
}

#[derive(Serialize)]
struct TextMessage<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    text: &'a str,
}

impl<'a> TextMessage<'a> {
    fn new(text: &'a str) -> Self {
        Self { kind: "text", text }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReplyRequest<'a> {
    reply_token: &'a str,
    messages: [TextMessage<'a>; 1],
}

#[derive(Serialize)]
struct PushRequest<'a> {
    to: &'a str,
    messages: [TextMessage<'a>; 1],
}

impl LineClient {
    pub fn new(access_token: String) -> Self {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("Failed to build HTTP client");
        Self { access_token, http }
    }

    async fn post<T: Serialize>(&self, path: &str, body: &T) -> Result<(), Error> {
        let response = self
            .http
            .post(format!("{API_BASE}{path}"))
            .bearer_auth(&self.access_token)
            .json(body)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Api(format!("{status}: {body}")));
        }

        Ok(())
    }
}

#[async_trait]
impl MessagingApi for LineClient {
    async fn reply(&self, reply_token: &str, text: &str) -> Result<(), Error> {
        let request = ReplyRequest {
            reply_token,
            messages: [TextMessage::new(text)],
        };
        self.post("/message/reply", &request).await
    }

    async fn push(&self, user_id: &str, text: &str) -> Result<(), Error> {
        let request = PushRequest {
            to: user_id,
            messages: [TextMessage::new(text)],
        };
        self.post("/message/push", &request).await
    }
}

#[derive(Debug)]
pub enum Error {
    Http(String),
    Api(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Http(e) => write!(f, "HTTP error: {e}"),
            Error::Api(e) => write!(f, "API error: {e}"),
        }
    }
}

impl std::error::Error for Error {}
