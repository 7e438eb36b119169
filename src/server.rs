//! HTTP surface: webhook ingestion, verification probe, health check.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

use crate::line::{self, MessagingApi, WebhookEvent, WebhookPayload};
use crate::reply::ReplyGenerator;
use crate::scheduler::Scheduler;

/// Fixed greeting sent when a user follows the bot.
pub const GREETING: &str = "你好，我會陪著你～一段時間沒回我，我會主動找你喔。";

pub struct AppState {
    pub channel_secret: String,
    pub messaging: Arc<dyn MessagingApi>,
    pub generator: Arc<ReplyGenerator>,
    pub scheduler: Arc<Scheduler>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/webhook", get(verify_probe).post(webhook))
        .route("/health", get(health))
        .with_state(state)
}

/// LINE's console probes the endpoint with a GET during setup.
async fn verify_probe() -> &'static str {
    "OK"
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "ok": true }))
}

/// Webhook deliveries are acknowledged before any event work happens;
/// LINE re-delivers batches that do not answer within its timeout, and a
/// processing failure is not the platform's problem. Only a bad signature
/// is rejected.
async fn webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let signature = headers
        .get("x-line-signature")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if !line::verify_signature(&state.channel_secret, &body, signature) {
        warn!("Webhook signature mismatch, rejecting delivery");
        return StatusCode::UNAUTHORIZED;
    }

    match serde_json::from_slice::<WebhookPayload>(&body) {
        Ok(payload) => {
            tokio::spawn(async move {
                process_events(&state, payload.events).await;
            });
        }
        Err(e) => warn!("Undecodable webhook body: {e}"),
    }

    StatusCode::OK
}

/// Handle one delivery's events in order. Every event with a resolvable
/// sender resets that user's nudge clock, whether or not it earns a reply.
async fn process_events(state: &AppState, events: Vec<WebhookEvent>) {
    for event in events {
        let Some(user_id) = event.user_id().map(str::to_string) else {
            continue;
        };

        state.scheduler.touch(&user_id);

        match event.kind.as_str() {
            "message" => {
                let Some(text) = event.text() else { continue };
                let Some(token) = event.reply_token.as_deref() else {
                    warn!("Text message from {user_id} without reply token");
                    continue;
                };
                info!(
                    "💬 {user_id}: \"{}\"",
                    text.chars().take(50).collect::<String>()
                );
                let reply = state.generator.generate(text).await;
                if let Err(e) = state.messaging.reply(token, &reply).await {
                    warn!("Reply to {user_id} failed: {e}");
                }
            }
            "follow" => {
                let Some(token) = event.reply_token.as_deref() else { continue };
                info!("👋 New follower: {user_id}");
                if let Err(e) = state.messaging.reply(token, GREETING).await {
                    warn!("Greeting reply to {user_id} failed: {e}");
                }
            }
            _ => {}
        }
    }
}
