mod config;
mod line;
mod openai;
mod reply;
mod scheduler;
mod server;

use std::sync::Arc;

use tracing::info;
use tracing_subscriber::prelude::*;

use config::Config;
use line::{LineClient, MessagingApi};
use openai::OpenAiClient;
use reply::ReplyGenerator;
use scheduler::{ReminderPlan, Scheduler};
use server::AppState;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(1);
        }
    };

    // Setup logging: stdout plus a file under <data_dir>/logs
    let log_dir = config.data_dir.join("logs");
    std::fs::create_dir_all(&log_dir).ok();
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("linepal.log"))
        .expect("Failed to open log file");
    let (non_blocking, _guard) = tracing_appender::non_blocking(log_file);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        )
        .init();

    info!("🚀 Starting linepal...");
    info!("Reminder offsets: {:?} minute(s)", config.reminder_minutes);

    let messaging: Arc<dyn MessagingApi> =
        Arc::new(LineClient::new(config.channel_access_token.clone()));
    let completion = Arc::new(OpenAiClient::new(config.openai_api_key.clone()));
    let generator = Arc::new(ReplyGenerator::new(completion));
    let plan = ReminderPlan::from_minutes(&config.reminder_minutes);
    let scheduler = Arc::new(Scheduler::new(plan, messaging.clone()));

    let state = Arc::new(AppState {
        channel_secret: config.channel_secret.clone(),
        messaging,
        generator,
        scheduler,
    });

    let app = server::router(state);
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind listen address");

    info!("Bot is live on port {}", config.port);
    axum::serve(listener, app).await.expect("Server error");
}
