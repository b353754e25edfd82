mod bot;
mod config;
mod gemini;

use std::sync::Arc;

use tracing::info;
use tracing_subscriber::prelude::*;

use bot::engine::BotEngine;
use bot::gateway::GatewayClient;
use bot::prayer::PrayerClient;
use bot::store::ConversationStore;
use bot::supervisor::ConnectionSupervisor;
use bot::transport::Transport;
use config::Config;
use gemini::GeminiClient;

#[tokio::main]
async fn main() {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "wakil.json".to_string());
    let config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    // Setup logging: stdout plus a non-ANSI file layer.
    let log_dir = config.data_dir.join("logs");
    std::fs::create_dir_all(&log_dir).ok();
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("wakil.log"))
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

    info!("🚀 Starting wakil...");
    info!("Loaded config from {config_path}");
    info!("Gateway: {}", config.gateway_url);

    let gateway = Arc::new(GatewayClient::new(&config.gateway_url));
    let transport: Arc<dyn Transport> = gateway.clone();
    let responder = Arc::new(GeminiClient::new(config.gemini_api_key.clone()));
    let store = ConversationStore::load_or_new(&config.data_dir.join("conversations.db"));

    let engine = Arc::new(BotEngine::new(
        transport,
        responder,
        store,
        PrayerClient::new(),
        config.history_limit,
    ));

    let supervisor = ConnectionSupervisor::new(gateway, engine);
    supervisor.run().await;
}
