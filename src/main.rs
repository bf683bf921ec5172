use std::sync::Arc;

use muc_banbot::bot::{self, Data};
use muc_banbot::config::Settings;
use muc_banbot::db;
use muc_banbot::gateway::MemoryGateway;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting MUC ban bot");

    let settings = match Settings::from_env() {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to load settings: {}", e);
            std::process::exit(1);
        }
    };

    let pool = match db::pool::create_pool(&settings.database_url).await {
        Ok(p) => p,
        Err(e) => {
            error!("Failed to create database pool: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = db::pool::run_migrations(&pool).await {
        error!("Failed to run migrations: {}", e);
        std::process::exit(1);
    }

    info!("Database initialized successfully");

    // Console transport: stdin is the control room, replies go to stdout
    let memory = Arc::new(MemoryGateway::with_echo());
    bot::console::seed_operator(&settings, &memory);

    let data = Arc::new(Data::new(pool, settings, memory.clone()));
    let (events, rx) = mpsc::unbounded_channel();
    let console = bot::console::spawn_console(data.settings.snapshot(), memory, events);

    #[cfg(unix)]
    if let Err(e) = bot::framework::spawn_reload_listener(data.clone()) {
        warn!("SIGHUP reload unavailable: {}", e);
    }

    if let Err(e) = bot::framework::run(data, rx).await {
        error!("Bot error: {}", e);
        console.abort();
        std::process::exit(1);
    }
}
