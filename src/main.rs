use std::sync::Arc;

use teloxide::prelude::*;
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::prelude::*;

use gptbridge::bridge::{Router, TelegramTransport, WhisperCli, telegram};
use gptbridge::config::{Config, DEFAULT_CONFIG_PATH};
use gptbridge::{cli, openai};

#[tokio::main]
async fn main() {
    // Secrets may live in a .env file next to the binary.
    dotenvy::dotenv().ok();

    // An explicit path must exist; the default one may be absent when the
    // environment carries everything.
    let (config_path, loaded) = match std::env::args().nth(1) {
        Some(path) => {
            let loaded = Config::load(&path);
            (path, loaded)
        }
        None => (
            DEFAULT_CONFIG_PATH.to_string(),
            Config::load_or_env(DEFAULT_CONFIG_PATH),
        ),
    };
    let config = match loaded {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    // Setup logging
    let log_dir = config.data_dir.join("logs");
    std::fs::create_dir_all(&log_dir).ok();
    let log_file = match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("gptbridge.log"))
    {
        Ok(file) => file,
        Err(e) => {
            eprintln!("Failed to open log file in {}: {e}", log_dir.display());
            std::process::exit(1);
        }
    };
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

    cli::print_intro();

    if std::path::Path::new(&config_path).exists() {
        info!("Loaded config from {config_path}");
    } else {
        info!("No {config_path}, configured from the environment");
    }
    if config.routing.prefix_enabled {
        info!(
            "Prefix mode on (completion: {:?}, image: {:?})",
            config.routing.gpt_prefix, config.routing.dalle_prefix
        );
    } else {
        info!("Prefix mode off, every text message goes to the completion model");
    }
    info!("Model: {}", config.openai.model);
    info!("Transcription command: {}", config.transcription.command);
    info!("Owner IDs: {:?}", config.owner_ids);

    let bot = Bot::new(&config.telegram_bot_token);
    let client = Arc::new(openai::Client::new(config.openai.clone()));

    let router = Arc::new(Router::new(
        config.routing.clone(),
        Arc::new(TelegramTransport::new(bot.clone())),
        client.clone(),
        client,
        Arc::new(WhisperCli::new(config.transcription.clone())),
    ));

    let (tx, rx) = mpsc::channel(64);
    let event_loop = tokio::spawn(router.run(rx));

    telegram::listen(bot, config.owner_ids.clone(), tx).await;

    if let Err(e) = event_loop.await {
        error!("Event loop failed: {e}");
    }
    info!("Shut down");
}
