//! Notification worker binary.

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use audex_notifier::{NotifierConfig, NotifyHandler, WebhookNotifier};
use audex_pipeline::Executor;
use audex_queue::{JobQueue, RedisJobQueue};

#[tokio::main]
async fn main() {
    // Install rustls crypto provider (required for TLS/HTTPS)
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    // Load environment variables
    dotenvy::dotenv().ok();

    init_tracing();

    info!("Starting audex-notifier");

    let config = NotifierConfig::from_env();
    info!("Notifier config: {:?}", config);

    let queue: Arc<dyn JobQueue> = match RedisJobQueue::from_env() {
        Ok(q) => Arc::new(q),
        Err(e) => {
            error!("Failed to create job queue: {}", e);
            std::process::exit(1);
        }
    };

    let notifier = match WebhookNotifier::from_env() {
        Ok(n) => Arc::new(n),
        Err(e) => {
            error!("Failed to create notifier: {}", e);
            std::process::exit(1);
        }
    };

    let handler = Arc::new(NotifyHandler::new(notifier));
    let executor = Arc::new(Executor::new(queue, handler, config.executor_config()));

    // Shutdown on ctrl-c
    let executor_signal = Arc::clone(&executor);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received shutdown signal");
        executor_signal.shutdown();
    });

    if let Err(e) = executor.run().await {
        error!("Executor error: {}", e);
        std::process::exit(1);
    }

    info!("Notifier shutdown complete");
}

fn init_tracing() {
    // Colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env().add_directive("audex=info".parse().unwrap());

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
}
