//! Audio conversion worker binary.

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use audex_media::FfmpegExtractor;
use audex_pipeline::Executor;
use audex_queue::{JobQueue, RedisJobQueue};
use audex_storage::S3BlobStore;
use audex_worker::{ConvertHandler, WorkerConfig};

#[tokio::main]
async fn main() {
    // Install rustls crypto provider (required for TLS/HTTPS)
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    // Load environment variables
    dotenvy::dotenv().ok();

    init_tracing();

    info!("Starting audex-worker");

    let config = WorkerConfig::from_env();
    info!("Worker config: {:?}", config);

    let store = match S3BlobStore::from_env().await {
        Ok(s) => Arc::new(s),
        Err(e) => {
            error!("Failed to create blob store: {}", e);
            std::process::exit(1);
        }
    };

    let queue: Arc<dyn JobQueue> = match RedisJobQueue::from_env() {
        Ok(q) => Arc::new(q),
        Err(e) => {
            error!("Failed to create job queue: {}", e);
            std::process::exit(1);
        }
    };

    let transform = match FfmpegExtractor::new() {
        Ok(t) => Arc::new(t),
        Err(e) => {
            error!("FFmpeg not available: {}", e);
            std::process::exit(1);
        }
    };

    let handler = Arc::new(ConvertHandler::new(store, Arc::clone(&queue), transform));
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

    info!("Worker shutdown complete");
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
