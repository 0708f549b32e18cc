//! Flotilla - Entry Point
//!
//! Wires the stores, validator, scorer and scheduler together and runs the
//! ingestion and retirement loops with graceful shutdown support.

use std::sync::Arc;

use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod error;
mod models;
mod providers;
mod scheduler;
mod scorer;
mod services;
mod store;
mod validator;

use config::Config;
use providers::{ProxyProvider, WebshareConfig, WebshareProvider};
use scheduler::Scheduler;
use scorer::{QualityScorer, Scorer};
use services::{
    IngestionConfig, IngestionHandle, IngestionService, RetirementConfig, RetirementHandle,
    RetirementService,
};
use store::RedisStore;
use validator::{Validator, ValidatorConfig};

#[tokio::main]
async fn main() -> error::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "flotilla=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Flotilla");

    // Load configuration
    let config = Config::from_env()?;
    info!("Configuration loaded");

    // Connect to the backing store
    let redis = Arc::new(RedisStore::connect(&config.store.redis_url).await?);
    info!("Connected to store at {}", config.store.redis_url);

    // Build the core components
    let scorer: Arc<dyn Scorer> = Arc::new(QualityScorer::new(redis.clone()));
    let scheduler = Arc::new(Scheduler::new(scorer.clone(), redis.clone(), redis.clone()));

    let validator = Arc::new(
        Validator::new(ValidatorConfig {
            probe_timeout: config.probe_timeout(),
            ip_echo_url: config.validator.ip_echo_url.clone(),
        })
        .await,
    );

    // Providers
    let mut providers: Vec<Arc<dyn ProxyProvider>> = Vec::new();
    if config.webshare.api_key.is_empty() {
        warn!("WEBSHARE_API_KEY not set, webshare provider disabled");
    } else {
        providers.push(Arc::new(WebshareProvider::new(WebshareConfig {
            api_key: config.webshare.api_key.clone(),
            base_url: config.webshare.base_url.clone(),
        })));
    }

    // Start the ingestion loop
    let (ingestion_handle, ingestion_shutdown) = IngestionHandle::new();
    let ingestion = IngestionService::new(
        providers,
        validator,
        scorer.clone(),
        scheduler.clone(),
        IngestionConfig {
            poll_interval: config.poll_interval(),
            page_size: config.ingestion.page_size,
            max_pages: config.ingestion.max_pages,
            validation_workers: config.ingestion.validation_workers,
            check_target: config.check_target(),
        },
    );
    let ingestion_task = tokio::spawn(async move {
        ingestion.run(ingestion_shutdown).await;
    });

    // Start the retirement sweep
    let (retirement_handle, retirement_shutdown) = RetirementHandle::new();
    let retirement_task = if config.retirement.enabled {
        let retirement = RetirementService::new(
            scheduler.clone(),
            scorer.clone(),
            redis.clone(),
            RetirementConfig {
                sweep_interval: config.sweep_interval(),
            },
        );
        Some(tokio::spawn(async move {
            retirement.run(retirement_shutdown).await;
        }))
    } else {
        info!("Retirement sweep disabled");
        None
    };

    // Wait for shutdown signal
    shutdown_signal().await;
    info!("Shutdown signal received");

    ingestion_handle.shutdown();
    retirement_handle.shutdown();

    let _ = ingestion_task.await;
    if let Some(task) = retirement_task {
        let _ = task.await;
    }

    info!("Flotilla stopped");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
