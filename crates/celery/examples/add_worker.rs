//! Producer and worker in one process
//!
//! Run with: cargo run -p everruns-celery --example add_worker
//!
//! Configure via environment variables (or a `.env` file):
//! - RUST_LOG: log filter (default: "info")
//! - CELERY_NUM_WORKERS, CELERY_SHUTDOWN_TIMEOUT_MS, CELERY_RATE_LIMIT_MS
//! - CELERY_POLL_MIN_MS, CELERY_POLL_MAX_MS

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use everruns_celery::prelude::*;
use serde_json::json;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let client = CeleryClient::from_env(
        Arc::new(InMemoryBroker::new()),
        Arc::new(InMemoryResultBackend::new()),
    );

    client.register("add", |args: TaskArgs| async move {
        let (a, b): (i64, i64) = args.parse()?;
        Ok(json!(a + b))
    });
    client.register("boom", |_args: TaskArgs| async move {
        Err(TaskError::new("bad input").with_type("ValueError"))
    });

    client.start_worker().context("Failed to start worker pool")?;

    let sum = client.delay("add", (2, 3)).await?;
    let value = sum.get(Duration::from_secs(1)).await?;
    tracing::info!(task_id = sum.task_id(), %value, "add finished");

    for name in ["boom", "ghost"] {
        let result = client.delay(name, ()).await?;
        match result.get(Duration::from_secs(1)).await {
            Ok(value) => tracing::info!(task = name, %value, "Task succeeded"),
            Err(e) => tracing::warn!(task = name, error = %e, "Task failed"),
        }
    }

    client.stop_worker().await.context("Failed to stop worker pool")?;
    tracing::info!("Worker shutdown complete");
    Ok(())
}
