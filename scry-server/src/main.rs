use std::sync::Arc;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use scry_core::{
    IndexPipeline, PipelineConfig, PostgresScreenshotRepository, RealFs, TesseractEngine,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "scry=info,scry_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let (config, source) = PipelineConfig::load_from_env()?;
    info!(?source, watch_dir = %config.watch_dir.display(), "configuration loaded");

    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must point at the screenshot store")?;
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("connecting to database")?;
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("running migrations")?;
    info!("database ready");

    let repo = Arc::new(PostgresScreenshotRepository::new(pool));
    let engine = Arc::new(TesseractEngine::new(config.ocr_language.clone()));
    let lister = Arc::new(RealFs::new());

    let pipeline = IndexPipeline::new(config, repo, engine, lister);
    let cancel = pipeline.cancel_token();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown requested");
            cancel.cancel();
        }
    });

    pipeline.run().await?;
    info!("pipeline stopped");
    Ok(())
}
