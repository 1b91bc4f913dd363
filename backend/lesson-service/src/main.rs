use actix_web::{web, App, HttpServer};
use anyhow::{Context, Result};
use lesson_service::handlers::{configure, AppState};
use lesson_service::models::{sample_lessons, Lesson};
use lesson_service::{Config, LessonRecommender};
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[actix_web::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,lesson_service=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;
    let settings = config
        .pipeline_settings()
        .context("Invalid pipeline configuration")?;

    tracing::info!(
        "Starting {} v{} on HTTP:{}",
        config.service.name,
        env!("CARGO_PKG_VERSION"),
        config.service.http_port
    );
    tracing::info!(
        policy = settings.bandit.policy.name(),
        embedding_dim = config.retrieval.embedding_dim,
        "Pipeline configured"
    );

    let recommender = Arc::new(LessonRecommender::in_memory(
        config.retrieval.embedding_dim,
        settings,
    ));

    // Seed the index
    let lessons = match &config.service.lessons_path {
        Some(path) => load_lessons(path)?,
        None => {
            tracing::info!("SERVICE_LESSONS_PATH not set, indexing the sample catalog");
            sample_lessons()
        }
    };
    let report = recommender
        .index_lessons(lessons)
        .await
        .context("Failed to index lessons")?;
    tracing::info!(
        lessons = report.lessons,
        chunks = report.chunks,
        dense_incomplete = report.dense_incomplete,
        "Initial index built"
    );

    let state = web::Data::new(AppState { recommender });

    HttpServer::new(move || {
        App::new()
            .wrap(tracing_actix_web::TracingLogger::default())
            .app_data(state.clone())
            .configure(configure)
    })
    .bind(("0.0.0.0", config.service.http_port))?
    .run()
    .await?;

    Ok(())
}

fn load_lessons(path: &Path) -> Result<Vec<Lesson>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read lessons from {}", path.display()))?;
    let lessons: Vec<Lesson> = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse lessons in {}", path.display()))?;
    tracing::info!(count = lessons.len(), path = %path.display(), "Loaded lessons");
    Ok(lessons)
}
