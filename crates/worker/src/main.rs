//! Dry-run worker: produces a shot plan against the mock provider and
//! prints the production result as JSON.
//!
//! Usage: `montage-worker <plan.json>` (or set `MONTAGE_PLAN`).

use std::sync::Arc;

use anyhow::Context;
use montage_core::shot_plan::ShotPlan;
use montage_events::{EventBus, ProductionEventKind};
use montage_pipeline::mock::MockProvider;
use montage_pipeline::{GenerationOrchestrator, PipelineConfig, ProviderRegistry};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "montage_worker=debug,montage_pipeline=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let plan_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("MONTAGE_PLAN").ok())
        .context("usage: montage-worker <plan.json> (or set MONTAGE_PLAN)")?;
    let raw = tokio::fs::read_to_string(&plan_path)
        .await
        .with_context(|| format!("failed to read shot plan {plan_path}"))?;
    let plan = ShotPlan::from_json(&raw)?;

    let config = PipelineConfig::from_env()?;
    let output_dir = std::env::var("MONTAGE_OUTPUT_DIR").unwrap_or_else(|_| "mock_output".into());
    let mut registry = ProviderRegistry::new();
    registry.register(Arc::new(MockProvider::new("mock").with_output_dir(output_dir)), 0);

    let events = Arc::new(EventBus::default());
    let orchestrator =
        GenerationOrchestrator::new(config, Arc::new(registry)).with_events(Arc::clone(&events));

    let mut rx = events.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = rx.recv().await {
            if let ProductionEventKind::Progress(report) = event.kind {
                tracing::info!(
                    completed = report.completed_segments,
                    total = report.total_segments,
                    "Progress {:.0}%",
                    report.fraction() * 100.0,
                );
            }
        }
    });

    let token = orchestrator.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, cancelling after in-flight segments");
            token.cancel();
        }
    });

    tracing::info!(plan = %plan_path, title = %plan.title, "Worker starting");
    let result = orchestrator.produce(&plan).await?;
    println!("{}", result.to_json()?);
    Ok(())
}
