//! Shared helpers for orchestrator integration tests.

use std::sync::Arc;

use montage_core::segmentation::DurationLimits;
use montage_core::shot_plan::{CharacterDefinition, Shot, ShotPlan};
use montage_events::{ProductionEvent, ProductionEventKind};
use montage_pipeline::mock::MockProvider;
use montage_pipeline::pacing::PacingConfig;
use montage_pipeline::{GenerationOrchestrator, PipelineConfig, ProviderRegistry};
use tokio::sync::broadcast;

/// Config with no pacing delays and the given segment limits.
pub fn config(min_segment: f64, max_segment: f64) -> PipelineConfig {
    PipelineConfig {
        limits: DurationLimits {
            min_segment,
            max_segment,
        },
        pacing: PacingConfig::none(),
        ..Default::default()
    }
}

pub fn registry(providers: Vec<Arc<MockProvider>>) -> Arc<ProviderRegistry> {
    let mut registry = ProviderRegistry::new();
    for (i, provider) in providers.into_iter().enumerate() {
        registry.register(provider, 100 - i as i32);
    }
    Arc::new(registry)
}

pub fn orchestrator(config: PipelineConfig, providers: Vec<Arc<MockProvider>>) -> GenerationOrchestrator {
    GenerationOrchestrator::new(config, registry(providers))
}

pub fn plan(shots: Vec<Shot>) -> ShotPlan {
    let mut plan = ShotPlan {
        title: "Harbour at dawn".into(),
        shots,
        ..Default::default()
    };
    for (id, name) in [("emma", "Emma"), ("tom", "Tom")] {
        plan.characters.insert(
            id.into(),
            CharacterDefinition {
                name: name.into(),
                ..Default::default()
            },
        );
    }
    plan
}

/// Drain every event already published to `rx`.
pub fn drain(rx: &mut broadcast::Receiver<ProductionEvent>) -> Vec<ProductionEventKind> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event.kind);
    }
    events
}
