//! Drives a whole shot plan through segmentation, generation, retries and
//! ordered continuity commits.
//!
//! Shots are grouped into continuity chains. A chain breaks at a hard cut
//! (the location changes) or at a shot that does not require continuity.
//! Chains generate concurrently; inside a chain shots run in order and
//! each shot's segments run in index order, seeded by the previous clip's
//! last frame. Store commits always happen in plan order.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use montage_core::continuity::{ContinuityContext, ContinuityStore, Entity};
use montage_core::error::CoreError;
use montage_core::retry::RetryAttempt;
use montage_core::segmentation::{Segment, ShotSegmenter};
use montage_core::shot_plan::{Shot, ShotPlan};
use montage_core::types::FrameNumber;
use montage_events::{EventBus, ProductionEvent, ProductionEventKind, ProductionStage, ProgressReport};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::barrier::CommitBarrier;
use crate::config::PipelineConfig;
use crate::dispatch::SegmentDispatcher;
use crate::error::PipelineError;
use crate::frames::{ClipFrameExtractor, FrameExtractor};
use crate::manifest::{GeneratedSegment, ProductionResult, ShotManifestEntry, ShotOutcome, SkippedSegment};
use crate::prompt::{ContextPromptCompiler, PromptCompiler};
use crate::registry::ProviderRegistry;
use crate::retry::{RecoveryOutcome, RetryCoordinator, SegmentJob};
use crate::store::SharedContinuityStore;

// ---------------------------------------------------------------------------
// Planning
// ---------------------------------------------------------------------------

/// A shot with its provider and segments resolved.
#[derive(Debug, Clone)]
pub struct PlannedShot<'a> {
    pub index: usize,
    pub shot: &'a Shot,
    pub provider: String,
    /// Segment limit after applying the provider's maximum.
    pub max_segment: f64,
    pub segments: Vec<Segment>,
}

impl PlannedShot<'_> {
    pub fn duration(&self) -> f64 {
        self.segments.iter().map(|s| s.duration).sum()
    }
}

/// Group consecutive shots into continuity chains.
///
/// A shot opens a new chain when it does not require continuity or when
/// its effective location differs from the previous shot's. A shot
/// without a declared location stays where the previous one was.
pub fn partition_chains(plan: &ShotPlan) -> Vec<Vec<usize>> {
    let mut chains: Vec<Vec<usize>> = Vec::new();
    let mut location = plan
        .initial_environment
        .as_ref()
        .map(|env| env.location.as_str());

    for (index, shot) in plan.shots.iter().enumerate() {
        let next_location = shot.location().or(location);
        let hard_cut = next_location != location;
        match chains.last_mut() {
            Some(chain) if shot.continuity_required && !hard_cut => chain.push(index),
            _ => {
                if index > 0 {
                    tracing::debug!(
                        shot_id = %shot.id,
                        hard_cut,
                        continuity_required = shot.continuity_required,
                        "Starting new continuity chain",
                    );
                }
                chains.push(vec![index]);
            }
        }
        location = next_location;
    }
    chains
}

/// Store seeded with the plan's characters and initial environment.
pub fn seed_store(plan: &ShotPlan) -> Result<ContinuityStore, CoreError> {
    let mut store = ContinuityStore::new();
    for (id, definition) in &plan.characters {
        let mut entity = Entity::character(id.clone());
        if let Some(anchor) = &definition.visual_anchor {
            entity = entity.with_visual_anchor(anchor.clone());
        }
        store.add_entity(entity)?;
    }
    if let Some(environment) = &plan.initial_environment {
        store.set_environment(environment.to_state());
    }
    Ok(store)
}

// ---------------------------------------------------------------------------
// Per-run state
// ---------------------------------------------------------------------------

struct Run<'a> {
    production_id: Uuid,
    plan: &'a ShotPlan,
    store: SharedContinuityStore,
    barrier: CommitBarrier,
    progress: Mutex<ProgressReport>,
    coordinator: RetryCoordinator,
}

#[derive(Debug, Default)]
struct ShotRecord {
    index: usize,
    generated: Vec<GeneratedSegment>,
    skipped: Vec<SkippedSegment>,
    attempts: Vec<RetryAttempt>,
    attempted_segments: usize,
    committed_frame: Option<FrameNumber>,
    last_frame: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct GenerationOrchestrator {
    config: PipelineConfig,
    registry: Arc<ProviderRegistry>,
    compiler: Arc<dyn PromptCompiler>,
    frames: Arc<dyn FrameExtractor>,
    events: Arc<EventBus>,
    cancel: CancellationToken,
}

impl GenerationOrchestrator {
    pub fn new(config: PipelineConfig, registry: Arc<ProviderRegistry>) -> Self {
        Self {
            config,
            registry,
            compiler: Arc::new(ContextPromptCompiler),
            frames: Arc::new(ClipFrameExtractor),
            events: Arc::new(EventBus::default()),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_compiler(mut self, compiler: Arc<dyn PromptCompiler>) -> Self {
        self.compiler = compiler;
        self
    }

    pub fn with_frames(mut self, frames: Arc<dyn FrameExtractor>) -> Self {
        self.frames = frames;
        self
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = events;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    /// Token that stops the production between segment dispatches.
    /// In-flight calls are allowed to finish.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Produce a plan against a fresh store seeded from the plan.
    pub async fn produce(&self, plan: &ShotPlan) -> Result<ProductionResult, PipelineError> {
        plan.validate()?;
        let store = seed_store(plan)?;
        self.produce_with_store(plan, store).await
    }

    /// Produce a plan against a caller-prepared store.
    ///
    /// Provider failures never fail the production; they show up as
    /// skipped segments. Invalid configuration, invalid plans and unknown
    /// entities or providers are returned as errors before generation.
    pub async fn produce_with_store(
        &self,
        plan: &ShotPlan,
        store: ContinuityStore,
    ) -> Result<ProductionResult, PipelineError> {
        self.config.validate()?;
        plan.validate()?;
        for shot in &plan.shots {
            for id in shot.characters.keys() {
                if !store.contains_entity(id) {
                    return Err(CoreError::UnknownEntity(id.clone()).into());
                }
            }
        }

        let production_id = Uuid::new_v4();
        let started_at = Utc::now();
        tracing::info!(
            %production_id,
            title = %plan.title,
            shots = plan.shots.len(),
            "Starting production",
        );
        self.publish_stage(production_id, ProductionStage::Preparing);

        let segmenter = ShotSegmenter::new(self.config.split_config())?;
        let planned = self.plan_shots(plan, &segmenter)?;
        let total_segments: usize = planned.iter().map(|p| p.segments.len()).sum();
        let chains = partition_chains(plan);
        tracing::info!(
            %production_id,
            total_segments,
            chains = chains.len(),
            "Production planned",
        );

        let dispatcher = SegmentDispatcher::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.compiler),
            self.config.max_workers,
            self.config.pacing.clone(),
            self.config.generation_timeout,
        );
        let coordinator = RetryCoordinator::new(
            dispatcher,
            Arc::clone(&self.frames),
            segmenter,
            self.config.retry.clone(),
            self.config.fallback_providers.clone(),
            self.config.max_split_depth,
        );

        let mut report = ProgressReport::new(total_segments);
        report.current_stage = ProductionStage::Generating;
        let run = Run {
            production_id,
            plan,
            store: SharedContinuityStore::new(store),
            barrier: CommitBarrier::new(),
            progress: Mutex::new(report),
            coordinator,
        };
        self.publish_stage(production_id, ProductionStage::Generating);

        let chain_results = join_all(chains.iter().map(|chain| {
            let shots: Vec<&PlannedShot<'_>> = chain.iter().map(|&i| &planned[i]).collect();
            self.run_chain(&run, shots)
        }))
        .await;

        let mut records = Vec::with_capacity(planned.len());
        for result in chain_results {
            records.extend(result?);
        }
        records.sort_by_key(|record| record.index);

        self.publish_stage(production_id, ProductionStage::Finalizing);
        let cancelled = self.cancel.is_cancelled();
        let snapshots = run.store.read(|s| s.snapshots().to_vec()).await;

        let mut generated = Vec::new();
        let mut skipped = Vec::new();
        let mut manifest = Vec::with_capacity(records.len());
        for record in records {
            let shot = &planned[record.index];
            manifest.push(ShotManifestEntry {
                shot_id: shot.shot.id.clone(),
                provider: shot.provider.clone(),
                segment_ids: shot.segments.iter().map(|s| s.id.clone()).collect(),
                retry_attempts: record.attempts,
                outcome: ShotOutcome::classify(
                    shot.segments.len(),
                    record.attempted_segments - record.skipped.len(),
                    record.skipped.len(),
                ),
                committed_frame: record.committed_frame,
            });
            generated.extend(record.generated);
            skipped.extend(record.skipped);
        }

        let final_stage = if cancelled {
            ProductionStage::Cancelled
        } else {
            ProductionStage::Complete
        };
        self.publish_stage(production_id, final_stage);
        tracing::info!(
            %production_id,
            generated = generated.len(),
            skipped = skipped.len(),
            cancelled,
            "Production finished",
        );

        Ok(ProductionResult {
            production_id,
            title: plan.title.clone(),
            generated,
            skipped,
            manifest,
            snapshots,
            cancelled,
            started_at,
            finished_at: Utc::now(),
        })
    }

    fn plan_shots<'a>(
        &self,
        plan: &'a ShotPlan,
        segmenter: &ShotSegmenter,
    ) -> Result<Vec<PlannedShot<'a>>, PipelineError> {
        plan.shots
            .iter()
            .enumerate()
            .map(|(index, shot)| {
                let provider = self.resolve_provider(shot)?;
                let backend = self
                    .registry
                    .get(&provider)
                    .ok_or_else(|| PipelineError::ProviderNotFound(provider.clone()))?;
                let max_segment = self.config.limits.max_segment.min(backend.max_duration());
                let segments = segmenter.split_with_max(shot, backend.max_duration())?;
                Ok(PlannedShot {
                    index,
                    shot,
                    provider,
                    max_segment,
                    segments,
                })
            })
            .collect()
    }

    fn resolve_provider(&self, shot: &Shot) -> Result<String, PipelineError> {
        shot.provider
            .as_deref()
            .or(self.config.default_provider.as_deref())
            .or(self.registry.default_name())
            .map(str::to_string)
            .ok_or_else(|| PipelineError::ProviderNotFound(format!("no provider for shot '{}'", shot.id)))
    }

    /// Run one chain's shots in order. Every shot passes the commit
    /// barrier, even after an error, so other chains never stall.
    async fn run_chain(
        &self,
        run: &Run<'_>,
        shots: Vec<&PlannedShot<'_>>,
    ) -> Result<Vec<ShotRecord>, PipelineError> {
        let mut records = Vec::with_capacity(shots.len());
        let mut carry: Option<PathBuf> = None;
        let mut failure: Option<CoreError> = None;

        for planned in shots {
            if failure.is_some() {
                run.barrier.wait_turn(planned.index).await;
                run.barrier.advance();
                continue;
            }
            match self.run_shot(run, planned, carry.clone()).await {
                Ok(record) => {
                    if record.last_frame.is_some() {
                        carry = record.last_frame.clone();
                    }
                    records.push(record);
                }
                Err(e) => failure = Some(e),
            }
        }

        match failure {
            Some(e) => Err(e.into()),
            None => Ok(records),
        }
    }

    async fn run_shot(
        &self,
        run: &Run<'_>,
        planned: &PlannedShot<'_>,
        carry: Option<PathBuf>,
    ) -> Result<ShotRecord, CoreError> {
        let mut record = ShotRecord {
            index: planned.index,
            ..Default::default()
        };

        let generated = self.generate_shot(run, planned, carry, &mut record).await;

        run.barrier.wait_turn(planned.index).await;
        let committed = match generated {
            Ok(()) if record.attempted_segments > 0 => {
                let commit = run
                    .store
                    .write(|store| commit_shot(store, run.plan, planned, &self.config))
                    .await;
                commit.map(Some)
            }
            Ok(()) => Ok(None),
            Err(e) => Err(e),
        };
        run.barrier.advance();

        record.committed_frame = committed?;
        if let Some(frame_number) = record.committed_frame {
            tracing::info!(shot_id = %planned.shot.id, frame_number, "Shot committed");
            self.events.publish(ProductionEvent::new(
                run.production_id,
                ProductionEventKind::ShotCommitted {
                    shot_id: planned.shot.id.clone(),
                    frame_number,
                },
            ));
        }
        Ok(record)
    }

    async fn generate_shot(
        &self,
        run: &Run<'_>,
        planned: &PlannedShot<'_>,
        carry: Option<PathBuf>,
        record: &mut ShotRecord,
    ) -> Result<(), CoreError> {
        let shot = planned.shot;
        if self.cancel.is_cancelled() {
            tracing::info!(shot_id = %shot.id, "Shot not started, production cancelled");
            return Ok(());
        }

        // Overrides land in the shared store only at commit, so a shot from
        // a faster chain cannot leak into an earlier shot's snapshot.
        let lookback = self.config.context_lookback;
        let context: ContinuityContext = run
            .store
            .read(|store| {
                let mut staged = store.clone();
                stage_shot(&mut staged, shot)?;
                Ok::<_, CoreError>(staged.continuity_context(lookback))
            })
            .await?;

        let explicit_frame = shot.starting_frame.as_ref().map(PathBuf::from);
        let mut last_frame: Option<PathBuf> = None;

        for segment in &planned.segments {
            if self.cancel.is_cancelled() {
                tracing::info!(
                    shot_id = %shot.id,
                    segment_id = %segment.id,
                    "Stopping shot, production cancelled",
                );
                break;
            }

            let starting_frame = last_frame
                .clone()
                .or_else(|| explicit_frame.clone())
                .or_else(|| carry.clone());
            let result = run
                .coordinator
                .generate(SegmentJob {
                    shot,
                    segment,
                    context: &context,
                    provider: &planned.provider,
                    starting_frame: starting_frame.as_ref(),
                    max_segment: planned.max_segment,
                })
                .await?;

            record.attempted_segments += 1;
            record.attempts.extend(result.attempts);
            let error = match result.outcome {
                RecoveryOutcome::Generated(clips) => {
                    if let Some(last) = clips.last() {
                        last_frame = match self.frames.extract_last_frame(&last.output_path).await {
                            Ok(frame) => Some(frame),
                            Err(e) => {
                                tracing::warn!(segment_id = %segment.id, error = %e, "Frame extraction failed");
                                None
                            }
                        };
                    }
                    record.generated.extend(
                        clips
                            .into_iter()
                            .map(|clip| GeneratedSegment::from_clip(&shot.id, clip)),
                    );
                    None
                }
                RecoveryOutcome::Skipped(error) => {
                    let error = error.to_string();
                    record.skipped.push(SkippedSegment {
                        shot_id: shot.id.clone(),
                        segment_id: segment.id.clone(),
                        error: error.clone(),
                    });
                    self.events.publish(ProductionEvent::new(
                        run.production_id,
                        ProductionEventKind::SegmentSkipped {
                            shot_id: shot.id.clone(),
                            segment_id: segment.id.clone(),
                            error: error.clone(),
                        },
                    ));
                    Some(error)
                }
            };
            self.report_progress(run, error).await;
        }

        record.last_frame = last_frame;
        Ok(())
    }

    async fn report_progress(&self, run: &Run<'_>, error: Option<String>) {
        let report = {
            let mut progress = run.progress.lock().await;
            progress.completed_segments += 1;
            progress.errors.extend(error);
            progress.clone()
        };
        tracing::debug!(
            completed = report.completed_segments,
            total = report.total_segments,
            "Production progress",
        );
        self.events
            .publish(ProductionEvent::progress(run.production_id, report));
    }

    fn publish_stage(&self, production_id: Uuid, stage: ProductionStage) {
        tracing::debug!(%production_id, stage = stage.as_str(), "Production stage changed");
        self.events.publish(ProductionEvent::stage(production_id, stage));
    }
}

/// Apply a shot's pre-generation overrides: character staging and
/// environment.
fn stage_shot(store: &mut ContinuityStore, shot: &Shot) -> Result<(), CoreError> {
    for (id, spec) in &shot.characters {
        store.update_entity(id, spec.staging_update())?;
    }
    if let Some(environment) = &shot.environment {
        store.set_environment(environment.to_state());
    }
    Ok(())
}

/// Fold a generated shot into the store and advance the timeline.
///
/// Returns the frame number after the shot.
fn commit_shot(
    store: &mut ContinuityStore,
    plan: &ShotPlan,
    planned: &PlannedShot<'_>,
    config: &PipelineConfig,
) -> Result<FrameNumber, CoreError> {
    let shot = planned.shot;
    stage_shot(store, shot)?;
    for (id, spec) in &shot.characters {
        if let Some(update) = spec.emotion_update() {
            store.update_entity(id, update)?;
        }
    }
    if let Some(camera) = &shot.camera {
        store.update_camera(camera.to_update())?;
    }
    if let Some(lighting) = &shot.lighting {
        let target = lighting.to_target(store.lighting());
        store.evolve_lighting(&target, config.lighting_blend)?;
    }

    if shot.audio.dialogue.is_some() {
        let dialogue = shot.audio.spoken_dialogue().map(str::to_string);
        let speaker = shot.audio.speaker().and_then(|label| {
            let resolved = plan.resolve_speaker(label);
            if resolved.is_none() {
                tracing::warn!(shot_id = %shot.id, speaker = label, "Dialogue speaker is not a known character");
            }
            resolved
        });
        store.set_speaker(speaker.map(String::as_str), dialogue)?;
    }
    if let Some(cue) = &shot.audio.music_cue {
        store.add_audio_cue("music", cue.clone());
    }
    for effect in &shot.audio.sound_effects {
        store.add_audio_cue("sound_effect", effect.clone());
    }

    let frames = (planned.duration() * config.frame_rate).round() as FrameNumber;
    store.advance_frame(frames);
    Ok(store.frame_number())
}

#[cfg(test)]
mod tests {
    use super::*;
    use montage_core::shot_plan::{CharacterDefinition, EnvironmentSpec};

    fn plan(shots: Vec<Shot>) -> ShotPlan {
        ShotPlan {
            title: "Test".into(),
            shots,
            ..Default::default()
        }
    }

    // -- chains --

    #[test]
    fn location_change_starts_new_chain() {
        let plan = plan(vec![
            Shot::new("a", "x").with_location("kitchen"),
            Shot::new("b", "x"),
            Shot::new("c", "x").with_location("garden"),
            Shot::new("d", "x").with_location("garden"),
        ]);
        assert_eq!(partition_chains(&plan), vec![vec![0, 1], vec![2, 3]]);
    }

    #[test]
    fn shot_without_continuity_starts_new_chain() {
        let mut independent = Shot::new("b", "x");
        independent.continuity_required = false;
        let plan = plan(vec![Shot::new("a", "x"), independent, Shot::new("c", "x")]);
        assert_eq!(partition_chains(&plan), vec![vec![0], vec![1, 2]]);
    }

    #[test]
    fn initial_environment_counts_as_previous_location() {
        let mut plan = plan(vec![
            Shot::new("a", "x").with_location("harbour"),
            Shot::new("b", "x").with_location("ship"),
        ]);
        plan.initial_environment = Some(EnvironmentSpec {
            location: "harbour".into(),
            ..Default::default()
        });
        assert_eq!(partition_chains(&plan), vec![vec![0], vec![1]]);
    }

    // -- seeding --

    #[test]
    fn seed_store_adds_characters_and_environment() {
        let mut plan = plan(vec![]);
        plan.characters.insert(
            "emma".into(),
            CharacterDefinition {
                name: "Emma".into(),
                visual_anchor: Some("red coat".into()),
                description: None,
            },
        );
        plan.initial_environment = Some(EnvironmentSpec {
            location: "harbour".into(),
            ..Default::default()
        });

        let store = seed_store(&plan).unwrap();
        let emma = store.get_entity("emma").unwrap();
        assert!(emma.is_character());
        assert_eq!(emma.visual_anchor.as_deref(), Some("red coat"));
        assert_eq!(store.environment().unwrap().location, "harbour");
    }
}
