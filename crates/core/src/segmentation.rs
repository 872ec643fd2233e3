//! Shot segmentation: cutting a shot into provider-sized segments.
//!
//! Split points come from several heuristics (audio beats, sentence
//! boundaries, visual action keywords, fixed intervals). The adaptive
//! strategy combines them by priority, then a normalisation pass makes
//! sure no segment exceeds the maximum duration and short slivers are
//! folded into their neighbours where the maximum allows it.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::shot_plan::{Shot, ShotPlan};
use crate::threshold_validation::validate_positive_duration;
use crate::timing::{
    dialogue_speed_modifier, estimate_narration_duration, shot_duration, DEFAULT_WORDS_PER_MINUTE,
    DIALOGUE_RATE_FACTOR,
};
use crate::types::TIME_EPSILON;

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

/// Longest segment a provider is asked to render, in seconds.
pub const DEFAULT_MAX_SEGMENT_SECS: f64 = 8.0;
/// Shortest segment worth rendering on its own, in seconds.
pub const DEFAULT_MIN_SEGMENT_SECS: f64 = 2.0;
/// Silence inserted between spoken sentences.
pub const DEFAULT_SENTENCE_PAUSE_SECS: f64 = 0.3;
/// Split points closer than this are collapsed into one.
pub const DEFAULT_MIN_SPLIT_GAP_SECS: f64 = 1.0;
/// Hard ceiling on segments per shot to prevent runaway splits.
pub const MAX_SEGMENTS_PER_SHOT: usize = 200;

// ---------------------------------------------------------------------------
// Priorities
// ---------------------------------------------------------------------------

pub const PRIORITY_AUDIO: u8 = 3;
pub const PRIORITY_SENTENCE: u8 = 2;
pub const PRIORITY_VISUAL: u8 = 1;
pub const PRIORITY_FIXED: u8 = 0;

/// Action keywords that usually mark a change of visual beat, with their
/// relative weight. Matched as whole words, case-insensitively.
pub const VISUAL_ACTION_MARKERS: &[(&str, f64)] = &[
    ("then", 0.5),
    ("after", 0.5),
    ("next", 0.5),
    ("suddenly", 0.3),
    ("moving", 0.4),
    ("turning", 0.4),
    ("walking", 0.6),
    ("running", 0.4),
];

static MARKER_PATTERNS: LazyLock<Vec<(Regex, &'static str, f64)>> = LazyLock::new(|| {
    VISUAL_ACTION_MARKERS
        .iter()
        .map(|(word, weight)| {
            let re = Regex::new(&format!(r"(?i)\b{word}\b")).expect("valid regex");
            (re, *word, *weight)
        })
        .collect()
});

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Allowed segment length range in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DurationLimits {
    pub min_segment: f64,
    pub max_segment: f64,
}

impl Default for DurationLimits {
    fn default() -> Self {
        Self {
            min_segment: DEFAULT_MIN_SEGMENT_SECS,
            max_segment: DEFAULT_MAX_SEGMENT_SECS,
        }
    }
}

impl DurationLimits {
    pub fn new(min_segment: f64, max_segment: f64) -> Result<Self, CoreError> {
        let limits = Self {
            min_segment,
            max_segment,
        };
        limits.validate()?;
        Ok(limits)
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        let finite = self.min_segment.is_finite() && self.max_segment.is_finite();
        if !finite || self.min_segment <= 0.0 || self.max_segment <= 0.0 {
            return Err(CoreError::InvalidDurationConfig(format!(
                "Segment durations must be positive, got min {} and max {}",
                self.min_segment, self.max_segment
            )));
        }
        if self.min_segment > self.max_segment {
            return Err(CoreError::InvalidDurationConfig(format!(
                "Minimum segment duration {} exceeds maximum {}",
                self.min_segment, self.max_segment
            )));
        }
        Ok(())
    }

    /// Limits with the maximum lowered to a provider's capability.
    pub fn capped(&self, provider_max: f64) -> Result<Self, CoreError> {
        Self::new(self.min_segment, self.max_segment.min(provider_max))
    }
}

/// Which heuristic chooses split points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitStrategy {
    #[default]
    Adaptive,
    AudioBeats,
    SentenceBreaks,
    VisualActions,
    Fixed,
}

impl SplitStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Adaptive => "adaptive",
            Self::AudioBeats => "audio_beats",
            Self::SentenceBreaks => "sentence_breaks",
            Self::VisualActions => "visual_actions",
            Self::Fixed => "fixed",
        }
    }

    pub fn from_label(label: &str) -> Result<Self, CoreError> {
        match label.trim().to_ascii_lowercase().as_str() {
            "adaptive" => Ok(Self::Adaptive),
            "audio_beats" => Ok(Self::AudioBeats),
            "sentence_breaks" => Ok(Self::SentenceBreaks),
            "visual_actions" => Ok(Self::VisualActions),
            "fixed" => Ok(Self::Fixed),
            other => Err(CoreError::Validation(format!(
                "Unknown split strategy '{other}'. Must be one of: adaptive, audio_beats, \
                 sentence_breaks, visual_actions, fixed"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitConfig {
    pub limits: DurationLimits,
    pub strategy: SplitStrategy,
    pub words_per_minute: f64,
    pub pause_between_sentences: f64,
    pub min_split_gap: f64,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            limits: DurationLimits::default(),
            strategy: SplitStrategy::Adaptive,
            words_per_minute: DEFAULT_WORDS_PER_MINUTE,
            pause_between_sentences: DEFAULT_SENTENCE_PAUSE_SECS,
            min_split_gap: DEFAULT_MIN_SPLIT_GAP_SECS,
        }
    }
}

impl SplitConfig {
    pub fn with_limits(limits: DurationLimits) -> Self {
        Self {
            limits,
            ..Default::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Split points & segments
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum SplitReason {
    AudioBeat,
    SentenceBreak,
    VisualAction { keyword: &'static str, weight: f64 },
    FixedInterval,
}

/// Candidate cut position within a shot, in seconds from its start.
#[derive(Debug, Clone, PartialEq)]
pub struct SplitPoint {
    pub time: f64,
    pub reason: SplitReason,
    pub priority: u8,
}

impl SplitPoint {
    fn new(time: f64, reason: SplitReason, priority: u8) -> Self {
        Self {
            time,
            reason,
            priority,
        }
    }
}

/// One provider call's worth of a shot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub id: String,
    pub parent_shot_id: String,
    pub index: usize,
    pub start_time: f64,
    pub end_time: f64,
    pub duration: f64,
    pub action: String,
    pub narration: Option<String>,
    pub requires_starting_frame: bool,
    /// Id of the segment whose last frame seeds this one.
    pub starting_frame_source: Option<String>,
}

pub fn segment_id(shot_id: &str, index: usize) -> String {
    format!("{shot_id}_seg{index:02}")
}

// ---------------------------------------------------------------------------
// Text helpers
// ---------------------------------------------------------------------------

/// Split text at `.`, `!` or `?` followed by whitespace.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = text.trim().chars().peekable();

    while let Some(c) = chars.next() {
        current.push(c);
        let at_boundary = matches!(c, '.' | '!' | '?')
            && chars.peek().is_some_and(|next| next.is_whitespace());
        if at_boundary {
            let sentence = current.trim();
            if !sentence.is_empty() {
                sentences.push(sentence.to_string());
            }
            current.clear();
        }
    }
    let rest = current.trim();
    if !rest.is_empty() {
        sentences.push(rest.to_string());
    }
    sentences
}

/// Spread `items` over `buckets` in order; the last bucket takes the rest.
fn distribute<T: Clone>(items: &[T], buckets: usize) -> Vec<Vec<T>> {
    if buckets == 0 {
        return Vec::new();
    }
    let per_bucket = (items.len() / buckets).max(1);
    let mut out = Vec::with_capacity(buckets);
    let mut idx = 0;
    for bucket in 0..buckets {
        if bucket == buckets - 1 {
            out.push(items[idx.min(items.len())..].to_vec());
        } else {
            let end = (idx + per_bucket).min(items.len());
            out.push(items[idx..end].to_vec());
            idx = end;
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Split-point strategies
// ---------------------------------------------------------------------------

/// Cuts at sentence boundaries of the spoken audio whenever the running
/// segment would exceed `max_segment`.
///
/// Returns `None` when the shot has neither narration nor dialogue.
pub fn audio_beat_points(shot: &Shot, config: &SplitConfig, max_segment: f64) -> Option<Vec<SplitPoint>> {
    let (text, rate) = match (&shot.audio.narration, shot.audio.spoken_dialogue()) {
        (Some(narration), _) if !narration.trim().is_empty() => {
            (narration.as_str(), config.words_per_minute)
        }
        (_, Some(dialogue)) if !dialogue.is_empty() => {
            let speed = dialogue_speed_modifier(shot.audio.dialogue_emotion.as_deref());
            (dialogue, config.words_per_minute * DIALOGUE_RATE_FACTOR * speed)
        }
        _ => return None,
    };

    let mut points = Vec::new();
    let mut time = shot.audio.audio_delay.max(0.0);
    let mut segment_start = 0.0;
    for sentence in split_sentences(text) {
        let spoken = estimate_narration_duration(&sentence, rate);
        if time + spoken - segment_start > max_segment && time > segment_start {
            points.push(SplitPoint::new(time, SplitReason::AudioBeat, PRIORITY_AUDIO));
            segment_start = time;
        }
        time += spoken + config.pause_between_sentences;
    }
    Some(points)
}

/// Cuts at sentence boundaries of the shot text, assuming sentences take
/// equal time, whenever the running segment would exceed `max_segment`.
pub fn sentence_break_points(shot: &Shot, total: f64, max_segment: f64) -> Vec<SplitPoint> {
    let text = shot
        .audio
        .narration
        .as_deref()
        .or(shot.audio.spoken_dialogue())
        .filter(|t| !t.trim().is_empty())
        .unwrap_or(shot.action.as_str());
    let sentences = split_sentences(text);
    if sentences.len() <= 1 {
        return Vec::new();
    }

    let per_sentence = total / sentences.len() as f64;
    let mut points = Vec::new();
    let mut segment_start = 0.0;
    for i in 1..sentences.len() {
        let boundary = per_sentence * i as f64;
        let next = boundary + per_sentence;
        if next - segment_start > max_segment + TIME_EPSILON {
            points.push(SplitPoint::new(boundary, SplitReason::SentenceBreak, PRIORITY_SENTENCE));
            segment_start = boundary;
        }
    }
    points
}

/// Places a cut wherever an action keyword appears, at the keyword's
/// relative word position in the action text.
///
/// Points at or before `min_segment` are ignored.
pub fn visual_action_points(action: &str, total: f64, min_segment: f64) -> Vec<SplitPoint> {
    let total_words = action.split_whitespace().count().max(1);
    let mut points = Vec::new();
    for (pattern, keyword, weight) in MARKER_PATTERNS.iter() {
        for found in pattern.find_iter(action) {
            let word_index = action[..found.start()].split_whitespace().count();
            let time = word_index as f64 / total_words as f64 * total;
            if time > min_segment {
                points.push(SplitPoint::new(
                    time,
                    SplitReason::VisualAction {
                        keyword: *keyword,
                        weight: *weight,
                    },
                    PRIORITY_VISUAL,
                ));
            }
        }
    }
    points.sort_by(|a, b| a.time.total_cmp(&b.time));
    points
}

/// Evenly spaced cuts producing `ceil(total / max_segment)` segments.
pub fn fixed_interval_points(total: f64, max_segment: f64, priority: u8) -> Vec<SplitPoint> {
    if total <= 0.0 || max_segment <= 0.0 {
        return Vec::new();
    }
    let count = (total / max_segment - TIME_EPSILON).ceil().max(1.0) as usize;
    let step = total / count as f64;
    (1..count)
        .map(|i| SplitPoint::new(step * i as f64, SplitReason::FixedInterval, priority))
        .collect()
}

/// Sort by time and collapse points closer than `min_gap`, keeping the
/// higher priority (the earlier point on ties).
pub fn merge_close_points(mut points: Vec<SplitPoint>, min_gap: f64) -> Vec<SplitPoint> {
    points.sort_by(|a, b| a.time.total_cmp(&b.time));
    let mut merged: Vec<SplitPoint> = Vec::with_capacity(points.len());
    for point in points {
        match merged.last_mut() {
            Some(last) if point.time - last.time < min_gap => {
                if point.priority > last.priority {
                    *last = point;
                }
            }
            _ => merged.push(point),
        }
    }
    merged
}

// ---------------------------------------------------------------------------
// Normalisation
// ---------------------------------------------------------------------------

/// Turn candidate points into final cut positions.
///
/// 1. Discard points outside `(0, total)` and collapse near-duplicates.
/// 2. While some segment is shorter than `min_segment`, drop the
///    lower-priority bounding point if the merged segment fits in
///    `max_segment`.
/// 3. Subdivide any segment still longer than `max_segment` evenly.
fn normalise_points(
    points: Vec<SplitPoint>,
    total: f64,
    limits: &DurationLimits,
    min_gap: f64,
) -> Vec<SplitPoint> {
    let inside: Vec<SplitPoint> = points
        .into_iter()
        .filter(|p| p.time.is_finite() && p.time > TIME_EPSILON && p.time < total - TIME_EPSILON)
        .collect();
    let mut points = merge_close_points(inside, min_gap);

    'fold: loop {
        let mut bounds = Vec::with_capacity(points.len() + 2);
        bounds.push(0.0);
        bounds.extend(points.iter().map(|p| p.time));
        bounds.push(total);

        for j in 0..bounds.len() - 1 {
            if bounds[j + 1] - bounds[j] + TIME_EPSILON >= limits.min_segment {
                continue;
            }
            // Point j-1 is the left bound of segment j, point j its right bound.
            let left = (j > 0 && bounds[j + 1] - bounds[j - 1] <= limits.max_segment + TIME_EPSILON)
                .then(|| j - 1);
            let right = (j + 2 < bounds.len()
                && bounds[j + 2] - bounds[j] <= limits.max_segment + TIME_EPSILON)
                .then_some(j);
            let drop = match (left, right) {
                (Some(l), Some(r)) if points[l].priority < points[r].priority => l,
                (Some(_), Some(r)) => r,
                (Some(l), None) => l,
                (None, Some(r)) => r,
                (None, None) => continue,
            };
            points.remove(drop);
            continue 'fold;
        }
        break;
    }

    let mut result = Vec::with_capacity(points.len());
    let mut start = 0.0;
    let ends: Vec<Option<SplitPoint>> = points.into_iter().map(Some).chain([None]).collect();
    for end in ends {
        let end_time = end.as_ref().map_or(total, |p| p.time);
        let span = end_time - start;
        if span > limits.max_segment + TIME_EPSILON {
            for fill in fixed_interval_points(span, limits.max_segment, PRIORITY_FIXED) {
                result.push(SplitPoint::new(start + fill.time, fill.reason, fill.priority));
            }
        }
        if let Some(point) = end {
            result.push(point);
        }
        start = end_time;
    }
    result
}

// ---------------------------------------------------------------------------
// ShotSegmenter
// ---------------------------------------------------------------------------

/// Splits shots into segments no longer than the provider allows.
///
/// Depends only on shot content; never touches the continuity store.
#[derive(Debug, Clone)]
pub struct ShotSegmenter {
    config: SplitConfig,
}

impl ShotSegmenter {
    pub fn new(config: SplitConfig) -> Result<Self, CoreError> {
        config.limits.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &SplitConfig {
        &self.config
    }

    pub fn split(&self, shot: &Shot) -> Result<Vec<Segment>, CoreError> {
        self.split_with_limits(shot, &self.config.limits)
    }

    /// Split with the maximum lowered to `provider_max`.
    pub fn split_with_max(&self, shot: &Shot, provider_max: f64) -> Result<Vec<Segment>, CoreError> {
        let limits = self.config.limits.capped(provider_max)?;
        self.split_with_limits(shot, &limits)
    }

    /// Segment every shot of a plan, in plan order.
    pub fn split_plan(&self, plan: &ShotPlan) -> Result<Vec<Vec<Segment>>, CoreError> {
        plan.shots.iter().map(|shot| self.split(shot)).collect()
    }

    pub fn split_with_limits(
        &self,
        shot: &Shot,
        limits: &DurationLimits,
    ) -> Result<Vec<Segment>, CoreError> {
        limits.validate()?;
        let total = shot_duration(shot, self.config.words_per_minute);
        validate_positive_duration(total, &format!("Shot '{}' duration", shot.id))?;

        let expected = (total / limits.max_segment).ceil();
        if expected > MAX_SEGMENTS_PER_SHOT as f64 {
            return Err(CoreError::InvalidDurationConfig(format!(
                "Shot '{}' would need {expected} segments (limit {MAX_SEGMENTS_PER_SHOT})",
                shot.id
            )));
        }

        if total <= limits.max_segment + TIME_EPSILON || total < limits.min_segment {
            return Ok(vec![single_segment(shot, total)]);
        }

        let candidates = self.find_split_points(shot, total, limits);
        let points = normalise_points(candidates, total, limits, self.config.min_split_gap);

        let mut times = Vec::with_capacity(points.len() + 2);
        times.push(0.0);
        times.extend(points.iter().map(|p| p.time));
        times.push(total);

        let segments = build_segments(shot, &times);
        tracing::debug!(
            shot_id = %shot.id,
            total_secs = total,
            segments = segments.len(),
            strategy = self.config.strategy.as_str(),
            "Shot segmented",
        );
        Ok(segments)
    }

    fn find_split_points(&self, shot: &Shot, total: f64, limits: &DurationLimits) -> Vec<SplitPoint> {
        let max = limits.max_segment;
        match self.config.strategy {
            SplitStrategy::Adaptive => self.adaptive_points(shot, total, limits),
            SplitStrategy::AudioBeats => audio_beat_points(shot, &self.config, max)
                .unwrap_or_else(|| fixed_interval_points(total, max, PRIORITY_FIXED)),
            SplitStrategy::SentenceBreaks => sentence_break_points(shot, total, max),
            SplitStrategy::VisualActions => {
                visual_action_points(&shot.action, total, limits.min_segment)
            }
            SplitStrategy::Fixed => fixed_interval_points(total, max, PRIORITY_FIXED),
        }
    }

    /// Audio beats outrank sentence breaks, which outrank visual keywords.
    /// Silent shots fall back to fixed intervals at audio priority.
    fn adaptive_points(&self, shot: &Shot, total: f64, limits: &DurationLimits) -> Vec<SplitPoint> {
        let max = limits.max_segment;
        let audio = audio_beat_points(shot, &self.config, max)
            .unwrap_or_else(|| fixed_interval_points(total, max, PRIORITY_AUDIO));

        let mut all = audio;
        all.extend(sentence_break_points(shot, total, max));
        all.extend(visual_action_points(&shot.action, total, limits.min_segment));

        let mut merged = merge_close_points(all, self.config.min_split_gap);
        let needed = ((total / max).ceil() as usize).saturating_sub(1);
        if merged.len() < needed {
            merged.extend(fixed_interval_points(total, max, PRIORITY_FIXED));
            merged = merge_close_points(merged, self.config.min_split_gap);
        }
        merged
    }
}

fn single_segment(shot: &Shot, total: f64) -> Segment {
    Segment {
        id: segment_id(&shot.id, 0),
        parent_shot_id: shot.id.clone(),
        index: 0,
        start_time: 0.0,
        end_time: total,
        duration: total,
        action: shot.action.clone(),
        narration: shot.audio.narration.clone(),
        requires_starting_frame: false,
        starting_frame_source: None,
    }
}

fn build_segments(shot: &Shot, times: &[f64]) -> Vec<Segment> {
    let count = times.len() - 1;
    let narration = split_sentences(shot.audio.narration.as_deref().unwrap_or_default());
    let action = split_sentences(&shot.action);
    let narration_parts = distribute(&narration, count);
    let action_parts = distribute(&action, count);

    (0..count)
        .map(|i| Segment {
            id: segment_id(&shot.id, i),
            parent_shot_id: shot.id.clone(),
            index: i,
            start_time: times[i],
            end_time: times[i + 1],
            duration: times[i + 1] - times[i],
            action: if action_parts[i].is_empty() {
                shot.action.clone()
            } else {
                action_parts[i].join(" ")
            },
            narration: (!narration_parts[i].is_empty()).then(|| narration_parts[i].join(" ")),
            requires_starting_frame: i > 0,
            starting_frame_source: (i > 0).then(|| segment_id(&shot.id, i - 1)),
        })
        .collect()
}
