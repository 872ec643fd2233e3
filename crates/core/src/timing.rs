//! Audio-driven duration estimation for shots and sentences.
//!
//! Speech length is derived from word counts at a speaking rate. Dialogue
//! speeds up or slows down with the line's emotion.

use crate::shot_plan::Shot;

/// Narration speaking rate in words per minute.
pub const DEFAULT_WORDS_PER_MINUTE: f64 = 150.0;

/// Dialogue is delivered slightly faster than narration.
pub const DIALOGUE_RATE_FACTOR: f64 = 1.1;

/// Shortest duration a non-empty line of narration is given.
pub const MIN_NARRATION_SECS: f64 = 1.0;

/// Headroom added on top of the spoken audio.
pub const AUDIO_BUFFER_FACTOR: f64 = 1.1;

/// Shortest duration derived from audio for a whole shot.
pub const MIN_AUDIO_SHOT_SECS: f64 = 3.0;

/// Speaking-rate multipliers keyed by dialogue emotion.
///
/// Labels not listed here speak at the neutral rate.
pub const DIALOGUE_SPEED_MODIFIERS: &[(&str, f64)] = &[
    ("excited", 1.2),
    ("angry", 1.1),
    ("sad", 0.8),
    ("thoughtful", 0.85),
    ("nervous", 1.15),
    ("calm", 0.9),
    ("neutral", 1.0),
];

pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Speed multiplier for a dialogue emotion label.
pub fn dialogue_speed_modifier(emotion: Option<&str>) -> f64 {
    let Some(label) = emotion else {
        return 1.0;
    };
    let label = label.trim();
    DIALOGUE_SPEED_MODIFIERS
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(label))
        .map_or(1.0, |(_, speed)| *speed)
}

/// Seconds needed to speak `text` at `words_per_minute`, with a floor of
/// [`MIN_NARRATION_SECS`]. Empty text takes no time.
pub fn estimate_narration_duration(text: &str, words_per_minute: f64) -> f64 {
    let words = word_count(text);
    if words == 0 || words_per_minute <= 0.0 {
        return 0.0;
    }
    (words as f64 / words_per_minute * 60.0).max(MIN_NARRATION_SECS)
}

/// Seconds needed to deliver a dialogue line.
///
/// A leading `"Name:"` speaker prefix is not spoken and is ignored.
pub fn estimate_dialogue_duration(
    dialogue: &str,
    emotion: Option<&str>,
    words_per_minute: f64,
) -> f64 {
    let line = match dialogue.split_once(':') {
        Some((name, line)) if !name.trim().contains(char::is_whitespace) => line,
        _ => dialogue,
    };
    let rate = words_per_minute * DIALOGUE_RATE_FACTOR * dialogue_speed_modifier(emotion);
    estimate_narration_duration(line, rate)
}

/// Total audio duration of a shot including delay and buffer.
///
/// Returns `None` when the shot has no narration or dialogue.
pub fn estimate_audio_duration(shot: &Shot, words_per_minute: f64) -> Option<f64> {
    if !shot.audio.has_speech() {
        return None;
    }
    let narration = shot
        .audio
        .narration
        .as_deref()
        .map_or(0.0, |text| estimate_narration_duration(text, words_per_minute));
    let dialogue = shot.audio.dialogue.as_deref().map_or(0.0, |text| {
        estimate_dialogue_duration(
            text,
            shot.audio.dialogue_emotion.as_deref(),
            words_per_minute,
        )
    });
    let total = (narration + dialogue + shot.audio.audio_delay.max(0.0)) * AUDIO_BUFFER_FACTOR;
    Some(total.max(MIN_AUDIO_SHOT_SECS))
}

/// Duration of a shot in seconds.
///
/// An explicit duration wins. Otherwise the audio estimate is clamped into
/// the shot's `[min_duration, max_duration]`; silent shots get the minimum.
pub fn shot_duration(shot: &Shot, words_per_minute: f64) -> f64 {
    if let Some(duration) = shot.duration {
        return duration;
    }
    match estimate_audio_duration(shot, words_per_minute) {
        Some(audio) => audio.clamp(shot.min_duration, shot.max_duration.max(shot.min_duration)),
        None => shot.min_duration,
    }
}
