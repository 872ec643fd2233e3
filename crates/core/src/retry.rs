//! Retry policy for failed segment generations.
//!
//! A failed segment escalates through an ordered list of strategies, one
//! per failure, until it succeeds or the retry budget is spent. This module
//! holds the pure policy and the per-segment state machine; executing a
//! strategy against a provider lives in the pipeline crate.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::segmentation::Segment;

/// Retries allowed after the initial attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Word cap applied by the simplified strategy.
pub const SIMPLIFIED_MAX_WORDS: usize = 30;

/// Suffix appended to the id of a simplified segment.
pub const SIMPLIFIED_SUFFIX: &str = "_simple";

/// Words removed by the simplified strategy.
pub const COMPLEX_WORDS: &[&str] = &[
    "simultaneously",
    "meanwhile",
    "subsequently",
    "cinematically",
    "dramatically",
    "elegantly",
];

static PARENTHETICAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\([^)]*\)").expect("valid regex"));

static COMPLEX_WORD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)\b(?:{})\b", COMPLEX_WORDS.join("|"))).expect("valid regex")
});

// ---------------------------------------------------------------------------
// Strategies
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryStrategy {
    /// Resubmit the same request.
    DirectRetry,
    /// Resubmit with a simplified prompt.
    Simplified,
    /// Split the segment into shorter pieces.
    Resplit,
    /// Resubmit on another provider.
    FallbackProvider,
    /// Give up on the segment.
    Skip,
}

impl RetryStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DirectRetry => "direct",
            Self::Simplified => "simplified",
            Self::Resplit => "resplit",
            Self::FallbackProvider => "fallback",
            Self::Skip => "skip",
        }
    }

    pub fn from_label(label: &str) -> Result<Self, CoreError> {
        match label.trim().to_ascii_lowercase().as_str() {
            "direct" | "direct_retry" => Ok(Self::DirectRetry),
            "simplified" => Ok(Self::Simplified),
            "resplit" | "split" => Ok(Self::Resplit),
            "fallback" | "fallback_provider" => Ok(Self::FallbackProvider),
            "skip" => Ok(Self::Skip),
            other => Err(CoreError::Validation(format!(
                "Unknown retry strategy '{other}'. Must be one of: direct, simplified, resplit, \
                 fallback, skip"
            ))),
        }
    }
}

/// The default escalation order.
pub const DEFAULT_RETRY_STRATEGIES: &[RetryStrategy] = &[
    RetryStrategy::DirectRetry,
    RetryStrategy::Simplified,
    RetryStrategy::Resplit,
    RetryStrategy::FallbackProvider,
];

/// What to do after a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryAction {
    Retry(RetryStrategy),
    Skip,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub strategies: Vec<RetryStrategy>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            strategies: DEFAULT_RETRY_STRATEGIES.to_vec(),
        }
    }
}

impl RetryPolicy {
    /// Action after the `failures`-th failure (1-based).
    ///
    /// Failure `k` uses strategy `k - 1`, sticking to the last strategy once
    /// the list runs out. Past `max_retries` failures the segment is skipped.
    pub fn next_action(&self, failures: u32) -> RetryAction {
        if failures == 0 || failures > self.max_retries {
            return RetryAction::Skip;
        }
        let Some(last) = self.strategies.len().checked_sub(1) else {
            return RetryAction::Skip;
        };
        let index = (failures as usize - 1).min(last);
        match self.strategies[index] {
            RetryStrategy::Skip => RetryAction::Skip,
            strategy => RetryAction::Retry(strategy),
        }
    }
}

// ---------------------------------------------------------------------------
// Attempt log & state machine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum AttemptOutcome {
    Succeeded,
    Failed { error: String },
}

/// One generation attempt for a segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryAttempt {
    pub segment_id: String,
    /// 1 is the initial attempt.
    pub attempt_number: u32,
    /// `None` for the initial attempt.
    pub strategy: Option<RetryStrategy>,
    pub outcome: AttemptOutcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum SegmentStatus {
    /// Waiting for an attempt with the given strategy.
    Pending { strategy: Option<RetryStrategy> },
    Succeeded,
    /// The given attempt failed and no decision has been made yet.
    Failed { attempt: u32 },
    Skipped,
}

impl SegmentStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Skipped)
    }
}

/// Tracks one segment through `Pending -> Succeeded` or
/// `Pending -> Failed -> Pending -> ... -> Skipped`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentRetryState {
    segment_id: String,
    status: SegmentStatus,
    attempts: Vec<RetryAttempt>,
}

impl SegmentRetryState {
    pub fn new(segment_id: impl Into<String>) -> Self {
        Self {
            segment_id: segment_id.into(),
            status: SegmentStatus::Pending { strategy: None },
            attempts: Vec::new(),
        }
    }

    pub fn status(&self) -> SegmentStatus {
        self.status
    }

    pub fn attempts(&self) -> &[RetryAttempt] {
        &self.attempts
    }

    pub fn into_attempts(self) -> Vec<RetryAttempt> {
        self.attempts
    }

    pub fn failures(&self) -> u32 {
        self.attempts
            .iter()
            .filter(|a| matches!(a.outcome, AttemptOutcome::Failed { .. }))
            .count() as u32
    }

    /// Error message of the most recent failed attempt.
    pub fn last_error(&self) -> Option<&str> {
        self.attempts.iter().rev().find_map(|a| match &a.outcome {
            AttemptOutcome::Failed { error } => Some(error.as_str()),
            AttemptOutcome::Succeeded => None,
        })
    }

    fn pending_strategy(&self) -> Result<Option<RetryStrategy>, CoreError> {
        match self.status {
            SegmentStatus::Pending { strategy } => Ok(strategy),
            other => Err(CoreError::Internal(format!(
                "Segment '{}' has no pending attempt (status {other:?})",
                self.segment_id
            ))),
        }
    }

    pub fn record_success(&mut self) -> Result<(), CoreError> {
        let strategy = self.pending_strategy()?;
        self.attempts.push(RetryAttempt {
            segment_id: self.segment_id.clone(),
            attempt_number: self.attempts.len() as u32 + 1,
            strategy,
            outcome: AttemptOutcome::Succeeded,
        });
        self.status = SegmentStatus::Succeeded;
        Ok(())
    }

    pub fn record_failure(&mut self, error: impl Into<String>) -> Result<(), CoreError> {
        let strategy = self.pending_strategy()?;
        let attempt_number = self.attempts.len() as u32 + 1;
        self.attempts.push(RetryAttempt {
            segment_id: self.segment_id.clone(),
            attempt_number,
            strategy,
            outcome: AttemptOutcome::Failed {
                error: error.into(),
            },
        });
        self.status = SegmentStatus::Failed {
            attempt: attempt_number,
        };
        Ok(())
    }

    /// Decide the next step after a failure and move to `Pending` or
    /// `Skipped` accordingly.
    pub fn escalate(&mut self, policy: &RetryPolicy) -> Result<RetryAction, CoreError> {
        if !matches!(self.status, SegmentStatus::Failed { .. }) {
            return Err(CoreError::Internal(format!(
                "Segment '{}' can only escalate after a failure (status {:?})",
                self.segment_id, self.status
            )));
        }
        let action = policy.next_action(self.failures());
        self.status = match action {
            RetryAction::Retry(strategy) => SegmentStatus::Pending {
                strategy: Some(strategy),
            },
            RetryAction::Skip => SegmentStatus::Skipped,
        };
        Ok(action)
    }
}

// ---------------------------------------------------------------------------
// Simplification
// ---------------------------------------------------------------------------

/// Strip parenthetical asides and complex adverbs, then cap the word count.
pub fn simplify_action(action: &str, max_words: usize) -> String {
    let without_asides = PARENTHETICAL_RE.replace_all(action, " ");
    let plain = COMPLEX_WORD_RE.replace_all(&without_asides, " ");
    plain
        .split_whitespace()
        .take(max_words)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Derived segment for the simplified strategy: same timing, simplified
/// action, no narration, id suffixed with `_simple`.
pub fn simplify_segment(segment: &Segment) -> Segment {
    Segment {
        id: format!("{}{SIMPLIFIED_SUFFIX}", segment.id),
        action: simplify_action(&segment.action, SIMPLIFIED_MAX_WORDS),
        narration: None,
        ..segment.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    // -- policy --

    #[test]
    fn escalates_one_strategy_per_failure() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.next_action(1), RetryAction::Retry(RetryStrategy::DirectRetry));
        assert_eq!(policy.next_action(2), RetryAction::Retry(RetryStrategy::Simplified));
        assert_eq!(policy.next_action(3), RetryAction::Retry(RetryStrategy::Resplit));
        assert_eq!(policy.next_action(4), RetryAction::Skip);
    }

    #[test]
    fn short_strategy_list_repeats_last_entry() {
        let policy = RetryPolicy {
            max_retries: 4,
            strategies: vec![RetryStrategy::DirectRetry, RetryStrategy::FallbackProvider],
        };
        assert_eq!(
            policy.next_action(4),
            RetryAction::Retry(RetryStrategy::FallbackProvider)
        );
        assert_eq!(policy.next_action(5), RetryAction::Skip);
    }

    #[test]
    fn explicit_skip_and_empty_list() {
        let skip = RetryPolicy {
            max_retries: 3,
            strategies: vec![RetryStrategy::Skip],
        };
        assert_eq!(skip.next_action(1), RetryAction::Skip);

        let empty = RetryPolicy {
            max_retries: 3,
            strategies: vec![],
        };
        assert_eq!(empty.next_action(1), RetryAction::Skip);
    }

    #[test]
    fn escalation_never_moves_backwards() {
        let policy = RetryPolicy {
            max_retries: 10,
            ..Default::default()
        };
        let position = |s: RetryStrategy| policy.strategies.iter().position(|x| *x == s);
        let mut previous = 0;
        for failures in 1..=10 {
            if let RetryAction::Retry(strategy) = policy.next_action(failures) {
                let index = position(strategy).unwrap();
                assert!(index >= previous);
                previous = index;
            }
        }
    }

    #[test]
    fn strategy_labels() {
        assert_eq!(RetryStrategy::from_label("split").unwrap(), RetryStrategy::Resplit);
        assert_eq!(
            RetryStrategy::from_label("Fallback").unwrap(),
            RetryStrategy::FallbackProvider
        );
        assert_matches!(RetryStrategy::from_label("pray"), Err(CoreError::Validation(_)));
    }

    // -- state machine --

    #[test]
    fn four_failures_with_three_retries_ends_skipped() {
        let policy = RetryPolicy::default();
        let mut state = SegmentRetryState::new("s_seg00");
        let mut actions = Vec::new();

        while !state.status().is_terminal() {
            state.record_failure("provider down").unwrap();
            actions.push(state.escalate(&policy).unwrap());
        }

        assert_eq!(state.status(), SegmentStatus::Skipped);
        assert_eq!(state.attempts().len(), 4);
        assert_eq!(state.attempts()[0].strategy, None);
        assert_eq!(state.attempts()[3].strategy, Some(RetryStrategy::Resplit));
        assert_eq!(actions.last(), Some(&RetryAction::Skip));
        assert_eq!(state.last_error(), Some("provider down"));
    }

    #[test]
    fn success_after_retry_records_strategy() {
        let mut state = SegmentRetryState::new("s_seg00");
        state.record_failure("timeout").unwrap();
        state.escalate(&RetryPolicy::default()).unwrap();
        state.record_success().unwrap();

        assert_eq!(state.status(), SegmentStatus::Succeeded);
        assert_eq!(state.attempts()[1].attempt_number, 2);
        assert_eq!(state.attempts()[1].strategy, Some(RetryStrategy::DirectRetry));
        assert_eq!(state.attempts()[1].outcome, AttemptOutcome::Succeeded);
    }

    #[test]
    fn terminal_states_reject_transitions() {
        let mut state = SegmentRetryState::new("s_seg00");
        state.record_success().unwrap();
        assert_matches!(state.record_failure("late"), Err(CoreError::Internal(_)));
        assert_matches!(state.escalate(&RetryPolicy::default()), Err(CoreError::Internal(_)));
    }

    #[test]
    fn cannot_record_twice_without_escalating() {
        let mut state = SegmentRetryState::new("s_seg00");
        state.record_failure("x").unwrap();
        assert_matches!(state.record_failure("y"), Err(CoreError::Internal(_)));
    }

    // -- simplification --

    #[test]
    fn simplify_strips_asides_and_complex_words() {
        let simplified = simplify_action(
            "She turns (slowly, with hesitation) and Dramatically exits, meanwhile rain falls.",
            30,
        );
        assert_eq!(simplified, "She turns and exits, rain falls.");
    }

    #[test]
    fn simplify_caps_word_count() {
        let long = vec!["walk"; 50].join(" ");
        assert_eq!(simplify_action(&long, 30).split_whitespace().count(), 30);
    }

    #[test]
    fn simplified_segment_keeps_timing() {
        let segment = Segment {
            id: "shot_seg01".into(),
            parent_shot_id: "shot".into(),
            index: 1,
            start_time: 7.0,
            end_time: 14.0,
            duration: 7.0,
            action: "He sits (heavily).".into(),
            narration: Some("He was tired.".into()),
            requires_starting_frame: true,
            starting_frame_source: Some("shot_seg00".into()),
        };
        let simple = simplify_segment(&segment);
        assert_eq!(simple.id, "shot_seg01_simple");
        assert_eq!(simple.action, "He sits .");
        assert_eq!(simple.narration, None);
        assert_eq!(simple.duration, 7.0);
        assert_eq!(simple.starting_frame_source.as_deref(), Some("shot_seg00"));
    }
}
