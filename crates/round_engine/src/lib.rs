//! Round lifecycle and scoring for the five-target timing game.
//!
//! A [`Round`] moves `NotStarted -> InProgress -> Completed`. The fifth
//! click scores the round; the session is expected to drop back to a fresh
//! `Round::default()` once the result has been written to the log.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use shared::domain::{NewRoundResult, RoundStatus, TARGET_COUNT};
use thiserror::Error;

pub const MIN_TARGET_SECS: f64 = 5.0;
pub const MAX_TARGET_SECS: f64 = 60.0;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RoundError {
    #[error("no round in progress (round is {0})")]
    InvalidState(RoundStatus),
    #[error("round has already been finalized")]
    AlreadyFinalized,
    #[error("malformed time list: {0}")]
    MalformedTimes(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClickOutcome {
    Recorded { click_index: usize },
    Completed(NewRoundResult),
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Round {
    targets: [f64; TARGET_COUNT],
    started_at: Option<DateTime<Utc>>,
    actuals: Vec<f64>,
    status: RoundStatus,
    result: Option<NewRoundResult>,
}

/// Draws five uniform delays in `[5, 60)` and starts the clock at `now`.
pub fn start_round<R: Rng>(rng: &mut R, now: DateTime<Utc>) -> Round {
    let targets = std::array::from_fn(|_| rng.gen_range(MIN_TARGET_SECS..MAX_TARGET_SECS));
    Round::with_targets(targets, now)
}

impl Round {
    /// Starts a round with fixed targets; they are sorted ascending.
    pub fn with_targets(mut targets: [f64; TARGET_COUNT], started_at: DateTime<Utc>) -> Self {
        targets.sort_by(f64::total_cmp);
        Self {
            targets,
            started_at: Some(started_at),
            actuals: Vec::with_capacity(TARGET_COUNT),
            status: RoundStatus::InProgress,
            result: None,
        }
    }

    pub fn status(&self) -> RoundStatus {
        self.status
    }

    pub fn targets(&self) -> &[f64] {
        match self.status {
            RoundStatus::NotStarted => &[],
            _ => &self.targets,
        }
    }

    pub fn actuals(&self) -> &[f64] {
        &self.actuals
    }

    pub fn click_count(&self) -> usize {
        self.actuals.len()
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// Result produced by the fifth click, kept until the session drops the round.
    pub fn result(&self) -> Option<&NewRoundResult> {
        self.result.as_ref()
    }

    /// Seconds since the round started. Clock skew never yields a negative time.
    pub fn elapsed_seconds(&self, now: DateTime<Utc>) -> f64 {
        let Some(started_at) = self.started_at else {
            return 0.0;
        };
        let elapsed = now - started_at;
        let secs = match elapsed.num_microseconds() {
            Some(micros) => micros as f64 / 1_000_000.0,
            None => elapsed.num_milliseconds() as f64 / 1_000.0,
        };
        secs.max(0.0)
    }

    pub fn register_click(&mut self, now: DateTime<Utc>) -> Result<ClickOutcome, RoundError> {
        if self.status != RoundStatus::InProgress || self.actuals.len() >= TARGET_COUNT {
            return Err(RoundError::InvalidState(self.status));
        }

        self.actuals.push(self.elapsed_seconds(now));
        if self.actuals.len() < TARGET_COUNT {
            return Ok(ClickOutcome::Recorded {
                click_index: self.actuals.len() - 1,
            });
        }

        self.status = RoundStatus::Completed;
        let result = self.finalize(now)?;
        Ok(ClickOutcome::Completed(result))
    }

    /// Scores a completed round. Only the first call succeeds.
    pub fn finalize(&mut self, finalized_at: DateTime<Utc>) -> Result<NewRoundResult, RoundError> {
        if self.status != RoundStatus::Completed {
            return Err(RoundError::InvalidState(self.status));
        }
        if self.result.is_some() {
            return Err(RoundError::AlreadyFinalized);
        }

        let actuals: [f64; TARGET_COUNT] = std::array::from_fn(|i| self.actuals[i]);
        let result = NewRoundResult {
            created_at: finalized_at,
            average_difference: average_difference(&self.targets, &actuals),
            targets: self.targets,
            actuals,
        };
        self.result = Some(result.clone());
        Ok(result)
    }
}

/// Mean of `|actuals[i] - targets[i]|`, pairing by index without re-sorting.
pub fn average_difference(targets: &[f64; TARGET_COUNT], actuals: &[f64; TARGET_COUNT]) -> f64 {
    let total: f64 = targets
        .iter()
        .zip(actuals)
        .map(|(target, actual)| (actual - target).abs())
        .sum();
    total / TARGET_COUNT as f64
}

/// Formats times the way the result log stores them: `"5.000, 10.250, ..."`.
pub fn format_times(times: &[f64]) -> String {
    times
        .iter()
        .map(|t| format!("{t:.3}"))
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn parse_times(raw: &str) -> Result<Vec<f64>, RoundError> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    raw.split(',')
        .map(|part| {
            part.trim()
                .parse::<f64>()
                .map_err(|_| RoundError::MalformedTimes(raw.to_string()))
        })
        .collect()
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
