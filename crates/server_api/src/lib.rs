use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rand::{rngs::StdRng, SeedableRng};
use round_engine::{start_round, ClickOutcome, Round, RoundError};
use serde::{Deserialize, Serialize};
use shared::{
    domain::{ResultId, RoundResult, RoundStatus},
    error::{ApiError, ErrorCode},
    protocol::{GameAction, PageView, RoundSummary, RoundView},
};
use storage::ResultLog;
use tracing::{debug, info};

#[derive(Clone)]
pub struct ApiContext {
    pub results: Arc<dyn ResultLog>,
    rng: Arc<Mutex<StdRng>>,
}

impl ApiContext {
    pub fn new(results: Arc<dyn ResultLog>) -> Self {
        Self {
            results,
            rng: Arc::new(Mutex::new(StdRng::from_entropy())),
        }
    }

    /// Deterministic targets, for tests and reproducible local runs.
    pub fn with_seed(results: Arc<dyn ResultLog>, seed: u64) -> Self {
        Self {
            results,
            rng: Arc::new(Mutex::new(StdRng::seed_from_u64(seed))),
        }
    }

    fn new_round(&self, now: DateTime<Utc>) -> Round {
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        start_round(&mut *rng, now)
    }
}

/// Per-user game state kept by the session store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GameSession {
    pub round: Round,
    pub last_summary: Option<RoundSummary>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ActionOutcome {
    Started,
    ClickRecorded { click_index: usize },
    RoundCompleted {
        result_id: ResultId,
        summary: RoundSummary,
    },
    Ignored { reason: String },
}

pub async fn apply_action(
    ctx: &ApiContext,
    session: &mut GameSession,
    action: GameAction,
    now: DateTime<Utc>,
) -> Result<ActionOutcome, ApiError> {
    match action {
        GameAction::StartGame => {
            if session.round.status() == RoundStatus::Completed {
                // The previous round is still unlogged; it must not be replaced until it is.
                record_completed_round(ctx, session).await?;
            }
            session.round = ctx.new_round(now);
            session.last_summary = None;
            debug!(targets = ?session.round.targets(), "round started");
            Ok(ActionOutcome::Started)
        }
        GameAction::Click => {
            if session.round.status() == RoundStatus::Completed {
                // An earlier append failed; retry it instead of counting a sixth click.
                return record_completed_round(ctx, session).await;
            }
            match session.round.register_click(now) {
                Ok(ClickOutcome::Recorded { click_index }) => {
                    Ok(ActionOutcome::ClickRecorded { click_index })
                }
                Ok(ClickOutcome::Completed(_)) => record_completed_round(ctx, session).await,
                Err(error) => {
                    debug!(%error, "click ignored");
                    Ok(ActionOutcome::Ignored {
                        reason: error.to_string(),
                    })
                }
            }
        }
    }
}

/// Appends the finished round to the log, then clears it from the session.
/// On failure the session keeps the completed round so a later click can retry.
async fn record_completed_round(
    ctx: &ApiContext,
    session: &mut GameSession,
) -> Result<ActionOutcome, ApiError> {
    let result = session
        .round
        .result()
        .cloned()
        .ok_or_else(|| round_error(RoundError::InvalidState(session.round.status())))?;

    let result_id = ctx.results.append(&result).await.map_err(internal)?;
    let summary = RoundSummary::from(&result);
    info!(
        result_id = result_id.0,
        average_difference = result.average_difference,
        "round completed"
    );

    session.last_summary = Some(summary.clone());
    session.round = Round::default();
    Ok(ActionOutcome::RoundCompleted { result_id, summary })
}

pub fn reset(session: &mut GameSession) {
    *session = GameSession::default();
}

pub async fn leaderboard(ctx: &ApiContext) -> Result<Vec<RoundResult>, ApiError> {
    ctx.results.leaderboard().await.map_err(internal)
}

pub async fn page_view(ctx: &ApiContext, session: &GameSession) -> Result<PageView, ApiError> {
    let round = match session.round.status() {
        RoundStatus::NotStarted => None,
        RoundStatus::InProgress | RoundStatus::Completed => Some(RoundView {
            targets: session.round.targets().to_vec(),
            actuals: session.round.actuals().to_vec(),
            click_count: session.round.click_count(),
        }),
    };

    Ok(PageView {
        round,
        last_summary: session.last_summary.clone(),
        leaderboard: leaderboard(ctx).await?,
    })
}

fn round_error(err: RoundError) -> ApiError {
    let code = match err {
        RoundError::InvalidState(_) | RoundError::AlreadyFinalized => ErrorCode::InvalidState,
        RoundError::MalformedTimes(_) => ErrorCode::Validation,
    };
    ApiError::new(code, err.to_string())
}

fn internal(err: anyhow::Error) -> ApiError {
    ApiError::new(ErrorCode::Internal, format!("{err:#}"))
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
