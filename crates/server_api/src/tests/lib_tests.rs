use super::*;
use async_trait::async_trait;
use chrono::{Duration, TimeZone};
use shared::domain::NewRoundResult;
use std::sync::atomic::{AtomicBool, Ordering};
use storage::Storage;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

async fn setup() -> (ApiContext, Storage) {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let ctx = ApiContext::with_seed(Arc::new(storage.clone()), 11);
    (ctx, storage)
}

/// Fails appends until `healthy` is flipped on.
struct FlakyLog {
    inner: Storage,
    healthy: AtomicBool,
}

#[async_trait]
impl ResultLog for FlakyLog {
    async fn append(&self, result: &NewRoundResult) -> anyhow::Result<ResultId> {
        if !self.healthy.load(Ordering::SeqCst) {
            anyhow::bail!("disk full");
        }
        self.inner.append(result).await
    }

    async fn leaderboard(&self) -> anyhow::Result<Vec<RoundResult>> {
        self.inner.leaderboard().await
    }
}

async fn play_round(ctx: &ApiContext, session: &mut GameSession) -> ActionOutcome {
    apply_action(ctx, session, GameAction::StartGame, t0())
        .await
        .expect("start");
    let mut last = None;
    for i in 1..=5 {
        last = Some(
            apply_action(ctx, session, GameAction::Click, t0() + Duration::seconds(i * 7))
                .await
                .expect("click"),
        );
    }
    last.expect("outcome")
}

#[tokio::test]
async fn start_game_sets_up_round_and_clears_summary() {
    let (ctx, _storage) = setup().await;
    let mut session = GameSession {
        last_summary: Some(RoundSummary {
            average_difference: 1.0,
            targets: [0.0; 5],
            actuals: [0.0; 5],
            differences: [0.0; 5],
        }),
        ..GameSession::default()
    };

    let outcome = apply_action(&ctx, &mut session, GameAction::StartGame, t0())
        .await
        .expect("start");
    assert_eq!(outcome, ActionOutcome::Started);
    assert_eq!(session.round.status(), RoundStatus::InProgress);
    assert_eq!(session.round.targets().len(), 5);
    assert!(session.last_summary.is_none());
}

#[tokio::test]
async fn click_without_round_is_ignored() {
    let (ctx, storage) = setup().await;
    let mut session = GameSession::default();
    let outcome = apply_action(&ctx, &mut session, GameAction::Click, t0())
        .await
        .expect("click");
    assert!(matches!(outcome, ActionOutcome::Ignored { .. }));
    assert_eq!(session, GameSession::default());
    assert_eq!(storage.count_results().await.expect("count"), 0);
}

#[tokio::test]
async fn fifth_click_persists_result_and_clears_round() {
    let (ctx, storage) = setup().await;
    let mut session = GameSession::default();

    let outcome = play_round(&ctx, &mut session).await;
    let ActionOutcome::RoundCompleted { result_id, summary } = outcome else {
        panic!("expected completed round, got {outcome:?}");
    };

    assert_eq!(session.round.status(), RoundStatus::NotStarted);
    assert_eq!(session.last_summary.as_ref(), Some(&summary));
    assert_eq!(summary.actuals, [7.0, 14.0, 21.0, 28.0, 35.0]);

    let stored = storage
        .load_result(result_id)
        .await
        .expect("load")
        .expect("stored");
    assert!((stored.average_difference - summary.average_difference).abs() < 1e-3);
}

#[tokio::test]
async fn failed_append_keeps_round_for_retry() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let log = Arc::new(FlakyLog {
        inner: storage.clone(),
        healthy: AtomicBool::new(false),
    });
    let ctx = ApiContext::with_seed(log.clone(), 5);
    let mut session = GameSession::default();

    apply_action(&ctx, &mut session, GameAction::StartGame, t0())
        .await
        .expect("start");
    for i in 1..=4 {
        apply_action(&ctx, &mut session, GameAction::Click, t0() + Duration::seconds(i))
            .await
            .expect("click");
    }
    let err = apply_action(&ctx, &mut session, GameAction::Click, t0() + Duration::seconds(5))
        .await
        .expect_err("append should fail");
    assert_eq!(err.code, ErrorCode::Internal);
    assert_eq!(session.round.status(), RoundStatus::Completed);
    assert_eq!(session.round.click_count(), 5);
    assert!(session.last_summary.is_none());

    log.healthy.store(true, Ordering::SeqCst);
    let outcome = apply_action(&ctx, &mut session, GameAction::Click, t0() + Duration::seconds(9))
        .await
        .expect("retry");
    let ActionOutcome::RoundCompleted { summary, .. } = outcome else {
        panic!("expected completed round");
    };
    // The retry does not add a sixth click.
    assert_eq!(summary.actuals, [1.0, 2.0, 3.0, 4.0, 5.0]);
    assert_eq!(storage.count_results().await.expect("count"), 1);
}

#[tokio::test]
async fn start_game_logs_unsaved_round_before_replacing_it() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let log = Arc::new(FlakyLog {
        inner: storage.clone(),
        healthy: AtomicBool::new(false),
    });
    let ctx = ApiContext::with_seed(log.clone(), 8);
    let mut session = GameSession::default();

    apply_action(&ctx, &mut session, GameAction::StartGame, t0())
        .await
        .expect("start");
    for i in 1..=4 {
        apply_action(&ctx, &mut session, GameAction::Click, t0() + Duration::seconds(i))
            .await
            .expect("click");
    }
    apply_action(&ctx, &mut session, GameAction::Click, t0() + Duration::seconds(5))
        .await
        .expect_err("append should fail");
    let unsaved = session.round.clone();

    let err = apply_action(&ctx, &mut session, GameAction::StartGame, t0() + Duration::seconds(6))
        .await
        .expect_err("start must not drop the unsaved round");
    assert_eq!(err.code, ErrorCode::Internal);
    assert_eq!(session.round, unsaved);
    assert_eq!(storage.count_results().await.expect("count"), 0);

    log.healthy.store(true, Ordering::SeqCst);
    let outcome = apply_action(&ctx, &mut session, GameAction::StartGame, t0() + Duration::seconds(7))
        .await
        .expect("start after recovery");
    assert_eq!(outcome, ActionOutcome::Started);
    assert_eq!(session.round.status(), RoundStatus::InProgress);
    assert_eq!(session.round.click_count(), 0);

    let board = storage.leaderboard().await.expect("leaderboard");
    assert_eq!(board.len(), 1);
    assert_eq!(board[0].actuals, vec![1.0, 2.0, 3.0, 4.0, 5.0]);
}

#[tokio::test]
async fn page_view_reflects_round_and_leaderboard() {
    let (ctx, _storage) = setup().await;
    let mut session = GameSession::default();
    play_round(&ctx, &mut session).await;

    apply_action(&ctx, &mut session, GameAction::StartGame, t0())
        .await
        .expect("start");
    apply_action(&ctx, &mut session, GameAction::Click, t0() + Duration::seconds(6))
        .await
        .expect("click");

    let view = page_view(&ctx, &session).await.expect("view");
    let round = view.round.expect("round in progress");
    assert_eq!(round.click_count, 1);
    assert_eq!(round.actuals, vec![6.0]);
    assert_eq!(round.targets.len(), 5);
    assert!(view.last_summary.is_none());
    assert_eq!(view.leaderboard.len(), 1);
}

#[tokio::test]
async fn leaderboard_is_sorted_best_first() {
    let (ctx, _storage) = setup().await;
    for _ in 0..3 {
        let mut session = GameSession::default();
        play_round(&ctx, &mut session).await;
    }
    let board = leaderboard(&ctx).await.expect("leaderboard");
    assert_eq!(board.len(), 3);
    assert!(board
        .windows(2)
        .all(|w| w[0].average_difference <= w[1].average_difference));
}

#[tokio::test]
async fn reset_clears_everything() {
    let (ctx, _storage) = setup().await;
    let mut session = GameSession::default();
    play_round(&ctx, &mut session).await;
    apply_action(&ctx, &mut session, GameAction::StartGame, t0())
        .await
        .expect("start");

    reset(&mut session);
    assert_eq!(session, GameSession::default());
}
