use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use round_engine::{format_times, parse_times};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Pool, Row, Sqlite,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};
use tracing::debug;

use shared::domain::{NewRoundResult, ResultId, RoundResult};

/// Append-only log of finished rounds.
#[async_trait]
pub trait ResultLog: Send + Sync {
    async fn append(&self, result: &NewRoundResult) -> Result<ResultId>;
    /// Every recorded round, best (lowest) average first; ties keep insertion order.
    async fn leaderboard(&self) -> Result<Vec<RoundResult>>;
}

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect_options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    pub async fn insert_result(&self, result: &NewRoundResult) -> Result<ResultId> {
        let rec = sqlx::query(
            "INSERT INTO round_results (created_at, average_difference, all_targets, all_actuals)
             VALUES (?, ?, ?, ?) RETURNING id",
        )
        .bind(result.created_at)
        .bind(result.average_difference)
        .bind(format_times(&result.targets))
        .bind(format_times(&result.actuals))
        .fetch_one(&self.pool)
        .await
        .context("failed to insert round result")?;
        let id = ResultId(rec.get::<i64, _>(0));
        debug!(result_id = id.0, average = result.average_difference, "round result stored");
        Ok(id)
    }

    pub async fn load_result(&self, id: ResultId) -> Result<Option<RoundResult>> {
        let row = sqlx::query(
            "SELECT id, created_at, average_difference, all_targets, all_actuals
             FROM round_results WHERE id = ?",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| result_from_row(&r)).transpose()
    }

    pub async fn list_results_by_average(&self, limit: Option<u32>) -> Result<Vec<RoundResult>> {
        let rows = if let Some(limit) = limit {
            sqlx::query(
                "SELECT id, created_at, average_difference, all_targets, all_actuals
                 FROM round_results
                 ORDER BY average_difference ASC, id ASC
                 LIMIT ?",
            )
            .bind(limit)
            .fetch_all(&self.pool)
            .await?
        } else {
            sqlx::query(
                "SELECT id, created_at, average_difference, all_targets, all_actuals
                 FROM round_results
                 ORDER BY average_difference ASC, id ASC",
            )
            .fetch_all(&self.pool)
            .await?
        };

        rows.iter().map(result_from_row).collect()
    }

    pub async fn count_results(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM round_results")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[async_trait]
impl ResultLog for Storage {
    async fn append(&self, result: &NewRoundResult) -> Result<ResultId> {
        self.insert_result(result).await
    }

    async fn leaderboard(&self) -> Result<Vec<RoundResult>> {
        self.list_results_by_average(None).await
    }
}

fn result_from_row(row: &SqliteRow) -> Result<RoundResult> {
    let id = ResultId(row.get::<i64, _>("id"));
    let targets = parse_times(&row.get::<String, _>("all_targets"))
        .with_context(|| format!("round result {} has unreadable targets", id.0))?;
    let actuals = parse_times(&row.get::<String, _>("all_actuals"))
        .with_context(|| format!("round result {} has unreadable actuals", id.0))?;
    Ok(RoundResult {
        id,
        created_at: row.get::<DateTime<Utc>, _>("created_at"),
        average_difference: row.get::<f64, _>("average_difference"),
        targets,
        actuals,
    })
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url.starts_with("sqlite::memory:") || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
