use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Number of targets (and clicks) in one round.
pub const TARGET_COUNT: usize = 5;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub i64);
    };
}

id_newtype!(ResultId);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Uuid::parse_str(raw.trim()).ok().map(Self)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundStatus {
    #[default]
    NotStarted,
    InProgress,
    Completed,
}

impl fmt::Display for RoundStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RoundStatus::NotStarted => "not started",
            RoundStatus::InProgress => "in progress",
            RoundStatus::Completed => "completed",
        };
        f.write_str(label)
    }
}

/// A scored round that has not been written to the result log yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRoundResult {
    pub created_at: DateTime<Utc>,
    pub average_difference: f64,
    pub targets: [f64; TARGET_COUNT],
    pub actuals: [f64; TARGET_COUNT],
}

impl NewRoundResult {
    pub fn differences(&self) -> [f64; TARGET_COUNT] {
        std::array::from_fn(|i| (self.actuals[i] - self.targets[i]).abs())
    }
}

/// A round as recorded in the result log. Never mutated after insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundResult {
    pub id: ResultId,
    pub created_at: DateTime<Utc>,
    pub average_difference: f64,
    pub targets: Vec<f64>,
    pub actuals: Vec<f64>,
}
