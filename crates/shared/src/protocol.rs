use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::{NewRoundResult, RoundResult, TARGET_COUNT};

/// Action token submitted by the game page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameAction {
    StartGame,
    Click,
}

impl FromStr for GameAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "start_game" => Ok(GameAction::StartGame),
            "click" => Ok(GameAction::Click),
            other => Err(format!("unknown action '{other}'")),
        }
    }
}

/// Last completed round as shown under "Last Game Results".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundSummary {
    pub average_difference: f64,
    pub targets: [f64; TARGET_COUNT],
    pub actuals: [f64; TARGET_COUNT],
    pub differences: [f64; TARGET_COUNT],
}

impl From<&NewRoundResult> for RoundSummary {
    fn from(result: &NewRoundResult) -> Self {
        Self {
            average_difference: result.average_difference,
            targets: result.targets,
            actuals: result.actuals,
            differences: result.differences(),
        }
    }
}

/// Round in progress as shown while the timer is running.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundView {
    pub targets: Vec<f64>,
    pub actuals: Vec<f64>,
    pub click_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageView {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub round: Option<RoundView>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_summary: Option<RoundSummary>,
    pub leaderboard: Vec<RoundResult>,
}
