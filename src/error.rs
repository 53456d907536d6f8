use chrono::NaiveDate;
use thiserror::Error;

use crate::model::{GameId, SeasonId, TeamId};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DataError {
    #[error("game {game_id} is not in the game catalog")]
    UnknownGame { game_id: GameId },

    #[error("team {team_id} is not recorded as a participant of game {game_id}")]
    TeamNotInGame { game_id: GameId, team_id: TeamId },

    #[error("game {game_id} has {} distinct teams recorded; opponent is ambiguous", teams.len())]
    AmbiguousOpponent { game_id: GameId, teams: Vec<TeamId> },

    #[error(
        "game {game_id} recorded with conflicting metadata: {first_date}/{first_season} vs {second_date}/{second_season}"
    )]
    ConflictingGame {
        game_id: GameId,
        first_date: NaiveDate,
        first_season: SeasonId,
        second_date: NaiveDate,
        second_season: SeasonId,
    },

    #[error("unknown statistic '{name}'")]
    UnknownStat { name: String },

    #[error("required column '{name}' is missing")]
    MissingColumn { name: String },

    #[error("invalid {column} value '{raw}'")]
    BadIdentifier { column: &'static str, raw: String },

    #[error("invalid date '{raw}' (expected YYYY-MM-DD)")]
    BadDate { raw: String },
}

/// A box-score row left out of the computation because it breaks a catalog
/// invariant. Its derived cells are written as missing.
#[derive(Debug, Clone, PartialEq)]
pub struct RowIssue {
    pub row: usize,
    pub game_id: GameId,
    pub error: DataError,
}
