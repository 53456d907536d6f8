use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::DataError;

pub type TeamId = u64;
pub type PlayerId = u64;

/// Index of a statistic column inside a `BoxScoreCatalog`.
pub type StatId = usize;

const GAME_ID_WIDTH: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GameId(String);

impl GameId {
    /// League game ids are fixed-width; numeric columns drop the leading zeros,
    /// so all-digit ids are padded back to ten characters.
    pub fn parse(raw: &str) -> Result<Self, DataError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(DataError::BadIdentifier {
                column: "game_id",
                raw: raw.to_string(),
            });
        }
        if trimmed.bytes().all(|b| b.is_ascii_digit()) && trimmed.len() < GAME_ID_WIDTH {
            return Ok(Self(format!("{:0>width$}", trimmed, width = GAME_ID_WIDTH)));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Keeps an unparseable raw value so issues can still name the game.
    pub(crate) fn verbatim(raw: &str) -> Self {
        Self(raw.trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SeasonId(pub String);

impl SeasonId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SeasonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Game {
    pub game_id: GameId,
    pub date: NaiveDate,
    pub season_id: SeasonId,
    /// Teams recorded by the game catalog. May be empty when the catalog has no
    /// team column; the engine derives opponents from box scores either way.
    pub team_ids: Vec<TeamId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BoxScoreRow {
    pub game_id: GameId,
    pub team_id: TeamId,
    pub player_id: PlayerId,
    /// Parsed values, one slot per catalog stat column.
    pub stats: Vec<Option<f64>>,
}

pub fn parse_date(raw: &str) -> Result<NaiveDate, DataError> {
    let trimmed = raw.trim();
    let head = trimmed.get(..10).unwrap_or(trimmed);
    NaiveDate::parse_from_str(head, "%Y-%m-%d").map_err(|_| DataError::BadDate {
        raw: raw.to_string(),
    })
}

pub fn parse_id(column: &'static str, raw: &str) -> Result<u64, DataError> {
    let trimmed = raw.trim();
    // Identifiers written through a float column come back as "1610612737.0".
    let digits = trimmed.strip_suffix(".0").unwrap_or(trimmed);
    digits.parse::<u64>().map_err(|_| DataError::BadIdentifier {
        column,
        raw: raw.to_string(),
    })
}

pub fn parse_stat_cell(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|v| !v.is_nan())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn game_id_pads_numeric_values() {
        assert_eq!(GameId::parse("22200001").unwrap().as_str(), "0022200001");
        assert_eq!(GameId::parse(" 0022200001 ").unwrap().as_str(), "0022200001");
        assert_eq!(GameId::parse("G-17").unwrap().as_str(), "G-17");
        assert!(GameId::parse("  ").is_err());
    }

    #[test]
    fn dates_accept_timestamp_suffix() {
        let d = parse_date("2023-01-15T00:00:00").unwrap();
        assert_eq!(d, NaiveDate::from_ymd_opt(2023, 1, 15).unwrap());
        assert!(parse_date("15/01/2023").is_err());
    }

    #[test]
    fn ids_tolerate_float_rendering() {
        assert_eq!(parse_id("team_id", "1610612737.0").unwrap(), 1610612737);
        assert!(parse_id("team_id", "LAL").is_err());
    }

    #[test]
    fn stat_cells_treat_blank_and_nan_as_missing() {
        assert_eq!(parse_stat_cell("12"), Some(12.0));
        assert_eq!(parse_stat_cell(" 0.45 "), Some(0.45));
        assert_eq!(parse_stat_cell(""), None);
        assert_eq!(parse_stat_cell("NaN"), None);
        assert_eq!(parse_stat_cell("DNP"), None);
    }
}
