//! Opponent prior averages: for a (game, team), the mean over the opposing
//! roster of each player's season-to-date mean, using only games dated
//! strictly before the queried game.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::DataError;
use crate::model::{GameId, StatId, TeamId};
use crate::temporal_index::{SeasonPlayerTimeline, TemporalIndex};

/// Which opposing players are averaged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RosterMode {
    /// Everyone who appeared for the opponent earlier in the season.
    #[default]
    PriorAppearances,
    /// Only opponents recorded in the queried game's box score. Their values
    /// still come from earlier games only.
    GameDayRoster,
}

impl RosterMode {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "prior" | "prior_appearances" => Some(Self::PriorAppearances),
            "gameday" | "game_day" | "game_day_roster" => Some(Self::GameDayRoster),
            _ => None,
        }
    }
}

/// The opposing players resolved for one (game, team), reusable across stats.
#[derive(Debug, Clone)]
pub struct OpponentRoster<'a> {
    opponent: TeamId,
    date: NaiveDate,
    players: Vec<&'a SeasonPlayerTimeline>,
}

impl<'a> OpponentRoster<'a> {
    pub fn opponent(&self) -> TeamId {
        self.opponent
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn players(&self) -> &[&'a SeasonPlayerTimeline] {
        &self.players
    }

    /// Unweighted mean of per-player prior means for the stat in `slot`.
    /// Players without a prior value for it are left out entirely.
    pub fn average(&self, slot: usize) -> Option<f64> {
        let mut sum = 0.0;
        let mut n = 0usize;
        for tl in &self.players {
            if let Some(mean) = tl.prior_mean(slot, self.date) {
                sum += mean;
                n += 1;
            }
        }
        if n == 0 {
            return None;
        }
        Some(sum / n as f64)
    }

    pub fn averages(&self, slots: usize) -> Vec<Option<f64>> {
        (0..slots).map(|slot| self.average(slot)).collect()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct OpponentAverageEngine<'a> {
    index: &'a TemporalIndex,
    mode: RosterMode,
}

impl<'a> OpponentAverageEngine<'a> {
    pub fn new(index: &'a TemporalIndex) -> Self {
        Self {
            index,
            mode: RosterMode::default(),
        }
    }

    pub fn with_mode(mut self, mode: RosterMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn mode(&self) -> RosterMode {
        self.mode
    }

    /// Resolves the opposing roster as of the game's date.
    ///
    /// `Ok(None)` when fewer than two teams have box-score rows for the game.
    /// A game with more than two teams recorded in either table is rejected
    /// rather than guessing an opponent.
    pub fn resolve_opponent(
        &self,
        game_id: &GameId,
        team_id: TeamId,
    ) -> Result<Option<OpponentRoster<'a>>, DataError> {
        let game = self
            .index
            .game(game_id)
            .ok_or_else(|| DataError::UnknownGame {
                game_id: game_id.clone(),
            })?;

        if game.recorded_teams.len() > 2 {
            return Err(DataError::AmbiguousOpponent {
                game_id: game_id.clone(),
                teams: game.recorded_teams.to_vec(),
            });
        }

        let opponent = match game.teams {
            [] | [_] => return Ok(None),
            [a, b] if *a == team_id => *b,
            [a, b] if *b == team_id => *a,
            [_, _] => {
                return Err(DataError::TeamNotInGame {
                    game_id: game_id.clone(),
                    team_id,
                });
            }
            teams => {
                return Err(DataError::AmbiguousOpponent {
                    game_id: game_id.clone(),
                    teams: teams.to_vec(),
                });
            }
        };

        let players = match self.mode {
            RosterMode::PriorAppearances => self
                .index
                .players_before_ix(opponent, game.season, game.date)
                .collect(),
            RosterMode::GameDayRoster => self
                .index
                .game_roster(game.game_ix, opponent)
                .filter(|tl| tl.games_before(game.date) > 0)
                .collect(),
        };

        Ok(Some(OpponentRoster {
            opponent,
            date: game.date,
            players,
        }))
    }

    pub fn opponent_prior_average(
        &self,
        game_id: &GameId,
        team_id: TeamId,
        stat: &str,
    ) -> Result<Option<f64>, DataError> {
        let slot = self
            .index
            .slot_by_name(stat)
            .ok_or_else(|| DataError::UnknownStat {
                name: stat.to_string(),
            })?;
        Ok(self
            .resolve_opponent(game_id, team_id)?
            .and_then(|roster| roster.average(slot)))
    }

    pub fn opponent_prior_average_by_id(
        &self,
        game_id: &GameId,
        team_id: TeamId,
        stat: StatId,
    ) -> Result<Option<f64>, DataError> {
        let slot = self.index.slot(stat).ok_or_else(|| DataError::UnknownStat {
            name: format!("#{stat}"),
        })?;
        Ok(self
            .resolve_opponent(game_id, team_id)?
            .and_then(|roster| roster.average(slot)))
    }
}
