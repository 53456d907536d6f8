use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use tracing::warn;

use crate::error::{DataError, RowIssue};
use crate::model::{
    BoxScoreRow, Game, GameId, SeasonId, StatId, TeamId, parse_id, parse_stat_cell,
};

/// Column headers of the raw tables. Defaults follow the league stats API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnNames {
    pub game_id: String,
    pub game_date: String,
    pub season_id: String,
    pub team_id: String,
    pub player_id: String,
    pub minutes: String,
}

impl Default for ColumnNames {
    fn default() -> Self {
        Self {
            game_id: "GAME_ID".to_string(),
            game_date: "GAME_DATE".to_string(),
            season_id: "SEASON_ID".to_string(),
            team_id: "TEAM_ID".to_string(),
            player_id: "PLAYER_ID".to_string(),
            minutes: "MIN".to_string(),
        }
    }
}

impl ColumnNames {
    /// Columns never averaged: the three identifiers plus minutes played.
    pub fn default_excluded(&self) -> Vec<String> {
        vec![
            self.game_id.clone(),
            self.team_id.clone(),
            self.player_id.clone(),
            self.minutes.clone(),
        ]
    }
}

/// One game-catalog row. Game finders emit one row per (game, team), so the
/// same game id usually arrives twice.
#[derive(Debug, Clone, PartialEq)]
pub struct GameRecord {
    pub game_id: GameId,
    pub date: NaiveDate,
    pub season_id: SeasonId,
    pub team_id: Option<TeamId>,
}

#[derive(Debug, Clone, Default)]
pub struct GameCatalog {
    games: Vec<Game>,
    by_id: HashMap<GameId, usize>,
}

impl GameCatalog {
    pub fn from_rows<I>(rows: I) -> Result<Self, DataError>
    where
        I: IntoIterator<Item = GameRecord>,
    {
        let mut games: Vec<Game> = Vec::new();
        let mut by_id: HashMap<GameId, usize> = HashMap::new();

        for row in rows {
            match by_id.get(&row.game_id) {
                Some(&idx) => {
                    let game = &mut games[idx];
                    if game.date != row.date || game.season_id != row.season_id {
                        return Err(DataError::ConflictingGame {
                            game_id: row.game_id,
                            first_date: game.date,
                            first_season: game.season_id.clone(),
                            second_date: row.date,
                            second_season: row.season_id,
                        });
                    }
                    if let Some(team_id) = row.team_id
                        && !game.team_ids.contains(&team_id)
                    {
                        game.team_ids.push(team_id);
                    }
                }
                None => {
                    by_id.insert(row.game_id.clone(), games.len());
                    games.push(Game {
                        game_id: row.game_id,
                        date: row.date,
                        season_id: row.season_id,
                        team_ids: row.team_id.into_iter().collect(),
                    });
                }
            }
        }

        for game in &mut games {
            game.team_ids.sort_unstable();
        }
        Ok(Self { games, by_id })
    }

    pub fn from_games(games: Vec<Game>) -> Result<Self, DataError> {
        let rows = games.into_iter().flat_map(|g| {
            let mut out = Vec::with_capacity(g.team_ids.len().max(1));
            if g.team_ids.is_empty() {
                out.push(GameRecord {
                    game_id: g.game_id,
                    date: g.date,
                    season_id: g.season_id,
                    team_id: None,
                });
            } else {
                for team_id in g.team_ids {
                    out.push(GameRecord {
                        game_id: g.game_id.clone(),
                        date: g.date,
                        season_id: g.season_id.clone(),
                        team_id: Some(team_id),
                    });
                }
            }
            out
        });
        Self::from_rows(rows)
    }

    pub fn get(&self, game_id: &GameId) -> Option<&Game> {
        self.index_of(game_id).map(|idx| &self.games[idx])
    }

    pub fn index_of(&self, game_id: &GameId) -> Option<usize> {
        self.by_id.get(game_id).copied()
    }

    pub fn game(&self, idx: usize) -> &Game {
        &self.games[idx]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Game> {
        self.games.iter()
    }

    pub fn len(&self) -> usize {
        self.games.len()
    }

    pub fn is_empty(&self) -> bool {
        self.games.is_empty()
    }

    pub fn date_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        let min = self.games.iter().map(|g| g.date).min()?;
        let max = self.games.iter().map(|g| g.date).max()?;
        Some((min, max))
    }
}

/// The raw box-score table plus its parsed view.
///
/// Every header and cell is kept verbatim so the augmented output can echo the
/// input table unchanged; `rows` carries the typed identifiers and the numeric
/// columns parsed once.
#[derive(Debug, Clone)]
pub struct BoxScoreCatalog {
    columns: Vec<String>,
    cells: Vec<Vec<String>>,
    rows: Vec<BoxScoreRow>,
    stat_names: Vec<String>,
    rejected: Vec<RowIssue>,
}

impl BoxScoreCatalog {
    pub fn new(
        columns: Vec<String>,
        cells: Vec<Vec<String>>,
        names: &ColumnNames,
    ) -> Result<Self, DataError> {
        let position = |name: &str| {
            columns
                .iter()
                .position(|c| c == name)
                .ok_or_else(|| DataError::MissingColumn {
                    name: name.to_string(),
                })
        };
        let game_col = position(&names.game_id)?;
        let team_col = position(&names.team_id)?;
        let player_col = position(&names.player_id)?;

        let stat_cols: Vec<usize> = (0..columns.len())
            .filter(|&c| c != game_col && c != team_col && c != player_col)
            .filter(|&c| is_numeric_column(&cells, c))
            .collect();

        let mut rows = Vec::with_capacity(cells.len());
        let mut rejected = Vec::new();
        for (row_idx, record) in cells.iter().enumerate() {
            let cell = |c: usize| record.get(c).map(String::as_str).unwrap_or("");
            let stats = stat_cols.iter().map(|&c| parse_stat_cell(cell(c))).collect();
            let parsed = GameId::parse(cell(game_col)).and_then(|game_id| {
                Ok((
                    game_id,
                    parse_id("team_id", cell(team_col))?,
                    parse_id("player_id", cell(player_col))?,
                ))
            });
            match parsed {
                Ok((game_id, team_id, player_id)) => rows.push(BoxScoreRow {
                    game_id,
                    team_id,
                    player_id,
                    stats,
                }),
                Err(error) => {
                    // The row stays in the table so output rows line up with input rows.
                    let game_id = GameId::verbatim(cell(game_col));
                    warn!(row = row_idx, "{error}");
                    rejected.push(RowIssue {
                        row: row_idx,
                        game_id: game_id.clone(),
                        error,
                    });
                    rows.push(BoxScoreRow {
                        game_id,
                        team_id: 0,
                        player_id: 0,
                        stats,
                    });
                }
            }
        }

        let stat_names = stat_cols.iter().map(|&c| columns[c].clone()).collect();
        Ok(Self {
            columns,
            cells,
            rows,
            stat_names,
            rejected,
        })
    }

    /// Builds a catalog from typed rows, rendering the raw table with the
    /// default column names.
    pub fn from_rows(stat_names: Vec<String>, rows: Vec<BoxScoreRow>) -> Self {
        let names = ColumnNames::default();
        let mut columns = vec![names.game_id, names.team_id, names.player_id];
        columns.extend(stat_names.iter().cloned());

        let cells = rows
            .iter()
            .map(|row| {
                let mut out = Vec::with_capacity(columns.len());
                out.push(row.game_id.to_string());
                out.push(row.team_id.to_string());
                out.push(row.player_id.to_string());
                out.extend(
                    row.stats
                        .iter()
                        .map(|v| v.map(|x| x.to_string()).unwrap_or_default()),
                );
                out
            })
            .collect();

        Self {
            columns,
            cells,
            rows,
            stat_names,
            rejected: Vec::new(),
        }
    }

    /// Drops records identical to an earlier record, keeping first occurrences.
    /// Returns how many were removed.
    pub fn dedup_exact(&mut self) -> usize {
        let mut seen: HashSet<Vec<String>> = HashSet::with_capacity(self.cells.len());
        let mut keep = Vec::with_capacity(self.cells.len());
        for record in &self.cells {
            keep.push(seen.insert(record.clone()));
        }
        let before = self.cells.len();

        let mut flags = keep.iter();
        self.cells.retain(|_| flags.next().copied().unwrap_or(true));
        let mut flags = keep.iter();
        self.rows.retain(|_| flags.next().copied().unwrap_or(true));

        // Rejected rows move up by the number of dropped rows before them.
        let mut new_ix = Vec::with_capacity(keep.len());
        let mut next = 0usize;
        for &kept in &keep {
            new_ix.push(kept.then_some(next));
            next += usize::from(kept);
        }
        self.rejected.retain_mut(|issue| match new_ix.get(issue.row).copied().flatten() {
            Some(row) => {
                issue.row = row;
                true
            }
            None => false,
        });

        before - self.cells.len()
    }

    /// Numeric columns that are not in `excluded`, in table order.
    pub fn eligible_stats(&self, excluded: &[String]) -> Vec<StatId> {
        self.stat_names
            .iter()
            .enumerate()
            .filter(|(_, name)| !excluded.iter().any(|e| e == *name))
            .map(|(id, _)| id)
            .collect()
    }

    pub fn stat_id(&self, name: &str) -> Result<StatId, DataError> {
        self.stat_names
            .iter()
            .position(|n| n == name)
            .ok_or_else(|| DataError::UnknownStat {
                name: name.to_string(),
            })
    }

    /// Rows whose identifiers could not be parsed, in row order. They keep
    /// their place in the table but never enter the index.
    pub fn rejected(&self) -> &[RowIssue] {
        &self.rejected
    }

    pub fn stat_name(&self, stat: StatId) -> &str {
        &self.stat_names[stat]
    }

    pub fn stat_names(&self) -> &[String] {
        &self.stat_names
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn cells(&self, row: usize) -> &[String] {
        &self.cells[row]
    }

    pub fn rows(&self) -> &[BoxScoreRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Every non-empty cell parses as a number. A column of only blank cells
/// counts as numeric (all missing) as long as the table has rows.
fn is_numeric_column(cells: &[Vec<String>], col: usize) -> bool {
    !cells.is_empty()
        && cells.iter().all(|record| {
            let raw = record.get(col).map(|s| s.trim()).unwrap_or("");
            raw.is_empty() || raw.parse::<f64>().is_ok()
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2023, 1, d).unwrap()
    }

    fn record(id: &str, d: u32, team: Option<TeamId>) -> GameRecord {
        GameRecord {
            game_id: GameId::parse(id).unwrap(),
            date: date(d),
            season_id: SeasonId::new("22022"),
            team_id: team,
        }
    }

    #[test]
    fn per_team_rows_merge_into_one_game() {
        let catalog =
            GameCatalog::from_rows(vec![record("1", 3, Some(20)), record("1", 3, Some(10))])
                .unwrap();
        assert_eq!(catalog.len(), 1);
        let game = catalog.get(&GameId::parse("0000000001").unwrap()).unwrap();
        assert_eq!(game.team_ids, vec![10, 20]);
    }

    #[test]
    fn conflicting_dates_are_rejected() {
        let err =
            GameCatalog::from_rows(vec![record("1", 3, Some(20)), record("1", 4, Some(10))])
                .unwrap_err();
        assert!(matches!(err, DataError::ConflictingGame { .. }));
    }

    #[test]
    fn date_range_spans_catalog() {
        let catalog = GameCatalog::from_rows(vec![
            record("1", 9, None),
            record("2", 2, None),
            record("3", 5, None),
        ])
        .unwrap();
        assert_eq!(catalog.date_range(), Some((date(2), date(9))));
    }

    fn raw_table() -> (Vec<String>, Vec<Vec<String>>) {
        let columns = ["GAME_ID", "TEAM_ID", "PLAYER_ID", "PLAYER_NAME", "MIN", "PTS", "FG_PCT"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let cells = vec![
            vec!["22200001", "1", "100", "A", "30:12", "12", "0.5"],
            vec!["22200001", "1", "101", "B", "", "", ""],
            vec!["22200001", "2", "200", "C", "25:00", "8", "0.25"],
        ]
        .into_iter()
        .map(|r| r.into_iter().map(|s| s.to_string()).collect())
        .collect();
        (columns, cells)
    }

    #[test]
    fn numeric_columns_become_stats() {
        let (columns, cells) = raw_table();
        let catalog = BoxScoreCatalog::new(columns, cells, &ColumnNames::default()).unwrap();
        assert_eq!(catalog.stat_names(), &["PTS".to_string(), "FG_PCT".to_string()]);
        assert_eq!(catalog.rows()[0].game_id.as_str(), "0022200001");
        assert_eq!(catalog.rows()[1].stats, vec![None, None]);
        assert_eq!(catalog.rows()[2].stats, vec![Some(8.0), Some(0.25)]);
        assert_eq!(catalog.cells(0)[3], "A");
    }

    #[test]
    fn eligible_stats_skip_excluded_names() {
        let (mut columns, mut cells) = raw_table();
        columns[4] = "MIN".to_string();
        for record in &mut cells {
            record[4] = "30".to_string();
        }
        let catalog = BoxScoreCatalog::new(columns, cells, &ColumnNames::default()).unwrap();
        assert_eq!(catalog.stat_names().len(), 3);
        let eligible = catalog.eligible_stats(&ColumnNames::default().default_excluded());
        let names: Vec<&str> = eligible.iter().map(|&s| catalog.stat_name(s)).collect();
        assert_eq!(names, vec!["PTS", "FG_PCT"]);
    }

    #[test]
    fn missing_identifier_column_is_an_error() {
        let (mut columns, cells) = raw_table();
        columns[2] = "PID".to_string();
        let err = BoxScoreCatalog::new(columns, cells, &ColumnNames::default()).unwrap_err();
        assert_eq!(
            err,
            DataError::MissingColumn {
                name: "PLAYER_ID".to_string()
            }
        );
    }

    #[test]
    fn dedup_keeps_first_occurrence() {
        let (columns, mut cells) = raw_table();
        cells.push(cells[0].clone());
        cells.push(cells[2].clone());
        let mut catalog = BoxScoreCatalog::new(columns, cells, &ColumnNames::default()).unwrap();
        assert_eq!(catalog.dedup_exact(), 2);
        assert_eq!(catalog.len(), 3);
        assert_eq!(catalog.rows()[2].player_id, 200);
    }

    #[test]
    fn bad_identifier_rows_are_kept_and_reported() {
        let (columns, mut cells) = raw_table();
        cells.push(
            ["22200001", "LAL", "102", "D", "", "3", "0.1"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        );
        cells.insert(1, cells[0].clone());
        let mut catalog = BoxScoreCatalog::new(columns, cells, &ColumnNames::default()).unwrap();
        assert_eq!(catalog.len(), 5);
        assert_eq!(catalog.rejected().len(), 1);
        assert_eq!(catalog.rejected()[0].row, 4);
        assert_eq!(
            catalog.rejected()[0].error,
            DataError::BadIdentifier {
                column: "team_id",
                raw: "LAL".to_string()
            }
        );

        assert_eq!(catalog.dedup_exact(), 1);
        assert_eq!(catalog.rejected()[0].row, 3);
        assert_eq!(catalog.cells(3)[1], "LAL");
    }

    #[test]
    fn blank_columns_count_as_numeric() {
        let (mut columns, mut cells) = raw_table();
        columns.push("PLUS_MINUS".to_string());
        for record in &mut cells {
            record.push(String::new());
        }
        let catalog =
            BoxScoreCatalog::new(columns.clone(), cells, &ColumnNames::default()).unwrap();
        assert_eq!(catalog.stat_names(), &["PTS", "FG_PCT", "PLUS_MINUS"]);
        assert!(catalog.rows().iter().all(|r| r.stats[2].is_none()));

        let empty = BoxScoreCatalog::new(columns, Vec::new(), &ColumnNames::default()).unwrap();
        assert!(empty.stat_names().is_empty());
    }
}
