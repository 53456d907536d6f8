//! Date-ordered lookups over the game and box-score catalogs.
//!
//! Everything is grouped and sorted once in [`TemporalIndex::build`]; queries
//! for "before date D" are then a binary search over a pre-sorted slice.

use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;
use tracing::{debug, info, warn};

use crate::catalog::{BoxScoreCatalog, GameCatalog};
use crate::error::DataError;
use crate::model::{GameId, PlayerId, SeasonId, StatId, TeamId};

pub use crate::error::RowIssue;

type SeasonIx = u32;

/// Running totals over one stat of one timeline. Slot `i` covers the first
/// `i` observations, so both vectors are one longer than the timeline.
#[derive(Debug, Clone)]
struct StatSeries {
    values: Vec<Option<f64>>,
    prefix_sum: Vec<f64>,
    prefix_count: Vec<u32>,
}

impl StatSeries {
    fn from_values(values: Vec<Option<f64>>) -> Self {
        let mut prefix_sum = Vec::with_capacity(values.len() + 1);
        let mut prefix_count = Vec::with_capacity(values.len() + 1);
        let mut sum = 0.0;
        let mut count = 0u32;
        prefix_sum.push(sum);
        prefix_count.push(count);
        // Missing values repeat the previous totals so positions line up with dates.
        for v in &values {
            if let Some(v) = v {
                sum += v;
                count += 1;
            }
            prefix_sum.push(sum);
            prefix_count.push(count);
        }
        Self {
            values,
            prefix_sum,
            prefix_count,
        }
    }
}

/// One player's games for one team within one season, sorted by date.
#[derive(Debug, Clone)]
pub struct SeasonPlayerTimeline {
    player_id: PlayerId,
    team_id: TeamId,
    season_id: SeasonId,
    dates: Vec<NaiveDate>,
    series: Vec<StatSeries>,
}

impl SeasonPlayerTimeline {
    pub fn player_id(&self) -> PlayerId {
        self.player_id
    }

    pub fn team_id(&self) -> TeamId {
        self.team_id
    }

    pub fn season_id(&self) -> &SeasonId {
        &self.season_id
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.dates.first().copied()
    }

    /// Number of games strictly before `date`.
    pub fn games_before(&self, date: NaiveDate) -> usize {
        self.dates.partition_point(|d| *d < date)
    }

    /// Mean of the non-missing values strictly before `date`.
    pub fn prior_mean(&self, slot: usize, date: NaiveDate) -> Option<f64> {
        let series = self.series.get(slot)?;
        let p = self.games_before(date);
        let count = series.prefix_count[p];
        if count == 0 {
            return None;
        }
        Some(series.prefix_sum[p] / f64::from(count))
    }

    /// Non-missing `(date, value)` observations in date order.
    pub fn observations(&self, slot: usize) -> impl Iterator<Item = (NaiveDate, f64)> + '_ {
        let values = self.series.get(slot).map(|s| s.values.as_slice()).unwrap_or(&[]);
        self.dates
            .iter()
            .zip(values)
            .filter_map(|(d, v)| v.map(|v| (*d, v)))
    }
}

#[derive(Debug, Clone)]
struct GameEntry {
    game_id: GameId,
    date: NaiveDate,
    season: SeasonIx,
    /// Distinct teams with at least one indexed box-score row, sorted.
    teams: Vec<TeamId>,
    /// Union of catalog teams and `teams`, sorted.
    recorded: Vec<TeamId>,
}

/// What the index knows about one game.
#[derive(Debug, Clone, Copy)]
pub struct GameView<'a> {
    pub game_id: &'a GameId,
    pub date: NaiveDate,
    pub season_id: &'a SeasonId,
    pub teams: &'a [TeamId],
    /// Every team either table records for the game.
    pub recorded_teams: &'a [TeamId],
    pub(crate) game_ix: usize,
    pub(crate) season: u32,
}

#[derive(Debug, Clone, Default)]
pub struct TemporalIndex {
    stats: Vec<StatId>,
    stat_names: Vec<String>,
    slots: HashMap<StatId, usize>,
    seasons: Vec<SeasonId>,
    season_ix: HashMap<SeasonId, SeasonIx>,
    games: Vec<GameEntry>,
    game_ix: HashMap<GameId, usize>,
    team_season_games: HashMap<(TeamId, SeasonIx), Vec<(NaiveDate, GameId)>>,
    timelines: Vec<SeasonPlayerTimeline>,
    timeline_ix: HashMap<(PlayerId, TeamId, SeasonIx), usize>,
    /// Timelines per (team, season) ordered by first appearance, then player id.
    team_season_players: HashMap<(TeamId, SeasonIx), Vec<(NaiveDate, usize)>>,
    game_rosters: HashMap<(usize, TeamId), Vec<usize>>,
}

impl TemporalIndex {
    /// Builds the index for `stats`. Rows referencing an unknown game, or a team
    /// the game catalog does not list for that game, are skipped and returned
    /// as issues.
    pub fn build(
        games: &GameCatalog,
        boxscores: &BoxScoreCatalog,
        stats: &[StatId],
    ) -> (Self, Vec<RowIssue>) {
        let mut index = Self {
            stats: stats.to_vec(),
            stat_names: stats
                .iter()
                .map(|&s| boxscores.stat_name(s).to_string())
                .collect(),
            slots: stats.iter().enumerate().map(|(slot, s)| (*s, slot)).collect(),
            ..Self::default()
        };

        for game in games.iter() {
            let season = index.intern_season(&game.season_id);
            index.game_ix.insert(game.game_id.clone(), index.games.len());
            index.games.push(GameEntry {
                game_id: game.game_id.clone(),
                date: game.date,
                season,
                teams: Vec::new(),
                recorded: Vec::new(),
            });
        }

        // Rows with unparseable identifiers were already reported at load.
        let mut issues: Vec<RowIssue> = boxscores.rejected().to_vec();
        let rejected: HashSet<usize> = issues.iter().map(|i| i.row).collect();
        let mut group_ix: HashMap<(PlayerId, TeamId, SeasonIx), usize> = HashMap::new();
        // (row, game) pairs per (player, team, season), in first-seen key order.
        let mut groups: Vec<((PlayerId, TeamId, SeasonIx), Vec<(usize, usize)>)> = Vec::new();

        for (row_idx, row) in boxscores.rows().iter().enumerate() {
            if rejected.contains(&row_idx) {
                continue;
            }
            let Some(&g) = index.game_ix.get(&row.game_id) else {
                let error = DataError::UnknownGame {
                    game_id: row.game_id.clone(),
                };
                warn!(row = row_idx, "{error}");
                issues.push(RowIssue {
                    row: row_idx,
                    game_id: row.game_id.clone(),
                    error,
                });
                continue;
            };
            let recorded = &games.game(g).team_ids;
            if !recorded.is_empty() && !recorded.contains(&row.team_id) {
                let error = DataError::TeamNotInGame {
                    game_id: row.game_id.clone(),
                    team_id: row.team_id,
                };
                warn!(row = row_idx, "{error}");
                issues.push(RowIssue {
                    row: row_idx,
                    game_id: row.game_id.clone(),
                    error,
                });
                continue;
            }

            let entry = &mut index.games[g];
            if let Err(pos) = entry.teams.binary_search(&row.team_id) {
                entry.teams.insert(pos, row.team_id);
            }

            let key = (row.player_id, row.team_id, entry.season);
            let gi = *group_ix.entry(key).or_insert_with(|| {
                groups.push((key, Vec::new()));
                groups.len() - 1
            });
            groups[gi].1.push((row_idx, g));
        }

        let mut timelines = Vec::with_capacity(groups.len());
        for (tl_idx, ((player_id, team_id, season), mut members)) in
            groups.into_iter().enumerate()
        {
            members.sort_by_key(|&(r, g)| (index.games[g].date, r));

            let dates: Vec<NaiveDate> =
                members.iter().map(|&(_, g)| index.games[g].date).collect();
            let series = stats
                .iter()
                .map(|&stat| {
                    StatSeries::from_values(
                        members
                            .iter()
                            .map(|&(r, _)| boxscores.rows()[r].stats.get(stat).copied().flatten())
                            .collect(),
                    )
                })
                .collect();

            for &(_, g) in &members {
                let roster = index.game_rosters.entry((g, team_id)).or_default();
                if !roster.contains(&tl_idx) {
                    roster.push(tl_idx);
                }
            }
            index
                .team_season_players
                .entry((team_id, season))
                .or_default()
                .push((dates[0], tl_idx));
            index.timeline_ix.insert((player_id, team_id, season), tl_idx);

            timelines.push(SeasonPlayerTimeline {
                player_id,
                team_id,
                season_id: index.seasons[season as usize].clone(),
                dates,
                series,
            });
        }

        for players in index.team_season_players.values_mut() {
            players.sort_by_key(|&(first, tl)| (first, timelines[tl].player_id));
        }
        for roster in index.game_rosters.values_mut() {
            roster.sort_by_key(|&tl| timelines[tl].player_id);
        }
        index.timelines = timelines;

        // Entries were pushed in catalog order, so positions match.
        for (g, entry) in index.games.iter_mut().enumerate() {
            let recorded = games.game(g).team_ids.iter();
            let mut teams: Vec<TeamId> = recorded.chain(entry.teams.iter()).copied().collect();
            teams.sort_unstable();
            teams.dedup();
            entry.recorded = teams;
            for &team in &entry.recorded {
                index
                    .team_season_games
                    .entry((team, entry.season))
                    .or_default()
                    .push((entry.date, entry.game_id.clone()));
            }
        }
        for list in index.team_season_games.values_mut() {
            list.sort();
        }

        issues.sort_by_key(|i| i.row);
        info!(
            games = index.games.len(),
            timelines = index.timelines.len(),
            team_seasons = index.team_season_players.len(),
            stats = index.stats.len(),
            skipped_rows = issues.len(),
            "temporal index built"
        );
        debug!(seasons = ?index.seasons, "indexed seasons");
        (index, issues)
    }

    fn intern_season(&mut self, season: &SeasonId) -> SeasonIx {
        if let Some(&ix) = self.season_ix.get(season) {
            return ix;
        }
        let ix = self.seasons.len() as SeasonIx;
        self.seasons.push(season.clone());
        self.season_ix.insert(season.clone(), ix);
        ix
    }

    pub fn stats(&self) -> &[StatId] {
        &self.stats
    }

    /// Position of `stat` inside each timeline's series, if indexed.
    pub fn slot(&self, stat: StatId) -> Option<usize> {
        self.slots.get(&stat).copied()
    }

    pub fn slot_by_name(&self, name: &str) -> Option<usize> {
        self.stat_names.iter().position(|n| n == name)
    }

    /// Indexed stat names, in slot order.
    pub fn stat_names(&self) -> &[String] {
        &self.stat_names
    }

    pub fn game(&self, game_id: &GameId) -> Option<GameView<'_>> {
        let game_ix = *self.game_ix.get(game_id)?;
        let entry = &self.games[game_ix];
        Some(GameView {
            game_id: &entry.game_id,
            date: entry.date,
            season_id: &self.seasons[entry.season as usize],
            teams: &entry.teams,
            recorded_teams: &entry.recorded,
            game_ix,
            season: entry.season,
        })
    }

    /// All games of `team` in `season`, sorted by date.
    pub fn team_season_games(&self, team: TeamId, season: &SeasonId) -> &[(NaiveDate, GameId)] {
        self.season_ix
            .get(season)
            .and_then(|s| self.team_season_games.get(&(team, *s)))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Games of `team` in `season` strictly before `date`.
    pub fn games_before(
        &self,
        team: TeamId,
        season: &SeasonId,
        date: NaiveDate,
    ) -> &[(NaiveDate, GameId)] {
        let all = self.team_season_games(team, season);
        &all[..all.partition_point(|(d, _)| *d < date)]
    }

    pub fn timeline(
        &self,
        player: PlayerId,
        team: TeamId,
        season: &SeasonId,
    ) -> Option<&SeasonPlayerTimeline> {
        let season = *self.season_ix.get(season)?;
        self.timeline_ix
            .get(&(player, team, season))
            .map(|&tl| &self.timelines[tl])
    }

    pub fn observations(
        &self,
        player: PlayerId,
        team: TeamId,
        season: &SeasonId,
        stat: StatId,
    ) -> Vec<(NaiveDate, f64)> {
        match (self.timeline(player, team, season), self.slot(stat)) {
            (Some(tl), Some(slot)) => tl.observations(slot).collect(),
            _ => Vec::new(),
        }
    }

    /// Players who appeared for `team` in `season` strictly before `date`.
    pub fn players_before(
        &self,
        team: TeamId,
        season: &SeasonId,
        date: NaiveDate,
    ) -> impl Iterator<Item = &SeasonPlayerTimeline> + '_ {
        let season = self.season_ix.get(season).copied();
        season
            .into_iter()
            .flat_map(move |s| self.players_before_ix(team, s, date))
    }

    pub(crate) fn players_before_ix(
        &self,
        team: TeamId,
        season: u32,
        date: NaiveDate,
    ) -> impl Iterator<Item = &SeasonPlayerTimeline> + '_ {
        let players = self
            .team_season_players
            .get(&(team, season))
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        let end = players.partition_point(|(first, _)| *first < date);
        players[..end].iter().map(|&(_, tl)| &self.timelines[tl])
    }

    /// Timelines of the players `team` recorded in the game at `game_ix`.
    pub(crate) fn game_roster(
        &self,
        game_ix: usize,
        team: TeamId,
    ) -> impl Iterator<Item = &SeasonPlayerTimeline> + '_ {
        self.game_rosters
            .get(&(game_ix, team))
            .map(Vec::as_slice)
            .unwrap_or(&[])
            .iter()
            .map(|&tl| &self.timelines[tl])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::GameRecord;
    use crate::model::BoxScoreRow;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2023, 1, d).unwrap()
    }

    fn gid(n: u32) -> GameId {
        GameId::parse(&n.to_string()).unwrap()
    }

    fn game(n: u32, d: u32, season: &str, teams: &[TeamId]) -> Vec<GameRecord> {
        teams
            .iter()
            .map(|t| GameRecord {
                game_id: gid(n),
                date: date(d),
                season_id: SeasonId::new(season),
                team_id: Some(*t),
            })
            .collect()
    }

    fn row(game: u32, team: TeamId, player: PlayerId, pts: Option<f64>) -> BoxScoreRow {
        BoxScoreRow {
            game_id: gid(game),
            team_id: team,
            player_id: player,
            stats: vec![pts],
        }
    }

    fn fixture() -> (GameCatalog, BoxScoreCatalog) {
        let mut records = Vec::new();
        records.extend(game(3, 3, "S1", &[1, 2]));
        records.extend(game(1, 1, "S1", &[1, 2]));
        records.extend(game(2, 2, "S1", &[1, 3]));
        records.extend(game(9, 9, "S0", &[1, 2]));
        let games = GameCatalog::from_rows(records).unwrap();
        let rows = vec![
            row(3, 1, 10, Some(20.0)),
            row(1, 1, 10, Some(10.0)),
            row(2, 1, 11, None),
            row(2, 1, 10, Some(30.0)),
            row(1, 2, 20, Some(5.0)),
            row(9, 1, 10, Some(99.0)),
            row(77, 1, 10, Some(1.0)),
            row(2, 2, 21, Some(1.0)),
        ];
        (games, BoxScoreCatalog::from_rows(vec!["PTS".into()], rows))
    }

    #[test]
    fn timelines_are_date_sorted_and_season_scoped() {
        let (games, boxes) = fixture();
        let (index, _) = TemporalIndex::build(&games, &boxes, &[0]);
        let obs = index.observations(10, 1, &SeasonId::new("S1"), 0);
        assert_eq!(obs, vec![(date(1), 10.0), (date(2), 30.0), (date(3), 20.0)]);
        let old = index.observations(10, 1, &SeasonId::new("S0"), 0);
        assert_eq!(old, vec![(date(9), 99.0)]);
    }

    #[test]
    fn prior_mean_is_strictly_before_date() {
        let (games, boxes) = fixture();
        let (index, _) = TemporalIndex::build(&games, &boxes, &[0]);
        let tl = index.timeline(10, 1, &SeasonId::new("S1")).unwrap();
        assert_eq!(tl.prior_mean(0, date(1)), None);
        assert_eq!(tl.prior_mean(0, date(2)), Some(10.0));
        assert_eq!(tl.prior_mean(0, date(3)), Some(20.0));
        assert_eq!(tl.prior_mean(0, date(4)), Some(20.0));
    }

    #[test]
    fn missing_values_do_not_count() {
        let (games, boxes) = fixture();
        let (index, _) = TemporalIndex::build(&games, &boxes, &[0]);
        let tl = index.timeline(11, 1, &SeasonId::new("S1")).unwrap();
        assert_eq!(tl.games_before(date(5)), 1);
        assert_eq!(tl.prior_mean(0, date(5)), None);
    }

    #[test]
    fn invalid_rows_are_reported_and_skipped() {
        let (games, boxes) = fixture();
        let (index, issues) = TemporalIndex::build(&games, &boxes, &[0]);
        assert_eq!(issues.len(), 2);
        assert_eq!(issues[0].row, 6);
        assert!(matches!(issues[0].error, DataError::UnknownGame { .. }));
        assert_eq!(issues[1].row, 7);
        assert!(matches!(issues[1].error, DataError::TeamNotInGame { team_id: 2, .. }));
        assert!(index.timeline(21, 2, &SeasonId::new("S1")).is_none());
    }

    #[test]
    fn players_before_uses_first_appearance() {
        let (games, boxes) = fixture();
        let (index, _) = TemporalIndex::build(&games, &boxes, &[0]);
        let s1 = SeasonId::new("S1");
        let ids = |d| {
            index
                .players_before(1, &s1, date(d))
                .map(|tl| tl.player_id())
                .collect::<Vec<_>>()
        };
        assert!(ids(1).is_empty());
        assert_eq!(ids(2), vec![10]);
        assert_eq!(ids(3), vec![10, 11]);
    }

    #[test]
    fn team_season_games_cut_at_date() {
        let (games, boxes) = fixture();
        let (index, _) = TemporalIndex::build(&games, &boxes, &[0]);
        let s1 = SeasonId::new("S1");
        assert_eq!(index.team_season_games(1, &s1).len(), 3);
        let before = index.games_before(1, &s1, date(3));
        assert_eq!(before, &[(date(1), gid(1)), (date(2), gid(2))]);
        assert!(index.games_before(2, &s1, date(1)).is_empty());
    }

    #[test]
    fn game_view_lists_box_score_teams() {
        let (games, boxes) = fixture();
        let (index, _) = TemporalIndex::build(&games, &boxes, &[0]);
        let view = index.game(&gid(2)).unwrap();
        assert_eq!(view.teams, &[1]);
        assert_eq!(view.season_id.as_str(), "S1");
    }
}
