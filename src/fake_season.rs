//! Seeded synthetic league seasons for demos, benches and property tests.

use chrono::{Duration, NaiveDate};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tracing::debug;

use crate::catalog::{BoxScoreCatalog, GameCatalog, GameRecord};
use crate::error::DataError;
use crate::model::{BoxScoreRow, GameId, PlayerId, SeasonId, TeamId};

const TEAM_ID_BASE: TeamId = 1_610_612_737;
const PLAYER_ID_BASE: PlayerId = 200_000;
const FIRST_SEASON_YEAR: i32 = 2020;

pub const SYNTH_STATS: [&str; 4] = ["MIN", "PTS", "REB", "AST"];

#[derive(Debug, Clone, Serialize)]
pub struct LeagueShape {
    pub seasons: usize,
    pub teams: usize,
    pub roster_size: usize,
    /// Players per team per game.
    pub active_per_game: usize,
    /// Match days per season. Every team plays at most once per day.
    pub rounds: usize,
    /// Chance per round that one player switches teams.
    pub transfer_rate: f64,
    /// Chance that a stat cell is blank.
    pub missing_rate: f64,
    /// Chance that a game only has one side's box score.
    pub one_sided_rate: f64,
}

impl Default for LeagueShape {
    fn default() -> Self {
        Self {
            seasons: 2,
            teams: 8,
            roster_size: 12,
            active_per_game: 9,
            rounds: 30,
            transfer_rate: 0.1,
            missing_rate: 0.02,
            one_sided_rate: 0.01,
        }
    }
}

struct PlayerSkill {
    id: PlayerId,
    minutes: f64,
    points: f64,
    rebounds: f64,
    assists: f64,
}

/// Generates a game catalog and a box-score table. The same shape and seed
/// always produce the same tables. Catalog errors from the generated rows are
/// returned as they are.
pub fn generate(
    shape: &LeagueShape,
    seed: u64,
) -> Result<(GameCatalog, BoxScoreCatalog), DataError> {
    let mut rng = StdRng::seed_from_u64(seed);
    let teams: Vec<TeamId> = (0..shape.teams as u64).map(|t| TEAM_ID_BASE + t).collect();
    let active = shape.active_per_game.min(shape.roster_size).max(1);

    let mut records = Vec::new();
    let mut rows = Vec::new();
    let mut next_player = PLAYER_ID_BASE;

    for season in 0..shape.seasons {
        let year = FIRST_SEASON_YEAR + season as i32;
        let season_id = SeasonId::new(format!("2{year}"));
        let opening = NaiveDate::from_ymd_opt(year, 10, 18).unwrap_or_default();

        // Fresh rosters each season.
        let mut rosters: Vec<Vec<PlayerSkill>> = teams
            .iter()
            .map(|_| {
                (0..shape.roster_size)
                    .map(|_| {
                        next_player += 1;
                        PlayerSkill {
                            id: next_player,
                            minutes: rng.gen_range(8.0..36.0),
                            points: rng.gen_range(2.0..28.0),
                            rebounds: rng.gen_range(1.0..12.0),
                            assists: rng.gen_range(0.5..9.0),
                        }
                    })
                    .collect()
            })
            .collect();

        let mut game_no = 0u32;
        for round in 0..shape.rounds {
            let date = opening + Duration::days(2 * round as i64);
            let mut order: Vec<usize> = (0..teams.len()).collect();
            order.shuffle(&mut rng);

            for pair in order.chunks_exact(2) {
                game_no += 1;
                let game_id = GameId::parse(&format!("2{:02}{:05}", season, game_no))?;
                let one_sided = rng.gen_bool(shape.one_sided_rate.clamp(0.0, 1.0));
                for (side, &t) in pair.iter().enumerate() {
                    records.push(GameRecord {
                        game_id: game_id.clone(),
                        date,
                        season_id: season_id.clone(),
                        team_id: Some(teams[t]),
                    });
                    if one_sided && side == 1 {
                        continue;
                    }
                    let mut dressed: Vec<&PlayerSkill> =
                        rosters[t].choose_multiple(&mut rng, active).collect();
                    dressed.sort_by_key(|p| p.id);
                    for player in dressed {
                        let stats = [
                            player.minutes + rng.gen_range(-6.0..6.0),
                            player.points + rng.gen_range(-8.0..8.0),
                            player.rebounds + rng.gen_range(-3.0..3.0),
                            player.assists + rng.gen_range(-2.5..2.5),
                        ]
                        .into_iter()
                        .map(|v| {
                            if rng.gen_bool(shape.missing_rate.clamp(0.0, 1.0)) {
                                None
                            } else {
                                Some(v.max(0.0).round())
                            }
                        })
                        .collect();
                        rows.push(BoxScoreRow {
                            game_id: game_id.clone(),
                            team_id: teams[t],
                            player_id: player.id,
                            stats,
                        });
                    }
                }
            }

            if teams.len() > 1 && rng.gen_bool(shape.transfer_rate.clamp(0.0, 1.0)) {
                let from = rng.gen_range(0..teams.len());
                let to = (from + rng.gen_range(1..teams.len())) % teams.len();
                if rosters[from].len() > active {
                    let pick = rng.gen_range(0..rosters[from].len());
                    let player = rosters[from].swap_remove(pick);
                    debug!(
                        player = player.id,
                        from = teams[from],
                        to = teams[to],
                        "synthetic transfer"
                    );
                    rosters[to].push(player);
                }
            }
        }
    }

    let stat_names = SYNTH_STATS.iter().map(|s| s.to_string()).collect();
    let games = GameCatalog::from_rows(records)?;
    Ok((games, BoxScoreCatalog::from_rows(stat_names, rows)))
}
