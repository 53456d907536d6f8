use std::path::PathBuf;

use anyhow::{Result, anyhow};
use serde::Serialize;

use crate::augment::DEFAULT_SUFFIX;
use crate::catalog::ColumnNames;
use crate::opp_avg::RosterMode;

const DEFAULT_GAMES_PATH: &str = "games.csv";
const DEFAULT_BOX_SCORES_PATH: &str = "box_scores.csv";
const DEFAULT_OUT_PATH: &str = "box_scores_with_opp_prior_avg.csv";

/// Settings for one augmentation run. Each field resolves from a CLI flag,
/// then a `BOXSCORE_*` environment variable, then a default.
#[derive(Debug, Clone, Serialize)]
pub struct RunConfig {
    pub games: PathBuf,
    pub box_scores: PathBuf,
    pub out: PathBuf,
    pub db: Option<PathBuf>,
    pub summary_json: Option<PathBuf>,
    pub roster_mode: RosterMode,
    pub threads: Option<usize>,
    /// Restricts targets to these stat names when set.
    pub stats: Option<Vec<String>>,
    pub excluded: Vec<String>,
    pub suffix: String,
    pub dedup: bool,
    pub columns: ColumnNames,
}

impl RunConfig {
    pub fn from_env_and_args() -> Result<Self> {
        let args = std::env::args().skip(1).collect::<Vec<_>>();
        Self::resolve(&args, |key| std::env::var(key).ok())
    }

    pub fn resolve<F>(args: &[String], env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |flag: &str, key: &str| {
            arg_value(args, flag)
                .or_else(|| env(key))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let columns = {
            let d = ColumnNames::default();
            let col = |key: &str, default: String| {
                env(key)
                    .filter(|v| !v.trim().is_empty())
                    .unwrap_or(default)
            };
            ColumnNames {
                game_id: col("BOXSCORE_COL_GAME_ID", d.game_id),
                game_date: col("BOXSCORE_COL_GAME_DATE", d.game_date),
                season_id: col("BOXSCORE_COL_SEASON_ID", d.season_id),
                team_id: col("BOXSCORE_COL_TEAM_ID", d.team_id),
                player_id: col("BOXSCORE_COL_PLAYER_ID", d.player_id),
                minutes: col("BOXSCORE_COL_MINUTES", d.minutes),
            }
        };

        let roster_mode = match lookup("--roster-mode", "BOXSCORE_ROSTER_MODE") {
            Some(raw) => RosterMode::parse(&raw)
                .ok_or_else(|| anyhow!("unknown roster mode '{raw}' (expected prior|gameday)"))?,
            None => RosterMode::default(),
        };

        let threads = match lookup("--threads", "BOXSCORE_THREADS") {
            Some(raw) => Some(
                raw.parse::<usize>()
                    .map_err(|_| anyhow!("invalid thread count '{raw}'"))?,
            )
            .filter(|n| *n > 0),
            None => None,
        };

        let excluded = lookup("--excluded", "BOXSCORE_EXCLUDED")
            .map(|raw| parse_list(&raw))
            .unwrap_or_else(|| columns.default_excluded());

        Ok(Self {
            games: lookup("--games", "BOXSCORE_GAMES")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_GAMES_PATH)),
            box_scores: lookup("--box-scores", "BOXSCORE_BOX_SCORES")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_BOX_SCORES_PATH)),
            out: lookup("--out", "BOXSCORE_OUT")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_OUT_PATH)),
            db: lookup("--db", "BOXSCORE_DB").map(PathBuf::from),
            summary_json: lookup("--summary-json", "BOXSCORE_SUMMARY_JSON").map(PathBuf::from),
            roster_mode,
            threads,
            stats: lookup("--stats", "BOXSCORE_STATS")
                .map(|raw| parse_list(&raw))
                .filter(|list| !list.is_empty()),
            excluded,
            suffix: lookup("--suffix", "BOXSCORE_SUFFIX")
                .unwrap_or_else(|| DEFAULT_SUFFIX.to_string()),
            dedup: !args.iter().any(|a| a == "--no-dedup")
                && !env("BOXSCORE_NO_DEDUP").is_some_and(|v| is_truthy(&v)),
            columns,
        })
    }
}

/// `--name=value` or `--name value`.
pub fn arg_value(args: &[String], flag: &str) -> Option<String> {
    for (idx, arg) in args.iter().enumerate() {
        if let Some(raw) = arg
            .strip_prefix(flag)
            .and_then(|rest| rest.strip_prefix('='))
        {
            let trimmed = raw.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
        if arg == flag
            && let Some(next) = args.get(idx + 1)
            && !next.starts_with("--")
            && !next.trim().is_empty()
        {
            return Some(next.trim().to_string());
        }
    }
    None
}

pub fn parse_list(raw: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for part in raw.split([',', ';', ' ']) {
        let part = part.trim();
        if !part.is_empty() && !out.iter().any(|p| p == part) {
            out.push(part.to_string());
        }
    }
    out
}

fn is_truthy(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "on" | "yes"
    )
}
