use std::collections::{HashMap, HashSet};

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::catalog::{BoxScoreCatalog, GameCatalog};
use crate::error::DataError;
use crate::model::{GameId, StatId, TeamId};
use crate::opp_avg::{OpponentAverageEngine, RosterMode};
use crate::temporal_index::{RowIssue, TemporalIndex};

pub const DEFAULT_SUFFIX: &str = "_opp_avg";

#[derive(Debug, Clone, Default)]
pub struct AugmentReport {
    pub rows: usize,
    pub stats: usize,
    /// Distinct (game, team) pairs resolved by the engine.
    pub queries: usize,
    pub single_team_queries: usize,
    pub filled_cells: usize,
    pub missing_cells: usize,
    /// Rows whose derived cells were left missing because of a data-integrity
    /// problem, sorted by row.
    pub issues: Vec<RowIssue>,
}

/// The input box-score table plus one `{stat}{suffix}` column per target stat.
#[derive(Debug, Clone)]
pub struct AugmentedTable<'a> {
    base: &'a BoxScoreCatalog,
    targets: Vec<String>,
    added: Vec<String>,
    values: Vec<Vec<Option<f64>>>,
    report: AugmentReport,
}

impl<'a> AugmentedTable<'a> {
    pub fn header(&self) -> Vec<&str> {
        self.base
            .columns()
            .iter()
            .chain(self.added.iter())
            .map(String::as_str)
            .collect()
    }

    /// Source stat names, aligned with `added_columns`.
    pub fn target_stats(&self) -> &[String] {
        &self.targets
    }

    pub fn added_columns(&self) -> &[String] {
        &self.added
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Derived value of target column `col` (position in `added_columns`).
    pub fn value(&self, row: usize, col: usize) -> Option<f64> {
        self.values.get(row)?.get(col).copied().flatten()
    }

    pub fn derived_row(&self, row: usize) -> &[Option<f64>] {
        &self.values[row]
    }

    pub fn column(&self, name: &str) -> Option<Vec<Option<f64>>> {
        let col = self.added.iter().position(|c| c == name)?;
        Some(self.values.iter().map(|r| r[col]).collect())
    }

    /// Raw input cells followed by the derived cells; missing renders empty.
    pub fn record(&self, row: usize) -> Vec<String> {
        let mut out = self.base.cells(row).to_vec();
        out.extend(self.values[row].iter().map(|v| format_value(*v)));
        out
    }

    pub fn base(&self) -> &'a BoxScoreCatalog {
        self.base
    }

    pub fn report(&self) -> &AugmentReport {
        &self.report
    }
}

pub fn format_value(v: Option<f64>) -> String {
    v.map(|x| x.to_string()).unwrap_or_default()
}

#[derive(Debug, Clone)]
pub struct FeatureAugmenter {
    stats: Vec<StatId>,
    suffix: String,
    mode: RosterMode,
    threads: Option<usize>,
}

impl FeatureAugmenter {
    pub fn new(stats: Vec<StatId>) -> Self {
        Self {
            stats,
            suffix: DEFAULT_SUFFIX.to_string(),
            mode: RosterMode::default(),
            threads: None,
        }
    }

    /// Targets every numeric column of `catalog` not named in `excluded`.
    pub fn for_catalog(catalog: &BoxScoreCatalog, excluded: &[String]) -> Self {
        Self::new(catalog.eligible_stats(excluded))
    }

    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = suffix.into();
        self
    }

    pub fn with_roster_mode(mut self, mode: RosterMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_threads(mut self, threads: Option<usize>) -> Self {
        self.threads = threads.filter(|n| *n > 0);
        self
    }

    pub fn stats(&self) -> &[StatId] {
        &self.stats
    }

    pub fn build_index(
        &self,
        games: &GameCatalog,
        boxscores: &BoxScoreCatalog,
    ) -> (TemporalIndex, Vec<RowIssue>) {
        TemporalIndex::build(games, boxscores, &self.stats)
    }

    /// Builds the index and augments in one call.
    pub fn run<'a>(
        &self,
        games: &GameCatalog,
        boxscores: &'a BoxScoreCatalog,
    ) -> AugmentedTable<'a> {
        let (index, issues) = self.build_index(games, boxscores);
        self.augment(boxscores, &index, issues)
    }

    /// Computes every target stat for every row. Rows listed in `build_issues`
    /// (rejected while indexing) get missing cells without being queried.
    pub fn augment<'a>(
        &self,
        boxscores: &'a BoxScoreCatalog,
        index: &TemporalIndex,
        build_issues: Vec<RowIssue>,
    ) -> AugmentedTable<'a> {
        let engine = OpponentAverageEngine::new(index).with_mode(self.mode);
        let width = self.stats.len();
        let slots: Vec<Option<usize>> = self.stats.iter().map(|&s| index.slot(s)).collect();
        for (stat, slot) in self.stats.iter().zip(&slots) {
            if slot.is_none() {
                warn!(
                    stat = boxscores.stat_name(*stat),
                    "statistic not indexed; column will be missing"
                );
            }
        }

        let skip: HashSet<usize> = build_issues.iter().map(|i| i.row).collect();
        let mut key_ix: HashMap<(&GameId, TeamId), usize> = HashMap::new();
        let mut keys: Vec<(&GameId, TeamId)> = Vec::new();
        let row_keys: Vec<Option<usize>> = boxscores
            .rows()
            .iter()
            .enumerate()
            .map(|(r, row)| {
                if skip.contains(&r) {
                    return None;
                }
                let key = (&row.game_id, row.team_id);
                Some(*key_ix.entry(key).or_insert_with(|| {
                    keys.push(key);
                    keys.len() - 1
                }))
            })
            .collect();

        debug!(keys = keys.len(), mode = ?self.mode, "resolving opponent rosters");
        let resolved: Vec<Result<Option<Vec<Option<f64>>>, DataError>> =
            with_thread_pool(self.threads, || {
                keys.par_iter()
                    .map(|(game_id, team_id)| {
                        engine.resolve_opponent(game_id, *team_id).map(|roster| {
                            roster.map(|roster| {
                                slots
                                    .iter()
                                    .map(|slot| slot.and_then(|s| roster.average(s)))
                                    .collect()
                            })
                        })
                    })
                    .collect()
            });

        let mut report = AugmentReport {
            rows: boxscores.len(),
            stats: width,
            queries: keys.len(),
            single_team_queries: resolved
                .iter()
                .filter(|r| matches!(r, Ok(None)))
                .count(),
            ..AugmentReport::default()
        };
        let mut issues = build_issues;
        let mut values = Vec::with_capacity(boxscores.len());

        for (r, key) in row_keys.iter().enumerate() {
            let cells = match key.map(|k| &resolved[k]) {
                Some(Ok(Some(cells))) => cells.clone(),
                Some(Ok(None)) | None => vec![None; width],
                Some(Err(error)) => {
                    warn!(row = r, "{error}");
                    issues.push(RowIssue {
                        row: r,
                        game_id: boxscores.rows()[r].game_id.clone(),
                        error: error.clone(),
                    });
                    vec![None; width]
                }
            };
            let filled = cells.iter().filter(|v| v.is_some()).count();
            report.filled_cells += filled;
            report.missing_cells += width - filled;
            values.push(cells);
        }
        issues.sort_by_key(|i| i.row);
        report.issues = issues;

        info!(
            rows = report.rows,
            stats = report.stats,
            queries = report.queries,
            filled = report.filled_cells,
            missing = report.missing_cells,
            issues = report.issues.len(),
            "opponent prior averages computed"
        );

        let targets: Vec<String> = self
            .stats
            .iter()
            .map(|&s| boxscores.stat_name(s).to_string())
            .collect();
        AugmentedTable {
            base: boxscores,
            added: targets
                .iter()
                .map(|name| format!("{name}{}", self.suffix))
                .collect(),
            targets,
            values,
            report,
        }
    }
}

fn with_thread_pool<T>(threads: Option<usize>, action: impl FnOnce() -> T + Send) -> T
where
    T: Send,
{
    let Some(threads) = threads else {
        return action();
    };
    match rayon::ThreadPoolBuilder::new().num_threads(threads).build() {
        Ok(pool) => pool.install(action),
        Err(_) => action(),
    }
}
