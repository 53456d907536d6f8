use std::fs;
use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use boxscore_priors::augment::{AugmentedTable, FeatureAugmenter};
use boxscore_priors::config::RunConfig;
use boxscore_priors::model::StatId;
use boxscore_priors::{feature_store, table_io};

#[derive(Serialize)]
struct RunSummary<'a> {
    config: &'a RunConfig,
    duplicates_removed: usize,
    first_game: Option<String>,
    last_game: Option<String>,
    rows: usize,
    added_columns: &'a [String],
    queries: usize,
    single_team_queries: usize,
    filled_cells: usize,
    missing_cells: usize,
    issues: Vec<String>,
    output_sha256: &'a str,
    elapsed_ms: u128,
}

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let started = Instant::now();
    let cfg = RunConfig::from_env_and_args()?;
    info!(
        games = %cfg.games.display(),
        box_scores = %cfg.box_scores.display(),
        mode = ?cfg.roster_mode,
        "starting augmentation"
    );

    let games = table_io::read_games_csv(&cfg.games, &cfg.columns)?;
    let mut boxscores = table_io::read_box_scores_csv(&cfg.box_scores, &cfg.columns)?;

    let duplicates_removed = if cfg.dedup {
        boxscores.dedup_exact()
    } else {
        0
    };
    if duplicates_removed > 0 {
        warn!(duplicates_removed, "dropped exact duplicate box-score rows");
    }

    let range = games.date_range();
    if let Some((first, last)) = range {
        info!(%first, %last, games = games.len(), "game date range");
    }

    let stats = select_stats(&cfg, &boxscores)?;
    if stats.is_empty() {
        warn!("no eligible statistics; output will match input");
    }

    let augmenter = FeatureAugmenter::new(stats)
        .with_suffix(cfg.suffix.clone())
        .with_roster_mode(cfg.roster_mode)
        .with_threads(cfg.threads);
    let table = augmenter.run(&games, &boxscores);
    let digest = table_io::write_augmented_csv(&table, &cfg.out)?;

    if let Some(db_path) = cfg.db.as_deref() {
        persist_run(db_path, &cfg, &table, &digest)?;
    }

    let report = table.report();
    if let Some(path) = cfg.summary_json.as_deref() {
        let summary = RunSummary {
            config: &cfg,
            duplicates_removed,
            first_game: range.map(|(first, _)| first.to_string()),
            last_game: range.map(|(_, last)| last.to_string()),
            rows: report.rows,
            added_columns: table.added_columns(),
            queries: report.queries,
            single_team_queries: report.single_team_queries,
            filled_cells: report.filled_cells,
            missing_cells: report.missing_cells,
            issues: report
                .issues
                .iter()
                .map(|i| format!("row {}: {}", i.row, i.error))
                .collect(),
            output_sha256: &digest,
            elapsed_ms: started.elapsed().as_millis(),
        };
        write_summary(path, &summary)?;
    }

    println!("Opponent prior averages written");
    println!("Output: {}", cfg.out.display());
    println!("Rows: {}", report.rows);
    println!("Columns added: {}", table.added_columns().join(", "));
    println!(
        "Cells: {} filled, {} missing",
        report.filled_cells, report.missing_cells
    );
    if !report.issues.is_empty() {
        println!("Issues: {}", report.issues.len());
        for issue in report.issues.iter().take(6) {
            println!("   - row {}: {}", issue.row, issue.error);
        }
    }
    println!("SHA-256: {digest}");
    Ok(())
}

fn select_stats(
    cfg: &RunConfig,
    boxscores: &boxscore_priors::BoxScoreCatalog,
) -> Result<Vec<StatId>> {
    match &cfg.stats {
        Some(names) => names
            .iter()
            .map(|name| {
                boxscores
                    .stat_id(name)
                    .with_context(|| format!("requested statistic {name}"))
            })
            .collect(),
        None => Ok(boxscores.eligible_stats(&cfg.excluded)),
    }
}

fn persist_run(
    db_path: &Path,
    cfg: &RunConfig,
    table: &AugmentedTable<'_>,
    digest: &str,
) -> Result<()> {
    let mut conn = feature_store::open_db(db_path)?;
    let run_id = feature_store::begin_run(&conn, cfg.roster_mode)?;
    feature_store::store_features(&mut conn, table)?;
    feature_store::finish_run(&conn, run_id, table.report(), Some(digest))?;
    info!(db = %db_path.display(), run_id, "feature store updated");
    Ok(())
}

fn write_summary(path: &Path, summary: &RunSummary<'_>) -> Result<()> {
    let raw = serde_json::to_string_pretty(summary).context("serialize run summary")?;
    fs::write(path, raw).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}
