use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::info;

use crate::augment::{AugmentReport, AugmentedTable};
use crate::model::{GameId, PlayerId, TeamId};
use crate::opp_avg::RosterMode;

#[derive(Debug, Clone, PartialEq)]
pub struct StoredFeature {
    pub game_id: String,
    pub team_id: TeamId,
    pub player_id: PlayerId,
    pub stat: String,
    pub opp_avg: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunRecord {
    pub run_id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub rows: usize,
    pub stats: usize,
    pub filled_cells: usize,
    pub missing_cells: usize,
    pub issues: usize,
    pub roster_mode: String,
    pub output_sha256: Option<String>,
}

pub fn open_db(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let conn =
        Connection::open(path).with_context(|| format!("open sqlite db {}", path.display()))?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        CREATE TABLE IF NOT EXISTS opp_prior_features (
            game_id TEXT NOT NULL,
            team_id INTEGER NOT NULL,
            player_id INTEGER NOT NULL,
            stat TEXT NOT NULL,
            opp_avg REAL NULL,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (game_id, team_id, player_id, stat)
        );
        CREATE INDEX IF NOT EXISTS idx_features_stat ON opp_prior_features(stat);
        CREATE INDEX IF NOT EXISTS idx_features_player ON opp_prior_features(player_id);

        CREATE TABLE IF NOT EXISTS augment_runs (
            run_id INTEGER PRIMARY KEY AUTOINCREMENT,
            started_at TEXT NOT NULL,
            finished_at TEXT NULL,
            roster_mode TEXT NOT NULL,
            rows INTEGER NOT NULL,
            stats INTEGER NOT NULL,
            filled_cells INTEGER NOT NULL,
            missing_cells INTEGER NOT NULL,
            issues INTEGER NOT NULL,
            output_sha256 TEXT NULL,
            issues_json TEXT NOT NULL
        );
        "#,
    )
    .context("create sqlite schema")?;
    Ok(())
}

/// Upserts every derived cell in long format. Missing cells are stored as NULL
/// so consumers can tell "no prior data" from "never computed".
pub fn store_features(conn: &mut Connection, table: &AugmentedTable<'_>) -> Result<usize> {
    let updated_at = Utc::now().to_rfc3339();
    let rows = table.base().rows();
    let stats = table.target_stats();

    let tx = conn.transaction().context("begin feature transaction")?;
    let mut written = 0usize;
    {
        let mut stmt = tx
            .prepare(
                r#"
                INSERT INTO opp_prior_features (
                    game_id, team_id, player_id, stat, opp_avg, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                ON CONFLICT(game_id, team_id, player_id, stat) DO UPDATE SET
                    opp_avg = excluded.opp_avg,
                    updated_at = excluded.updated_at
                "#,
            )
            .context("prepare feature upsert")?;
        for (r, row) in rows.iter().enumerate() {
            // SQLite integers are signed 64-bit.
            let team_id = i64::try_from(row.team_id)
                .with_context(|| format!("row {r}: team id {} out of range", row.team_id))?;
            let player_id = i64::try_from(row.player_id)
                .with_context(|| format!("row {r}: player id {} out of range", row.player_id))?;
            for (col, stat) in stats.iter().enumerate() {
                stmt.execute(params![
                    row.game_id.as_str(),
                    team_id,
                    player_id,
                    stat,
                    table.value(r, col),
                    updated_at,
                ])
                .with_context(|| format!("upsert feature row {r} stat {stat}"))?;
                written += 1;
            }
        }
    }
    tx.commit().context("commit feature transaction")?;
    info!(written, "features stored");
    Ok(written)
}

pub fn begin_run(conn: &Connection, mode: RosterMode) -> Result<i64> {
    let started_at = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO augment_runs(started_at, finished_at, roster_mode, rows, stats, filled_cells, missing_cells, issues, output_sha256, issues_json)
         VALUES (?1, NULL, ?2, 0, 0, 0, 0, 0, NULL, '[]')",
        params![started_at, roster_mode_label(mode)],
    )
    .context("insert augment run")?;
    Ok(conn.last_insert_rowid())
}

pub fn finish_run(
    conn: &Connection,
    run_id: i64,
    report: &AugmentReport,
    output_sha256: Option<&str>,
) -> Result<()> {
    let finished_at = Utc::now().to_rfc3339();
    let issues: Vec<String> = report
        .issues
        .iter()
        .map(|i| format!("row {}: {}", i.row, i.error))
        .collect();
    let issues_json = serde_json::to_string(&issues).unwrap_or_else(|_| "[]".to_string());
    conn.execute(
        "UPDATE augment_runs
         SET finished_at = ?1, rows = ?2, stats = ?3, filled_cells = ?4, missing_cells = ?5,
             issues = ?6, output_sha256 = ?7, issues_json = ?8
         WHERE run_id = ?9",
        params![
            finished_at,
            report.rows as i64,
            report.stats as i64,
            report.filled_cells as i64,
            report.missing_cells as i64,
            report.issues.len() as i64,
            output_sha256,
            issues_json,
            run_id
        ],
    )
    .context("update augment run")?;
    Ok(())
}

pub fn load_features(conn: &Connection, game_id: &GameId) -> Result<Vec<StoredFeature>> {
    let mut stmt = conn
        .prepare(
            r#"
            SELECT game_id, team_id, player_id, stat, opp_avg
            FROM opp_prior_features
            WHERE game_id = ?1
            ORDER BY team_id ASC, player_id ASC, stat ASC
            "#,
        )
        .context("prepare load features query")?;

    let rows = stmt
        .query_map(params![game_id.as_str()], |row| {
            Ok(StoredFeature {
                game_id: row.get(0)?,
                team_id: stored_id(row, 1)?,
                player_id: stored_id(row, 2)?,
                stat: row.get(3)?,
                opp_avg: row.get(4)?,
            })
        })
        .context("query load features")?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row.context("decode feature row")?);
    }
    Ok(out)
}

pub fn latest_run(conn: &Connection) -> Result<Option<RunRecord>> {
    conn.query_row(
        r#"
        SELECT run_id, started_at, finished_at, rows, stats, filled_cells, missing_cells,
               issues, roster_mode, output_sha256
        FROM augment_runs
        ORDER BY run_id DESC
        LIMIT 1
        "#,
        [],
        |row| {
            Ok(RunRecord {
                run_id: row.get(0)?,
                started_at: row.get(1)?,
                finished_at: row.get(2)?,
                rows: row.get::<_, i64>(3)? as usize,
                stats: row.get::<_, i64>(4)? as usize,
                filled_cells: row.get::<_, i64>(5)? as usize,
                missing_cells: row.get::<_, i64>(6)? as usize,
                issues: row.get::<_, i64>(7)? as usize,
                roster_mode: row.get(8)?,
                output_sha256: row.get(9)?,
            })
        },
    )
    .optional()
    .context("query latest augment run")
}

fn stored_id(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<u64> {
    let raw: i64 = row.get(idx)?;
    u64::try_from(raw).map_err(|_| rusqlite::Error::IntegralValueOutOfRange(idx, raw))
}

fn roster_mode_label(mode: RosterMode) -> &'static str {
    match mode {
        RosterMode::PriorAppearances => "prior",
        RosterMode::GameDayRoster => "gameday",
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::augment::FeatureAugmenter;
    use crate::catalog::{BoxScoreCatalog, GameCatalog, GameRecord};
    use crate::model::{BoxScoreRow, SeasonId};

    fn league(player: PlayerId) -> (GameCatalog, BoxScoreCatalog) {
        let gid = GameId::parse("1").unwrap();
        let games = GameCatalog::from_rows([1, 2].map(|team| GameRecord {
            game_id: gid.clone(),
            date: NaiveDate::from_ymd_opt(2024, 1, 5).unwrap(),
            season_id: SeasonId::new("22023"),
            team_id: Some(team),
        }))
        .unwrap();
        let rows = vec![
            BoxScoreRow {
                game_id: gid.clone(),
                team_id: 1,
                player_id: player,
                stats: vec![Some(12.0)],
            },
            BoxScoreRow {
                game_id: gid,
                team_id: 2,
                player_id: 7,
                stats: vec![Some(3.0)],
            },
        ];
        (games, BoxScoreCatalog::from_rows(vec!["PTS".into()], rows))
    }

    #[test]
    fn ids_above_sqlite_range_are_rejected() {
        let (games, boxes) = league(u64::MAX);
        let table = FeatureAugmenter::new(vec![0]).run(&games, &boxes);
        let dir = tempfile::tempdir().unwrap();
        let mut conn = open_db(&dir.path().join("features.sqlite")).unwrap();

        let err = store_features(&mut conn, &table).unwrap_err();
        assert!(err.to_string().contains("player id 18446744073709551615"));
        // The transaction rolls back, nothing is half-written.
        let total: i64 = conn
            .query_row("SELECT COUNT(*) FROM opp_prior_features", [], |row| row.get(0))
            .unwrap();
        assert_eq!(total, 0);
    }

    #[test]
    fn large_ids_round_trip_and_negative_ones_fail() {
        let big = i64::MAX as u64;
        let (games, boxes) = league(big);
        let table = FeatureAugmenter::new(vec![0]).run(&games, &boxes);
        let dir = tempfile::tempdir().unwrap();
        let mut conn = open_db(&dir.path().join("features.sqlite")).unwrap();
        assert_eq!(store_features(&mut conn, &table).unwrap(), 2);

        let gid = GameId::parse("1").unwrap();
        let stored = load_features(&conn, &gid).unwrap();
        assert_eq!(stored[0].player_id, big);
        assert_eq!(stored[1].player_id, 7);

        conn.execute(
            "UPDATE opp_prior_features SET player_id = -1 WHERE player_id = 7",
            [],
        )
        .unwrap();
        assert!(load_features(&conn, &gid).is_err());
    }
}
