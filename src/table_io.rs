use std::fs;
use std::io::{self, Read, Write};
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use sha2::{Digest, Sha256};
use tracing::info;

use crate::augment::AugmentedTable;
use crate::catalog::{BoxScoreCatalog, ColumnNames, GameCatalog, GameRecord};
use crate::model::{GameId, SeasonId, parse_date, parse_id};

pub fn read_games_csv(path: &Path, names: &ColumnNames) -> Result<GameCatalog> {
    let file = fs::File::open(path).with_context(|| format!("open {}", path.display()))?;
    let catalog =
        read_games(file, names).with_context(|| format!("read games from {}", path.display()))?;
    info!(path = %path.display(), games = catalog.len(), "game catalog loaded");
    Ok(catalog)
}

pub fn read_games<R: Read>(reader: R, names: &ColumnNames) -> Result<GameCatalog> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let headers = rdr.headers().context("read games header")?.clone();
    let position = |name: &str| headers.iter().position(|h| h == name);
    let required = |name: &str| position(name).ok_or_else(|| anyhow!("games: missing column {name}"));

    let game_col = required(&names.game_id)?;
    let date_col = required(&names.game_date)?;
    let season_col = required(&names.season_id)?;
    let team_col = position(&names.team_id);

    let mut rows = Vec::new();
    for (line, record) in rdr.records().enumerate() {
        let record = record.with_context(|| format!("games row {}", line + 1))?;
        let cell = |c: usize| record.get(c).unwrap_or("");
        let team_id = match team_col.map(cell) {
            Some(raw) if !raw.is_empty() => Some(parse_id("team_id", raw)?),
            _ => None,
        };
        rows.push(GameRecord {
            game_id: GameId::parse(cell(game_col))
                .with_context(|| format!("games row {}", line + 1))?,
            date: parse_date(cell(date_col)).with_context(|| format!("games row {}", line + 1))?,
            season_id: SeasonId::new(cell(season_col)),
            team_id,
        });
    }
    Ok(GameCatalog::from_rows(rows)?)
}

pub fn read_box_scores_csv(path: &Path, names: &ColumnNames) -> Result<BoxScoreCatalog> {
    let file = fs::File::open(path).with_context(|| format!("open {}", path.display()))?;
    let catalog = read_box_scores(file, names)
        .with_context(|| format!("read box scores from {}", path.display()))?;
    info!(
        path = %path.display(),
        rows = catalog.len(),
        numeric_columns = catalog.stat_names().len(),
        "box-score catalog loaded"
    );
    Ok(catalog)
}

pub fn read_box_scores<R: Read>(reader: R, names: &ColumnNames) -> Result<BoxScoreCatalog> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let columns: Vec<String> = rdr
        .headers()
        .context("read box score header")?
        .iter()
        .map(str::to_string)
        .collect();

    let mut cells = Vec::new();
    for (line, record) in rdr.records().enumerate() {
        let record = record.with_context(|| format!("box score row {}", line + 1))?;
        cells.push(record.iter().map(str::to_string).collect::<Vec<_>>());
    }
    BoxScoreCatalog::new(columns, cells, names).context("parse box score table")
}

/// Writes the table atomically (temp file + rename) and returns the SHA-256
/// of the bytes written.
pub fn write_augmented_csv(table: &AugmentedTable<'_>, path: &Path) -> Result<String> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).ok();
    }
    let tmp = path.with_extension("csv.tmp");
    let file = fs::File::create(&tmp).with_context(|| format!("create {}", tmp.display()))?;
    let mut sink = DigestWriter::new(io::BufWriter::new(file));
    write_augmented(table, &mut sink)?;
    sink.flush().context("flush augmented table")?;
    let digest = sink.hex_digest();
    fs::rename(&tmp, path).with_context(|| format!("swap {}", path.display()))?;
    info!(path = %path.display(), rows = table.len(), sha256 = %digest, "augmented table written");
    Ok(digest)
}

pub fn write_augmented<W: Write>(table: &AugmentedTable<'_>, writer: W) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(table.header()).context("write header")?;
    for row in 0..table.len() {
        wtr.write_record(table.record(row))
            .with_context(|| format!("write row {row}"))?;
    }
    wtr.flush().context("flush csv writer")?;
    Ok(())
}

/// Writes the catalog in game-finder layout: one row per (game, team).
pub fn write_games_csv(games: &GameCatalog, names: &ColumnNames, path: &Path) -> Result<()> {
    let mut wtr =
        csv::Writer::from_path(path).with_context(|| format!("create {}", path.display()))?;
    wtr.write_record([
        names.season_id.as_str(),
        names.team_id.as_str(),
        names.game_id.as_str(),
        names.game_date.as_str(),
    ])
    .context("write games header")?;
    for game in games.iter() {
        let date = game.date.format("%Y-%m-%d").to_string();
        let teams: Vec<String> = if game.team_ids.is_empty() {
            vec![String::new()]
        } else {
            game.team_ids.iter().map(|t| t.to_string()).collect()
        };
        for team in teams {
            wtr.write_record([
                game.season_id.as_str(),
                team.as_str(),
                game.game_id.as_str(),
                date.as_str(),
            ])
            .with_context(|| format!("write game {}", game.game_id))?;
        }
    }
    wtr.flush().context("flush games csv")?;
    info!(path = %path.display(), games = games.len(), "game catalog written");
    Ok(())
}

pub fn write_box_scores_csv(boxscores: &BoxScoreCatalog, path: &Path) -> Result<()> {
    let mut wtr =
        csv::Writer::from_path(path).with_context(|| format!("create {}", path.display()))?;
    wtr.write_record(boxscores.columns())
        .context("write box score header")?;
    for row in 0..boxscores.len() {
        wtr.write_record(boxscores.cells(row))
            .with_context(|| format!("write box score row {row}"))?;
    }
    wtr.flush().context("flush box score csv")?;
    info!(path = %path.display(), rows = boxscores.len(), "box-score table written");
    Ok(())
}

pub fn digest_bytes(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

pub fn digest_file(path: &Path) -> Result<String> {
    let raw = fs::read(path).with_context(|| format!("read {}", path.display()))?;
    Ok(digest_bytes(&raw))
}

struct DigestWriter<W> {
    inner: W,
    hasher: Sha256,
}

impl<W: Write> DigestWriter<W> {
    fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
        }
    }

    fn hex_digest(&self) -> String {
        format!("{:x}", self.hasher.clone().finalize())
    }
}

impl<W: Write> Write for DigestWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GAMES: &str = "\
SEASON_ID,TEAM_ID,GAME_ID,GAME_DATE,MATCHUP
22022,1610612747,22200001,2022-10-18,LAL @ GSW
22022,1610612744,22200001,2022-10-18,GSW vs. LAL
";

    #[test]
    fn games_merge_team_rows() {
        let catalog = read_games(GAMES.as_bytes(), &ColumnNames::default()).unwrap();
        assert_eq!(catalog.len(), 1);
        let game = catalog.get(&GameId::parse("0022200001").unwrap()).unwrap();
        assert_eq!(game.team_ids, vec![1610612744, 1610612747]);
        assert_eq!(game.season_id.as_str(), "22022");
    }

    #[test]
    fn games_without_team_column_are_accepted() {
        let raw = "GAME_ID,GAME_DATE,SEASON_ID\n7,2022-10-18,22022\n";
        let catalog = read_games(raw.as_bytes(), &ColumnNames::default()).unwrap();
        assert!(catalog.iter().all(|g| g.team_ids.is_empty()));
    }

    #[test]
    fn games_missing_date_column_fail() {
        let raw = "GAME_ID,SEASON_ID\n7,22022\n";
        let err = read_games(raw.as_bytes(), &ColumnNames::default()).unwrap_err();
        assert!(err.to_string().contains("GAME_DATE"));
    }

    #[test]
    fn written_games_read_back() {
        let catalog = read_games(GAMES.as_bytes(), &ColumnNames::default()).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("games.csv");
        write_games_csv(&catalog, &ColumnNames::default(), &path).unwrap();
        let again = read_games_csv(&path, &ColumnNames::default()).unwrap();
        assert_eq!(again.iter().collect::<Vec<_>>(), catalog.iter().collect::<Vec<_>>());
    }

    #[test]
    fn digest_writer_matches_direct_hash() {
        let mut sink = DigestWriter::new(Vec::new());
        sink.write_all(b"GAME_ID,PTS\n1,2\n").unwrap();
        assert_eq!(sink.hex_digest(), digest_bytes(&sink.inner));
        assert_eq!(sink.hex_digest().len(), 64);
    }
}
