use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use tracing_subscriber::EnvFilter;

use boxscore_priors::catalog::ColumnNames;
use boxscore_priors::config::arg_value;
use boxscore_priors::fake_season::{self, LeagueShape};
use boxscore_priors::table_io;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let out_dir = arg_value(&args, "--out-dir")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    let seed = parse_arg(&args, "--seed")?.unwrap_or(42);

    let defaults = LeagueShape::default();
    let shape = LeagueShape {
        seasons: parse_arg(&args, "--seasons")?.unwrap_or(defaults.seasons),
        teams: parse_arg(&args, "--teams")?.unwrap_or(defaults.teams),
        roster_size: parse_arg(&args, "--roster")?.unwrap_or(defaults.roster_size),
        rounds: parse_arg(&args, "--rounds")?.unwrap_or(defaults.rounds),
        ..defaults
    };
    if shape.teams < 2 {
        return Err(anyhow!("need at least two teams"));
    }

    std::fs::create_dir_all(&out_dir)
        .with_context(|| format!("create {}", out_dir.display()))?;
    let (games, boxscores) = fake_season::generate(&shape, seed)?;
    let names = ColumnNames::default();
    let games_path = out_dir.join("games.csv");
    let box_path = out_dir.join("box_scores.csv");
    table_io::write_games_csv(&games, &names, &games_path)?;
    table_io::write_box_scores_csv(&boxscores, &box_path)?;

    println!("Synthetic league written");
    println!("Seed: {seed}");
    println!("Games: {} -> {}", games.len(), games_path.display());
    println!("Box-score rows: {} -> {}", boxscores.len(), box_path.display());
    Ok(())
}

fn parse_arg<T: std::str::FromStr>(args: &[String], flag: &str) -> Result<Option<T>> {
    match arg_value(args, flag) {
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|_| anyhow!("invalid value for {flag}: '{raw}'")),
        None => Ok(None),
    }
}
