use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;

use boxscore_priors::catalog::ColumnNames;
use boxscore_priors::fake_season::{self, LeagueShape};
use boxscore_priors::model::GameId;
use boxscore_priors::{FeatureAugmenter, OpponentAverageEngine, TemporalIndex};

fn league() -> LeagueShape {
    LeagueShape {
        seasons: 2,
        teams: 30,
        roster_size: 15,
        active_per_game: 11,
        rounds: 80,
        ..LeagueShape::default()
    }
}

fn bench_index_build(c: &mut Criterion) {
    let (games, boxes) = fake_season::generate(&league(), 17).expect("synthetic league");
    let stats = boxes.eligible_stats(&ColumnNames::default().default_excluded());
    c.bench_function("temporal_index_build", |b| {
        b.iter(|| {
            let (index, issues) =
                TemporalIndex::build(black_box(&games), black_box(&boxes), &stats);
            black_box((index.stats().len(), issues.len()));
        })
    });
}

fn bench_opponent_lookup(c: &mut Criterion) {
    let (games, boxes) = fake_season::generate(&league(), 17).expect("synthetic league");
    let stats = boxes.eligible_stats(&ColumnNames::default().default_excluded());
    let (index, _) = TemporalIndex::build(&games, &boxes, &stats);
    let engine = OpponentAverageEngine::new(&index);
    let queries: Vec<(GameId, u64)> = games
        .iter()
        .skip(games.len() / 2)
        .take(200)
        .filter_map(|g| g.team_ids.first().map(|t| (g.game_id.clone(), *t)))
        .collect();
    c.bench_function("opponent_prior_average", |b| {
        b.iter(|| {
            for (game_id, team) in &queries {
                let v = engine.opponent_prior_average(black_box(game_id), *team, "PTS");
                black_box(v.ok());
            }
        })
    });
}

fn bench_full_augment(c: &mut Criterion) {
    let (games, boxes) = fake_season::generate(&league(), 17).expect("synthetic league");
    let augmenter =
        FeatureAugmenter::for_catalog(&boxes, &ColumnNames::default().default_excluded());
    c.bench_function("augment_full_league", |b| {
        b.iter(|| {
            let table = augmenter.run(black_box(&games), black_box(&boxes));
            black_box(table.report().filled_cells);
        })
    });
}

criterion_group!(
    benches,
    bench_index_build,
    bench_opponent_lookup,
    bench_full_augment
);
criterion_main!(benches);
