pub mod augment;
pub mod catalog;
pub mod config;
pub mod error;
pub mod fake_season;
pub mod feature_store;
pub mod model;
pub mod opp_avg;
pub mod table_io;
pub mod temporal_index;

pub use augment::{AugmentReport, AugmentedTable, FeatureAugmenter};
pub use catalog::{BoxScoreCatalog, ColumnNames, GameCatalog};
pub use error::DataError;
pub use opp_avg::{OpponentAverageEngine, RosterMode};
pub use temporal_index::TemporalIndex;
