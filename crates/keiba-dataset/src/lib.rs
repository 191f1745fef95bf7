pub mod clean;
mod error;
mod history;
mod progress;
mod row;
mod scrapable;
mod store;
mod table;
mod writer;

pub use error::RaceError;
pub use history::{flatten_races, horse_features, latest_races, race_date, DEFAULT_TOP_N};
pub use progress::{ProgressState, RowKey};
pub use row::{RowBuilder, DEFAULT_HISTORY_DEPTH, HORSE_ID, RACE_DATE, RACE_ID};
pub use scrapable::{HttpLoader, NetkeibaConfig, NetkeibaScraper, RaceScraper};
pub use store::AppendFile;
pub use table::{clean_dataset, clean_table, CleaningConfig, CsvTerminator, CsvWriterConfig, Table};
pub use writer::{build_dataset, DatasetOptions, Summary};

pub use keiba_crawler::Record;
