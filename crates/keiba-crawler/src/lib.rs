mod config;
mod discovery;
mod error;
mod fetch;
mod limiter;
mod loader;
mod parse;
mod site;

pub use config::{CrawlerConfig, OnError, Throttle};
pub use discovery::{parse_race_ids, RaceIdDiscovery, YearMonth};
pub use error::{FetchError, LoadCause, LoadError, ParseError};
pub use fetch::{ensure_marker, HttpFetcher, PageFetcher};
pub use loader::{EntityKind, EntityLoader, Loaded, Loader};
pub use parse::{Record, RecordParser, SchemaParser};
pub use site::{EntityConfig, FieldSpec, RaceListConfig, Schema, SiteConfig, ValueKind};

pub use anyhow;
