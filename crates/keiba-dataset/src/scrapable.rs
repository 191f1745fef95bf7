use std::sync::Arc;

use keiba_crawler::{
    CrawlerConfig, EntityKind, EntityLoader, HttpFetcher, Record, SchemaParser, SiteConfig,
};

use crate::error::RaceError;
use crate::row::RowBuilder;

/// Turns a race id into output rows. One instance lives in each worker.
pub trait RaceScraper {
    type Config: Clone + Send + 'static;

    fn new(config: &Self::Config) -> anyhow::Result<Self>
    where
        Self: Sized;

    fn scrape_race(&mut self, race_id: &str) -> Result<Vec<Record>, RaceError>;
}

pub type HttpLoader = EntityLoader<HttpFetcher, Arc<SchemaParser>>;

pub type NetkeibaScraper = RowBuilder<HttpLoader, HttpLoader>;

#[derive(Debug, Clone)]
pub struct NetkeibaConfig {
    pub crawler: CrawlerConfig,
    pub site: SiteConfig,
    pub parser: Arc<SchemaParser>,
    /// `Result` for finished races, `Entry` for upcoming ones
    pub source: EntityKind,
    pub history_depth: usize,
}

impl NetkeibaConfig {
    pub fn new(
        crawler: CrawlerConfig,
        site: SiteConfig,
        source: EntityKind,
        history_depth: usize,
    ) -> anyhow::Result<Self> {
        if source == EntityKind::Horse {
            anyhow::bail!("Rows are built from races, not from {source} pages");
        }
        let parser = Arc::new(SchemaParser::new(&site)?);
        Ok(Self {
            crawler,
            site,
            parser,
            source,
            history_depth,
        })
    }

    pub fn loader(&self, kind: EntityKind) -> anyhow::Result<HttpLoader> {
        let fetcher = HttpFetcher::new(&self.crawler)?;
        Ok(EntityLoader::new(kind, &self.site, fetcher, self.parser.clone()))
    }
}

impl RaceScraper for NetkeibaScraper {
    type Config = NetkeibaConfig;

    fn new(config: &NetkeibaConfig) -> anyhow::Result<Self> {
        let races = config.loader(config.source)?;
        let horses = config.loader(EntityKind::Horse)?;
        let header_rows = races.header_rows();
        Ok(RowBuilder::new(races, horses, header_rows, config.history_depth))
    }

    fn scrape_race(&mut self, race_id: &str) -> Result<Vec<Record>, RaceError> {
        self.build_rows(race_id)
    }
}
