use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::LoadError;
use crate::fetch::PageFetcher;
use crate::parse::{Record, RecordParser};
use crate::site::{EntityConfig, SiteConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
#[serde(rename_all = "camelCase")]
pub enum EntityKind {
    /// A race and its entrants before running
    Entry,
    /// A race and its entrants after running
    Result,
    /// A horse profile and its full race history
    Horse,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Entry => write!(f, "entry"),
            Self::Result => write!(f, "result"),
            Self::Horse => write!(f, "horse"),
        }
    }
}

impl FromStr for EntityKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "entry" => Ok(Self::Entry),
            "result" => Ok(Self::Result),
            "horse" => Ok(Self::Horse),
            _ => anyhow::bail!("Unknown entity kind: {s}"),
        }
    }
}

/// A primary record and its associated list, e.g. a race header and its entrants.
#[derive(Debug, Clone, PartialEq)]
pub struct Loaded {
    pub primary: Record,
    pub details: Vec<Record>,
}

pub trait Loader {
    fn load(&mut self, id: &str) -> Result<Loaded, LoadError>;
}

impl<L: Loader + ?Sized> Loader for Box<L> {
    fn load(&mut self, id: &str) -> Result<Loaded, LoadError> {
        (**self).load(id)
    }
}

/// Fetches an entity page and runs its two schemas against the same content.
#[derive(Debug)]
pub struct EntityLoader<F, P> {
    kind: EntityKind,
    config: EntityConfig,
    fetcher: F,
    parser: P,
}

impl<F, P> EntityLoader<F, P>
where
    F: PageFetcher,
    P: RecordParser,
{
    pub fn new(kind: EntityKind, site: &SiteConfig, fetcher: F, parser: P) -> Self {
        Self {
            kind,
            config: site.entity(kind).clone(),
            fetcher,
            parser,
        }
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn url_for(&self, id: &str) -> String {
        self.config.url_for(id)
    }

    pub fn header_rows(&self) -> usize {
        self.config.header_rows
    }
}

impl<F, P> Loader for EntityLoader<F, P>
where
    F: PageFetcher,
    P: RecordParser,
{
    fn load(&mut self, id: &str) -> Result<Loaded, LoadError> {
        let url = self.url_for(id);
        let content = self
            .fetcher
            .fetch(&url, &self.config.validator)
            .map_err(|e| LoadError::new(self.kind, id, e))?;

        let primary = self
            .parser
            .parse(&self.config.primary, &content, id)
            .map_err(|e| LoadError::new(self.kind, id, e))?
            .into_iter()
            .next()
            .unwrap_or_default();
        let details = self
            .parser
            .parse(&self.config.details, &content, id)
            .map_err(|e| LoadError::new(self.kind, id, e))?;

        Ok(Loaded { primary, details })
    }
}
