use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::config::Throttle;
use crate::loader::EntityKind;

const NETKEIBA: &str = include_str!("netkeiba.yaml");

/// Where pages live and how to read them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteConfig {
    pub entry: EntityConfig,
    pub result: EntityConfig,
    pub horse: EntityConfig,
    pub race_list: RaceListConfig,
    pub schemas: BTreeMap<String, Schema>,
}

impl SiteConfig {
    /// The built-in configuration for db.netkeiba.com and race.netkeiba.com
    pub fn netkeiba() -> anyhow::Result<Self> {
        serde_yaml::from_str(NETKEIBA).context("Invalid built-in site configuration")
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let file = fs_err::File::open(path)
            .with_context(|| format!("Couldn't open site configuration {}", path.display()))?;
        serde_yaml::from_reader(file)
            .with_context(|| format!("Invalid site configuration {}", path.display()))
    }

    pub fn entity(&self, kind: EntityKind) -> &EntityConfig {
        match kind {
            EntityKind::Entry => &self.entry,
            EntityKind::Result => &self.result,
            EntityKind::Horse => &self.horse,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityConfig {
    /// URL template, `{ID}` is replaced by the entity id
    pub url: String,
    /// CSS selector that must be present for the page to be considered loaded
    #[serde(default)]
    pub validator: String,
    /// Schema producing the single primary record
    pub primary: String,
    /// Schema producing the associated list
    pub details: String,
    /// Leading rows of the associated list that are not entities
    #[serde(default)]
    pub header_rows: usize,
}

impl EntityConfig {
    pub fn url_for(&self, id: &str) -> String {
        self.url.replace("{ID}", id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RaceListConfig {
    /// URL template with `{YEAR}`, `{MONTH}`, `{PAGE}` and `{LIMIT}` placeholders
    pub url: String,

    #[serde(default = "default_race_list_validator")]
    pub validator: String,

    #[serde(default = "default_race_link")]
    pub race_link: String,

    #[serde(default = "default_page_size")]
    pub page_size: usize,

    #[serde(default = "default_max_pages")]
    pub max_pages: usize,

    #[serde(default = "default_race_list_throttle")]
    pub throttle: Option<Throttle>,
}

impl RaceListConfig {
    pub fn url_for(&self, year: i32, month: u32, page: usize) -> String {
        self.url
            .replace("{YEAR}", &year.to_string())
            .replace("{MONTH}", &month.to_string())
            .replace("{PAGE}", &page.to_string())
            .replace("{LIMIT}", &self.page_size.to_string())
    }
}

fn default_race_list_validator() -> String {
    String::from("a[href^='/race/']")
}

fn default_race_link() -> String {
    String::from(r"^/race/(\d{12})/")
}

fn default_page_size() -> usize {
    100
}

fn default_max_pages() -> usize {
    20
}

fn default_race_list_throttle() -> Option<Throttle> {
    Some(Throttle::Jitter { min: 1., max: 2. })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Schema {
    /// A single record read from the whole document
    Record {
        #[serde(default, rename = "idField")]
        id_field: Option<String>,
        fields: Vec<FieldSpec>,
    },
    /// One record per element matched by `rows`
    Table { rows: String, fields: Vec<FieldSpec> },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldSpec {
    pub name: String,
    /// Index of the cell among the row's `th, td` elements
    #[serde(default)]
    pub cell: Option<usize>,
    #[serde(default)]
    pub selector: Option<String>,
    /// Read this attribute instead of the text content
    #[serde(default)]
    pub attr: Option<String>,
    /// Regex applied to the extracted value, the first capture group is kept
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub kind: ValueKind,
    /// chrono format of `date` values
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub required: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ValueKind {
    /// Whitespace collapsed text
    #[default]
    Text,
    /// An integer, kept as text when it doesn't parse
    Integer,
    /// A date normalised to `YYYY-MM-DD`, absent when it doesn't parse
    Date,
}
