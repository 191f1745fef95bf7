use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, Context};
use lazy_static::lazy_static;
use regex::Regex;
use scraper::{Html, Selector};

use crate::config::OnError;
use crate::fetch::PageFetcher;
use crate::site::RaceListConfig;

lazy_static! {
    static ref LINKS: Selector = Selector::parse("a[href]").unwrap();
}

/// A calendar month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct YearMonth {
    pub year: i32,
    pub month: u32,
}

impl YearMonth {
    pub fn new(year: i32, month: u32) -> anyhow::Result<Self> {
        if !(1..=12).contains(&month) {
            anyhow::bail!("Invalid month: {month}");
        }
        Ok(Self { year, month })
    }

    pub fn succ(self) -> Self {
        if self.month == 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }

    /// Every month from `self` to `end`, both included.
    pub fn through(self, end: YearMonth) -> impl Iterator<Item = YearMonth> {
        std::iter::successors(Some(self), |ym| Some(ym.succ())).take_while(move |ym| *ym <= end)
    }
}

impl FromStr for YearMonth {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (year, month) = s
            .split_once(['-', '/'])
            .ok_or_else(|| anyhow!("Expected YYYY-MM, got: {s}"))?;
        let year = year.parse().with_context(|| format!("Invalid year in {s}"))?;
        let month = month.parse().with_context(|| format!("Invalid month in {s}"))?;
        Self::new(year, month)
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{:02}", self.year, self.month)
    }
}

/// Extracts race ids from the anchors of a listing page, in page order.
pub fn parse_race_ids(html: &str, race_link: &Regex) -> Vec<String> {
    Html::parse_document(html)
        .select(&LINKS)
        .filter_map(|a| a.value().attr("href"))
        .filter_map(|href| race_link.captures(href))
        .filter_map(|caps| caps.get(1).map(|m| m.as_str().to_string()))
        .collect()
}

/// Pages through the race search listing.
#[derive(Debug)]
pub struct RaceIdDiscovery<F> {
    fetcher: F,
    config: RaceListConfig,
    race_link: Regex,
    on_error: OnError,
}

impl<F> RaceIdDiscovery<F>
where
    F: PageFetcher,
{
    pub fn new(fetcher: F, config: &RaceListConfig, on_error: OnError) -> anyhow::Result<Self> {
        let race_link = Regex::new(&config.race_link)
            .with_context(|| format!("Invalid race link pattern {}", config.race_link))?;
        Ok(Self {
            fetcher,
            config: config.clone(),
            race_link,
            on_error,
        })
    }

    fn race_ids_page(&mut self, year: i32, month: u32, page: usize) -> anyhow::Result<Vec<String>> {
        let url = self.config.url_for(year, month, page);
        match self.fetcher.fetch(&url, &self.config.validator) {
            Ok(html) => Ok(parse_race_ids(&html, &self.race_link)),
            Err(e) => match self.on_error {
                OnError::SkipAndLog => {
                    log::error!("Skipping page {page} of {year}/{month} got: {e}");
                    Ok(vec![])
                }
                OnError::Fail => Err(anyhow!("Couldn't load page {page} of {year}/{month}: {e}")),
            },
        }
    }

    /// All race ids of a month, sorted. Stops at the first page shorter than the page size.
    pub fn race_ids_in_month(&mut self, year: i32, month: u32) -> anyhow::Result<Vec<String>> {
        log::info!("Fetching race IDs for {year}/{month}");
        let mut race_ids = BTreeSet::new();
        for page in 1..=self.config.max_pages {
            let page_ids = self.race_ids_page(year, month, page)?;
            let last_page = page_ids.len() < self.config.page_size;
            race_ids.extend(page_ids);
            if last_page {
                break;
            }
        }
        log::info!("Found {} race IDs for {year}/{month}", race_ids.len());
        Ok(race_ids.into_iter().collect())
    }

    /// All race ids from `start` to `end` months included, sorted and deduplicated.
    pub fn race_ids_in_period(
        &mut self,
        start: YearMonth,
        end: YearMonth,
    ) -> anyhow::Result<Vec<String>> {
        let mut race_ids = BTreeSet::new();
        for ym in start.through(end) {
            race_ids.extend(self.race_ids_in_month(ym.year, ym.month)?);
        }
        Ok(race_ids.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn months_span_years() {
        let start: YearMonth = "2023-11".parse().unwrap();
        let end: YearMonth = "2024/2".parse().unwrap();
        let months = start.through(end).map(|ym| ym.to_string()).collect::<Vec<_>>();
        assert_eq!(months, ["2023-11", "2023-12", "2024-01", "2024-02"]);
    }

    #[test]
    fn empty_range() {
        let start = YearMonth::new(2024, 3).unwrap();
        let end = YearMonth::new(2024, 2).unwrap();
        assert_eq!(start.through(end).count(), 0);
        assert!("2024-13".parse::<YearMonth>().is_err());
    }

    #[test]
    fn race_links_only() {
        let link = Regex::new(r"^/race/(\d{12})/").unwrap();
        let html = r#"
            <a href="/race/202405010811/">東京11R</a>
            <a href="/race/list/20240505/">list</a>
            <a href="/horse/2019105219/">horse</a>
            <a href="/race/202405010812/">東京12R</a>
        "#;
        assert_eq!(parse_race_ids(html, &link), ["202405010811", "202405010812"]);
    }
}
