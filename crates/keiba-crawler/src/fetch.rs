use std::io::prelude::*;

use flate2::read::GzDecoder;
use reqwest::header::CONTENT_TYPE;
use scraper::{Html, Selector};

use crate::config::{CrawlerConfig, Throttle};
use crate::error::FetchError;

/// Retrieves the content of a page once `ready_marker` (a CSS selector) is present.
pub trait PageFetcher {
    fn fetch(&mut self, url: &str, ready_marker: &str) -> Result<String, FetchError>;
}

impl<F: PageFetcher + ?Sized> PageFetcher for Box<F> {
    fn fetch(&mut self, url: &str, ready_marker: &str) -> Result<String, FetchError> {
        (**self).fetch(url, ready_marker)
    }
}

/// Blocking HTTP fetcher, meant to be owned by a single worker.
#[derive(Debug)]
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
    throttle: Option<Throttle>,
}

impl HttpFetcher {
    pub fn new(config: &CrawlerConfig) -> anyhow::Result<Self> {
        let client = reqwest::blocking::ClientBuilder::new()
            .user_agent(&config.user_agent)
            .gzip(true)
            .deflate(true)
            .timeout(config.ready_timeout())
            .build()?;
        Ok(Self {
            client,
            throttle: config.throttle,
        })
    }

    pub fn with_throttle(mut self, throttle: Option<Throttle>) -> Self {
        self.throttle = throttle;
        self
    }
}

impl PageFetcher for HttpFetcher {
    fn fetch(&mut self, url: &str, ready_marker: &str) -> Result<String, FetchError> {
        if let Some(throttle) = &self.throttle {
            throttle.pause();
        }

        log::debug!("GET {url}");
        let navigation = |source| FetchError::Navigation {
            url: url.to_string(),
            source,
        };
        let resp = self.client.get(url).send().map_err(navigation)?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status,
            });
        }

        let gzipped = matches!(
            resp.headers().get(CONTENT_TYPE),
            Some(c) if c == "application/x-gzip" || c == "application/gzip"
        );
        let page = if gzipped {
            let compressed = resp.bytes().map_err(navigation)?;
            let mut gz = GzDecoder::new(&compressed[..]);
            let mut page = String::new();
            gz.read_to_string(&mut page)
                .map_err(|source| FetchError::Decode {
                    url: url.to_string(),
                    source,
                })?;
            page
        } else {
            resp.text().map_err(navigation)?
        };

        ensure_marker(url, &page, ready_marker)?;
        Ok(page)
    }
}

/// Checks that `page` contains an element matching `marker`. An empty marker always passes.
pub fn ensure_marker(url: &str, page: &str, marker: &str) -> Result<(), FetchError> {
    if marker.trim().is_empty() {
        return Ok(());
    }
    let selector =
        Selector::parse(marker).map_err(|_| FetchError::InvalidMarker(marker.to_string()))?;
    if Html::parse_document(page).select(&selector).next().is_some() {
        Ok(())
    } else {
        Err(FetchError::MarkerMissing {
            url: url.to_string(),
            marker: marker.to_string(),
        })
    }
}
