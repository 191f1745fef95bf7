use std::cmp;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlerConfig {
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default = "default_throttle")]
    pub throttle: Option<Throttle>,

    /// Seconds to wait for a page and its ready marker
    #[serde(default = "default_ready_timeout")]
    pub ready_timeout: f32,

    #[serde(default = "default_num_workers")]
    pub num_workers: usize,

    #[serde(default = "default_on_fetch_error")]
    pub on_fetch_error: OnError,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            throttle: default_throttle(),
            ready_timeout: default_ready_timeout(),
            num_workers: default_num_workers(),
            on_fetch_error: default_on_fetch_error(),
        }
    }
}

impl CrawlerConfig {
    pub fn ready_timeout(&self) -> Duration {
        Duration::from_secs_f32(self.ready_timeout.max(0.))
    }
}

fn default_user_agent() -> String {
    String::from("Mozilla/5.0 (X11; Linux x86_64; rv:109.0) Gecko/20100101 Firefox/115.0")
}

fn default_throttle() -> Option<Throttle> {
    Some(Throttle::Jitter { min: 2., max: 3. })
}

fn default_ready_timeout() -> f32 {
    10.
}

fn default_num_workers() -> usize {
    cmp::max(1, num_cpus::get().saturating_sub(2))
}

fn default_on_fetch_error() -> OnError {
    OnError::SkipAndLog
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum OnError {
    Fail,
    SkipAndLog,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Throttle {
    /// The delay in seconds before each request
    Delay(f32),
    /// A delay drawn uniformly between `min` and `max` seconds before each request
    Jitter { min: f32, max: f32 },
}

impl Default for Throttle {
    fn default() -> Self {
        Self::Jitter { min: 2., max: 3. }
    }
}
