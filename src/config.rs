//! Configuration management.
//!
//! Settings load from a TOML file (`cinecrawl.toml` by default) with
//! every field defaulted, so an empty or absent file yields a working
//! configuration.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Default config file name, discovered in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "cinecrawl.toml";

/// Top-level settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub crawl: CrawlConfig,
    pub driver: DriverConfig,
    pub selectors: SelectorConfig,
}

/// Crawl pipeline tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlConfig {
    /// Search endpoint the listing pages hang off.
    pub base_url: String,
    /// Release year the corpus is partitioned over (one slice per month).
    pub year: i32,
    /// Page size granted per fetch; also the offset stride.
    pub page_size: u32,
    /// Output directory for the persisted store (one CSV per slice).
    pub out_dir: PathBuf,
    /// Bounded retry count for blocked fetches.
    pub max_restarts: u32,
    /// Base backoff in seconds; attempt n sleeps n times this.
    pub backoff_base_secs: u64,
    /// Randomized settle interval after navigation/expansion, in ms.
    pub settle_ms: [u64; 2],
    /// Randomized pause between result pages, in ms.
    pub throttle_page_ms: [u64; 2],
    /// Randomized pause between title-page fetches, in ms.
    pub throttle_title_ms: [u64; 2],
    /// Safety ceiling on expansion rounds per page window.
    pub max_expand_rounds: u32,
    /// Fetch each new record's title page for a fuller blurb.
    pub enrich_blurbs: bool,
    /// Minimum useful blurb length; shorter values are re-extracted
    /// during enrichment.
    pub min_blurb_len: usize,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.imdb.com/search/title/".to_string(),
            year: 2024,
            page_size: 50,
            out_dir: PathBuf::from("data"),
            max_restarts: 3,
            backoff_base_secs: 60,
            settle_ms: [1_500, 3_000],
            throttle_page_ms: [6_000, 10_000],
            throttle_title_ms: [3_000, 6_000],
            max_expand_rounds: 200,
            enrich_blurbs: false,
            min_blurb_len: 20,
        }
    }
}

/// Browser session settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    pub headless: bool,
    /// Navigation timeout in seconds.
    pub timeout_secs: u64,
    /// User agents rotated across sessions.
    pub user_agents: Vec<String>,
    /// Extra Chrome arguments appended to the stealth set.
    pub chrome_args: Vec<String>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            headless: true,
            timeout_secs: 30,
            user_agents: vec![
                "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36".to_string(),
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/125.0.0.0 Safari/537.36".to_string(),
                "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36".to_string(),
            ],
            chrome_args: Vec::new(),
        }
    }
}

/// Selector sets the pipeline probes for. Ordered: earlier entries are
/// tried first.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    /// "Load more" affordance within a page window.
    pub expand_controls: Vec<String>,
    /// Consent banner accept buttons, dismissed best-effort.
    pub consent_banners: Vec<String>,
    /// Markers in the document title that classify a soft block.
    pub block_markers: Vec<String>,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            expand_controls: vec![
                "button.ipc-see-more__button".to_string(),
                "svg.ipc-icon--expand-more".to_string(),
            ],
            consent_banners: vec![
                "[data-testid=\"consent-banner-accept\"]".to_string(),
                "#onetrust-accept-btn-handler".to_string(),
                "button[aria-label*=\"Accept\"]".to_string(),
            ],
            block_markers: vec!["403".to_string(), "forbidden".to_string()],
        }
    }
}

impl Settings {
    /// Load settings from an explicit path, or from the default file if
    /// present, or defaults otherwise.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let candidate = match path {
            Some(p) => Some(p.to_path_buf()),
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG_FILE);
                default.exists().then_some(default)
            }
        };

        match candidate {
            Some(p) => {
                let raw = fs::read_to_string(&p)
                    .map_err(|e| anyhow::anyhow!("cannot read config {}: {}", p.display(), e))?;
                let settings = toml::from_str(&raw)
                    .map_err(|e| anyhow::anyhow!("invalid config {}: {}", p.display(), e))?;
                Ok(settings)
            }
            None => Ok(Self::default()),
        }
    }
}
