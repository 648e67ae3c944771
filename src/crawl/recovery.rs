//! Soft-block detection and bounded recovery.
//!
//! Every page fetch goes through [`fetch_with_recovery`], an explicit
//! attempt loop: fetch, classify, and on a block sleep an escalating
//! interval and restart the driver session before retrying. The restart
//! matters as much as the delay; soft bans are usually keyed to the
//! session identity. At the retry bound the failure is reported upward,
//! where callers treat it as "skip this target", never as a crash.

use std::time::Duration;

use scraper::{Html, Selector};
use tracing::{debug, warn};

use crate::driver::PageDriver;

use super::{pause_between, CrawlError};

/// Classification of one fetched page. Transient; never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockState {
    Ok,
    Blocked,
}

/// Pluggable predicate deciding whether fetched content is a soft
/// block. Kept independent of any specific source's markup so the
/// recovery loop is reusable.
pub trait BlockClassifier: Send + Sync {
    fn classify(&self, content: &str) -> BlockState;
}

/// Default classifier: markers in the document title, or the
/// 403/forbidden pair anywhere in the body text.
pub struct TitleMarkerClassifier {
    markers: Vec<String>,
}

impl TitleMarkerClassifier {
    pub fn new(markers: Vec<String>) -> Self {
        let markers = markers.into_iter().map(|m| m.to_lowercase()).collect();
        Self { markers }
    }
}

impl BlockClassifier for TitleMarkerClassifier {
    fn classify(&self, content: &str) -> BlockState {
        let document = Html::parse_document(content);

        if let Ok(title_sel) = Selector::parse("title") {
            if let Some(title) = document.select(&title_sel).next() {
                let title = title.text().collect::<String>().to_lowercase();
                if self.markers.iter().any(|m| title.contains(m)) {
                    return BlockState::Blocked;
                }
            }
        }

        // Block pages sometimes render with a generic title; the body
        // still names the status.
        if let Ok(body_sel) = Selector::parse("body") {
            if let Some(body) = document.select(&body_sel).next() {
                let body = body.text().collect::<String>().to_lowercase();
                if body.contains("403") && body.contains("forbidden") {
                    return BlockState::Blocked;
                }
            }
        }

        BlockState::Ok
    }
}

/// Bounds and pacing for the recovery loop.
#[derive(Debug, Clone)]
pub struct RecoveryPolicy {
    /// Total fetch attempts before giving up on a target.
    pub max_restarts: u32,
    /// Attempt n sleeps n times this before restarting.
    pub backoff_base: Duration,
    /// Randomized settle interval after each navigation, in ms.
    pub settle_ms: [u64; 2],
}

/// Fetch a URL, dismissing consent banners and recovering from soft
/// blocks. Returns the rendered content, or [`CrawlError::Blocked`]
/// after exactly `max_restarts` attempts.
pub async fn fetch_with_recovery(
    driver: &mut dyn PageDriver,
    url: &str,
    policy: &RecoveryPolicy,
    classifier: &dyn BlockClassifier,
    consent_selectors: &[String],
) -> Result<String, CrawlError> {
    for attempt in 1..=policy.max_restarts {
        driver.navigate(url).await?;
        dismiss_consent(driver, consent_selectors).await;
        pause_between(policy.settle_ms).await;

        let content = driver.current_content().await?;
        if classifier.classify(&content) == BlockState::Ok {
            return Ok(content);
        }

        warn!("Soft block on attempt {attempt} for {url}");
        if attempt < policy.max_restarts {
            let delay = policy.backoff_base * attempt;
            debug!("Backing off {:?} before session restart", delay);
            tokio::time::sleep(delay).await;
            driver.restart().await?;
        }
    }

    Err(CrawlError::Blocked {
        attempts: policy.max_restarts,
    })
}

/// Click through a consent banner if one is present. Best-effort; the
/// crawl proceeds either way.
async fn dismiss_consent(driver: &mut dyn PageDriver, selectors: &[String]) {
    if selectors.is_empty() {
        return;
    }
    match driver.find_control(selectors).await {
        Ok(Some(control)) => {
            debug!("Dismissing consent banner via {}", control.selector);
            if let Err(e) = driver.activate(&control).await {
                debug!("Consent dismissal failed: {e:#}");
            }
        }
        Ok(None) => {}
        Err(e) => debug!("Consent probe failed: {e:#}"),
    }
}
