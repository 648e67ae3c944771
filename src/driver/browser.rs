//! Chromium-backed page driver.
//!
//! Uses chromiumoxide (CDP) with a stealth launch profile. One session
//! at a time; `restart` tears the browser down and relaunches with a
//! fresh context and a freshly rotated user agent, which is what sheds
//! session-keyed soft bans.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::network::SetUserAgentOverrideParams;
use chromiumoxide::cdp::browser_protocol::page::NavigateParams;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use rand::Rng;
use tracing::{debug, info, warn};

use crate::config::DriverConfig;

use super::{Control, PageDriver};

/// JavaScript to wait for page ready state.
const WAIT_FOR_READY_SCRIPT: &str = r#"
    new Promise((resolve) => {
        if (document.readyState === 'complete' || document.readyState === 'interactive') {
            resolve(document.readyState);
        } else {
            document.addEventListener('DOMContentLoaded', () => resolve(document.readyState));
            setTimeout(() => resolve('timeout'), 10000);
        }
    })
"#;

/// Chromium session driving rendered listing pages.
pub struct CdpDriver {
    config: DriverConfig,
    browser: Option<Browser>,
    page: Option<Page>,
}

impl CdpDriver {
    pub fn new(config: DriverConfig) -> Self {
        Self {
            config,
            browser: None,
            page: None,
        }
    }

    /// Launch the browser if not already running.
    async fn ensure_browser(&mut self) -> Result<()> {
        if self.browser.is_some() {
            return Ok(());
        }

        info!("Launching browser (headless={})", self.config.headless);

        let mut builder = BrowserConfig::builder();
        if !self.config.headless {
            // with_head means NOT headless, confusingly
            builder = builder.with_head();
        }

        // Randomized window size so sessions don't share a fingerprint.
        let width = rand::rng().random_range(1200..=1600);
        let height = rand::rng().random_range(800..=1100);

        builder = builder
            .arg(format!("--window-size={},{}", width, height))
            .arg("--lang=en-US")
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-infobars")
            .arg("--disable-dev-shm-usage")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--disable-background-networking")
            .arg("--disable-sync")
            .arg("--disable-translate")
            .arg("--metrics-recording-only")
            .arg("--no-sandbox")
            .arg("--disable-gpu");

        for arg in &self.config.chrome_args {
            builder = builder.arg(arg);
        }

        let config = builder
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build browser config: {}", e))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("Failed to launch browser")?;

        tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if h.is_err() {
                    break;
                }
            }
        });

        self.browser = Some(browser);
        Ok(())
    }

    /// Get or create the session's page.
    async fn page(&mut self) -> Result<&Page> {
        self.ensure_browser().await?;

        if self.page.is_none() {
            let browser = self
                .browser
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("browser not initialized after launch"))?;
            let page = browser.new_page("about:blank").await?;

            // Realistic user agent, rotated per session.
            if let Some(ua) = self.pick_user_agent() {
                page.execute(SetUserAgentOverrideParams::new(ua)).await?;
            }

            self.page = Some(page);
        }

        self.page
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("page not available"))
    }

    fn pick_user_agent(&self) -> Option<String> {
        if self.config.user_agents.is_empty() {
            return None;
        }
        let idx = rand::rng().random_range(0..self.config.user_agents.len());
        Some(self.config.user_agents[idx].clone())
    }

    /// Wait for the page to reach a ready state.
    async fn wait_for_ready(&self, page: &Page) {
        let timeout = Duration::from_secs(self.config.timeout_secs);
        match tokio::time::timeout(timeout, page.evaluate(WAIT_FOR_READY_SCRIPT.to_string())).await
        {
            Ok(Ok(result)) => {
                let state: String = result
                    .into_value()
                    .unwrap_or_else(|_| "unknown".to_string());
                debug!("Page ready state: {}", state);
            }
            Ok(Err(e)) => debug!("Could not check ready state: {}", e),
            Err(_) => warn!("Timeout waiting for page ready state"),
        }
    }
}

#[async_trait]
impl PageDriver for CdpDriver {
    async fn navigate(&mut self, url: &str) -> Result<String> {
        let timeout = Duration::from_secs(self.config.timeout_secs);
        let page = self.page().await?;

        debug!("Navigating to {}", url);
        let nav = NavigateParams::builder()
            .url(url)
            .build()
            .map_err(|e| anyhow::anyhow!("Invalid URL {}: {}", url, e))?;

        tokio::time::timeout(timeout, page.execute(nav))
            .await
            .map_err(|_| anyhow::anyhow!("Navigation timed out for {}", url))?
            .map_err(|e| anyhow::anyhow!("Navigation failed for {}: {}", url, e))?;

        let page = self
            .page
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("page lost during navigation"))?;
        self.wait_for_ready(page).await;

        Ok(page.content().await?)
    }

    async fn current_content(&mut self) -> Result<String> {
        let page = self.page().await?;
        Ok(page.content().await?)
    }

    async fn find_control(&mut self, selectors: &[String]) -> Result<Option<Control>> {
        let page = self.page().await?;
        for selector in selectors {
            if page.find_element(selector.as_str()).await.is_ok() {
                return Ok(Some(Control {
                    selector: selector.clone(),
                }));
            }
        }
        Ok(None)
    }

    async fn activate(&mut self, control: &Control) -> Result<bool> {
        let page = self.page().await?;
        match page.find_element(control.selector.as_str()).await {
            Ok(element) => match element.click().await {
                Ok(_) => Ok(true),
                Err(e) => {
                    debug!("Click failed on {}: {}", control.selector, e);
                    Ok(false)
                }
            },
            Err(_) => Ok(false),
        }
    }

    async fn activate_fallback(&mut self, control: &Control) -> Result<bool> {
        // Some expansion controls are inert icons nested in a button, so
        // the fallback climbs to the nearest clickable ancestor.
        let script = format!(
            r#"(() => {{
                const el = document.querySelector({sel});
                if (!el) return false;
                const target = el.closest('button, a') || el;
                target.click();
                return true;
            }})()"#,
            sel = serde_json::to_string(&control.selector)?,
        );

        let page = self.page().await?;
        match page.evaluate(script).await {
            Ok(result) => Ok(result.into_value::<bool>().unwrap_or(false)),
            Err(e) => {
                debug!("Fallback activation failed on {}: {}", control.selector, e);
                Ok(false)
            }
        }
    }

    async fn restart(&mut self) -> Result<()> {
        info!("Restarting browser session");
        self.page = None;
        self.browser = None;
        self.ensure_browser().await
    }
}
