//! Slice scheduler: drives each slice through fetch, parse, expand,
//! and probe until exhausted.
//!
//! Resume is checkpoint-free: a slice's offset is always derived from
//! how many of its records the store already holds, so an interrupted
//! run costs at most one re-fetch of the last partial page.

use std::collections::HashMap;

use console::style;
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::driver::PageDriver;
use crate::extract::{detail, LayoutAdapter};
use crate::sink::CsvSink;

use super::expand::ExpansionController;
use super::recovery::{fetch_with_recovery, BlockClassifier, RecoveryPolicy, TitleMarkerClassifier};
use super::slice::Slice;
use super::{pause_between, CrawlError};

/// End-of-run accounting. A run always terminates with one of these,
/// even when every slice aborted; partial progress is always a valid,
/// deduplicated store.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub slices_completed: usize,
    pub slices_aborted: usize,
    pub records_added: usize,
    pub records_skipped: usize,
    pub records_dropped: usize,
    pub blurbs_enriched: usize,
    pub expansion_ceiling_hits: usize,
    /// Fetched pages no layout variant recognized. Expected once per
    /// slice at the end-of-data probe; anything beyond that suggests
    /// markup drift.
    pub layout_misses: usize,
}

impl RunSummary {
    /// Human-readable one-screen summary.
    pub fn render(&self) -> String {
        let mut out = format!(
            "{}\n  slices completed: {}\n  slices deferred:  {}\n  records added:    {}\n  records skipped:  {}\n  records dropped:  {}\n  blurbs enriched:  {}",
            style("Crawl finished").green().bold(),
            self.slices_completed,
            self.slices_aborted,
            self.records_added,
            self.records_skipped,
            self.records_dropped,
            self.blurbs_enriched,
        );
        if self.layout_misses > self.slices_completed {
            out.push_str(&format!(
                "\n  {} {} unrecognized page layout(s) beyond the expected end-of-data probes",
                style("warning:").yellow(),
                self.layout_misses - self.slices_completed
            ));
        }
        if self.expansion_ceiling_hits > 0 {
            out.push_str(&format!(
                "\n  {} expansion ceiling hit {} time(s); raise max_expand_rounds if this recurs",
                style("warning:").yellow(),
                self.expansion_ceiling_hits
            ));
        }
        out
    }
}

/// Sequentially drives slices to completion through an injected page
/// driver. Single logical worker; the sink is the only writer.
pub struct SliceScheduler {
    driver: Box<dyn PageDriver>,
    adapter: LayoutAdapter,
    expander: ExpansionController,
    policy: RecoveryPolicy,
    classifier: Box<dyn BlockClassifier>,
    base_url: String,
    page_size: u32,
    throttle_page_ms: [u64; 2],
    throttle_title_ms: [u64; 2],
    enrich_blurbs: bool,
    min_blurb_len: usize,
    consent_selectors: Vec<String>,
}

impl SliceScheduler {
    pub fn new(driver: Box<dyn PageDriver>, settings: &Settings) -> Self {
        let crawl = &settings.crawl;
        Self {
            driver,
            adapter: LayoutAdapter::new(&crawl.base_url),
            expander: ExpansionController::new(
                settings.selectors.expand_controls.clone(),
                crawl.settle_ms,
                crawl.max_expand_rounds,
            ),
            policy: RecoveryPolicy {
                max_restarts: crawl.max_restarts,
                backoff_base: std::time::Duration::from_secs(crawl.backoff_base_secs),
                settle_ms: crawl.settle_ms,
            },
            classifier: Box::new(TitleMarkerClassifier::new(
                settings.selectors.block_markers.clone(),
            )),
            base_url: crawl.base_url.clone(),
            page_size: crawl.page_size,
            throttle_page_ms: crawl.throttle_page_ms,
            throttle_title_ms: crawl.throttle_title_ms,
            enrich_blurbs: crawl.enrich_blurbs,
            min_blurb_len: crawl.min_blurb_len,
            consent_selectors: settings.selectors.consent_banners.clone(),
        }
    }

    /// Run every slice in order, then the optional enrichment pass.
    /// Only store failures end the run early.
    pub async fn run(
        &mut self,
        sink: &mut CsvSink,
        slices: &mut [Slice],
    ) -> Result<RunSummary, CrawlError> {
        let mut summary = RunSummary::default();

        for slice in slices.iter_mut() {
            info!("Slice {} starting", slice.label);
            match self.run_slice(sink, slice, &mut summary).await {
                Ok(()) => summary.slices_completed += 1,
                Err(e) if e.is_slice_local() => {
                    // Deferred, not lost: the next run re-derives this
                    // slice's offset from the store.
                    warn!("Slice {} ended early: {e}", slice.label);
                    summary.slices_aborted += 1;
                    if let Err(restart) = self.driver.restart().await {
                        warn!("Session restart after slice abort failed: {restart:#}");
                    }
                }
                Err(fatal) => return Err(fatal),
            }
        }

        if self.enrich_blurbs {
            self.enrich(sink, &mut summary).await?;
        }

        info!(
            "Run finished: {} slices completed, {} deferred, {} records added",
            summary.slices_completed, summary.slices_aborted, summary.records_added
        );
        Ok(summary)
    }

    /// Drive one slice until a full fetch-and-expand pass yields zero
    /// new records.
    async fn run_slice(
        &mut self,
        sink: &mut CsvSink,
        slice: &mut Slice,
        summary: &mut RunSummary,
    ) -> Result<(), CrawlError> {
        loop {
            let offset = sink.saved_count(&slice.label) + 1;
            let url = slice.page_url(&self.base_url, self.page_size, offset);
            debug!("Fetching {} at offset {offset}", slice.label);

            let content = fetch_with_recovery(
                self.driver.as_mut(),
                &url,
                &self.policy,
                self.classifier.as_ref(),
                &self.consent_selectors,
            )
            .await?;

            let parsed = self.adapter.parse(&content);
            if parsed.layout.is_none() {
                warn!("No recognizable layout at offset {offset} in {}", slice.label);
                summary.layout_misses += 1;
            }
            summary.records_dropped += parsed.dropped;

            let mut fresh = Vec::new();
            for record in parsed.records {
                if !slice.seen.insert(record.identity.clone()) {
                    continue;
                }
                if sink.is_new(&record.identity) {
                    fresh.push(record);
                } else {
                    summary.records_skipped += 1;
                }
            }

            let added = sink.append(&slice.label, &fresh)?;

            let expansion = self
                .expander
                .expand(self.driver.as_mut(), &self.adapter, sink, slice)
                .await?;
            summary.records_added += added + expansion.added;
            summary.records_skipped += expansion.skipped;
            summary.records_dropped += expansion.dropped;
            if expansion.ceiling_hit {
                summary.expansion_ceiling_hits += 1;
            }

            // Completion: a fresh fetch at this offset revealed nothing
            // unseen, immediately or after full expansion.
            if added + expansion.added == 0 {
                info!(
                    "Slice {} complete with {} records",
                    slice.label,
                    sink.saved_count(&slice.label)
                );
                return Ok(());
            }

            pause_between(self.throttle_page_ms).await;
        }
    }

    /// Second-stage pass: fetch the title page of every persisted
    /// record whose blurb is too short, and rewrite the slice files
    /// with what the detail extraction finds. Runs after the crawl so
    /// title navigation never disturbs an open expansion window.
    async fn enrich(
        &mut self,
        sink: &mut CsvSink,
        summary: &mut RunSummary,
    ) -> Result<(), CrawlError> {
        for label in sink.slice_labels()? {
            let records = sink.read_slice(&label)?;
            let mut blurbs: HashMap<String, String> = HashMap::new();

            for record in records
                .iter()
                .filter(|r| r.blurb.len() < self.min_blurb_len)
            {
                let fetched = fetch_with_recovery(
                    self.driver.as_mut(),
                    &record.url,
                    &self.policy,
                    self.classifier.as_ref(),
                    &self.consent_selectors,
                )
                .await;

                match fetched {
                    Ok(html) => {
                        if let Some(blurb) = detail::storyline_from_html(&html, self.min_blurb_len)
                        {
                            blurbs.insert(record.identity.clone(), blurb);
                        }
                    }
                    Err(e) if e.is_slice_local() => {
                        warn!("Skipping enrichment for {}: {e}", record.identity);
                        if let Err(restart) = self.driver.restart().await {
                            warn!("Session restart during enrichment failed: {restart:#}");
                        }
                    }
                    Err(fatal) => return Err(fatal),
                }

                pause_between(self.throttle_title_ms).await;
            }

            summary.blurbs_enriched += sink.apply_blurbs(&label, &blurbs)?;
        }
        Ok(())
    }
}
