//! Expansion controller: exhaustively reveal the items behind a "load
//! more" affordance within one page window.
//!
//! Absence of the control is the only normal termination condition.
//! Because the source may virtualize its item list, the rendered set
//! after an expansion is not assumed to be a superset of what came
//! before; reconciliation is by identity-set difference against the
//! slice's seen set, never by position.

use tracing::{debug, warn};

use crate::driver::PageDriver;
use crate::extract::LayoutAdapter;
use crate::sink::CsvSink;

use super::slice::Slice;
use super::{pause_between, CrawlError};

/// Counters from one full expansion sequence.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ExpansionOutcome {
    pub rounds: u32,
    /// Records durably appended during expansion.
    pub added: usize,
    /// Records observed but already in the global ledger.
    pub skipped: usize,
    /// Records dropped for lacking an identity.
    pub dropped: usize,
    /// The round ceiling fired with the control still present.
    pub ceiling_hit: bool,
}

/// Drives the click / settle / re-parse / reconcile loop.
pub struct ExpansionController {
    control_selectors: Vec<String>,
    settle_ms: [u64; 2],
    max_rounds: u32,
}

impl ExpansionController {
    pub fn new(control_selectors: Vec<String>, settle_ms: [u64; 2], max_rounds: u32) -> Self {
        Self {
            control_selectors,
            settle_ms,
            max_rounds,
        }
    }

    /// Expand the current window to exhaustion, persisting new records
    /// as each round reveals them. On return the slice's seen set is
    /// the maximal identity set observable at the current offset.
    pub async fn expand(
        &self,
        driver: &mut dyn PageDriver,
        adapter: &LayoutAdapter,
        sink: &mut CsvSink,
        slice: &mut Slice,
    ) -> Result<ExpansionOutcome, CrawlError> {
        let mut outcome = ExpansionOutcome::default();

        while outcome.rounds < self.max_rounds {
            let Some(control) = driver.find_control(&self.control_selectors).await? else {
                debug!(
                    "Window fully expanded after {} rounds in {}",
                    outcome.rounds, slice.label
                );
                return Ok(outcome);
            };

            let mut activated = driver.activate(&control).await?;
            if !activated {
                activated = driver.activate_fallback(&control).await?;
            }
            if !activated {
                warn!(
                    "Expansion control {} would not activate in {}",
                    control.selector, slice.label
                );
                return Ok(outcome);
            }

            pause_between(self.settle_ms).await;

            let content = driver.current_content().await?;
            let parsed = adapter.parse(&content);
            outcome.dropped += parsed.dropped;

            let mut fresh = Vec::new();
            for record in parsed.records {
                if !slice.seen.insert(record.identity.clone()) {
                    continue;
                }
                if sink.is_new(&record.identity) {
                    fresh.push(record);
                } else {
                    outcome.skipped += 1;
                }
            }

            outcome.added += sink.append(&slice.label, &fresh)?;
            outcome.rounds += 1;
        }

        // The ceiling is a safety bound, not an expected exit.
        if driver
            .find_control(&self.control_selectors)
            .await?
            .is_some()
        {
            warn!(
                "Expansion ceiling of {} rounds reached in {} with control still present",
                self.max_rounds, slice.label
            );
            outcome.ceiling_hit = true;
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use async_trait::async_trait;
    use chrono::NaiveDate;

    use crate::driver::Control;

    use super::*;

    /// Window of items that grows with each activation; the control
    /// disappears once the configured activations are spent. Items are
    /// rendered windowed: only the most recent `window` items exist in
    /// the DOM, exercising identity-based reconciliation.
    struct ExpandingDriver {
        total: usize,
        revealed: usize,
        step: usize,
        activations_left: usize,
        window: usize,
    }

    impl ExpandingDriver {
        fn render(&self) -> String {
            let lo = self.revealed.saturating_sub(self.window);
            let items: String = (lo..self.revealed)
                .map(|i| {
                    format!(
                        r#"<li class="ipc-metadata-list-summary-item">
                           <a class="ipc-title-link-wrapper" href="/title/tt{i:07}/">
                           <h3 class="ipc-title__text">{i}. Film {i}</h3></a></li>"#
                    )
                })
                .collect();
            format!("<html><body><ul>{items}</ul></body></html>")
        }
    }

    #[async_trait]
    impl PageDriver for ExpandingDriver {
        async fn navigate(&mut self, _url: &str) -> Result<String> {
            Ok(self.render())
        }

        async fn current_content(&mut self) -> Result<String> {
            Ok(self.render())
        }

        async fn find_control(&mut self, selectors: &[String]) -> Result<Option<Control>> {
            if self.activations_left > 0 && self.revealed < self.total {
                Ok(Some(Control {
                    selector: selectors[0].clone(),
                }))
            } else {
                Ok(None)
            }
        }

        async fn activate(&mut self, _control: &Control) -> Result<bool> {
            self.activations_left -= 1;
            self.revealed = (self.revealed + self.step).min(self.total);
            Ok(true)
        }

        async fn activate_fallback(&mut self, _control: &Control) -> Result<bool> {
            Ok(false)
        }

        async fn restart(&mut self) -> Result<()> {
            Ok(())
        }
    }

    fn controller(max_rounds: u32) -> ExpansionController {
        ExpansionController::new(vec!["button.more".to_string()], [0, 0], max_rounds)
    }

    fn slice() -> Slice {
        Slice::new(
            "2024-01".to_string(),
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
        )
    }

    #[tokio::test]
    async fn terminates_when_control_disappears() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = CsvSink::open(dir.path()).unwrap();
        let adapter = LayoutAdapter::new("https://www.example.com/search/title/");

        let mut driver = ExpandingDriver {
            total: 120,
            revealed: 50,
            step: 50,
            activations_left: 2,
            window: usize::MAX,
        };
        let mut slice = slice();

        // Seed the seen set with the initial window, as the scheduler
        // would have.
        let initial = adapter.parse(&driver.render());
        for record in &initial.records {
            slice.seen.insert(record.identity.clone());
        }
        sink.append(&slice.label, &initial.records).unwrap();

        let outcome = controller(200)
            .expand(&mut driver, &adapter, &mut sink, &mut slice)
            .await
            .unwrap();

        assert_eq!(outcome.rounds, 2);
        assert_eq!(outcome.added, 70);
        assert!(!outcome.ceiling_hit);
        assert_eq!(slice.seen.len(), 120);
        assert_eq!(sink.saved_count("2024-01"), 120);
    }

    #[tokio::test]
    async fn virtualized_windows_reconcile_by_identity() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = CsvSink::open(dir.path()).unwrap();
        let adapter = LayoutAdapter::new("https://www.example.com/search/title/");

        // Only 30 items visible at a time; earlier ones fall out of the
        // DOM as the window advances.
        let mut driver = ExpandingDriver {
            total: 90,
            revealed: 30,
            step: 30,
            activations_left: 2,
            window: 30,
        };
        let mut slice = slice();

        let initial = adapter.parse(&driver.render());
        for record in &initial.records {
            slice.seen.insert(record.identity.clone());
        }
        sink.append(&slice.label, &initial.records).unwrap();

        let outcome = controller(200)
            .expand(&mut driver, &adapter, &mut sink, &mut slice)
            .await
            .unwrap();

        assert_eq!(outcome.added, 60);
        assert_eq!(slice.seen.len(), 90);
    }

    #[tokio::test]
    async fn round_ceiling_is_reported_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = CsvSink::open(dir.path()).unwrap();
        let adapter = LayoutAdapter::new("https://www.example.com/search/title/");

        let mut driver = ExpandingDriver {
            total: 1000,
            revealed: 10,
            step: 10,
            activations_left: 1000,
            window: usize::MAX,
        };
        let mut slice = slice();

        let outcome = controller(3)
            .expand(&mut driver, &adapter, &mut sink, &mut slice)
            .await
            .unwrap();

        assert_eq!(outcome.rounds, 3);
        assert!(outcome.ceiling_hit);
    }
}
