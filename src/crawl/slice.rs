//! Slice partitioning.
//!
//! A slice is an independently resumable unit of crawl work: one
//! calendar month of the target year, with its own offset cursor and a
//! transient set of identities reconciled within the in-progress
//! window. Slices are visited in the same fixed order every run, which
//! is what makes checkpoint-free resume possible.

use std::collections::HashSet;

use chrono::NaiveDate;

/// One resumable crawl partition.
#[derive(Debug)]
pub struct Slice {
    /// Stable label, also the persisted file stem (e.g. `2024-03`).
    pub label: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    /// Identities reconciled within this run's window, including ones
    /// the global ledger already knew. Distinct from the ledger: it
    /// exists so re-rendered items are not re-counted mid-expansion.
    pub seen: HashSet<String>,
}

impl Slice {
    pub fn new(label: String, start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            label,
            start,
            end,
            seen: HashSet::new(),
        }
    }

    /// Listing URL for this slice at a 1-based offset.
    pub fn page_url(&self, base_url: &str, page_size: u32, offset: usize) -> String {
        format!(
            "{}?title_type=feature&release_date={},{}&sort=moviemeter,asc&count={}&start={}",
            base_url.trim_end_matches('?'),
            self.start,
            self.end,
            page_size,
            offset
        )
    }
}

/// Partition a year into twelve month slices, in calendar order.
pub fn month_slices(year: i32) -> Vec<Slice> {
    (1..=12)
        .filter_map(|month| {
            let start = NaiveDate::from_ymd_opt(year, month, 1)?;
            let next = if month == 12 {
                NaiveDate::from_ymd_opt(year + 1, 1, 1)?
            } else {
                NaiveDate::from_ymd_opt(year, month + 1, 1)?
            };
            let end = next.pred_opt()?;
            Some(Slice::new(format!("{year}-{month:02}"), start, end))
        })
        .collect()
}
