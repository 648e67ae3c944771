//! The crawl pipeline: block recovery, window expansion, slice
//! scheduling.

pub mod expand;
pub mod recovery;
pub mod scheduler;
pub mod slice;

use std::time::Duration;

use rand::Rng;
use thiserror::Error;

pub use expand::{ExpansionController, ExpansionOutcome};
pub use recovery::{BlockClassifier, BlockState, RecoveryPolicy, TitleMarkerClassifier};
pub use scheduler::{RunSummary, SliceScheduler};
pub use slice::{month_slices, Slice};

/// Pipeline errors. Only the store variants are fatal to a run; blocked
/// and driver failures are absorbed at the slice boundary.
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("blocked after {attempts} attempts")]
    Blocked { attempts: u32 },
    #[error("page driver failure: {0}")]
    Driver(String),
    #[error("store I/O failure: {0}")]
    Io(#[from] std::io::Error),
    #[error("store encoding failure: {0}")]
    Csv(#[from] csv::Error),
}

impl From<anyhow::Error> for CrawlError {
    fn from(err: anyhow::Error) -> Self {
        CrawlError::Driver(format!("{err:#}"))
    }
}

impl CrawlError {
    /// True for failures the scheduler absorbs by ending the current
    /// slice early instead of ending the run.
    pub fn is_slice_local(&self) -> bool {
        matches!(self, CrawlError::Blocked { .. } | CrawlError::Driver(_))
    }
}

/// Sleep a randomized interval from an inclusive millisecond range.
/// Models rendering and human pacing lag without fixed timing
/// assumptions; `[0, 0]` skips the sleep entirely.
pub(crate) async fn pause_between(range: [u64; 2]) {
    let [lo, hi] = range;
    let ms = if hi > lo {
        rand::rng().random_range(lo..=hi)
    } else {
        lo
    };
    if ms > 0 {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }
}
