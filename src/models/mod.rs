//! Data models for extracted catalog entries.

mod record;

pub use record::{canonical_url, identity_from_url, ExtractionRecord, CSV_COLUMNS};
