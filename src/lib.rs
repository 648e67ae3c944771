//! Resumable crawler for paginated, dynamically rendered film catalog
//! listings.
//!
//! The pipeline partitions the target corpus into independent month
//! slices, progressively expands each slice's visible item window,
//! parses heterogeneous page layouts with per-field fallback chains,
//! deduplicates against a durable ledger, and survives soft blocks and
//! mid-run crashes without losing or duplicating data. Rendering is
//! delegated to an injected page-driver capability; the output is an
//! append-only CSV store consumed by a downstream indexing stage.

pub mod cli;
pub mod config;
pub mod crawl;
pub mod driver;
pub mod extract;
pub mod ledger;
pub mod models;
pub mod sink;
