//! Offline dedup pass over the persisted store.

use crate::config::Settings;
use crate::sink::CsvSink;

pub fn cmd_compact(settings: &Settings) -> anyhow::Result<()> {
    let mut sink = CsvSink::open(&settings.crawl.out_dir)?;
    let stats = sink.compact()?;

    println!(
        "Compacted {} slice files, removed {} duplicate rows",
        stats.files, stats.duplicates_removed
    );
    println!("Total identities: {}", sink.ledger().len());
    Ok(())
}
