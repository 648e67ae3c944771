//! Per-slice progress report.

use console::style;

use crate::config::Settings;
use crate::sink::CsvSink;

pub fn cmd_status(settings: &Settings) -> anyhow::Result<()> {
    let sink = CsvSink::open(&settings.crawl.out_dir)?;
    let labels = sink.slice_labels()?;

    if labels.is_empty() {
        println!("No persisted slices in {}", settings.crawl.out_dir.display());
        return Ok(());
    }

    println!("{}", style("Persisted slices").bold());
    for label in &labels {
        println!("  {label}: {} records", sink.saved_count(label));
    }
    println!("Total identities: {}", sink.ledger().len());
    Ok(())
}
