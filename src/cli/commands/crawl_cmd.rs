//! Main crawl command implementation.

use tracing::info;

use crate::config::Settings;
use crate::crawl::{month_slices, SliceScheduler};
use crate::sink::CsvSink;

/// Crawl every slice of the configured year, then run the terminal
/// compaction pass.
pub async fn cmd_crawl(settings: Settings, limit: usize) -> anyhow::Result<()> {
    let mut sink = CsvSink::open(&settings.crawl.out_dir)?;
    info!(
        "Crawling year {} into {}",
        settings.crawl.year,
        settings.crawl.out_dir.display()
    );

    let mut slices = month_slices(settings.crawl.year);
    if limit > 0 {
        slices.truncate(limit);
    }

    let driver = build_driver(&settings)?;
    let mut scheduler = SliceScheduler::new(driver, &settings);
    let summary = scheduler.run(&mut sink, &mut slices).await?;

    let stats = sink.compact()?;

    println!("{}", summary.render());
    if stats.duplicates_removed > 0 {
        println!(
            "  compaction removed {} duplicate rows",
            stats.duplicates_removed
        );
    }
    println!("  total identities: {}", sink.ledger().len());
    Ok(())
}

#[cfg(feature = "browser")]
fn build_driver(settings: &Settings) -> anyhow::Result<Box<dyn crate::driver::PageDriver>> {
    Ok(Box::new(crate::driver::CdpDriver::new(
        settings.driver.clone(),
    )))
}

#[cfg(not(feature = "browser"))]
fn build_driver(_settings: &Settings) -> anyhow::Result<Box<dyn crate::driver::PageDriver>> {
    Err(anyhow::anyhow!(
        "Browser support not compiled. Rebuild with: cargo build --features browser"
    ))
}
