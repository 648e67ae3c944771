//! Append-only CSV persistence sink.
//!
//! The persisted store is one CSV per slice under the output directory,
//! all sharing the fixed column set in [`CSV_COLUMNS`]. The sink owns
//! the process-wide ledger: records reach disk only through `append`,
//! which checks the ledger at append time and marks identities seen
//! against the same successful write, so the ledger and the store never
//! diverge. Any I/O failure here is fatal to the run.

use std::collections::{HashMap, HashSet};
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, WriterBuilder};
use tracing::{debug, info, warn};

use crate::crawl::CrawlError;
use crate::ledger::Ledger;
use crate::models::{ExtractionRecord, CSV_COLUMNS};

/// Result of a compaction pass.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct CompactStats {
    pub files: usize,
    pub duplicates_removed: usize,
}

/// Crash-safe writer over the per-slice CSV files.
pub struct CsvSink {
    out_dir: PathBuf,
    ledger: Ledger,
    counts: HashMap<String, usize>,
}

impl CsvSink {
    /// Open the store, creating the directory if needed and hydrating
    /// the ledger and per-slice counts from whatever is already there.
    pub fn open(out_dir: &Path) -> Result<Self, CrawlError> {
        fs::create_dir_all(out_dir)?;

        let mut sink = Self {
            out_dir: out_dir.to_path_buf(),
            ledger: Ledger::new(),
            counts: HashMap::new(),
        };
        sink.hydrate()?;
        Ok(sink)
    }

    fn hydrate(&mut self) -> Result<(), CrawlError> {
        for label in self.slice_labels()? {
            let (records, malformed) = self.read_slice_lossy(&label)?;
            if malformed > 0 {
                // A crash mid-append tears the trailing row; rewrite the
                // file so the next append starts from a clean line.
                warn!(
                    "Repairing {}: dropping {} malformed row(s)",
                    label, malformed
                );
                self.rewrite_slice(&label, &records)?;
            }
            for record in &records {
                self.ledger.mark_seen(record.identity.clone());
            }
            self.counts.insert(label, records.len());
        }
        if !self.ledger.is_empty() {
            info!(
                "Resume: {} identities already persisted across {} slices",
                self.ledger.len(),
                self.counts.len()
            );
        }
        Ok(())
    }

    fn slice_path(&self, label: &str) -> PathBuf {
        self.out_dir.join(format!("{label}.csv"))
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// True if the identity has never been durably written.
    pub fn is_new(&self, identity: &str) -> bool {
        self.ledger.is_new(identity)
    }

    /// Rows durably stored for one slice.
    pub fn saved_count(&self, label: &str) -> usize {
        self.counts.get(label).copied().unwrap_or(0)
    }

    /// Labels of all slices present in the store, sorted.
    pub fn slice_labels(&self) -> Result<Vec<String>, CrawlError> {
        let mut labels = Vec::new();
        for entry in fs::read_dir(&self.out_dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "csv") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    labels.push(stem.to_string());
                }
            }
        }
        labels.sort();
        Ok(labels)
    }

    /// Read every well-formed row of one slice file. Missing file reads
    /// as empty.
    pub fn read_slice(&self, label: &str) -> Result<Vec<ExtractionRecord>, CrawlError> {
        Ok(self.read_slice_lossy(label)?.0)
    }

    /// Read a slice file, skipping malformed rows instead of failing the
    /// whole read, and report how many were skipped.
    fn read_slice_lossy(
        &self,
        label: &str,
    ) -> Result<(Vec<ExtractionRecord>, usize), CrawlError> {
        let path = self.slice_path(label);
        if !path.exists() {
            return Ok((Vec::new(), 0));
        }

        let mut reader = ReaderBuilder::new().from_path(&path)?;
        let mut records = Vec::new();
        let mut malformed = 0;
        for row in reader.deserialize() {
            match row {
                Ok(record) => records.push(record),
                Err(e) => {
                    debug!("Malformed row in {}: {e}", path.display());
                    malformed += 1;
                }
            }
        }
        Ok((records, malformed))
    }

    /// Durably append records to a slice, skipping any identity already
    /// in the ledger. Rows are flushed before this returns; a crash
    /// right after a successful call loses nothing.
    pub fn append(
        &mut self,
        label: &str,
        records: &[ExtractionRecord],
    ) -> Result<usize, CrawlError> {
        // Filter against the ledger and within the batch itself; one
        // append call may carry the same identity twice.
        let mut in_batch: HashSet<&str> = HashSet::new();
        let fresh: Vec<&ExtractionRecord> = records
            .iter()
            .filter(|r| self.ledger.is_new(&r.identity) && in_batch.insert(&r.identity))
            .collect();
        if fresh.is_empty() {
            return Ok(0);
        }

        let path = self.slice_path(label);
        let write_header = !path.exists();

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let mut writer = WriterBuilder::new().has_headers(false).from_writer(file);

        if write_header {
            writer.write_record(CSV_COLUMNS)?;
        }
        for record in &fresh {
            writer.serialize(record)?;
        }
        writer.flush()?;

        // Only now, with the rows on disk, does the ledger advance.
        for record in &fresh {
            self.ledger.mark_seen(record.identity.clone());
        }
        let written = fresh.len();
        *self.counts.entry(label.to_string()).or_insert(0) += written;

        debug!("Appended {} rows to {}", written, path.display());
        Ok(written)
    }

    /// Rewrite one slice file atomically (temp file then rename).
    fn rewrite_slice(&self, label: &str, records: &[ExtractionRecord]) -> Result<(), CrawlError> {
        let path = self.slice_path(label);
        let tmp = self.out_dir.join(format!("{label}.csv.tmp"));

        let mut writer = WriterBuilder::new().has_headers(false).from_path(&tmp)?;
        writer.write_record(CSV_COLUMNS)?;
        for record in records {
            writer.serialize(record)?;
        }
        writer.flush()?;
        drop(writer);

        fs::rename(&tmp, &path)?;
        Ok(())
    }

    /// Defensive terminal dedup pass over the whole store. The ledger
    /// check before every append is the primary mechanism; this backstop
    /// cleans up anything a crash between runs let slip through.
    pub fn compact(&mut self) -> Result<CompactStats, CrawlError> {
        let mut stats = CompactStats::default();

        for label in self.slice_labels()? {
            let records = self.read_slice(&label)?;
            let original = records.len();

            let mut kept = Vec::with_capacity(original);
            let mut seen = std::collections::HashSet::new();
            for record in records {
                if seen.insert(record.identity.clone()) {
                    kept.push(record);
                }
            }
            let duplicates = original - kept.len();

            if duplicates > 0 {
                info!(
                    "Compacting {}: {} -> {} rows",
                    label,
                    original,
                    kept.len()
                );
                self.rewrite_slice(&label, &kept)?;
                stats.duplicates_removed += duplicates;
            }
            self.counts.insert(label.clone(), kept.len());
            stats.files += 1;
        }

        Ok(stats)
    }

    /// Replace blurbs in one slice file by identity. Used by the
    /// enrichment pass after records are already durably appended.
    pub fn apply_blurbs(
        &mut self,
        label: &str,
        blurbs: &HashMap<String, String>,
    ) -> Result<usize, CrawlError> {
        if blurbs.is_empty() {
            return Ok(0);
        }

        let mut records = self.read_slice(label)?;
        let mut updated = 0;
        for record in &mut records {
            if let Some(blurb) = blurbs.get(&record.identity) {
                record.blurb = blurb.clone();
                updated += 1;
            }
        }

        if updated > 0 {
            self.rewrite_slice(label, &records)?;
        }
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, title: &str) -> ExtractionRecord {
        ExtractionRecord {
            identity: id.to_string(),
            title: title.to_string(),
            url: format!("https://example.com/title/{id}/"),
            rating: "7.0".to_string(),
            vote_count: "100".to_string(),
            duration: "1h 30m".to_string(),
            blurb: String::new(),
        }
    }

    #[test]
    fn append_writes_header_exactly_once() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = CsvSink::open(dir.path()).unwrap();

        sink.append("2024-01", &[record("tt1", "One")]).unwrap();
        sink.append("2024-01", &[record("tt2", "Two")]).unwrap();

        let raw = fs::read_to_string(dir.path().join("2024-01.csv")).unwrap();
        assert_eq!(raw.matches("identity").count(), 1);
        assert_eq!(raw.lines().count(), 3);
    }

    #[test]
    fn append_filters_already_seen_identities() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = CsvSink::open(dir.path()).unwrap();

        let written = sink
            .append("2024-01", &[record("tt1", "One"), record("tt1", "One again")])
            .unwrap();
        assert_eq!(written, 1);

        let written = sink.append("2024-01", &[record("tt1", "One")]).unwrap();
        assert_eq!(written, 0);
        assert_eq!(sink.saved_count("2024-01"), 1);

        // One ledger entry, one row on disk.
        let raw = fs::read_to_string(dir.path().join("2024-01.csv")).unwrap();
        assert_eq!(raw.lines().count(), 2);
    }

    #[test]
    fn hydrate_restores_ledger_and_counts() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut sink = CsvSink::open(dir.path()).unwrap();
            sink.append("2024-01", &[record("tt1", "One"), record("tt2", "Two")])
                .unwrap();
            sink.append("2024-02", &[record("tt3", "Three")]).unwrap();
        }

        let sink = CsvSink::open(dir.path()).unwrap();
        assert_eq!(sink.saved_count("2024-01"), 2);
        assert_eq!(sink.saved_count("2024-02"), 1);
        assert!(!sink.is_new("tt2"));
        assert!(sink.is_new("tt4"));
    }

    #[test]
    fn hydrate_repairs_a_torn_trailing_row() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut sink = CsvSink::open(dir.path()).unwrap();
            sink.append("2024-01", &[record("tt1", "One"), record("tt2", "Two")])
                .unwrap();
        }

        // Simulate a crash that tore the last row mid-write.
        let path = dir.path().join("2024-01.csv");
        let mut raw = fs::read_to_string(&path).unwrap();
        raw.push_str("tt9,Torn,https://exa");
        fs::write(&path, raw).unwrap();

        let mut sink = CsvSink::open(dir.path()).unwrap();
        assert_eq!(sink.saved_count("2024-01"), 2);
        assert!(!sink.is_new("tt2"));
        assert!(sink.is_new("tt9"));

        // The file was repaired, so the next append lands on a clean line.
        sink.append("2024-01", &[record("tt3", "Three")]).unwrap();
        let records = sink.read_slice("2024-01").unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[2].identity, "tt3");
    }

    #[test]
    fn compact_removes_duplicate_identities() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut sink = CsvSink::open(dir.path()).unwrap();
            sink.append("2024-01", &[record("tt1", "One"), record("tt2", "Two")])
                .unwrap();
        }

        // Simulate a crashed run that re-appended an existing row.
        let path = dir.path().join("2024-01.csv");
        let mut raw = fs::read_to_string(&path).unwrap();
        raw.push_str("tt1,One,https://example.com/title/tt1/,7.0,100,1h 30m,\n");
        fs::write(&path, raw).unwrap();

        let mut sink = CsvSink::open(dir.path()).unwrap();
        assert_eq!(sink.saved_count("2024-01"), 3);

        let stats = sink.compact().unwrap();
        assert_eq!(stats.duplicates_removed, 1);
        assert_eq!(sink.saved_count("2024-01"), 2);

        let records = sink.read_slice("2024-01").unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].identity, "tt1");
    }

    #[test]
    fn apply_blurbs_rewrites_matching_rows() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = CsvSink::open(dir.path()).unwrap();
        sink.append("2024-01", &[record("tt1", "One"), record("tt2", "Two")])
            .unwrap();

        let mut blurbs = HashMap::new();
        blurbs.insert("tt2".to_string(), "A proper storyline.".to_string());

        let updated = sink.apply_blurbs("2024-01", &blurbs).unwrap();
        assert_eq!(updated, 1);

        let records = sink.read_slice("2024-01").unwrap();
        assert_eq!(records[1].blurb, "A proper storyline.");
        assert_eq!(records[0].blurb, "");
    }
}
