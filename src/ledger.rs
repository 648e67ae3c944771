//! Durable set of already-extracted identities.
//!
//! The ledger is hydrated once at startup from the persisted store and
//! then grows monotonically. It is owned by the persistence sink; all
//! mutation goes through the sink's append path.

use std::collections::HashSet;

/// In-memory view of every identity that has been durably written.
#[derive(Debug, Default)]
pub struct Ledger {
    seen: HashSet<String>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hydrate from the identity column of an existing store.
    pub fn from_identities<I: IntoIterator<Item = String>>(identities: I) -> Self {
        Self {
            seen: identities.into_iter().collect(),
        }
    }

    /// True if the identity has never been durably written.
    pub fn is_new(&self, identity: &str) -> bool {
        !self.seen.contains(identity)
    }

    /// Record an identity as written. Idempotent.
    pub fn mark_seen(&mut self, identity: String) {
        self.seen.insert(identity);
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mark_seen_is_idempotent() {
        let mut ledger = Ledger::new();
        assert!(ledger.is_new("tt0000001"));

        ledger.mark_seen("tt0000001".to_string());
        ledger.mark_seen("tt0000001".to_string());

        assert!(!ledger.is_new("tt0000001"));
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn hydrates_from_identity_column() {
        let ledger =
            Ledger::from_identities(vec!["tt1".to_string(), "tt2".to_string(), "tt1".to_string()]);
        assert_eq!(ledger.len(), 2);
        assert!(!ledger.is_new("tt2"));
        assert!(ledger.is_new("tt3"));
    }
}
