//! # Pending detection entries.
//!
//! An [`Entry`] is one caller waiting for a matching result: its input
//! filter, response sink, hidden flag, and whether it originated from an
//! active request. Entries live in the detector's [`EntryTable`] until their
//! sink becomes unreceivable.
//!
//! ## Rules
//! - The table supports concurrent append and scan; a short mutex section
//!   guards the backing vec, never held across an await point.
//! - Removal is **lazy**: a closed entry is dropped during the next firing
//!   scan, not synchronously when its receiver is dropped. The staleness
//!   window is bounded by the firing rate of the owning detector's trials and
//!   costs at most one wasted evaluation per stale entry.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;

use crate::listen::SourceId;

/// One pending caller registration.
pub(crate) struct Entry<T, R> {
    pub is_request: bool,
    pub input: Option<T>,
    /// Affinity filter: `Some` pins the entry to firings of one basis.
    pub basis: Option<SourceId>,
    pub hidden: bool,
    responses: mpsc::UnboundedSender<Option<R>>,
}

impl<T, R> Entry<T, R> {
    pub fn new(
        is_request: bool,
        input: Option<T>,
        basis: Option<SourceId>,
        hidden: bool,
        responses: mpsc::UnboundedSender<Option<R>>,
    ) -> Self {
        Self {
            is_request,
            input,
            basis,
            hidden,
            responses,
        }
    }

    /// Delivers one response; `None` is the no-match marker. Delivery to a
    /// closed sink is silently dropped (the entry is pruned on the next scan).
    pub fn respond(&self, value: Option<R>) {
        let _ = self.responses.send(value);
    }

    /// True once the caller dropped its receiving side.
    pub fn is_closed(&self) -> bool {
        self.responses.is_closed()
    }

    /// Whether this entry accepts firings from the given basis.
    pub fn accepts(&self, basis: SourceId) -> bool {
        self.basis.map_or(true, |pinned| pinned == basis)
    }
}

/// Result of one firing scan.
pub(crate) struct Scan<T, R> {
    /// The table was empty after pruning: the firing takes the ambient path.
    pub ambient: bool,
    /// Open entries whose affinity matches the firing's trial.
    pub matching: Vec<Arc<Entry<T, R>>>,
}

/// Concurrent table of pending entries.
pub(crate) struct EntryTable<T, R> {
    entries: Mutex<Vec<Arc<Entry<T, R>>>>,
}

impl<T, R> EntryTable<T, R> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
        }
    }

    pub fn insert(&self, entry: Entry<T, R>) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(entry));
    }

    /// Scan-with-prune for one firing: drops entries whose sink closed since
    /// the last scan, then snapshots the ones matching `basis`.
    pub fn scan(&self, basis: SourceId) -> Scan<T, R> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.retain(|entry| !entry.is_closed());
        Scan {
            ambient: entries.is_empty(),
            matching: entries
                .iter()
                .filter(|entry| entry.accepts(basis))
                .cloned()
                .collect(),
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listen::Listenable;

    fn table_with(
        basis: Option<SourceId>,
    ) -> (EntryTable<u32, u32>, mpsc::UnboundedReceiver<Option<u32>>) {
        let table = EntryTable::new();
        let (tx, rx) = mpsc::unbounded_channel();
        table.insert(Entry::new(false, None, basis, false, tx));
        (table, rx)
    }

    #[test]
    fn test_scan_prunes_closed_entries_lazily() {
        let signals: Listenable<u32> = Listenable::new(1);
        let (table, rx) = table_with(None);
        assert_eq!(table.len(), 1);

        drop(rx);
        // Still present until the next scan observes the closed sink.
        assert_eq!(table.len(), 1);

        let scan = table.scan(signals.id());
        assert!(scan.ambient);
        assert!(scan.matching.is_empty());
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn test_scan_filters_by_basis_affinity() {
        let ours: Listenable<u32> = Listenable::new(1);
        let theirs: Listenable<u32> = Listenable::new(1);
        let (table, _rx) = table_with(Some(ours.id()));

        let scan = table.scan(theirs.id());
        assert!(!scan.ambient);
        assert!(scan.matching.is_empty());

        let scan = table.scan(ours.id());
        assert_eq!(scan.matching.len(), 1);
    }
}
