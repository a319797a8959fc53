use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

use itertools::Itertools;
use log::info;

use crate::resources::paths::normalize_path;
use crate::resources::{ResourceEntry, ResourceError};

/// Every known resource, keyed by its normalized path.
#[derive(Debug, Default)]
pub struct ResourceStore {
    entries: BTreeMap<String, ResourceEntry>,
    /// Last path the previous purge window visited.
    purge_cursor: Option<String>,
}

impl ResourceStore {
    pub fn find(&self, path: &str) -> Option<&ResourceEntry> {
        self.entries.get(&normalize_path(path))
    }

    pub(crate) fn find_mut(&mut self, path: &str) -> Option<&mut ResourceEntry> {
        self.entries.get_mut(&normalize_path(path))
    }

    pub fn contains(&self, path: &str) -> bool {
        self.find(path).is_some()
    }

    /// The first registration of a path wins.
    pub fn add(&mut self, entry: ResourceEntry) -> Result<&mut ResourceEntry, ResourceError> {
        let path = normalize_path(entry.path());
        if self.entries.contains_key(&path) {
            return Err(ResourceError::AlreadyRegistered { path });
        }

        Ok(self.entries.entry(path).or_insert(entry))
    }

    /// Removes without running any cleanup; waiting callbacks are rejected.
    pub fn remove(&mut self, path: &str) -> Option<ResourceEntry> {
        let mut entry = self.entries.remove(&normalize_path(path))?;
        entry.reject_pending(&Arc::new(ResourceError::Purged {
            path: entry.path().to_string(),
        }));
        Some(entry)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResourceEntry> {
        self.entries.values()
    }

    /// Visits at most `limit` entries, continuing where the previous call stopped, and evicts the
    /// settled ones that were inactive for more than `age` frames. Referenced entries and the ones
    /// `is_protected` accepts stay.
    pub fn purge_inactive(
        &mut self,
        current_frame: u64,
        limit: usize,
        age: u64,
        is_protected: impl Fn(&ResourceEntry) -> bool,
        mut on_purge: impl FnMut(&ResourceEntry),
    ) -> Vec<String> {
        let total = self.entries.len();
        if total == 0 || limit == 0 {
            return Vec::new();
        }

        let after_cursor = match &self.purge_cursor {
            Some(last) => self
                .entries
                .range::<str, _>((Bound::Excluded(last.as_str()), Bound::Unbounded)),
            None => self.entries.range::<str, _>(..),
        };
        // Wraps around to the first key, without visiting anything twice.
        let candidates = after_cursor
            .map(|(path, _)| path)
            .chain(self.entries.keys())
            .take(limit.min(total))
            .cloned()
            .collect_vec();
        self.purge_cursor = candidates.last().cloned();

        let mut purged = Vec::new();
        for path in candidates {
            let Some(entry) = self.entries.get(&path) else {
                continue;
            };

            let inactive = current_frame.saturating_sub(entry.last_active_frame()) > age;
            if !entry.is_settled() || entry.ref_count() > 0 || !inactive || is_protected(entry) {
                continue;
            }

            on_purge(entry);
            self.entries.remove(&path);
            info!("Purged {}", path);
            purged.push(path);
        }

        purged
    }

    /// Drops every entry. Pending callbacks are rejected, `on_clear` sees each entry first.
    pub fn clear(&mut self, mut on_clear: impl FnMut(&ResourceEntry)) {
        for (path, mut entry) in std::mem::take(&mut self.entries) {
            entry.reject_pending(&Arc::new(ResourceError::Purged { path }));
            on_clear(&entry);
        }
        self.purge_cursor = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settled(path: &str, frame: u64) -> ResourceEntry {
        let mut entry = ResourceEntry::new(path.to_string(), frame);
        entry.prepare(Arc::new(0u32), frame);
        entry
    }

    #[test]
    fn first_registration_wins() {
        let mut store = ResourceStore::default();
        store.add(settled("res:/a.bin", 0)).unwrap();

        let result = store.add(ResourceEntry::new("RES:/A.bin".to_string(), 0));
        assert!(matches!(result, Err(ResourceError::AlreadyRegistered { .. })));
        assert!(store.find("res:/a.bin").unwrap().is_settled());
    }

    #[test]
    fn purges_only_old_unreferenced_settled_entries() {
        let mut store = ResourceStore::default();
        store.add(settled("res:/old.bin", 0)).unwrap();
        store.add(settled("res:/fresh.bin", 9)).unwrap();
        store.add(ResourceEntry::new("res:/loading.bin".to_string(), 0)).unwrap();
        store.add(settled("res:/held.bin", 0)).unwrap().ref_count = 1;
        store.add(settled("res:/watched.bin", 0)).unwrap();

        let mut cleaned = Vec::new();
        let purged = store.purge_inactive(
            10,
            100,
            5,
            |entry| entry.path() == "res:/watched.bin",
            |entry| cleaned.push(entry.path().to_string()),
        );

        assert_eq!(purged, vec!["res:/old.bin".to_string()]);
        assert_eq!(cleaned, purged);
        assert_eq!(store.len(), 4);
    }

    #[test]
    fn purge_visits_a_bounded_window() {
        let mut store = ResourceStore::default();
        for name in ["a", "b", "c", "d"] {
            store.add(settled(&format!("res:/{name}.bin"), 0)).unwrap();
        }

        let first = store.purge_inactive(100, 2, 1, |_| false, |_| {});
        assert_eq!(first, vec!["res:/a.bin".to_string(), "res:/b.bin".to_string()]);

        let second = store.purge_inactive(100, 2, 1, |_| false, |_| {});
        assert_eq!(second, vec!["res:/c.bin".to_string(), "res:/d.bin".to_string()]);
        assert!(store.is_empty());
    }

    #[test]
    fn purge_window_wraps_without_skipping() {
        let mut store = ResourceStore::default();
        for name in ["a", "b", "c", "d"] {
            store.add(settled(&format!("res:/{name}.bin"), 0)).unwrap().ref_count = 1;
        }

        assert!(store.purge_inactive(100, 3, 1, |_| false, |_| {}).is_empty());

        store.find_mut("res:/a.bin").unwrap().ref_count = 0;
        store.find_mut("res:/b.bin").unwrap().ref_count = 0;
        // d, then around to a.
        let wrapped = store.purge_inactive(100, 2, 1, |_| false, |_| {});
        assert_eq!(wrapped, vec!["res:/a.bin".to_string()]);

        let next = store.purge_inactive(100, 1, 1, |_| false, |_| {});
        assert_eq!(next, vec!["res:/b.bin".to_string()]);
    }

    #[test]
    fn clear_rejects_waiting_callbacks() {
        let mut store = ResourceStore::default();
        let rejected = Arc::new(std::sync::atomic::AtomicBool::new(false));

        let flag = rejected.clone();
        let mut entry = ResourceEntry::new("res:/a.bin".to_string(), 0);
        entry.register_callbacks(
            None,
            Some(Box::new(move |error| {
                assert!(matches!(**error, ResourceError::Purged { .. }));
                flag.store(true, std::sync::atomic::Ordering::SeqCst);
            })),
        );
        store.add(entry).unwrap();

        let mut seen = 0;
        store.clear(|_| seen += 1);
        assert_eq!(seen, 1);
        assert!(store.is_empty());
        assert!(rejected.load(std::sync::atomic::Ordering::SeqCst));
    }
}
