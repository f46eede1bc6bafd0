// rust/ingest-core/src/dataset/labels.rs

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use crate::error::{IngestError, Result};

#[derive(Debug, Default)]
struct Entries {
    names: Vec<String>,
    by_key: HashMap<String, usize>,
}

/// Append-only, case-insensitive label-to-index registry.
///
/// The first spelling seen for a label is the one kept, and indices are
/// handed out in first-seen order. The registry is shared between the
/// dataset and any concurrent decode tasks, so lookups and registrations
/// go through an internal lock.
#[derive(Debug)]
pub struct LabelRegistry {
    entries: RwLock<Entries>,
    capacity: Option<usize>,
}

impl LabelRegistry {
    /// A registry refusing to grow past `capacity` labels.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: RwLock::new(Entries::default()),
            capacity: Some(capacity),
        }
    }

    pub fn unbounded() -> Self {
        Self {
            entries: RwLock::new(Entries::default()),
            capacity: None,
        }
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    /// Returns the index for `text`, registering it if unseen.
    pub fn resolve(&self, text: &str) -> Result<usize> {
        let key = text.trim().to_lowercase();
        if let Some(index) = self.lookup_key(&key) {
            return Ok(index);
        }

        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        // Another writer may have registered it between the two locks.
        if let Some(&index) = entries.by_key.get(&key) {
            return Ok(index);
        }
        if let Some(capacity) = self.capacity {
            if entries.names.len() >= capacity {
                return Err(IngestError::LabelOverflow {
                    label: text.trim().to_string(),
                    capacity,
                });
            }
        }
        let index = entries.names.len();
        entries.names.push(text.trim().to_string());
        entries.by_key.insert(key, index);
        Ok(index)
    }

    pub fn lookup(&self, text: &str) -> Option<usize> {
        self.lookup_key(&text.trim().to_lowercase())
    }

    pub fn label(&self, index: usize) -> Option<String> {
        self.read().names.get(index).cloned()
    }

    pub fn labels(&self) -> Vec<String> {
        self.read().names.clone()
    }

    pub fn len(&self) -> usize {
        self.read().names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lookup_key(&self, key: &str) -> Option<usize> {
        self.read().by_key.get(key).copied()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Entries> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_case_insensitive_first_seen_wins() {
        let registry = LabelRegistry::unbounded();
        assert_eq!(registry.resolve("Cat").unwrap(), 0);
        assert_eq!(registry.resolve("cat").unwrap(), 0);
        assert_eq!(registry.resolve(" CAT ").unwrap(), 0);
        assert_eq!(registry.resolve("dog").unwrap(), 1);
        assert_eq!(registry.labels(), vec!["Cat".to_string(), "dog".to_string()]);
        assert_eq!(registry.lookup("DOG"), Some(1));
        assert_eq!(registry.lookup("bird"), None);
    }

    #[test]
    fn test_capacity_overflow() {
        let registry = LabelRegistry::with_capacity(2);
        registry.resolve("a").unwrap();
        registry.resolve("b").unwrap();
        assert_eq!(registry.resolve("A").unwrap(), 0);
        match registry.resolve("c") {
            Err(IngestError::LabelOverflow { label, capacity }) => {
                assert_eq!(label, "c");
                assert_eq!(capacity, 2);
            }
            other => panic!("expected LabelOverflow, got {other:?}"),
        }
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_concurrent_registration_is_consistent() {
        let registry = Arc::new(LabelRegistry::unbounded());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    let name = if i % 2 == 0 { "even" } else { "ODD" };
                    registry.resolve(name).unwrap()
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(registry.len(), 2);
        assert_ne!(registry.lookup("even"), registry.lookup("odd"));
    }
}
