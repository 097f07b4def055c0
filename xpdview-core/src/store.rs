//! Ordered, append-only exposure stores.
//!
//! Keys keep arrival order, which is acquisition order, never collation
//! order. The only removal allowed is the one-time deletion of the
//! placeholder entry that seeds a viewer before real data exists.

use std::collections::HashMap;

use crate::exposure::{ExposureKey, Image, Pattern};
use crate::{Error, Result};

/// Key to value map that remembers insertion order.
#[derive(Debug, Clone)]
pub struct OrderedStore<V> {
    keys: Vec<ExposureKey>,
    values: HashMap<ExposureKey, V>,
    placeholder: Option<ExposureKey>,
}

/// Detector images by exposure key.
pub type ImageStore = OrderedStore<Image>;

/// Integrated patterns by exposure key.
pub type IntegrationStore = OrderedStore<Pattern>;

impl<V> Default for OrderedStore<V> {
    fn default() -> Self {
        Self {
            keys: Vec::new(),
            values: HashMap::new(),
            placeholder: None,
        }
    }
}

impl<V> OrderedStore<V> {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store seeded with a placeholder entry.
    #[must_use]
    pub fn with_placeholder(key: ExposureKey, value: V) -> Self {
        let mut store = Self::new();
        store.keys.push(key.clone());
        store.values.insert(key.clone(), value);
        store.placeholder = Some(key);
        store
    }

    /// Appends a new entry.
    ///
    /// # Errors
    /// Returns [`Error::DuplicateKey`] if the key is already stored.
    pub fn insert(&mut self, key: ExposureKey, value: V) -> Result<()> {
        if self.values.contains_key(&key) {
            return Err(Error::DuplicateKey(key.to_string()));
        }
        self.keys.push(key.clone());
        self.values.insert(key, value);
        Ok(())
    }

    /// Appends several entries in order, stopping at the first duplicate.
    ///
    /// # Errors
    /// See [`Self::insert`].
    pub fn extend<I>(&mut self, entries: I) -> Result<()>
    where
        I: IntoIterator<Item = (ExposureKey, V)>,
    {
        for (key, value) in entries {
            self.insert(key, value)?;
        }
        Ok(())
    }

    /// Deletes the placeholder entry if it is still present.
    ///
    /// Returns true the one time it actually removes something.
    pub fn remove_placeholder(&mut self) -> bool {
        let Some(key) = self.placeholder.take() else {
            return false;
        };
        self.keys.retain(|k| *k != key);
        self.values.remove(&key);
        true
    }

    /// Returns true while the placeholder is still stored.
    #[must_use]
    pub fn has_placeholder(&self) -> bool {
        self.placeholder.is_some()
    }

    /// Looks up a value by key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&V> {
        self.values.get(key)
    }

    /// Looks up the entry at arrival position `index`.
    #[must_use]
    pub fn get_index(&self, index: usize) -> Option<(&ExposureKey, &V)> {
        let key = self.keys.get(index)?;
        self.values.get(key).map(|value| (key, value))
    }

    /// Returns true if `key` is stored.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Keys in arrival order.
    #[must_use]
    pub fn keys(&self) -> &[ExposureKey] {
        &self.keys
    }

    /// Entries in arrival order.
    pub fn iter(&self) -> impl Iterator<Item = (&ExposureKey, &V)> {
        self.keys
            .iter()
            .filter_map(|key| self.values.get(key).map(|value| (key, value)))
    }

    /// Entries from arrival position `start` onwards.
    pub fn iter_from(&self, start: usize) -> impl Iterator<Item = (&ExposureKey, &V)> {
        self.keys
            .iter()
            .skip(start)
            .filter_map(|key| self.values.get(key).map(|value| (key, value)))
    }

    /// Number of stored entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl IntegrationStore {
    /// Pattern to draw for `key`, or an empty one when it is missing.
    #[must_use]
    pub fn give_plot(&self, key: &str) -> Pattern {
        if let Some(pattern) = self.get(key) {
            pattern.clone()
        } else {
            log::warn!("no integrated data for '{key}', drawing an empty pattern");
            Pattern::empty()
        }
    }

    /// Pattern at arrival position `index`, or an empty one when out of range.
    #[must_use]
    pub fn give_plot_at(&self, index: usize) -> Pattern {
        if let Some((_, pattern)) = self.get_index(index) {
            pattern.clone()
        } else {
            log::warn!(
                "integrated data index {index} out of range ({} stored), drawing an empty pattern",
                self.len()
            );
            Pattern::empty()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exposure::{placeholder_image, PLACEHOLDER_KEY};

    fn pattern(v: f64) -> Pattern {
        Pattern::new(vec![0.0, 1.0], vec![v, v]).unwrap()
    }

    #[test]
    fn test_insert_keeps_arrival_order() {
        let mut store = IntegrationStore::new();
        store.insert("b".into(), pattern(1.0)).unwrap();
        store.insert("a".into(), pattern(2.0)).unwrap();
        store.insert("c".into(), pattern(3.0)).unwrap();
        let keys: Vec<_> = store.keys().iter().map(ExposureKey::as_str).collect();
        assert_eq!(keys, vec!["b", "a", "c"]);
        assert_eq!(store.get_index(1).unwrap().0.as_str(), "a");
    }

    #[test]
    fn test_duplicate_key_rejected() {
        let mut store = IntegrationStore::new();
        store.insert("a".into(), pattern(1.0)).unwrap();
        let err = store.insert("a".into(), pattern(2.0)).unwrap_err();
        assert!(matches!(err, Error::DuplicateKey(key) if key == "a"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_placeholder_removed_once() {
        let mut store =
            ImageStore::with_placeholder(PLACEHOLDER_KEY.into(), placeholder_image(4, 4, 1.0));
        store.insert("frame_0".into(), Image::zeros((4, 4))).unwrap();
        assert!(store.has_placeholder());
        assert!(store.remove_placeholder());
        assert!(!store.remove_placeholder());
        assert_eq!(store.len(), 1);
        assert!(!store.contains(PLACEHOLDER_KEY));
        assert_eq!(store.keys()[0].as_str(), "frame_0");
    }

    #[test]
    fn test_give_plot_recovers_missing_data() {
        let mut store = IntegrationStore::new();
        store.insert("a".into(), pattern(1.0)).unwrap();
        assert_eq!(store.give_plot("a"), pattern(1.0));
        assert!(store.give_plot("missing").is_empty());
        assert!(store.give_plot_at(5).is_empty());
        assert_eq!(store.give_plot_at(0), pattern(1.0));
    }

    #[test]
    fn test_iter_from_skips_prefix() {
        let mut store = IntegrationStore::new();
        for (i, key) in ["a", "b", "c"].into_iter().enumerate() {
            store.insert(key.into(), pattern(f64::from(u8::try_from(i).unwrap()))).unwrap();
        }
        let tail: Vec<_> = store.iter_from(1).map(|(k, _)| k.as_str()).collect();
        assert_eq!(tail, vec!["b", "c"]);
    }
}
