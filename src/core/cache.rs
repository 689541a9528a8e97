use std::collections::HashMap;

use crate::protocol::{values_equal, PlcValue};

/// Last observed value per variable.
///
/// Entries for variables that are no longer polled are kept; they simply
/// stop being compared against.
#[derive(Debug, Default)]
pub struct ValueCache {
    values: HashMap<String, PlcValue>,
}

impl ValueCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&PlcValue> {
        self.values.get(key)
    }

    /// Store `value` if it differs from the cached one. Returns whether it did.
    pub fn update(&mut self, key: &str, value: &PlcValue) -> bool {
        if values_equal(self.values.get(key), value) {
            return false;
        }
        self.values.insert(key.to_string(), value.clone());
        true
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_reports_changes_only() {
        let mut cache = ValueCache::new();
        assert!(cache.update("a", &PlcValue::from(1)));
        assert!(!cache.update("a", &PlcValue::from(1)));
        assert!(cache.update("a", &PlcValue::from(2)));
        assert_eq!(cache.get("a"), Some(&PlcValue::from(2)));
    }

    #[test]
    fn test_null_is_cached_like_any_value() {
        let mut cache = ValueCache::new();
        assert!(cache.update("a", &PlcValue::Null));
        assert!(!cache.update("a", &PlcValue::Null));
        assert_eq!(cache.len(), 1);
    }
}
