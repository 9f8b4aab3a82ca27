use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::types::Component;

/// Resolved components keyed by canonical path.
///
/// Clones share storage, so one cache can back several resolvers.
#[derive(Debug, Clone, Default)]
pub struct ComponentCache {
    inner: Arc<Mutex<HashMap<PathBuf, Arc<Component>>>>,
}

impl ComponentCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &Path) -> Option<Arc<Component>> {
        self.inner.lock().ok()?.get(key).cloned()
    }

    pub fn insert(&self, key: PathBuf, component: Arc<Component>) {
        if let Ok(mut map) = self.inner.lock() {
            map.insert(key, component);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        if let Ok(mut map) = self.inner.lock() {
            map.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_entries() {
        let cache = ComponentCache::new();
        let other = cache.clone();
        let component = Component {
            name: "c".into(),
            r#type: None,
            version: None,
            description: None,
            variables: Default::default(),
            imports: Vec::new(),
            captures: Default::default(),
            exports: None,
            steps: Vec::new(),
            groups: Vec::new(),
        };
        cache.insert(PathBuf::from("a.yml"), Arc::new(component));
        assert_eq!(other.len(), 1);
        assert!(other.get(Path::new("a.yml")).is_some());
        other.clear();
        assert!(cache.is_empty());
    }
}
