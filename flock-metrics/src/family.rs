use std::sync::Arc;

use ahash::RandomState;
use dashmap::DashMap;
use parking_lot::RwLock;

/// Metrics of one kind keyed by a label (step name, check name, ...).
///
/// Lookups for existing labels take a shard read lock only. Labels are remembered in first-seen
/// order so reports list them deterministically.
#[derive(Debug)]
pub struct Family<M> {
    members: DashMap<Arc<str>, Arc<M>, RandomState>,
    order: RwLock<Vec<Arc<str>>>,
}

impl<M> Default for Family<M> {
    fn default() -> Self {
        Self {
            members: DashMap::with_hasher(RandomState::new()),
            order: RwLock::new(Vec::new()),
        }
    }
}

impl<M: Default> Family<M> {
    pub fn get_or_register(&self, label: &str) -> Arc<M> {
        if let Some(m) = self.members.get(label) {
            return m.value().clone();
        }

        let key: Arc<str> = Arc::from(label);
        let mut inserted = false;
        let member = self
            .members
            .entry(key.clone())
            .or_insert_with(|| {
                inserted = true;
                Arc::new(M::default())
            })
            .value()
            .clone();

        if inserted {
            self.order.write().push(key);
        }
        member
    }
}

impl<M> Family<M> {
    pub fn get(&self, label: &str) -> Option<Arc<M>> {
        self.members.get(label).map(|m| m.value().clone())
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Members in first-registration order.
    pub fn ordered(&self) -> Vec<(Arc<str>, Arc<M>)> {
        let order = self.order.read();
        order
            .iter()
            .filter_map(|label| self.get(label).map(|m| (label.clone(), m)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Counter;

    #[test]
    fn get_or_register_returns_same_member() {
        let f: Family<Counter> = Family::default();
        f.get_or_register("a").increment(1);
        f.get_or_register("a").increment(2);
        assert_eq!(f.len(), 1);
        assert_eq!(f.get("a").map(|c| c.get()), Some(3));
        assert!(f.get("b").is_none());
    }

    #[test]
    fn ordered_preserves_registration_order() {
        let f: Family<Counter> = Family::default();
        for label in ["z", "a", "m", "a"] {
            f.get_or_register(label);
        }
        let labels: Vec<String> = f.ordered().into_iter().map(|(l, _)| l.to_string()).collect();
        assert_eq!(labels, vec!["z", "a", "m"]);
    }
}
