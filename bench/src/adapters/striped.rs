use std::sync::Arc;

use bustle::*;
use striped_htable::Table;

use super::Key;

#[derive(Clone)]
pub struct StripedTable(Arc<Table<u32>>);

impl Collection for StripedTable {
    type Handle = Self;

    fn with_capacity(capacity: usize) -> Self {
        Self(Arc::new(Table::new(capacity, true)))
    }

    fn pin(&self) -> Self::Handle {
        self.clone()
    }
}

impl CollectionHandle for StripedTable {
    type Key = Key;

    fn get(&mut self, key: &Self::Key) -> bool {
        self.0.contains_key(key.as_str())
    }

    fn insert(&mut self, key: &Self::Key) -> bool {
        self.0.insert(key.as_str(), 0).is_ok()
    }

    // Entries cannot be removed.
    fn remove(&mut self, _: &Self::Key) -> bool {
        false
    }

    fn update(&mut self, key: &Self::Key) -> bool {
        self.0.contains_key(key.as_str())
    }
}
