use std::collections::HashMap;
use std::sync::Arc;

use bustle::*;
use parking_lot::RwLock;

use super::Key;

#[derive(Clone)]
pub struct RwLockStdHashMapTable(Arc<RwLock<HashMap<Key, u32>>>);

impl Collection for RwLockStdHashMapTable {
    type Handle = Self;

    fn with_capacity(capacity: usize) -> Self {
        Self(Arc::new(RwLock::new(HashMap::with_capacity(capacity))))
    }

    fn pin(&self) -> Self::Handle {
        self.clone()
    }
}

impl CollectionHandle for RwLockStdHashMapTable {
    type Key = Key;

    fn get(&mut self, key: &Self::Key) -> bool {
        self.0.read().contains_key(key)
    }

    fn insert(&mut self, key: &Self::Key) -> bool {
        let mut map = self.0.write();
        if map.contains_key(key) {
            return false;
        }

        map.insert(key.clone(), 0);
        true
    }

    fn remove(&mut self, _: &Self::Key) -> bool {
        false
    }

    fn update(&mut self, key: &Self::Key) -> bool {
        self.0.read().contains_key(key)
    }
}
