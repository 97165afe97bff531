use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use tokio::sync::{Mutex, MutexGuard};

/// Striped lock table keyed by order id.
///
/// All work for one id is serialized on the same shard, while different ids
/// usually land on different shards and proceed concurrently.
pub struct ShardedLocks {
    shards: Vec<Mutex<()>>,
}

impl ShardedLocks {
    pub const DEFAULT_SHARDS: usize = 64;

    pub fn new(shards: usize) -> Self {
        Self {
            shards: (0..shards.max(1)).map(|_| Mutex::new(())).collect(),
        }
    }

    pub fn shard_for(&self, key: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() % self.shards.len() as u64) as usize
    }

    /// Holds the shard for `key` until the guard is dropped.
    pub async fn lock(&self, key: &str) -> MutexGuard<'_, ()> {
        self.shards[self.shard_for(key)].lock().await
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }
}

impl Default for ShardedLocks {
    fn default() -> Self {
        Self::new(Self::DEFAULT_SHARDS)
    }
}
