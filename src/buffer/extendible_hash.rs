use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::common::BUCKET_SIZE;

struct Bucket<K, V> {
    local_depth: usize,
    items: HashMap<K, V>,
}

struct Directory<K, V> {
    global_depth: usize,
    /// 2^global_depth slots; several slots may share one bucket
    slots: Vec<Arc<Mutex<Bucket<K, V>>>>,
    num_buckets: usize,
}

/// Extendible hashing directory.
///
/// Buckets split independently when they overflow; the directory doubles when
/// a splitting bucket's local depth reaches the global depth. The directory
/// never shrinks.
///
/// Locking: the directory lock guards `global_depth`, the slot table and the
/// bucket count; each bucket has its own lock over its entries. Lookups take
/// the directory lock only long enough to resolve the slot. An overflowing
/// insert drops the bucket lock, then re-locates the bucket under the
/// directory lock to split it, and retries; the re-check covers the window
/// in which another thread may have split the same bucket.
pub struct ExtendibleHashTable<K, V> {
    bucket_volume: usize,
    dir: Mutex<Directory<K, V>>,
}

impl<K, V> Default for ExtendibleHashTable<K, V>
where
    K: Hash + Eq + Clone,
    V: Copy,
{
    fn default() -> Self {
        Self::new(BUCKET_SIZE)
    }
}

impl<K, V> ExtendibleHashTable<K, V>
where
    K: Hash + Eq + Clone,
    V: Copy,
{
    pub fn new(bucket_volume: usize) -> Self {
        assert!(bucket_volume > 0);
        let first = Arc::new(Mutex::new(Bucket {
            local_depth: 0,
            items: HashMap::new(),
        }));
        Self {
            bucket_volume,
            dir: Mutex::new(Directory {
                global_depth: 0,
                slots: vec![first],
                num_buckets: 1,
            }),
        }
    }

    fn hash_key(key: &K) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        hasher.finish() as usize
    }

    /// Resolves the bucket currently responsible for `key`.
    fn locate(&self, key: &K) -> Arc<Mutex<Bucket<K, V>>> {
        let dir = self.dir.lock();
        let slot = Self::hash_key(key) & ((1 << dir.global_depth) - 1);
        Arc::clone(&dir.slots[slot])
    }

    pub fn find(&self, key: &K) -> Option<V> {
        let bucket = self.locate(key);
        let guard = bucket.lock();
        guard.items.get(key).copied()
    }

    pub fn remove(&self, key: &K) -> bool {
        let bucket = self.locate(key);
        let mut guard = bucket.lock();
        guard.items.remove(key).is_some()
    }

    /// Inserts or overwrites the entry for `key`, splitting the target bucket
    /// (and doubling the directory) as many times as it takes to make room.
    pub fn insert(&self, key: K, value: V) {
        loop {
            let bucket = self.locate(&key);
            {
                let mut guard = bucket.lock();
                if guard.items.contains_key(&key) || guard.items.len() < self.bucket_volume {
                    guard.items.insert(key, value);
                    return;
                }
            }
            // Overflow: give up the bucket lock before touching the
            // directory, then retry the insert from scratch.
            self.split(&key);
        }
    }

    fn split(&self, key: &K) {
        let mut dir = self.dir.lock();
        let slot = Self::hash_key(key) & ((1 << dir.global_depth) - 1);
        let bucket = Arc::clone(&dir.slots[slot]);
        let mut guard = bucket.lock();

        // Another thread may have split this bucket while we waited.
        if guard.items.len() < self.bucket_volume {
            return;
        }

        let old_depth = guard.local_depth;
        if old_depth == dir.global_depth {
            let doubled: Vec<_> = dir.slots.clone();
            dir.slots.extend(doubled);
            dir.global_depth += 1;
        }

        let split_bit = 1 << old_depth;
        guard.local_depth = old_depth + 1;

        let mut moved = HashMap::new();
        guard.items.retain(|k, v| {
            if Self::hash_key(k) & split_bit != 0 {
                moved.insert(k.clone(), *v);
                false
            } else {
                true
            }
        });

        let sibling = Arc::new(Mutex::new(Bucket {
            local_depth: old_depth + 1,
            items: moved,
        }));
        for (i, entry) in dir.slots.iter_mut().enumerate() {
            if Arc::ptr_eq(entry, &bucket) && i & split_bit != 0 {
                *entry = Arc::clone(&sibling);
            }
        }
        dir.num_buckets += 1;
    }

    pub fn global_depth(&self) -> usize {
        self.dir.lock().global_depth
    }

    /// Local depth of the bucket behind directory slot `bucket_id`.
    /// Returns None for out-of-range slots and for empty buckets.
    pub fn local_depth(&self, bucket_id: usize) -> Option<usize> {
        let bucket = {
            let dir = self.dir.lock();
            Arc::clone(dir.slots.get(bucket_id)?)
        };
        let guard = bucket.lock();
        if guard.items.is_empty() {
            None
        } else {
            Some(guard.local_depth)
        }
    }

    pub fn num_buckets(&self) -> usize {
        self.dir.lock().num_buckets
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_returns_last_inserted() {
        let table: ExtendibleHashTable<u32, u32> = ExtendibleHashTable::new(4);
        table.insert(1, 10);
        table.insert(1, 20);
        assert_eq!(table.find(&1), Some(20));
        assert_eq!(table.find(&2), None);
    }

    #[test]
    fn remove_semantics() {
        let table: ExtendibleHashTable<u32, u32> = ExtendibleHashTable::new(4);
        table.insert(5, 50);
        assert!(table.remove(&5));
        assert!(!table.remove(&5));
        assert_eq!(table.find(&5), None);
    }

    #[test]
    fn splits_keep_every_key_findable() {
        let table: ExtendibleHashTable<u32, u32> = ExtendibleHashTable::new(2);
        for k in 0..64 {
            table.insert(k, k * 10);
        }
        for k in 0..64 {
            assert_eq!(table.find(&k), Some(k * 10), "key {k}");
        }
        assert!(table.num_buckets() >= 4);
        assert!(table.global_depth() >= 2);
    }

    #[test]
    fn no_split_below_volume() {
        let table: ExtendibleHashTable<u32, u32> = ExtendibleHashTable::new(64);
        for k in 0..32 {
            table.insert(k, k);
        }
        assert_eq!(table.global_depth(), 0);
        assert_eq!(table.num_buckets(), 1);
    }

    #[test]
    fn local_depth_of_empty_bucket_is_absent() {
        let table: ExtendibleHashTable<u32, u32> = ExtendibleHashTable::new(4);
        assert_eq!(table.local_depth(0), None);
        table.insert(1, 1);
        assert_eq!(table.local_depth(0), Some(0));
        assert_eq!(table.local_depth(99), None);
    }

    #[test]
    fn local_depth_never_exceeds_global_depth() {
        let table: ExtendibleHashTable<u32, u32> = ExtendibleHashTable::new(2);
        for k in 0..128 {
            table.insert(k, k);
        }
        let gd = table.global_depth();
        for slot in 0..(1usize << gd) {
            if let Some(ld) = table.local_depth(slot) {
                assert!(ld <= gd);
            }
        }
    }

    #[test]
    fn concurrent_inserts() {
        use std::sync::Arc;
        let table: Arc<ExtendibleHashTable<u32, u32>> = Arc::new(ExtendibleHashTable::new(2));
        let mut handles = Vec::new();
        for t in 0..4u32 {
            let table = Arc::clone(&table);
            handles.push(std::thread::spawn(move || {
                for k in (t * 100)..(t * 100 + 100) {
                    table.insert(k, k + 1);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        for k in 0..400 {
            assert_eq!(table.find(&k), Some(k + 1), "key {k}");
        }
    }
}
