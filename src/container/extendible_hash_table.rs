use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use parking_lot::Mutex;

/// A bounded bag of key/value pairs with a local depth.
#[derive(Debug)]
struct Bucket<K, V> {
    depth: usize,
    items: Vec<(K, V)>,
}

impl<K: Eq, V> Bucket<K, V> {
    fn new(capacity: usize, depth: usize) -> Self {
        Self {
            depth,
            items: Vec::with_capacity(capacity),
        }
    }

    fn find(&self, key: &K) -> Option<&V> {
        self.items.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    fn remove(&mut self, key: &K) -> bool {
        if let Some(pos) = self.items.iter().position(|(k, _)| k == key) {
            self.items.remove(pos);
            true
        } else {
            false
        }
    }

    /// Inserts or overwrites. Returns false iff the bucket is full and the
    /// key is not already present.
    fn insert(&mut self, key: K, value: V, capacity: usize) -> bool {
        if let Some(pair) = self.items.iter_mut().find(|(k, _)| *k == key) {
            pair.1 = value;
            return true;
        }
        if self.items.len() >= capacity {
            return false;
        }
        self.items.push((key, value));
        true
    }
}

struct Directory<K, V> {
    global_depth: usize,
    /// Directory entries are indices into `buckets`. An entry at index `i`
    /// refers to the bucket whose hashes match `i` in the low `depth` bits,
    /// so `2^(global_depth - depth)` entries alias each bucket.
    dir: Vec<usize>,
    buckets: Vec<Bucket<K, V>>,
}

/// A thread-safe extendible hash table.
///
/// The directory starts with a single bucket at global depth 0 and doubles
/// whenever a full bucket at maximal local depth must split. All operations
/// serialize on one mutex; the buffer pool uses an instance of this table as
/// its page table (page id -> frame id) and additionally serializes accesses
/// under its own latch.
pub struct ExtendibleHashTable<K, V> {
    bucket_size: usize,
    inner: Mutex<Directory<K, V>>,
}

impl<K, V> ExtendibleHashTable<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    /// Creates a table whose buckets hold at most `bucket_size` pairs.
    pub fn new(bucket_size: usize) -> Self {
        assert!(bucket_size > 0, "bucket size must be positive");
        Self {
            bucket_size,
            inner: Mutex::new(Directory {
                global_depth: 0,
                dir: vec![0],
                buckets: vec![Bucket::new(bucket_size, 0)],
            }),
        }
    }

    fn hash_of(key: &K) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        hasher.finish() as usize
    }

    fn index_of(key: &K, global_depth: usize) -> usize {
        Self::hash_of(key) & ((1usize << global_depth) - 1)
    }

    pub fn find(&self, key: &K) -> Option<V> {
        let inner = self.inner.lock();
        let bucket = inner.dir[Self::index_of(key, inner.global_depth)];
        inner.buckets[bucket].find(key).cloned()
    }

    pub fn remove(&self, key: &K) -> bool {
        let mut inner = self.inner.lock();
        let bucket = inner.dir[Self::index_of(key, inner.global_depth)];
        inner.buckets[bucket].remove(key)
    }

    /// Inserts the pair, overwriting the value if the key already exists.
    /// A full bucket is split (possibly repeatedly, doubling the directory
    /// when its local depth has reached the global depth) until the insert
    /// succeeds. Splits never lose entries.
    pub fn insert(&self, key: K, value: V) {
        let mut inner = self.inner.lock();
        loop {
            let dir_index = Self::index_of(&key, inner.global_depth);
            let bucket = inner.dir[dir_index];
            let cap = self.bucket_size;
            if inner.buckets[bucket].insert(key.clone(), value.clone(), cap) {
                return;
            }
            Self::split_bucket(&mut inner, bucket, dir_index, cap);
        }
    }

    fn split_bucket(inner: &mut Directory<K, V>, old_bucket: usize, old_index: usize, cap: usize) {
        // A bucket at maximal depth forces the directory to double; every new
        // entry initially aliases the bucket its low half already points to.
        if inner.buckets[old_bucket].depth == inner.global_depth {
            let old_len = inner.dir.len();
            for i in 0..old_len {
                let target = inner.dir[i];
                inner.dir.push(target);
            }
            inner.global_depth += 1;
        }

        let base_depth = inner.buckets[old_bucket].depth;
        let new_depth = base_depth + 1;
        let base_index = old_index & ((1usize << base_depth) - 1);
        let new_target = base_index | (1usize << base_depth);

        let new_bucket = inner.buckets.len();
        inner.buckets.push(Bucket::new(cap, new_depth));
        inner.buckets[old_bucket].depth = new_depth;

        // Redistribute by the new high bit.
        let mask = (1usize << new_depth) - 1;
        let items = std::mem::take(&mut inner.buckets[old_bucket].items);
        for (k, v) in items {
            if Self::hash_of(&k) & mask == new_target {
                inner.buckets[new_bucket].items.push((k, v));
            } else {
                inner.buckets[old_bucket].items.push((k, v));
            }
        }

        // Rewire the aliasing directory entries whose masked index now names
        // the new bucket.
        for i in 0..inner.dir.len() {
            if inner.dir[i] == old_bucket && i & mask == new_target {
                inner.dir[i] = new_bucket;
            }
        }
    }

    /// Current global depth of the directory.
    pub fn global_depth(&self) -> usize {
        self.inner.lock().global_depth
    }

    /// Local depth of the bucket referenced by the given directory index, or
    /// None if the index is out of range.
    pub fn local_depth(&self, dir_index: usize) -> Option<usize> {
        let inner = self.inner.lock();
        inner
            .dir
            .get(dir_index)
            .map(|&bucket| inner.buckets[bucket].depth)
    }

    /// Number of distinct buckets.
    pub fn num_buckets(&self) -> usize {
        self.inner.lock().buckets.len()
    }

    /// Total number of stored pairs.
    pub fn len(&self) -> usize {
        let inner = self.inner.lock();
        inner.buckets.iter().map(|b| b.items.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
