//! # Debug Tags
//!
//! Optional strings attached to handles, read only when diagnosing a
//! protocol violation or on explicit query.
//!
//! Pool tags are keyed by [`HandleId::tag_key`], so a new occupant of a slot
//! overwrites (or inherits) the previous occupant's tag. Heap tags are keyed
//! by the full ID and are kept after the handle is destroyed, which lets a
//! use-after-free report still name the resource. They are never reclaimed.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::handle::HandleId;

/// Tag reported for handles without one.
pub const NO_TAG: &str = "(no tag)";

/// Initial capacity of each tag map.
const INITIAL_CAPACITY: usize = 512;

/// Side-table of debug tags, one map per handle kind.
///
/// # Thread Safety
///
/// Each map has its own lock and no operation holds both.
pub struct TagRegistry {
    /// Tags of pool handles, by tag key.
    pool: Mutex<HashMap<u32, Arc<str>>>,
    /// Tags of heap handles, by raw ID.
    heap: Mutex<HashMap<u32, Arc<str>>>,
    /// Whether heap handles accept tags at all.
    heap_tags_enabled: bool,
    /// Shared sentinel, cloned on misses instead of allocating.
    no_tag: Arc<str>,
}

impl TagRegistry {
    /// Creates an empty registry.
    ///
    /// # Arguments
    ///
    /// * `heap_tags_enabled` - When false, tags on heap handles are dropped
    #[must_use]
    pub fn new(heap_tags_enabled: bool) -> Self {
        Self {
            pool: Mutex::new(HashMap::with_capacity(INITIAL_CAPACITY)),
            heap: Mutex::new(HashMap::with_capacity(INITIAL_CAPACITY)),
            heap_tags_enabled,
            no_tag: Arc::from(NO_TAG),
        }
    }

    /// Attaches `tag` to `id`, replacing any previous tag under the same key.
    ///
    /// Empty tags are ignored and never clear an existing tag.
    pub fn associate(&self, id: HandleId, tag: Arc<str>) {
        if tag.is_empty() || id.is_null() {
            return;
        }
        if id.is_pool() {
            self.pool.lock().insert(id.tag_key(), tag);
        } else if self.heap_tags_enabled {
            self.heap.lock().insert(id.tag_key(), tag);
        }
    }

    /// Returns the tag of `id`, or the [`NO_TAG`] sentinel.
    #[must_use]
    pub fn lookup(&self, id: HandleId) -> Arc<str> {
        self.get(id).unwrap_or_else(|| Arc::clone(&self.no_tag))
    }

    /// Returns the tag of `id`, if one was set.
    #[must_use]
    pub fn get(&self, id: HandleId) -> Option<Arc<str>> {
        let map = if id.is_pool() { &self.pool } else { &self.heap };
        map.lock().get(&id.tag_key()).cloned()
    }

    /// Number of stored tags as `(pool, heap)`.
    #[must_use]
    pub fn len(&self) -> (usize, usize) {
        (self.pool.lock().len(), self.heap.lock().len())
    }

    /// Checks if no tags are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == (0, 0)
    }
}

impl Default for TagRegistry {
    fn default() -> Self {
        Self::new(true)
    }
}
