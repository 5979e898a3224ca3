//! Inode attribute cache (SPEC_FULL §4.6).
//!
//! Keyed by `(filesystem, on-disk id)`, populated on open, consulted before any on-disk
//! fetch. Bounded with an LRU policy tied to open-fd count — the original vfs.c cache is
//! unbounded (Design Notes §9 supplement, this is a deliberate redesign).

use alloc::collections::VecDeque;
use hashbrown::HashMap;
use spin::Mutex;

use crate::fs::mount::MountId;
use crate::fs::{Attr, InodeId};

type Key = (MountId, InodeId);

pub struct InodeCache {
    entries: HashMap<Key, Attr>,
    recency: VecDeque<Key>,
    capacity: usize,
}

impl InodeCache {
    pub const fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            recency: VecDeque::new(),
            capacity,
        }
    }

    pub fn get(&mut self, mount: MountId, inode: InodeId) -> Option<Attr> {
        let key = (mount, inode);
        if self.entries.contains_key(&key) {
            self.touch(key);
        }
        self.entries.get(&key).cloned()
    }

    pub fn insert(&mut self, mount: MountId, inode: InodeId, attr: Attr) {
        let key = (mount, inode);
        if self.entries.insert(key, attr).is_none() && self.entries.len() > self.capacity {
            if let Some(evicted) = self.recency.pop_front() {
                self.entries.remove(&evicted);
            }
        }
        self.touch(key);
    }

    pub fn invalidate(&mut self, mount: MountId, inode: InodeId) {
        let key = (mount, inode);
        self.entries.remove(&key);
        self.recency.retain(|k| *k != key);
    }

    fn touch(&mut self, key: Key) {
        self.recency.retain(|k| *k != key);
        self.recency.push_back(key);
    }
}

/// Bound derived from an expected fd-table ceiling (SPEC_FULL §6 `MAX_FDS`); grows with
/// open-fd count in spirit, fixed in practice since the fd table itself is fixed-size.
pub static INODE_CACHE: Mutex<InodeCache> = Mutex::new(InodeCache::new(256));
