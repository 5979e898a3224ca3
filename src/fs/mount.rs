//! Mount table (SPEC_FULL §4.6).
//!
//! Resolves an absolute path to the mounted filesystem whose mount path is the longest
//! prefix of it — the usual Unix mount-table semantics, grounded on
//! `original_source/filesystem/vfs.c`'s `mount`/path lookup.

use alloc::boxed::Box;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use spin::RwLock;

use crate::fs::FileSystem;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct MountId(usize);

impl MountId {
    #[cfg(test)]
    pub(crate) fn for_test(id: usize) -> Self {
        Self(id)
    }
}

struct Entry {
    path: String,
    fs: Box<dyn FileSystem>,
}

pub struct MountTable {
    entries: Vec<Entry>,
}

pub static MOUNTS: RwLock<MountTable> = RwLock::new(MountTable { entries: Vec::new() });

impl MountTable {
    pub fn mount(&mut self, path: &str, fs: Box<dyn FileSystem>) -> MountId {
        let id = MountId(self.entries.len());
        self.entries.push(Entry {
            path: normalize(path),
            fs,
        });
        id
    }

    pub fn unmount(&mut self, path: &str) -> bool {
        let normalized = normalize(path);
        if let Some(pos) = self.entries.iter().position(|e| e.path == normalized) {
            self.entries.remove(pos);
            return true;
        }
        false
    }

    /// Returns the mount whose path is the longest prefix of `path`, plus the remainder
    /// of `path` relative to that mount's root.
    pub fn resolve_prefix(&self, path: &str) -> Option<(MountId, String)> {
        let path = normalize(path);
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, e)| path == e.path || path.starts_with(&mount_prefix(&e.path)))
            .max_by_key(|(_, e)| e.path.len())
            .map(|(idx, e)| {
                let relative = path.strip_prefix(e.path.as_str()).unwrap_or("").to_string();
                (MountId(idx), relative)
            })
    }

    pub fn filesystem(&self, id: MountId) -> Option<&dyn FileSystem> {
        self.entries.get(id.0).map(|e| e.fs.as_ref())
    }

    pub fn path_of(&self, id: MountId) -> Option<String> {
        self.entries.get(id.0).map(|e| e.path.clone())
    }
}

fn normalize(path: &str) -> String {
    if path == "/" {
        return "/".to_string();
    }
    path.trim_end_matches('/').to_string()
}

fn mount_prefix(path: &str) -> String {
    if path == "/" {
        "/".to_string()
    } else {
        alloc::format!("{path}/")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::devfs::DevFs;

    #[test]
    fn longest_prefix_wins() {
        let mut table = MountTable { entries: Vec::new() };
        table.mount("/", Box::new(DevFs::new()));
        let dev_id = table.mount("/dev", Box::new(DevFs::new()));

        let (resolved, relative) = table.resolve_prefix("/dev/console").unwrap();
        assert_eq!(resolved, dev_id);
        assert_eq!(relative, "/console");
    }

    #[test]
    fn root_mount_matches_everything_else() {
        let mut table = MountTable { entries: Vec::new() };
        let root_id = table.mount("/", Box::new(DevFs::new()));
        table.mount("/dev", Box::new(DevFs::new()));

        let (resolved, relative) = table.resolve_prefix("/sys/init").unwrap();
        assert_eq!(resolved, root_id);
        assert_eq!(relative, "/sys/init");
    }
}
