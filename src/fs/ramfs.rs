//! In-memory writable filesystem (SPEC_FULL §4.6).
//!
//! A full read-write vtable implementation — every operation is a `HashMap` lookup, no
//! on-disk format at all. Mounted at `/tmp` and used to back the ramdisk-root boot path
//! when `-root=` is absent (SPEC_FULL §4.5).

use alloc::string::{String, ToString};
use alloc::vec::Vec;
use hashbrown::HashMap;
use spin::RwLock;

use crate::errors::FsError;
use crate::fs::{Attr, DirEntry, FileKind, FileSystem, FsResult, InodeId};

enum Node {
    Directory(HashMap<String, InodeId>),
    File(Vec<u8>),
}

struct Inner {
    nodes: HashMap<InodeId, Node>,
    next_id: u64,
}

pub struct RamFs {
    inner: RwLock<Inner>,
}

const ROOT: InodeId = InodeId(0);

impl RamFs {
    pub fn new() -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(ROOT, Node::Directory(HashMap::new()));
        Self {
            inner: RwLock::new(Inner { nodes, next_id: 1 }),
        }
    }
}

impl Default for RamFs {
    fn default() -> Self {
        Self::new()
    }
}

impl FileSystem for RamFs {
    fn root(&self) -> InodeId {
        ROOT
    }

    fn open(&self, dir: InodeId, name: &str) -> FsResult<InodeId> {
        let inner = self.inner.read();
        match inner.nodes.get(&dir) {
            Some(Node::Directory(children)) => children.get(name).copied().ok_or(FsError::NotFound),
            Some(Node::File(_)) => Err(FsError::NotADirectory),
            None => Err(FsError::NotFound),
        }
    }

    fn list_dir(&self, dir: InodeId) -> FsResult<Vec<DirEntry>> {
        let inner = self.inner.read();
        match inner.nodes.get(&dir) {
            Some(Node::Directory(children)) => Ok(children
                .iter()
                .map(|(name, inode)| DirEntry {
                    name: name.clone(),
                    inode: *inode,
                    kind: match inner.nodes.get(inode) {
                        Some(Node::Directory(_)) => FileKind::Directory,
                        _ => FileKind::Regular,
                    },
                })
                .collect()),
            Some(Node::File(_)) => Err(FsError::NotADirectory),
            None => Err(FsError::NotFound),
        }
    }

    fn attr(&self, inode: InodeId) -> FsResult<Attr> {
        let inner = self.inner.read();
        match inner.nodes.get(&inode) {
            Some(Node::Directory(_)) => Ok(Attr {
                kind: FileKind::Directory,
                size: 0,
                is_mountpoint: false,
            }),
            Some(Node::File(data)) => Ok(Attr {
                kind: FileKind::Regular,
                size: data.len() as u64,
                is_mountpoint: false,
            }),
            None => Err(FsError::NotFound),
        }
    }

    fn read_file(&self, inode: InodeId, offset: u64, buf: &mut [u8]) -> FsResult<usize> {
        let inner = self.inner.read();
        let Some(Node::File(data)) = inner.nodes.get(&inode) else {
            return Err(FsError::IsADirectory);
        };
        let offset = offset as usize;
        if offset >= data.len() {
            return Ok(0);
        }
        let take = buf.len().min(data.len() - offset);
        buf[..take].copy_from_slice(&data[offset..offset + take]);
        Ok(take)
    }

    fn write_file(&self, inode: InodeId, offset: u64, buf: &[u8]) -> FsResult<usize> {
        let mut inner = self.inner.write();
        let Some(Node::File(data)) = inner.nodes.get_mut(&inode) else {
            return Err(FsError::IsADirectory);
        };
        let offset = offset as usize;
        if offset + buf.len() > data.len() {
            data.resize(offset + buf.len(), 0);
        }
        data[offset..offset + buf.len()].copy_from_slice(buf);
        Ok(buf.len())
    }

    fn rename(&self, dir: InodeId, name: &str, new_dir: InodeId, new_name: &str) -> FsResult<()> {
        let mut inner = self.inner.write();
        let moved = match inner.nodes.get_mut(&dir) {
            Some(Node::Directory(children)) => children.remove(name).ok_or(FsError::NotFound)?,
            _ => return Err(FsError::NotADirectory),
        };
        match inner.nodes.get_mut(&new_dir) {
            Some(Node::Directory(children)) => {
                children.insert(new_name.to_string(), moved);
                Ok(())
            }
            _ => Err(FsError::NotADirectory),
        }
    }

    fn unlink(&self, dir: InodeId, name: &str) -> FsResult<()> {
        let mut inner = self.inner.write();
        let removed = match inner.nodes.get_mut(&dir) {
            Some(Node::Directory(children)) => children.remove(name).ok_or(FsError::NotFound)?,
            _ => return Err(FsError::NotADirectory),
        };
        inner.nodes.remove(&removed);
        Ok(())
    }

    fn create_file(&self, dir: InodeId, name: &str, kind: FileKind) -> FsResult<InodeId> {
        let mut inner = self.inner.write();
        if !matches!(inner.nodes.get(&dir), Some(Node::Directory(_))) {
            return Err(FsError::NotADirectory);
        }
        if let Some(Node::Directory(children)) = inner.nodes.get(&dir) {
            if children.contains_key(name) {
                return Err(FsError::AlreadyExists);
            }
        }
        let id = InodeId(inner.next_id);
        inner.next_id += 1;
        let node = match kind {
            FileKind::Directory => Node::Directory(HashMap::new()),
            _ => Node::File(Vec::new()),
        };
        inner.nodes.insert(id, node);
        if let Some(Node::Directory(children)) = inner.nodes.get_mut(&dir) {
            children.insert(name.to_string(), id);
        }
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_write_read_round_trip() {
        let fs = RamFs::new();
        let file = fs.create_file(fs.root(), "hello.txt", FileKind::Regular).unwrap();
        fs.write_file(file, 0, b"hi there").unwrap();

        let mut buf = [0u8; 8];
        let n = fs.read_file(file, 0, &mut buf).unwrap();
        assert_eq!(&buf[..n], b"hi there");
    }

    #[test]
    fn read_past_end_is_zero_not_error() {
        let fs = RamFs::new();
        let file = fs.create_file(fs.root(), "empty", FileKind::Regular).unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(fs.read_file(file, 100, &mut buf).unwrap(), 0);
    }

    #[test]
    fn duplicate_create_is_rejected() {
        let fs = RamFs::new();
        fs.create_file(fs.root(), "a", FileKind::Regular).unwrap();
        assert!(matches!(
            fs.create_file(fs.root(), "a", FileKind::Regular),
            Err(FsError::AlreadyExists)
        ));
    }

    #[test]
    fn unlink_then_open_fails() {
        let fs = RamFs::new();
        fs.create_file(fs.root(), "a", FileKind::Regular).unwrap();
        fs.unlink(fs.root(), "a").unwrap();
        assert!(matches!(fs.open(fs.root(), "a"), Err(FsError::NotFound)));
    }
}
