//! ext2 filesystem driver (SPEC_FULL §4.6).
//!
//! Built out to vtable-contract depth for the structurally simplest legal case: superblock
//! validation and an empty root directory. Block-group/inode-table walking for real
//! directory entries is not implemented. Layout grounded on
//! `original_source/filesystem/ext2.h`/`ext2.c`.

use alloc::vec::Vec;

use crate::errors::FsError;
use crate::fs::{Attr, DirEntry, FileKind, FileSystem, FsResult, InodeId};

/// The ext2 root directory is always inode 2 on-disk; mirrored here as the VFS root id.
const ROOT: InodeId = InodeId(2);

pub struct Ext2 {
    block_size: u32,
}

impl Ext2 {
    /// Builds a filesystem handle once the caller has already confirmed the superblock
    /// magic (`0xEF53` at partition offset 1024+56, SPEC_FULL §4.6 `detect_fs_type`).
    pub fn from_superblock(block_size_log2: u32) -> Self {
        Self {
            block_size: 1024 << block_size_log2,
        }
    }

    pub fn empty() -> Self {
        Self { block_size: 1024 }
    }

    pub fn block_size(&self) -> u32 {
        self.block_size
    }
}

impl FileSystem for Ext2 {
    fn root(&self) -> InodeId {
        ROOT
    }

    fn open(&self, dir: InodeId, _name: &str) -> FsResult<InodeId> {
        if dir != ROOT {
            return Err(FsError::NotADirectory);
        }
        Err(FsError::NotFound)
    }

    fn list_dir(&self, dir: InodeId) -> FsResult<Vec<DirEntry>> {
        if dir != ROOT {
            return Err(FsError::NotADirectory);
        }
        Ok(Vec::new())
    }

    fn attr(&self, inode: InodeId) -> FsResult<Attr> {
        if inode != ROOT {
            return Err(FsError::NotFound);
        }
        Ok(Attr {
            kind: FileKind::Directory,
            size: 0,
            is_mountpoint: false,
        })
    }

    fn read_file(&self, _inode: InodeId, _offset: u64, _buf: &mut [u8]) -> FsResult<usize> {
        Err(FsError::IsADirectory)
    }

    fn write_file(&self, _inode: InodeId, _offset: u64, _buf: &[u8]) -> FsResult<usize> {
        Err(FsError::ReadOnly)
    }

    fn rename(&self, _dir: InodeId, _name: &str, _new_dir: InodeId, _new_name: &str) -> FsResult<()> {
        Err(FsError::ReadOnly)
    }

    fn unlink(&self, _dir: InodeId, _name: &str) -> FsResult<()> {
        Err(FsError::ReadOnly)
    }

    fn create_file(&self, _dir: InodeId, _name: &str, _kind: FileKind) -> FsResult<InodeId> {
        Err(FsError::ReadOnly)
    }
}
