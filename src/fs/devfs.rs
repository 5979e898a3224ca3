//! Device filesystem (SPEC_FULL §4.6, §6 "devfs").
//!
//! A synthetic filesystem rooted at `/dev`, populated at boot with one entry per block
//! device, one entry per partition, and one entry per allocated TTY. Each entry carries a
//! `(device_type, device_info)` pair; reads and writes dispatch on it. Directory
//! structure is fixed once built — `create`/`rename`/`unlink` are rejected since the
//! device set is owned by the boot sequence, not user-visible mutation.

use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::fmt::Write;
use spin::RwLock;

use crate::drivers::ata::ata_devices;
use crate::drivers::block::{read_flexible, write_flexible, BYTES_PER_SECTOR};
use crate::drivers::console::CONSOLE;
use crate::errors::FsError;
use crate::fs::{Attr, DeviceKind, DirEntry, FileKind, FileSystem, FsResult, InodeId};

const ROOT: InodeId = InodeId(0);

/// What a devfs inode dispatches reads/writes to, mirroring the original's
/// `(device_type, device_ptr, device_info)` tuple.
#[derive(Clone, Copy)]
enum DevKind {
    Tty,
    /// Whole-disk node; indexes into [`crate::drivers::ata::ata_devices`].
    BlockDevice { ata_index: usize },
    /// Partition node; same backing disk, offset by `start_lba` sectors.
    Partition { ata_index: usize, start_lba: u32 },
}

struct DevNode {
    name: String,
    kind: DevKind,
}

pub struct DevFs {
    nodes: RwLock<Vec<DevNode>>,
}

impl DevFs {
    /// Starts with just `tty1`, matching the structurally simplest legal devfs.
    pub fn new() -> Self {
        Self {
            nodes: RwLock::new(alloc::vec![DevNode {
                name: "tty1".to_string(),
                kind: DevKind::Tty,
            }]),
        }
    }

    /// Registers a whole-disk node (`sda`, `sdb`, ...) for the given index into
    /// [`ata_devices`], returning its inode.
    pub fn register_block_device(&self, name: &str, ata_index: usize) -> InodeId {
        let mut nodes = self.nodes.write();
        nodes.push(DevNode {
            name: name.to_string(),
            kind: DevKind::BlockDevice { ata_index },
        });
        InodeId(nodes.len() as u64)
    }

    /// Registers a partition node (`sda1`, `sda2`, ...) on top of a disk already
    /// registered via [`DevFs::register_block_device`].
    pub fn register_partition(&self, name: &str, ata_index: usize, start_lba: u32) -> InodeId {
        let mut nodes = self.nodes.write();
        nodes.push(DevNode {
            name: name.to_string(),
            kind: DevKind::Partition { ata_index, start_lba },
        });
        InodeId(nodes.len() as u64)
    }

    fn find(&self, inode: InodeId) -> Option<usize> {
        if inode == ROOT || inode.0 == 0 {
            return None;
        }
        let idx = (inode.0 - 1) as usize;
        if idx < self.nodes.read().len() {
            Some(idx)
        } else {
            None
        }
    }
}

impl Default for DevFs {
    fn default() -> Self {
        Self::new()
    }
}

impl FileSystem for DevFs {
    fn root(&self) -> InodeId {
        ROOT
    }

    fn open(&self, dir: InodeId, name: &str) -> FsResult<InodeId> {
        if dir != ROOT {
            return Err(FsError::NotADirectory);
        }
        let nodes = self.nodes.read();
        nodes
            .iter()
            .position(|n| n.name == name)
            .map(|idx| InodeId((idx + 1) as u64))
            .ok_or(FsError::NotFound)
    }

    fn list_dir(&self, dir: InodeId) -> FsResult<Vec<DirEntry>> {
        if dir != ROOT {
            return Err(FsError::NotADirectory);
        }
        Ok(self
            .nodes
            .read()
            .iter()
            .enumerate()
            .map(|(idx, node)| DirEntry {
                name: node.name.clone(),
                inode: InodeId((idx + 1) as u64),
                kind: FileKind::CharDevice,
            })
            .collect())
    }

    fn attr(&self, inode: InodeId) -> FsResult<Attr> {
        if inode == ROOT {
            return Ok(Attr {
                kind: FileKind::Directory,
                size: 0,
                is_mountpoint: false,
            });
        }
        let idx = self.find(inode).ok_or(FsError::NotFound)?;
        let _ = &self.nodes.read()[idx];
        Ok(Attr {
            kind: FileKind::CharDevice,
            size: 0,
            is_mountpoint: false,
        })
    }

    fn read_file(&self, inode: InodeId, offset: u64, buf: &mut [u8]) -> FsResult<usize> {
        let idx = self.find(inode).ok_or(FsError::IsADirectory)?;
        let kind = self.nodes.read()[idx].kind;
        match kind {
            DevKind::Tty => {
                // No keyboard input queue wired up yet; the TTY line discipline sits on
                // top of this once the keyboard driver feeds it (SPEC_FULL §4.12).
                Ok(0)
            }
            DevKind::BlockDevice { ata_index } => {
                let mut devices = ata_devices().write();
                let dev = devices.get_mut(ata_index).ok_or(FsError::NoSuchMount)?;
                let sector = offset / u64::from(BYTES_PER_SECTOR);
                let within = (offset % u64::from(BYTES_PER_SECTOR)) as u32;
                read_flexible(dev, sector, within, buf)?;
                Ok(buf.len())
            }
            DevKind::Partition { ata_index, start_lba } => {
                let mut devices = ata_devices().write();
                let dev = devices.get_mut(ata_index).ok_or(FsError::NoSuchMount)?;
                let sector = u64::from(start_lba) + offset / u64::from(BYTES_PER_SECTOR);
                let within = (offset % u64::from(BYTES_PER_SECTOR)) as u32;
                read_flexible(dev, sector, within, buf)?;
                Ok(buf.len())
            }
        }
    }

    fn write_file(&self, inode: InodeId, offset: u64, buf: &[u8]) -> FsResult<usize> {
        let idx = self.find(inode).ok_or(FsError::IsADirectory)?;
        let kind = self.nodes.read()[idx].kind;
        match kind {
            DevKind::Tty => {
                let text = core::str::from_utf8(buf).map_err(|_| FsError::Exception(alloc::boxed::Box::new(Utf8Error)))?;
                let _ = write!(CONSOLE.lock(), "{text}");
                Ok(buf.len())
            }
            DevKind::BlockDevice { ata_index } => {
                let mut devices = ata_devices().write();
                let dev = devices.get_mut(ata_index).ok_or(FsError::NoSuchMount)?;
                let sector = offset / u64::from(BYTES_PER_SECTOR);
                let within = (offset % u64::from(BYTES_PER_SECTOR)) as u32;
                write_flexible(dev, sector, within, buf)?;
                Ok(buf.len())
            }
            DevKind::Partition { ata_index, start_lba } => {
                let mut devices = ata_devices().write();
                let dev = devices.get_mut(ata_index).ok_or(FsError::NoSuchMount)?;
                let sector = u64::from(start_lba) + offset / u64::from(BYTES_PER_SECTOR);
                let within = (offset % u64::from(BYTES_PER_SECTOR)) as u32;
                write_flexible(dev, sector, within, buf)?;
                Ok(buf.len())
            }
        }
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

    fn device_kind(&self, inode: InodeId) -> Option<DeviceKind> {
        let idx = self.find(inode)?;
        Some(match self.nodes.read()[idx].kind {
            DevKind::Tty => DeviceKind::Tty,
            DevKind::BlockDevice { .. } | DevKind::Partition { .. } => DeviceKind::Block,
        })
    }
}

#[derive(Debug)]
struct Utf8Error;
impl crate::errors::BaseError for Utf8Error {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tty1_is_the_only_default_entry() {
        let fs = DevFs::new();
        let entries = fs.list_dir(fs.root()).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "tty1");
    }

    #[test]
    fn unknown_name_is_not_found() {
        let fs = DevFs::new();
        assert!(matches!(fs.open(fs.root(), "ttyS0"), Err(FsError::NotFound)));
    }

    #[test]
    fn registered_partition_is_visible() {
        let fs = DevFs::new();
        let inode = fs.register_partition("sda1", 0, 2048);
        assert_eq!(fs.open(fs.root(), "sda1").unwrap(), inode);
    }
}
