//! Virtual filesystem (SPEC_FULL §4.6).
//!
//! A thin dispatcher over per-filesystem vtables (`FileSystem`), a mount table resolved
//! by longest-prefix match, a bounded inode cache, and a per-process fd table. Path
//! resolution, read/write EOF semantics and `detect_fs_type` follow
//! `original_source/filesystem/vfs.c`; the default-method-heavy trait shape is adapted
//! from the teacher's `FsFile`/`FsDirectory` design (this file, pre-transform).

use alloc::boxed::Box;
use alloc::string::{String, ToString};
use alloc::vec::Vec;

use crate::drivers::block::BlockDevice;
use crate::errors::FsError;

pub mod devfs;
pub mod ext2;
pub mod fat32;
pub mod fd;
pub mod inode;
pub mod iso9660;
pub mod mbr;
pub mod mount;
pub mod ramfs;

pub type FsResult<T> = Result<T, FsError>;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct InodeId(pub u64);

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FileKind {
    Regular,
    Directory,
    CharDevice,
}

/// What kind of device a devfs inode dispatches to, for `ioctl` (SPEC_FULL §4.10
/// `syscall_ioctl` "fd must be devfs-backed"). Non-devfs filesystems never return
/// anything but `None`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DeviceKind {
    Tty,
    Block,
}

#[derive(Clone, Debug)]
pub struct Attr {
    pub kind: FileKind,
    pub size: u64,
    pub is_mountpoint: bool,
}

#[derive(Clone, Debug)]
pub struct DirEntry {
    pub name: String,
    pub inode: InodeId,
    pub kind: FileKind,
}

/// One concrete filesystem's vtable. `devfs`/`ramfs`/`ext2`/`iso9660` implement this to
/// the depth needed to satisfy every method correctly for their simplest legal case;
/// `fat32` is built out to the §8 mount/open/short-read scenario (SPEC_FULL §4.6).
pub trait FileSystem: Send + Sync {
    fn root(&self) -> InodeId;

    fn case_insensitive(&self) -> bool {
        false
    }

    fn open(&self, dir: InodeId, name: &str) -> FsResult<InodeId>;
    fn list_dir(&self, dir: InodeId) -> FsResult<Vec<DirEntry>>;
    fn attr(&self, inode: InodeId) -> FsResult<Attr>;
    fn read_file(&self, inode: InodeId, offset: u64, buf: &mut [u8]) -> FsResult<usize>;
    fn write_file(&self, inode: InodeId, offset: u64, buf: &[u8]) -> FsResult<usize>;
    fn rename(&self, dir: InodeId, name: &str, new_dir: InodeId, new_name: &str) -> FsResult<()>;
    fn unlink(&self, dir: InodeId, name: &str) -> FsResult<()>;
    fn create_file(&self, dir: InodeId, name: &str, kind: FileKind) -> FsResult<InodeId>;

    /// `None` for every filesystem but devfs, whose nodes report the device they back.
    fn device_kind(&self, _inode: InodeId) -> Option<DeviceKind> {
        None
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DetectedFs {
    Fat32,
    Ext2,
    Iso9660,
}

/// Inspects a partition's first sectors to pick a filesystem driver, per
/// `original_source/filesystem/vfs.c`'s `detect_fs_type`: FAT32 BPB signature first, then
/// ext2 superblock magic, then ISO9660 primary volume descriptor. An unrecognized
/// partition is left unmounted rather than guessed at.
pub fn detect_fs_type(dev: &mut dyn BlockDevice) -> Option<DetectedFs> {
    let mut boot_sector = [0u8; 512];
    if dev.read_sector(0, &mut boot_sector).is_err() {
        return None;
    }
    let signature = u16::from_le_bytes([boot_sector[510], boot_sector[511]]);
    if signature == 0xAA55 && &boot_sector[82..87] == b"FAT32" {
        return Some(DetectedFs::Fat32);
    }

    let sb_sector = 1024 / u64::from(crate::drivers::block::BYTES_PER_SECTOR);
    let sb_offset = (1024 % crate::drivers::block::BYTES_PER_SECTOR) as usize + 56;
    let mut sb = [0u8; 512];
    if dev.read_sector(sb_sector, &mut sb).is_ok() {
        let magic = u16::from_le_bytes([sb[sb_offset], sb[sb_offset + 1]]);
        if magic == 0xEF53 {
            return Some(DetectedFs::Ext2);
        }
    }

    let mut pvd = [0u8; 512];
    if dev.read_sector(16, &mut pvd).is_ok() && &pvd[1..6] == b"CD001" {
        return Some(DetectedFs::Iso9660);
    }

    None
}

/// Builds the concrete filesystem driver for a detected partition. `FAT32` takes
/// ownership of `device` to walk its cluster chains on demand (SPEC_FULL §8 scenario 2);
/// `ext2`/`iso9660` are thin stubs that do not yet need one.
pub fn build_filesystem(
    kind: DetectedFs,
    device: Box<dyn BlockDevice + Send>,
    partition_start_lba: u32,
) -> FsResult<Box<dyn FileSystem>> {
    Ok(match kind {
        DetectedFs::Fat32 => Box::new(fat32::Fat32::mount(device, partition_start_lba)?),
        DetectedFs::Ext2 => Box::new(ext2::Ext2::empty()),
        DetectedFs::Iso9660 => Box::new(iso9660::Iso9660::empty()),
    })
}

/// Looks `inode` up in [`inode::INODE_CACHE`] before falling through to the backing
/// filesystem's `attr`, then populates the cache with whatever was fetched (SPEC_FULL
/// §4.6: "populated on open; looked up before any on-disk fetch").
pub fn cached_attr(mount: mount::MountId, inode: InodeId, fs: &dyn FileSystem) -> FsResult<Attr> {
    if let Some(attr) = inode::INODE_CACHE.lock().get(mount, inode) {
        return Ok(attr);
    }
    let attr = fs.attr(inode)?;
    inode::INODE_CACHE.lock().insert(mount, inode, attr.clone());
    Ok(attr)
}

/// Resolves an absolute path against the mount table and walks components one at a time
/// (SPEC_FULL §4.6 path resolution steps 1-6), stopping to hand off at mount boundaries.
pub fn resolve(path: &str) -> FsResult<(mount::MountId, InodeId)> {
    if !path.starts_with('/') {
        return Err(FsError::InvalidPath);
    }
    let table = mount::MOUNTS.read();
    let (mut mount_id, relative) = table.resolve_prefix(path).ok_or(FsError::NoSuchMount)?;
    let mut fs = table.filesystem(mount_id).ok_or(FsError::NoSuchMount)?;
    let mut current = fs.root();
    let mut walked = table.path_of(mount_id).ok_or(FsError::NoSuchMount)?;

    for component in relative.split('/').filter(|c| !c.is_empty()) {
        let name = if fs.case_insensitive() {
            component.to_ascii_lowercase()
        } else {
            component.to_string()
        };
        current = fs.open(current, &name).map_err(|_| FsError::NotFound)?;

        if !walked.ends_with('/') {
            walked.push('/');
        }
        walked.push_str(&name);

        if cached_attr(mount_id, current, fs)?.is_mountpoint {
            if let Some((sub_id, _)) = table.resolve_prefix(&walked) {
                if sub_id != mount_id {
                    mount_id = sub_id;
                    fs = table.filesystem(mount_id).ok_or(FsError::NoSuchMount)?;
                    current = fs.root();
                }
            }
        }
    }
    Ok((mount_id, current))
}
