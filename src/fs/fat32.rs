//! FAT32 filesystem driver (SPEC_FULL §4.6, §8 scenario 2).
//!
//! Built out to the depth of the mount/open/short-read scenario: BPB validation, root
//! (and nested) directory enumeration via the cluster chain, 8.3 name lookup, and
//! `read_file` over the FAT cluster chain. No write support — allocating new clusters
//! and updating the FAT is out of scope for the scenario this driver satisfies. Layout
//! grounded on the teacher's `src/fs/fat.rs` `BiosParameterBlock`/`DirectoryEntry`
//! structs and `original_source/filesystem/fat32.c`.

use alloc::boxed::Box;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use hashbrown::HashMap;
use spin::Mutex;

use crate::drivers::block::{read_flexible, BlockDevice, BYTES_PER_SECTOR};
use crate::errors::FsError;
use crate::fs::{Attr, DirEntry, FileKind, FileSystem, FsResult, InodeId};

const BPB_SIGNATURE_OFFSET: usize = 510;
const BPB_SIGNATURE: u16 = 0xAA55;
const BPB_FS_TYPE_OFFSET: usize = 82;
const DIR_ENTRY_SIZE: usize = 32;
const ATTR_DIRECTORY: u8 = 0x10;
const ATTR_VOLUME_ID: u8 = 0x08;
const ATTR_LONG_NAME: u8 = 0x0F;
const ENTRY_FREE: u8 = 0xE5;
const ENTRY_END: u8 = 0x00;
const EOC_MIN: u32 = 0x0FFF_FFF8;

struct Geometry {
    partition_start_lba: u32,
    bytes_per_sector: u32,
    sectors_per_cluster: u32,
    fat_start_lba: u32,
    fat_size_sectors: u32,
    data_start_lba: u32,
    root_cluster: u32,
}

impl Geometry {
    fn parse(bpb: &[u8], partition_start_lba: u32) -> FsResult<Self> {
        let signature = u16::from_le_bytes([bpb[BPB_SIGNATURE_OFFSET], bpb[BPB_SIGNATURE_OFFSET + 1]]);
        if signature != BPB_SIGNATURE || &bpb[BPB_FS_TYPE_OFFSET..BPB_FS_TYPE_OFFSET + 5] != b"FAT32" {
            return Err(FsError::BadSuperblock);
        }
        let bytes_per_sector = u16::from_le_bytes([bpb[11], bpb[12]]) as u32;
        let sectors_per_cluster = bpb[13] as u32;
        let reserved_sectors = u16::from_le_bytes([bpb[14], bpb[15]]) as u32;
        let num_fats = bpb[16] as u32;
        let fat_size_sectors = u32::from_le_bytes([bpb[36], bpb[37], bpb[38], bpb[39]]);
        let root_cluster = u32::from_le_bytes([bpb[44], bpb[45], bpb[46], bpb[47]]);
        if bytes_per_sector == 0 || sectors_per_cluster == 0 || fat_size_sectors == 0 {
            return Err(FsError::BadSuperblock);
        }
        let fat_start_lba = partition_start_lba + reserved_sectors;
        let data_start_lba = fat_start_lba + num_fats * fat_size_sectors;
        Ok(Self {
            partition_start_lba,
            bytes_per_sector,
            sectors_per_cluster,
            fat_start_lba,
            fat_size_sectors,
            data_start_lba,
            root_cluster,
        })
    }

    fn cluster_to_lba(&self, cluster: u32) -> u32 {
        self.data_start_lba + (cluster - 2) * self.sectors_per_cluster
    }

    fn cluster_size(&self) -> usize {
        (self.sectors_per_cluster * self.bytes_per_sector) as usize
    }
}

#[derive(Clone, Copy)]
struct FileMeta {
    first_cluster: u32,
    size: u32,
    is_dir: bool,
}

struct Inner {
    device: Box<dyn BlockDevice + Send>,
    meta: HashMap<InodeId, FileMeta>,
}

pub struct Fat32 {
    geometry: Option<Geometry>,
    inner: Mutex<Inner>,
}

impl Fat32 {
    /// Degenerate placeholder used where a `FileSystem` handle is required before a
    /// concrete device has been identified (mirrors `Ext2::empty`/`Iso9660::empty`).
    pub fn empty() -> Self {
        Self {
            geometry: None,
            inner: Mutex::new(Inner {
                device: Box::new(crate::drivers::ramdisk::RamDisk::new(0)),
                meta: HashMap::new(),
            }),
        }
    }

    /// Validates the BPB at the start of `partition_start_lba` and takes ownership of
    /// `device` as the filesystem's backing store.
    pub fn mount(mut device: Box<dyn BlockDevice + Send>, partition_start_lba: u32) -> FsResult<Self> {
        let mut bpb = [0u8; BYTES_PER_SECTOR as usize];
        device.read_sector(u64::from(partition_start_lba), &mut bpb)?;
        let geometry = Geometry::parse(&bpb, partition_start_lba)?;
        let root = InodeId(u64::from(geometry.root_cluster));
        let mut meta = HashMap::new();
        meta.insert(
            root,
            FileMeta {
                first_cluster: geometry.root_cluster,
                size: 0,
                is_dir: true,
            },
        );
        Ok(Self {
            geometry: Some(geometry),
            inner: Mutex::new(Inner { device, meta }),
        })
    }

    fn geometry(&self) -> FsResult<&Geometry> {
        self.geometry.as_ref().ok_or(FsError::NoSuchMount)
    }

    /// Walks the FAT to collect every cluster in the chain starting at `first`.
    fn cluster_chain(&self, first: u32) -> FsResult<Vec<u32>> {
        let geometry = self.geometry()?;
        let mut inner = self.inner.lock();
        let mut chain = Vec::new();
        let mut cluster = first;
        while cluster >= 2 && cluster < EOC_MIN {
            chain.push(cluster);
            let fat_offset = cluster * 4;
            let sector = geometry.fat_start_lba + fat_offset / geometry.bytes_per_sector;
            let offset = fat_offset % geometry.bytes_per_sector;
            let mut raw = [0u8; 4];
            read_flexible(&mut *inner.device, u64::from(sector), offset, &mut raw)?;
            cluster = u32::from_le_bytes(raw) & 0x0FFF_FFFF;
        }
        Ok(chain)
    }

    fn read_dir_entries(&self, dir_cluster: u32) -> FsResult<Vec<(String, FileMeta)>> {
        let geometry = self.geometry()?;
        let chain = self.cluster_chain(dir_cluster)?;
        let mut out = Vec::new();
        let mut raw = alloc::vec![0u8; geometry.cluster_size()];
        let mut inner = self.inner.lock();
        'clusters: for cluster in chain {
            let lba = geometry.cluster_to_lba(cluster);
            read_flexible(&mut *inner.device, u64::from(lba), 0, &mut raw)?;
            for record in raw.chunks_exact(DIR_ENTRY_SIZE) {
                if record[0] == ENTRY_END {
                    break 'clusters;
                }
                if record[0] == ENTRY_FREE {
                    continue;
                }
                let attr = record[11];
                if attr == ATTR_LONG_NAME || attr & ATTR_VOLUME_ID != 0 {
                    continue;
                }
                let name = decode_short_name(&record[0..11]);
                let clus_hi = u16::from_le_bytes([record[20], record[21]]) as u32;
                let clus_lo = u16::from_le_bytes([record[26], record[27]]) as u32;
                let first_cluster = (clus_hi << 16) | clus_lo;
                let size = u32::from_le_bytes([record[28], record[29], record[30], record[31]]);
                out.push((
                    name,
                    FileMeta {
                        first_cluster,
                        size,
                        is_dir: attr & ATTR_DIRECTORY != 0,
                    },
                ));
            }
        }
        Ok(out)
    }
}

/// Converts an 8.3 on-disk name (`"HELLO   TXT"`) to `"hello.txt"`.
fn decode_short_name(raw: &[u8]) -> String {
    let base = core::str::from_utf8(&raw[0..8]).unwrap_or("").trim_end();
    let ext = core::str::from_utf8(&raw[8..11]).unwrap_or("").trim_end();
    let mut name = base.to_ascii_lowercase();
    if !ext.is_empty() {
        name.push('.');
        name.push_str(&ext.to_ascii_lowercase());
    }
    name
}

impl FileSystem for Fat32 {
    fn root(&self) -> InodeId {
        match &self.geometry {
            Some(geometry) => InodeId(u64::from(geometry.root_cluster)),
            None => InodeId(0),
        }
    }

    fn case_insensitive(&self) -> bool {
        true
    }

    fn open(&self, dir: InodeId, name: &str) -> FsResult<InodeId> {
        let dir_cluster = {
            let inner = self.inner.lock();
            let meta = inner.meta.get(&dir).ok_or(FsError::NotFound)?;
            if !meta.is_dir {
                return Err(FsError::NotADirectory);
            }
            meta.first_cluster
        };
        let entries = self.read_dir_entries(dir_cluster)?;
        let (_, found) = entries
            .into_iter()
            .find(|(entry_name, _)| entry_name.eq_ignore_ascii_case(name))
            .ok_or(FsError::NotFound)?;
        let id = InodeId(u64::from(found.first_cluster));
        self.inner.lock().meta.insert(id, found);
        Ok(id)
    }

    fn list_dir(&self, dir: InodeId) -> FsResult<Vec<DirEntry>> {
        let dir_cluster = {
            let inner = self.inner.lock();
            let meta = inner.meta.get(&dir).ok_or(FsError::NotFound)?;
            if !meta.is_dir {
                return Err(FsError::NotADirectory);
            }
            meta.first_cluster
        };
        let entries = self.read_dir_entries(dir_cluster)?;
        let mut inner = self.inner.lock();
        Ok(entries
            .into_iter()
            .map(|(name, meta)| {
                let inode = InodeId(u64::from(meta.first_cluster));
                inner.meta.insert(inode, meta);
                DirEntry {
                    name,
                    inode,
                    kind: if meta.is_dir { FileKind::Directory } else { FileKind::Regular },
                }
            })
            .collect())
    }

    fn attr(&self, inode: InodeId) -> FsResult<Attr> {
        let inner = self.inner.lock();
        let meta = inner.meta.get(&inode).ok_or(FsError::NotFound)?;
        Ok(Attr {
            kind: if meta.is_dir { FileKind::Directory } else { FileKind::Regular },
            size: u64::from(meta.size),
            is_mountpoint: false,
        })
    }

    fn read_file(&self, inode: InodeId, offset: u64, buf: &mut [u8]) -> FsResult<usize> {
        let meta = {
            let inner = self.inner.lock();
            *inner.meta.get(&inode).ok_or(FsError::NotFound)?
        };
        if meta.is_dir {
            return Err(FsError::IsADirectory);
        }
        if offset >= u64::from(meta.size) {
            return Ok(0);
        }
        let geometry = self.geometry()?;
        let take = buf.len().min((u64::from(meta.size) - offset) as usize);
        let cluster_size = geometry.cluster_size() as u64;
        let chain = self.cluster_chain(meta.first_cluster)?;

        let mut produced = 0usize;
        let mut remaining_offset = offset;
        for cluster in chain {
            if remaining_offset >= cluster_size {
                remaining_offset -= cluster_size;
                continue;
            }
            if produced >= take {
                break;
            }
            let lba = geometry.cluster_to_lba(cluster);
            let want = (take - produced).min((cluster_size - remaining_offset) as usize);
            let mut inner = self.inner.lock();
            read_flexible(
                &mut *inner.device,
                u64::from(lba),
                remaining_offset as u32,
                &mut buf[produced..produced + want],
            )?;
            produced += want;
            remaining_offset = 0;
        }
        Ok(produced)
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::ramdisk::RamDisk;
    use alloc::vec;

    /// Builds a 4-cluster FAT32 ramdisk image with a root directory containing a single
    /// file `hello.txt` whose data is `"hello, world"`.
    fn make_image() -> RamDisk {
        const SECTOR: usize = 512;
        const SEC_PER_CLUS: usize = 1;
        const RESERVED: usize = 32;
        const NUM_FATS: usize = 1;
        const FAT_SIZE_SECTORS: usize = 1;
        const ROOT_CLUSTER: u32 = 2;
        const FILE_CLUSTER: u32 = 3;

        let data_start = RESERVED + NUM_FATS * FAT_SIZE_SECTORS;
        let total_sectors = data_start + 4 * SEC_PER_CLUS;
        let mut disk = RamDisk::new((total_sectors * SECTOR) as u32);

        let mut bpb = vec![0u8; SECTOR];
        bpb[11..13].copy_from_slice(&(SECTOR as u16).to_le_bytes());
        bpb[13] = SEC_PER_CLUS as u8;
        bpb[14..16].copy_from_slice(&(RESERVED as u16).to_le_bytes());
        bpb[16] = NUM_FATS as u8;
        bpb[36..40].copy_from_slice(&(FAT_SIZE_SECTORS as u32).to_le_bytes());
        bpb[44..48].copy_from_slice(&ROOT_CLUSTER.to_le_bytes());
        bpb[82..87].copy_from_slice(b"FAT32");
        bpb[510] = 0x55;
        bpb[511] = 0xAA;
        disk.write_sector(0, &bpb).unwrap();

        let mut fat = vec![0u8; SECTOR];
        fat[(ROOT_CLUSTER as usize) * 4..(ROOT_CLUSTER as usize) * 4 + 4]
            .copy_from_slice(&0x0FFF_FFF8u32.to_le_bytes());
        fat[(FILE_CLUSTER as usize) * 4..(FILE_CLUSTER as usize) * 4 + 4]
            .copy_from_slice(&0x0FFF_FFF8u32.to_le_bytes());
        disk.write_sector(RESERVED as u64, &fat).unwrap();

        let mut root_dir = vec![0u8; SECTOR];
        let entry = &mut root_dir[0..32];
        entry[0..8].copy_from_slice(b"HELLO   ");
        entry[8..11].copy_from_slice(b"TXT");
        entry[11] = 0;
        entry[20..22].copy_from_slice(&((FILE_CLUSTER >> 16) as u16).to_le_bytes());
        entry[26..28].copy_from_slice(&(FILE_CLUSTER as u16).to_le_bytes());
        let contents = b"hello, world";
        entry[28..32].copy_from_slice(&(contents.len() as u32).to_le_bytes());
        disk.write_sector((data_start + (ROOT_CLUSTER as usize - 2) * SEC_PER_CLUS) as u64, &root_dir)
            .unwrap();

        let mut file_data = vec![0u8; SECTOR];
        file_data[..contents.len()].copy_from_slice(contents);
        disk.write_sector((data_start + (FILE_CLUSTER as usize - 2) * SEC_PER_CLUS) as u64, &file_data)
            .unwrap();

        disk
    }

    #[test]
    fn mount_rejects_bad_signature() {
        let disk = RamDisk::new(512);
        let err = Fat32::mount(Box::new(disk), 0).unwrap_err();
        assert!(matches!(err, FsError::BadSuperblock));
    }

    #[test]
    fn mount_open_and_short_read() {
        let fs = Fat32::mount(Box::new(make_image()), 0).unwrap();
        let file = fs.open(fs.root(), "hello.txt").unwrap();
        let mut buf = [0u8; 5];
        let n = fs.read_file(file, 0, &mut buf).unwrap();
        assert_eq!(n, 5);
        assert_eq!(&buf, b"hello");
    }

    #[test]
    fn list_dir_finds_the_file() {
        let fs = Fat32::mount(Box::new(make_image()), 0).unwrap();
        let entries = fs.list_dir(fs.root()).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "hello.txt");
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let fs = Fat32::mount(Box::new(make_image()), 0).unwrap();
        assert!(fs.open(fs.root(), "HELLO.TXT").is_ok());
    }
}
