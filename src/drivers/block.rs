//! Block device abstraction (SPEC_FULL §4.5).
//!
//! A single transport-agnostic contract over sector-addressed storage, implemented by
//! [`crate::drivers::ata::AtaDevice`] and [`crate::drivers::ramdisk::RamDisk`]. The VFS
//! and partition code only ever go through this trait, never a concrete transport, so
//! a ramdisk can silently stand in for a missing hard disk (SPEC_FULL §4.5).

use alloc::vec::Vec;

use crate::errors::BlockDeviceError;

pub const BYTES_PER_SECTOR: u32 = 512;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DeviceKind {
    HardDisk,
    Cd,
    Usb,
    RamDisk,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TransportKind {
    Ata,
    Atapi,
    RamDisk,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct PartitionDescriptor {
    pub start_lba: u32,
    pub length: u32,
    pub system_id: u8,
    pub bootable: bool,
}

/// Reads and writes are always sector-granular at the transport; this trait's `offset`
/// and `len` parameters let callers straddle sector boundaries without doing the
/// read-modify-write splicing themselves (see [`BlockDevice::read_flexible`]).
pub trait BlockDevice {
    fn capacity_sectors(&self) -> u64;
    fn kind(&self) -> DeviceKind;
    fn transport(&self) -> TransportKind;

    /// Reads exactly one whole sector into `buf` (must be [`BYTES_PER_SECTOR`] long).
    fn read_sector(&mut self, sector: u64, buf: &mut [u8]) -> Result<(), BlockDeviceError>;
    /// Writes exactly one whole sector from `buf` (must be [`BYTES_PER_SECTOR`] long).
    fn write_sector(&mut self, sector: u64, buf: &[u8]) -> Result<(), BlockDeviceError>;
}

/// Reads `len` bytes starting `offset` bytes into `sector`, possibly spanning further
/// sectors, without requiring sector alignment from the caller.
pub fn read_flexible(
    dev: &mut dyn BlockDevice,
    sector: u64,
    offset: u32,
    buf: &mut [u8],
) -> Result<(), BlockDeviceError> {
    if buf.is_empty() {
        return Ok(());
    }
    if offset >= BYTES_PER_SECTOR {
        return read_flexible(
            dev,
            sector + (offset / BYTES_PER_SECTOR) as u64,
            offset % BYTES_PER_SECTOR,
            buf,
        );
    }
    if sector >= dev.capacity_sectors() {
        return Err(BlockDeviceError::OutOfRange);
    }

    let mut scratch = [0u8; BYTES_PER_SECTOR as usize];
    let mut cur_sector = sector;
    let mut produced = 0usize;
    let mut cur_offset = offset as usize;

    while produced < buf.len() {
        read_sector_retried(dev, cur_sector, &mut scratch)?;
        let take = (BYTES_PER_SECTOR as usize - cur_offset).min(buf.len() - produced);
        buf[produced..produced + take].copy_from_slice(&scratch[cur_offset..cur_offset + take]);
        produced += take;
        cur_offset = 0;
        cur_sector += 1;
    }
    Ok(())
}

/// Writes `buf` starting `offset` bytes into `sector`, read-modify-writing the first and
/// last touched sectors so untouched bytes in them survive (SPEC_FULL §4.5).
pub fn write_flexible(
    dev: &mut dyn BlockDevice,
    sector: u64,
    offset: u32,
    buf: &[u8],
) -> Result<(), BlockDeviceError> {
    if buf.is_empty() {
        return Ok(());
    }
    if offset >= BYTES_PER_SECTOR {
        return write_flexible(
            dev,
            sector + (offset / BYTES_PER_SECTOR) as u64,
            offset % BYTES_PER_SECTOR,
            buf,
        );
    }
    if sector >= dev.capacity_sectors() {
        return Err(BlockDeviceError::OutOfRange);
    }

    let mut scratch = [0u8; BYTES_PER_SECTOR as usize];
    let mut cur_sector = sector;
    let mut consumed = 0usize;
    let mut cur_offset = offset as usize;

    while consumed < buf.len() {
        let take = (BYTES_PER_SECTOR as usize - cur_offset).min(buf.len() - consumed);
        if take < BYTES_PER_SECTOR as usize {
            read_sector_retried(dev, cur_sector, &mut scratch)?;
        }
        scratch[cur_offset..cur_offset + take].copy_from_slice(&buf[consumed..consumed + take]);
        dev.write_sector(cur_sector, &scratch)?;
        consumed += take;
        cur_offset = 0;
        cur_sector += 1;
    }
    Ok(())
}

/// Retries the status-poll loop up to 3 times before surfacing a failure, per the
/// original PIO driver's tolerance for transient controller busy states.
fn read_sector_retried(
    dev: &mut dyn BlockDevice,
    sector: u64,
    buf: &mut [u8],
) -> Result<(), BlockDeviceError> {
    let mut last = Err(BlockDeviceError::Busy);
    for _ in 0..3 {
        last = dev.read_sector(sector, buf);
        if last.is_ok() {
            return last;
        }
    }
    last
}

pub fn read_partition_table(dev: &mut dyn BlockDevice) -> Result<Vec<PartitionDescriptor>, BlockDeviceError> {
    let mut mbr = [0u8; BYTES_PER_SECTOR as usize];
    dev.read_sector(0, &mut mbr)?;
    crate::fs::mbr::parse(&mbr).ok_or(BlockDeviceError::Internal)
}
