//! ATA PIO transport (SPEC_FULL §4.5).
//!
//! Polls status registers instead of waiting on the drive's IRQ, matching the original
//! driver's boot-time PIO mode (`original_source/storage/ata/ata_pio.c`): "great in boot
//! env ... but consumes all CPU time", which is acceptable here since the DMA path isn't
//! implemented. LBA28 addressing only — large-disk LBA48 is a non-goal (SPEC_FULL §1).

use conquer_once::spin::OnceCell;
use spin::RwLock;

use crate::drivers::block::{BlockDevice, DeviceKind, TransportKind, BYTES_PER_SECTOR};
use crate::errors::BlockDeviceError;
use crate::io::{inb, inw, outb, outw, IOPort};

pub fn ata_devices() -> &'static RwLock<alloc::vec::Vec<AtaDevice>> {
    static ATA_DEVICES: OnceCell<RwLock<alloc::vec::Vec<AtaDevice>>> = OnceCell::uninit();
    ATA_DEVICES
        .try_get_or_init(|| RwLock::new(alloc::vec::Vec::new()))
        .unwrap()
}

const REG_DATA: u16 = 0;
const REG_ERROR: u16 = 1;
const REG_SECTOR_COUNT: u16 = 2;
const REG_LBA_LOW: u16 = 3;
const REG_LBA_MID: u16 = 4;
const REG_LBA_HIGH: u16 = 5;
const REG_DRIVE: u16 = 6;
const REG_COMMAND: u16 = 7;
const REG_STATUS: u16 = 7;

const CMD_READ_SECTORS: u8 = 0x20;
const CMD_WRITE_SECTORS: u8 = 0x30;
const CMD_IDENTIFY: u8 = 0xEC;

const STATUS_ERR: u8 = 0x01;
const STATUS_DRQ: u8 = 0x08;
const STATUS_BSY: u8 = 0x80;

pub struct AtaDevice {
    io_base: u16,
    /// Control block base; unused for now, kept for a future soft-reset path.
    #[allow(dead_code)]
    ctrl_base: u16,
    is_slave: bool,
    sector_count: u64,
}

impl AtaDevice {
    fn port(&self, offset: u16) -> IOPort {
        IOPort::from(self.io_base + offset)
    }

    fn select(&self, lba: u32) {
        let drive_byte = (if self.is_slave { 0xF0 } else { 0xE0 }) | ((lba >> 24) & 0x0F) as u8;
        outb(self.port(REG_DRIVE), drive_byte);
    }

    /// Waits for the drive to assert DRQ (ready for a data-register transfer).
    fn poll_status(&self) -> Result<(), BlockDeviceError> {
        let mut tries = 0u32;
        loop {
            let status = inb(u32::from(self.io_base + REG_STATUS));
            if status & STATUS_BSY == 0 {
                if status & STATUS_ERR != 0 {
                    return Err(BlockDeviceError::Internal);
                }
                if status & STATUS_DRQ != 0 {
                    return Ok(());
                }
            }
            tries += 1;
            if tries > 0xF_FFFF {
                return Err(BlockDeviceError::Busy);
            }
        }
    }

    /// Waits for BSY to clear without requiring DRQ, for non-data commands (cache flush).
    fn wait_ready(&self) -> Result<(), BlockDeviceError> {
        let mut tries = 0u32;
        loop {
            let status = inb(u32::from(self.io_base + REG_STATUS));
            if status & STATUS_BSY == 0 {
                return if status & STATUS_ERR != 0 {
                    Err(BlockDeviceError::Internal)
                } else {
                    Ok(())
                };
            }
            tries += 1;
            if tries > 0xF_FFFF {
                return Err(BlockDeviceError::Busy);
            }
        }
    }

    /// Probes the master or slave position on one IDE channel; absent drives read back
    /// `0xFF`/`0x00` status, matching `original_source/storage/ata/ata_pio.c`'s check.
    pub fn probe(io_base: u16, ctrl_base: u16, is_slave: bool) -> Result<Self, BlockDeviceError> {
        let status = inb(u32::from(io_base + REG_STATUS));
        if status == 0xFF || status == 0x00 {
            return Err(BlockDeviceError::Unreachable);
        }

        let mut dev = AtaDevice {
            io_base,
            ctrl_base,
            is_slave,
            sector_count: 0,
        };
        dev.identify()?;
        Ok(dev)
    }

    fn identify(&mut self) -> Result<(), BlockDeviceError> {
        outb(self.port(REG_DRIVE), if self.is_slave { 0xB0 } else { 0xA0 });
        outb(self.port(REG_SECTOR_COUNT), 0);
        outb(self.port(REG_LBA_LOW), 0);
        outb(self.port(REG_LBA_MID), 0);
        outb(self.port(REG_LBA_HIGH), 0);
        outb(self.port(REG_COMMAND), CMD_IDENTIFY);

        if inb(u32::from(self.io_base + REG_STATUS)) == 0 {
            return Err(BlockDeviceError::Unreachable);
        }
        self.poll_status()?;

        let mut words = [0u16; 256];
        for w in words.iter_mut() {
            *w = inw(u16::from(self.port(REG_DATA)));
        }
        let sectors = (words[61] as u32) << 16 | words[60] as u32;
        self.sector_count = u64::from(sectors);
        Ok(())
    }

}

impl BlockDevice for AtaDevice {
    fn capacity_sectors(&self) -> u64 {
        self.sector_count
    }

    fn kind(&self) -> DeviceKind {
        DeviceKind::HardDisk
    }

    fn transport(&self) -> TransportKind {
        TransportKind::Ata
    }

    fn read_sector(&mut self, sector: u64, buf: &mut [u8]) -> Result<(), BlockDeviceError> {
        if sector >= self.sector_count || buf.len() != BYTES_PER_SECTOR as usize {
            return Err(BlockDeviceError::OutOfRange);
        }
        let lba = sector as u32;
        if lba & 0xF000_0000 != 0 {
            return Err(BlockDeviceError::OutOfRange);
        }

        self.select(lba);
        outb(self.port(REG_ERROR), 0);
        outb(self.port(REG_SECTOR_COUNT), 1);
        outb(self.port(REG_LBA_LOW), (lba & 0xFF) as u8);
        outb(self.port(REG_LBA_MID), ((lba >> 8) & 0xFF) as u8);
        outb(self.port(REG_LBA_HIGH), ((lba >> 16) & 0xFF) as u8);
        outb(self.port(REG_COMMAND), CMD_READ_SECTORS);

        self.poll_status()?;
        for chunk in buf.chunks_exact_mut(2) {
            let word = inw(u16::from(self.port(REG_DATA)));
            chunk[0] = (word & 0xFF) as u8;
            chunk[1] = (word >> 8) as u8;
        }
        Ok(())
    }

    fn write_sector(&mut self, sector: u64, buf: &[u8]) -> Result<(), BlockDeviceError> {
        if sector >= self.sector_count || buf.len() != BYTES_PER_SECTOR as usize {
            return Err(BlockDeviceError::OutOfRange);
        }
        let lba = sector as u32;
        if lba & 0xF000_0000 != 0 {
            return Err(BlockDeviceError::OutOfRange);
        }

        self.select(lba);
        outb(self.port(REG_ERROR), 0);
        outb(self.port(REG_SECTOR_COUNT), 1);
        outb(self.port(REG_LBA_LOW), (lba & 0xFF) as u8);
        outb(self.port(REG_LBA_MID), ((lba >> 8) & 0xFF) as u8);
        outb(self.port(REG_LBA_HIGH), ((lba >> 16) & 0xFF) as u8);
        outb(self.port(REG_COMMAND), CMD_WRITE_SECTORS);

        self.poll_status()?;
        for chunk in buf.chunks_exact(2) {
            let word = u16::from(chunk[0]) | (u16::from(chunk[1]) << 8);
            outw(u16::from(self.port(REG_DATA)), word);
        }
        outb(self.port(REG_COMMAND), 0xE7);
        self.wait_ready()
    }
}
