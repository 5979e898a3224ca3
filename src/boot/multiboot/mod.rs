//! Multiboot information structure (SPEC_FULL §6 "Boot").
//!
//! Trimmed to the fields the kernel actually consumes at boot: the memory map, the boot
//! device's media class, and the command line. The teacher's VBE/framebuffer/symbol-table
//! fields described a graphics/debug surface this kernel does not carry; kept out rather
//! than adapted. Field layout and `Pod`/`Zeroable` idiom grounded on `mb_information.rs`
//! (teacher).

use bytemuck::{Pod, Zeroable};

use crate::mem::physical::{BlockKind, MmapEntry};
use crate::mem::PhyAddr;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
#[repr(C, packed)]
pub struct MultibootInformationFlags(u32);

impl MultibootInformationFlags {
    pub const NO_FLAGS: Self = Self(0);
    pub const MEM_FIELD_VALID: Self = Self(1 << 0);
    pub const BOOT_DEVICE_VALID: Self = Self(1 << 1);
    pub const CMDLINE_VALID: Self = Self(1 << 2);
    pub const MMAP_VALID: Self = Self(1 << 6);

    pub fn contains(self, bit: Self) -> bool {
        (self.0 & bit.0) != 0
    }
}

impl core::ops::BitOr for MultibootInformationFlags {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

/// Top byte of the BIOS boot-device field (SPEC_FULL §6): identifies the media class a
/// root volume was booted from, consulted by `args_parse`'s caller when `-root=` is
/// absent.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BootMediaClass {
    Floppy,
    HardDisk,
    Cdrom,
    Usb,
    Unknown(u8),
}

impl From<u8> for BootMediaClass {
    fn from(drive: u8) -> Self {
        match drive {
            0x00..=0x7E => BootMediaClass::Floppy,
            0x80 => BootMediaClass::HardDisk,
            0xE0 => BootMediaClass::Cdrom,
            0x81..=0xDF | 0xE1..=0xFE => BootMediaClass::HardDisk,
            _ => BootMediaClass::Unknown(drive),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
#[repr(C, packed)]
pub struct MultibootBootDevice {
    pub drive: u8,
    pub top_level_part: u8,
    pub sub_part: u8,
    pub sub_sub_part: u8,
}

impl MultibootBootDevice {
    pub fn media_class(self) -> BootMediaClass {
        BootMediaClass::from(self.drive)
    }
}

/// One raw `(size, base, length, kind)` memory-map record, as laid out by the
/// bootloader. `kind` follows the multiboot convention (1 = available, everything else
/// reserved) rather than this kernel's own [`BlockKind`]; [`MultibootMmapEntry::to_block`]
/// translates between the two.
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
#[repr(C, packed)]
pub struct MultibootMmapEntry {
    pub size: u32,
    pub base: u64,
    pub length: u64,
    pub kind: u32,
}

impl MultibootMmapEntry {
    const AVAILABLE: u32 = 1;

    pub fn to_block(self) -> MmapEntry {
        let kind = if self.kind == Self::AVAILABLE {
            BlockKind::Free
        } else {
            BlockKind::Hard
        };
        MmapEntry {
            base: self.base as u32,
            length: self.length.min(u64::from(u32::MAX)) as u32,
            kind,
        }
    }
}

/// Multiboot information structure (SPEC_FULL §6): memory map, boot device, and an
/// optional ASCII command-line pointer, everything else the bootloader may supply is out
/// of scope.
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
#[repr(C, packed)]
pub struct MultibootInformation {
    pub flags: MultibootInformationFlags,
    pub mem_lower: u32,
    pub mem_upper: u32,
    pub boot_device: MultibootBootDevice,
    pub cmdline: PhyAddr,
    pub mmap_length: u32,
    pub mmap_addr: PhyAddr,
}

impl MultibootInformation {
    /// Reads the NUL-terminated ASCII command line pointed to by `cmdline`, or an empty
    /// string if the bootloader did not supply one.
    ///
    /// # Safety
    /// `cmdline` must point at a valid NUL-terminated ASCII string if
    /// [`MultibootInformationFlags::CMDLINE_VALID`] is set.
    pub unsafe fn read_cmdline(&self) -> alloc::string::String {
        if !self.flags.contains(MultibootInformationFlags::CMDLINE_VALID) {
            return alloc::string::String::new();
        }
        let mut out = alloc::string::String::new();
        let mut ptr = self.cmdline.to_virt().as_ptr::<u8>();
        loop {
            let byte = core::ptr::read(ptr);
            if byte == 0 {
                break;
            }
            out.push(byte as char);
            ptr = ptr.add(1);
        }
        out
    }

    /// Reads the memory-map entry array at `mmap_addr`/`mmap_length` and translates each
    /// record into this kernel's own [`MmapEntry`] shape, for
    /// [`crate::mem::physical::PhysicalMemoryManager::init`].
    ///
    /// # Safety
    /// `mmap_addr`/`mmap_length` must describe a valid array of
    /// [`MultibootMmapEntry`] records if [`MultibootInformationFlags::MMAP_VALID`] is set.
    pub unsafe fn read_mmap(&self, out: &mut alloc::vec::Vec<MmapEntry>) {
        if !self.flags.contains(MultibootInformationFlags::MMAP_VALID) {
            return;
        }
        let mut ptr = self.mmap_addr.to_virt().as_ptr::<u8>();
        let end = ptr.add(self.mmap_length as usize);
        while ptr < end {
            let entry = core::ptr::read_unaligned(ptr as *const MultibootMmapEntry);
            out.push(entry.to_block());
            ptr = ptr.add(entry.size as usize + core::mem::size_of::<u32>());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hard_disk_drive_byte_is_hard_disk_class() {
        assert_eq!(BootMediaClass::from(0x80), BootMediaClass::HardDisk);
    }

    #[test]
    fn floppy_drive_byte_is_floppy_class() {
        assert_eq!(BootMediaClass::from(0x00), BootMediaClass::Floppy);
    }

    #[test]
    fn available_mmap_entry_becomes_free_block() {
        let entry = MultibootMmapEntry {
            size: 20,
            base: 0x10_0000,
            length: 0x3FF0_0000,
            kind: 1,
        };
        let block = entry.to_block();
        assert_eq!(block.kind, BlockKind::Free);
        assert_eq!(block.base, 0x10_0000);
    }

    #[test]
    fn reserved_mmap_entry_becomes_hard_block() {
        let entry = MultibootMmapEntry {
            size: 20,
            base: 0,
            length: 0x10_0000,
            kind: 2,
        };
        assert_eq!(entry.to_block().kind, BlockKind::Hard);
    }
}
