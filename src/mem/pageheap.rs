//! Page-table heap (SPEC_FULL §4.3).
//!
//! A fixed pool of 1024 4 KiB-aligned slots, carved out of a dedicated 4 MiB physical
//! range mapped contiguously into a reserved high-half window. Kept separate from the
//! general kernel heap because page directories and tables must be both 4 KiB-aligned
//! and individually freeable, which `kheap` does not guarantee. Grounded on
//! `original_source/memory/kpageheap.c`; the slot bitmap uses `vob::Vob` (the teacher's
//! own bit-vector dependency) instead of a hand-rolled bit array.

use vob::Vob;

use crate::errors::MemoryError;
use crate::mem::VirtAddr;

pub const SLOT_COUNT: usize = 1024;
pub const SLOT_SIZE: u32 = 4096;

pub struct PageTableHeap {
    base: VirtAddr,
    used: Vob,
}

impl PageTableHeap {
    pub fn new(base: VirtAddr) -> Self {
        Self {
            base,
            used: Vob::from_elem(SLOT_COUNT, false),
        }
    }

    /// Returns the virtual address of the first free slot, marking it used.
    pub fn pt_alloc(&mut self) -> Result<VirtAddr, MemoryError> {
        for slot in 0..SLOT_COUNT {
            if !self.used.get(slot).unwrap_or(true) {
                self.used.set(slot, true);
                return Ok(self.base + (slot as u32 * SLOT_SIZE));
            }
        }
        Err(MemoryError::OutOfMemory)
    }

    /// Releases a slot previously returned by `pt_alloc`.
    pub fn pt_free(&mut self, addr: VirtAddr) -> Result<(), MemoryError> {
        let offset = addr - self.base;
        if offset % SLOT_SIZE != 0 {
            return Err(MemoryError::UnknownBlock);
        }
        let slot = (offset / SLOT_SIZE) as usize;
        if slot >= SLOT_COUNT || !self.used.get(slot).unwrap_or(false) {
            return Err(MemoryError::UnknownBlock);
        }
        self.used.set(slot, false);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_then_free_is_reusable() {
        let mut heap = PageTableHeap::new(VirtAddr::new(0xD000_0000));
        let a = heap.pt_alloc().unwrap();
        let b = heap.pt_alloc().unwrap();
        assert_ne!(a, b);
        heap.pt_free(a).unwrap();
        let c = heap.pt_alloc().unwrap();
        assert_eq!(a, c);
    }

    #[test]
    fn exhaustion_reports_out_of_memory() {
        let mut heap = PageTableHeap::new(VirtAddr::new(0xD000_0000));
        for _ in 0..SLOT_COUNT {
            heap.pt_alloc().unwrap();
        }
        assert!(matches!(heap.pt_alloc(), Err(MemoryError::OutOfMemory)));
    }
}
