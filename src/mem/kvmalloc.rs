//! Kernel virtual-memory block allocator (SPEC_FULL §4, item 5).
//!
//! Reserves/frees variable-length virtual ranges in the high half for transient
//! mappings — kernel windows used by `copy_adress_space`'s fork copy-through, DMA PRDT
//! buffers, and similar short-lived mappings that do not belong in the general heap.
//! Structurally mirrors [`crate::mem::physical`]'s block list; grounded on
//! `original_source/memory/kvmheap.c`.

use alloc::vec::Vec;

use conquer_once::spin::OnceCell;
use spin::Mutex;

use crate::errors::MemoryError;
use crate::mem::{Alignment, VirtAddr};

static KERNEL_VIRTUAL_ALLOCATOR: OnceCell<Mutex<KernelVirtualAllocator>> = OnceCell::uninit();

/// Installs the kernel-global virtual-block allocator. Must run once at boot, after
/// paging is up, before any subsystem reserves a transient kernel window.
pub fn init_kernel_virtual_allocator(base: VirtAddr, size: u32) {
    KERNEL_VIRTUAL_ALLOCATOR.init_once(|| Mutex::new(KernelVirtualAllocator::new(base, size)));
}

pub fn kernel_virtual_allocator() -> &'static Mutex<KernelVirtualAllocator> {
    KERNEL_VIRTUAL_ALLOCATOR
        .get()
        .expect("kernel virtual allocator accessed before init_kernel_virtual_allocator")
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum VBlockStatus {
    Free,
    Reserved,
}

#[derive(Clone, Copy, Debug)]
struct VBlock {
    base: VirtAddr,
    size: u32,
    status: VBlockStatus,
    prev: Option<usize>,
    next: Option<usize>,
}

pub struct KernelVirtualAllocator {
    blocks: Vec<VBlock>,
    head: Option<usize>,
}

impl KernelVirtualAllocator {
    pub fn new(base: VirtAddr, size: u32) -> Self {
        Self {
            blocks: alloc::vec![VBlock {
                base,
                size,
                status: VBlockStatus::Free,
                prev: None,
                next: None,
            }],
            head: Some(0),
        }
    }

    fn find(&self, pred: impl Fn(&VBlock) -> bool) -> Option<usize> {
        let mut cur = self.head;
        while let Some(idx) = cur {
            if pred(&self.blocks[idx]) {
                return Some(idx);
            }
            cur = self.blocks[idx].next;
        }
        None
    }

    /// Reserves `size` bytes, rounded up to 4 KiB, returning the base virtual address.
    pub fn reserve(&mut self, size: u32) -> Result<VirtAddr, MemoryError> {
        let align = Alignment::ALIGN_4KB.bytes();
        let size = (size.max(1) + align - 1) & !(align - 1);

        let idx = self
            .find(|b| b.status == VBlockStatus::Free && b.size >= size)
            .ok_or(MemoryError::OutOfMemory)?;

        let base = self.blocks[idx].base;
        let remaining = self.blocks[idx].size - size;
        if remaining > 0 {
            let new_idx = self.blocks.len();
            let next = self.blocks[idx].next;
            self.blocks.push(VBlock {
                base: base + size,
                size: remaining,
                status: VBlockStatus::Free,
                prev: Some(idx),
                next,
            });
            if let Some(n) = next {
                self.blocks[n].prev = Some(new_idx);
            }
            self.blocks[idx].next = Some(new_idx);
        }
        self.blocks[idx].size = size;
        self.blocks[idx].status = VBlockStatus::Reserved;
        Ok(base)
    }

    /// Frees a previously reserved range, merging with adjacent free neighbors both ways.
    pub fn free(&mut self, base: VirtAddr) -> Result<(), MemoryError> {
        let idx = self.find(|b| b.base == base).ok_or(MemoryError::UnknownBlock)?;
        if self.blocks[idx].status != VBlockStatus::Reserved {
            return Err(MemoryError::NotFreeable);
        }
        self.blocks[idx].status = VBlockStatus::Free;

        let mut cur = idx;
        while let Some(p) = self.blocks[cur].prev {
            if self.blocks[p].status != VBlockStatus::Free {
                break;
            }
            self.blocks[p].size += self.blocks[cur].size;
            let next = self.blocks[cur].next;
            self.blocks[p].next = next;
            if let Some(n) = next {
                self.blocks[n].prev = Some(p);
            }
            cur = p;
        }
        loop {
            match self.blocks[cur].next {
                Some(n) if self.blocks[n].status == VBlockStatus::Free => {
                    self.blocks[cur].size += self.blocks[n].size;
                    let after = self.blocks[n].next;
                    self.blocks[cur].next = after;
                    if let Some(a) = after {
                        self.blocks[a].prev = Some(cur);
                    }
                }
                _ => break,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserve_rounds_up_and_frees_cleanly() {
        let mut alloc = KernelVirtualAllocator::new(VirtAddr::new(0xE000_0000), 0x10_0000);
        let a = alloc.reserve(1).unwrap();
        let b = alloc.reserve(0x2000).unwrap();
        assert_eq!(b.as_u32() - a.as_u32(), 0x1000);
        alloc.free(a).unwrap();
        alloc.free(b).unwrap();
        let c = alloc.reserve(0x10_0000 - 0x1000).unwrap();
        assert_eq!(c, VirtAddr::new(0xE000_0000));
    }
}
