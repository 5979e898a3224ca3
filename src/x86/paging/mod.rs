//! x86 32-bit paging (SPEC_FULL §4.4).
//!
//! Two-level paging: a 1024-entry page directory, each present non-PSE entry pointing at
//! a 1024-entry page table, each entry mapping one 4 KiB page. PSE (4-MiB) entries map
//! directly to a physical frame without an intermediate table. Directories and tables are
//! both always 4 KiB-aligned and allocated from [`crate::mem::pageheap`].
//!
//! Entry bit layout modeled with `modular_bitfield`, matching the teacher's register-
//! bitfield idiom (`src/drivers/ide/ata_command.rs`) rather than hand-rolled shift/mask
//! constants. Exact map/unmap/clone semantics grounded in `original_source/memory/paging.c`.

use conquer_once::spin::OnceCell;
use modular_bitfield::prelude::*;

use crate::errors::PagingError;
use crate::mem::physical::{PhysicalMemoryManager, BlockKind, PHYSICAL_MEMORY};
use crate::mem::{Alignment, PhyAddr, VirtAddr, KERNEL_VIRTUAL_BASE};
use crate::mem::pageheap::PageTableHeap;

pub const ENTRY_COUNT: usize = 1024;
/// First page-directory index owned by the kernel; every address space aliases 768..1023.
pub const KERNEL_PD_INDEX_START: usize = 768;

#[bitfield]
#[derive(Clone, Copy)]
pub struct PageEntry {
    pub present: bool,
    pub writable: bool,
    pub user: bool,
    pub write_through: bool,
    pub cache_disable: bool,
    pub accessed: bool,
    pub dirty: bool,
    /// PSE bit for PD entries (4 MiB page); reserved (0) for PT entries.
    pub page_size: bool,
    pub global: bool,
    #[skip]
    __: B3,
    pub frame: B20,
}

impl PageEntry {
    pub fn addr(self) -> PhyAddr {
        PhyAddr::new(self.frame() << 12)
    }

    pub fn set_addr(self, addr: PhyAddr) -> Self {
        self.with_frame(addr.as_u32() >> 12)
    }
}

#[repr(C, align(4096))]
pub struct PageTable {
    pub entries: [PageEntry; ENTRY_COUNT],
}

impl PageTable {
    pub fn zeroed() -> Self {
        // SAFETY: an all-zero PageEntry has every flag clear (not present) and frame 0,
        // which is the correct "empty" bit pattern for a PDE/PTE.
        unsafe { core::mem::zeroed() }
    }
}

/// Owns the kernel's own page directory and drives map/unmap for any address space.
pub struct PagingManager<'a> {
    phys: &'a spin::Mutex<PhysicalMemoryManager>,
    pt_heap: spin::Mutex<PageTableHeap>,
}

impl<'a> PagingManager<'a> {
    pub fn new(phys: &'a spin::Mutex<PhysicalMemoryManager>, pt_heap: PageTableHeap) -> Self {
        Self {
            phys,
            pt_heap: spin::Mutex::new(pt_heap),
        }
    }

    fn alloc_table(&self) -> Result<VirtAddr, PagingError> {
        self.pt_heap
            .lock()
            .pt_alloc()
            .map_err(|_| PagingError::NoPageTableSlots)
    }

    fn alloc_frame(&self) -> Result<PhyAddr, PagingError> {
        self.phys
            .lock()
            .reserve(Alignment::ALIGN_4KB.bytes(), BlockKind::KernelFree)
            .map(PhyAddr::new)
            .map_err(|_| PagingError::NoPageTableSlots)
    }

    /// Maps one 4 KiB page at `vaddr` to a freshly reserved physical frame, creating the
    /// owning page table if needed. Fatal-by-contract if the page is already mapped
    /// (SPEC_FULL §4.4 invariant) — surfaced here as [`PagingError::AlreadyMapped`], left
    /// to the caller to decide whether that is a true invariant violation (fatal) or a
    /// recoverable condition (e.g. speculative pre-mapping).
    pub fn map_page(
        &self,
        directory: &mut PageTable,
        vaddr: VirtAddr,
        writable: bool,
        user: bool,
    ) -> Result<(), PagingError> {
        let frame = self.alloc_frame()?;
        self.map_page_to(directory, vaddr, frame, writable, user)
    }

    /// Like [`Self::map_page`] but with a caller-chosen physical frame (device BARs, PRDTs).
    pub fn map_page_to(
        &self,
        directory: &mut PageTable,
        vaddr: VirtAddr,
        frame: PhyAddr,
        writable: bool,
        user: bool,
    ) -> Result<(), PagingError> {
        let pde = directory.entries[vaddr.pd_index()];
        let table = if pde.present() {
            if pde.page_size() {
                return Err(PagingError::AlreadyMapped);
            }
            unsafe { &mut *(pde.addr().to_virt().as_mut_ptr::<PageTable>()) }
        } else {
            let table_vaddr = self.alloc_table()?;
            let table_ptr = table_vaddr.as_mut_ptr::<PageTable>();
            unsafe { *table_ptr = PageTable::zeroed() };
            let table_phys = PhyAddr::new(table_vaddr.as_u32() - KERNEL_VIRTUAL_BASE);
            directory.entries[vaddr.pd_index()] = PageEntry::new()
                .with_present(true)
                .with_writable(true)
                .with_user(user)
                .set_addr(table_phys);
            unsafe { &mut *table_ptr }
        };

        let entry = table.entries[vaddr.pt_index()];
        if entry.present() {
            return Err(PagingError::AlreadyMapped);
        }
        table.entries[vaddr.pt_index()] = PageEntry::new()
            .with_present(true)
            .with_writable(writable)
            .with_user(user)
            .set_addr(frame);
        Ok(())
    }

    /// Maps `size` bytes starting at `vaddr`, using 4-MiB PSE entries when the range is
    /// >= 4 MiB and both the base and size are 4-MiB aligned, falling back to page-by-page
    /// mapping otherwise (SPEC_FULL §4.4 `map_memory`).
    pub fn map_memory(
        &self,
        directory: &mut PageTable,
        vaddr: VirtAddr,
        size: u32,
        writable: bool,
        user: bool,
    ) -> Result<(), PagingError> {
        let mib4 = Alignment::ALIGN_4MB.bytes();
        if size >= mib4 && vaddr.is_aligned_with(Alignment::ALIGN_4MB) && size % mib4 == 0 {
            let mut offset = 0;
            while offset < size {
                let frame = self
                    .phys
                    .lock()
                    .reserve(mib4, BlockKind::KernelFree)
                    .map(PhyAddr::new)
                    .map_err(|_| PagingError::NoPageTableSlots)?;
                let entry_vaddr = vaddr + offset;
                directory.entries[entry_vaddr.pd_index()] = PageEntry::new()
                    .with_present(true)
                    .with_writable(writable)
                    .with_user(user)
                    .with_page_size(true)
                    .set_addr(frame);
                offset += mib4;
            }
            return Ok(());
        }

        let page = Alignment::ALIGN_4KB.bytes();
        let mut offset = 0;
        while offset < size {
            self.map_page(directory, vaddr + offset, writable, user)?;
            offset += page;
        }
        Ok(())
    }

    /// Unmaps one 4 KiB page, freeing its physical frame. Fatal-by-contract if the page
    /// was not mapped — surfaced as [`PagingError::NotMapped`].
    pub fn unmap_page(&self, directory: &mut PageTable, vaddr: VirtAddr) -> Result<(), PagingError> {
        let pde = directory.entries[vaddr.pd_index()];
        if !pde.present() || pde.page_size() {
            return Err(PagingError::NotMapped);
        }
        let table = unsafe { &mut *(pde.addr().to_virt().as_mut_ptr::<PageTable>()) };
        let entry = table.entries[vaddr.pt_index()];
        if !entry.present() {
            return Err(PagingError::NotMapped);
        }
        let _ = self.phys.lock().free(entry.addr().as_u32());
        table.entries[vaddr.pt_index()] = PageEntry::new();
        Ok(())
    }

    pub fn is_mapped(&self, directory: &PageTable, vaddr: VirtAddr) -> bool {
        let pde = directory.entries[vaddr.pd_index()];
        if !pde.present() {
            return false;
        }
        if pde.page_size() {
            return true;
        }
        let table = unsafe { &*(pde.addr().to_virt().as_ptr::<PageTable>()) };
        table.entries[vaddr.pt_index()].present()
    }

    pub fn get_physical(&self, directory: &PageTable, vaddr: VirtAddr) -> Option<PhyAddr> {
        let pde = directory.entries[vaddr.pd_index()];
        if !pde.present() {
            return None;
        }
        if pde.page_size() {
            return Some(pde.addr() + (vaddr.as_u32() & 0x003F_FFFF));
        }
        let table = unsafe { &*(pde.addr().to_virt().as_ptr::<PageTable>()) };
        let entry = table.entries[vaddr.pt_index()];
        entry.present().then(|| entry.addr() + vaddr.page_offset() as u32)
    }

    /// Produces a fresh directory whose kernel half (indices 768..1023) aliases `kernel`
    /// by value and whose user half starts empty — the "kernel clone" construction step
    /// described in SPEC_FULL §4.4 before `copy_adress_space` deep-copies user mappings.
    pub fn new_kernel_clone(&self, kernel: &PageTable) -> Result<VirtAddr, PagingError> {
        let dir_vaddr = self.alloc_table()?;
        let dir = unsafe { &mut *(dir_vaddr.as_mut_ptr::<PageTable>()) };
        *dir = PageTable::zeroed();
        dir.entries[KERNEL_PD_INDEX_START..].copy_from_slice(&kernel.entries[KERNEL_PD_INDEX_START..]);
        Ok(dir_vaddr)
    }

    /// `copy_adress_space`: a fresh directory whose kernel half aliases `source` and whose
    /// user half (indices 0..768) is deep-copied frame-for-frame, for `fork` (SPEC_FULL
    /// §4.7, §8 testable property "Address-space isolation").
    pub fn clone_address_space(&self, source: &PageTable) -> Result<VirtAddr, PagingError> {
        let dir_vaddr = self.new_kernel_clone(source)?;
        let dir = unsafe { &mut *(dir_vaddr.as_mut_ptr::<PageTable>()) };

        for pd_idx in 0..KERNEL_PD_INDEX_START {
            let pde = source.entries[pd_idx];
            if !pde.present() {
                continue;
            }
            if pde.page_size() {
                let frame = self
                    .phys
                    .lock()
                    .reserve(Alignment::ALIGN_4MB.bytes(), BlockKind::KernelFree)
                    .map(PhyAddr::new)
                    .map_err(|_| PagingError::NoPageTableSlots)?;
                unsafe {
                    core::ptr::copy_nonoverlapping(
                        pde.addr().to_virt().as_ptr::<u8>(),
                        frame.to_virt().as_mut_ptr::<u8>(),
                        Alignment::ALIGN_4MB.bytes() as usize,
                    );
                }
                dir.entries[pd_idx] = pde.set_addr(frame);
                continue;
            }

            let src_table = unsafe { &*(pde.addr().to_virt().as_ptr::<PageTable>()) };
            let new_table_vaddr = self.alloc_table()?;
            let new_table_ptr = new_table_vaddr.as_mut_ptr::<PageTable>();
            unsafe { *new_table_ptr = PageTable::zeroed() };
            let new_table = unsafe { &mut *new_table_ptr };

            for pt_idx in 0..ENTRY_COUNT {
                let entry = src_table.entries[pt_idx];
                if !entry.present() {
                    continue;
                }
                let frame = self.alloc_frame()?;
                unsafe {
                    core::ptr::copy_nonoverlapping(
                        entry.addr().to_virt().as_ptr::<u8>(),
                        frame.to_virt().as_mut_ptr::<u8>(),
                        Alignment::ALIGN_4KB.bytes() as usize,
                    );
                }
                new_table.entries[pt_idx] = entry.set_addr(frame);
            }

            let new_table_phys = PhyAddr::new(new_table_vaddr.as_u32() - KERNEL_VIRTUAL_BASE);
            dir.entries[pd_idx] = pde.set_addr(new_table_phys);
        }
        Ok(dir_vaddr)
    }
}

static PAGING_MANAGER: OnceCell<PagingManager<'static>> = OnceCell::uninit();

/// Initializes the kernel-global paging manager. Must run once at boot, after the
/// physical memory manager and page-table heap are ready.
pub fn init_paging_manager(pt_heap: PageTableHeap) {
    PAGING_MANAGER.init_once(|| PagingManager::new(&PHYSICAL_MEMORY, pt_heap));
}

pub fn paging_manager() -> &'static PagingManager<'static> {
    PAGING_MANAGER.get().expect("paging manager accessed before init_paging_manager")
}

/// The kernel's own page directory — every process directory's entries 768..1023 are
/// copies of this one (`new_kernel_clone`). Kept behind a lock rather than a raw pointer
/// so kernel-only mappings (stack growth, heap expansion) can mutate it safely.
pub static KERNEL_DIRECTORY: spin::Mutex<Option<PageTable>> = spin::Mutex::new(None);

pub fn init_kernel_directory() {
    let mut guard = KERNEL_DIRECTORY.lock();
    if guard.is_none() {
        *guard = Some(PageTable::zeroed());
    }
}

pub fn with_kernel_directory<R>(f: impl FnOnce(&mut PageTable) -> R) -> R {
    let mut guard = KERNEL_DIRECTORY.lock();
    let dir = guard.as_mut().expect("kernel directory accessed before init_kernel_directory");
    f(dir)
}

#[derive(Clone, Copy, Debug)]
pub enum PageMappingError {
    BadAlignment,
}

impl crate::errors::BaseError for PageMappingError {}
