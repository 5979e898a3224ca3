//! Kernel stack management code
//!
//! Contains the memory allocator for the kernel stack address space.

use alloc::vec::Vec;
use conquer_once::spin::OnceCell;
use spin::Mutex;

use crate::mem::{VirtAddr, KERNEL_STACK_MAPPING_BASE, KERNEL_STACK_SIZE};
use crate::x86::paging::{paging_manager, with_kernel_directory};

static MAIN_KERNEL_STACK_ALLOCATOR: OnceCell<Mutex<VirtualKernelStackAllocator>> = OnceCell::uninit();

/// Returns the Kernel stack allocator for this system.
///
/// Must be used when creating a new kernel thread, which uses a different stack every time.
/// The allocator manages the allocation and freeing of those stacks, as well as the mapping to physical memory.
pub fn get_kernel_stack_allocator() -> &'static Mutex<VirtualKernelStackAllocator> {
    MAIN_KERNEL_STACK_ALLOCATOR.get_or_init(|| Mutex::new(VirtualKernelStackAllocator::new(KERNEL_STACK_MAPPING_BASE)))
}

/// Kernel stack allocator.
///
/// It manages the virtual memory space dedicated to the kernel stack ([`KERNEL_STACK_MAPPING_BASE`]), and maps
/// the kernel stack's virtual address space to physical memory with the appropriate flags.
pub struct VirtualKernelStackAllocator {
    running_ptr: VirtAddr,
    free_stacks: Vec<VirtAddr>,
}

impl VirtualKernelStackAllocator {
    pub fn new(base: VirtAddr) -> Self {
        Self {
            running_ptr: base,
            free_stacks: Vec::new(),
        }
    }

    /// Allocates a new kernel stack, returning the top-of-stack address (the initial
    /// `esp`). Used when creating a new kernel thread, as each one relies on a different
    /// stack (SPEC_FULL §4.7 "the kernel stack size is fixed per thread").
    pub fn alloc_stack(&mut self) -> VirtAddr {
        let base = match self.free_stacks.pop() {
            Some(base) => base,
            None => {
                let base = self.running_ptr;
                with_kernel_directory(|dir| {
                    paging_manager().map_memory(dir, base, KERNEL_STACK_SIZE, true, false)
                })
                .expect("kernel stack mapping failed");
                self.running_ptr += KERNEL_STACK_SIZE;
                base
            }
        };
        base + KERNEL_STACK_SIZE
    }

    pub fn free_stack(&mut self, stack_top: VirtAddr) {
        self.free_stacks.push(stack_top + (0u32.wrapping_sub(KERNEL_STACK_SIZE)));
    }
}
