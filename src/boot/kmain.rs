//! Boot-sequence wiring (SPEC_FULL §2 module order, §6 "Boot").
//!
//! [`kernel_main`] performs, once, in order, the dependency chain SPEC_FULL §2 lays out:
//! physical memory map, kernel heap, page-table heap, kernel virtual allocator, paging,
//! block devices, VFS, process/thread/scheduler, syscall dispatch — then hands off to pid
//! 1 and never returns. Grounded on the teacher's `fzboot/kernel/src/main.rs` `_start`/
//! `_kmain` split (minimal-stack `mem_init` before the real main body), adapted from its
//! long-mode/E820 entry to this kernel's 32-bit multiboot one. The `#[global_allocator]`
//! static and the naked `_start` trampoline are deliberately NOT declared here, matching
//! the teacher's own placement: both belong to the final boot-stage binary that links
//! this crate (`fzboot/kernel/src/main.rs` for the teacher), one level below a library.

use alloc::vec::Vec;

use crate::boot::args::{args_parse, root_token_to_string};
use crate::boot::multiboot::MultibootInformation;
use crate::drivers::ata::{ata_devices, AtaDevice};
use crate::drivers::block::read_partition_table;
use crate::drivers::console;
use crate::errors::MemoryError;
use crate::fs::devfs::DevFs;
use crate::fs::mount::MOUNTS;
use crate::fs::{self, build_filesystem, detect_fs_type};
use crate::log_setup;
use crate::mem::kheap::{HeapExpansion, KernelHeap, LockedKernelHeap};
use crate::mem::kvmalloc::init_kernel_virtual_allocator;
use crate::mem::pageheap::PageTableHeap;
use crate::mem::physical::PHYSICAL_MEMORY;
use crate::mem::{
    VirtAddr, KERNEL_HEAP_BASE, KERNEL_HEAP_INITIAL_SIZE, KVMALLOC_BASE, KVMALLOC_SIZE,
    PAGE_TABLE_HEAP_BASE,
};
use crate::process;
use crate::sched;
use crate::syscall;
use crate::x86::idt::{GateDescriptor, GateType, SegmentSelector, Table};
use crate::x86::paging::{
    init_kernel_directory, init_paging_manager, paging_manager, with_kernel_directory, PageTable,
};

/// Physical range backing the kernel heap's initial 4 MiB, chosen right past the kernel
/// image reservation (`KERNEL_IMAGE_BASE + KERNEL_IMAGE_SIZE`, see
/// [`crate::mem::physical`]) so neither overlaps.
const KERNEL_HEAP_PHYS_BASE: u32 = 0x0040_0000;

/// Standard ISA primary/secondary IDE ports, matching `original_source/storage/ata/ata_common.c`'s
/// fixed-port probe (no PCI enumeration in this kernel, SPEC_FULL §4.5 non-goals).
const ATA_CHANNELS: [(u16, u16); 2] = [(0x1F0, 0x3F6), (0x170, 0x376)];

/// Kernel code segment selector, matching every gate the original installs
/// (`original_source/cpu/idt.c`'s `init_idt_desc(_, 0x08, ...)`); the flat protected-mode
/// GDT that defines it is set up by the boot stage ahead of `kernel_main`.
const KERNEL_CODE_SELECTOR: u16 = 0x08;

/// Mirrors newly mapped kernel-heap regions into every live process's directory.
/// `new_kernel_clone`/`clone_address_space` alias the kernel half of a fresh directory
/// by value at fork/spawn time (`x86/paging/mod.rs`); a region mapped into the kernel
/// directory *after* that clone was taken is invisible to it until copied over
/// explicitly. This is the cross-address-space walk described in DESIGN.md's Open
/// Question decision #1 — lock held for the whole walk, a rare, non-preemptive event.
struct KernelHeapExpansion;

impl HeapExpansion for KernelHeapExpansion {
    fn expand(&mut self, vaddr: VirtAddr, size: u32) -> Result<(), MemoryError> {
        with_kernel_directory(|dir| paging_manager().map_memory(dir, vaddr, size, true, false))
            .map_err(|_| MemoryError::OutOfMemory)?;

        let start = vaddr.pd_index();
        let end = (vaddr + (size - 1)).pd_index();
        with_kernel_directory(|kernel| {
            let kernel_entries = kernel.entries;
            process::for_each_owned_directory(|dir| {
                dir.entries[start..=end].copy_from_slice(&kernel_entries[start..=end]);
            });
        });
        Ok(())
    }
}

/// The kernel's global allocator instance. Not itself annotated `#[global_allocator]` —
/// that attribute, and the naked entry point that calls [`kernel_main`], belong to the
/// boot-stage binary that links this crate, matching the teacher's own split between
/// `fzboot::mem::vmalloc::SyncKernelHeapAllocator` (library) and the `#[global_allocator]`
/// static declared in `fzboot/kernel/src/main.rs` (binary).
pub static KERNEL_HEAP_ALLOCATOR: LockedKernelHeap<KernelHeapExpansion> = LockedKernelHeap::uninit();

/// Builds the 32-bit IDT: every vector defaults to the unhandled-interrupt gate already
/// registered by [`crate::fzboot::exceptions`] (left as teacher reference, pending the
/// final trim), with vector `0x20` (timer) and `0x80` (syscall) overwritten to this
/// kernel's own entry points. Table storage and the `lidt` load are grounded on
/// `x86::idt`'s existing `Table`/`IDTDescriptor` API, unused by anything until now.
unsafe fn install_idt() {
    static mut IDT_TABLE: [u8; 256 * 8] = [0; 256 * 8];
    static mut IDTR: [u8; 6] = [0; 6];

    let mut table = Table::empty();
    table.populate_default();

    if let Some(gate) = table.get_entry_mut(0x20) {
        *gate = timer_gate();
    }
    if let Some(gate) = table.get_entry_mut(0x80) {
        *gate = syscall_gate();
    }

    let table_addr = core::ptr::addr_of!(IDT_TABLE) as u32;
    table.write(table_addr);

    let mut descriptor = crate::x86::idt::IDTDescriptor::new();
    descriptor.set_offset(table_addr);
    let idtr_addr = core::ptr::addr_of!(IDTR) as usize;
    descriptor.store(idtr_addr);

    crate::x86::idt::load_idt(idtr_addr);
}

fn timer_gate() -> GateDescriptor {
    let mut gate = GateDescriptor::new();
    gate.set_offset(sched::timer_interrupt_entry as usize as u32);
    gate.set_segment_selector(
        SegmentSelector::new()
            .with_gdt()
            .with_privilege(0)
            .with_segment_index(KERNEL_CODE_SELECTOR),
    );
    gate.set_type(GateType::InterruptGate32b);
    gate.set_valid();
    gate
}

fn syscall_gate() -> GateDescriptor {
    let mut gate = GateDescriptor::new();
    gate.set_offset(syscall::syscall_entry as usize as u32);
    gate.set_segment_selector(
        SegmentSelector::new()
            .with_gdt()
            .with_privilege(3)
            .with_segment_index(KERNEL_CODE_SELECTOR),
    );
    gate.set_type(GateType::TrapGate32b);
    gate.set_valid();
    gate
}

/// Probes both ISA IDE channels' master position, registers each as a devfs whole-disk
/// node (`sda`, `sdb`, ...) and each of its partitions (`sda1`, ...), and mounts a
/// filesystem on the first partition whose first sectors `detect_fs_type` recognizes
/// (or the `-root=` one, SPEC_FULL §4.11). Slaves and PCI-enumerated controllers are a
/// non-goal (SPEC_FULL §4.5).
///
/// Channel index and `ata_devices()` registry index walk together by construction (one
/// push per successful probe, in channel order), so there is no separate index to keep
/// in sync across two passes. The root filesystem's
/// [`crate::drivers::block::BlockDevice`] is a second, independently probed [`AtaDevice`]
/// rather than one moved out of the registry — `build_filesystem` needs to own its
/// device, and the registry entry must stay put for the devfs partition node that
/// already captured its index.
fn probe_register_and_mount(devfs: &DevFs, root_token: Option<[u8; 4]>) {
    let root_name = root_token.map(root_token_to_string);
    let mut disk_letter = b'a';

    for &(io_base, ctrl_base) in &ATA_CHANNELS {
        let Ok(mut device) = AtaDevice::probe(io_base, ctrl_base, false) else {
            continue;
        };
        let partitions = read_partition_table(&mut device).unwrap_or_default();
        let ata_index = {
            let mut devices = ata_devices().write();
            devices.push(device);
            devices.len() - 1
        };

        let disk_name = alloc::format!("sd{}", disk_letter as char);
        devfs.register_block_device(&disk_name, ata_index);

        for (part_index, part) in partitions.iter().enumerate() {
            let name = alloc::format!("{}{}", disk_name, part_index + 1);
            devfs.register_partition(&name, ata_index, part.start_lba);

            let should_mount = root_name.as_deref().map(|r| r == name).unwrap_or(part_index == 0);
            if !should_mount || fs::resolve("/").is_ok() {
                continue;
            }

            let Ok(root_device) = AtaDevice::probe(io_base, ctrl_base, false) else {
                continue;
            };
            let mut root_device: alloc::boxed::Box<dyn crate::drivers::block::BlockDevice + Send> =
                alloc::boxed::Box::new(root_device);
            if let Some(kind) = detect_fs_type(&mut *root_device) {
                if let Ok(filesystem) = build_filesystem(kind, root_device, part.start_lba) {
                    MOUNTS.write().mount("/", filesystem);
                }
            }
        }

        disk_letter += 1;
    }
}

/// Boot sequence entry. Never returns: the last step hands the CPU to pid 1 via
/// [`sched::start_scheduling`].
///
/// # Safety
/// Must run exactly once, synchronously, before interrupts are enabled and before any
/// other kernel subsystem is touched. `mb_info` must be a valid, bootloader-populated
/// [`MultibootInformation`].
pub unsafe fn kernel_main(mb_info: &MultibootInformation) -> ! {
    console::init();

    let cmdline = mb_info.read_cmdline();
    let config = args_parse(&cmdline);

    let filter = if config.silent { log::LevelFilter::Error } else { log::LevelFilter::Info };
    log_setup::init(filter);
    log::info!("booting");

    let mut mmap = Vec::new();
    mb_info.read_mmap(&mut mmap);
    PHYSICAL_MEMORY.lock().init(&mmap, KERNEL_HEAP_PHYS_BASE, KERNEL_HEAP_INITIAL_SIZE);

    init_kernel_directory();
    let pt_heap = PageTableHeap::new(PAGE_TABLE_HEAP_BASE);
    init_paging_manager(pt_heap);

    with_kernel_directory(|dir| {
        paging_manager()
            .map_memory(dir, PAGE_TABLE_HEAP_BASE, crate::mem::pageheap::SLOT_COUNT as u32 * crate::mem::pageheap::SLOT_SIZE, true, false)
            .expect("failed to map page-table heap window");

        for offset in (0..KERNEL_HEAP_INITIAL_SIZE).step_by(4096) {
            paging_manager()
                .map_page_to(
                    dir,
                    KERNEL_HEAP_BASE + offset,
                    crate::mem::PhyAddr::new(KERNEL_HEAP_PHYS_BASE + offset),
                    true,
                    false,
                )
                .expect("failed to map kernel heap seed");
        }
    });

    KERNEL_HEAP_ALLOCATOR.init(KernelHeap::new(KERNEL_HEAP_BASE, KERNEL_HEAP_INITIAL_SIZE, KernelHeapExpansion));
    init_kernel_virtual_allocator(KVMALLOC_BASE, KVMALLOC_SIZE);

    process::init_kernel_process();
    let idle_entry = VirtAddr::new(idle_loop as usize as u32);
    process::init_idle_process(idle_entry);
    sched::init_scheduler();

    let devfs = DevFs::new();
    probe_register_and_mount(&devfs, config.root);
    MOUNTS.write().mount("/dev", alloc::boxed::Box::new(devfs));

    let (_, tty_inode) = fs::resolve("/dev/tty1").expect("devfs did not register tty1");

    // `install_idt`'s `load_idt` turns interrupts on as its last step (matching the
    // original's `init_idt`/`sti` sequence) — deferred until every subsystem the timer
    // or a syscall could touch is already live, so the first tick never races init.
    install_idt();

    let init_pid = process::spawn_init_process("/sys/init", tty_inode)
        .expect("failed to spawn init process");
    sched::add_process(init_pid);

    log::info!("handing off to init (pid {})", init_pid.as_raw());
    sched::start_scheduling(init_pid)
}

/// The idle thread's entry point: spins on `hlt` forever, woken only by the next
/// interrupt (SPEC_FULL §4.8 "Idle process").
extern "C" fn idle_loop() -> ! {
    loop {
        unsafe { core::arch::asm!("hlt") }
    }
}
