//! Syscall dispatch (SPEC_FULL §4.10).
//!
//! Entry is interrupt 0x80: `eax` carries the syscall number, `ebx`/`ecx`/`edx` its three
//! arguments. Dispatch indexes a fixed-size table of `Option<SyscallHandler>` directly by
//! number (matching the original's static `system_calls[]` table rather than a `match`),
//! runs the handler in the calling thread's own context (no address-space switch happens
//! on syscall entry — user and kernel share the calling process's `cr3`), and writes the
//! result back as `(eax = value, ecx = error kind)`. Numbering and per-syscall semantics
//! are grounded on `original_source/tasking/processes/syscalls.{c,h}`; the naked-entry/
//! register-save shape mirrors [`crate::sched::timer_interrupt_entry`].

pub mod handlers;

use core::arch::asm;

use crate::errors::SyscallError;
use crate::mem::VirtAddr;
use crate::process::{self, AddressSpace, ProcessId};
use crate::x86::paging::{paging_manager, PageTable};

pub const SYSCALL_COUNT: usize = 52;

/// One syscall handler: `(caller, ebx, ecx, edx) -> (value, error)`.
pub type SyscallHandler = fn(ProcessId, u32, u32, u32) -> Result<u32, SyscallError>;

const TABLE: [Option<SyscallHandler>; SYSCALL_COUNT] = {
    let mut table: [Option<SyscallHandler>; SYSCALL_COUNT] = [None; SYSCALL_COUNT];
    table[1] = Some(handlers::sys_open as SyscallHandler);
    table[2] = Some(handlers::sys_close as SyscallHandler);
    table[3] = Some(handlers::sys_read as SyscallHandler);
    table[4] = Some(handlers::sys_write as SyscallHandler);
    table[7] = Some(handlers::sys_seek as SyscallHandler);
    table[8] = Some(handlers::sys_stat as SyscallHandler);
    table[14] = Some(handlers::sys_readdir as SyscallHandler);
    table[16] = Some(handlers::sys_dup as SyscallHandler);
    table[31] = Some(handlers::sys_fork as SyscallHandler);
    table[32] = Some(handlers::sys_exit as SyscallHandler);
    table[33] = Some(handlers::sys_exec as SyscallHandler);
    table[34] = Some(handlers::sys_wait as SyscallHandler);
    table[37] = Some(handlers::sys_sig as SyscallHandler);
    table[38] = Some(handlers::sys_sigaction as SyscallHandler);
    table[40] = Some(handlers::sys_sbrk as SyscallHandler);
    table[51] = Some(handlers::sys_ioctl as SyscallHandler);
    table
};

/// `ptr_validate` (SPEC_FULL §4.10): below the user/kernel split and currently mapped in
/// the caller's own page directory. A NULL pointer is never valid.
pub fn ptr_validate(pid: ProcessId, ptr: VirtAddr) -> bool {
    if ptr == VirtAddr::NULL || !ptr.is_user_range() {
        return false;
    }
    let Some(handle) = process::get_process(pid) else { return false };
    let address_space = handle.lock().address_space;
    match address_space {
        AddressSpace::Owned(dir_vaddr) => {
            let directory = unsafe { &*dir_vaddr.as_ptr::<PageTable>() };
            paging_manager().is_mapped(directory, ptr)
        }
        AddressSpace::Kernel => false,
    }
}

fn dispatch(pid: ProcessId, number: usize, ebx: u32, ecx: u32, edx: u32) -> (u32, SyscallError) {
    match TABLE.get(number).copied().flatten() {
        Some(handler) => match handler(pid, ebx, ecx, edx) {
            Ok(value) => (value, SyscallError::None),
            Err(e) => (0, e),
        },
        None => (0, SyscallError::Unknown),
    }
}

/// General-purpose registers as `pushad` lays them out in memory (lowest address first),
/// identical in shape to [`crate::sched`]'s equivalent — kept as a separate type since the
/// two naked entries are independent and neither should depend on the other's internals.
#[repr(C)]
struct SyscallGprs {
    edi: u32,
    esi: u32,
    ebp: u32,
    esp_dummy: u32,
    ebx: u32,
    edx: u32,
    ecx: u32,
    eax: u32,
}

/// The CPU-pushed frame sitting right above [`SyscallGprs`] on the stack. `int 0x80` is
/// only ever executed from ring 3 (no kernel code issues it), so unlike
/// [`crate::sched::yield_now`]'s same-privilege `int 0x20`, this frame is always the full
/// five dwords — no conditional shape to handle here.
#[repr(C)]
struct HardwareFrame {
    eip: u32,
    cs: u32,
    eflags: u32,
    esp: u32,
    ss: u32,
}

/// Syscall entry point (IDT vector 0x80). Pushes the general-purpose registers, hands the
/// block to [`dispatch_from_frame`], then restores the (possibly entirely different
/// thread's) registers and returns to user mode.
#[naked]
pub unsafe extern "C" fn syscall_entry() {
    asm!(
        "pushad",
        "mov eax, esp",
        "push eax",
        "call {dispatch}",
        "add esp, 4",
        "popad",
        "iretd",
        dispatch = sym dispatch_from_frame,
        options(noreturn)
    )
}

/// Runs the dispatched handler in the caller's own context, then either returns directly
/// to it (the common case) or, if the handler parked the calling thread (`sys_wait` with
/// no zombie child yet), rewinds its saved `eip` back onto the `int 0x80` opcode — two
/// bytes, `0xCD 0x80` — so it re-executes the syscall from scratch once rescheduled, and
/// hands the CPU to the next ready thread instead. This is the same "restart the
/// instruction" trick used for interruptible blocking syscalls generally; it reproduces
/// the original's `wait_start:` retry loop without needing a second, nested interrupt
/// frame shape for the park case.
extern "C" fn dispatch_from_frame(gprs: *mut SyscallGprs) {
    let gprs = unsafe { &mut *gprs };
    let hw = unsafe { &mut *(gprs as *mut SyscallGprs).add(1).cast::<HardwareFrame>() };
    let pid = process::current_pid();

    let Some(mut regs) = crate::sched::current_regs(pid) else {
        // No active thread to resume into (shouldn't happen past boot) — just run the
        // handler against the raw frame and return.
        let (value, err) = dispatch(pid, gprs.eax as usize, gprs.ebx, gprs.ecx, gprs.edx);
        gprs.eax = value;
        gprs.ecx = err as u32;
        return;
    };
    regs.eax = gprs.eax;
    regs.ebx = gprs.ebx;
    regs.ecx = gprs.ecx;
    regs.edx = gprs.edx;
    regs.esi = gprs.esi;
    regs.edi = gprs.edi;
    regs.ebp = gprs.ebp;
    regs.eip = hw.eip;
    regs.esp = hw.esp;
    regs.eflags = hw.eflags;
    regs.cs = hw.cs as u16;
    regs.ss = hw.ss as u16;
    crate::sched::persist_context(pid, regs);

    let (value, err) = dispatch(pid, gprs.eax as usize, gprs.ebx, gprs.ecx, gprs.edx);

    let still_running = process::get_process(pid)
        .map(|h| {
            let p = h.lock();
            p.active_thread.map(|tid| {
                crate::process::thread::get_thread(tid)
                    .map(|t| t.lock().status == crate::process::thread::ThreadStatus::Running)
                    .unwrap_or(false)
            })
        })
        .unwrap_or(None)
        .unwrap_or(false);

    if still_running {
        gprs.eax = value;
        gprs.ecx = err as u32;
        return;
    }

    // The handler parked this thread (e.g. `sys_wait` found no zombie child yet). Rewind
    // its resume point onto the syscall instruction and dispatch someone else; it will
    // naturally re-enter this handler from scratch once woken and rescheduled.
    if let Some(mut parked) = crate::sched::current_regs(pid) {
        parked.eip = parked.eip.wrapping_sub(2);
        crate::sched::persist_context(pid, parked);
    }

    let next = crate::sched::next_ready_or_idle();
    let Some((_, next_regs)) = crate::sched::resolve_and_activate(next) else {
        return;
    };
    gprs.eax = next_regs.eax;
    gprs.ebx = next_regs.ebx;
    gprs.ecx = next_regs.ecx;
    gprs.edx = next_regs.edx;
    gprs.esi = next_regs.esi;
    gprs.edi = next_regs.edi;
    gprs.ebp = next_regs.ebp;
    hw.eip = next_regs.eip;
    hw.esp = next_regs.esp;
    hw.eflags = next_regs.eflags;
    hw.cs = u32::from(next_regs.cs);
    hw.ss = u32::from(next_regs.ss);
    process::set_current_pid(next);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unassigned_slot_dispatches_to_unknown() {
        let (value, err) = dispatch(ProcessId::KERNEL_PID, 6, 0, 0, 0);
        assert_eq!(value, 0);
        assert_eq!(err, SyscallError::Unknown);
    }

    #[test]
    fn out_of_range_number_dispatches_to_unknown() {
        let (_, err) = dispatch(ProcessId::KERNEL_PID, 9000, 0, 0, 0);
        assert_eq!(err, SyscallError::Unknown);
    }

    #[test]
    fn null_pointer_never_validates() {
        assert!(!ptr_validate(ProcessId::KERNEL_PID, VirtAddr::NULL));
    }

    #[test]
    fn kernel_half_pointer_never_validates() {
        assert!(!ptr_validate(ProcessId::KERNEL_PID, VirtAddr::new(0xC000_1000)));
    }
}
