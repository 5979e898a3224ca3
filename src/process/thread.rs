//! Threads (SPEC_FULL §3 "Thread", §4.7).
//!
//! A process always has exactly one dispatched thread; additional runnable threads sit in
//! its FIFO (`ThreadGroup`), and threads waiting on a condition sit on its waiting list
//! (both owned by [`crate::process::Process`], not here). Registry/id idiom grounded on
//! teacher `src/fzboot/process/thread.rs` (`ThreadId`, `THREAD_REGISTRY`), narrowed from a
//! process-scoped `Task` handle to the saved-register record the spec calls for directly.

use alloc::collections::{BTreeMap, VecDeque};
use alloc::sync::Arc;
use core::sync::atomic::{AtomicUsize, Ordering};

use conquer_once::spin::OnceCell;
use spin::{Mutex, RwLock};

use crate::mem::stack::get_kernel_stack_allocator;
use crate::mem::{VirtAddr, KERNEL_STACK_SIZE};
use crate::process::ProcessId;

static FIRST_AVAILABLE_TID: AtomicUsize = AtomicUsize::new(1);

pub(crate) static THREAD_REGISTRY: OnceCell<RwLock<BTreeMap<ThreadId, Arc<Mutex<Thread>>>>> = OnceCell::uninit();

pub fn init_thread_registry() {
    THREAD_REGISTRY.init_once(|| RwLock::new(BTreeMap::new()));
}

fn registry() -> &'static RwLock<BTreeMap<ThreadId, Arc<Mutex<Thread>>>> {
    THREAD_REGISTRY.get().expect("thread registry accessed before init_thread_registry")
}

pub fn get_thread(id: ThreadId) -> Option<Arc<Mutex<Thread>>> {
    registry().read().get(&id).cloned()
}

pub fn remove_thread(id: ThreadId) {
    registry().write().remove(&id);
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThreadId(usize);

impl ThreadId {
    pub const KERNEL_INIT_TID: Self = Self(0);
}

/// Status a thread can be parked in (Data Model "Thread"); `Running` is reserved for
/// whichever thread is the `active_thread` of a dispatched process.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ThreadStatus {
    Running,
    AsleepTime,
    AsleepIrq,
    AsleepMutex,
    AsleepChild,
    AsleepSignal,
    Zombie,
}

/// Saved CPU context, written on involuntary preemption (timer ISR) and on any voluntary
/// yield, restored verbatim on the next dispatch.
#[derive(Clone, Copy, Debug, Default)]
#[repr(C)]
pub struct SavedRegisters {
    pub eax: u32,
    pub ebx: u32,
    pub ecx: u32,
    pub edx: u32,
    pub esi: u32,
    pub edi: u32,
    pub ebp: u32,
    pub eip: u32,
    pub esp: u32,
    pub eflags: u32,
    pub cs: u16,
    pub ds: u16,
    pub es: u16,
    pub fs: u16,
    pub gs: u16,
    pub ss: u16,
}

pub struct Thread {
    pub id: ThreadId,
    pub process: ProcessId,
    pub regs: SavedRegisters,
    pub kernel_stack_base: VirtAddr,
    pub user_stack_base: VirtAddr,
    pub status: ThreadStatus,
}

impl Thread {
    /// Spawns a new thread in `process`, entering at `entry` on a freshly allocated
    /// kernel stack (SPEC_FULL §4.7 "the kernel stack size is fixed per thread").
    pub fn spawn(process: ProcessId, entry: VirtAddr, user_stack_base: VirtAddr) -> Arc<Mutex<Thread>> {
        let tid = ThreadId(FIRST_AVAILABLE_TID.fetch_add(1, Ordering::Relaxed));
        let kernel_stack_top = get_kernel_stack_allocator().lock().alloc_stack();
        let kernel_stack_base = kernel_stack_top + (0u32.wrapping_sub(KERNEL_STACK_SIZE));

        let thread = Arc::new(Mutex::new(Thread {
            id: tid,
            process,
            regs: SavedRegisters {
                eip: entry.as_u32(),
                esp: kernel_stack_top.as_u32(),
                eflags: 0x200, // IF set: threads start with interrupts enabled.
                ..Default::default()
            },
            kernel_stack_base,
            user_stack_base,
            status: ThreadStatus::Running,
        }));

        registry().write().insert(tid, thread.clone());
        thread
    }

    /// Constructs the child thread of a `fork` (SPEC_FULL §4.7 "Fork contract"): the
    /// child's kernel stack is a byte copy of the parent's, its saved `esp` shifted by the
    /// difference of kernel-stack bases, and its saved `eip` points at `trampoline`, which
    /// returns 0 to the caller of `fork` in the child.
    pub fn fork(parent: &Thread, child_process: ProcessId, trampoline: VirtAddr) -> Arc<Mutex<Thread>> {
        let tid = ThreadId(FIRST_AVAILABLE_TID.fetch_add(1, Ordering::Relaxed));
        let child_stack_top = get_kernel_stack_allocator().lock().alloc_stack();
        let child_stack_base = child_stack_top + (0u32.wrapping_sub(KERNEL_STACK_SIZE));

        unsafe {
            core::ptr::copy_nonoverlapping(
                parent.kernel_stack_base.as_ptr::<u8>(),
                child_stack_base.as_mut_ptr::<u8>(),
                KERNEL_STACK_SIZE as usize,
            );
        }

        let esp_delta = child_stack_base.as_u32().wrapping_sub(parent.kernel_stack_base.as_u32());
        let mut regs = parent.regs;
        regs.esp = parent.regs.esp.wrapping_add(esp_delta);
        regs.eip = trampoline.as_u32();
        regs.eax = 0; // fork() returns 0 in the child.

        let thread = Arc::new(Mutex::new(Thread {
            id: tid,
            process: child_process,
            regs,
            kernel_stack_base: child_stack_base,
            user_stack_base: parent.user_stack_base,
            status: ThreadStatus::Running,
        }));

        registry().write().insert(tid, thread.clone());
        thread
    }
}

/// Per-process thread set: the FIFO of runnable threads plus the singly-linked waiting
/// list (Data Model "Process": "queue of runnable threads, list of blocked threads").
#[derive(Default)]
pub struct ThreadGroup {
    runnable: VecDeque<ThreadId>,
    waiting: VecDeque<ThreadId>,
}

impl ThreadGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_runnable(&mut self, id: ThreadId) {
        self.runnable.push_back(id);
    }

    pub fn pop_runnable(&mut self) -> Option<ThreadId> {
        self.runnable.pop_front()
    }

    pub fn park(&mut self, id: ThreadId) {
        self.waiting.push_back(id);
    }

    /// Moves `id` off the waiting list back onto the runnable FIFO (wakeup).
    pub fn wake(&mut self, id: ThreadId) -> bool {
        if let Some(pos) = self.waiting.iter().position(|&w| w == id) {
            self.waiting.remove(pos);
            self.runnable.push_back(id);
            true
        } else {
            false
        }
    }

    pub fn waiting(&self) -> impl Iterator<Item = ThreadId> + '_ {
        self.waiting.iter().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.runnable.is_empty() && self.waiting.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thread_group_wake_moves_waiting_to_runnable() {
        let mut group = ThreadGroup::new();
        group.park(ThreadId(5));
        assert!(group.wake(ThreadId(5)));
        assert_eq!(group.pop_runnable(), Some(ThreadId(5)));
    }

    #[test]
    fn thread_group_wake_of_unknown_id_is_noop() {
        let mut group = ThreadGroup::new();
        assert!(!group.wake(ThreadId(99)));
    }
}
