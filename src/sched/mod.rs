//! The scheduler (SPEC_FULL §4.8).
//!
//! Runnable processes form a single global FIFO. A timer tick (and any voluntary yield,
//! which just raises the same interrupt) drains the signal queue, ages the timed-sleep
//! deltalist, then requeues the interrupted process and dispatches the next one.
//!
//! The teacher (`src/fzboot/scheduler/{mod,task}.rs`) drives this off an
//! auto-pushed 64-bit `InterruptStackFrame` and a separate `call`-based
//! `task_switch!`/`__task_state_snapshot` path for voluntary yields. Neither auto-pushed
//! frame nor that split exists in 32-bit protected mode without a TSS per task, so both
//! paths are unified here: a voluntary yield ([`yield_now`]) raises `int 0x20`, the exact
//! vector the PIT timer uses, and [`timer_tick`] does not distinguish how it was entered
//! (mirroring `original_source/tasking/scheduler/scheduler.c`'s single
//! `scheduler_remove_process`/`schedule_switch` path for both cases). Register save/
//! restore is grounded on the same file's inline-asm context switch (explicit
//! segment+GPR pushes around the interrupted frame) adapted to this crate's
//! [`crate::process::thread::SavedRegisters`] layout instead of the original's raw stack
//! offsets.

pub mod mutex;

use alloc::collections::VecDeque;
use alloc::vec::Vec;
use core::arch::asm;

use conquer_once::spin::OnceCell;
use spin::Mutex;

use crate::fzboot::irq::_pic_eoi;
use crate::mem::{PhyAddr, VirtAddr, KERNEL_VIRTUAL_BASE};
use crate::process::signal::{self, SignalAction};
use crate::process::thread::{self, ThreadId, ThreadStatus};
use crate::process::{self, get_process, AddressSpace, ProcessId, ProcessStatus};
use crate::x86::paging::{with_kernel_directory, PageTable};
use crate::x86::registers::control::{ControlRegister, Cr3};

const TICK_MS: u32 = 55;
const IRQ_COUNT: usize = 16;

struct SleepEntry {
    process: ProcessId,
    thread: ThreadId,
    remaining_ms: u32,
    irq: Option<u8>,
}

struct IrqWaitEntry {
    process: ProcessId,
    thread: ThreadId,
}

/// Global scheduler state: the ready FIFO, the timed-sleep deltalist, and the per-IRQ
/// wait table (SPEC_FULL §3 "Sleep queues").
struct GlobalScheduler {
    ready: VecDeque<ProcessId>,
    sleeping: VecDeque<SleepEntry>,
    irq_waiters: [Vec<IrqWaitEntry>; IRQ_COUNT],
}

impl GlobalScheduler {
    fn new() -> Self {
        Self {
            ready: VecDeque::new(),
            sleeping: VecDeque::new(),
            irq_waiters: core::array::from_fn(|_| Vec::new()),
        }
    }

    fn push_ready(&mut self, pid: ProcessId) {
        if pid == ProcessId::IDLE_PID || pid == ProcessId::KERNEL_PID {
            return;
        }
        if !self.ready.contains(&pid) {
            self.ready.push_back(pid);
        }
    }

    fn pop_ready(&mut self) -> Option<ProcessId> {
        self.ready.pop_front()
    }

    /// Inserts a deltalist entry for `timeout_ms`, storing only the delta from the
    /// previous entry so a tick need only touch the head (SPEC_FULL §3 "Sleep queues").
    fn insert_sleep(&mut self, process: ProcessId, thread: ThreadId, timeout_ms: u32, irq: Option<u8>) {
        let mut remaining = timeout_ms;
        let mut idx = 0;
        for entry in &self.sleeping {
            if remaining < entry.remaining_ms {
                break;
            }
            remaining -= entry.remaining_ms;
            idx += 1;
        }
        if let Some(next) = self.sleeping.get_mut(idx) {
            next.remaining_ms -= remaining;
        }
        self.sleeping.insert(idx, SleepEntry { process, thread, remaining_ms: remaining, irq });
    }

    /// SPEC_FULL §4.8 step 2: decrements the head by one tick, cascading through every
    /// entry that has now reached zero.
    fn sleep_tick(&mut self) -> Vec<(ProcessId, ThreadId)> {
        let mut woken = Vec::new();
        if let Some(head) = self.sleeping.front_mut() {
            head.remaining_ms = head.remaining_ms.saturating_sub(TICK_MS);
        }
        while matches!(self.sleeping.front(), Some(e) if e.remaining_ms == 0) {
            let entry = self.sleeping.pop_front().expect("checked Some above");
            if let Some(irqnum) = entry.irq {
                self.irq_waiters[irqnum as usize]
                    .retain(|w| !(w.process == entry.process && w.thread == entry.thread));
            }
            woken.push((entry.process, entry.thread));
        }
        woken
    }

    /// SPEC_FULL §4.8 "Wake-from-IRQ semantics": registers a thread on `irqnum` and,
    /// if `timeout_ms > 0`, also on the deltalist — whichever fires first unlinks the
    /// other.
    fn wait_thread(&mut self, process: ProcessId, thread: ThreadId, irq: Option<u8>, timeout_ms: u32) {
        if let Some(irqnum) = irq {
            self.irq_waiters[irqnum as usize].push(IrqWaitEntry { process, thread });
        }
        if timeout_ms > 0 {
            self.insert_sleep(process, thread, timeout_ms, irq);
        }
    }

    fn irq_wakeup(&mut self, irqnum: u8) -> Vec<(ProcessId, ThreadId)> {
        let waiters = core::mem::take(&mut self.irq_waiters[irqnum as usize]);
        for w in &waiters {
            if let Some(pos) = self.sleeping.iter().position(|e| e.process == w.process && e.thread == w.thread) {
                self.sleeping.remove(pos);
            }
        }
        waiters.into_iter().map(|w| (w.process, w.thread)).collect()
    }
}

static SCHEDULER: OnceCell<Mutex<GlobalScheduler>> = OnceCell::uninit();

pub fn init_scheduler() {
    SCHEDULER.init_once(|| Mutex::new(GlobalScheduler::new()));
}

fn scheduler() -> &'static Mutex<GlobalScheduler> {
    SCHEDULER.get().expect("scheduler accessed before init_scheduler")
}

/// Admits `pid` into the ready FIFO (no-op for kernel/idle, and for a pid already
/// queued).
pub fn add_process(pid: ProcessId) {
    scheduler().lock().push_ready(pid);
}

fn wake_all(woken: Vec<(ProcessId, ThreadId)>) {
    for (pid, tid) in woken {
        if let Some(handle) = get_process(pid) {
            handle.lock().threads.wake(tid);
        }
        if let Some(th) = thread::get_thread(tid) {
            th.lock().status = ThreadStatus::Running;
        }
        add_process(pid);
    }
}

/// Parks `thread` of `process`, marking it `status` and registering it with the
/// scheduler's IRQ/timeout wait tables (SPEC_FULL §4.7 "threads waiting on a condition").
pub fn wait_thread(
    process: ProcessId,
    thread_id: ThreadId,
    status: ThreadStatus,
    irq: Option<u8>,
    timeout_ms: u32,
) -> Result<(), crate::errors::SchedError> {
    let handle = get_process(process).ok_or(crate::errors::SchedError::StaleReference)?;
    handle.lock().threads.park(thread_id);
    if let Some(th) = thread::get_thread(thread_id) {
        th.lock().status = status;
    }
    scheduler().lock().wait_thread(process, thread_id, irq, timeout_ms);
    Ok(())
}

/// Wakes every thread parked on `irqnum` (a driver's interrupt handler calls this).
pub fn irq_wakeup(irqnum: u8) {
    let woken = scheduler().lock().irq_wakeup(irqnum);
    wake_all(woken);
}

/// Voluntarily yields the CPU (SPEC_FULL §4.8 "at any voluntary yield"): raises the same
/// interrupt the timer uses, so `timer_tick` runs the identical three-step algorithm.
pub fn yield_now() {
    unsafe { asm!("int 0x20") };
}

fn apply_signal_action(pid: ProcessId, action: SignalAction) {
    match action {
        SignalAction::None => {}
        SignalAction::Exit { code } => {
            let _ = process::exit_process(pid, code);
        }
        SignalAction::Stop => {
            if let Some(handle) = get_process(pid) {
                let tid = {
                    let mut p = handle.lock();
                    let tid = p.active_thread;
                    if let Some(t) = tid {
                        p.threads.park(t);
                    }
                    tid
                };
                if let Some(tid) = tid {
                    if let Some(th) = thread::get_thread(tid) {
                        th.lock().status = ThreadStatus::AsleepSignal;
                    }
                }
            }
        }
        SignalAction::Continue => {
            if let Some(handle) = get_process(pid) {
                let tid = handle.lock().active_thread;
                if let Some(tid) = tid {
                    handle.lock().threads.wake(tid);
                    if let Some(th) = thread::get_thread(tid) {
                        th.lock().status = ThreadStatus::Running;
                    }
                }
            }
            add_process(pid);
        }
        SignalAction::Enter { handler, signal } => {
            // Redirects the active thread straight to the handler. The original's
            // user-stack trampoline (copying a tiny "call sigreturn" stub so the
            // handler's own return instruction restores the pre-signal context) is the
            // syscall layer's job once `sigreturn` exists; this only performs the
            // control-transfer half.
            if let Some(handle) = get_process(pid) {
                let tid = handle.lock().active_thread;
                if let Some(tid) = tid {
                    if let Some(th) = thread::get_thread(tid) {
                        let mut t = th.lock();
                        t.regs.eip = handler.as_u32();
                        t.regs.eax = u32::from(signal.0);
                    }
                }
            }
        }
    }
}

fn physical_of(directory: &mut PageTable) -> PhyAddr {
    let vaddr = VirtAddr::from(directory as *const PageTable);
    PhyAddr::new(vaddr.as_u32().wrapping_sub(KERNEL_VIRTUAL_BASE))
}

/// Loads `space`'s directory into `cr3`. Physical addresses are derived from the
/// page-table heap's identity offset from `KERNEL_VIRTUAL_BASE`, the same convention
/// `PagingManager::clone_address_space` uses to compute a child page table's physical
/// address (`src/x86/paging/mod.rs`).
fn activate_address_space(space: &AddressSpace) {
    let phys = match space {
        AddressSpace::Kernel => with_kernel_directory(physical_of),
        AddressSpace::Owned(vaddr) => PhyAddr::new(vaddr.as_u32().wrapping_sub(KERNEL_VIRTUAL_BASE)),
    };
    if let Ok(cr3) = Cr3::read().set_page_table_addr(phys) {
        cr3.write();
    }
}

/// General-purpose registers as `pushad` lays them out in memory (lowest address
/// first): `edi, esi, ebp, <discarded esp>, ebx, edx, ecx, eax`.
#[repr(C)]
#[derive(Clone, Copy, Default)]
struct PushadBlock {
    edi: u32,
    esi: u32,
    ebp: u32,
    esp_dummy: u32,
    ebx: u32,
    edx: u32,
    ecx: u32,
    eax: u32,
}

/// GPRs plus segment registers, in the exact order [`timer_interrupt_entry`] leaves them
/// on the stack: `pushad` runs last, so its block sits at the lowest address, below the
/// four segment registers pushed just before it (in turn ordered `gs, fs, es, ds` from
/// low to high, the reverse of the `push ds/es/fs/gs` sequence that put them there).
#[repr(C)]
struct InterruptedState {
    gpr: PushadBlock,
    gs: u32,
    fs: u32,
    es: u32,
    ds: u32,
}

/// The hardware-pushed part of the interrupt frame (always present: this kernel only
/// runs the timer IRQ as a ring3->ring0 gate, per Design Notes).
#[repr(C)]
struct HardwareFrame {
    eip: u32,
    cs: u32,
    eflags: u32,
    esp: u32,
    ss: u32,
}

/// Timer IRQ entry point (IDT vector 0x20, also raised directly by [`yield_now`]).
/// Pushes the full register state onto the interrupted thread's own kernel stack, hands
/// it to [`timer_tick`], and resumes whichever thread `timer_tick` selected by popping
/// the very same (possibly rewritten) stack slots.
#[naked]
pub unsafe extern "C" fn timer_interrupt_entry() {
    asm!(
        "push ds",
        "push es",
        "push fs",
        "push gs",
        "pushad",
        "mov eax, esp",
        "push eax",
        "call {tick}",
        "add esp, 4",
        "popad",
        "pop gs",
        "pop fs",
        "pop es",
        "pop ds",
        "iretd",
        tick = sym timer_tick,
        options(noreturn)
    )
}

extern "C" fn timer_tick(state_ptr: *mut InterruptedState) {
    let state = unsafe { &mut *state_ptr };
    let hw = unsafe { &mut *(state_ptr.add(1).cast::<HardwareFrame>()) };

    // Step 1 (SPEC_FULL §4.8): drain and apply the signal queue.
    let actions = signal::drain(|pid, sig| get_process(pid).map(|h| h.lock().signal_handlers.get(sig)));
    for (pid, action) in actions {
        apply_signal_action(pid, action);
    }

    // Step 2: age the timed-sleep deltalist.
    let woken = scheduler().lock().sleep_tick();
    wake_all(woken);

    // Step 3: save the interrupted thread if it still exists, requeue it if runnable,
    // dequeue the next one, and restore its context in place.
    let current_pid = process::current_pid();
    if current_pid != ProcessId::IDLE_PID {
        save_context(current_pid, state, hw);
        if get_process(current_pid).map(|h| h.lock().status == ProcessStatus::Running).unwrap_or(false) {
            add_process(current_pid);
        }
    }

    let next_pid = scheduler().lock().pop_ready().unwrap_or(ProcessId::IDLE_PID);
    restore_context(next_pid, state, hw);
    process::set_current_pid(next_pid);

    _pic_eoi();
}

fn save_context(pid: ProcessId, state: &InterruptedState, hw: &HardwareFrame) {
    let regs = thread::SavedRegisters {
        eax: state.gpr.eax,
        ebx: state.gpr.ebx,
        ecx: state.gpr.ecx,
        edx: state.gpr.edx,
        esi: state.gpr.esi,
        edi: state.gpr.edi,
        ebp: state.gpr.ebp,
        eip: hw.eip,
        esp: hw.esp,
        eflags: hw.eflags,
        cs: hw.cs as u16,
        ss: hw.ss as u16,
        ds: state.ds as u16,
        es: state.es as u16,
        fs: state.fs as u16,
        gs: state.gs as u16,
    };
    persist_context(pid, regs);
}

/// Writes `regs` back into `pid`'s active thread, if both still resolve. Shared by the
/// timer ISR ([`save_context`]) and the syscall dispatcher (`crate::syscall`), which both
/// need to snapshot "resume right here" before possibly handing the CPU to someone else.
pub(crate) fn persist_context(pid: ProcessId, regs: thread::SavedRegisters) {
    let Some(handle) = get_process(pid) else { return };
    let tid = handle.lock().active_thread;
    let Some(tid) = tid else { return };
    let Some(th) = thread::get_thread(tid) else { return };
    th.lock().regs = regs;
}

fn restore_context(pid: ProcessId, state: &mut InterruptedState, hw: &mut HardwareFrame) {
    let Some((_, regs)) = resolve_and_activate(pid) else {
        // Nothing runnable anywhere: leave the frame as-is, which simply resumes
        // whatever was interrupted (the idle loop re-enters `hlt`).
        return;
    };
    state.gpr.eax = regs.eax;
    state.gpr.ebx = regs.ebx;
    state.gpr.ecx = regs.ecx;
    state.gpr.edx = regs.edx;
    state.gpr.esi = regs.esi;
    state.gpr.edi = regs.edi;
    state.gpr.ebp = regs.ebp;
    state.ds = u32::from(regs.ds);
    state.es = u32::from(regs.es);
    state.fs = u32::from(regs.fs);
    state.gs = u32::from(regs.gs);
    hw.eip = regs.eip;
    hw.esp = regs.esp;
    hw.eflags = regs.eflags;
    hw.cs = u32::from(regs.cs);
    hw.ss = u32::from(regs.ss);
}

/// Picks (or keeps) `pid`'s active thread, falling back to the idle process if `pid` no
/// longer resolves or has nothing runnable, activates its address space, and returns the
/// `(pid, regs)` actually selected. `None` only when even idle has no runnable thread,
/// which never happens past boot. Shared by [`restore_context`] and the syscall
/// dispatcher's blocking-syscall path.
pub(crate) fn resolve_and_activate(pid: ProcessId) -> Option<(ProcessId, thread::SavedRegisters)> {
    let handle = match get_process(pid) {
        Some(h) => h,
        None => get_process(ProcessId::IDLE_PID).expect("idle process missing"),
    };
    let (actual_pid, tid, address_space) = {
        let mut p = handle.lock();
        if p.active_thread.is_none() {
            p.active_thread = p.threads.pop_runnable();
        }
        (p.id, p.active_thread, p.address_space)
    };
    let tid = tid?;
    activate_address_space(&address_space);
    let regs = thread::get_thread(tid).expect("dispatched thread vanished").lock().regs;
    Some((actual_pid, regs))
}

/// Pops the next ready pid, or idle if none is ready (SPEC_FULL §4.8 "If the ready queue
/// is empty, the idle process runs").
pub(crate) fn next_ready_or_idle() -> ProcessId {
    scheduler().lock().pop_ready().unwrap_or(ProcessId::IDLE_PID)
}

/// `pid`'s active thread's saved registers, if it has one. Lets a caller (the syscall
/// dispatcher) amend a handful of fields — `eip`/`eax`/`ecx` — without clobbering the
/// segment registers it never touches.
pub(crate) fn current_regs(pid: ProcessId) -> Option<thread::SavedRegisters> {
    let handle = get_process(pid)?;
    let tid = handle.lock().active_thread?;
    Some(thread::get_thread(tid)?.lock().regs)
}

/// Performs the very first dispatch at boot: there is no interrupted thread to resume
/// from, so this builds an `iretd` frame by hand instead of going through
/// [`timer_tick`]. Never returns.
pub unsafe fn start_scheduling(pid: ProcessId) -> ! {
    process::set_current_pid(pid);
    let handle = get_process(pid).expect("cannot start scheduling on an unknown process");
    let (tid, address_space) = {
        let p = handle.lock();
        (p.active_thread.expect("process has no active thread"), p.address_space)
    };
    activate_address_space(&address_space);
    let regs = thread::get_thread(tid).expect("thread vanished").lock().regs;

    asm!(
        "push {ss:e}",
        "push {esp:e}",
        "push {eflags:e}",
        "push {cs:e}",
        "push {eip:e}",
        "mov eax, {eax:e}",
        "mov ebx, {ebx:e}",
        "mov ecx, {ecx:e}",
        "mov edx, {edx:e}",
        "mov esi, {esi:e}",
        "mov edi, {edi:e}",
        "mov ebp, {ebp:e}",
        "iretd",
        ss = in(reg) u32::from(regs.ss),
        esp = in(reg) regs.esp,
        eflags = in(reg) regs.eflags,
        cs = in(reg) u32::from(regs.cs),
        eip = in(reg) regs.eip,
        eax = in(reg) regs.eax,
        ebx = in(reg) regs.ebx,
        ecx = in(reg) regs.ecx,
        edx = in(reg) regs.edx,
        esi = in(reg) regs.esi,
        edi = in(reg) regs.edi,
        ebp = in(reg) regs.ebp,
        options(noreturn)
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pid_tid(raw: usize) -> (ProcessId, ThreadId) {
        (ProcessId::from_raw_for_test(raw), ThreadId::default())
    }

    #[test]
    fn ready_queue_is_fifo_and_admits_each_pid_once() {
        let mut sched = GlobalScheduler::new();
        sched.push_ready(ProcessId::from_raw_for_test(5));
        sched.push_ready(ProcessId::from_raw_for_test(6));
        sched.push_ready(ProcessId::from_raw_for_test(5));
        assert_eq!(sched.pop_ready(), Some(ProcessId::from_raw_for_test(5)));
        assert_eq!(sched.pop_ready(), Some(ProcessId::from_raw_for_test(6)));
        assert_eq!(sched.pop_ready(), None);
    }

    #[test]
    fn sleep_tick_wakes_only_entries_at_or_past_their_deadline() {
        let mut sched = GlobalScheduler::new();
        let (p1, t1) = pid_tid(1);
        let (p2, t2) = pid_tid(2);
        sched.insert_sleep(p1, t1, 50, None);
        sched.insert_sleep(p2, t2, 200, None);
        let woken = sched.sleep_tick();
        assert_eq!(woken, alloc::vec![(p1, t1)]);
        assert!(sched.sleep_tick().is_empty());
        let woken = sched.sleep_tick();
        assert_eq!(woken, alloc::vec![(p2, t2)]);
    }

    #[test]
    fn irq_wakeup_also_unlinks_the_matching_timeout_entry() {
        let mut sched = GlobalScheduler::new();
        let (p, t) = pid_tid(9);
        sched.wait_thread(p, t, Some(3), 1000);
        let woken = sched.irq_wakeup(3);
        assert_eq!(woken, alloc::vec![(p, t)]);
        // The deltalist entry was unlinked: ticking until the original deadline
        // produces no second wakeup.
        for _ in 0..30 {
            assert!(sched.sleep_tick().is_empty());
        }
    }
}
