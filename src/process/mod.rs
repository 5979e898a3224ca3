//! Process table and lifecycle (SPEC_FULL §3 "Process", §4.7).
//!
//! A process owns exactly one address space, a queue of runnable threads plus a waiting
//! list (delegated to [`thread::ThreadGroup`]), an open-file table, and the bookkeeping
//! `fork`/`exit`/`wait` need (parent/children, group/session, loaded ELF segments, heap
//! bounds). Registry idiom (`ProcessId`, `OnceCell<RwLock<BTreeMap<...>>>`) grounded on
//! teacher `src/fzboot/process/mod.rs`; lifecycle semantics (`init_process`,
//! `load_executable`, `fork`, `exit_process`, `sbrk`, `spawn_init_process`) grounded on
//! `original_source/tasking/processes/process.c`.

pub mod elf;
pub mod group;
pub mod signal;
pub mod thread;

use core::sync::atomic::{AtomicUsize, Ordering};

use alloc::collections::btree_map::BTreeMap;
use alloc::string::{String, ToString};
use alloc::sync::Arc;
use alloc::vec::Vec;

use conquer_once::spin::OnceCell;
use spin::{Mutex, RwLock};

use crate::errors::ProcessError;
use crate::fs::fd::{FdTable, OpenFile};
use crate::fs::mount::MOUNTS;
use crate::fs::{self, InodeId};
use crate::mem::{VirtAddr, USER_KERNEL_SPLIT, USER_STACK_SIZE};
use crate::process::elf::LoadedSegment;
use crate::process::group::{GroupId, SessionId};
use crate::process::signal::{HandlerTable, Signal};
use crate::process::thread::{Thread, ThreadGroup, ThreadId};
use crate::x86::paging::{paging_manager, with_kernel_directory, PageTable};

static FIRST_AVAILABLE_PID: AtomicUsize = AtomicUsize::new(2);

static PROCESS_REGISTRY: OnceCell<RwLock<BTreeMap<ProcessId, Arc<Mutex<Process>>>>> = OnceCell::uninit();
static CURRENT_PROCESS: Mutex<ProcessId> = Mutex::new(ProcessId::KERNEL_PID);

pub fn current_pid() -> ProcessId {
    *CURRENT_PROCESS.lock()
}

pub fn set_current_pid(pid: ProcessId) {
    *CURRENT_PROCESS.lock() = pid;
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProcessId(usize);

impl ProcessId {
    pub const KERNEL_PID: Self = Self(0);
    pub const INIT_PID: Self = Self(1);
    pub const IDLE_PID: Self = Self(usize::MAX);

    #[cfg(test)]
    pub fn from_raw_for_test(raw: usize) -> Self {
        Self(raw)
    }

    /// Wraps a user-supplied pid number (e.g. `syscall_sig`'s `ebx`) as a [`ProcessId`].
    /// Does not check the pid actually resolves — callers look it up via
    /// [`get_process`] and map a miss to [`ProcessError::InvalidPid`].
    pub fn from_raw(raw: usize) -> Self {
        Self(raw)
    }

    pub fn as_raw(self) -> usize {
        self.0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcessStatus {
    Init,
    Running,
    Zombie,
}

/// A process's address space: `None` aliases the static kernel directory (kernel/idle
/// processes share it directly, never clone it); `Some` is a page-table-heap-resident
/// directory returned by [`crate::x86::paging::PagingManager::new_kernel_clone`] or
/// [`crate::x86::paging::PagingManager::clone_address_space`].
#[derive(Clone, Copy, Debug)]
pub enum AddressSpace {
    Kernel,
    Owned(VirtAddr),
}

impl AddressSpace {
    pub fn with<R>(&self, f: impl FnOnce(&mut PageTable) -> R) -> R {
        match self {
            AddressSpace::Kernel => with_kernel_directory(f),
            AddressSpace::Owned(vaddr) => {
                let dir = unsafe { &mut *vaddr.as_mut_ptr::<PageTable>() };
                f(dir)
            }
        }
    }
}

pub struct Process {
    pub id: ProcessId,
    pub parent: Option<ProcessId>,
    pub children: Vec<ProcessId>,
    pub gid: GroupId,
    pub sid: SessionId,
    pub tty: Option<InodeId>,
    pub address_space: AddressSpace,
    pub threads: ThreadGroup,
    pub active_thread: Option<ThreadId>,
    pub fds: FdTable,
    pub segments: Vec<LoadedSegment>,
    pub heap_addr: VirtAddr,
    pub heap_size: u32,
    pub cwd: String,
    pub signal_handlers: HandlerTable,
    pub status: ProcessStatus,
    pub exit_code: u32,
}

fn registry() -> &'static RwLock<BTreeMap<ProcessId, Arc<Mutex<Process>>>> {
    PROCESS_REGISTRY.get().expect("process registry accessed before init_kernel_process")
}

pub fn get_process(pid: ProcessId) -> Option<Arc<Mutex<Process>>> {
    registry().read().get(&pid).cloned()
}

fn insert_process(process: Process) -> Arc<Mutex<Process>> {
    let pid = process.id;
    let handle = Arc::new(Mutex::new(process));
    registry().write().insert(pid, handle.clone());
    handle
}

fn remove_process(pid: ProcessId) {
    registry().write().remove(&pid);
}

/// Runs `f` against every live process's owned page directory, used by the kernel heap's
/// [`crate::mem::kheap::HeapExpansion`] to mirror a freshly mapped region into every
/// address space (the kernel's half of every directory must stay identical). Holds the
/// registry read lock for the whole walk rather than collecting pids first — simpler, and
/// heap expansion is already a rare, single-threaded-with-respect-to-itself event (SPEC_FULL
/// §5), so the extra hold time is not a contended path.
pub fn for_each_owned_directory(mut f: impl FnMut(&mut PageTable)) {
    let table = registry().read();
    for handle in table.values() {
        let address_space = handle.lock().address_space;
        if let AddressSpace::Owned(dir_vaddr) = address_space {
            let directory = unsafe { &mut *dir_vaddr.as_mut_ptr::<PageTable>() };
            f(directory);
        }
    }
}

fn next_pid() -> ProcessId {
    ProcessId(FIRST_AVAILABLE_PID.fetch_add(1, Ordering::Relaxed))
}

/// Sets up the kernel process (pid 0), the implicit parent of nothing and the address
/// space every other process's kernel half is cloned from. Must run once at boot, before
/// anything else in this module.
pub fn init_kernel_process() {
    PROCESS_REGISTRY.init_once(|| RwLock::new(BTreeMap::new()));
    thread::init_thread_registry();
    group::init_group_table();
    signal::init_signal_queue();

    let kernel = Process {
        id: ProcessId::KERNEL_PID,
        parent: None,
        children: Vec::new(),
        gid: GroupId(0),
        sid: SessionId(0),
        tty: None,
        address_space: AddressSpace::Kernel,
        threads: ThreadGroup::new(),
        active_thread: Some(ThreadId::KERNEL_INIT_TID),
        fds: FdTable::new(),
        segments: Vec::new(),
        heap_addr: VirtAddr::NULL,
        heap_size: 0,
        cwd: "/".to_string(),
        signal_handlers: HandlerTable::default(),
        status: ProcessStatus::Running,
        exit_code: 0,
    };
    group::new_session(GroupId(0), ProcessId::KERNEL_PID);
    insert_process(kernel);
    set_current_pid(ProcessId::KERNEL_PID);
}

/// Sets up the idle process: pid reserved, never forked from, runs the `hlt` loop
/// whenever the ready queue is empty (SPEC_FULL §4.8 "Idle process").
pub fn init_idle_process(idle_entry: VirtAddr) {
    let idle = Process {
        id: ProcessId::IDLE_PID,
        parent: None,
        children: Vec::new(),
        gid: GroupId(0),
        sid: SessionId(0),
        tty: None,
        address_space: AddressSpace::Kernel,
        threads: ThreadGroup::new(),
        active_thread: None,
        fds: FdTable::new(),
        segments: Vec::new(),
        heap_addr: VirtAddr::NULL,
        heap_size: 0,
        cwd: "/".to_string(),
        signal_handlers: HandlerTable::default(),
        status: ProcessStatus::Running,
        exit_code: 0,
    };
    let handle = insert_process(idle);
    let thread = Thread::spawn(ProcessId::IDLE_PID, idle_entry, VirtAddr::NULL);
    let tid = thread.lock().id;
    handle.lock().active_thread = Some(tid);
}

/// Materializes pid 1 from `path` (normally `/sys/init`): allocates a fresh address
/// space, loads the ELF image, sets up the user stack with no arguments, and creates the
/// default session/group owning the controlling tty (SPEC_FULL §4.7 `spawn_init_process`).
pub fn spawn_init_process(path: &str, tty: InodeId) -> Result<ProcessId, ProcessError> {
    let (mount_id, inode) = fs::resolve(path)?;
    let table = MOUNTS.read();
    let filesystem = table.filesystem(mount_id).ok_or(ProcessError::Fs(crate::errors::FsError::NoSuchMount))?;
    let attr = filesystem.attr(inode)?;
    let mut image = alloc::vec![0u8; attr.size as usize];
    filesystem.read_file(inode, 0, &mut image)?;
    drop(table);

    let paging = paging_manager();
    let dir_vaddr = with_kernel_directory(|kernel| paging.new_kernel_clone(kernel)).map_err(|_| ProcessError::OutOfMemory)?;
    let directory = unsafe { &mut *dir_vaddr.as_mut_ptr::<PageTable>() };

    let (entry, segments) = elf::elf_load(paging, directory, &image)?;

    let stack_top = VirtAddr::new(USER_KERNEL_SPLIT);
    let user_stack_base = stack_top + (0u32.wrapping_sub(USER_STACK_SIZE));
    paging
        .map_memory(directory, user_stack_base, USER_STACK_SIZE, true, true)
        .map_err(|_| ProcessError::OutOfMemory)?;

    let heap_addr = segments.last().map(|s| s.vaddr + s.memsz).unwrap_or(VirtAddr::new(0x0040_0000));

    let pid = ProcessId::INIT_PID;
    let thread = Thread::spawn(pid, entry, user_stack_base);
    thread.lock().regs.esp = user_stack_top_after_argv(stack_top).as_u32();
    let tid = thread.lock().id;

    let mut fds = FdTable::new();
    let stdio = OpenFile { mount: mount_id, inode: tty, offset: 0, writable: true };
    fds.allocate(stdio, 0).ok();
    fds.allocate(stdio, 0).ok();
    fds.allocate(stdio, 0).ok();

    let mut process = Process {
        id: pid,
        parent: None,
        children: Vec::new(),
        gid: GroupId(1),
        sid: SessionId(1),
        tty: Some(tty),
        address_space: AddressSpace::Owned(dir_vaddr),
        threads: ThreadGroup::new(),
        active_thread: Some(tid),
        fds,
        segments,
        heap_addr,
        heap_size: 0,
        cwd: "/home".to_string(),
        signal_handlers: HandlerTable::default(),
        status: ProcessStatus::Running,
        exit_code: 0,
    };
    process.threads.push_runnable(tid);
    insert_process(process);
    group::new_session(GroupId(1), pid);
    group::attach_tty(SessionId(1), tty);
    crate::sched::add_process(pid);
    Ok(pid)
}

/// The entry `esp` for a freshly loaded executable started with no arguments: `argc=0`,
/// `argv=NULL` (SPEC_FULL §4.7 "user stack ... argv/argc C-layout").
fn user_stack_top_after_argv(stack_top: VirtAddr) -> VirtAddr {
    let mut sp = stack_top.as_u32();
    sp -= 4; // argv
    sp -= 4; // argc
    VirtAddr::new(sp)
}

/// `sbrk`: grows (or, for negative `incr`, shrinks) the process heap, mapping new pages
/// lazily (SPEC_FULL §4.7 "heap (sbrk)"). Returns the new break.
pub fn sbrk(pid: ProcessId, incr: i32) -> Result<u32, ProcessError> {
    let handle = get_process(pid).ok_or(ProcessError::InvalidPid)?;
    let mut process = handle.lock();
    let new_size = (process.heap_size as i64 + incr as i64).max(0) as u32;
    if incr > 0 {
        let paging = paging_manager();
        let region_start = process.heap_addr + process.heap_size;
        let directory_addr = match process.address_space {
            AddressSpace::Owned(vaddr) => vaddr,
            AddressSpace::Kernel => return Err(ProcessError::OutOfMemory),
        };
        let directory = unsafe { &mut *directory_addr.as_mut_ptr::<PageTable>() };
        if !paging.is_mapped(directory, region_start) {
            paging.map_memory(directory, region_start, incr as u32, true, true).map_err(|_| ProcessError::OutOfMemory)?;
        }
    }
    process.heap_size = new_size;
    Ok((process.heap_addr + process.heap_size).as_u32())
}

/// `fork`: duplicates `parent` into a new process with its own address space (deep-copied
/// user half), its own fd table (shared file offsets by value), and a child kernel thread
/// whose saved context resumes via `trampoline` (SPEC_FULL §4.7 "Fork contract").
pub fn fork(parent_pid: ProcessId, trampoline: VirtAddr) -> Result<ProcessId, ProcessError> {
    let parent_handle = get_process(parent_pid).ok_or(ProcessError::InvalidPid)?;
    let parent = parent_handle.lock();

    let active_tid = parent.active_thread.ok_or(ProcessError::InvalidPid)?;
    let parent_thread_handle = thread::get_thread(active_tid).ok_or(ProcessError::InvalidPid)?;
    let parent_thread = parent_thread_handle.lock();

    let paging = paging_manager();
    let parent_directory = match parent.address_space {
        AddressSpace::Owned(vaddr) => unsafe { &*vaddr.as_ptr::<PageTable>() },
        AddressSpace::Kernel => return Err(ProcessError::OutOfMemory),
    };
    let child_dir_vaddr = paging.clone_address_space(parent_directory).map_err(|_| ProcessError::OutOfMemory)?;

    let child_pid = next_pid();
    let child_thread = Thread::fork(&parent_thread, child_pid, trampoline);
    let child_tid = child_thread.lock().id;

    let mut threads = ThreadGroup::new();
    threads.push_runnable(child_tid);

    let child = Process {
        id: child_pid,
        parent: Some(parent_pid),
        children: Vec::new(),
        gid: parent.gid,
        sid: parent.sid,
        tty: parent.tty,
        address_space: AddressSpace::Owned(child_dir_vaddr),
        threads,
        active_thread: Some(child_tid),
        fds: parent.fds.fork(),
        segments: parent.segments.clone(),
        heap_addr: parent.heap_addr,
        heap_size: parent.heap_size,
        cwd: parent.cwd.clone(),
        signal_handlers: parent.signal_handlers.fork(),
        status: ProcessStatus::Running,
        exit_code: 0,
    };

    let parent_gid = parent.gid;
    let parent_sid = parent.sid;
    drop(parent_thread);
    drop(parent);

    insert_process(child);
    group::set_group(child_pid, parent_gid, parent_sid);
    parent_handle.lock().children.push(child_pid);
    crate::sched::add_process(child_pid);
    Ok(child_pid)
}

/// `exit_process`: frees thread stacks and the ELF segment list, closes every fd, tears
/// down the address space, reparents children to init, detaches the controlling tty if
/// this process was a session leader, signals `SIGCHLD` to the parent, and transitions to
/// zombie (SPEC_FULL §4.7 "Exit contract").
pub fn exit_process(pid: ProcessId, exit_code: u32) -> Result<(), ProcessError> {
    if pid == ProcessId::INIT_PID {
        return Err(ProcessError::InvalidPid);
    }
    let handle = get_process(pid).ok_or(ProcessError::InvalidPid)?;
    let mut process = handle.lock();

    let paging = paging_manager();
    if let AddressSpace::Owned(dir_vaddr) = process.address_space {
        let directory = unsafe { &mut *dir_vaddr.as_mut_ptr::<PageTable>() };
        for segment in &process.segments {
            let _ = paging.unmap_page(directory, segment.vaddr);
        }
    }

    for fd in 0..crate::fs::fd::MAX_FDS {
        process.fds.close(fd);
    }

    for &child in &process.children {
        if let Some(child_handle) = get_process(child) {
            child_handle.lock().parent = Some(ProcessId::INIT_PID);
        }
    }

    if group::is_session_leader(pid, process.sid) {
        group::detach_tty(process.sid);
    }
    group::leave_group(pid, process.gid);

    process.status = ProcessStatus::Zombie;
    process.exit_code = exit_code;

    if let Some(parent) = process.parent {
        let _ = signal::send_signal(parent, Signal::SIGCHLD);
        drop(process);
        wake_parent_waiting_for_child(parent);
    }

    Ok(())
}

/// Wakes a thread of `parent` parked in [`thread::ThreadStatus::AsleepChild`] (SPEC_FULL
/// §4.7 "Wait contract"): `wait` only re-checks zombie children once rescheduled, so a
/// parent blocked in `wait()` needs an explicit nudge on every child exit.
fn wake_parent_waiting_for_child(parent: ProcessId) {
    let Some(handle) = get_process(parent) else { return };
    let mut process = handle.lock();
    let waiting: Vec<ThreadId> = process
        .threads
        .waiting()
        .filter(|&tid| thread::get_thread(tid).map(|t| t.lock().status == thread::ThreadStatus::AsleepChild).unwrap_or(false))
        .collect();
    for tid in waiting {
        process.threads.wake(tid);
        if let Some(t) = thread::get_thread(tid) {
            t.lock().status = thread::ThreadStatus::Running;
        }
    }
    drop(process);
    crate::sched::add_process(parent);
}

pub enum WaitOutcome {
    Reaped(ProcessId, u32),
    ParkForChild,
}

/// `wait`: reaps a zombie child matching `request` (`pid>0` a specific child, `pid==0` any
/// child in the caller's group, `pid==-1` any child, `pid<-1` any child in group `-pid`),
/// or signals the caller should park if a matching child is still alive
/// (SPEC_FULL §4.7 "Wait contract").
pub fn wait(caller: ProcessId, request: i32) -> Result<WaitOutcome, ProcessError> {
    let handle = get_process(caller).ok_or(ProcessError::InvalidPid)?;
    let (caller_gid, children) = {
        let process = handle.lock();
        if process.children.is_empty() {
            return Err(ProcessError::HasNoChild);
        }
        (process.gid, process.children.clone())
    };

    let matches = |child: &Process| -> bool {
        match request {
            p if p > 0 => child.id == ProcessId(p as usize),
            0 => child.gid == caller_gid,
            -1 => true,
            p => child.gid == GroupId(-p),
        }
    };

    let mut any_alive = false;
    for child_pid in children {
        let Some(child_handle) = get_process(child_pid) else { continue };
        let (is_match, is_zombie, code, zombie_thread) = {
            let child = child_handle.lock();
            (matches(&child), child.status == ProcessStatus::Zombie, child.exit_code, child.active_thread)
        };
        if !is_match {
            continue;
        }
        any_alive = true;
        if is_zombie {
            handle.lock().children.retain(|&c| c != child_pid);
            remove_process(child_pid);
            if let Some(tid) = zombie_thread {
                thread::remove_thread(tid);
            }
            return Ok(WaitOutcome::Reaped(child_pid, code));
        }
    }

    if any_alive {
        Ok(WaitOutcome::ParkForChild)
    } else {
        Err(ProcessError::HasNoChild)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kernel_pid_is_zero_and_init_is_one() {
        assert_eq!(ProcessId::KERNEL_PID.as_raw(), 0);
        assert_eq!(ProcessId::INIT_PID.as_raw(), 1);
    }

    #[test]
    fn next_pid_never_reissues_reserved_ids() {
        let first = next_pid();
        assert!(first.as_raw() >= 2);
    }
}
