//! Concrete syscall bodies (SPEC_FULL §4.10), one `sys_*` per slot in
//! [`super::TABLE`]. Argument convention per handler matches the original's
//! `syscall_*(regs)` reads of `ebx`/`ecx`/`edx` exactly
//! (`original_source/tasking/processes/syscalls.c`); error mapping relies on
//! [`crate::errors::SyscallError`]'s `From` impls to fold `FsError`/`ProcessError`/
//! `SignalError` into the flat ABI kind.

use alloc::string::{String, ToString};
use alloc::vec::Vec;

use crate::errors::SyscallError;
use crate::fs::fd::OpenFile;
use crate::fs::mount::MOUNTS;
use crate::fs::{self, DeviceKind};
use crate::mem::VirtAddr;
use crate::process::group::{foreground_group, session_owning_tty, set_foreground_group, GroupId};
use crate::process::signal::{Disposition, Signal};
use crate::process::thread::ThreadStatus;
use crate::process::{self, elf, thread, ProcessId, WaitOutcome};
use crate::syscall::ptr_validate;

const SEEK_SET: u32 = 0;
const SEEK_CUR: u32 = 1;
const SEEK_END: u32 = 2;

const MAX_PATH_LEN: usize = 255;

/// Reads a NUL-terminated string out of the caller's address space, validating the
/// starting pointer first. Bounded at [`MAX_PATH_LEN`] bytes the same way the original
/// caps path buffers.
fn read_cstr(pid: ProcessId, ptr: VirtAddr) -> Result<String, SyscallError> {
    if !ptr_validate(pid, ptr) {
        return Err(SyscallError::InvalidPtr);
    }
    let mut bytes = Vec::with_capacity(32);
    let base = ptr.as_ptr::<u8>();
    for i in 0..MAX_PATH_LEN {
        // SAFETY: `ptr` was validated above; a path never straddles more than a handful
        // of pages, matching the original's fixed-size path buffer assumption.
        let byte = unsafe { *base.add(i) };
        if byte == 0 {
            break;
        }
        bytes.push(byte);
    }
    String::from_utf8(bytes).map_err(|_| SyscallError::InvalidPtr)
}

/// Joins a possibly-relative `path` against `cwd`, per the original `syscall_open`'s
/// "relative paths resolve against the calling process's cwd".
fn join_cwd(cwd: &str, path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else if cwd.ends_with('/') {
        alloc::format!("{cwd}{path}")
    } else {
        alloc::format!("{cwd}/{path}")
    }
}

fn cwd_of(pid: ProcessId) -> Result<String, SyscallError> {
    let handle = process::get_process(pid).ok_or(SyscallError::InvalidPid)?;
    Ok(handle.lock().cwd.clone())
}

/// `open(path, mode)` (syscall 1). `ecx`'s low bit marks write access, matching the
/// original's `O_WRONLY`/`O_RDWR` flag convention collapsed to this ABI's single
/// writable/read-only split.
pub fn sys_open(pid: ProcessId, ebx: u32, ecx: u32, _edx: u32) -> Result<u32, SyscallError> {
    let raw_path = read_cstr(pid, VirtAddr::new(ebx))?;
    let cwd = cwd_of(pid)?;
    let path = join_cwd(&cwd, &raw_path);

    let (mount_id, inode) = fs::resolve(&path)?;
    let table = MOUNTS.read();
    let filesystem = table.filesystem(mount_id).ok_or(SyscallError::FileNotFound)?;
    let _ = fs::cached_attr(mount_id, inode, filesystem)?;
    drop(table);

    let file = OpenFile { mount: mount_id, inode, offset: 0, writable: ecx & 1 != 0 };
    let handle = process::get_process(pid).ok_or(SyscallError::InvalidPid)?;
    let fd = handle.lock().fds.allocate(file, 3).map_err(SyscallError::from)?;
    Ok(fd as u32)
}

/// `close(fd)` (syscall 2). A no-op below fd 3, matching `FdTable::close`.
pub fn sys_close(pid: ProcessId, ebx: u32, _ecx: u32, _edx: u32) -> Result<u32, SyscallError> {
    let handle = process::get_process(pid).ok_or(SyscallError::InvalidPid)?;
    handle.lock().fds.close(ebx as usize);
    Ok(0)
}

/// `read(fd, buf, n)` (syscall 3).
pub fn sys_read(pid: ProcessId, ebx: u32, ecx: u32, edx: u32) -> Result<u32, SyscallError> {
    let buf_ptr = VirtAddr::new(ecx);
    if !ptr_validate(pid, buf_ptr) {
        return Err(SyscallError::InvalidPtr);
    }
    let handle = process::get_process(pid).ok_or(SyscallError::InvalidPid)?;
    let (mount_id, inode, offset) = {
        let p = handle.lock();
        let file = p.fds.get(ebx as usize).map_err(SyscallError::from)?;
        (file.mount, file.inode, file.offset)
    };
    let table = MOUNTS.read();
    let filesystem = table.filesystem(mount_id).ok_or(SyscallError::FileNotFound)?;
    let buf = unsafe { core::slice::from_raw_parts_mut(buf_ptr.as_mut_ptr::<u8>(), edx as usize) };
    let n = filesystem.read_file(inode, offset, buf)?;
    drop(table);
    handle.lock().fds.get_mut(ebx as usize).map_err(SyscallError::from)?.offset += n as u64;
    Ok(n as u32)
}

/// `write(fd, buf, n)` (syscall 4).
pub fn sys_write(pid: ProcessId, ebx: u32, ecx: u32, edx: u32) -> Result<u32, SyscallError> {
    let buf_ptr = VirtAddr::new(ecx);
    if !ptr_validate(pid, buf_ptr) {
        return Err(SyscallError::InvalidPtr);
    }
    let handle = process::get_process(pid).ok_or(SyscallError::InvalidPid)?;
    let (mount_id, inode, offset) = {
        let p = handle.lock();
        let file = p.fds.get(ebx as usize).map_err(SyscallError::from)?;
        (file.mount, file.inode, file.offset)
    };
    let table = MOUNTS.read();
    let filesystem = table.filesystem(mount_id).ok_or(SyscallError::FileNotFound)?;
    let buf = unsafe { core::slice::from_raw_parts(buf_ptr.as_ptr::<u8>(), edx as usize) };
    let n = filesystem.write_file(inode, offset, buf)?;
    drop(table);
    fs::inode::INODE_CACHE.lock().invalidate(mount_id, inode);
    handle.lock().fds.get_mut(ebx as usize).map_err(SyscallError::from)?.offset += n as u64;
    Ok(n as u32)
}

/// `seek(fd, off, whence)` (syscall 7). `whence` 0=SET, 1=CUR, 2=END.
pub fn sys_seek(pid: ProcessId, ebx: u32, ecx: u32, edx: u32) -> Result<u32, SyscallError> {
    let handle = process::get_process(pid).ok_or(SyscallError::InvalidPid)?;
    let offset_arg = ecx as i32;
    let (mount_id, inode, current) = {
        let p = handle.lock();
        let file = p.fds.get(ebx as usize).map_err(SyscallError::from)?;
        (file.mount, file.inode, file.offset)
    };

    let new_offset = match edx {
        SEEK_SET => offset_arg.max(0) as u64,
        SEEK_CUR => (current as i64 + offset_arg as i64).max(0) as u64,
        SEEK_END => {
            let table = MOUNTS.read();
            let filesystem = table.filesystem(mount_id).ok_or(SyscallError::FileNotFound)?;
            let size = fs::cached_attr(mount_id, inode, filesystem)?.size;
            (size as i64 + offset_arg as i64).max(0) as u64
        }
        _ => return Err(SyscallError::InvalidPtr),
    };

    handle.lock().fds.get_mut(ebx as usize).map_err(SyscallError::from)?.offset = new_offset;
    Ok(new_offset as u32)
}

/// `stat(fd, &buf)` (syscall 8): writes the 13-word stat block the original fills in
/// `syscall_stat` (drive/inode/mode/hard_links/uid/gid/devid/length/atime/mtime/ctime/
/// blocksize/blocks). `mode`/`uid`/`gid`/`devid`/timestamps are not tracked by any
/// filesystem driver here yet and are written as 0, matching the original's own
/// still-`TODO`'d `mode` field.
pub fn sys_stat(pid: ProcessId, ebx: u32, _ecx: u32, edx: u32) -> Result<u32, SyscallError> {
    let out = VirtAddr::new(edx);
    if !ptr_validate(pid, out) {
        return Err(SyscallError::InvalidPtr);
    }
    let handle = process::get_process(pid).ok_or(SyscallError::InvalidPid)?;
    let (mount_id, inode) = {
        let p = handle.lock();
        let file = p.fds.get(ebx as usize).map_err(SyscallError::from)?;
        (file.mount, file.inode)
    };
    let table = MOUNTS.read();
    let filesystem = table.filesystem(mount_id).ok_or(SyscallError::FileNotFound)?;
    let attr = fs::cached_attr(mount_id, inode, filesystem)?;

    let words: [u32; 13] = [
        mount_id_as_drive(mount_id),
        inode.0 as u32,
        0,
        1,
        0,
        0,
        0,
        attr.size as u32,
        0,
        0,
        0,
        512,
        (attr.size / 512) as u32,
    ];
    // SAFETY: `out` was validated above and points to 13 contiguous u32s.
    unsafe { core::ptr::copy_nonoverlapping(words.as_ptr(), out.as_mut_ptr::<u32>(), 13) };
    Ok(0)
}

fn mount_id_as_drive(_mount_id: crate::fs::mount::MountId) -> u32 {
    // `MountId` carries no stable numeric identity exposed outside `fs::mount`; the
    // "drive" word is informational only and no caller in this ABI subset reads it back.
    0
}

/// `readdir(fd, index, &dirent)` (syscall 14): writes `(inode: u32, name: [u8; 256])` at
/// the `index`'th entry of the open directory, `FileOut` past the end.
pub fn sys_readdir(pid: ProcessId, ebx: u32, ecx: u32, edx: u32) -> Result<u32, SyscallError> {
    let out = VirtAddr::new(edx);
    if !ptr_validate(pid, out) {
        return Err(SyscallError::InvalidPtr);
    }
    let handle = process::get_process(pid).ok_or(SyscallError::InvalidPid)?;
    let (mount_id, inode) = {
        let p = handle.lock();
        let file = p.fds.get(ebx as usize).map_err(SyscallError::from)?;
        (file.mount, file.inode)
    };
    let table = MOUNTS.read();
    let filesystem = table.filesystem(mount_id).ok_or(SyscallError::FileNotFound)?;
    let entries = filesystem.list_dir(inode)?;
    let entry = entries.get(ecx as usize).ok_or(SyscallError::FileOut)?;

    // SAFETY: `out` was validated above and the buffer is at least 4 + 256 bytes, matching
    // the original's fixed `struct dirent`.
    unsafe {
        core::ptr::write_unaligned(out.as_mut_ptr::<u32>(), entry.inode.0 as u32);
        let name_ptr = out.as_mut_ptr::<u8>().add(4);
        let name_bytes = entry.name.as_bytes();
        let len = name_bytes.len().min(255);
        core::ptr::copy_nonoverlapping(name_bytes.as_ptr(), name_ptr, len);
        *name_ptr.add(len) = 0;
    }
    Ok(0)
}

/// `dup(fd, newfd)` (syscall 16). `newfd == 0` picks the lowest free slot at or above 3;
/// otherwise the explicit slot is closed first, then reopened with the same file.
pub fn sys_dup(pid: ProcessId, ebx: u32, ecx: u32, _edx: u32) -> Result<u32, SyscallError> {
    let handle = process::get_process(pid).ok_or(SyscallError::InvalidPid)?;
    let mut p = handle.lock();
    let file = *p.fds.get(ebx as usize).map_err(SyscallError::from)?;
    if ecx == 0 {
        let fd = p.fds.allocate(file, 3).map_err(SyscallError::from)?;
        Ok(fd as u32)
    } else {
        p.fds.close(ecx as usize);
        let fd = p.fds.allocate(file, ecx as usize).map_err(SyscallError::from)?;
        Ok(fd as u32)
    }
}

/// `fork()` (syscall 31). The trampoline is the syscall dispatcher's own re-entry address
/// for a freshly forked child: since [`crate::process::thread::Thread::fork`] already
/// forces the child's `regs.eax = 0`, resuming at `syscall_entry`'s normal `popad;iretd`
/// tail (rather than re-running the handler) is exactly "return 0 from `fork`" without any
/// separate `fork_ret` stub needed, matching the original's `fork_ret` in spirit if not in
/// literal asm.
pub fn sys_fork(pid: ProcessId, _ebx: u32, _ecx: u32, _edx: u32) -> Result<u32, SyscallError> {
    let parent_regs = crate::sched::current_regs(pid).ok_or(SyscallError::InvalidPid)?;
    let trampoline = VirtAddr::new(parent_regs.eip);
    let child = process::fork(pid, trampoline).map_err(SyscallError::from)?;
    Ok(child.as_raw() as u32)
}

/// `exit(code)` (syscall 32).
pub fn sys_exit(pid: ProcessId, ebx: u32, _ecx: u32, _edx: u32) -> Result<u32, SyscallError> {
    process::exit_process(pid, 0x8000_0000 | (ebx & 0xFF)).map_err(SyscallError::from)?;
    Ok(0)
}

/// `exec(fd, argc, argv)` (syscall 33): validates the ELF image behind `fd`, copies argv
/// strings out before tearing down the old address space (so a user-mode argv pointing
/// into memory this call is about to unmap is never read after the fact), unmaps the old
/// segments, loads the new image, and resets the active thread's entry/stack.
pub fn sys_exec(pid: ProcessId, ebx: u32, ecx: u32, edx: u32) -> Result<u32, SyscallError> {
    let handle = process::get_process(pid).ok_or(SyscallError::InvalidPid)?;
    let (mount_id, inode) = {
        let p = handle.lock();
        let file = p.fds.get(ebx as usize).map_err(SyscallError::from)?;
        (file.mount, file.inode)
    };

    let image = {
        let table = MOUNTS.read();
        let filesystem = table.filesystem(mount_id).ok_or(SyscallError::FileNotFound)?;
        let attr = fs::cached_attr(mount_id, inode, filesystem)?;
        let mut buf = alloc::vec![0u8; attr.size as usize];
        filesystem.read_file(inode, 0, &mut buf)?;
        buf
    };
    if !elf::elf_check(&image) {
        return Err(SyscallError::Unknown);
    }

    let argv_ptr = VirtAddr::new(edx);
    let mut argv = Vec::with_capacity(ecx as usize);
    for i in 0..ecx as usize {
        if !ptr_validate(pid, argv_ptr) {
            return Err(SyscallError::InvalidPtr);
        }
        // SAFETY: `argv_ptr` validated above; `argv` is an array of `ecx` string pointers.
        let entry_ptr = unsafe { *(argv_ptr.as_ptr::<u32>().add(i)) };
        argv.push(read_cstr(pid, VirtAddr::new(entry_ptr))?);
    }

    let paging = crate::x86::paging::paging_manager();
    let dir_vaddr = match handle.lock().address_space {
        process::AddressSpace::Owned(v) => v,
        process::AddressSpace::Kernel => return Err(SyscallError::Unknown),
    };
    let directory = unsafe { &mut *dir_vaddr.as_mut_ptr::<crate::x86::paging::PageTable>() };

    let old_segments = handle.lock().segments.clone();
    for segment in &old_segments {
        let _ = paging.unmap_page(directory, segment.vaddr);
    }

    let (entry, segments) = elf::elf_load(paging, directory, &image).map_err(SyscallError::from)?;

    let mut p = handle.lock();
    p.segments = segments;
    p.heap_addr = p.segments.last().map(|s| s.vaddr + s.memsz).unwrap_or(VirtAddr::new(0x0040_0000));
    p.heap_size = 0;
    if let Some(tid) = p.active_thread {
        drop(p);
        if let Some(th) = thread::get_thread(tid) {
            let mut t = th.lock();
            t.regs.eip = entry.as_u32();
            t.regs.eax = argv.len() as u32;
        }
    }
    Ok(0)
}

/// `wait(pid, &wstatus)` (syscall 34). Reaps an already-zombie matching child
/// immediately; otherwise parks the calling thread on the process's wait queue and asks
/// the syscall dispatcher to hand the CPU elsewhere (SPEC_FULL §4.7 "Wait contract"),
/// reproducing the original's `wait_start:` retry loop via re-execution of `int 0x80`
/// rather than an in-kernel `goto`.
pub fn sys_wait(pid: ProcessId, ebx: u32, ecx: u32, _edx: u32) -> Result<u32, SyscallError> {
    let request = ebx as i32;
    match process::wait(pid, request).map_err(SyscallError::from)? {
        WaitOutcome::Reaped(child, code) => {
            let status_ptr = VirtAddr::new(ecx);
            if ecx != 0 {
                if !ptr_validate(pid, status_ptr) {
                    return Err(SyscallError::InvalidPtr);
                }
                // SAFETY: validated above.
                unsafe { *status_ptr.as_mut_ptr::<u32>() = code };
            }
            Ok(child.as_raw() as u32)
        }
        WaitOutcome::ParkForChild => {
            let handle = process::get_process(pid).ok_or(SyscallError::InvalidPid)?;
            let mut p = handle.lock();
            let tid = p.active_thread.take().ok_or(SyscallError::InvalidPid)?;
            p.threads.park(tid);
            drop(p);
            if let Some(th) = thread::get_thread(tid) {
                th.lock().status = ThreadStatus::AsleepChild;
            }
            Ok(0)
        }
    }
}

/// `sig(pid, sig)` (syscall 37): `pid < 0` addresses group `-pid`, matching
/// `syscall_sig`'s dispatch.
pub fn sys_sig(_pid: ProcessId, ebx: u32, ecx: u32, _edx: u32) -> Result<u32, SyscallError> {
    let target = ebx as i32;
    let sig = Signal(ecx as u8);
    if target < 0 {
        crate::process::signal::send_signal_to_group(GroupId(-target), sig).map_err(SyscallError::from)?;
    } else {
        crate::process::signal::send_signal(ProcessId::from_raw(target as usize), sig)
            .map_err(SyscallError::from)?;
    }
    Ok(0)
}

/// `sigaction(sig, handler)` (syscall 38): installs `handler` as the new disposition for
/// `sig`, returning the previous handler's entry point (or 0 for the default/ignore
/// dispositions) as the value, matching the original's "return old handler" contract.
/// Rejects `SIGKILL`/`SIGSTOP` via [`crate::process::signal::HandlerTable::set`].
pub fn sys_sigaction(pid: ProcessId, ebx: u32, ecx: u32, _edx: u32) -> Result<u32, SyscallError> {
    let sig = Signal(ebx as u8);
    let handle = process::get_process(pid).ok_or(SyscallError::InvalidPid)?;
    let mut p = handle.lock();
    let old = match p.signal_handlers.get(sig) {
        Disposition::Handler(addr) => addr.as_u32(),
        Disposition::Default | Disposition::Ignore => 0,
    };
    let new_disposition = if ecx == 0 {
        Disposition::Ignore
    } else {
        Disposition::Handler(VirtAddr::new(ecx))
    };
    p.signal_handlers.set(sig, new_disposition).map_err(SyscallError::from)?;
    Ok(old)
}

/// `sbrk(incr)` (syscall 40).
pub fn sys_sbrk(pid: ProcessId, ebx: u32, _ecx: u32, _edx: u32) -> Result<u32, SyscallError> {
    process::sbrk(pid, ebx as i32).map_err(SyscallError::from)
}

const I_TTY_SETPGRP: u32 = 1;
const I_TTY_GETPGRP: u32 = 2;

/// `ioctl(fd, cmd, arg)` (syscall 51). Only devfs TTY nodes implement anything; every
/// other device kind (and every non-devfs fd) is `NoDevice`.
///
/// `I_TTY_SETPGRP`/`I_TTY_GETPGRP`'s numeric values are not defined by anything in
/// `original_source` (its `io/ioctl.h` was not part of the retrieved source pack) and are
/// invented here; the semantics themselves (checked against `original_source/io/ttys.c`'s
/// `tty_ioctl`) are not a guess.
pub fn sys_ioctl(pid: ProcessId, ebx: u32, ecx: u32, edx: u32) -> Result<u32, SyscallError> {
    let handle = process::get_process(pid).ok_or(SyscallError::InvalidPid)?;
    let (mount_id, inode, process_tty, process_sid) = {
        let p = handle.lock();
        let file = p.fds.get(ebx as usize).map_err(SyscallError::from)?;
        (file.mount, file.inode, p.tty, p.sid)
    };
    let table = MOUNTS.read();
    let filesystem = table.filesystem(mount_id).ok_or(SyscallError::FileNotFound)?;
    if filesystem.device_kind(inode) != Some(DeviceKind::Tty) {
        return Err(SyscallError::NoDevice);
    }
    drop(table);

    let Some(tty) = process_tty else { return Err(SyscallError::NoTty) };
    if inode != tty {
        return Err(SyscallError::NoTty);
    }

    match ecx {
        I_TTY_SETPGRP => {
            let owner = session_owning_tty(tty);
            if owner != Some(process_sid) {
                return Err(SyscallError::IsAnotherSession);
            }
            if !set_foreground_group(process_sid, GroupId(edx as i32)) {
                return Err(SyscallError::Permission);
            }
            Ok(0)
        }
        I_TTY_GETPGRP => {
            let out = VirtAddr::new(edx);
            if !ptr_validate(pid, out) {
                return Err(SyscallError::InvalidPtr);
            }
            let gid = foreground_group(process_sid).map(|g| g.0 as u32).unwrap_or(u32::MAX - 1);
            // SAFETY: validated above.
            unsafe { *out.as_mut_ptr::<u32>() = gid };
            Ok(0)
        }
        _ => Err(SyscallError::NoDevice),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_cwd_leaves_absolute_paths_alone() {
        assert_eq!(join_cwd("/home/user", "/etc/passwd"), "/etc/passwd");
    }

    #[test]
    fn join_cwd_joins_relative_paths() {
        assert_eq!(join_cwd("/home/user", "notes.txt"), "/home/user/notes.txt");
    }

    #[test]
    fn join_cwd_handles_root_cwd() {
        assert_eq!(join_cwd("/", "sys/init"), "/sys/init");
    }
}
