//! Per-process open-file table (SPEC_FULL §3 "Open file (fd)", §4.10 fd 1/2/3/4/7).
//!
//! Owned by [`crate::process::Process`], not global — fork shares the table by value
//! (each fd is copied into the child, both referring to the same inode/offset state).
//! The first three slots (0/1/2) are reserved for stdio and are never reused by `open`.

use alloc::vec::Vec;

use crate::errors::ProcessError;
use crate::fs::mount::MountId;
use crate::fs::InodeId;

pub const STDIO_RESERVED: usize = 3;
pub const MAX_FDS: usize = 64;

#[derive(Clone, Copy, Debug)]
pub struct OpenFile {
    pub mount: MountId,
    pub inode: InodeId,
    pub offset: u64,
    pub writable: bool,
}

#[derive(Default)]
pub struct FdTable {
    slots: Vec<Option<OpenFile>>,
}

impl FdTable {
    pub fn new() -> Self {
        let mut slots = Vec::with_capacity(MAX_FDS);
        slots.resize(STDIO_RESERVED, None);
        Self { slots }
    }

    /// Allocates the lowest free slot at or above `min`, per SPEC_FULL §4.10 `dup`'s
    /// "newfd=0 -> lowest-free" and `open`'s "allocate fd slot >= 3".
    pub fn allocate(&mut self, file: OpenFile, min: usize) -> Result<usize, ProcessError> {
        let min = min.max(STDIO_RESERVED);
        for (idx, slot) in self.slots.iter_mut().enumerate().skip(min) {
            if slot.is_none() {
                *slot = Some(file);
                return Ok(idx);
            }
        }
        if self.slots.len() >= MAX_FDS {
            return Err(ProcessError::TooManyFds);
        }
        while self.slots.len() < min {
            self.slots.push(None);
        }
        self.slots.push(Some(file));
        Ok(self.slots.len() - 1)
    }

    pub fn get(&self, fd: usize) -> Result<&OpenFile, ProcessError> {
        self.slots
            .get(fd)
            .and_then(|s| s.as_ref())
            .ok_or(ProcessError::NoSuchFd)
    }

    pub fn get_mut(&mut self, fd: usize) -> Result<&mut OpenFile, ProcessError> {
        self.slots
            .get_mut(fd)
            .and_then(|s| s.as_mut())
            .ok_or(ProcessError::NoSuchFd)
    }

    /// No-op for `fd < 3` (SPEC_FULL §4.10 fd 2): stdio slots are never released here.
    pub fn close(&mut self, fd: usize) {
        if fd < STDIO_RESERVED {
            return;
        }
        if let Some(slot) = self.slots.get_mut(fd) {
            *slot = None;
        }
    }

    /// Shares every open fd by value into a child table, for fork (SPEC_FULL §9
    /// "Fork semantics").
    pub fn fork(&self) -> Self {
        Self {
            slots: self.slots.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::mount::MountId;

    fn dummy() -> OpenFile {
        OpenFile {
            mount: MountId::for_test(0),
            inode: InodeId(1),
            offset: 0,
            writable: false,
        }
    }

    #[test]
    fn allocate_skips_reserved_stdio_slots() {
        let mut table = FdTable::new();
        let fd = table.allocate(dummy(), 0).unwrap();
        assert_eq!(fd, STDIO_RESERVED);
    }

    #[test]
    fn close_below_three_is_noop() {
        let mut table = FdTable::new();
        table.close(1);
        assert!(table.get(1).is_err());
    }

    #[test]
    fn fork_shares_offsets_by_value() {
        let mut parent = FdTable::new();
        let fd = parent.allocate(dummy(), 0).unwrap();
        let child = parent.fork();
        assert_eq!(child.get(fd).unwrap().offset, parent.get(fd).unwrap().offset);
    }
}
