//! Crate-wide error domains.
//!
//! Every fallible subsystem in this kernel exposes its own error enum implementing
//! [`BaseError`], rather than a single flat error type, so that a caller closer to the
//! syscall boundary can fold a specific error into the right ABI error kind without
//! losing the original cause.

use core::fmt::Debug;

use alloc::boxed::Box;

/// Common trait implemented by every error type in this crate.
///
/// Depending on [`Debug`] is enough: these errors are surfaced to kernel logs and to the
/// syscall ABI's flat error-kind enum, never formatted for an end user.
pub trait BaseError: Debug {}

/// Return type for operations whose only failure mode is "didn't happen".
pub type CanFail<T> = Result<(), T>;

/// Return type for call sites that do not care about the specific error domain.
pub type GenericError = Result<(), Box<dyn BaseError>>;

/// Physical memory manager and kernel heap errors.
#[derive(Debug)]
pub enum MemoryError {
    /// No free block large enough to satisfy a `reserve`/`kmalloc` request.
    OutOfMemory,
    /// `reserve_specific` was asked for a range not fully covered by one free block.
    RangeUnavailable,
    /// A block header's magic did not match on access — heap corruption.
    CorruptHeapBlock,
    /// `free`/`pt_free` was asked to release an address not owned by this allocator.
    UnknownBlock,
    /// `free` was asked to release a block of a non-freeable kind.
    NotFreeable,
    Exception(Box<dyn BaseError>),
}

impl BaseError for MemoryError {}

/// Paging and address-space errors.
#[derive(Debug)]
pub enum PagingError {
    /// `map_memory`/`map_flexible` targeted a page that is already present.
    AlreadyMapped,
    /// `unmap_flexible` targeted a page that is not present.
    NotMapped,
    /// No page-table heap slots remain to materialize a new page table.
    NoPageTableSlots,
    /// The requested virtual range crosses outside the calling half (user vs. kernel).
    OutOfRange,
    Exception(Box<dyn BaseError>),
}

impl BaseError for PagingError {}

/// Block-device transport errors, matching the ABI in SPEC_FULL §4.5.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockDeviceError {
    /// No such device, or the device never responded.
    Unreachable,
    /// Sector/offset falls outside the device's addressable capacity.
    OutOfRange,
    /// The device is mid-transfer; caller may retry.
    Busy,
    /// Controller or device reported an error condition.
    Internal,
}

impl BaseError for BlockDeviceError {}

/// Filesystem and VFS errors.
#[derive(Debug)]
pub enum FsError {
    NotFound,
    NotADirectory,
    IsADirectory,
    AlreadyExists,
    NotEmpty,
    ReadOnly,
    InvalidPath,
    NoSuchMount,
    Block(BlockDeviceError),
    BadSuperblock,
    Exception(Box<dyn BaseError>),
}

impl BaseError for FsError {}

impl From<BlockDeviceError> for FsError {
    fn from(e: BlockDeviceError) -> Self {
        FsError::Block(e)
    }
}

/// Process table, fork/exec/exit/wait errors.
#[derive(Debug)]
pub enum ProcessError {
    InvalidPid,
    HasNoChild,
    NoSuchFd,
    TooManyFds,
    BadElf,
    OutOfMemory,
    Fs(FsError),
    Exception(Box<dyn BaseError>),
}

impl BaseError for ProcessError {}

impl From<FsError> for ProcessError {
    fn from(e: FsError) -> Self {
        ProcessError::Fs(e)
    }
}

/// Scheduler and mutex errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedError {
    /// A `(pid, tid)` reference used by a sleep/IRQ-wait entry no longer resolves to a
    /// live thread (§9 Design Notes: validated on dequeue rather than trusted).
    StaleReference,
    /// `mutex_lock` failed to claim the lock; caller should `mutex_wait` and retry.
    WouldBlock,
}

impl BaseError for SchedError {}

/// Signal subsystem errors.
#[derive(Debug)]
pub enum SignalError {
    InvalidPid,
    /// `SIGKILL`/`SIGSTOP` cannot be caught, ignored, or have their action changed.
    Uncatchable,
    InvalidSignal,
}

impl BaseError for SignalError {}

/// Flat error kind returned to user space in `ecx`, per SPEC_FULL §6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum SyscallError {
    None = 0,
    InvalidPtr,
    FileNotFound,
    FileOut,
    FileFsInternal,
    Eof,
    Io,
    Permission,
    InvalidPid,
    InvalidSignal,
    HasNoChild,
    NoDevice,
    NoTty,
    IsAnotherSession,
    Unknown,
}

impl BaseError for SyscallError {}

impl From<FsError> for SyscallError {
    fn from(e: FsError) -> Self {
        match e {
            FsError::NotFound | FsError::InvalidPath | FsError::NoSuchMount => {
                SyscallError::FileNotFound
            }
            FsError::Block(BlockDeviceError::OutOfRange) => SyscallError::FileOut,
            FsError::Block(_) => SyscallError::Io,
            FsError::ReadOnly => SyscallError::Permission,
            FsError::BadSuperblock
            | FsError::NotADirectory
            | FsError::IsADirectory
            | FsError::AlreadyExists
            | FsError::NotEmpty => SyscallError::FileFsInternal,
            FsError::Exception(_) => SyscallError::Unknown,
        }
    }
}

impl From<ProcessError> for SyscallError {
    fn from(e: ProcessError) -> Self {
        match e {
            ProcessError::InvalidPid => SyscallError::InvalidPid,
            ProcessError::HasNoChild => SyscallError::HasNoChild,
            ProcessError::NoSuchFd | ProcessError::TooManyFds => SyscallError::FileOut,
            ProcessError::Fs(e) => e.into(),
            ProcessError::BadElf | ProcessError::OutOfMemory | ProcessError::Exception(_) => {
                SyscallError::Unknown
            }
        }
    }
}

impl From<SignalError> for SyscallError {
    fn from(e: SignalError) -> Self {
        match e {
            SignalError::InvalidPid => SyscallError::InvalidPid,
            SignalError::InvalidSignal | SignalError::Uncatchable => SyscallError::InvalidSignal,
        }
    }
}
