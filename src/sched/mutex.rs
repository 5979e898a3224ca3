//! Kernel mutex (SPEC_FULL §4.8: "A mutex carries a locked-by pointer and a waiting
//! list"). Unlike `spin::Mutex` this never busy-waits: `try_lock` either claims the
//! mutex with interrupts disabled or fails immediately, and a caller that fails parks
//! via [`KernelMutex::park`] and reschedules, mirroring the original's
//! `mutex_lock`/`mutex_wait`/`mutex_unlock` split in
//! `original_source/tasking/scheduler/scheduler.c`.

use alloc::collections::VecDeque;
use alloc::vec::Vec;

use spin::Mutex as SpinMutex;

use crate::errors::SchedError;
use crate::int::{disable_interrupts, enable_interrupts};
use crate::process::thread::ThreadId;
use crate::process::ProcessId;

struct State {
    locked_by: Option<(ProcessId, ThreadId)>,
    waiters: VecDeque<(ProcessId, ThreadId)>,
}

/// A kernel mutex. Holds no payload of its own, the same way the original's `mutex_t`
/// is embedded next to the data it protects rather than wrapping it.
pub struct KernelMutex {
    state: SpinMutex<State>,
}

impl KernelMutex {
    pub const fn new() -> Self {
        Self {
            state: SpinMutex::new(State { locked_by: None, waiters: VecDeque::new() }),
        }
    }

    /// Claims the mutex atomically (interrupts disabled for the check-and-set), or
    /// fails with [`SchedError::WouldBlock`] if already held — the caller is expected
    /// to `park` and reschedule rather than spin.
    pub fn try_lock(&self, holder: (ProcessId, ThreadId)) -> Result<(), SchedError> {
        disable_interrupts();
        let mut state = self.state.lock();
        let result = if state.locked_by.is_none() {
            state.locked_by = Some(holder);
            Ok(())
        } else {
            Err(SchedError::WouldBlock)
        };
        drop(state);
        enable_interrupts();
        result
    }

    /// Parks `holder` on the waiter list (`mutex_wait`). The caller reschedules
    /// immediately after this returns.
    pub fn park(&self, holder: (ProcessId, ThreadId)) {
        self.state.lock().waiters.push_back(holder);
    }

    /// Releases the mutex and returns every parked waiter for the caller to wake
    /// (SPEC_FULL §4.8 "`mutex_unlock` wakes all waiters").
    pub fn unlock(&self) -> Vec<(ProcessId, ThreadId)> {
        let mut state = self.state.lock();
        state.locked_by = None;
        state.waiters.drain(..).collect()
    }

    pub fn is_locked(&self) -> bool {
        self.state.lock().locked_by.is_some()
    }

    pub fn holder(&self) -> Option<(ProcessId, ThreadId)> {
        self.state.lock().locked_by
    }
}

impl Default for KernelMutex {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pid_tid(raw: usize) -> (ProcessId, ThreadId) {
        (ProcessId::from_raw_for_test(raw), ThreadId::default())
    }

    #[test]
    fn second_try_lock_fails_until_unlock() {
        let mtx = KernelMutex::new();
        assert!(mtx.try_lock(pid_tid(1)).is_ok());
        assert_eq!(mtx.try_lock(pid_tid(2)), Err(SchedError::WouldBlock));
        mtx.unlock();
        assert!(mtx.try_lock(pid_tid(2)).is_ok());
    }

    #[test]
    fn unlock_returns_all_parked_waiters() {
        let mtx = KernelMutex::new();
        mtx.try_lock(pid_tid(1)).unwrap();
        mtx.park(pid_tid(2));
        mtx.park(pid_tid(3));
        let woken = mtx.unlock();
        assert_eq!(woken, alloc::vec![pid_tid(2), pid_tid(3)]);
    }
}
