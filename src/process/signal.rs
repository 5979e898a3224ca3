//! Signal delivery (SPEC_FULL §4.9).
//!
//! `send_signal` only enqueues; delivery happens later when the scheduler drains the
//! queue once per tick (SPEC_FULL §4.8 step 1). A process's handler table has one slot per
//! signal: `None` means the default action, `Ignore` means drop it, `Handler(eip)` means
//! hand off to a user-mode trampoline. Queue/handler-table shape and the default-action
//! table are grounded on `original_source/tasking/processes/signal.c`
//! (`send_signal`/`handle_signals`/`handle_signal`); registry idiom follows teacher
//! `src/fzboot/process/mod.rs`'s `OnceCell<RwLock<...>>` pattern.

use alloc::collections::VecDeque;
use alloc::vec::Vec;

use conquer_once::spin::OnceCell;
use spin::Mutex;

use crate::errors::SignalError;
use crate::mem::VirtAddr;
use crate::process::ProcessId;

pub const NSIG: usize = 28;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Signal(pub u8);

impl Signal {
    pub const SIGHUP: Self = Self(1);
    pub const SIGINT: Self = Self(2);
    pub const SIGQUIT: Self = Self(3);
    pub const SIGKILL: Self = Self(9);
    pub const SIGSEGV: Self = Self(11);
    pub const SIGSTOP: Self = Self(17);
    pub const SIGCONT: Self = Self(18);
    pub const SIGCHLD: Self = Self(20);

    fn valid(self) -> bool {
        self.0 > 0 && (self.0 as usize) < NSIG
    }

    fn is_uncatchable(self) -> bool {
        self == Self::SIGKILL || self == Self::SIGSTOP
    }
}

/// What happens to a process on receipt of a signal with no installed handler.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum DefaultAction {
    Exit,
    Ignore,
    Continue,
    Stop,
}

/// Indexed by signal number; mirrors the original's `default_action` table.
const DEFAULT_ACTIONS: [DefaultAction; NSIG] = {
    let mut table = [DefaultAction::Exit; NSIG];
    table[0] = DefaultAction::Ignore; // signal 0 is never sent, kept inert
    table[Signal::SIGCHLD.0 as usize] = DefaultAction::Ignore;
    table[Signal::SIGCONT.0 as usize] = DefaultAction::Continue;
    table[Signal::SIGSTOP.0 as usize] = DefaultAction::Stop;
    table
};

/// One process's signal disposition table. `Handler` carries the user-mode entry point a
/// delivery trampoline jumps to (SPEC_FULL §4.9 "trampoline hand-off").
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Disposition {
    #[default]
    Default,
    Ignore,
    Handler(VirtAddr),
}

pub struct HandlerTable([Disposition; NSIG]);

impl Default for HandlerTable {
    fn default() -> Self {
        Self([Disposition::Default; NSIG])
    }
}

impl HandlerTable {
    pub fn get(&self, sig: Signal) -> Disposition {
        self.0[sig.0 as usize]
    }

    /// `sigaction`: installs `disposition` for `sig`, rejecting `SIGKILL`/`SIGSTOP`
    /// (SPEC_FULL §4.9 "uncatchable").
    pub fn set(&mut self, sig: Signal, disposition: Disposition) -> Result<(), SignalError> {
        if !sig.valid() {
            return Err(SignalError::InvalidSignal);
        }
        if sig.is_uncatchable() {
            return Err(SignalError::Uncatchable);
        }
        self.0[sig.0 as usize] = disposition;
        Ok(())
    }

    pub fn fork(&self) -> Self {
        Self(self.0)
    }
}

/// Outcome `handle_signal` asks the caller (the scheduler) to carry out, since this module
/// does not own process/thread state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignalAction {
    None,
    Exit { code: u32 },
    Stop,
    Continue,
    Enter { handler: VirtAddr, signal: Signal },
}

static SIGNAL_QUEUE: OnceCell<Mutex<VecDeque<(ProcessId, Signal)>>> = OnceCell::uninit();

pub fn init_signal_queue() {
    SIGNAL_QUEUE.init_once(|| Mutex::new(VecDeque::new()));
}

fn queue() -> &'static Mutex<VecDeque<(ProcessId, Signal)>> {
    SIGNAL_QUEUE.get().expect("signal queue accessed before init_signal_queue")
}

/// Enqueues `sig` for `pid`; delivery happens later (SPEC_FULL §4.9 "send only enqueues").
pub fn send_signal(pid: ProcessId, sig: Signal) -> Result<(), SignalError> {
    if !sig.valid() {
        return Err(SignalError::InvalidSignal);
    }
    queue().lock().push_back((pid, sig));
    Ok(())
}

pub fn send_signal_to_group(gid: crate::process::group::GroupId, sig: Signal) -> Result<(), SignalError> {
    for pid in crate::process::group::members_of(gid) {
        send_signal(pid, sig)?;
    }
    Ok(())
}

/// Drains the whole queue, resolving each `(pid, sig)` against `handlers` into the action
/// the caller must carry out. Called once per scheduler tick (SPEC_FULL §4.8 step 1).
pub fn drain(mut resolve: impl FnMut(ProcessId, Signal) -> Option<Disposition>) -> Vec<(ProcessId, SignalAction)> {
    let mut pending = queue().lock();
    let mut actions = Vec::with_capacity(pending.len());
    for (pid, sig) in pending.drain(..) {
        let Some(disposition) = resolve(pid, sig) else { continue };
        let action = match disposition {
            Disposition::Ignore => SignalAction::None,
            Disposition::Handler(entry) => SignalAction::Enter { handler: entry, signal: sig },
            Disposition::Default => match DEFAULT_ACTIONS[sig.0 as usize] {
                DefaultAction::Exit => SignalAction::Exit { code: 0x8000_0000 | u32::from(sig.0) },
                DefaultAction::Ignore => SignalAction::None,
                DefaultAction::Continue => SignalAction::Continue,
                DefaultAction::Stop => SignalAction::Stop,
            },
        };
        actions.push((pid, action));
    }
    actions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::ProcessId;

    #[test]
    fn sigkill_cannot_be_rebound() {
        let mut table = HandlerTable::default();
        assert_eq!(table.set(Signal::SIGKILL, Disposition::Ignore), Err(SignalError::Uncatchable));
    }

    #[test]
    fn unhandled_sigchld_defaults_to_ignore() {
        init_signal_queue();
        send_signal(ProcessId::from_raw_for_test(1), Signal::SIGCHLD).unwrap();
        let actions = drain(|_, _| Some(Disposition::Default));
        assert_eq!(actions, alloc::vec![(ProcessId::from_raw_for_test(1), SignalAction::None)]);
    }

    #[test]
    fn unhandled_sigint_defaults_to_exit() {
        init_signal_queue();
        send_signal(ProcessId::from_raw_for_test(2), Signal::SIGINT).unwrap();
        let actions = drain(|_, _| Some(Disposition::Default));
        assert_eq!(actions.len(), 1);
        assert!(matches!(actions[0].1, SignalAction::Exit { .. }));
    }

    #[test]
    fn custom_handler_is_handed_to_the_trampoline() {
        init_signal_queue();
        let handler = VirtAddr::new(0x9000);
        send_signal(ProcessId::from_raw_for_test(3), Signal::SIGHUP).unwrap();
        let actions = drain(|_, _| Some(Disposition::Handler(handler)));
        assert_eq!(
            actions,
            alloc::vec![(
                ProcessId::from_raw_for_test(3),
                SignalAction::Enter { handler, signal: Signal::SIGHUP }
            )]
        );
    }
}
