//! Process groups and sessions (SPEC_FULL §3 "Process group / session").
//!
//! A process belongs to exactly one group, which belongs to exactly one session. A
//! session's leader exiting detaches the controlling tty and signals the foreground group
//! (SPEC_FULL §4.7 exit contract). The original's sorted-array-plus-binary-search group
//! table (`original_source/tasking/processes/groups.c`) is replaced by a `BTreeMap` keyed
//! the same way (by gid) — same lookup shape, arena-owned rather than `kmalloc`-realloced.

use alloc::collections::BTreeMap;
use alloc::vec::Vec;
use conquer_once::spin::OnceCell;
use spin::RwLock;

use crate::process::ProcessId;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct GroupId(pub i32);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct SessionId(pub i32);

pub struct ProcessGroup {
    pub gid: GroupId,
    pub session: SessionId,
    pub members: Vec<ProcessId>,
}

pub struct Session {
    pub id: SessionId,
    /// The process whose exit detaches the controlling tty (SPEC_FULL §4.7 exit contract).
    pub leader: ProcessId,
    /// The controlling tty devfs inode, if one was ever attached.
    pub tty: Option<crate::fs::InodeId>,
    pub groups: Vec<GroupId>,
    /// The group `tty_ioctl`'s `I_TTY_SETPGRP` last assigned as the tty's foreground group
    /// (`original_source/io/ttys.c`'s `tty->foreground_processes`).
    pub foreground_group: Option<GroupId>,
}

struct GroupTable {
    groups: BTreeMap<GroupId, ProcessGroup>,
    sessions: BTreeMap<SessionId, Session>,
}

static GROUP_TABLE: OnceCell<RwLock<GroupTable>> = OnceCell::uninit();

pub fn init_group_table() {
    GROUP_TABLE.init_once(|| {
        RwLock::new(GroupTable {
            groups: BTreeMap::new(),
            sessions: BTreeMap::new(),
        })
    });
}

fn table() -> &'static RwLock<GroupTable> {
    GROUP_TABLE.get().expect("group table accessed before init_group_table")
}

/// Creates a new session and a group of the same id, with `process` as sole member and
/// session leader — the shape every `fork`-free process creation (init, a shell's first
/// child after `setsid`) starts from.
pub fn new_session(gid: GroupId, process: ProcessId) {
    let mut t = table().write();
    let sid = SessionId(gid.0);
    t.groups.insert(
        gid,
        ProcessGroup {
            gid,
            session: sid,
            members: alloc::vec![process],
        },
    );
    t.sessions.insert(
        sid,
        Session {
            id: sid,
            leader: process,
            tty: None,
            groups: alloc::vec![gid],
            foreground_group: None,
        },
    );
}

/// Removes `process` from its current group and joins (or creates) group `gid`,
/// mirroring the original's `process_setgroup`/`process_addgroup`.
pub fn set_group(process: ProcessId, gid: GroupId, session: SessionId) {
    let mut t = table().write();
    for group in t.groups.values_mut() {
        group.members.retain(|&p| p != process);
    }
    let group = t.groups.entry(gid).or_insert_with(|| ProcessGroup {
        gid,
        session,
        members: Vec::new(),
    });
    if !group.members.contains(&process) {
        group.members.push(process);
    }
    let groups_of_session = t.sessions.entry(session).or_insert_with(|| Session {
        id: session,
        leader: process,
        tty: None,
        groups: Vec::new(),
        foreground_group: None,
    });
    if !groups_of_session.groups.contains(&gid) {
        groups_of_session.groups.push(gid);
    }
}

/// Whether `process` is the leader of `session` (SPEC_FULL §4.7 "detaches the controlling
/// tty if it was the session leader").
pub fn is_session_leader(process: ProcessId, session: SessionId) -> bool {
    table().read().sessions.get(&session).map(|s| s.leader == process).unwrap_or(false)
}

/// Removes `process` from group `gid` (SPEC_FULL §4.7 exit contract "removes the process
/// from its group").
pub fn leave_group(process: ProcessId, gid: GroupId) {
    let mut t = table().write();
    if let Some(group) = t.groups.get_mut(&gid) {
        group.members.retain(|&p| p != process);
    }
}

/// Detaches the controlling tty from `session` (exit of a session leader).
pub fn detach_tty(session: SessionId) -> Option<crate::fs::InodeId> {
    table().write().sessions.get_mut(&session).and_then(|s| s.tty.take())
}

pub fn attach_tty(session: SessionId, tty: crate::fs::InodeId) {
    if let Some(s) = table().write().sessions.get_mut(&session) {
        s.tty = Some(tty);
    }
}

/// Every member of group `gid`, for signaling the foreground group.
pub fn members_of(gid: GroupId) -> Vec<ProcessId> {
    table().read().groups.get(&gid).map(|g| g.members.clone()).unwrap_or_default()
}

/// The session that currently has `tty` attached as its controlling tty, if any
/// (`tty_ioctl`'s `ERROR_IS_ANOTHER_SESSION` check).
pub fn session_owning_tty(tty: crate::fs::InodeId) -> Option<SessionId> {
    table().read().sessions.values().find(|s| s.tty == Some(tty)).map(|s| s.id)
}

/// `I_TTY_SETPGRP`: assigns `gid` as `session`'s foreground group, rejecting a group that
/// does not belong to this session or has no members.
pub fn set_foreground_group(session: SessionId, gid: GroupId) -> bool {
    let mut t = table().write();
    let owns_group = t.sessions.get(&session).map(|s| s.groups.contains(&gid)).unwrap_or(false);
    let has_members = t.groups.get(&gid).map(|g| !g.members.is_empty()).unwrap_or(false);
    if !owns_group || !has_members {
        return false;
    }
    t.sessions.get_mut(&session).expect("checked above").foreground_group = Some(gid);
    true
}

/// `I_TTY_GETPGRP`: the session's current foreground group, if one was ever assigned.
pub fn foreground_group(session: SessionId) -> Option<GroupId> {
    table().read().sessions.get(&session).and_then(|s| s.foreground_group)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh_table() {
        let mut t = table().write();
        t.groups.clear();
        t.sessions.clear();
    }

    #[test]
    fn new_session_creates_matching_group_and_session() {
        init_group_table();
        fresh_table();
        new_session(GroupId(1), ProcessId::from_raw_for_test(1));
        assert_eq!(members_of(GroupId(1)), alloc::vec![ProcessId::from_raw_for_test(1)]);
    }

    #[test]
    fn leave_group_removes_member() {
        init_group_table();
        fresh_table();
        new_session(GroupId(2), ProcessId::from_raw_for_test(2));
        leave_group(ProcessId::from_raw_for_test(2), GroupId(2));
        assert!(members_of(GroupId(2)).is_empty());
    }

    #[test]
    fn detach_tty_clears_the_session_tty() {
        init_group_table();
        fresh_table();
        new_session(GroupId(3), ProcessId::from_raw_for_test(3));
        attach_tty(SessionId(3), crate::fs::InodeId(7));
        assert_eq!(detach_tty(SessionId(3)), Some(crate::fs::InodeId(7)));
        assert_eq!(detach_tty(SessionId(3)), None);
    }
}
