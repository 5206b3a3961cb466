//! Page-level shared/exclusive locking.
//!
//! Locks follow strict two-phase locking: a transaction keeps every page lock
//! it acquires until `release_all` at completion. Waits are bounded by a fixed
//! timeout; a timed-out wait surfaces as `TransactionAborted` and is the only
//! deadlock-breaking mechanism.

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::page::PageId;
use crate::transaction::TransactionId;
use log::{trace, warn};
use parking_lot::{Condvar, Mutex};
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

/// Access mode requested for a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    /// Read access; any number of transactions may share it.
    Shared,
    /// Write access; a single holder, no concurrent readers.
    Exclusive,
}

impl TryFrom<u8> for Permission {
    type Error = StorageError;

    fn try_from(value: u8) -> StorageResult<Self> {
        match value {
            0 => Ok(Permission::Shared),
            1 => Ok(Permission::Exclusive),
            _ => Err(StorageError::invalid(format!(
                "Unknown permission value: {}",
                value
            ))),
        }
    }
}

/// Lock state of one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockState {
    Unlocked,
    Shared(HashSet<TransactionId>),
    Exclusive(TransactionId),
}

#[derive(Debug, Default)]
struct LockTable {
    /// Pages with at least one holder. Absent pages are unlocked.
    pages: HashMap<PageId, LockState>,
    /// Pages each transaction holds a lock on.
    held: HashMap<TransactionId, HashSet<PageId>>,
}

impl LockTable {
    /// Grants `perm` on `pid` to `tid` if no other holder conflicts.
    fn try_grant(&mut self, tid: TransactionId, pid: PageId, perm: Permission) -> bool {
        let granted = match self.pages.get_mut(&pid) {
            None | Some(LockState::Unlocked) => {
                let state = match perm {
                    Permission::Shared => LockState::Shared(HashSet::from([tid])),
                    Permission::Exclusive => LockState::Exclusive(tid),
                };
                self.pages.insert(pid, state);
                true
            }
            Some(LockState::Exclusive(owner)) => *owner == tid,
            Some(LockState::Shared(holders)) => match perm {
                Permission::Shared => {
                    holders.insert(tid);
                    true
                }
                Permission::Exclusive => {
                    // Upgrade in place once we are the only reader left.
                    if holders.len() == 1 && holders.contains(&tid) {
                        self.pages.insert(pid, LockState::Exclusive(tid));
                        true
                    } else {
                        false
                    }
                }
            },
        };

        if granted {
            self.held.entry(tid).or_default().insert(pid);
        }
        granted
    }

    fn release(&mut self, tid: TransactionId, pid: PageId) -> bool {
        let released = match self.pages.get_mut(&pid) {
            Some(LockState::Exclusive(owner)) if *owner == tid => {
                self.pages.remove(&pid);
                true
            }
            Some(LockState::Shared(holders)) => {
                let removed = holders.remove(&tid);
                if holders.is_empty() {
                    self.pages.remove(&pid);
                }
                removed
            }
            _ => false,
        };

        if let Some(pages) = self.held.get_mut(&tid) {
            pages.remove(&pid);
            if pages.is_empty() {
                self.held.remove(&tid);
            }
        }
        released
    }

    fn state(&self, pid: PageId) -> Option<&LockState> {
        self.pages.get(&pid)
    }
}

/// Grants and revokes page locks on behalf of transactions.
#[derive(Debug)]
pub struct LockManager {
    table: Mutex<LockTable>,
    released: Condvar,
    timeout: Duration,
}

impl LockManager {
    /// Creates a lock manager whose waits give up after `timeout`.
    pub fn new(timeout: Duration) -> Self {
        Self {
            table: Mutex::new(LockTable::default()),
            released: Condvar::new(),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Blocks until `tid` holds at least `perm` on `pid`.
    ///
    /// Returns immediately if a sufficient lock is already held. A Shared
    /// holder asking for Exclusive is upgraded in place. If the wait exceeds the
    /// timeout, fails with `TransactionAborted` and grants nothing new.
    pub fn acquire(&self, tid: TransactionId, pid: PageId, perm: Permission) -> StorageResult<()> {
        let deadline = Instant::now() + self.timeout;
        let mut table = self.table.lock();

        loop {
            if table.try_grant(tid, pid, perm) {
                trace!("{} acquired {:?} on page {}", tid, perm, pid);
                return Ok(());
            }

            if self.released.wait_until(&mut table, deadline).timed_out() {
                if table.try_grant(tid, pid, perm) {
                    return Ok(());
                }
                warn!(
                    "{} timed out after {:?} waiting for {:?} on page {} (held as {:?})",
                    tid,
                    self.timeout,
                    perm,
                    pid,
                    table.state(pid)
                );
                return Err(StorageError::TransactionAborted { tid, page_id: pid });
            }
        }
    }

    /// Releases whatever lock `tid` holds on `pid`.
    pub fn release(&self, tid: TransactionId, pid: PageId) {
        let mut table = self.table.lock();
        if table.release(tid, pid) {
            self.released.notify_all();
        } else {
            warn!("{} does not hold a lock on page {}", tid, pid);
        }
    }

    /// Releases every lock `tid` holds in one step and returns how many there were.
    pub fn release_all(&self, tid: TransactionId) -> usize {
        let mut table = self.table.lock();
        let pages = table.held.remove(&tid).unwrap_or_default();
        for pid in &pages {
            table.release(tid, *pid);
        }
        drop(table);

        if !pages.is_empty() {
            self.released.notify_all();
        }
        pages.len()
    }

    pub fn holds_lock(&self, tid: TransactionId, pid: PageId) -> bool {
        self.holds_read_lock(tid, pid) || self.holds_write_lock(tid, pid)
    }

    /// True if `tid` holds `pid` in Shared mode.
    pub fn holds_read_lock(&self, tid: TransactionId, pid: PageId) -> bool {
        matches!(
            self.table.lock().state(pid),
            Some(LockState::Shared(holders)) if holders.contains(&tid)
        )
    }

    /// True if `tid` holds `pid` in Exclusive mode.
    pub fn holds_write_lock(&self, tid: TransactionId, pid: PageId) -> bool {
        matches!(
            self.table.lock().state(pid),
            Some(LockState::Exclusive(owner)) if *owner == tid
        )
    }

    pub fn lock_state(&self, pid: PageId) -> LockState {
        self.table
            .lock()
            .state(pid)
            .cloned()
            .unwrap_or(LockState::Unlocked)
    }

    /// Pages `tid` currently holds a lock on.
    pub fn locked_pages(&self, tid: TransactionId) -> Vec<PageId> {
        self.table
            .lock()
            .held
            .get(&tid)
            .map(|pages| pages.iter().copied().collect())
            .unwrap_or_default()
    }
}
