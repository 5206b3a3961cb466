pub mod lru;

use crate::access::tuple::Tuple;
use crate::catalog::{Catalog, TableId};
use crate::concurrency::{LockManager, Permission};
use crate::config::BufferPoolConfig;
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::page::{HeapPage, PageId};
use crate::transaction::TransactionId;
use log::{debug, trace, warn};
use lru::LruMap;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

/// Shared handle to a resident page. The cache owns the only instance per page id.
pub type PageRef = Arc<RwLock<HeapPage>>;

/// Bounded page cache and the single access point to table pages.
///
/// Every page access first takes a page lock through the lock manager, so the
/// pool doubles as the transaction-facing lock API. Eviction is LRU over pages
/// with no pending modifications (no-steal); completion flushes or discards the
/// pages a transaction touched and then releases its locks.
#[derive(Clone)]
pub struct BufferPool {
    inner: Arc<BufferPoolInner>,
}

struct BufferPoolInner {
    catalog: Arc<Catalog>,
    lock_manager: LockManager,
    state: Mutex<CacheState>,
    capacity: usize,
}

/// How long eviction waits for a write-latched clean page before giving up.
const EVICTION_LATCH_WAIT: Duration = Duration::from_millis(10);

struct CacheState {
    pages: LruMap<PageId, PageRef>,
    touched: HashMap<TransactionId, HashSet<PageId>>,
    /// Pages each transaction has modified. A subset of its touched pages.
    dirtied: HashMap<TransactionId, HashSet<PageId>>,
}

impl BufferPool {
    pub fn new(catalog: Arc<Catalog>, config: &BufferPoolConfig) -> StorageResult<Self> {
        config.validate()?;
        Ok(Self {
            inner: Arc::new(BufferPoolInner {
                catalog,
                lock_manager: LockManager::new(config.lock_timeout()),
                state: Mutex::new(CacheState {
                    pages: LruMap::with_capacity(config.capacity),
                    touched: HashMap::new(),
                    dirtied: HashMap::new(),
                }),
                capacity: config.capacity,
            }),
        })
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.inner.catalog
    }

    pub fn lock_manager(&self) -> &LockManager {
        &self.inner.lock_manager
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    pub fn resident_count(&self) -> usize {
        self.inner.state.lock().pages.len()
    }

    pub fn is_resident(&self, pid: PageId) -> bool {
        self.inner.state.lock().pages.contains_key(&pid)
    }

    /// Returns page `pid`, loading it if needed, once `tid` holds at least
    /// `perm` on it.
    ///
    /// Blocks while a conflicting lock is held and fails with
    /// `TransactionAborted` when the wait times out. Loading into a full cache
    /// evicts the least recently used clean page, or fails with
    /// `CacheExhausted` when every resident page is dirty.
    pub fn get_page(
        &self,
        tid: TransactionId,
        pid: PageId,
        perm: Permission,
    ) -> StorageResult<PageRef> {
        self.inner.lock_manager.acquire(tid, pid, perm)?;

        let mut state = self.inner.state.lock();
        if let Some(page) = state.pages.get(&pid).cloned() {
            state.touched.entry(tid).or_default().insert(pid);
            return Ok(page);
        }

        let file = self.inner.catalog.heap_file(pid.table_id)?;
        if state.pages.len() >= self.inner.capacity {
            self.evict_page(&mut state)?;
        }

        let page = Arc::new(RwLock::new(file.read_page(pid)?));
        state.pages.insert(pid, Arc::clone(&page));
        state.touched.entry(tid).or_default().insert(pid);
        trace!("{} loaded page {} ({:?})", tid, pid, perm);
        Ok(page)
    }

    /// Adds `tuple` to table `table_id` on behalf of `tid`.
    ///
    /// On success the tuple carries its new record id and every page modified
    /// is dirty, resident, and recorded as touched by `tid`.
    pub fn insert_tuple(
        &self,
        tid: TransactionId,
        table_id: TableId,
        tuple: &mut Tuple,
    ) -> StorageResult<()> {
        let file = self.inner.catalog.heap_file(table_id)?;
        let pages = file.insert_tuple(self, tid, tuple)?;
        self.adopt_dirty_pages(tid, &pages)
    }

    /// Removes `tuple` from the table its record id points into.
    pub fn delete_tuple(&self, tid: TransactionId, tuple: &Tuple) -> StorageResult<()> {
        let record_id = tuple
            .record_id()
            .ok_or_else(|| StorageError::invalid("Tuple has no record id"))?;
        let file = self.inner.catalog.heap_file(record_id.page_id.table_id)?;
        let page = file.delete_tuple(self, tid, tuple)?;
        self.adopt_dirty_pages(tid, &[page])
    }

    /// Writes page `pid` back to its table file if it is dirty.
    pub fn flush_page(&self, pid: PageId) -> StorageResult<()> {
        let page = self
            .inner
            .state
            .lock()
            .pages
            .peek(&pid)
            .cloned()
            .ok_or(StorageError::PageNotResident(pid))?;
        self.write_back(&page)
    }

    /// Writes every dirty resident page back to disk.
    ///
    /// This bypasses no-steal and is meant for shutdown and tests.
    pub fn flush_all_pages(&self) -> StorageResult<()> {
        let pages: Vec<PageRef> = {
            let state = self.inner.state.lock();
            state.pages.iter().map(|(_, page)| Arc::clone(page)).collect()
        };
        for page in &pages {
            self.write_back(page)?;
        }
        Ok(())
    }

    /// Writes back the pages `tid` touched and holds Exclusive on.
    ///
    /// Fails with `PageNotResident` if a page `tid` modified is no longer
    /// cached, since its changes can no longer reach disk.
    pub fn flush_pages(&self, tid: TransactionId) -> StorageResult<()> {
        let pages: Vec<PageRef> = {
            let state = self.inner.state.lock();
            let Some(touched) = state.touched.get(&tid) else {
                return Ok(());
            };
            let dirtied = state.dirtied.get(&tid);

            let mut pages = Vec::new();
            for pid in touched {
                if !self.inner.lock_manager.holds_write_lock(tid, *pid) {
                    continue;
                }
                match state.pages.peek(pid) {
                    Some(page) => pages.push(Arc::clone(page)),
                    None if dirtied.is_some_and(|d| d.contains(pid)) => {
                        return Err(StorageError::PageNotResident(*pid));
                    }
                    None => {}
                }
            }
            pages
        };
        for page in &pages {
            self.write_back(page)?;
        }
        Ok(())
    }

    /// Drops page `pid` from the cache without writing it back.
    pub fn discard_page(&self, pid: PageId) {
        if self.inner.state.lock().pages.remove(&pid).is_some() {
            trace!("Discarded page {}", pid);
        }
    }

    /// Ends `tid`: on commit flushes its Exclusive pages, on abort discards
    /// every touched page it still holds a lock on. Its locks are released
    /// only after that step.
    ///
    /// A failed commit flush leaves the locks and touched set in place so the
    /// caller can still abort.
    pub fn complete_transaction(&self, tid: TransactionId, commit: bool) -> StorageResult<()> {
        if commit {
            self.flush_pages(tid)?;
        }

        let touched = {
            let mut state = self.inner.state.lock();
            state.dirtied.remove(&tid);
            state.touched.remove(&tid)
        };
        if !commit {
            for pid in touched.iter().flatten() {
                if self.inner.lock_manager.holds_lock(tid, *pid) {
                    self.discard_page(*pid);
                }
            }
        }

        let released = self.inner.lock_manager.release_all(tid);
        debug!(
            "{} {} ({} pages touched, {} locks released)",
            tid,
            if commit { "committed" } else { "aborted" },
            touched.map_or(0, |pages| pages.len()),
            released
        );
        Ok(())
    }

    /// Commits `tid`.
    pub fn transaction_complete(&self, tid: TransactionId) -> StorageResult<()> {
        self.complete_transaction(tid, true)
    }

    /// Releases `tid`'s lock on `pid` before completion. This breaks two-phase
    /// locking and is only safe for pages the transaction never modified.
    ///
    /// The page leaves `tid`'s touched set, so completing `tid` never flushes
    /// or discards a page another transaction may have locked since.
    pub fn release_page(&self, tid: TransactionId, pid: PageId) {
        {
            let mut state = self.inner.state.lock();
            if let Some(touched) = state.touched.get_mut(&tid) {
                touched.remove(&pid);
            }
            if let Some(dirtied) = state.dirtied.get_mut(&tid) {
                dirtied.remove(&pid);
            }
        }
        self.inner.lock_manager.release(tid, pid);
    }

    pub fn holds_lock(&self, tid: TransactionId, pid: PageId) -> bool {
        self.inner.lock_manager.holds_lock(tid, pid)
    }

    /// Marks pages modified through the heap file as dirtied by `tid`, and
    /// re-registers any that were evicted before their latch was taken.
    ///
    /// The page is recorded as modified before re-registration, so if that
    /// fails the transaction can no longer commit and must abort.
    fn adopt_dirty_pages(&self, tid: TransactionId, pages: &[PageRef]) -> StorageResult<()> {
        for page in pages {
            let pid = {
                let mut heap_page = page.write();
                heap_page.mark_dirty(Some(tid));
                heap_page.id()
            };

            let mut state = self.inner.state.lock();
            state.touched.entry(tid).or_default().insert(pid);
            state.dirtied.entry(tid).or_default().insert(pid);
            if !state.pages.contains_key(&pid) {
                if state.pages.len() >= self.inner.capacity {
                    self.evict_page(&mut state)?;
                }
                state.pages.insert(pid, Arc::clone(page));
                debug!("{} re-registered evicted page {}", tid, pid);
            }
        }
        Ok(())
    }

    /// Evicts the least recently used clean page. Dirty pages are never
    /// written back here.
    ///
    /// A clean page that is write-latched may be about to become dirty, so it
    /// is skipped on the first pass. If nothing else qualifies, a second pass
    /// waits up to `EVICTION_LATCH_WAIT` per latched page before reporting
    /// `CacheExhausted`.
    fn evict_page(&self, state: &mut CacheState) -> StorageResult<()> {
        let victim = state
            .pages
            .pop_lru_where(|_, page| page.try_read().is_some_and(|p| !p.is_dirty()))
            .or_else(|| {
                state.pages.pop_lru_where(|_, page| {
                    page.try_read_for(EVICTION_LATCH_WAIT)
                        .is_some_and(|p| !p.is_dirty())
                })
            });

        match victim {
            Some((pid, _)) => {
                debug!("Evicted page {}", pid);
                Ok(())
            }
            None => {
                warn!(
                    "No evictable page: all {} resident pages are dirty or latched",
                    state.pages.len()
                );
                Err(StorageError::CacheExhausted {
                    capacity: self.inner.capacity,
                })
            }
        }
    }

    fn write_back(&self, page: &PageRef) -> StorageResult<()> {
        let mut heap_page = page.write();
        if !heap_page.is_dirty() {
            return Ok(());
        }
        let file = self.inner.catalog.heap_file(heap_page.id().table_id)?;
        file.write_page(&mut heap_page)?;
        trace!("Flushed page {}", heap_page.id());
        Ok(())
    }
}
