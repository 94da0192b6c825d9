//! In-memory write-back overlay over another tree store

use super::overlay::{Layered, StagedTransaction, WriteSet};
use super::{TreeDb, TreeRead, TreeWrite};
use crate::model::Hash;
use crate::{Error, Result};
use parking_lot::{Mutex, RwLock};
use tracing::debug;

/// Buffers node and root writes in memory on top of an underlying store.
///
/// Reads see the buffered writes first and fall back to the underlying
/// store. Nothing reaches the underlying store until [`flush`], so any
/// number of caches can speculate on the same store without seeing each
/// other.
///
/// [`flush`]: TreeMemoryCache::flush
#[derive(Debug)]
pub struct TreeMemoryCache<D> {
    underlying: D,
    /// Writes committed to this cache but not yet flushed
    state: RwLock<WriteSet>,
    /// Serializes write transactions and flushes on this cache
    writer: Mutex<()>,
}

impl<D: TreeDb> TreeMemoryCache<D> {
    /// Wrap `underlying`; nothing is read eagerly
    pub fn new(underlying: D) -> Self {
        TreeMemoryCache {
            underlying,
            state: RwLock::new(WriteSet::default()),
            writer: Mutex::new(()),
        }
    }

    /// The wrapped store
    pub fn underlying(&self) -> &D {
        &self.underlying
    }

    /// Whether there are writes waiting for a flush
    pub fn is_dirty(&self) -> bool {
        !self.state.read().is_empty()
    }

    /// Drop all buffered writes
    pub fn discard(&self) {
        let _writer = self.writer.lock();
        *self.state.write() = WriteSet::default();
    }

    /// Write buffered state into the underlying store as one transaction.
    ///
    /// Only buffered nodes reachable from the cache root are written; nodes
    /// superseded by later writes to this cache are dropped here. On error
    /// the underlying store is unchanged and the buffer is kept.
    pub fn flush(&self) -> Result<()> {
        let _writer = self.writer.lock();
        let mut state = self.state.write();
        if state.is_empty() {
            return Ok(());
        }

        let written = self.underlying.update(|tx| {
            for hash in &state.deleted {
                tx.delete_node(hash)?;
            }

            let mut written = 0usize;
            if let Some(root) = state.root {
                let mut stack = vec![root];
                while let Some(hash) = stack.pop() {
                    // Anything not buffered is already in the underlying store,
                    // and so is everything below it.
                    if let Some(node) = state.nodes.get(&hash) {
                        stack.extend(node.children());
                        tx.put_node(node.clone())?;
                        written += 1;
                    }
                }
                tx.set_root(root)?;
            }
            Ok::<_, Error>(written)
        })?;

        debug!(
            written,
            buffered = state.nodes.len(),
            deleted = state.deleted.len(),
            root = ?state.root,
            "Flushed tree cache"
        );

        *state = WriteSet::default();
        Ok(())
    }
}

impl<D: TreeDb> TreeDb for TreeMemoryCache<D> {
    fn view<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        E: From<Error>,
        F: FnOnce(&dyn TreeRead) -> std::result::Result<T, E>,
    {
        let state = self.state.read();
        self.underlying
            .view(|base| f(&Layered::new(&state, base)))
    }

    fn update<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        E: From<Error>,
        F: FnOnce(&mut dyn TreeWrite) -> std::result::Result<T, E>,
    {
        let _writer = self.writer.lock();

        let (out, writes) = self.underlying.view(|base| {
            let state = self.state.read();
            let layered = Layered::new(&state, base);
            let mut tx = StagedTransaction::new(&layered);
            let out = f(&mut tx)?;
            Ok::<_, E>((out, tx.into_writes()))
        })?;

        if !writes.is_empty() {
            self.state.write().merge(writes);
        }
        Ok(out)
    }
}
