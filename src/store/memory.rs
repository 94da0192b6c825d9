//! In-memory tree store

use super::overlay::{StagedTransaction, WriteSet};
use super::{TreeDb, TreeRead, TreeWrite};
use crate::model::Hash;
use crate::trie::{empty_root, Node};
use crate::{Error, Result};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;

/// Committed state of a [`MemoryTreeDb`]
#[derive(Debug)]
struct MemoryState {
    nodes: HashMap<Hash, Node>,
    root: Hash,
}

impl MemoryState {
    fn apply(&mut self, writes: WriteSet) {
        for hash in &writes.deleted {
            self.nodes.remove(hash);
        }
        self.nodes.extend(writes.nodes);
        if let Some(root) = writes.root {
            self.root = root;
        }
    }
}

impl TreeRead for MemoryState {
    fn get_node(&self, hash: &Hash) -> Result<Node> {
        self.nodes
            .get(hash)
            .cloned()
            .ok_or(Error::NotFound(*hash))
    }

    fn root(&self) -> Result<Hash> {
        Ok(self.root)
    }

    fn node_hashes(&self) -> Result<Vec<Hash>> {
        Ok(self.nodes.keys().copied().collect())
    }
}

/// A tree store kept entirely in hash maps
///
/// Write transactions are serialized by a writer lock and staged in memory;
/// the state lock is held exclusively only while a finished write set is
/// applied, so views never observe a partial commit.
#[derive(Debug)]
pub struct MemoryTreeDb {
    state: RwLock<MemoryState>,
    writer: Mutex<()>,
}

impl MemoryTreeDb {
    /// Create an empty store
    pub fn new() -> Self {
        MemoryTreeDb {
            state: RwLock::new(MemoryState {
                nodes: HashMap::new(),
                root: empty_root(),
            }),
            writer: Mutex::new(()),
        }
    }

    /// Hashes of every stored node
    pub fn nodes(&self) -> Vec<Hash> {
        self.state.read().nodes.keys().copied().collect()
    }

    /// Number of stored nodes
    pub fn node_count(&self) -> usize {
        self.state.read().nodes.len()
    }
}

impl Default for MemoryTreeDb {
    fn default() -> Self {
        Self::new()
    }
}

impl TreeDb for MemoryTreeDb {
    fn view<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        E: From<Error>,
        F: FnOnce(&dyn TreeRead) -> std::result::Result<T, E>,
    {
        let state = self.state.read();
        f(&*state)
    }

    fn update<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        E: From<Error>,
        F: FnOnce(&mut dyn TreeWrite) -> std::result::Result<T, E>,
    {
        let _writer = self.writer.lock();

        let (out, writes) = {
            let state = self.state.read();
            let mut tx = StagedTransaction::new(&*state);
            let out = f(&mut tx)?;
            (out, tx.into_writes())
        };

        if !writes.is_empty() {
            self.state.write().apply(writes);
        }
        Ok(out)
    }
}
