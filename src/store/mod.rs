//! Backing stores for tree nodes and roots
//!
//! A store owns the mapping `Hash -> Node` plus the current root and hands
//! out transactions through [`TreeDb::view`] and [`TreeDb::update`]. Writes
//! are staged in memory and applied only when the update closure succeeds,
//! so an error or early return leaves the store untouched.
//!
//! Implementations:
//! - [`MemoryTreeDb`]: hash maps, for tests and ephemeral execution
//! - [`FileTreeDb`]: a single-file append log with an in-memory index
//! - [`TreeMemoryCache`]: an overlay over any other store, applied by `flush`

mod cache;
mod file_store;
mod memory;
mod overlay;
mod record;

pub use cache::TreeMemoryCache;
pub use file_store::FileTreeDb;
pub use memory::MemoryTreeDb;

use crate::model::Hash;
use crate::trie::Node;
use crate::{Error, Result};
use std::sync::Arc;

/// Read access inside a store transaction
pub trait TreeRead {
    /// Fetch a node by hash. A missing node is [`Error::NotFound`].
    fn get_node(&self, hash: &Hash) -> Result<Node>;

    /// The root hash this transaction sees
    fn root(&self) -> Result<Hash>;

    /// Hashes of every stored node, reachable or not
    fn node_hashes(&self) -> Result<Vec<Hash>>;
}

/// Write access inside a store transaction
pub trait TreeWrite: TreeRead {
    fn put_node(&mut self, node: Node) -> Result<()>;

    /// Remove a node from the store once the transaction commits
    fn delete_node(&mut self, hash: &Hash) -> Result<()>;

    /// Forget a node written earlier in this same transaction.
    ///
    /// Nodes that were already in the store are left alone; other readers
    /// may still reach them until a prune.
    fn discard_node(&mut self, hash: &Hash) -> Result<()>;

    fn set_root(&mut self, root: Hash) -> Result<()>;
}

/// A transactional tree store
pub trait TreeDb: Send + Sync {
    /// Run `f` against a consistent read-only snapshot
    fn view<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        E: From<Error>,
        F: FnOnce(&dyn TreeRead) -> std::result::Result<T, E>;

    /// Run `f` in a write transaction, committing iff it returns `Ok`
    fn update<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        E: From<Error>,
        F: FnOnce(&mut dyn TreeWrite) -> std::result::Result<T, E>;

    /// Current root hash
    fn root(&self) -> Result<Hash> {
        self.view(|tx| tx.root())
    }
}

impl<D: TreeDb> TreeDb for &D {
    fn view<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        E: From<Error>,
        F: FnOnce(&dyn TreeRead) -> std::result::Result<T, E>,
    {
        (**self).view(f)
    }

    fn update<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        E: From<Error>,
        F: FnOnce(&mut dyn TreeWrite) -> std::result::Result<T, E>,
    {
        (**self).update(f)
    }
}

impl<D: TreeDb> TreeDb for Arc<D> {
    fn view<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        E: From<Error>,
        F: FnOnce(&dyn TreeRead) -> std::result::Result<T, E>,
    {
        (**self).view(f)
    }

    fn update<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        E: From<Error>,
        F: FnOnce(&mut dyn TreeWrite) -> std::result::Result<T, E>,
    {
        (**self).update(f)
    }
}
