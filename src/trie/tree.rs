//! The tree façade over a [`TreeDb`]

use super::ops;
use super::transaction::TreeTransaction;
use crate::model::Hash;
use crate::store::TreeDb;
use crate::{Error, Result};
use std::collections::HashSet;
use tracing::debug;

/// Outcome of [`Tree::prune`]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PruneStats {
    /// Nodes reachable from the root
    pub live: usize,
    /// Unreachable nodes deleted
    pub removed: usize,
}

/// Shape of the tree reachable from the current root
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TreeStats {
    pub leaves: usize,
    pub branches: usize,
    /// Longest root-to-leaf path in nodes, 0 for a single leaf or an empty tree
    pub max_depth: usize,
}

/// A compact sparse merkle tree stored in `D`
///
/// ```ignore
/// use csmt::{Hash, MemoryTreeDb, Tree};
///
/// let tree = Tree::new(MemoryTreeDb::new());
/// tree.update(|tx| tx.set(&Hash::digest(b"key"), &Hash::digest(b"value")))?;
/// let root = tree.hash()?;
/// ```
#[derive(Debug)]
pub struct Tree<D> {
    db: D,
}

impl<D: TreeDb> Tree<D> {
    pub fn new(db: D) -> Self {
        Tree { db }
    }

    /// The backing store
    pub fn db(&self) -> &D {
        &self.db
    }

    pub fn into_inner(self) -> D {
        self.db
    }

    /// Run `f` in a write transaction, committed iff it returns `Ok`
    pub fn update<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        E: From<Error>,
        F: FnOnce(&mut TreeTransaction<'_>) -> std::result::Result<T, E>,
    {
        self.db
            .update(|tx| f(&mut TreeTransaction::writable(tx)))
    }

    /// Run `f` against a read-only snapshot; writes fail with [`Error::ReadOnly`]
    pub fn view<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        E: From<Error>,
        F: FnOnce(&mut TreeTransaction<'_>) -> std::result::Result<T, E>,
    {
        self.db
            .view(|tx| f(&mut TreeTransaction::read_only(tx)))
    }

    /// Current root hash
    pub fn hash(&self) -> Result<Hash> {
        self.db.root()
    }

    /// Value at `key` in the committed tree
    pub fn get(&self, key: &Hash) -> Result<Option<Hash>> {
        self.view(|tx| tx.get(key))
    }

    /// Delete every stored node not reachable from the root.
    ///
    /// Nodes superseded by earlier commits stay in the store until this runs.
    /// Do not prune a store while a [`TreeMemoryCache`] over it holds
    /// unflushed writes; those writes may still point at old nodes.
    ///
    /// [`TreeMemoryCache`]: crate::store::TreeMemoryCache
    pub fn prune(&self) -> Result<PruneStats> {
        let stats = self.db.update(|tx| {
            let live = ops::reachable(&*tx)?;
            let mut removed = 0;
            for hash in tx.node_hashes()? {
                if !live.contains(&hash) {
                    tx.delete_node(&hash)?;
                    removed += 1;
                }
            }
            Ok::<_, Error>(PruneStats {
                live: live.len(),
                removed,
            })
        })?;

        debug!(live = stats.live, removed = stats.removed, "Pruned tree");
        Ok(stats)
    }

    /// Count the nodes reachable from the root
    pub fn stats(&self) -> Result<TreeStats> {
        self.db.view(|tx| {
            let mut stats = TreeStats::default();
            ops::walk(tx, |visit| {
                if visit.node.is_leaf() {
                    stats.leaves += 1;
                } else {
                    stats.branches += 1;
                }
                stats.max_depth = stats.max_depth.max(visit.depth);
            })?;
            Ok(stats)
        })
    }

    /// Hashes of all nodes reachable from the root
    pub fn reachable_nodes(&self) -> Result<HashSet<Hash>> {
        self.db.view(|tx| ops::reachable(tx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryTreeDb, TreeMemoryCache};
    use crate::trie::{apply_witness, check_witness, empty_root, UpdateWitness};

    fn ch(s: &str) -> Hash {
        Hash::digest(s.as_bytes())
    }

    fn key(i: usize) -> Hash {
        ch(&format!("key{}", i))
    }

    #[test]
    fn test_empty_tree() {
        let tree = Tree::new(MemoryTreeDb::new());
        assert_eq!(tree.hash().unwrap(), empty_root());
        assert_eq!(tree.get(&ch("anything")).unwrap(), None);
        assert_eq!(tree.stats().unwrap(), TreeStats::default());
    }

    #[test]
    fn test_random_set() {
        let tree = Tree::new(MemoryTreeDb::new());
        let val = ch("testval");

        tree.update(|tx| {
            for i in 0..500 {
                tx.set(&key(i), &val)?;
            }
            Ok::<_, Error>(())
        })
        .unwrap();

        tree.view(|tx| {
            for i in 0..500 {
                assert_eq!(tx.get(&key(i))?, Some(val));
            }
            Ok::<_, Error>(())
        })
        .unwrap();

        let stats = tree.stats().unwrap();
        assert_eq!(stats.leaves, 500);
        // Shared prefixes keep single-child branches, so at least n - 1
        assert!(stats.branches >= 499);
        assert!(stats.max_depth < 256);
    }

    #[test]
    fn test_set_zero() {
        let tree = Tree::new(MemoryTreeDb::new());
        tree.update(|tx| {
            for i in 0..100 {
                tx.set(&key(i), &Hash::ZERO)?;
            }
            Ok::<_, Error>(())
        })
        .unwrap();

        assert_eq!(tree.hash().unwrap(), empty_root());
        assert_eq!(tree.db().node_count(), 0);
    }

    #[test]
    fn test_delete_everything_restores_empty_root() {
        let tree = Tree::new(MemoryTreeDb::new());
        tree.update(|tx| {
            for i in 0..100 {
                tx.set(&key(i), &ch(&format!("val{}", i)))?;
            }
            Ok::<_, Error>(())
        })
        .unwrap();
        tree.update(|tx| {
            for i in 0..100 {
                tx.delete(&key(i))?;
            }
            Ok::<_, Error>(())
        })
        .unwrap();

        assert_eq!(tree.hash().unwrap(), empty_root());
        assert!(tree.reachable_nodes().unwrap().is_empty());

        let pruned = tree.prune().unwrap();
        assert_eq!(pruned.live, 0);
        assert!(pruned.removed > 0);
        assert_eq!(tree.db().node_count(), 0);
    }

    #[test]
    fn test_update_rolls_back_on_error() {
        let tree = Tree::new(MemoryTreeDb::new());
        let result: Result<()> = tree.update(|tx| {
            tx.set(&ch("k"), &ch("v"))?;
            Err(Error::Config("abandon".into()))
        });

        assert!(result.is_err());
        assert_eq!(tree.hash().unwrap(), empty_root());
        assert_eq!(tree.db().node_count(), 0);
    }

    #[test]
    fn test_view_is_read_only() {
        let tree = Tree::new(MemoryTreeDb::new());
        let err = tree.view(|tx| tx.set(&ch("k"), &ch("v"))).unwrap_err();
        assert!(matches!(err, Error::ReadOnly));
    }

    #[test]
    fn test_order_independent_root() {
        let forward = Tree::new(MemoryTreeDb::new());
        let backward = Tree::new(MemoryTreeDb::new());

        forward
            .update(|tx| {
                for i in 0..64 {
                    tx.set(&key(i), &ch(&format!("val{}", i)))?;
                }
                Ok::<_, Error>(())
            })
            .unwrap();
        backward
            .update(|tx| {
                for i in (0..64).rev() {
                    tx.set(&key(i), &ch(&format!("val{}", i)))?;
                }
                Ok::<_, Error>(())
            })
            .unwrap();

        assert_eq!(forward.hash().unwrap(), backward.hash().unwrap());
    }

    #[test]
    fn test_repeated_set_is_idempotent() {
        let tree = Tree::new(MemoryTreeDb::new());
        tree.update(|tx| tx.set(&ch("k"), &ch("v"))).unwrap();
        let root = tree.hash().unwrap();
        let nodes = tree.db().node_count();

        tree.update(|tx| tx.set(&ch("k"), &ch("v"))).unwrap();
        assert_eq!(tree.hash().unwrap(), root);
        assert_eq!(tree.db().node_count(), nodes);
    }

    #[test]
    fn test_chained_updates() {
        let tree = Tree::new(MemoryTreeDb::new());
        let initial = tree.hash().unwrap();

        let witnesses: Vec<UpdateWitness> = tree
            .update(|tx| {
                let mut witnesses = Vec::new();
                let rounds = (0..1000)
                    .map(|i| (i, format!("val{}", i)))
                    .chain((0..500).map(|i| (i, format!("val1{}", i))));

                for (i, val) in rounds {
                    let before = tx.prove(&key(i))?;
                    assert!(check_witness(&before, &tx.hash()?));

                    witnesses.push(tx.set_with_witness(&key(i), &ch(&val))?);

                    let after = tx.prove(&key(i))?;
                    assert_eq!(after.value, ch(&val));
                    assert!(check_witness(&after, &tx.hash()?));
                }
                Ok::<_, Error>(witnesses)
            })
            .unwrap();

        let mut root = initial;
        for witness in &witnesses {
            root = apply_witness(witness, &root).unwrap();
        }
        assert_eq!(root, tree.hash().unwrap());
    }

    #[test]
    fn test_prune_keeps_live_set() {
        let tree = Tree::new(MemoryTreeDb::new());
        for round in 0..3 {
            tree.update(|tx| {
                for i in 0..50 {
                    tx.set(&key(i), &ch(&format!("val{}-{}", round, i)))?;
                }
                Ok::<_, Error>(())
            })
            .unwrap();
        }

        let root = tree.hash().unwrap();
        let live = tree.reachable_nodes().unwrap();
        assert!(tree.db().node_count() > live.len());

        let pruned = tree.prune().unwrap();
        assert_eq!(pruned.live, live.len());
        assert_eq!(tree.db().node_count(), live.len());
        assert_eq!(tree.hash().unwrap(), root);
        assert_eq!(tree.get(&key(7)).unwrap(), Some(ch("val2-7")));
    }

    #[test]
    fn test_cached_writes_are_isolated() {
        let under = MemoryTreeDb::new();
        let base = Tree::new(&under);
        base.update(|tx| tx.set(&ch("shared"), &ch("v0"))).unwrap();
        let base_root = base.hash().unwrap();

        let first = Tree::new(TreeMemoryCache::new(&under));
        let second = Tree::new(TreeMemoryCache::new(&under));
        first.update(|tx| tx.set(&ch("shared"), &ch("v1"))).unwrap();
        second.update(|tx| tx.set(&ch("other"), &ch("v2"))).unwrap();

        assert_eq!(base.hash().unwrap(), base_root);
        assert_eq!(second.get(&ch("shared")).unwrap(), Some(ch("v0")));
        assert_eq!(first.get(&ch("other")).unwrap(), None);

        let first_root = first.hash().unwrap();
        first.db().flush().unwrap();
        assert_eq!(base.hash().unwrap(), first_root);
        assert_eq!(base.get(&ch("shared")).unwrap(), Some(ch("v1")));
    }
}
