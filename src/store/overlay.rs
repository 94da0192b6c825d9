//! Staged writes layered over a read view

use super::{TreeRead, TreeWrite};
use crate::model::Hash;
use crate::trie::Node;
use crate::{Error, Result};
use std::collections::{HashMap, HashSet};

/// Pending node and root writes.
///
/// `nodes` and `deleted` never share a hash.
#[derive(Debug, Default)]
pub(crate) struct WriteSet {
    pub(crate) nodes: HashMap<Hash, Node>,
    pub(crate) deleted: HashSet<Hash>,
    pub(crate) root: Option<Hash>,
}

impl WriteSet {
    pub(crate) fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.deleted.is_empty() && self.root.is_none()
    }

    /// Fold a later write set on top of this one
    pub(crate) fn merge(&mut self, later: WriteSet) {
        for hash in later.deleted {
            self.nodes.remove(&hash);
            self.deleted.insert(hash);
        }
        for (hash, node) in later.nodes {
            self.deleted.remove(&hash);
            self.nodes.insert(hash, node);
        }
        if later.root.is_some() {
            self.root = later.root;
        }
    }

    fn read_node(&self, base: &dyn TreeRead, hash: &Hash) -> Result<Node> {
        if let Some(node) = self.nodes.get(hash) {
            return Ok(node.clone());
        }
        if self.deleted.contains(hash) {
            return Err(Error::NotFound(*hash));
        }
        base.get_node(hash)
    }

    fn read_root(&self, base: &dyn TreeRead) -> Result<Hash> {
        match self.root {
            Some(root) => Ok(root),
            None => base.root(),
        }
    }

    fn read_node_hashes(&self, base: &dyn TreeRead) -> Result<Vec<Hash>> {
        let mut hashes: Vec<Hash> = base
            .node_hashes()?
            .into_iter()
            .filter(|h| !self.deleted.contains(h) && !self.nodes.contains_key(h))
            .collect();
        hashes.extend(self.nodes.keys().copied());
        Ok(hashes)
    }
}

/// A committed write set seen through its base (a cache over its store)
pub(crate) struct Layered<'a> {
    writes: &'a WriteSet,
    base: &'a dyn TreeRead,
}

impl<'a> Layered<'a> {
    pub(crate) fn new(writes: &'a WriteSet, base: &'a dyn TreeRead) -> Self {
        Layered { writes, base }
    }
}

impl TreeRead for Layered<'_> {
    fn get_node(&self, hash: &Hash) -> Result<Node> {
        self.writes.read_node(self.base, hash)
    }

    fn root(&self) -> Result<Hash> {
        self.writes.read_root(self.base)
    }

    fn node_hashes(&self) -> Result<Vec<Hash>> {
        self.writes.read_node_hashes(self.base)
    }
}

/// A write transaction that collects its writes instead of applying them
pub(crate) struct StagedTransaction<'a> {
    base: &'a dyn TreeRead,
    writes: WriteSet,
}

impl<'a> StagedTransaction<'a> {
    pub(crate) fn new(base: &'a dyn TreeRead) -> Self {
        StagedTransaction {
            base,
            writes: WriteSet::default(),
        }
    }

    pub(crate) fn into_writes(self) -> WriteSet {
        self.writes
    }
}

impl TreeRead for StagedTransaction<'_> {
    fn get_node(&self, hash: &Hash) -> Result<Node> {
        self.writes.read_node(self.base, hash)
    }

    fn root(&self) -> Result<Hash> {
        self.writes.read_root(self.base)
    }

    fn node_hashes(&self) -> Result<Vec<Hash>> {
        self.writes.read_node_hashes(self.base)
    }
}

impl TreeWrite for StagedTransaction<'_> {
    fn put_node(&mut self, node: Node) -> Result<()> {
        let hash = node.hash();
        self.writes.deleted.remove(&hash);
        self.writes.nodes.insert(hash, node);
        Ok(())
    }

    fn delete_node(&mut self, hash: &Hash) -> Result<()> {
        self.writes.nodes.remove(hash);
        self.writes.deleted.insert(*hash);
        Ok(())
    }

    fn discard_node(&mut self, hash: &Hash) -> Result<()> {
        self.writes.nodes.remove(hash);
        Ok(())
    }

    fn set_root(&mut self, root: Hash) -> Result<()> {
        self.writes.root = Some(root);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryTreeDb;
    use crate::store::TreeDb;

    fn leaf(tag: &str) -> Node {
        Node::leaf(3, Hash::digest(tag.as_bytes()), Hash::digest(b"value"))
    }

    #[test]
    fn test_staged_reads_see_own_writes() {
        let db = MemoryTreeDb::new();
        let stored = leaf("stored");
        db.update(|tx| tx.put_node(stored.clone())).unwrap();

        db.view(|base| {
            let mut tx = StagedTransaction::new(base);
            let fresh = leaf("fresh");
            tx.put_node(fresh.clone())?;
            assert_eq!(tx.get_node(&fresh.hash())?, fresh);
            assert_eq!(tx.get_node(&stored.hash())?, stored);

            tx.delete_node(&stored.hash())?;
            assert!(matches!(
                tx.get_node(&stored.hash()),
                Err(Error::NotFound(_))
            ));

            let hashes = tx.node_hashes()?;
            assert_eq!(hashes, vec![fresh.hash()]);
            Ok::<_, Error>(())
        })
        .unwrap();
    }

    #[test]
    fn test_discard_only_forgets_staged_nodes() {
        let db = MemoryTreeDb::new();
        let stored = leaf("stored");
        db.update(|tx| tx.put_node(stored.clone())).unwrap();

        db.view(|base| {
            let mut tx = StagedTransaction::new(base);
            let fresh = leaf("fresh");
            tx.put_node(fresh.clone())?;
            tx.discard_node(&fresh.hash())?;
            tx.discard_node(&stored.hash())?;

            assert!(tx.get_node(&fresh.hash()).is_err());
            assert_eq!(tx.get_node(&stored.hash())?, stored);
            assert!(tx.into_writes().is_empty());
            Ok::<_, Error>(())
        })
        .unwrap();
    }

    #[test]
    fn test_merge_later_writes_win() {
        let a = leaf("a");
        let b = leaf("b");

        let mut first = WriteSet::default();
        first.nodes.insert(a.hash(), a.clone());
        first.deleted.insert(b.hash());
        first.root = Some(a.hash());

        let mut second = WriteSet::default();
        second.nodes.insert(b.hash(), b.clone());
        second.deleted.insert(a.hash());

        first.merge(second);
        assert!(first.nodes.contains_key(&b.hash()));
        assert!(!first.nodes.contains_key(&a.hash()));
        assert!(first.deleted.contains(&a.hash()));
        assert!(!first.deleted.contains(&b.hash()));
        assert_eq!(first.root, Some(a.hash()));
    }
}
