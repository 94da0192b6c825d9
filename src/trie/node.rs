//! Trie node types

use super::subtree::{calculate_subtree_hash_with_one_leaf, empty_tree};
use crate::model::Hash;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// A node in the compact sparse merkle tree
///
/// Nodes are content-addressed and never mutated. An absent child is the
/// empty subtree of the child level; it is not stored.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Node {
    /// An inner vertex with at least one non-empty child
    Branch {
        /// `combine(left, right)`, absent sides filled from the empty table
        hash: Hash,
        left: Option<Hash>,
        right: Option<Hash>,
    },
    /// A subtree holding exactly one key, at whatever level it sits
    Leaf {
        /// One-leaf subtree hash of `(key, value)` at the node's level
        hash: Hash,
        key: Hash,
        value: Hash,
    },
}

impl Node {
    /// Create a branch at `level` (which must be above 0)
    pub fn branch(level: u8, left: Option<Hash>, right: Option<Hash>) -> Self {
        debug_assert!(level > 0, "branches cannot live at the leaf level");
        let empty = empty_tree(level.saturating_sub(1));
        let hash = Hash::combine(&left.unwrap_or(empty), &right.unwrap_or(empty));
        Node::Branch { hash, left, right }
    }

    /// Create a compact leaf for `(key, value)` at `level`
    pub fn leaf(level: u8, key: Hash, value: Hash) -> Self {
        Node::Leaf {
            hash: calculate_subtree_hash_with_one_leaf(&key, &value, level),
            key,
            value,
        }
    }

    /// The node's own hash
    pub fn hash(&self) -> Hash {
        match self {
            Node::Branch { hash, .. } | Node::Leaf { hash, .. } => *hash,
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, Node::Leaf { .. })
    }

    pub fn left(&self) -> Option<Hash> {
        match self {
            Node::Branch { left, .. } => *left,
            Node::Leaf { .. } => None,
        }
    }

    pub fn right(&self) -> Option<Hash> {
        match self {
            Node::Branch { right, .. } => *right,
            Node::Leaf { .. } => None,
        }
    }

    /// Child hashes that are actually stored
    pub fn children(&self) -> impl Iterator<Item = Hash> {
        self.left().into_iter().chain(self.right())
    }

    /// Encode for storage
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Decode from storage, checking the node is the one that was asked for
    pub fn from_bytes(data: &[u8], expected: &Hash) -> Result<Self> {
        let node: Node = bincode::deserialize(data)?;
        if node.hash() != *expected {
            return Err(Error::Corruption(format!(
                "Stored node {} decodes to {}",
                expected,
                node.hash()
            )));
        }
        Ok(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trie::subtree::EMPTY_TREES;

    #[test]
    fn test_branch_hash_fills_empty_side() {
        let left = Hash::digest(b"left");
        let node = Node::branch(3, Some(left), None);
        assert_eq!(node.hash(), Hash::combine(&left, &EMPTY_TREES[2]));
        assert_eq!(node.children().collect::<Vec<_>>(), vec![left]);
    }

    #[test]
    fn test_node_hash_deterministic() {
        let n1 = Node::leaf(10, Hash::digest(b"key"), Hash::digest(b"value"));
        let n2 = Node::leaf(10, Hash::digest(b"key"), Hash::digest(b"value"));
        assert_eq!(n1.hash(), n2.hash());
        assert!(n1.is_leaf());
    }

    #[test]
    fn test_leaf_hash_depends_on_level() {
        let n1 = Node::leaf(10, Hash::digest(b"key"), Hash::digest(b"value"));
        let n2 = Node::leaf(11, Hash::digest(b"key"), Hash::digest(b"value"));
        assert_ne!(n1.hash(), n2.hash());
    }

    #[test]
    fn test_decode_rejects_wrong_hash() {
        let node = Node::leaf(4, Hash::digest(b"k"), Hash::digest(b"v"));
        let bytes = node.to_bytes().unwrap();

        assert_eq!(Node::from_bytes(&bytes, &node.hash()).unwrap(), node);
        assert!(matches!(
            Node::from_bytes(&bytes, &Hash::digest(b"other")),
            Err(Error::Corruption(_))
        ));
        assert!(matches!(
            Node::from_bytes(&bytes[..3], &node.hash()),
            Err(Error::Serialization(_))
        ));
    }
}
