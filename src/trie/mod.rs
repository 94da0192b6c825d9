//! Compact sparse merkle tree
//!
//! A binary merkle tree over the full 256-bit key space where:
//! - Empty subtrees are never stored; their hashes come from a fixed table
//! - A subtree holding a single key is stored as one compact leaf
//! - Shape depends only on the set of non-zero keys, never on write order
//!
//! The root sits at level 255. A node at level `l` sends key `k` right iff
//! bit `l` of `k` is set.

mod node;
mod ops;
mod subtree;
mod transaction;
mod tree;
mod witness;

pub use node::Node;
pub use subtree::{
    calculate_subtree_hash_with_one_leaf, empty_root, empty_tree, EMPTY_TREES, ROOT_LEVEL,
    TREE_LEVELS,
};
pub use transaction::TreeTransaction;
pub use tree::{PruneStats, Tree, TreeStats};
pub use witness::{
    apply_witness, calculate_root, check_witness, UpdateWitness, VerificationWitness,
};
