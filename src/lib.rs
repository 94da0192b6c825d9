//! # csmt
//!
//! A compact sparse merkle tree with transactional stores, speculative
//! in-memory overlays and compact update witnesses.
//!
//! ## Core Concepts
//!
//! - **Tree**: a 256-level binary merkle tree committing a `Hash -> Hash`
//!   map to a single root hash
//! - **Stores**: where nodes live, in memory or in an append-only log file
//! - **Caches**: overlays that buffer writes on top of a store until flushed
//! - **Witnesses**: proofs that let anyone recompute a root without the tree
//!
//! ## Example
//!
//! ```ignore
//! use csmt::{apply_witness, Hash, MemoryTreeDb, Tree};
//!
//! let tree = Tree::new(MemoryTreeDb::new());
//! let before = tree.hash()?;
//! let witness = tree.update(|tx| {
//!     tx.set_with_witness(&Hash::digest(b"alice"), &Hash::digest(b"100"))
//! })?;
//! assert_eq!(apply_witness(&witness, &before)?, tree.hash()?);
//! ```

pub mod config;
pub mod model;
pub mod store;
pub mod trie;

mod error;

pub use config::StoreConfig;
pub use error::{Error, Result};
pub use model::Hash;
pub use store::{FileTreeDb, MemoryTreeDb, TreeDb, TreeMemoryCache, TreeRead, TreeWrite};
pub use trie::{
    apply_witness, calculate_root, calculate_subtree_hash_with_one_leaf, check_witness,
    empty_root, Node, PruneStats, Tree, TreeStats, TreeTransaction, UpdateWitness,
    VerificationWitness, EMPTY_TREES,
};

/// Log file format version
pub const VERSION: u32 = 1;

/// Magic bytes at the start of a log file
pub const MAGIC: &[u8; 8] = b"CSMT_LOG";
