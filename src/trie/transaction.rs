//! Key/value access to the tree inside a store transaction

use super::ops;
use super::witness::{UpdateWitness, VerificationWitness};
use crate::model::Hash;
use crate::store::{TreeRead, TreeWrite};
use crate::trie::Node;
use crate::{Error, Result};

/// The store access a [`TreeTransaction`] was opened with
enum Access<'a> {
    Read(&'a dyn TreeRead),
    Write(&'a mut dyn TreeWrite),
}

impl TreeRead for Access<'_> {
    fn get_node(&self, hash: &Hash) -> Result<Node> {
        match self {
            Access::Read(tx) => tx.get_node(hash),
            Access::Write(tx) => tx.get_node(hash),
        }
    }

    fn root(&self) -> Result<Hash> {
        match self {
            Access::Read(tx) => tx.root(),
            Access::Write(tx) => tx.root(),
        }
    }

    fn node_hashes(&self) -> Result<Vec<Hash>> {
        match self {
            Access::Read(tx) => tx.node_hashes(),
            Access::Write(tx) => tx.node_hashes(),
        }
    }
}

/// A view of the tree within one [`Tree::view`] or [`Tree::update`] call.
///
/// Reads see every write made earlier in the same transaction. Transactions
/// opened by `view` reject writes with [`Error::ReadOnly`].
///
/// [`Tree::view`]: super::Tree::view
/// [`Tree::update`]: super::Tree::update
pub struct TreeTransaction<'a> {
    access: Access<'a>,
}

impl<'a> TreeTransaction<'a> {
    pub(crate) fn read_only(tx: &'a dyn TreeRead) -> Self {
        TreeTransaction {
            access: Access::Read(tx),
        }
    }

    pub(crate) fn writable(tx: &'a mut dyn TreeWrite) -> Self {
        TreeTransaction {
            access: Access::Write(tx),
        }
    }

    pub fn is_read_only(&self) -> bool {
        matches!(self.access, Access::Read(_))
    }

    fn writer(&mut self) -> Result<&mut dyn TreeWrite> {
        match &mut self.access {
            Access::Write(tx) => Ok(&mut **tx),
            Access::Read(_) => Err(Error::ReadOnly),
        }
    }

    /// Current root, including writes made in this transaction
    pub fn hash(&self) -> Result<Hash> {
        self.access.root()
    }

    /// Value at `key`, `None` if absent
    pub fn get(&self, key: &Hash) -> Result<Option<Hash>> {
        ops::get(&self.access, key)
    }

    /// Set `key` to `value`. A zero value removes the key.
    pub fn set(&mut self, key: &Hash, value: &Hash) -> Result<()> {
        ops::set(self.writer()?, key, value)?;
        Ok(())
    }

    /// Remove `key`; removing an absent key changes nothing
    pub fn delete(&mut self, key: &Hash) -> Result<()> {
        self.set(key, &Hash::ZERO)
    }

    /// Proof of the value at `key` against [`hash`](Self::hash)
    pub fn prove(&self, key: &Hash) -> Result<VerificationWitness> {
        ops::prove(&self.access, key)
    }

    /// Witness for writing `value` at `key`, without writing it
    pub fn generate_update_witness(&self, key: &Hash, value: &Hash) -> Result<UpdateWitness> {
        Ok(UpdateWitness::from_proof(self.prove(key)?, *value))
    }

    /// Write `value` at `key` and return the witness for the write
    pub fn set_with_witness(&mut self, key: &Hash, value: &Hash) -> Result<UpdateWitness> {
        let witness = self.generate_update_witness(key, value)?;
        self.set(key, value)?;
        Ok(witness)
    }
}
