//! Proofs and update witnesses
//!
//! A witness carries the sibling hashes along a key's path, top-down, with a
//! 256-bit field marking which levels have a real sibling. Levels whose bit
//! is clear use the empty subtree hash, so a witness for a sparse tree stays
//! small. Everything here is pure; no store access is needed to verify.

use super::subtree::{calculate_subtree_hash_with_one_leaf, empty_tree, ROOT_LEVEL};
use crate::model::Hash;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Proof that `key` holds `value` (zero for absent) under some root
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationWitness {
    pub key: Hash,
    pub value: Hash,
    /// Bit `l` set: the sibling at level `l - 1` is carried in `witnesses`
    pub witness_bitfield: Hash,
    /// Sibling hashes ordered from the root downward
    pub witnesses: Vec<Hash>,
    /// Level of the subtree that holds only `key` (or nothing)
    pub last_level: u8,
}

impl VerificationWitness {
    /// Root implied by this proof
    pub fn root(&self) -> Result<Hash> {
        calculate_root(
            &self.key,
            &self.value,
            &self.witness_bitfield,
            &self.witnesses,
            self.last_level,
        )
    }

    /// Whether this proof holds under `root`
    pub fn verify(&self, root: &Hash) -> bool {
        check_witness(self, root)
    }

    /// Whether this proves absence
    pub fn is_exclusion(&self) -> bool {
        self.value.is_zero()
    }
}

/// Everything needed to move a root from `old_value` to `new_value` at `key`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateWitness {
    pub key: Hash,
    pub old_value: Hash,
    pub new_value: Hash,
    pub witness_bitfield: Hash,
    pub witnesses: Vec<Hash>,
    pub last_level: u8,
}

impl UpdateWitness {
    /// Extend a proof of the current value with the value about to be written
    pub fn from_proof(proof: VerificationWitness, new_value: Hash) -> Self {
        UpdateWitness {
            key: proof.key,
            old_value: proof.value,
            new_value,
            witness_bitfield: proof.witness_bitfield,
            witnesses: proof.witnesses,
            last_level: proof.last_level,
        }
    }

    /// Root before the update
    pub fn old_root(&self) -> Result<Hash> {
        self.root_with(&self.old_value)
    }

    /// Root after the update
    pub fn new_root(&self) -> Result<Hash> {
        self.root_with(&self.new_value)
    }

    /// See [`apply_witness`]
    pub fn apply(&self, old_root: &Hash) -> Result<Hash> {
        apply_witness(self, old_root)
    }

    fn root_with(&self, value: &Hash) -> Result<Hash> {
        calculate_root(
            &self.key,
            value,
            &self.witness_bitfield,
            &self.witnesses,
            self.last_level,
        )
    }
}

/// Fold a key's path from `last_level` up to the root.
///
/// Fails with [`Error::MalformedWitness`] when the number of witnesses does
/// not match the bits set above `last_level`, or when a bit is set at or
/// below it.
pub fn calculate_root(
    key: &Hash,
    value: &Hash,
    witness_bitfield: &Hash,
    witnesses: &[Hash],
    last_level: u8,
) -> Result<Hash> {
    let expected = if last_level == ROOT_LEVEL {
        0
    } else {
        witness_bitfield.count_bits(last_level + 1, ROOT_LEVEL)
    };
    if witnesses.len() != expected {
        return Err(Error::MalformedWitness(format!(
            "{} witnesses for {} bits above level {}",
            witnesses.len(),
            expected,
            last_level
        )));
    }
    if witness_bitfield.count_bits(0, last_level) != 0 {
        return Err(Error::MalformedWitness(format!(
            "bits set at or below level {}",
            last_level
        )));
    }

    let mut h = calculate_subtree_hash_with_one_leaf(key, value, last_level);
    if last_level == ROOT_LEVEL {
        return Ok(h);
    }

    // Witnesses run top-down; the fold runs bottom-up.
    let mut siblings = witnesses.iter().rev();
    for level in last_level + 1..=ROOT_LEVEL {
        let sibling = if witness_bitfield.bit(level) {
            *siblings
                .next()
                .ok_or_else(|| Error::MalformedWitness("ran out of witnesses".into()))?
        } else {
            empty_tree(level - 1)
        };
        h = if key.bit(level) {
            Hash::combine(&sibling, &h)
        } else {
            Hash::combine(&h, &sibling)
        };
    }

    Ok(h)
}

/// Replay an update against `old_root`.
///
/// Returns the new root, or [`Error::WitnessMismatch`] if the witness does
/// not describe `old_root`.
pub fn apply_witness(witness: &UpdateWitness, old_root: &Hash) -> Result<Hash> {
    let computed = witness.old_root()?;
    if computed != *old_root {
        return Err(Error::WitnessMismatch {
            expected: *old_root,
            computed,
        });
    }
    witness.new_root()
}

/// Whether `proof` holds under `root`. Malformed proofs do not hold.
pub fn check_witness(proof: &VerificationWitness, root: &Hash) -> bool {
    matches!(proof.root(), Ok(computed) if computed == *root)
}
