//! Tree algorithms over a store transaction
//!
//! Every function takes the transaction it works in; nothing is cached
//! between calls. Writes go through [`TreeWrite`], so they only become
//! visible once the surrounding store transaction commits.

use super::node::Node;
use super::subtree::{calculate_subtree_hash_with_one_leaf, empty_root, ROOT_LEVEL};
use super::witness::VerificationWitness;
use crate::model::Hash;
use crate::store::{TreeRead, TreeWrite};
use crate::{Error, Result};
use std::collections::HashSet;

/// Load the root node, `None` for an empty tree
pub(crate) fn load_root<R: TreeRead + ?Sized>(tx: &R) -> Result<Option<Node>> {
    let root = tx.root()?;
    if root == empty_root() {
        return Ok(None);
    }
    tx.get_node(&root).map(Some)
}

fn load<R: TreeRead + ?Sized>(tx: &R, hash: Option<Hash>) -> Result<Option<Node>> {
    hash.map(|h| tx.get_node(&h)).transpose()
}

fn branch_at_leaf_level(hash: &Hash) -> Error {
    Error::Corruption(format!("Branch {} below level 1", hash))
}

/// The child on `key`'s side of a branch at `level`, and its sibling
fn sides(
    key: &Hash,
    level: u8,
    left: Option<Hash>,
    right: Option<Hash>,
) -> (Option<Hash>, Option<Hash>) {
    if key.bit(level) {
        (right, left)
    } else {
        (left, right)
    }
}

/// Value stored at `key`, `None` if absent
pub(crate) fn get<R: TreeRead + ?Sized>(tx: &R, key: &Hash) -> Result<Option<Hash>> {
    let mut current = load_root(tx)?;
    let mut level = ROOT_LEVEL;

    loop {
        match current {
            None => return Ok(None),
            Some(Node::Leaf {
                key: leaf_key,
                value,
                ..
            }) => return Ok(leaf_key.same_slot(key).then_some(value)),
            Some(Node::Branch { hash, left, right }) => {
                if level == 0 {
                    return Err(branch_at_leaf_level(&hash));
                }
                let (child, _) = sides(key, level, left, right);
                current = load(tx, child)?;
                level -= 1;
            }
        }
    }
}

/// Write `value` at `key` and return the new root. A zero value deletes.
pub(crate) fn set<W: TreeWrite + ?Sized>(tx: &mut W, key: &Hash, value: &Hash) -> Result<Hash> {
    let root = load_root(&*tx)?;
    let new_root = insert(tx, root, ROOT_LEVEL, key, value)?;
    let hash = new_root.map_or_else(empty_root, |node| node.hash());
    tx.set_root(hash)?;
    Ok(hash)
}

fn put_leaf<W: TreeWrite + ?Sized>(
    tx: &mut W,
    level: u8,
    key: Hash,
    value: Hash,
) -> Result<Option<Node>> {
    if value.is_zero() {
        return Ok(None);
    }
    let node = Node::leaf(level, key, value);
    tx.put_node(node.clone())?;
    Ok(Some(node))
}

/// Rebuild the subtree at `level` from `current` with `key` set to `value`.
///
/// Returns the new subtree, `None` when it ends up empty.
fn insert<W: TreeWrite + ?Sized>(
    tx: &mut W,
    current: Option<Node>,
    level: u8,
    key: &Hash,
    value: &Hash,
) -> Result<Option<Node>> {
    let Some(node) = current else {
        return put_leaf(tx, level, *key, *value);
    };

    match node {
        Node::Leaf {
            hash,
            key: leaf_key,
            value: leaf_value,
        } => {
            // Keys that differ only in bit 0 share the slot; the later write owns it
            if leaf_key.same_slot(key) {
                if leaf_key == *key && leaf_value == *value {
                    return Ok(Some(node));
                }
                tx.discard_node(&hash)?;
                return put_leaf(tx, level, *key, *value);
            }

            if value.is_zero() {
                return Ok(Some(node));
            }

            // Push the existing leaf one level down and try again from there
            tx.discard_node(&hash)?;
            let pushed = Node::leaf(level - 1, leaf_key, leaf_value);
            let goes_right = key.bit(level);
            if leaf_key.bit(level) == goes_right {
                let child = insert(tx, Some(pushed), level - 1, key, value)?;
                join(tx, level, goes_right, child, None)
            } else {
                let sibling = pushed.hash();
                tx.put_node(pushed)?;
                let child = put_leaf(tx, level - 1, *key, *value)?;
                join(tx, level, goes_right, child, Some(sibling))
            }
        }
        Node::Branch { hash, left, right } => {
            if level == 0 {
                return Err(branch_at_leaf_level(&hash));
            }
            let goes_right = key.bit(level);
            let (child, sibling) = sides(key, level, left, right);

            let old_child = load(tx, child)?;
            let new_child = insert(tx, old_child, level - 1, key, value)?;
            if new_child.as_ref().map(Node::hash) == child {
                return Ok(Some(node));
            }

            tx.discard_node(&hash)?;
            join(tx, level, goes_right, new_child, sibling)
        }
    }
}

/// Combine a freshly built child with its untouched sibling at `level`.
///
/// Keeps the shape canonical: a lone leaf under an empty sibling moves up
/// to `level`, and an empty pair is no node at all.
fn join<W: TreeWrite + ?Sized>(
    tx: &mut W,
    level: u8,
    goes_right: bool,
    child: Option<Node>,
    sibling: Option<Hash>,
) -> Result<Option<Node>> {
    match (child, sibling) {
        (None, None) => Ok(None),
        (
            Some(Node::Leaf {
                hash, key, value, ..
            }),
            None,
        ) => {
            tx.discard_node(&hash)?;
            put_leaf(tx, level, key, value)
        }
        (None, Some(sibling_hash)) => match tx.get_node(&sibling_hash)? {
            Node::Leaf { hash, key, value } => {
                tx.discard_node(&hash)?;
                put_leaf(tx, level, key, value)
            }
            Node::Branch { .. } => put_branch(tx, level, goes_right, None, Some(sibling_hash)),
        },
        (Some(child), sibling) => put_branch(tx, level, goes_right, Some(child.hash()), sibling),
    }
}

fn put_branch<W: TreeWrite + ?Sized>(
    tx: &mut W,
    level: u8,
    goes_right: bool,
    child: Option<Hash>,
    sibling: Option<Hash>,
) -> Result<Option<Node>> {
    let node = if goes_right {
        Node::branch(level, sibling, child)
    } else {
        Node::branch(level, child, sibling)
    };
    tx.put_node(node.clone())?;
    Ok(Some(node))
}

/// Inclusion proof for `key`, or exclusion proof if it is absent
pub(crate) fn prove<R: TreeRead + ?Sized>(tx: &R, key: &Hash) -> Result<VerificationWitness> {
    let mut witness_bitfield = Hash::ZERO;
    let mut witnesses = Vec::new();
    let mut current = load_root(tx)?;
    let mut level = ROOT_LEVEL;

    let (value, last_level) = loop {
        match current {
            None => break (Hash::ZERO, level),
            Some(Node::Leaf {
                key: leaf_key,
                value: leaf_value,
                ..
            }) => {
                // Walk down the leaf's compacted path until the keys part.
                // The leaf becomes the last witness and `key` ends up in an
                // empty subtree next to it. No split means the same slot.
                match (1..=level).rev().find(|l| leaf_key.bit(*l) != key.bit(*l)) {
                    Some(split) => {
                        witness_bitfield.set_bit(split);
                        witnesses.push(calculate_subtree_hash_with_one_leaf(
                            &leaf_key,
                            &leaf_value,
                            split - 1,
                        ));
                        break (Hash::ZERO, split - 1);
                    }
                    None => break (leaf_value, level),
                }
            }
            Some(Node::Branch { hash, left, right }) => {
                if level == 0 {
                    return Err(branch_at_leaf_level(&hash));
                }
                let (child, sibling) = sides(key, level, left, right);
                if let Some(sibling) = sibling {
                    witness_bitfield.set_bit(level);
                    witnesses.push(sibling);
                }
                current = load(tx, child)?;
                level -= 1;
            }
        }
    };

    Ok(VerificationWitness {
        key: *key,
        value,
        witness_bitfield,
        witnesses,
        last_level,
    })
}

/// Node visited by [`walk`]
pub(crate) struct Visit<'a> {
    pub node: &'a Node,
    /// Distance from the root
    pub depth: usize,
}

/// Visit every node reachable from the root, parents before children
pub(crate) fn walk<R, F>(tx: &R, mut f: F) -> Result<()>
where
    R: TreeRead + ?Sized,
    F: FnMut(Visit<'_>),
{
    let mut stack: Vec<(Node, usize)> = load_root(tx)?.into_iter().map(|n| (n, 0)).collect();
    while let Some((node, depth)) = stack.pop() {
        for child in node.children() {
            stack.push((tx.get_node(&child)?, depth + 1));
        }
        f(Visit { node: &node, depth });
    }
    Ok(())
}

/// Hashes of every node reachable from the root
pub(crate) fn reachable<R: TreeRead + ?Sized>(tx: &R) -> Result<HashSet<Hash>> {
    let mut live = HashSet::new();
    walk(tx, |visit| {
        live.insert(visit.node.hash());
    })?;
    Ok(live)
}
