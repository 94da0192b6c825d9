//! Closed-form hashes for subtrees that hold at most one key

use crate::model::Hash;
use std::sync::LazyLock;

/// Number of levels in the tree. The root is level 255, leaves are level 0.
pub const TREE_LEVELS: usize = 256;

/// Level of the root node
pub const ROOT_LEVEL: u8 = 255;

/// Hash of a fully empty subtree at each level.
///
/// `EMPTY_TREES[0]` is the zero hash and
/// `EMPTY_TREES[i + 1] = combine(EMPTY_TREES[i], EMPTY_TREES[i])`.
pub static EMPTY_TREES: LazyLock<[Hash; TREE_LEVELS]> = LazyLock::new(|| {
    let mut trees = [Hash::ZERO; TREE_LEVELS];
    for i in 1..TREE_LEVELS {
        trees[i] = Hash::combine(&trees[i - 1], &trees[i - 1]);
    }
    trees
});

/// Root hash of a tree with no keys
pub fn empty_root() -> Hash {
    EMPTY_TREES[usize::from(ROOT_LEVEL)]
}

/// Hash of the empty subtree at `level`
pub fn empty_tree(level: u8) -> Hash {
    EMPTY_TREES[usize::from(level)]
}

/// Hash of a subtree of height `at_level` holding only `(key, value)`.
///
/// Level 0 is the leaf itself, so the value is returned unchanged. Above
/// that the leaf is folded with the empty subtree on the other side, picking
/// the side from bit `i + 1` of the key. A zero value yields
/// `EMPTY_TREES[at_level]`.
pub fn calculate_subtree_hash_with_one_leaf(key: &Hash, value: &Hash, at_level: u8) -> Hash {
    let mut h = *value;

    for i in 0..at_level {
        let empty = &EMPTY_TREES[usize::from(i)];
        h = if key.bit(i + 1) {
            Hash::combine(empty, &h)
        } else {
            Hash::combine(&h, empty)
        };
    }

    h
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ch(s: &str) -> Hash {
        Hash::digest(s.as_bytes())
    }

    #[test]
    fn test_empty_tree_table() {
        assert_eq!(EMPTY_TREES[0], Hash::ZERO);
        assert_eq!(EMPTY_TREES[1], Hash::combine(&Hash::ZERO, &Hash::ZERO));
        assert_eq!(
            EMPTY_TREES[255],
            Hash::combine(&EMPTY_TREES[254], &EMPTY_TREES[254])
        );
        assert_eq!(empty_root(), EMPTY_TREES[255]);
    }

    #[test]
    fn test_one_leaf_at_lowest_level_is_value() {
        let value = ch("value");
        assert_eq!(
            calculate_subtree_hash_with_one_leaf(&ch("test"), &value, 0),
            value
        );
        assert_eq!(
            calculate_subtree_hash_with_one_leaf(&ch("test"), &Hash::ZERO, 0),
            Hash::ZERO
        );
    }

    #[test]
    fn test_zero_value_is_empty_subtree() {
        for level in [1u8, 7, 128, 255] {
            assert_eq!(
                calculate_subtree_hash_with_one_leaf(&ch("test"), &Hash::ZERO, level),
                empty_tree(level)
            );
        }
    }

    #[test]
    fn test_one_leaf_follows_key_bits() {
        let mut key = Hash::ZERO;
        key.set_bit(1);
        let value = ch("v");

        let h = calculate_subtree_hash_with_one_leaf(&key, &value, 2);
        let level1 = Hash::combine(&EMPTY_TREES[0], &value);
        assert_eq!(h, Hash::combine(&level1, &EMPTY_TREES[1]));
    }
}
