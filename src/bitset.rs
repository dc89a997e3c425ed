//! Compact bitset representation for clades.
//!
//! # Overview
//! A clade is stored as a set of tip indices. Tips are indexed by the rank
//! of their label in sorted order (see [`TipUniverse`](crate::clade::TipUniverse)),
//! so the lowest set bit is always the lexicographically smallest tip.
//!
//! # Example
//! For a tree with tips [A, B, C, D] mapped to indices [0, 1, 2, 3]:
//! - Clade {A, C} → bitset `0b0101` (bits 0 and 2 set)
//! - Clade {B, C, D} → bitset `0b1110` (bits 1, 2, 3 set)

/// A compact bitset for representing which tips belong to a clade.
///
/// Internally stores bits in `Vec<u64>` words to support arbitrarily large trees.
/// Each u64 word holds 64 tip indices.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Bitset(pub Vec<u64>);

impl Bitset {
    /// Creates a new bitset with all bits set to 0.
    ///
    /// # Parameters
    /// - `words`: Number of u64 words needed. Calculate as `num_tips.div_ceil(64)`
    ///
    /// # Example
    /// ```
    /// # use pare::bitset::Bitset;
    /// // For a tree with 100 tips, need 2 words (128 bits)
    /// let bs = Bitset::zeros(2);
    /// assert_eq!(bs.0.len(), 2);
    /// ```
    pub fn zeros(words: usize) -> Self {
        Bitset(vec![0u64; words])
    }

    /// Sets the bit at the given index to 1.
    ///
    /// # Example
    /// ```
    /// # use pare::bitset::Bitset;
    /// let mut bs = Bitset::zeros(1);
    /// bs.set(0);
    /// bs.set(5);
    /// assert_eq!(bs.0[0], 0b00100001);
    /// ```
    #[inline]
    pub fn set(&mut self, idx: usize) {
        let word = idx >> 6; // idx / 64
        let bit = idx & 63; // idx % 64
        self.0[word] |= 1u64 << bit;
    }

    #[inline]
    pub fn contains(&self, idx: usize) -> bool {
        self.0[idx >> 6] & (1u64 << (idx & 63)) != 0
    }

    /// Bitwise OR with another bitset: `self` becomes `self ∪ other`.
    ///
    /// # Example
    /// ```
    /// # use pare::bitset::Bitset;
    /// let mut left = Bitset::zeros(1);
    /// left.set(0);
    /// let mut right = Bitset::zeros(1);
    /// right.set(1);
    /// left.or_assign(&right);
    /// assert_eq!(left.0[0], 0b11);
    /// ```
    #[inline]
    pub fn or_assign(&mut self, other: &Bitset) {
        for (a, b) in self.0.iter_mut().zip(&other.0) {
            *a |= *b;
        }
    }

    /// Whether the two sets share at least one tip.
    #[inline]
    pub fn intersects(&self, other: &Bitset) -> bool {
        self.0.iter().zip(&other.0).any(|(a, b)| a & b != 0)
    }

    /// Whether every tip of `other` is also in `self`.
    #[inline]
    pub fn is_superset(&self, other: &Bitset) -> bool {
        self.0.iter().zip(&other.0).all(|(a, b)| a & b == *b)
    }

    /// Counts the number of set bits, i.e. tips in the clade.
    #[inline]
    pub fn count_ones(&self) -> usize {
        self.0.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Index of the lowest set bit.
    pub fn first_one(&self) -> Option<usize> {
        self.0
            .iter()
            .enumerate()
            .find(|(_, w)| **w != 0)
            .map(|(i, w)| (i << 6) + w.trailing_zeros() as usize)
    }

    /// Indices of all set bits in ascending order.
    pub fn ones(&self) -> impl Iterator<Item = usize> + '_ {
        self.0.iter().enumerate().flat_map(|(i, &word)| {
            let mut rest = word;
            std::iter::from_fn(move || {
                if rest == 0 {
                    return None;
                }
                let bit = rest.trailing_zeros() as usize;
                rest &= rest - 1;
                Some((i << 6) + bit)
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bitset_basic() {
        let mut bs = Bitset::zeros(1);
        bs.set(0);
        bs.set(2);
        assert_eq!(bs.0[0], 0b0101);
        assert!(bs.contains(2));
        assert!(!bs.contains(1));
    }

    #[test]
    fn test_bitset_or() {
        let mut bs1 = Bitset::zeros(1);
        bs1.set(0);
        bs1.set(1);

        let mut bs2 = Bitset::zeros(1);
        bs2.set(2);
        bs2.set(3);

        bs1.or_assign(&bs2);
        assert_eq!(bs1.0[0], 0b1111);
    }

    /// ```text
    ///           root
    ///          /    \
    ///        node1   D
    ///        /   \
    ///       A    node2
    ///            /   \
    ///           B     C
    /// ```
    ///
    /// Tip mapping: A=0, B=1, C=2, D=3
    /// - node2: {B, C} → `0b0110`
    /// - node1: {A, B, C} → `0b0111`
    #[test]
    fn test_mini_tree_relations() {
        let mut node2 = Bitset::zeros(1);
        node2.set(1);
        node2.set(2);

        let mut node1 = Bitset::zeros(1);
        node1.set(0);
        node1.or_assign(&node2);

        let mut tip_d = Bitset::zeros(1);
        tip_d.set(3);

        assert!(node1.is_superset(&node2));
        assert!(!node2.is_superset(&node1));
        assert!(node1.intersects(&node2));
        assert!(!node1.intersects(&tip_d));
        assert_eq!(node1.count_ones(), 3);
        assert_eq!(node1.first_one(), Some(0));
        assert_eq!(node2.first_one(), Some(1));
    }

    #[test]
    fn test_large_tree() {
        // More than 64 tips spans multiple words
        let mut bs = Bitset::zeros(2);
        bs.set(63);
        bs.set(64);
        bs.set(127);

        assert_eq!(bs.count_ones(), 3);
        assert_eq!(bs.first_one(), Some(63));
        assert_eq!(bs.ones().collect::<Vec<_>>(), vec![63, 64, 127]);
        assert_eq!(Bitset::zeros(2).first_one(), None);
    }
}
