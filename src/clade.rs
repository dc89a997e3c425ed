//! Clades and least common ancestors.
//!
//! # Overview
//! Every node's clade (the tips below it) is computed once, bottom-up, and
//! cached as a [`Bitset`] over a [`TipUniverse`]. Clade queries, LCA lookups
//! and exemption checks then reduce to bitwise operations.
//!
//! # Why tips are indexed by sorted label
//! Node ids are arena positions and change every time a tree is parsed.
//! Tip labels do not. Sorting the labels gives each tip a stable index and
//! makes "the clade containing the lexicographically smallest tip" the
//! clade with the lowest set bit.

use crate::bitset::Bitset;
use crate::error::{PareError, Result};
use crate::tree::{NodeId, PareTree};
use std::collections::{BTreeSet, HashMap};

/// Sorted tip labels of a tree and their bit positions.
#[derive(Clone, Debug)]
pub struct TipUniverse {
    names: Vec<String>,
    index: HashMap<String, usize>,
    words: usize,
}

impl TipUniverse {
    pub fn from_tree(tree: &PareTree) -> Self {
        let mut names = tree.tip_labels();
        names.sort();
        let index = names
            .iter()
            .enumerate()
            .map(|(idx, name)| (name.clone(), idx))
            .collect();
        let words = names.len().div_ceil(64);
        TipUniverse { names, index, words }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn words(&self) -> usize {
        self.words
    }

    pub fn index_of(&self, label: &str) -> Option<usize> {
        self.index.get(label).copied()
    }

    pub fn name(&self, idx: usize) -> &str {
        &self.names[idx]
    }

    /// Bitset for a set of tip labels.
    ///
    /// # Errors
    /// [`PareError::UnknownLabel`] for the first label that is not a tip.
    pub fn bitset_of<S: AsRef<str>>(&self, labels: &[S]) -> Result<Bitset> {
        let mut bits = Bitset::zeros(self.words);
        for label in labels {
            let label = label.as_ref();
            let idx = self
                .index_of(label)
                .ok_or_else(|| PareError::UnknownLabel(label.to_string()))?;
            bits.set(idx);
        }
        Ok(bits)
    }

    /// Bitset for the tips of `labels` that belong to this universe; others are ignored.
    pub fn bitset_of_known<'a>(&self, labels: impl IntoIterator<Item = &'a String>) -> Bitset {
        let mut bits = Bitset::zeros(self.words);
        for idx in labels.into_iter().filter_map(|l| self.index_of(l)) {
            bits.set(idx);
        }
        bits
    }

    /// Tip labels of a bitset, sorted.
    pub fn labels(&self, bits: &Bitset) -> Vec<String> {
        bits.ones().map(|idx| self.names[idx].clone()).collect()
    }
}

/// Result of an LCA query.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Lca {
    pub node: NodeId,
    /// True when the node's clade is exactly the queried tip set.
    pub exact: bool,
}

/// Cached clades for every node of one tree.
#[derive(Debug)]
pub struct CladeIndex<'t> {
    tree: &'t PareTree,
    universe: TipUniverse,
    clades: Vec<Bitset>,
}

impl<'t> CladeIndex<'t> {
    /// Build clades for all nodes reachable from the root.
    ///
    /// # Algorithm
    /// - **Tip**: single bit at the tip's index
    /// - **Internal node**: OR of its children's bitsets
    ///
    /// Nodes are visited in reverse pre-order so that children are always
    /// done before their parent, without recursion.
    pub fn new(tree: &'t PareTree) -> Self {
        let universe = TipUniverse::from_tree(tree);
        let words = universe.words();
        let mut clades = vec![Bitset::zeros(words); tree.arena_len()];

        for id in tree.preorder(tree.root()).into_iter().rev() {
            let node = tree.get(id);
            let mut bits = Bitset::zeros(words);
            if node.is_tip() {
                if let Some(idx) = universe.index_of(&node.label) {
                    bits.set(idx);
                }
            } else {
                for child in &node.children {
                    bits.or_assign(&clades[child.0]);
                }
            }
            clades[id.0] = bits;
        }

        CladeIndex { tree, universe, clades }
    }

    pub fn tree(&self) -> &'t PareTree {
        self.tree
    }

    pub fn universe(&self) -> &TipUniverse {
        &self.universe
    }

    #[inline]
    pub fn bits(&self, id: NodeId) -> &Bitset {
        &self.clades[id.0]
    }

    /// Number of tips below `id`.
    #[inline]
    pub fn size(&self, id: NodeId) -> usize {
        self.clades[id.0].count_ones()
    }

    /// Tip labels below `id`.
    pub fn clade(&self, id: NodeId) -> BTreeSet<String> {
        self.universe.labels(&self.clades[id.0]).into_iter().collect()
    }

    /// Deepest node whose clade contains every tip in `tips`.
    ///
    /// Walks from the first tip toward the root and stops at the first
    /// ancestor whose clade covers the whole request.
    ///
    /// # Errors
    /// - [`PareError::EmptyTipSet`] if `tips` is empty
    /// - [`PareError::UnknownLabel`] if a label is not a tip of this tree
    pub fn lca<S: AsRef<str>>(&self, tips: &[S]) -> Result<Lca> {
        let first = tips.first().ok_or(PareError::EmptyTipSet)?.as_ref();
        let target = self.universe.bitset_of(tips)?;
        let start = self
            .tree
            .node_by_label(first)
            .ok_or_else(|| PareError::UnknownLabel(first.to_string()))?;

        let node = self
            .tree
            .ancestors(start)
            .find(|&id| self.clades[id.0].is_superset(&target))
            .unwrap_or(self.tree.root());
        Ok(Lca { node, exact: self.clades[node.0] == target })
    }
}

/// LCA of `tips` in `tree` and whether its clade is exactly `tips`.
pub fn lca<S: AsRef<str>>(tips: &[S], tree: &PareTree) -> Result<(NodeId, bool)> {
    let found = CladeIndex::new(tree).lca(tips)?;
    Ok((found.node, found.exact))
}

/// Clade of `id` as a bitset over `universe`, by direct traversal.
///
/// Used on trees that are being edited, where a cached [`CladeIndex`] would
/// be stale. Tips outside the universe are ignored.
pub fn clade_bits(tree: &PareTree, id: NodeId, universe: &TipUniverse) -> Bitset {
    let mut bits = Bitset::zeros(universe.words());
    for sub in tree.preorder(id) {
        let node = tree.get(sub);
        if node.is_tip() {
            if let Some(idx) = universe.index_of(&node.label) {
                bits.set(idx);
            }
        }
    }
    bits
}

/// Tip labels below `id`, by direct traversal.
pub fn clade(id: NodeId, tree: &PareTree) -> BTreeSet<String> {
    tree.preorder(id)
        .into_iter()
        .map(|sub| tree.get(sub))
        .filter(|node| node.is_tip())
        .map(|node| node.label.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use itertools::Itertools;

    const TREE: &str = "(((A:0.01,B:0.02):0.5,C:0.3):0.9,D:0.8);";

    fn parent_of(tree: &PareTree, label: &str) -> NodeId {
        let id = tree.node_by_label(label).unwrap();
        tree.get(id).parent.unwrap()
    }

    #[test]
    fn test_lca_exact_pair() {
        let tree = PareTree::from_newick(TREE).unwrap();
        let (node, exact) = lca(&["A", "B"], &tree).unwrap();
        assert_eq!(node, parent_of(&tree, "A"));
        assert!(exact);
    }

    #[test]
    fn test_lca_superset_pair() {
        let tree = PareTree::from_newick(TREE).unwrap();
        let (node, exact) = lca(&["A", "C"], &tree).unwrap();
        assert_eq!(node, parent_of(&tree, "C"));
        assert!(!exact);
        assert_eq!(clade(node, &tree), BTreeSet::from(["A", "B", "C"].map(String::from)));
    }

    #[test]
    fn test_lca_is_order_independent() {
        let tree = PareTree::from_newick(TREE).unwrap();
        let index = CladeIndex::new(&tree);
        for pair in ["A", "B", "C", "D"].iter().permutations(2) {
            let forward = index.lca(&[*pair[0], *pair[1]]).unwrap();
            let backward = index.lca(&[*pair[1], *pair[0]]).unwrap();
            assert_eq!(forward, backward);
        }
        assert_eq!(index.lca(&["B", "D"]).unwrap().node, tree.root());
    }

    #[test]
    fn test_lca_single_tip_is_the_tip() {
        let tree = PareTree::from_newick(TREE).unwrap();
        let found = CladeIndex::new(&tree).lca(&["C"]).unwrap();
        assert_eq!(found.node, tree.node_by_label("C").unwrap());
        assert!(found.exact);
    }

    #[test]
    fn test_lca_errors() {
        let tree = PareTree::from_newick(TREE).unwrap();
        let index = CladeIndex::new(&tree);
        assert!(matches!(index.lca(&["A", "Z"]), Err(PareError::UnknownLabel(l)) if l == "Z"));
        assert!(matches!(index.lca::<&str>(&[]), Err(PareError::EmptyTipSet)));
        // internal labels are not tips
        assert!(matches!(index.lca(&["<2>", "A"]), Err(PareError::UnknownLabel(_))));
    }

    #[test]
    fn test_index_matches_traversal() {
        let tree = PareTree::from_newick("((A,B,(C,D)),(E,(F,G)),H);").unwrap();
        let index = CladeIndex::new(&tree);
        for id in tree.preorder(tree.root()) {
            assert_eq!(index.clade(id), clade(id, &tree));
            assert_eq!(index.size(id), clade(id, &tree).len());
            assert!(index.size(id) >= 1);
        }
        assert_eq!(index.size(tree.root()), 8);
    }

    #[test]
    fn test_universe_sorted_indices() {
        let tree = PareTree::from_newick("((D,B),(C,A));").unwrap();
        let universe = TipUniverse::from_tree(&tree);
        assert_eq!(universe.index_of("A"), Some(0));
        assert_eq!(universe.index_of("D"), Some(3));
        assert_eq!(universe.name(1), "B");
        let bits = universe.bitset_of(&["D", "A"]).unwrap();
        assert_eq!(universe.labels(&bits), vec!["A", "D"]);
        let known = universe.bitset_of_known(&["A".to_string(), "gone".to_string()]);
        assert_eq!(known.count_ones(), 1);
    }
}
