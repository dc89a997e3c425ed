//! One paring pass.
//!
//! # Algorithm
//! 1. Sort the values of all non-root internal branches and ask the
//!    [`ThresholdPolicy`] for this pass's threshold.
//! 2. Candidates are internal branches at or below the threshold with at
//!    least two children whose clade does not touch any exempt clade.
//! 3. Candidates are visited weakest first (ties by label). For each one
//!    still in the tree, the smallest child clade is removed (ties: the
//!    clade holding the alphabetically first tip) and the node, now with a
//!    single child, is collapsed so its length merges into the survivor.
//! 4. If the pass would prune more tips than the budget allows, nothing is
//!    applied and the input tree is returned unchanged.
//!
//! ```text
//! threshold 0.5, branch <3> qualifies
//!
//!        <1>                     <1>
//!       /   \                   /   \
//!     <2>    D     ─────►     <2>    D
//!    /   \                   /   \
//!  <3>    C                 B     C      B:0.52 = 0.02 + 0.5
//!  / \
//! A   B                     pruned: [A]   pared: [<3>]
//! ```
//!
//! Screening candidates is read-only and runs in parallel; removals are
//! committed one at a time in a fixed order so the outcome is reproducible.

use crate::clade::{CladeIndex, clade_bits};
use crate::exempt::ExemptSet;
use crate::threshold::{Quantile, ThresholdPolicy};
use crate::tree::{LabelMode, NodeId, PareTree};
use rayon::prelude::*;
use tracing::debug;

/// Outcome of a single pass.
#[derive(Clone, Debug, PartialEq)]
pub struct PassResult {
    pub threshold: f64,
    /// The pared tree, or the unchanged input when over budget.
    pub tree: String,
    pub pared_branches: Vec<String>,
    pub pruned_tips: Vec<String>,
    pub over_budget: bool,
    /// Tips the pass selected for removal, applied or not.
    pub selected_tips: usize,
}

pub struct ParingEngine {
    policy: Box<dyn ThresholdPolicy>,
    exempt: ExemptSet,
}

impl Default for ParingEngine {
    fn default() -> Self {
        ParingEngine::new(Box::new(Quantile::default()))
    }
}

impl ParingEngine {
    pub fn new(policy: Box<dyn ThresholdPolicy>) -> Self {
        ParingEngine { policy, exempt: ExemptSet::new() }
    }

    pub fn with_exempt(mut self, exempt: ExemptSet) -> Self {
        self.exempt = exempt;
        self
    }

    pub fn exempt(&self) -> &ExemptSet {
        &self.exempt
    }

    /// Threshold for `tree` under this engine's policy.
    pub fn threshold(&self, tree: &PareTree) -> f64 {
        let mut values: Vec<f64> = tree
            .internal_branches()
            .into_iter()
            .map(|id| tree.get(id).value())
            .collect();
        values.sort_by(f64::total_cmp);
        self.policy.threshold(&values)
    }

    /// Branches eligible for paring, in the order they will be visited.
    pub fn candidates(&self, index: &CladeIndex<'_>, threshold: f64) -> Vec<NodeId> {
        let tree = index.tree();
        let exempt_bits = self.exempt.clade_bits(index.universe());

        let mut candidates: Vec<NodeId> = tree
            .internal_branches()
            .into_par_iter()
            .filter(|&id| {
                let node = tree.get(id);
                node.children.len() >= 2
                    && node.value() <= threshold
                    && !exempt_bits.iter().any(|e| index.bits(id).intersects(e))
            })
            .collect();

        candidates.sort_by(|&a, &b| {
            let (a, b) = (tree.get(a), tree.get(b));
            a.value()
                .total_cmp(&b.value())
                .then_with(|| a.label.cmp(&b.label))
        });
        candidates
    }

    /// Run one pass over `tree`, pruning at most `max_tips_remaining` tips.
    pub fn pare(&self, tree: &PareTree, max_tips_remaining: usize) -> PassResult {
        let index = CladeIndex::new(tree);
        let universe = index.universe();
        let threshold = self.threshold(tree);
        let candidates = self.candidates(&index, threshold);
        debug!("{} branches at or below threshold {threshold}", candidates.len());

        let mut work = tree.clone();
        let mut pared_branches = Vec::new();
        let mut pruned_tips = Vec::new();

        for id in candidates {
            if !work.is_attached(id) {
                debug!("{} already removed with an earlier clade", tree.get(id).label);
                continue;
            }
            let node = work.get(id);
            if node.children.len() < 2 {
                continue;
            }

            let Some(victim) = node.children.iter().copied().min_by_key(|&child| {
                let bits = clade_bits(&work, child, universe);
                (bits.count_ones(), bits.first_one())
            }) else {
                continue;
            };

            let label = node.display_label();
            let removed = work.detach_subtree(victim);
            work.collapse(id);
            debug!("pared {label}: removed {}", removed.join(","));

            pared_branches.push(label);
            pruned_tips.extend(removed);
        }

        let selected_tips = pruned_tips.len();
        if selected_tips > max_tips_remaining {
            return PassResult {
                threshold,
                tree: tree.to_newick(LabelMode::Explicit),
                pared_branches: Vec::new(),
                pruned_tips: Vec::new(),
                over_budget: true,
                selected_tips,
            };
        }

        PassResult {
            threshold,
            tree: work.to_newick(LabelMode::Explicit),
            pared_branches,
            pruned_tips,
            over_budget: false,
            selected_tips,
        }
    }
}
