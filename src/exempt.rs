//! Branches protected from paring.
//!
//! The exempt specification is line oriented:
//!
//! ```text
//! # comment
//! A B          two or more tips: the branch at their LCA
//! <12>         one token: a node label, <n> or <n>_annotation
//! ```
//!
//! Unknown labels are warned about and skipped. The set is built once from
//! the input tree and stays fixed for the whole run; protection is by clade,
//! so it survives the relabeling that happens on every pass.

use crate::bitset::Bitset;
use crate::clade::{CladeIndex, TipUniverse};
use crate::error::{PareError, Result};
use std::collections::BTreeSet;
use tracing::{info, warn};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExemptBranch {
    pub label: String,
    pub clade: BTreeSet<String>,
}

#[derive(Clone, Debug, Default)]
pub struct ExemptSet {
    branches: Vec<ExemptBranch>,
}

/// Outcome of reading an exempt specification.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExemptReport {
    pub warnings: usize,
    /// Tip sets whose LCA covers more tips than were listed.
    pub superset_notes: usize,
}

impl ExemptSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read an exempt specification against the input tree.
    pub fn from_spec(text: &str, index: &CladeIndex<'_>) -> (Self, ExemptReport) {
        let mut set = ExemptSet::new();
        let mut report = ExemptReport::default();

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let tokens: Vec<&str> = line.split_whitespace().collect();
            let added = if tokens.len() > 1 {
                set.add_tips(tokens.as_slice(), index).map(|exact| {
                    if !exact {
                        report.superset_notes += 1;
                    }
                })
            } else {
                set.add_label(line, index)
            };
            if let Err(e) = added {
                report.warnings += 1;
                warn!("{e}. Skipping exempt line: {line}");
            }
        }

        info!("{} branches will be exempt from paring", set.len());
        (set, report)
    }

    /// Exempt the branch at the LCA of `tips`. Returns whether the LCA's
    /// clade is exactly `tips`.
    pub fn add_tips<S: AsRef<str>>(&mut self, tips: &[S], index: &CladeIndex<'_>) -> Result<bool> {
        let found = index.lca(tips)?;
        let label = index.tree().get(found.node).display_label();
        let listed = tips.iter().map(|t| t.as_ref()).collect::<Vec<&str>>().join(" ");
        info!("{listed} -> {label}");
        if !found.exact {
            info!(
                "{listed} is not monophyletic; {label} protects {} tips",
                index.size(found.node)
            );
        }
        self.branches.push(ExemptBranch {
            label,
            clade: index.clade(found.node),
        });
        Ok(found.exact)
    }

    /// Exempt the branch leading to the node named by `label`: a tip, an
    /// `<n>` identity, `<n>_annotation`, or an annotation used only once.
    pub fn add_label(&mut self, label: &str, index: &CladeIndex<'_>) -> Result<()> {
        let id = index
            .tree()
            .resolve(label)
            .ok_or_else(|| PareError::UnknownLabel(label.to_string()))?;
        self.branches.push(ExemptBranch {
            label: index.tree().get(id).display_label(),
            clade: index.clade(id),
        });
        Ok(())
    }

    pub fn branches(&self) -> &[ExemptBranch] {
        &self.branches
    }

    pub fn len(&self) -> usize {
        self.branches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.branches.is_empty()
    }

    /// Whether `tip` lies inside any exempt clade.
    pub fn protects(&self, tip: &str) -> bool {
        self.branches.iter().any(|b| b.clade.contains(tip))
    }

    /// Exempt clades mapped onto another tree's tips. Tips that are no longer
    /// present are dropped; clades with no remaining tips are skipped.
    pub fn clade_bits(&self, universe: &TipUniverse) -> Vec<Bitset> {
        self.branches
            .iter()
            .map(|b| universe.bitset_of_known(&b.clade))
            .filter(|bits| bits.count_ones() > 0)
            .collect()
    }
}
