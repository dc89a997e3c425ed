//! Arena representation of a rooted phylogenetic tree.
//!
//! # Overview
//! All nodes live in a `Vec<Node>` and refer to each other through
//! [`NodeId`] indices: children are stored as ordered ids, the parent as an
//! optional id used for lookups only. Tip names and the `<n>` identities of
//! internal nodes are unique, so a label also identifies a node (see
//! [`PareTree::node_by_label`]). Labels read on internal nodes are kept as
//! annotations and may repeat.
//!
//! ```text
//!            <1>              root
//!           /   \
//!         <2>    D            internal node, tip
//!        /   \
//!      <3>    C
//!     /   \
//!    A     B
//! ```
//!
//! Trees are never edited in place by the public API. The paring engine
//! works on a clone and serializes the result; the next pass parses that
//! string again and gets a fresh, self-consistent set of labels.

use crate::error::ParseError;
use crate::newick;
use std::collections::HashMap;
use std::fmt::Write;

/// Index of a node inside its [`PareTree`] arena.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct NodeId(pub usize);

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NodeKind {
    Tip,
    Internal,
    Root,
}

#[derive(Clone, Debug)]
pub struct Node {
    /// Tip name, or the `<n>` identity of an internal node.
    pub label: String,
    /// Label read from the input for an internal node, e.g. a support value.
    pub annotation: Option<String>,
    pub kind: NodeKind,
    /// Length/support of the branch leading to this node, if one was given.
    pub length: Option<f64>,
    pub children: Vec<NodeId>,
    pub parent: Option<NodeId>,
}

impl Node {
    /// Branch value with missing lengths treated as 0.0.
    #[inline]
    pub fn value(&self) -> f64 {
        self.length.unwrap_or(0.0)
    }

    #[inline]
    pub fn is_tip(&self) -> bool {
        self.children.is_empty()
    }

    /// `<n>` or `<n>_annotation` for internal nodes, the name for tips.
    pub fn display_label(&self) -> String {
        match &self.annotation {
            Some(annotation) => format!("{}_{annotation}", self.label),
            None => self.label.clone(),
        }
    }
}

/// Which labels [`PareTree::to_newick`] writes out.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LabelMode {
    /// Tip names and `<n>` identities, with annotations as `<n>_annotation`.
    All,
    /// Tip names and annotations only, as they were in the parsed input.
    Explicit,
}

#[derive(Clone, Debug)]
pub struct PareTree {
    nodes: Vec<Node>,
    by_label: HashMap<String, NodeId>,
    root: NodeId,
}

impl PareTree {
    /// Parse a Newick string. See [`newick::parse`] for the accepted syntax.
    pub fn from_newick(text: &str) -> Result<Self, ParseError> {
        newick::parse(text).map(|parsed| parsed.tree)
    }

    /// Assemble a tree from already-labeled nodes. `nodes[root]` must be the
    /// root; tip names and internal identities must be unique.
    pub(crate) fn from_nodes(nodes: Vec<Node>, root: NodeId) -> Result<Self, ParseError> {
        let mut by_label = HashMap::with_capacity(nodes.len());
        for (idx, node) in nodes.iter().enumerate() {
            if by_label.insert(node.label.clone(), NodeId(idx)).is_some() {
                return Err(ParseError::DuplicateLabel(node.label.clone()));
            }
        }
        Ok(PareTree { nodes, by_label, root })
    }

    #[inline]
    pub fn root(&self) -> NodeId {
        self.root
    }

    #[inline]
    pub fn get(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn node_by_label(&self, label: &str) -> Option<NodeId> {
        self.by_label.get(label).copied()
    }

    /// Look up a node by tip name, `<n>` identity, `<n>_annotation`, or an
    /// annotation carried by exactly one attached node.
    pub fn resolve(&self, label: &str) -> Option<NodeId> {
        if let Some(id) = self.node_by_label(label) {
            return Some(id);
        }
        match newick::split_internal_label(label) {
            (Some(identity), annotation) => {
                let id = self.node_by_label(identity)?;
                (self.nodes[id.0].annotation.as_deref() == annotation).then_some(id)
            }
            (None, _) => {
                let mut matches = self
                    .preorder(self.root)
                    .into_iter()
                    .filter(|&id| self.nodes[id.0].annotation.as_deref() == Some(label));
                match (matches.next(), matches.next()) {
                    (Some(id), None) => Some(id),
                    _ => None,
                }
            }
        }
    }

    /// Whether `id` is still reachable from the root.
    pub fn is_attached(&self, id: NodeId) -> bool {
        self.by_label.get(&self.nodes[id.0].label) == Some(&id)
    }

    /// Size of the arena. Includes detached nodes on edited copies.
    pub fn arena_len(&self) -> usize {
        self.nodes.len()
    }

    /// Node ids in pre-order (parent before children, children in order).
    pub fn preorder(&self, from: NodeId) -> Vec<NodeId> {
        let mut order = Vec::new();
        let mut stack = vec![from];
        while let Some(id) = stack.pop() {
            order.push(id);
            stack.extend(self.nodes[id.0].children.iter().rev().copied());
        }
        order
    }

    /// Tip ids in left-to-right order.
    pub fn tips(&self) -> Vec<NodeId> {
        self.preorder(self.root)
            .into_iter()
            .filter(|&id| self.nodes[id.0].is_tip())
            .collect()
    }

    pub fn tip_labels(&self) -> Vec<String> {
        self.tips()
            .into_iter()
            .map(|id| self.nodes[id.0].label.clone())
            .collect()
    }

    pub fn num_tips(&self) -> usize {
        self.tips().len()
    }

    /// Non-root internal nodes, i.e. the branches paring can act on.
    pub fn internal_branches(&self) -> Vec<NodeId> {
        self.preorder(self.root)
            .into_iter()
            .filter(|&id| self.nodes[id.0].kind == NodeKind::Internal)
            .collect()
    }

    /// Path from `id` up to the root, `id` first.
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(Some(id), move |cur| self.nodes[cur.0].parent)
    }

    /// Remove `id` and everything below it from its parent's child list.
    /// Returns the labels of the tips that were removed.
    pub(crate) fn detach_subtree(&mut self, id: NodeId) -> Vec<String> {
        let mut tips = Vec::new();
        for sub in self.preorder(id) {
            let node = &self.nodes[sub.0];
            if node.is_tip() {
                tips.push(node.label.clone());
            }
            self.by_label.remove(&node.label);
        }
        if let Some(parent) = self.nodes[id.0].parent.take() {
            self.nodes[parent.0].children.retain(|&c| c != id);
        }
        tips
    }

    /// Splice out a node that has exactly one child: the child takes its
    /// place and inherits the summed branch length. Returns the child's id,
    /// or `None` when the node does not have a single child or is the root.
    pub(crate) fn collapse(&mut self, id: NodeId) -> Option<NodeId> {
        let node = &self.nodes[id.0];
        let parent = node.parent?;
        let [child] = node.children[..] else {
            return None;
        };
        let merged = match (node.length, self.nodes[child.0].length) {
            (None, None) => None,
            (a, b) => Some(a.unwrap_or(0.0) + b.unwrap_or(0.0)),
        };

        let siblings = &mut self.nodes[parent.0].children;
        if let Some(slot) = siblings.iter_mut().find(|c| **c == id) {
            *slot = child;
        }
        let child_node = &mut self.nodes[child.0];
        child_node.parent = Some(parent);
        child_node.length = merged;

        let label = self.nodes[id.0].label.clone();
        self.by_label.remove(&label);
        let node = &mut self.nodes[id.0];
        node.children.clear();
        node.parent = None;
        Some(child)
    }

    /// Serialize to Newick, always terminated with `;`.
    pub fn to_newick(&self, mode: LabelMode) -> String {
        enum Step {
            Open(NodeId),
            Close(NodeId),
            Sep,
        }

        let mut out = String::new();
        let mut stack = vec![Step::Open(self.root)];
        while let Some(step) = stack.pop() {
            match step {
                Step::Open(id) => {
                    let node = &self.nodes[id.0];
                    if node.is_tip() {
                        self.write_node_suffix(node, mode, &mut out);
                        continue;
                    }
                    out.push('(');
                    stack.push(Step::Close(id));
                    for (i, &child) in node.children.iter().enumerate().rev() {
                        stack.push(Step::Open(child));
                        if i > 0 {
                            stack.push(Step::Sep);
                        }
                    }
                }
                Step::Sep => out.push(','),
                Step::Close(id) => {
                    out.push(')');
                    self.write_node_suffix(&self.nodes[id.0], mode, &mut out);
                }
            }
        }
        out.push(';');
        out
    }

    fn write_node_suffix(&self, node: &Node, mode: LabelMode, out: &mut String) {
        match (mode, node.is_tip()) {
            (_, true) => out.push_str(&newick::quote_label(&node.label)),
            (LabelMode::All, false) => out.push_str(&newick::quote_label(&node.display_label())),
            (LabelMode::Explicit, false) => {
                if let Some(annotation) = &node.annotation {
                    out.push_str(&newick::quote_label(annotation));
                }
            }
        }
        if let Some(length) = node.length {
            // f64 Display is the shortest string that parses back to the same value
            let _ = write!(out, ":{length}");
        }
    }
}
