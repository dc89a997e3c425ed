//! Newick parsing and internal-node labeling.
//!
//! Accepts the usual nested-parenthesis format:
//! - optional labels on any node, single-quoted labels with `''` escapes;
//! - optional `:length` on any node, lengths must be finite and non-negative;
//! - any number of children per node;
//! - `[...]` comments anywhere between tokens, e.g. BEAST's
//!   `:[&rate=0.123]2.45`;
//! - a missing trailing `;`.
//!
//! Every internal node gets a `<n>` identity, numbered in pre-order from the
//! root and skipping numbers a tip already uses. A label read on an internal
//! node (support values such as `100` repeat freely) is kept as the node's
//! annotation and written back as `<n>_label`. Input labels of the form `<n>`
//! or `<n>_label` are recognised, so labeled output parses back to the same
//! tree. Tips must be labeled and tip names must be unique.

use crate::error::ParseError;
use crate::tree::{LabelMode, Node, NodeId, NodeKind, PareTree};
use std::collections::HashSet;

/// Characters that end an unquoted label or length.
const DELIMITERS: &[char] = &['(', ')', '[', ']', ':', ';', ',', '\''];

/// A parsed tree together with its fully labeled serialization.
#[derive(Clone, Debug)]
pub struct ParsedTree {
    pub tree: PareTree,
    pub labeled: String,
}

/// Parse a Newick string and label every internal node.
///
/// # Errors
/// Returns a [`ParseError`] for unbalanced parentheses, repeated tip names,
/// non-numeric or negative lengths, unlabeled tips and stray characters.
/// No partial tree is ever returned.
pub fn parse(text: &str) -> Result<ParsedTree, ParseError> {
    let raw = Reader::new(text).read_tree()?;
    let tree = label_nodes(raw)?;
    let labeled = tree.to_newick(LabelMode::All);
    Ok(ParsedTree { tree, labeled })
}

/// Split an internal label into its `<n>` identity and its annotation.
///
/// `"<4>"` gives `(Some("<4>"), None)`, `"<4>_100"` gives
/// `(Some("<4>"), Some("100"))` and `"100"` gives `(None, Some("100"))`.
pub fn split_internal_label(label: &str) -> (Option<&str>, Option<&str>) {
    let identity_len = label
        .strip_prefix('<')
        .and_then(|rest| rest.find('>'))
        .filter(|&close| close > 0 && label[1..=close].chars().all(|c| c.is_ascii_digit()))
        .map(|close| close + 2);
    match identity_len {
        Some(len) if len == label.len() => (Some(label), None),
        Some(len) => match label[len..].strip_prefix('_') {
            Some(annotation) => (Some(&label[..len]), Some(annotation)),
            None => (None, Some(label)),
        },
        None => (None, Some(label)),
    }
}

/// Quote a label if it would not survive an unquoted round trip.
pub fn quote_label(label: &str) -> String {
    let needs_quotes = label.is_empty()
        || label
            .chars()
            .any(|c| c.is_whitespace() || DELIMITERS.contains(&c));
    if needs_quotes {
        format!("'{}'", label.replace('\'', "''"))
    } else {
        label.to_string()
    }
}

struct RawNode {
    label: Option<String>,
    length: Option<f64>,
    children: Vec<NodeId>,
    parent: Option<NodeId>,
}

struct Reader<'a> {
    src: &'a str,
    pos: usize,
    nodes: Vec<RawNode>,
}

impl<'a> Reader<'a> {
    fn new(src: &'a str) -> Self {
        Reader { src, pos: 0, nodes: Vec::new() }
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn bump(&mut self) {
        if let Some(c) = self.peek() {
            self.pos += c.len_utf8();
        }
    }

    /// Skip whitespace and bracketed comments.
    fn skip_trivia(&mut self) -> Result<(), ParseError> {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.bump();
            } else if c == '[' {
                let start = self.pos;
                match self.src[start..].find(']') {
                    Some(end) => self.pos = start + end + 1,
                    None => return Err(ParseError::Unterminated { what: "comment", pos: start }),
                }
            } else {
                break;
            }
        }
        Ok(())
    }

    /// Iterative descent so that deep caterpillar trees cannot overflow the stack.
    fn read_tree(mut self) -> Result<Vec<RawNode>, ParseError> {
        self.skip_trivia()?;
        if self.peek().is_none() {
            return Err(ParseError::Empty);
        }

        let mut open: Vec<NodeId> = Vec::new();
        'nodes: loop {
            // Expecting the start of a node.
            self.skip_trivia()?;
            if self.peek() == Some('(') {
                let id = self.push_node(open.last().copied());
                open.push(id);
                self.bump();
                continue 'nodes;
            }
            let start = self.pos;
            let label = self.read_label()?;
            if label.is_none() {
                return Err(match self.peek() {
                    Some(')') if open.is_empty() => ParseError::Unbalanced(self.pos),
                    Some(ch) if ch != ')' && ch != ',' => ParseError::Unexpected { ch, pos: self.pos },
                    _ => ParseError::Unexpected { ch: self.peek().unwrap_or(';'), pos: start },
                });
            }
            let id = self.push_node(open.last().copied());
            self.nodes[id.0].label = label;
            self.nodes[id.0].length = self.read_length()?;

            // A node just ended; close as many parentheses as follow.
            loop {
                self.skip_trivia()?;
                match self.peek() {
                    Some(',') => {
                        if open.is_empty() {
                            return Err(ParseError::Unexpected { ch: ',', pos: self.pos });
                        }
                        self.bump();
                        continue 'nodes;
                    }
                    Some(')') => {
                        let Some(closed) = open.pop() else {
                            return Err(ParseError::Unbalanced(self.pos));
                        };
                        self.bump();
                        self.nodes[closed.0].label = self.read_label()?;
                        self.nodes[closed.0].length = self.read_length()?;
                    }
                    Some(';') | None => {
                        if !open.is_empty() {
                            return Err(ParseError::Unbalanced(self.pos));
                        }
                        self.bump();
                        break 'nodes;
                    }
                    Some(ch) => return Err(ParseError::Unexpected { ch, pos: self.pos }),
                }
            }
        }

        self.skip_trivia()?;
        if let Some(ch) = self.peek() {
            return Err(ParseError::Unexpected { ch, pos: self.pos });
        }
        Ok(self.nodes)
    }

    fn push_node(&mut self, parent: Option<NodeId>) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(RawNode { label: None, length: None, children: Vec::new(), parent });
        if let Some(p) = parent {
            self.nodes[p.0].children.push(id);
        }
        id
    }

    fn read_label(&mut self) -> Result<Option<String>, ParseError> {
        self.skip_trivia()?;
        if self.peek() == Some('\'') {
            let start = self.pos;
            self.bump();
            let mut label = String::new();
            loop {
                match self.peek() {
                    None => return Err(ParseError::Unterminated { what: "quoted label", pos: start }),
                    Some('\'') => {
                        self.bump();
                        if self.peek() == Some('\'') {
                            label.push('\'');
                            self.bump();
                        } else {
                            return Ok(Some(label));
                        }
                    }
                    Some(c) => {
                        label.push(c);
                        self.bump();
                    }
                }
            }
        }

        let token = self.read_token();
        Ok((!token.is_empty()).then(|| token.to_string()))
    }

    fn read_token(&mut self) -> &'a str {
        let src: &'a str = self.src;
        let rest = &src[self.pos..];
        let end = rest
            .find(|c: char| c.is_whitespace() || DELIMITERS.contains(&c))
            .unwrap_or(rest.len());
        self.pos += end;
        &rest[..end]
    }

    fn read_length(&mut self) -> Result<Option<f64>, ParseError> {
        self.skip_trivia()?;
        if self.peek() != Some(':') {
            return Ok(None);
        }
        self.bump();
        self.skip_trivia()?;
        let pos = self.pos;
        let token = self.read_token();
        match token.parse::<f64>() {
            Ok(v) if v.is_finite() && v >= 0.0 => Ok(Some(v)),
            _ => Err(ParseError::InvalidLength { value: token.to_string(), pos }),
        }
    }
}

/// Give every internal node a unique `<n>` identity and build the arena.
fn label_nodes(raw: Vec<RawNode>) -> Result<PareTree, ParseError> {
    let mut tips: HashSet<&str> = HashSet::new();
    for node in raw.iter().filter(|node| node.children.is_empty()) {
        // the reader rejects unlabeled tips
        if let Some(label) = node.label.as_deref() {
            if !tips.insert(label) {
                return Err(ParseError::DuplicateLabel(label.to_string()));
            }
        }
    }

    let root = NodeId(0);
    let mut identities = vec![None; raw.len()];
    let mut counter = 0usize;
    let mut stack = vec![root];
    while let Some(id) = stack.pop() {
        let node = &raw[id.0];
        if node.children.is_empty() {
            continue;
        }
        let identity = loop {
            counter += 1;
            let candidate = format!("<{counter}>");
            if !tips.contains(candidate.as_str()) {
                break candidate;
            }
        };
        identities[id.0] = Some(identity);
        stack.extend(node.children.iter().rev().copied());
    }

    let nodes = raw
        .into_iter()
        .zip(identities)
        .enumerate()
        .map(|(idx, (node, identity))| {
            let kind = if node.children.is_empty() {
                NodeKind::Tip
            } else if idx == root.0 {
                NodeKind::Root
            } else {
                NodeKind::Internal
            };
            let (label, annotation) = match identity {
                Some(identity) => {
                    let annotation = node
                        .label
                        .as_deref()
                        .and_then(|l| split_internal_label(l).1)
                        .map(str::to_string);
                    (identity, annotation)
                }
                None => (node.label.unwrap_or_default(), None),
            };
            Node {
                label,
                annotation,
                kind,
                length: node.length,
                children: node.children,
                parent: node.parent,
            }
        })
        .collect();

    PareTree::from_nodes(nodes, root)
}
