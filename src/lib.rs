//! Crate root: lightweight module orchestration and public re-exports.
//!
//! Modules:
//! - `tree`: arena representation of a rooted tree + Newick serialization.
//! - `newick`: parsing and internal-node labeling.
//! - `bitset`: compact bitset representation for clades.
//! - `clade`: clade index, LCA and clade queries.
//! - `exempt`: branches protected from paring.
//! - `threshold`: pluggable per-pass threshold policies.
//! - `engine`: a single paring pass.
//! - `controller`: the iteration state machine and run records.
//! - `io`: reading inputs and writing per-iteration artifacts and summaries.
//! - `api`: Python bindings via `pyo3` (gated behind "python" feature).

pub mod bitset;
pub mod clade;
pub mod controller;
pub mod engine;
pub mod error;
pub mod exempt;
pub mod io;
pub mod newick;
pub mod threshold;
pub mod tree;

#[cfg(feature = "python")]
pub mod api;

// Re-export frequently used types & functions
pub use bitset::Bitset;
pub use clade::{CladeIndex, Lca, clade, lca};
pub use controller::{Controller, IterationRecord, PareConfig, RunState, StopReason, Transition};
pub use engine::{ParingEngine, PassResult};
pub use error::{PareError, ParseError, Result};
pub use exempt::ExemptSet;
pub use newick::{ParsedTree, parse};
pub use threshold::{Fixed, Quantile, ThresholdPolicy};
pub use tree::{LabelMode, Node, NodeId, NodeKind, PareTree};
