//! Python binding layer for tree paring.
//!
//! Provides Python functions for labeling a tree and running a full
//! paring run on a Newick string.

use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

use crate::clade::CladeIndex;
use crate::controller::{Controller, PareConfig, StopReason};
use crate::engine::ParingEngine;
use crate::exempt::ExemptSet;
use crate::newick;
use crate::threshold::Quantile;
use crate::tree::PareTree;

/// Label every internal node of a Newick tree.
///
/// Args:
///     tree: Newick string
///
/// Returns:
///     The tree with every internal node labeled `<n>`, or `<n>_label` when it had a label.
///
/// Raises:
///     ValueError: If the tree cannot be parsed
#[pyfunction]
fn label_tree(tree: &str) -> PyResult<String> {
    newick::parse(tree)
        .map(|parsed| parsed.labeled)
        .map_err(|e| PyValueError::new_err(format!("Failed to parse tree: {}", e)))
}

/// Iteratively pare weakly supported branches from a tree.
///
/// Args:
///     tree: Newick string
///     exempt: Optional exempt specification, one branch per line (default: None)
///     max_tips: Maximum number of tips removed over the run (default: unlimited)
///     max_iterations: Maximum number of passes (default: 10)
///     quantile: Quantile of internal branch values used as threshold (default: 0.25)
///
/// Returns:
///     A tuple of (records, stop_reason) where:
///     - records is a list of (iteration, threshold, pared_branches, pruned_tips, tree)
///     - stop_reason is one of "truncated", "converged", "max_iterations"
///
/// Raises:
///     ValueError: If the tree cannot be parsed or the limits are invalid
#[pyfunction]
#[pyo3(signature = (tree, exempt=None, max_tips=None, max_iterations=10, quantile=0.25))]
#[allow(clippy::type_complexity)]
fn pare_tree(
    tree: &str,
    exempt: Option<&str>,
    max_tips: Option<usize>,
    max_iterations: usize,
    quantile: f64,
) -> PyResult<(Vec<(usize, f64, Vec<String>, Vec<String>, String)>, String)> {
    let to_py = |e: crate::error::PareError| PyValueError::new_err(e.to_string());

    let mut engine = ParingEngine::new(Box::new(Quantile(quantile)));
    if let Some(spec) = exempt {
        let parsed = PareTree::from_newick(tree)
            .map_err(|e| PyValueError::new_err(format!("Failed to parse tree: {}", e)))?;
        let (set, _report) = ExemptSet::from_spec(spec, &CladeIndex::new(&parsed));
        engine = engine.with_exempt(set);
    }

    let config = PareConfig::new(max_tips.unwrap_or(usize::MAX), max_iterations).map_err(to_py)?;
    let state = Controller::new(engine, config, tree)
        .and_then(Controller::run)
        .map_err(to_py)?;

    let reason = match state.stop_reason() {
        Some(StopReason::Truncated) => "truncated",
        Some(StopReason::Converged) => "converged",
        Some(StopReason::MaxIterations) | None => "max_iterations",
    };
    let records = state
        .records()
        .iter()
        .map(|r| {
            (
                r.iteration,
                r.threshold,
                r.pared_branches.clone(),
                r.pruned_tips.clone(),
                r.tree.clone(),
            )
        })
        .collect();

    Ok((records, reason.to_string()))
}

/// Python module definition
#[pymodule]
fn pare(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(label_tree, m)?)?;
    m.add_function(wrap_pyfunction!(pare_tree, m)?)?;
    Ok(())
}
