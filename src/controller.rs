//! Iteration controller.
//!
//! Drives repeated paring passes as a small state machine:
//!
//! ```text
//!            ┌──────────── Continue ────────────┐
//!            ▼                                  │
//!        Running ──► engine pass ──┬────────────┘
//!                                  ├─► Truncated ─────┐
//!                                  ├─► Converged ─────┼─► Stopped
//!                                  └─► MaxIterations ─┘
//! ```
//!
//! Every pass re-parses the previous pass's output, so node labels are fresh
//! and self-consistent each time. A pass that would exceed the tip budget is
//! discarded; the last recorded tree is the result.

use crate::engine::ParingEngine;
use crate::error::{PareError, Result};
use crate::newick;
use crate::tree::{LabelMode, PareTree};
use tracing::info;

/// Run limits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PareConfig {
    /// Maximum number of tips removed over the whole run.
    pub max_tips: usize,
    /// Maximum number of recorded passes.
    pub max_iterations: usize,
}

impl Default for PareConfig {
    fn default() -> Self {
        PareConfig { max_tips: usize::MAX, max_iterations: 10 }
    }
}

impl PareConfig {
    /// # Errors
    /// [`PareError::Config`] if `max_iterations` is zero.
    pub fn new(max_tips: usize, max_iterations: usize) -> Result<Self> {
        if max_iterations == 0 {
            return Err(PareError::Config("max iterations must be at least 1".to_string()));
        }
        Ok(PareConfig { max_tips, max_iterations })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    /// The next pass would have pruned more tips than the budget allows.
    Truncated,
    /// No branch could be pared.
    Converged,
    /// The configured number of passes was reached.
    MaxIterations,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    Continue,
    Stop(StopReason),
}

/// One completed pass.
#[derive(Clone, Debug, PartialEq)]
pub struct IterationRecord {
    pub iteration: usize,
    pub threshold: f64,
    pub pared_branches: Vec<String>,
    pub pruned_tips: Vec<String>,
    pub tree: String,
}

/// Everything a run has produced so far.
#[derive(Clone, Debug, PartialEq)]
pub struct RunState {
    input_tree: String,
    records: Vec<IterationRecord>,
    total_pruned_tips: usize,
    total_pared_branches: usize,
    stop: Option<StopReason>,
}

impl RunState {
    fn new(input_tree: String) -> Self {
        RunState {
            input_tree,
            records: Vec::new(),
            total_pruned_tips: 0,
            total_pared_branches: 0,
            stop: None,
        }
    }

    fn push(&mut self, record: IterationRecord) {
        self.total_pruned_tips += record.pruned_tips.len();
        self.total_pared_branches += record.pared_branches.len();
        self.records.push(record);
    }

    /// The input tree as parsed, without `<n>` identities.
    pub fn input_tree(&self) -> &str {
        &self.input_tree
    }

    pub fn records(&self) -> &[IterationRecord] {
        &self.records
    }

    pub fn total_pruned_tips(&self) -> usize {
        self.total_pruned_tips
    }

    pub fn total_pared_branches(&self) -> usize {
        self.total_pared_branches
    }

    pub fn stop_reason(&self) -> Option<StopReason> {
        self.stop
    }

    /// The last successfully produced tree.
    pub fn final_tree(&self) -> &str {
        self.records.last().map_or(self.input_tree.as_str(), |r| r.tree.as_str())
    }

    /// All pruned tips in the order they were removed.
    pub fn all_pruned_tips(&self) -> impl Iterator<Item = &str> {
        self.records
            .iter()
            .flat_map(|r| r.pruned_tips.iter().map(String::as_str))
    }
}

pub struct Controller {
    engine: ParingEngine,
    config: PareConfig,
    current: String,
    iteration: usize,
    state: RunState,
}

impl Controller {
    /// Start a run on `input`.
    ///
    /// # Errors
    /// A malformed tree fails here, before any pass runs.
    pub fn new(engine: ParingEngine, config: PareConfig, input: &str) -> Result<Self> {
        let parsed = newick::parse(input)?;
        let current = parsed.tree.to_newick(LabelMode::Explicit);
        Ok(Controller {
            engine,
            config,
            current: current.clone(),
            iteration: 1,
            state: RunState::new(current),
        })
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn is_stopped(&self) -> bool {
        self.state.stop.is_some()
    }

    /// Run one pass and apply the resulting transition. Once stopped this
    /// keeps returning the stop reason without running the engine again.
    pub fn step(&mut self) -> Result<Transition> {
        if let Some(reason) = self.state.stop {
            return Ok(Transition::Stop(reason));
        }

        let tree = PareTree::from_newick(&self.current)?;
        let remaining = self.config.max_tips.saturating_sub(self.state.total_pruned_tips);
        let pass = self.engine.pare(&tree, remaining);
        info!("Branch length threshold for iteration {}: {}", self.iteration, pass.threshold);

        if pass.over_budget {
            info!(
                "This iteration would remove {} tips, which puts the total pruned over the maximum limit ({}). Paring complete.",
                pass.selected_tips, self.config.max_tips
            );
            return Ok(self.stop(StopReason::Truncated));
        }
        if pass.pruned_tips.is_empty() {
            info!("No branches pared in iteration {}", self.iteration);
            return Ok(self.stop(StopReason::Converged));
        }

        info!(
            "Iteration {}: {} tips removed, {} branches pared",
            self.iteration,
            pass.pruned_tips.len(),
            pass.pared_branches.len()
        );
        self.current = pass.tree.clone();
        self.state.push(IterationRecord {
            iteration: self.iteration,
            threshold: pass.threshold,
            pared_branches: pass.pared_branches,
            pruned_tips: pass.pruned_tips,
            tree: pass.tree,
        });
        self.iteration += 1;

        if self.state.records.len() >= self.config.max_iterations {
            return Ok(self.stop(StopReason::MaxIterations));
        }
        Ok(Transition::Continue)
    }

    fn stop(&mut self, reason: StopReason) -> Transition {
        self.state.stop = Some(reason);
        Transition::Stop(reason)
    }

    /// Run until stopped.
    pub fn run(self) -> Result<RunState> {
        self.run_with(|_| Ok(()))
    }

    /// Run until stopped, calling `on_record` after each completed pass.
    /// An error from the callback ends the run.
    pub fn run_with<F>(mut self, mut on_record: F) -> Result<RunState>
    where
        F: FnMut(&IterationRecord) -> Result<()>,
    {
        loop {
            let before = self.state.records.len();
            let transition = self.step()?;
            if self.state.records.len() > before {
                if let Some(record) = self.state.records.last() {
                    on_record(record)?;
                }
            }
            if let Transition::Stop(reason) = transition {
                info!(
                    "Stopped ({reason:?}): pared {} total branches and removed {} total tips",
                    self.state.total_pared_branches, self.state.total_pruned_tips
                );
                return Ok(self.state);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clade::CladeIndex;
    use crate::exempt::ExemptSet;
    use crate::threshold::Fixed;
    use pretty_assertions::assert_eq;

    const TREE: &str = "(((A:0.01,B:0.02):0.5,C:0.3):0.9,D:0.8);";
    const CATERPILLAR: &str = "((((A:1,B:1):0.1,C:1):0.2,D:1):0.3,E:1);";

    /// Pares only the weakest branch(es) each pass.
    fn weakest() -> ParingEngine {
        ParingEngine::new(Box::new(|v: &[f64]| v.first().copied().unwrap_or(f64::NEG_INFINITY)))
    }

    fn run(engine: ParingEngine, max_tips: usize, max_iterations: usize, tree: &str) -> RunState {
        let config = PareConfig::new(max_tips, max_iterations).unwrap();
        Controller::new(engine, config, tree).unwrap().run().unwrap()
    }

    #[test]
    fn test_converges_when_nothing_qualifies() {
        let state = run(ParingEngine::new(Box::new(Fixed(0.1))), usize::MAX, 10, TREE);
        assert_eq!(state.stop_reason(), Some(StopReason::Converged));
        assert!(state.records().is_empty());
        assert_eq!(state.final_tree(), TREE);
    }

    #[test]
    fn test_single_pass_then_converged() {
        let state = run(ParingEngine::new(Box::new(Fixed(0.5))), usize::MAX, 10, TREE);
        assert_eq!(state.stop_reason(), Some(StopReason::Converged));
        assert_eq!(state.records().len(), 1);
        let record = &state.records()[0];
        assert_eq!(record.iteration, 1);
        assert_eq!(record.pruned_tips, vec!["A"]);
        assert_eq!(record.tree, "((B:0.52,C:0.3):0.9,D:0.8);");
    }

    #[test]
    fn test_runs_until_no_internal_branches() {
        let state = run(weakest(), usize::MAX, 10, CATERPILLAR);
        assert_eq!(state.stop_reason(), Some(StopReason::Converged));
        assert_eq!(state.all_pruned_tips().collect::<Vec<_>>(), vec!["A", "B", "C"]);
        assert_eq!(state.total_pruned_tips(), 3);
        assert_eq!(state.total_pared_branches(), 3);
        assert_eq!(state.final_tree(), "(D:1.3,E:1);");
    }

    #[test]
    fn test_converged_tree_is_a_fixed_point() {
        let first = run(weakest(), usize::MAX, 10, CATERPILLAR);
        let again = run(weakest(), usize::MAX, 10, first.final_tree());
        assert_eq!(again.stop_reason(), Some(StopReason::Converged));
        assert!(again.records().is_empty());
        assert_eq!(again.final_tree(), first.final_tree());
    }

    #[test]
    fn test_max_iterations() {
        let state = run(weakest(), usize::MAX, 2, CATERPILLAR);
        assert_eq!(state.stop_reason(), Some(StopReason::MaxIterations));
        assert_eq!(state.records().len(), 2);
        assert_eq!(state.final_tree(), "((C:1.2,D:1):0.3,E:1);");
    }

    #[test]
    fn test_truncates_at_tip_budget() {
        let state = run(weakest(), 2, 10, CATERPILLAR);
        assert_eq!(state.stop_reason(), Some(StopReason::Truncated));
        assert_eq!(state.records().len(), 2);
        assert_eq!(state.total_pruned_tips(), 2);
        assert_eq!(state.final_tree(), "((C:1.2,D:1):0.3,E:1);");

        let state = run(ParingEngine::new(Box::new(Fixed(0.9))), 1, 10, TREE);
        assert_eq!(state.stop_reason(), Some(StopReason::Truncated));
        assert!(state.records().is_empty());
        assert_eq!(state.final_tree(), TREE);
    }

    #[test]
    fn test_exempt_tips_survive_the_run() {
        let tree = PareTree::from_newick(CATERPILLAR).unwrap();
        let (exempt, _) = ExemptSet::from_spec("C", &CladeIndex::new(&tree));
        let state = run(weakest().with_exempt(exempt.clone()), usize::MAX, 10, CATERPILLAR);

        assert_eq!(state.stop_reason(), Some(StopReason::Converged));
        assert_eq!(state.records().len(), 1);
        for tip in state.all_pruned_tips() {
            assert!(!exempt.protects(tip));
        }
    }

    #[test]
    fn test_exempt_clade_and_its_ancestors_are_never_pared() {
        let newick = "((((A:1,B:1):0.1,C:1):0.2,(D:1,E:1):0.9):0.8,((F:1,G:1):0.15,H:1):0.25);";
        let tree = PareTree::from_newick(newick).unwrap();
        let (exempt, _) = ExemptSet::from_spec("D E", &CladeIndex::new(&tree));
        let state = run(weakest().with_exempt(exempt.clone()), usize::MAX, 10, newick);

        assert_eq!(state.stop_reason(), Some(StopReason::Converged));
        assert_eq!(state.records().len(), 4);

        let mut before = state.input_tree().to_string();
        for record in state.records() {
            let tree = PareTree::from_newick(&before).unwrap();
            assert!(!record.pared_branches.is_empty());
            for label in &record.pared_branches {
                let id = tree.resolve(label).unwrap();
                for branch in exempt.branches() {
                    assert!(crate::clade::clade(id, &tree).is_disjoint(&branch.clade));
                }
            }
            before = record.tree.clone();
        }

        let last = PareTree::from_newick(state.final_tree()).unwrap();
        assert_eq!(last.tip_labels(), vec!["C", "D", "E", "H"]);
    }

    #[test]
    fn test_tip_count_shrinks_every_pass() {
        let newick = "((((A:1,B:1):0.2,(C:1,D:1):0.2):0.3,((E:1,F:1):0.2,G:1):0.3):0.1,(H:1,(I:1,J:1):0.2):0.4);";
        let state = run(ParingEngine::default(), 6, 10, newick);
        assert!(state.total_pruned_tips() <= 6);

        let mut tips = PareTree::from_newick(newick).unwrap().num_tips();
        for record in state.records() {
            let now = PareTree::from_newick(&record.tree).unwrap().num_tips();
            assert_eq!(now + record.pruned_tips.len(), tips);
            assert!(now < tips);
            tips = now;
        }
    }

    #[test]
    fn test_step_after_stop_is_inert() {
        let config = PareConfig::new(usize::MAX, 1).unwrap();
        let mut controller = Controller::new(weakest(), config, CATERPILLAR).unwrap();
        assert_eq!(controller.step().unwrap(), Transition::Stop(StopReason::MaxIterations));
        assert!(controller.is_stopped());
        assert_eq!(controller.step().unwrap(), Transition::Stop(StopReason::MaxIterations));
        assert_eq!(controller.state().records().len(), 1);
    }

    #[test]
    fn test_callback_sees_each_record() {
        let config = PareConfig::default();
        let controller = Controller::new(weakest(), config, CATERPILLAR).unwrap();
        let mut seen = Vec::new();
        let state = controller
            .run_with(|record| {
                seen.push(record.iteration);
                Ok(())
            })
            .unwrap();
        assert_eq!(seen, vec![1, 2, 3]);
        assert_eq!(state.records().len(), 3);
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(matches!(PareConfig::new(5, 0), Err(PareError::Config(_))));
        let err = Controller::new(ParingEngine::default(), PareConfig::default(), "((A,B);");
        assert!(matches!(err, Err(PareError::Parse(_))));
    }
}
