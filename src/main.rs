use clap::{Parser, ValueEnum};
use pare::clade::CladeIndex;
use pare::controller::{Controller, PareConfig, RunState, StopReason};
use pare::engine::ParingEngine;
use pare::error::{PareError, Result};
use pare::exempt::ExemptSet;
use pare::io::{
    SUMMARY_HEADERS, prepare_outdir, read_text, read_tree_input, summary_rows,
    write_all_pruned_tips, write_iteration, write_summary_tsv,
};
use pare::newick;
use pare::threshold::{Fixed, Quantile, ThresholdPolicy};
use std::fs::File;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Instant;
use tracing::{error, info};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Iteratively remove weakly supported branches from a rooted tree,
/// trading tips for support elsewhere in the tree.
#[derive(Parser, Debug)]
#[command(name = "pare", version, about = "Paring trees with heuristics")]
struct Args {
    /// Rooted Newick tree, either a file path or the tree string itself
    #[arg(short = 't', long = "tree")]
    tree: String,

    /// File with branches exempt from paring: two tip labels or one node label per line
    #[arg(short = 'e', long = "exempt")]
    exempt: Option<PathBuf>,

    /// Output directory for per-iteration files and the summary
    #[arg(short = 'o', long = "outdir", default_value = "pare-out")]
    outdir: PathBuf,

    /// Reuse an existing, non-empty output directory
    #[arg(long = "overwrite", default_value_t = false)]
    overwrite: bool,

    /// Maximum number of tips removed over the whole run (default: unlimited)
    #[arg(short = 'n', long = "max-tips")]
    max_tips: Option<usize>,

    /// Maximum number of paring iterations
    #[arg(short = 'i', long = "max-iterations", default_value_t = 10)]
    max_iterations: usize,

    /// How each iteration's branch value threshold is chosen: quantile | fixed
    #[arg(long = "threshold-policy", value_enum, default_value_t = ThresholdArg::Quantile)]
    threshold_policy: ThresholdArg,

    /// Quantile of internal branch values used with the quantile policy
    #[arg(long = "quantile", default_value_t = 0.25)]
    quantile: f64,

    /// Threshold used with the fixed policy
    #[arg(long = "threshold")]
    threshold: Option<f64>,

    /// Print the tree with internal node labels and exit
    #[arg(long = "labeltree", default_value_t = false)]
    label_tree: bool,

    /// Quiet mode: suppresses progress messages on stdout
    #[arg(short = 'q', long = "quiet", default_value_t = false)]
    quiet: bool,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ThresholdArg {
    Quantile,
    Fixed,
}

impl Args {
    fn policy(&self) -> Result<Box<dyn ThresholdPolicy>> {
        match self.threshold_policy {
            ThresholdArg::Quantile => {
                if !(0.0..=1.0).contains(&self.quantile) {
                    return Err(PareError::Config(format!(
                        "quantile must be between 0 and 1, got {}",
                        self.quantile
                    )));
                }
                Ok(Box::new(Quantile(self.quantile)))
            }
            ThresholdArg::Fixed => match self.threshold {
                Some(t) if t.is_finite() => Ok(Box::new(Fixed(t))),
                _ => Err(PareError::Config(
                    "--threshold-policy fixed requires a finite --threshold".to_string(),
                )),
            },
        }
    }

    fn config(&self) -> Result<PareConfig> {
        PareConfig::new(self.max_tips.unwrap_or(usize::MAX), self.max_iterations)
    }
}

fn main() {
    let args = Args::parse();

    if let Err(e) = run(&args) {
        error!("{e}");
        eprintln!("Error: {e}");
        let code = match e {
            PareError::Parse(_) => 2,
            PareError::Config(_) => 3,
            _ => 4,
        };
        std::process::exit(code);
    }
}

/// Log to stderr, filtered by PARE_LOG, and, once the output directory
/// exists, at INFO level to `<outdir>/pare.log`.
fn init_logging(quiet: bool, log_file: Option<File>) {
    let default_level = if quiet { "warn" } else { "info" };
    let env_filter =
        EnvFilter::try_from_env("PARE_LOG").unwrap_or_else(|_| EnvFilter::new(default_level));

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(env_filter);
    let file_layer = log_file.map(|file| {
        fmt::layer()
            .with_writer(Mutex::new(file))
            .with_ansi(false)
            .with_target(false)
            .with_filter(LevelFilter::INFO)
    });

    if let Err(e) = tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
    {
        eprintln!("Error: Failed to set up logging: {e}");
    }
}

fn run(args: &Args) -> Result<()> {
    let show = !args.quiet;
    let policy = args.policy()?;
    let config = args.config()?;

    let t0 = Instant::now();
    let input = read_tree_input(&args.tree)?;
    let parsed = newick::parse(&input)?;
    let tree = &parsed.tree;
    let read_s = t0.elapsed().as_secs_f64();
    log_if(
        show,
        format!(
            "Read tree with {} tips and {} internal nodes {read_s:.3}s",
            tree.num_tips(),
            tree.internal_branches().len() + usize::from(!tree.get(tree.root()).is_tip())
        ),
    );

    if args.label_tree {
        println!("{}", parsed.labeled);
        return Ok(());
    }

    let exempt_spec = args.exempt.as_ref().map(read_text).transpose()?;

    prepare_outdir(&args.outdir, args.overwrite)?;
    let log_path = args.outdir.join("pare.log");
    init_logging(args.quiet, Some(File::create(&log_path)?));
    info!("Logging to {}", log_path.display());
    info!("Original tree with node labels: {}", parsed.labeled);

    let mut engine = ParingEngine::new(policy);
    if let Some(spec) = &exempt_spec {
        let (exempt, report) = ExemptSet::from_spec(spec, &CladeIndex::new(tree));
        log_if(
            show,
            format!(
                "{} branches will be exempt from paring ({} warnings)",
                exempt.len(),
                report.warnings
            ),
        );
        engine = engine.with_exempt(exempt);
    }

    let t1 = Instant::now();
    let controller = Controller::new(engine, config, &input)?;
    let state = controller.run_with(|record| {
        write_iteration(&args.outdir, record)?;
        log_if(
            show,
            format!(
                "Iteration {}: {} tips removed, {} branches pared",
                record.iteration,
                record.pruned_tips.len(),
                record.pared_branches.len()
            ),
        );
        Ok(())
    })?;
    let pare_s = t1.elapsed().as_secs_f64();
    log_if(show, format!("Paring {} iterations {pare_s:.3}s", state.records().len()));

    write_all_pruned_tips(args.outdir.join("all-pruned-tips.txt"), &state)?;
    write_summary_tsv(args.outdir.join("summary.tsv"), &state)?;
    info!("{}", SUMMARY_HEADERS.join("\t"));
    for row in summary_rows(&state) {
        info!("{}", row.join("\t"));
    }
    log_done(show, &state);
    Ok(())
}

fn log_if(show: bool, msg: String) {
    if show { println!("{}", msg); }
}

fn log_done(show: bool, state: &RunState) {
    if !show { return; }
    let reason = match state.stop_reason() {
        Some(StopReason::Truncated) => "tip limit reached",
        Some(StopReason::Converged) => "no branches left to pare",
        Some(StopReason::MaxIterations) | None => "iteration limit reached",
    };
    println!(
        "Pared {} total branches and removed {} total tips ({reason})",
        state.total_pared_branches(),
        state.total_pruned_tips()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_log_file_receives_info_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pare.log");
        init_logging(true, Some(File::create(&path).unwrap()));

        info!("Branch length threshold for iteration 1: 0.5");
        tracing::debug!("candidate detail");

        let log = std::fs::read_to_string(&path).unwrap();
        assert!(log.contains("Branch length threshold for iteration 1: 0.5"));
        assert!(!log.contains("candidate detail"));
    }

    #[test]
    fn test_fixed_policy_requires_threshold() {
        let args = Args::parse_from(["pare", "-t", "(A,B);", "--threshold-policy", "fixed"]);
        assert!(matches!(args.policy(), Err(PareError::Config(_))));
        let args = Args::parse_from(["pare", "-t", "(A,B);", "-i", "0"]);
        assert!(matches!(args.config(), Err(PareError::Config(_))));
    }
}
