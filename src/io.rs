use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use itertools::Itertools;

use crate::controller::{IterationRecord, RunState};
use crate::error::{PareError, Result};

/// Read a whole text file, transparently decompressing `.gz`.
pub fn read_text<P: AsRef<Path>>(path: P) -> Result<String> {
    let p = path.as_ref();
    let mut content = String::new();
    if is_gz(p) {
        GzDecoder::new(File::open(p)?).read_to_string(&mut content)?;
    } else {
        File::open(p)?.read_to_string(&mut content)?;
    }
    Ok(content)
}

/// Resolve the tree input: an existing file is read, anything else is taken
/// as a literal Newick string.
pub fn read_tree_input(input: &str) -> Result<String> {
    let path = Path::new(input);
    let text = if path.is_file() { read_text(path)? } else { input.to_string() };
    Ok(text.trim().to_string())
}

/// Create the output directory. An existing non-empty directory is only
/// reused with `overwrite`.
pub fn prepare_outdir<P: AsRef<Path>>(path: P, overwrite: bool) -> Result<()> {
    let p = path.as_ref();
    if p.is_dir() && !overwrite && fs::read_dir(p)?.next().is_some() {
        return Err(PareError::Config(format!(
            "output directory {} already exists and is not empty; use --overwrite to reuse it",
            p.display()
        )));
    }
    fs::create_dir_all(p)?;
    Ok(())
}

fn write_lines<P: AsRef<Path>, S: AsRef<str>>(path: P, lines: impl IntoIterator<Item = S>) -> Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    for line in lines {
        writeln!(&mut out, "{}", line.as_ref())?;
    }
    out.flush()?;
    Ok(())
}

/// Write the three per-iteration artifacts and return their paths:
/// `iter-<n>-pruned-spec.txt`, `iter-<n>-pared-branches.txt`, `iter-<n>-pared.tre`.
pub fn write_iteration<P: AsRef<Path>>(outdir: P, record: &IterationRecord) -> Result<[PathBuf; 3]> {
    let dir = outdir.as_ref();
    let n = record.iteration;
    let tips = dir.join(format!("iter-{n}-pruned-spec.txt"));
    let branches = dir.join(format!("iter-{n}-pared-branches.txt"));
    let tree = dir.join(format!("iter-{n}-pared.tre"));

    write_lines(&tips, &record.pruned_tips)?;
    write_lines(&branches, &record.pared_branches)?;
    fs::write(&tree, &record.tree)?;
    Ok([tips, branches, tree])
}

/// Every tip pruned during the run, one per line, in removal order.
pub fn write_all_pruned_tips<P: AsRef<Path>>(path: P, state: &RunState) -> Result<()> {
    write_lines(path, state.all_pruned_tips())
}

/// Rows of the run summary, starting with the input tree as iteration 0.
pub fn summary_rows(state: &RunState) -> Vec<[String; 5]> {
    let na = || "NA".to_string();
    std::iter::once(["0".to_string(), na(), na(), na(), state.input_tree().to_string()])
        .chain(state.records().iter().map(|r| {
            [
                r.iteration.to_string(),
                r.threshold.to_string(),
                r.pared_branches.len().to_string(),
                r.pruned_tips.len().to_string(),
                r.tree.clone(),
            ]
        }))
        .collect()
}

pub const SUMMARY_HEADERS: [&str; 5] = [
    "iteration",
    "branch length threshold",
    "branches pared",
    "tips pruned",
    "tree",
];

/// Write the run summary as TSV to a file.
/// If `path` ends with `.gz`, the output is gzip-compressed.
pub fn write_summary_tsv<P: AsRef<Path>>(path: P, state: &RunState) -> Result<()> {
    let p = path.as_ref();
    let file = File::create(p)?;
    let mut out: Box<dyn Write> = if is_gz(p) {
        Box::new(BufWriter::new(GzEncoder::new(file, Compression::default())))
    } else {
        Box::new(BufWriter::new(file))
    };

    writeln!(&mut out, "{}", SUMMARY_HEADERS.iter().join("\t"))?;
    for row in summary_rows(state) {
        writeln!(&mut out, "{}", row.iter().join("\t"))?;
    }

    out.flush()?;
    Ok(())
}

fn is_gz(p: &Path) -> bool {
    p.to_string_lossy().ends_with(".gz")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::{Controller, PareConfig};
    use crate::engine::ParingEngine;
    use crate::threshold::Fixed;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    const TREE: &str = "(((A:0.01,B:0.02):0.5,C:0.3):0.9,D:0.8);";

    fn one_pass() -> RunState {
        let engine = ParingEngine::new(Box::new(Fixed(0.5)));
        Controller::new(engine, PareConfig::default(), TREE)
            .unwrap()
            .run()
            .unwrap()
    }

    #[test]
    fn test_tree_input_literal_or_file() {
        let dir = TempDir::new().unwrap();
        assert_eq!(read_tree_input(TREE).unwrap(), TREE);

        let path = dir.path().join("input.tre");
        fs::write(&path, format!("{TREE}\n")).unwrap();
        assert_eq!(read_tree_input(path.to_str().unwrap()).unwrap(), TREE);

        let gz = dir.path().join("input.tre.gz");
        let mut enc = GzEncoder::new(File::create(&gz).unwrap(), Compression::default());
        enc.write_all(TREE.as_bytes()).unwrap();
        enc.finish().unwrap();
        assert_eq!(read_tree_input(gz.to_str().unwrap()).unwrap(), TREE);
    }

    #[test]
    fn test_iteration_artifacts() {
        let dir = TempDir::new().unwrap();
        let state = one_pass();
        let [tips, branches, tree] = write_iteration(dir.path(), &state.records()[0]).unwrap();

        assert_eq!(fs::read_to_string(tips).unwrap(), "A\n");
        assert_eq!(fs::read_to_string(branches).unwrap(), "<3>\n");
        assert_eq!(fs::read_to_string(tree).unwrap(), "((B:0.52,C:0.3):0.9,D:0.8);");

        let all = dir.path().join("all-pruned-tips.txt");
        write_all_pruned_tips(&all, &state).unwrap();
        assert_eq!(fs::read_to_string(all).unwrap(), "A\n");
    }

    #[test]
    fn test_summary_tsv_plain_and_gz() {
        let dir = TempDir::new().unwrap();
        let state = one_pass();

        let plain = dir.path().join("summary.tsv");
        write_summary_tsv(&plain, &state).unwrap();
        let text = fs::read_to_string(&plain).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            vec![
                "iteration\tbranch length threshold\tbranches pared\ttips pruned\ttree",
                "0\tNA\tNA\tNA\t(((A:0.01,B:0.02):0.5,C:0.3):0.9,D:0.8);",
                "1\t0.5\t1\t1\t((B:0.52,C:0.3):0.9,D:0.8);",
            ]
        );

        let gz = dir.path().join("summary.tsv.gz");
        write_summary_tsv(&gz, &state).unwrap();
        assert_eq!(read_text(&gz).unwrap(), text);
    }

    #[test]
    fn test_outdir_requires_overwrite() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("run");
        prepare_outdir(&out, false).unwrap();
        prepare_outdir(&out, false).unwrap();

        fs::write(out.join("old.txt"), "x").unwrap();
        assert!(matches!(prepare_outdir(&out, false), Err(PareError::Config(_))));
        prepare_outdir(&out, true).unwrap();
    }
}
