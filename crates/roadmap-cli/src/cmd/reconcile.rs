use crate::output::print_json;
use anyhow::Context;
use clap::Args;
use roadmap_core::{
    store::Store,
    sync::{CompletionSignal, Correction},
    RoadmapError,
};
use std::io::Read;
use std::path::{Path, PathBuf};

#[derive(Args)]
pub struct ReconcileArgs {
    /// Phase reported complete
    #[arg(long, requires = "agent", required_unless_present = "file")]
    pub phase: Option<String>,
    /// Agent that reported it
    #[arg(long, requires = "phase")]
    pub agent: Option<String>,
    /// Where the report came from (commit, log file, ...)
    #[arg(long, requires = "phase")]
    pub source: Option<String>,
    /// JSON-lines file of {"phase_id", "agent_id", "source"} signals ('-' for stdin)
    #[arg(long, conflicts_with = "phase")]
    pub file: Option<PathBuf>,
}

pub fn run(root: &Path, args: ReconcileArgs, json: bool) -> anyhow::Result<()> {
    let signals = read_signals(&args)?;
    let store = Store::open(root).context("failed to open roadmap")?;
    let corrections = store
        .reconcile(&signals)
        .context("reconciliation failed")?;

    if json {
        print_json(&corrections)?;
    } else if corrections.is_empty() {
        println!("Registry already agrees with {} signal(s).", signals.len());
    } else {
        for c in &corrections {
            let tag = if c.is_conflict() { "CONFLICT" } else { "fixed" };
            println!("[{tag}] {}: {}", c.phase_id(), c.describe());
        }
    }

    let conflicts: Vec<&Correction> = corrections.iter().filter(|c| c.is_conflict()).collect();
    if let Some(first) = conflicts.first() {
        let reason = if conflicts.len() == 1 {
            first.describe()
        } else {
            format!("{} (and {} more conflicts)", first.describe(), conflicts.len() - 1)
        };
        return Err(RoadmapError::Conflict {
            phase: first.phase_id().to_string(),
            reason,
        }
        .into());
    }
    Ok(())
}

fn read_signals(args: &ReconcileArgs) -> anyhow::Result<Vec<CompletionSignal>> {
    if let Some(file) = &args.file {
        let data = if file.as_os_str() == "-" {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("failed to read signals from stdin")?;
            buf
        } else {
            std::fs::read_to_string(file)
                .with_context(|| format!("failed to read {}", file.display()))?
        };
        return Ok(CompletionSignal::parse_lines(&data)?);
    }

    match (&args.phase, &args.agent) {
        (Some(phase), Some(agent)) => {
            let mut signal = CompletionSignal::new(phase, agent);
            if let Some(src) = &args.source {
                signal = signal.with_source(src);
            }
            Ok(vec![signal])
        }
        _ => anyhow::bail!("either --file or both --phase and --agent are required"),
    }
}
