use crate::output::{print_json, print_phases};
use anyhow::Context;
use clap::Subcommand;
use roadmap_core::{gate, store::Store, types::PhaseStatus};
use std::path::Path;

#[derive(Subcommand)]
pub enum PhaseSubcommand {
    /// Append a phase to the roadmap
    Add {
        id: String,
        #[arg(required = true)]
        name: Vec<String>,
        /// Dependency ids, comma-separated or repeated (--after 1.0,1.1)
        #[arg(long, value_delimiter = ',')]
        after: Vec<String>,
    },
    /// List phases in roadmap order
    List {
        /// Only phases with this status (not_started, in_progress, blocked, complete)
        #[arg(long)]
        status: Option<PhaseStatus>,
    },
    /// Show one phase with its dependencies and dependents
    Show { id: String },
}

pub fn run(root: &Path, subcmd: PhaseSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        PhaseSubcommand::Add { id, name, after } => add(root, &id, &name.join(" "), after, json),
        PhaseSubcommand::List { status } => list(root, status, json),
        PhaseSubcommand::Show { id } => show(root, &id, json),
    }
}

fn add(root: &Path, id: &str, name: &str, after: Vec<String>, json: bool) -> anyhow::Result<()> {
    let store = Store::open(root).context("failed to open roadmap")?;
    let after: Vec<String> = after
        .into_iter()
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty())
        .collect();
    let phase = store
        .add_phase(id, name, after)
        .with_context(|| format!("cannot add phase '{id}'"))?;

    if json {
        print_json(&phase)?;
    } else {
        println!("Added phase {} {} [{}]", phase.status.marker(), phase.id, phase.status);
    }
    Ok(())
}

fn list(root: &Path, status: Option<PhaseStatus>, json: bool) -> anyhow::Result<()> {
    let store = Store::open(root).context("failed to open roadmap")?;
    let roadmap = store.roadmap().context("failed to load roadmap")?;
    let phases: Vec<_> = roadmap
        .all()
        .iter()
        .filter(|p| status.map_or(true, |s| p.status == s))
        .collect();

    if json {
        print_json(&phases)?;
    } else {
        print_phases(&phases);
    }
    Ok(())
}

fn show(root: &Path, id: &str, json: bool) -> anyhow::Result<()> {
    let store = Store::open(root).context("failed to open roadmap")?;
    let roadmap = store.roadmap().context("failed to load roadmap")?;
    let phase = roadmap.get(id)?;
    let waiting_on = roadmap.incomplete_dependencies(phase);
    let dependents: Vec<&str> = roadmap.dependents(id).iter().map(|p| p.id.as_str()).collect();
    let claims = store.claims().context("failed to load claims")?;
    let claim = claims.get(id);

    if json {
        print_json(&serde_json::json!({
            "phase": phase,
            "waiting_on": waiting_on,
            "dependents": dependents,
            "claim": claim,
        }))?;
        return Ok(());
    }

    println!("{} {}  {}", phase.status.marker(), phase.id, phase.name);
    println!("  status:     {}", phase.status);
    if let Some(a) = &phase.assignee {
        println!("  assignee:   {a}");
    }
    if let Some(c) = claim {
        println!("  claimed at: {}", c.claimed_at.to_rfc3339());
        if let Some(exp) = c.lease_expires_at {
            println!("  lease ends: {}", exp.to_rfc3339());
        }
    }
    if let Some(at) = phase.completed_at {
        println!("  completed:  {}", at.to_rfc3339());
    }
    if !phase.dependencies.is_empty() {
        println!("  after:      {}", phase.dependencies.join(", "));
    }
    if !waiting_on.is_empty() {
        println!("  waiting on: {}", waiting_on.join(", "));
    }
    if !dependents.is_empty() {
        println!("  unlocks:    {}", dependents.join(", "));
    }
    Ok(())
}

pub fn unblocked(root: &Path, json: bool) -> anyhow::Result<()> {
    let store = Store::open(root).context("failed to open roadmap")?;
    let roadmap = store.roadmap().context("failed to load roadmap")?;
    let phases = gate::unblocked(&roadmap);

    if json {
        print_json(&phases)?;
    } else if phases.is_empty() {
        println!("No unblocked phases.");
    } else {
        print_phases(&phases);
    }
    Ok(())
}
