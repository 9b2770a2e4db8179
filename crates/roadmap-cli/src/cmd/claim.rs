use crate::output::print_json;
use anyhow::Context;
use clap::Args;
use roadmap_core::store::Store;
use std::path::Path;

#[derive(Args)]
pub struct AgentArg {
    /// Agent id acting on the phase
    #[arg(long, env = "ROADMAP_AGENT")]
    pub agent: String,
}

pub fn claim(root: &Path, phase: &str, agent: &str, json: bool) -> anyhow::Result<()> {
    let store = Store::open(root).context("failed to open roadmap")?;
    let record = store
        .claim(phase, agent)
        .with_context(|| format!("{agent} cannot claim '{phase}'"))?;

    if json {
        print_json(&record)?;
    } else {
        println!("Claimed {} for {}", record.phase_id, record.agent_id);
    }
    Ok(())
}

pub fn next(root: &Path, agent: &str, json: bool) -> anyhow::Result<()> {
    let store = Store::open(root).context("failed to open roadmap")?;
    let record = store
        .claim_next(agent)
        .with_context(|| format!("{agent} found nothing to claim"))?;
    let roadmap = store.roadmap().context("failed to load roadmap")?;
    let phase = roadmap.get(&record.phase_id)?;

    if json {
        print_json(&serde_json::json!({ "claim": record, "phase": phase }))?;
    } else {
        println!("Claimed {} ({}) for {}", phase.id, phase.name, record.agent_id);
    }
    Ok(())
}

pub fn release(root: &Path, phase: &str, agent: &str, json: bool) -> anyhow::Result<()> {
    let store = Store::open(root).context("failed to open roadmap")?;
    store
        .release(phase, agent)
        .with_context(|| format!("{agent} cannot release '{phase}'"))?;

    if json {
        print_json(&serde_json::json!({ "phase_id": phase, "agent_id": agent, "status": "not_started" }))?;
    } else {
        println!("Released {phase}");
    }
    Ok(())
}

pub fn complete(root: &Path, phase: &str, agent: &str, json: bool) -> anyhow::Result<()> {
    let store = Store::open(root).context("failed to open roadmap")?;
    let done = store
        .complete(phase, agent)
        .with_context(|| format!("{agent} cannot complete '{phase}'"))?;

    if json {
        print_json(&done)?;
    } else if done.already_complete {
        println!("{phase} was already complete");
    } else {
        println!("Completed {phase}");
        if !done.unblocked.is_empty() {
            println!("Unblocked: {}", done.unblocked.join(", "));
        }
    }
    Ok(())
}
