use crate::output::{print_json, print_table};
use anyhow::Context;
use roadmap_core::{gate, store::Store, types::PhaseStatus};
use std::path::Path;

pub fn run(root: &Path, json: bool) -> anyhow::Result<()> {
    let store = Store::open(root).context("failed to open roadmap")?;
    let roadmap = store.roadmap().context("failed to load roadmap")?;
    let claims = store.claims().context("failed to load claims")?;
    let unblocked: Vec<&str> = gate::unblocked(&roadmap)
        .into_iter()
        .map(|p| p.id.as_str())
        .collect();
    let count = |status: PhaseStatus| roadmap.all().iter().filter(|p| p.status == status).count();

    if json {
        let counts: serde_json::Map<String, serde_json::Value> = PhaseStatus::all()
            .iter()
            .map(|s| (s.as_str().to_string(), count(*s).into()))
            .collect();
        print_json(&serde_json::json!({
            "project": store.config().project.name,
            "total": roadmap.len(),
            "counts": counts,
            "unblocked": unblocked,
            "claims": claims.all(),
        }))?;
        return Ok(());
    }

    println!("Project: {}", store.config().project.name);
    let summary: Vec<String> = PhaseStatus::all()
        .iter()
        .map(|s| format!("{} {} {}", s.marker(), count(*s), s))
        .collect();
    println!("Phases:  {} ({})", roadmap.len(), summary.join(", "));
    println!();

    if claims.all().is_empty() {
        println!("No live claims.");
    } else {
        let lease = store.lease();
        let now = chrono::Utc::now();
        let rows = claims
            .all()
            .iter()
            .map(|c| {
                let age = c.age(now);
                vec![
                    c.phase_id.clone(),
                    c.agent_id.clone(),
                    c.claimed_at.format("%Y-%m-%d %H:%M:%S").to_string(),
                    format!("{}m", age.num_minutes()),
                    if c.is_stale(now, lease) { "stale" } else { "" }.to_string(),
                ]
            })
            .collect();
        print_table(&["PHASE", "AGENT", "CLAIMED", "AGE", ""], rows);
    }
    println!();

    if unblocked.is_empty() {
        println!("Nothing is claimable.");
    } else {
        println!("Claimable: {}", unblocked.join(", "));
    }
    Ok(())
}
