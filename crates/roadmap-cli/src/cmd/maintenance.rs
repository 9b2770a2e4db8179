use crate::output::print_json;
use anyhow::Context;
use roadmap_core::store::Store;
use std::path::Path;

pub fn expire(root: &Path, lease_minutes: Option<u32>, json: bool) -> anyhow::Result<()> {
    let store = Store::open(root).context("failed to open roadmap")?;
    let lease = lease_minutes.map(|m| chrono::Duration::minutes(i64::from(m)));
    let expired = store.expire(lease).context("lease expiry failed")?;

    if json {
        print_json(&expired)?;
    } else if expired.is_empty() {
        println!("No stale claims.");
    } else {
        for e in &expired {
            println!(
                "Expired {} (held by {} since {})",
                e.phase.id,
                e.claim.agent_id,
                e.claim.claimed_at.to_rfc3339()
            );
        }
    }
    Ok(())
}

pub fn garden(root: &Path, json: bool) -> anyhow::Result<()> {
    let store = Store::open(root).context("failed to open roadmap")?;
    let changed = store.garden().context("gardening failed")?;

    if json {
        print_json(&serde_json::json!({ "unblocked": changed }))?;
    } else if changed.is_empty() {
        println!("Nothing to unblock.");
    } else {
        println!("Unblocked: {}", changed.join(", "));
    }
    Ok(())
}

pub fn repair(root: &Path, json: bool) -> anyhow::Result<()> {
    let store = Store::open(root).context("failed to open roadmap")?;
    let fixes = store.repair().context("repair failed")?;

    if json {
        print_json(&fixes)?;
    } else if fixes.is_empty() {
        println!("Claim ledger and roadmap agree.");
    } else {
        for f in &fixes {
            println!("{}: {}", f.phase_id(), f.describe());
        }
    }
    Ok(())
}
