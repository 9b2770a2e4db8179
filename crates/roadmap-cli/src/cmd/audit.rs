use crate::output::{print_json, print_table};
use anyhow::Context;
use roadmap_core::store::Store;
use std::path::Path;

pub fn run(root: &Path, phase: Option<&str>, limit: Option<usize>, json: bool) -> anyhow::Result<()> {
    let store = Store::open(root).context("failed to open roadmap")?;
    let mut events = store.audit_log().context("failed to read audit log")?;
    if let Some(p) = phase {
        events.retain(|e| e.phase_id.as_deref() == Some(p));
    }
    if let Some(n) = limit {
        let skip = events.len().saturating_sub(n);
        events.drain(..skip);
    }

    if json {
        print_json(&events)?;
        return Ok(());
    }
    if events.is_empty() {
        println!("No audit events.");
        return Ok(());
    }

    let dash = || "-".to_string();
    let rows = events
        .iter()
        .map(|e| {
            vec![
                e.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
                e.action.to_string(),
                e.phase_id.clone().unwrap_or_else(dash),
                e.agent_id.clone().unwrap_or_else(dash),
                e.outcome.clone(),
                e.detail.clone().unwrap_or_default(),
            ]
        })
        .collect();
    print_table(&["TIME", "ACTION", "PHASE", "AGENT", "OUTCOME", "DETAIL"], rows);
    Ok(())
}
