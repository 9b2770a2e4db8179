use crate::output::print_json;
use anyhow::Context;
use roadmap_core::{render, store::Store};
use std::path::Path;

pub fn render(root: &Path, output: Option<&Path>, json: bool) -> anyhow::Result<()> {
    let store = Store::open(root).context("failed to open roadmap")?;
    let roadmap = store.roadmap().context("failed to load roadmap")?;
    let title = &store.config().project.name;

    match output {
        Some(path) => {
            render::write_projection(path, &roadmap, title)
                .with_context(|| format!("failed to write {}", path.display()))?;
            if json {
                print_json(&serde_json::json!({ "written": path, "phases": roadmap.len() }))?;
            } else {
                println!("Wrote {} phase(s) to {}", roadmap.len(), path.display());
            }
        }
        None if json => print_json(&serde_json::json!({
            "markdown": render::to_markdown(&roadmap, title),
        }))?,
        None => print!("{}", render::to_markdown(&roadmap, title)),
    }
    Ok(())
}

pub fn import(root: &Path, file: &Path, json: bool) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let store = Store::open(root).context("failed to open roadmap")?;
    let report = store
        .import_markdown(&text)
        .with_context(|| format!("cannot import {}", file.display()))?;

    if json {
        print_json(&report)?;
    } else {
        println!("Imported {} phase(s)", report.added.len());
        if !report.skipped.is_empty() {
            println!("Skipped existing: {}", report.skipped.join(", "));
        }
    }
    Ok(())
}
