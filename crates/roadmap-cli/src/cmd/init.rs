use crate::output::print_json;
use anyhow::Context;
use roadmap_core::{paths, render, store::Store};
use std::path::Path;

pub fn run(
    root: &Path,
    name: Option<&str>,
    projection: Option<&Path>,
    json: bool,
) -> anyhow::Result<()> {
    let project_name = match name {
        Some(n) => n.to_string(),
        None => root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "project".to_string()),
    };

    let existed = paths::config_path(root).exists();
    let mut store = Store::init(root, &project_name)
        .with_context(|| format!("failed to initialize {}", paths::roadmap_dir(root).display()))?;

    if let Some(projection) = projection {
        let mut config = store.config().clone();
        config.projection = Some(projection.to_path_buf());
        config.save(root).context("failed to write config.yaml")?;
        store = Store::open(root)?;

        let roadmap = store.roadmap().context("failed to load roadmap")?;
        if let Some(path) = config.projection_path(root) {
            render::write_projection(&path, &roadmap, &config.project.name)
                .with_context(|| format!("failed to write {}", path.display()))?;
        }
    }

    if json {
        print_json(&serde_json::json!({
            "root": root,
            "project": store.config().project.name,
            "created": !existed,
            "projection": store.config().projection,
        }))?;
        return Ok(());
    }

    println!("Initializing roadmap in: {}", root.display());
    for file in [paths::CONFIG_FILE, paths::ROADMAP_FILE, paths::CLAIMS_FILE] {
        let verb = if existed { "exists: " } else { "created:" };
        println!("  {verb} {file}");
    }
    if let Some(p) = &store.config().projection {
        println!("  projection: {}", p.display());
    }
    Ok(())
}
