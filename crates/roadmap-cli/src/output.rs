use roadmap_core::roadmap::Phase;
use serde::Serialize;

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{}", json);
    Ok(())
}

pub fn print_table(headers: &[&str], rows: Vec<Vec<String>>) {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in &rows {
        for (i, cell) in row.iter().enumerate() {
            if i < widths.len() {
                widths[i] = widths[i].max(cell.chars().count());
            }
        }
    }

    let line = |cells: Vec<String>| {
        let padded: Vec<String> = cells
            .iter()
            .enumerate()
            .map(|(i, cell)| {
                let w = widths.get(i).copied().unwrap_or(0);
                format!("{:width$}", cell, width = w)
            })
            .collect();
        println!("{}", padded.join("  ").trim_end());
    };

    line(headers.iter().map(|h| h.to_string()).collect());
    line(widths.iter().map(|&w| "-".repeat(w)).collect());
    for row in rows {
        line(row);
    }
}

pub fn print_phases(phases: &[&Phase]) {
    if phases.is_empty() {
        println!("No phases.");
        return;
    }
    let rows = phases
        .iter()
        .map(|p| {
            vec![
                p.id.clone(),
                format!("{} {}", p.status.marker(), p.status),
                p.assignee.clone().unwrap_or_else(|| "-".to_string()),
                if p.dependencies.is_empty() {
                    "-".to_string()
                } else {
                    p.dependencies.join(",")
                },
                p.name.clone(),
            ]
        })
        .collect();
    print_table(&["ID", "STATUS", "ASSIGNEE", "AFTER", "NAME"], rows);
}
