//! Markdown projection of the roadmap.
//!
//! Each phase renders as one list item:
//!
//! ```text
//! - 🔄 **1.1** API layer (after 1.0) [@agent-2]
//! ```
//!
//! The list sits between `<!-- roadmap:start -->` and `<!-- roadmap:end -->`
//! so a projection embedded in a larger document can be refreshed in place.

use crate::error::{Result, RoadmapError};
use crate::roadmap::{Phase, Roadmap};
use crate::types::PhaseStatus;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;
use std::path::Path;
use std::sync::OnceLock;

pub const START_MARKER: &str = "<!-- roadmap:start -->";
pub const END_MARKER: &str = "<!-- roadmap:end -->";

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

/// Characters escaped in phase names so a name can never be read back as an
/// `(after ...)` or `[@agent]` suffix.
const ESCAPED: [char; 5] = ['\\', '(', ')', '[', ']'];

fn escape_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        if ESCAPED.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn unescape_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut chars = name.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(&next) = chars.peek().filter(|n| ESCAPED.contains(*n)) {
                out.push(next);
                chars.next();
                continue;
            }
        }
        out.push(c);
    }
    out
}

pub fn render_phase(phase: &Phase) -> String {
    let mut line = format!(
        "- {} **{}** {}",
        phase.status.marker(),
        phase.id,
        escape_name(&phase.name)
    );
    if !phase.dependencies.is_empty() {
        line.push_str(&format!(" (after {})", phase.dependencies.join(", ")));
    }
    if let Some(assignee) = &phase.assignee {
        line.push_str(&format!(" [@{assignee}]"));
    }
    line
}

/// The marker-delimited phase list.
pub fn render_block(roadmap: &Roadmap) -> String {
    let mut out = String::new();
    out.push_str(START_MARKER);
    out.push('\n');
    for phase in roadmap.all() {
        out.push_str(&render_phase(phase));
        out.push('\n');
    }
    out.push_str(END_MARKER);
    out
}

pub fn to_markdown(roadmap: &Roadmap, title: &str) -> String {
    format!("# {title}\n\n{}\n", render_block(roadmap))
}

/// Refresh the projection at `path`.
///
/// - A missing file is created as a full document.
/// - An existing block between the markers is replaced in place.
/// - A file without markers gets the block appended; its text is kept.
pub fn write_projection(path: &Path, roadmap: &Roadmap, title: &str) -> Result<()> {
    if !path.exists() {
        return crate::io::atomic_write(path, to_markdown(roadmap, title).as_bytes());
    }

    let existing = std::fs::read_to_string(path)?;
    let block = render_block(roadmap);
    if existing.contains(START_MARKER) {
        if !crate::io::replace_between_markers(path, START_MARKER, END_MARKER, &block)? {
            tracing::warn!(
                path = %path.display(),
                "projection has a start marker but no end marker, not refreshed"
            );
        }
        return Ok(());
    }

    let sep = if existing.is_empty() || existing.ends_with("\n\n") {
        ""
    } else if existing.ends_with('\n') {
        "\n"
    } else {
        "\n\n"
    };
    crate::io::append_text(path, &format!("{sep}{block}\n"))
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

static ITEM_RE: OnceLock<Regex> = OnceLock::new();
static ASSIGNEE_RE: OnceLock<Regex> = OnceLock::new();
static AFTER_RE: OnceLock<Regex> = OnceLock::new();

fn item_re() -> &'static Regex {
    ITEM_RE.get_or_init(|| {
        Regex::new(r"^\s*[-*]\s+(\S+)\s+\*\*([^*]+)\*\*(.*)$").expect("item pattern is valid")
    })
}

fn assignee_re() -> &'static Regex {
    ASSIGNEE_RE.get_or_init(|| {
        Regex::new(r"(?:^|\s)\[@([^\]\s\\]+)\]\s*$").expect("assignee pattern is valid")
    })
}

fn after_re() -> &'static Regex {
    AFTER_RE.get_or_init(|| {
        Regex::new(r"(?:^|\s)\(after ([^)\\]*)\)\s*$").expect("after pattern is valid")
    })
}

/// Parse projection list items into phases. Lines that are not phase items
/// are ignored. Complete phases are stamped with `now`, since the markdown
/// carries no timestamps.
pub fn parse_markdown(text: &str, now: DateTime<Utc>) -> Result<Vec<Phase>> {
    let mut phases = Vec::new();
    for (lineno, line) in text.lines().enumerate() {
        let Some(caps) = item_re().captures(line) else {
            continue;
        };
        let marker = &caps[1];
        let status = PhaseStatus::from_marker(marker).ok_or_else(|| {
            RoadmapError::Parse(format!("line {}: unknown status marker '{marker}'", lineno + 1))
        })?;
        let id = caps[2].trim().to_string();
        let mut rest = caps[3].to_string();

        let mut assignee = None;
        if let Some(m) = assignee_re().captures(&rest) {
            assignee = Some(m[1].to_string());
            let start = m.get(0).map_or(rest.len(), |g| g.start());
            rest.truncate(start);
        }

        let mut dependencies = Vec::new();
        if let Some(m) = after_re().captures(&rest) {
            dependencies = m[1]
                .split(',')
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(str::to_string)
                .collect();
            let start = m.get(0).map_or(rest.len(), |g| g.start());
            rest.truncate(start);
        }

        let mut phase = Phase::new(id, unescape_name(rest.trim())).with_dependencies(dependencies);
        phase.status = status;
        phase.assignee = assignee;
        if status == PhaseStatus::Complete {
            phase.completed_at = Some(now);
        }
        phases.push(phase);
    }
    Ok(phases)
}

// ---------------------------------------------------------------------------
// Import
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportReport {
    pub added: Vec<String>,
    /// Ids already present; their stored state wins over the markdown.
    pub skipped: Vec<String>,
}

/// Merge parsed phases into `roadmap`. Existing phases are never modified.
/// Imported NotStarted/Blocked statuses are normalized against the merged
/// dependency state.
pub fn import(roadmap: &mut Roadmap, phases: Vec<Phase>) -> Result<ImportReport> {
    let mut report = ImportReport::default();
    let mut fresh = Vec::new();
    for phase in phases {
        if roadmap.contains(&phase.id) {
            report.skipped.push(phase.id);
        } else {
            report.added.push(phase.id.clone());
            fresh.push(phase);
        }
    }
    roadmap.extend(fresh)?;

    for id in &report.added {
        let phase = roadmap.get(id)?;
        let waiting = !roadmap.incomplete_dependencies(phase).is_empty();
        let status = match phase.status {
            PhaseStatus::NotStarted if waiting => PhaseStatus::Blocked,
            PhaseStatus::Blocked if !waiting => PhaseStatus::NotStarted,
            other => other,
        };
        roadmap.get_mut(id)?.status = status;
    }
    Ok(report)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 4, 10, 0, 0).unwrap()
    }

    fn sample() -> Roadmap {
        let mut a = Phase::new("1.0", "Foundation");
        a.status = PhaseStatus::Complete;
        a.assignee = Some("agent-1".into());
        a.completed_at = Some(now());
        let mut b = Phase::new("1.1", "API layer (v1)").with_dependencies(["1.0"]);
        b.status = PhaseStatus::InProgress;
        b.assignee = Some("agent-2".into());
        let c = Phase::new("1.2", "CLI").with_dependencies(["1.0"]);
        let mut d = Phase::new("1.3", "Docs").with_dependencies(["1.1", "1.2"]);
        d.status = PhaseStatus::Blocked;
        Roadmap::from_phases(vec![a, b, c, d]).unwrap()
    }

    #[test]
    fn renders_markers_dependencies_and_assignee() {
        let md = to_markdown(&sample(), "Plan");
        assert!(md.starts_with("# Plan\n"));
        assert!(md.contains("- ✅ **1.0** Foundation [@agent-1]\n"));
        assert!(md.contains("- 🔄 **1.1** API layer \\(v1\\) (after 1.0) [@agent-2]\n"));
        assert!(md.contains("- 🚫 **1.3** Docs (after 1.1, 1.2)\n"));
    }

    #[test]
    fn projection_reimports_to_same_graph() {
        let mut phases = sample().all().to_vec();
        phases.push(Phase::new("1.4", "Cleanup (after 1.0)"));
        phases.push(Phase::new("1.5", "Pairing [@agent-9]"));
        phases.push(Phase::new("1.6", r"Paths like C:\tmp\ and \(x\)"));
        let original = Roadmap::from_phases(phases).unwrap();
        let parsed = parse_markdown(&to_markdown(&original, "Plan"), now()).unwrap();
        let reimported = Roadmap::from_phases(parsed).unwrap();
        assert_eq!(reimported.all(), original.all());
    }

    #[test]
    fn ascii_markers_and_prose_are_accepted() {
        let text = "Intro paragraph.\n\n- DONE **a** Setup\n- TODO **b** Build (after a)\n- just a note\n";
        let phases = parse_markdown(text, now()).unwrap();
        assert_eq!(phases.len(), 2);
        assert_eq!(phases[0].status, PhaseStatus::Complete);
        assert_eq!(phases[1].dependencies, ["a"]);
    }

    #[test]
    fn unknown_marker_names_the_line() {
        let err = parse_markdown("\n- ?? **a** Setup\n", now()).unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn import_skips_existing_and_normalizes_status() {
        let mut roadmap = Roadmap::new();
        roadmap.add_phase("a", "Setup", vec![]).unwrap();
        let phases = parse_markdown("- DONE **a** Setup\n- TODO **b** Build (after a)\n", now()).unwrap();

        let report = import(&mut roadmap, phases).unwrap();
        assert_eq!(report.added, ["b"]);
        assert_eq!(report.skipped, ["a"]);
        assert_eq!(roadmap.get("a").unwrap().status, PhaseStatus::NotStarted);
        assert_eq!(roadmap.get("b").unwrap().status, PhaseStatus::Blocked);
    }

    #[test]
    fn write_projection_appends_to_file_without_markers() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("README.md");
        std::fs::write(&path, "# Project\n\nhand-written docs\n").unwrap();

        write_projection(&path, &sample(), "ignored").unwrap();
        write_projection(&path, &sample(), "ignored").unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("# Project\n\nhand-written docs\n\n"));
        assert_eq!(text.matches(START_MARKER).count(), 1);
        assert!(text.contains("**1.2** CLI"));
        assert!(!text.contains("ignored"));
    }

    #[test]
    fn write_projection_creates_missing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ROADMAP.md");
        write_projection(&path, &sample(), "Plan").unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("# Plan\n\n"));
    }

    #[test]
    fn write_projection_keeps_surrounding_text() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ROADMAP.md");
        std::fs::write(
            &path,
            format!("# Mine\n\nnotes\n\n{START_MARKER}\nold\n{END_MARKER}\n\nfooter\n"),
        )
        .unwrap();

        write_projection(&path, &sample(), "ignored").unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("# Mine\n\nnotes\n"));
        assert!(text.ends_with("footer\n"));
        assert!(text.contains("**1.2** CLI"));
        assert!(!text.contains("old"));
    }
}
