use crate::error::{Result, RoadmapError};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const ROADMAP_DIR: &str = ".roadmap";

pub const CONFIG_FILE: &str = ".roadmap/config.yaml";
pub const ROADMAP_FILE: &str = ".roadmap/roadmap.yaml";
pub const CLAIMS_FILE: &str = ".roadmap/claims.yaml";
pub const AUDIT_FILE: &str = ".roadmap/audit.jsonl";
pub const LOCK_FILE: &str = ".roadmap/roadmap.lock";

pub const DEFAULT_PROJECTION: &str = "ROADMAP.md";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn roadmap_dir(root: &Path) -> PathBuf {
    root.join(ROADMAP_DIR)
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

pub fn roadmap_path(root: &Path) -> PathBuf {
    root.join(ROADMAP_FILE)
}

pub fn claims_path(root: &Path) -> PathBuf {
    root.join(CLAIMS_FILE)
}

pub fn audit_path(root: &Path) -> PathBuf {
    root.join(AUDIT_FILE)
}

pub fn lock_path(root: &Path) -> PathBuf {
    root.join(LOCK_FILE)
}

// ---------------------------------------------------------------------------
// Identifier validation
// ---------------------------------------------------------------------------

static PHASE_ID_RE: OnceLock<Regex> = OnceLock::new();

fn phase_id_re() -> &'static Regex {
    PHASE_ID_RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._\-]*$").expect("phase id pattern is valid")
    })
}

pub fn validate_phase_id(id: &str) -> Result<()> {
    if id.is_empty() || id.len() > 64 || !phase_id_re().is_match(id) {
        return Err(RoadmapError::InvalidPhaseId(id.to_string()));
    }
    Ok(())
}

pub fn validate_agent_id(agent: &str) -> Result<()> {
    if agent.trim().is_empty() || agent.chars().any(char::is_whitespace) {
        return Err(RoadmapError::InvalidAgentId(agent.to_string()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
