//! Append-only audit log, one JSON object per line.

use crate::error::{Result, RoadmapError};
use crate::paths;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::OpenOptions;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    AddPhase,
    Import,
    Claim,
    Release,
    Complete,
    Expire,
    Garden,
    Correction,
    Conflict,
    Repair,
}

impl AuditAction {
    pub fn as_str(self) -> &'static str {
        match self {
            AuditAction::AddPhase => "add_phase",
            AuditAction::Import => "import",
            AuditAction::Claim => "claim",
            AuditAction::Release => "release",
            AuditAction::Complete => "complete",
            AuditAction::Expire => "expire",
            AuditAction::Garden => "garden",
            AuditAction::Correction => "correction",
            AuditAction::Conflict => "conflict",
            AuditAction::Repair => "repair",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub timestamp: DateTime<Utc>,
    pub action: AuditAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    /// `ok`, or the error outcome label (`already_claimed`, `not_owner`, ...).
    pub outcome: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl AuditEvent {
    pub fn new(action: AuditAction, timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            action,
            phase_id: None,
            agent_id: None,
            outcome: "ok".to_string(),
            detail: None,
        }
    }

    pub fn phase(mut self, id: impl Into<String>) -> Self {
        self.phase_id = Some(id.into());
        self
    }

    pub fn agent(mut self, id: impl Into<String>) -> Self {
        self.agent_id = Some(id.into());
        self
    }

    pub fn outcome(mut self, outcome: impl Into<String>) -> Self {
        self.outcome = outcome.into();
        self
    }

    pub fn detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn failed(self, err: &RoadmapError) -> Self {
        let label = err.outcome();
        self.outcome(label).detail(err.to_string())
    }
}

pub fn append(root: &Path, events: &[AuditEvent]) -> Result<()> {
    if events.is_empty() {
        return Ok(());
    }
    let mut text = String::new();
    for event in events {
        text.push_str(&serde_json::to_string(event)?);
        text.push('\n');
    }
    let path = paths::audit_path(root);
    trim_torn_tail(&path)?;
    crate::io::append_text(&path, &text)
}

/// Cut a partial last line left by a writer that died mid-append, so the next
/// event starts on a line of its own.
fn trim_torn_tail(path: &Path) -> Result<()> {
    let mut file = match OpenOptions::new().read(true).write(true).open(path) {
        Ok(f) => f,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(err) => return Err(err.into()),
    };
    let len = file.metadata()?.len();
    if len == 0 {
        return Ok(());
    }
    let mut last = [0u8; 1];
    file.seek(SeekFrom::End(-1))?;
    file.read_exact(&mut last)?;
    if last[0] == b'\n' {
        return Ok(());
    }

    let mut data = Vec::new();
    file.seek(SeekFrom::Start(0))?;
    file.read_to_end(&mut data)?;
    let keep = data.iter().rposition(|&b| b == b'\n').map_or(0, |i| i + 1);
    tracing::warn!(
        path = %path.display(),
        dropped_bytes = data.len() - keep,
        "dropping torn audit line"
    );
    file.set_len(keep as u64)?;
    file.sync_all()?;
    Ok(())
}

/// Read the whole log. A torn final line (a writer died mid-append) is
/// skipped; corruption anywhere else is a parse error.
pub fn read(root: &Path) -> Result<Vec<AuditEvent>> {
    let path = paths::audit_path(root);
    if !path.exists() {
        return Ok(Vec::new());
    }
    let data = std::fs::read_to_string(&path)?;
    let lines: Vec<&str> = data.lines().filter(|l| !l.trim().is_empty()).collect();
    let mut events = Vec::with_capacity(lines.len());
    for (i, line) in lines.iter().enumerate() {
        match serde_json::from_str::<AuditEvent>(line) {
            Ok(event) => events.push(event),
            Err(_) if i + 1 == lines.len() && !data.ends_with('\n') => {
                tracing::warn!(path = %path.display(), "skipping torn audit line");
            }
            Err(e) => {
                return Err(RoadmapError::Parse(format!(
                    "{} line {}: {e}",
                    path.display(),
                    i + 1
                )))
            }
        }
    }
    Ok(events)
}
