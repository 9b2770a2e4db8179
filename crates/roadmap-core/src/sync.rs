//! Status synchronizer: bring the registry in line with what happened
//! outside it.
//!
//! Two sources of drift are handled. External completion signals (a commit
//! landed, a completion log entry was written) may report work the registry
//! still shows as open; [`reconcile`] applies those or reports a conflict.
//! The claim ledger and the roadmap file are written separately, so a crash
//! between the two writes leaves them disagreeing; [`repair`] fixes that,
//! treating `roadmap.yaml` as the commit point.

use crate::error::{Result, RoadmapError};
use crate::paths;
use crate::registry::{ClaimRecord, ClaimRegistry};
use crate::types::PhaseStatus;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// An out-of-band assertion that `agent_id` finished `phase_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionSignal {
    pub phase_id: String,
    pub agent_id: String,
    /// Where the signal came from, e.g. a commit hash or log path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl CompletionSignal {
    pub fn new(phase_id: impl Into<String>, agent_id: impl Into<String>) -> Self {
        Self {
            phase_id: phase_id.into(),
            agent_id: agent_id.into(),
            source: None,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Parse a JSON-lines signal file. Blank lines and `#` comments are skipped.
    pub fn parse_lines(data: &str) -> Result<Vec<Self>> {
        data.lines()
            .enumerate()
            .filter(|(_, l)| !l.trim().is_empty() && !l.trim_start().starts_with('#'))
            .map(|(i, l)| {
                serde_json::from_str(l)
                    .map_err(|e| RoadmapError::Parse(format!("signal line {}: {e}", i + 1)))
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Correction {
    /// The registry lagged behind a signal and the phase was completed.
    Completed {
        phase_id: String,
        agent_id: String,
        previous_status: PhaseStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source: Option<String>,
    },
    /// The signal contradicts the registry. Nothing was changed.
    Conflict {
        phase_id: String,
        signal_agent: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        recorded_agent: Option<String>,
        reason: String,
    },
    /// A claim record pointed at a phase that is not in progress.
    OrphanClaimDropped { phase_id: String, agent_id: String },
    /// An in-progress phase had no (or a mismatched) claim record.
    ClaimRestored { phase_id: String, agent_id: String },
}

impl Correction {
    pub fn phase_id(&self) -> &str {
        match self {
            Correction::Completed { phase_id, .. }
            | Correction::Conflict { phase_id, .. }
            | Correction::OrphanClaimDropped { phase_id, .. }
            | Correction::ClaimRestored { phase_id, .. } => phase_id,
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Correction::Conflict { .. })
    }

    pub fn describe(&self) -> String {
        match self {
            Correction::Completed {
                agent_id,
                previous_status,
                source,
                ..
            } => match source {
                Some(src) => format!("completed for {agent_id} (was {previous_status}, via {src})"),
                None => format!("completed for {agent_id} (was {previous_status})"),
            },
            Correction::Conflict { reason, .. } => reason.clone(),
            Correction::OrphanClaimDropped { agent_id, .. } => {
                format!("dropped orphaned claim held by {agent_id}")
            }
            Correction::ClaimRestored { agent_id, .. } => {
                format!("restored claim record for {agent_id}")
            }
        }
    }
}

/// Apply each signal in order. Conflicts are returned alongside applied
/// corrections and never change state. Every signal is checked before any
/// is applied, so an unknown phase or bad agent id changes nothing.
pub fn reconcile(
    registry: &mut ClaimRegistry,
    signals: &[CompletionSignal],
    now: DateTime<Utc>,
) -> Result<Vec<Correction>> {
    for signal in signals {
        paths::validate_agent_id(&signal.agent_id)?;
        registry.roadmap().get(&signal.phase_id)?;
    }
    let mut corrections = Vec::new();
    for signal in signals {
        if let Some(c) = reconcile_one(registry, signal, now)? {
            corrections.push(c);
        }
    }
    Ok(corrections)
}

fn reconcile_one(
    registry: &mut ClaimRegistry,
    signal: &CompletionSignal,
    now: DateTime<Utc>,
) -> Result<Option<Correction>> {
    let phase = registry.roadmap().get(&signal.phase_id)?;
    let agent = signal.agent_id.as_str();
    let conflict = |reason: String| Correction::Conflict {
        phase_id: signal.phase_id.clone(),
        signal_agent: agent.to_string(),
        recorded_agent: phase.assignee.clone(),
        reason,
    };

    let status = phase.status;
    match status {
        PhaseStatus::Complete if phase.is_held_by(agent) => Ok(None),
        PhaseStatus::Complete => Ok(Some(conflict(format!(
            "already completed by {}",
            phase.assignee.as_deref().unwrap_or("unknown")
        )))),
        PhaseStatus::InProgress if !phase.is_held_by(agent) => Ok(Some(conflict(format!(
            "in progress under {}",
            phase.assignee.as_deref().unwrap_or("unknown")
        )))),
        PhaseStatus::InProgress => {
            registry.complete(&signal.phase_id, agent, now)?;
            Ok(Some(Correction::Completed {
                phase_id: signal.phase_id.clone(),
                agent_id: agent.to_string(),
                previous_status: PhaseStatus::InProgress,
                source: signal.source.clone(),
            }))
        }
        PhaseStatus::NotStarted | PhaseStatus::Blocked => {
            let waiting = registry.roadmap().incomplete_dependencies(phase);
            if !waiting.is_empty() {
                return Ok(Some(conflict(format!(
                    "reported complete while dependencies are incomplete: {}",
                    waiting.join(", ")
                ))));
            }
            registry.force_complete(&signal.phase_id, agent, now)?;
            Ok(Some(Correction::Completed {
                phase_id: signal.phase_id.clone(),
                agent_id: agent.to_string(),
                previous_status: status,
                source: signal.source.clone(),
            }))
        }
    }
}

/// Make the claim ledger agree with the roadmap. Restored claims start their
/// lease at `now`.
pub fn repair(
    registry: &mut ClaimRegistry,
    now: DateTime<Utc>,
    lease: Option<Duration>,
) -> Vec<Correction> {
    let mut corrections = Vec::new();

    let orphans: Vec<ClaimRecord> = registry
        .claims()
        .all()
        .iter()
        .filter(|c| match registry.roadmap().get(&c.phase_id) {
            Ok(p) => p.status != PhaseStatus::InProgress,
            Err(_) => true,
        })
        .cloned()
        .collect();
    for claim in orphans {
        registry.claims_mut().remove(&claim.phase_id);
        corrections.push(Correction::OrphanClaimDropped {
            phase_id: claim.phase_id,
            agent_id: claim.agent_id,
        });
    }

    let unrecorded: Vec<(String, String)> = registry
        .roadmap()
        .all()
        .iter()
        .filter(|p| p.status == PhaseStatus::InProgress)
        .filter_map(|p| {
            let assignee = p.assignee.clone()?;
            match registry.claims().get(&p.id) {
                Some(c) if c.agent_id == assignee => None,
                _ => Some((p.id.clone(), assignee)),
            }
        })
        .collect();
    for (phase_id, agent_id) in unrecorded {
        registry
            .claims_mut()
            .insert(ClaimRecord::new(&phase_id, &agent_id, now, lease));
        corrections.push(Correction::ClaimRestored { phase_id, agent_id });
    }

    corrections
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
