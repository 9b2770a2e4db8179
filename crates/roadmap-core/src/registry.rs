//! Claim registry: the per-phase state machine.
//!
//! ```text
//! NotStarted --claim--> InProgress --complete--> Complete
//!     ^  |                  |
//!     |  +--(gate)--> Blocked
//!     +--release/expire-----+
//! ```
//!
//! `ClaimRegistry` operates on an in-memory ledger. Cross-process mutual
//! exclusion comes from [`crate::store::Store`], which loads a registry under
//! the lock, applies exactly one operation, and persists the result.

use crate::error::{Result, RoadmapError};
use crate::gate;
use crate::paths;
use crate::roadmap::{Phase, Roadmap};
use crate::types::PhaseStatus;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// ClaimRecord / ClaimBook
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimRecord {
    pub phase_id: String,
    pub agent_id: String,
    pub claim_id: Uuid,
    pub claimed_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lease_expires_at: Option<DateTime<Utc>>,
}

impl ClaimRecord {
    pub fn new(
        phase_id: impl Into<String>,
        agent_id: impl Into<String>,
        claimed_at: DateTime<Utc>,
        lease: Option<Duration>,
    ) -> Self {
        Self {
            phase_id: phase_id.into(),
            agent_id: agent_id.into(),
            claim_id: Uuid::new_v4(),
            claimed_at,
            lease_expires_at: lease.map(|l| claimed_at + l),
        }
    }

    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.claimed_at
    }

    /// A claim is stale once its age strictly exceeds the lease.
    pub fn is_stale(&self, now: DateTime<Utc>, lease: Duration) -> bool {
        self.age(now) > lease
    }
}

/// Persisted set of live claims, one per InProgress phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimBook {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    claims: Vec<ClaimRecord>,
}

fn default_version() -> u32 {
    1
}

impl Default for ClaimBook {
    fn default() -> Self {
        Self::new()
    }
}

impl ClaimBook {
    pub fn new() -> Self {
        Self {
            version: 1,
            claims: Vec::new(),
        }
    }

    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::claims_path(root);
        if !path.exists() {
            return Ok(Self::new());
        }
        let data = std::fs::read_to_string(&path)?;
        serde_yaml::from_str(&data)
            .map_err(|e| RoadmapError::Parse(format!("{}: {e}", path.display())))
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::claims_path(root);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }

    pub fn all(&self) -> &[ClaimRecord] {
        &self.claims
    }

    pub fn get(&self, phase_id: &str) -> Option<&ClaimRecord> {
        self.claims.iter().find(|c| c.phase_id == phase_id)
    }

    /// Insert `record`, replacing any existing record for the same phase.
    pub fn insert(&mut self, record: ClaimRecord) {
        self.claims.retain(|c| c.phase_id != record.phase_id);
        self.claims.push(record);
    }

    pub fn remove(&mut self, phase_id: &str) -> Option<ClaimRecord> {
        let pos = self.claims.iter().position(|c| c.phase_id == phase_id)?;
        Some(self.claims.remove(pos))
    }
}

// ---------------------------------------------------------------------------
// Operation results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct Completion {
    pub phase_id: String,
    pub agent_id: String,
    pub completed_at: DateTime<Utc>,
    /// True when the phase was already complete by the same agent.
    pub already_complete: bool,
    /// Phases moved from Blocked to NotStarted by this completion.
    pub unblocked: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExpiredClaim {
    /// The phase after it was returned to NotStarted.
    pub phase: Phase,
    pub claim: ClaimRecord,
}

// ---------------------------------------------------------------------------
// ClaimRegistry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ClaimRegistry {
    roadmap: Roadmap,
    claims: ClaimBook,
}

impl ClaimRegistry {
    pub fn new(roadmap: Roadmap, claims: ClaimBook) -> Self {
        Self { roadmap, claims }
    }

    pub fn roadmap(&self) -> &Roadmap {
        &self.roadmap
    }

    pub fn claims(&self) -> &ClaimBook {
        &self.claims
    }

    pub(crate) fn roadmap_mut(&mut self) -> &mut Roadmap {
        &mut self.roadmap
    }

    pub(crate) fn claims_mut(&mut self) -> &mut ClaimBook {
        &mut self.claims
    }

    pub fn into_parts(self) -> (Roadmap, ClaimBook) {
        (self.roadmap, self.claims)
    }

    /// Take exclusive ownership of `phase_id` for `agent_id`.
    pub fn claim(
        &mut self,
        phase_id: &str,
        agent_id: &str,
        now: DateTime<Utc>,
        lease: Option<Duration>,
    ) -> Result<ClaimRecord> {
        paths::validate_agent_id(agent_id)?;
        gate::recompute_blocked_status(&mut self.roadmap);

        let phase = self.roadmap.get(phase_id)?;
        if phase.status.has_assignee() {
            return Err(RoadmapError::AlreadyClaimed {
                phase: phase_id.to_string(),
                holder: phase.assignee.clone().unwrap_or_default(),
            });
        }
        let waiting_on = self.roadmap.incomplete_dependencies(phase);
        if phase.status == PhaseStatus::Blocked || !waiting_on.is_empty() {
            return Err(RoadmapError::Blocked {
                phase: phase_id.to_string(),
                waiting_on,
            });
        }

        let phase = self.roadmap.get_mut(phase_id)?;
        phase.status = PhaseStatus::InProgress;
        phase.assignee = Some(agent_id.to_string());

        let record = ClaimRecord::new(phase_id, agent_id, now, lease);
        self.claims.insert(record.clone());
        Ok(record)
    }

    /// Claim the first unblocked phase in roadmap order.
    pub fn claim_next(
        &mut self,
        agent_id: &str,
        now: DateTime<Utc>,
        lease: Option<Duration>,
    ) -> Result<ClaimRecord> {
        paths::validate_agent_id(agent_id)?;
        gate::recompute_blocked_status(&mut self.roadmap);
        let next = gate::unblocked(&self.roadmap)
            .first()
            .map(|p| p.id.clone())
            .ok_or(RoadmapError::NoUnblockedWork)?;
        self.claim(&next, agent_id, now, lease)
    }

    /// Return an InProgress phase held by `agent_id` to NotStarted.
    pub fn release(&mut self, phase_id: &str, agent_id: &str) -> Result<()> {
        let phase = self.roadmap.get_mut(phase_id)?;
        if phase.status != PhaseStatus::InProgress || !phase.is_held_by(agent_id) {
            return Err(RoadmapError::NotOwner {
                phase: phase_id.to_string(),
                agent: agent_id.to_string(),
            });
        }
        phase.status = PhaseStatus::NotStarted;
        phase.assignee = None;
        self.claims.remove(phase_id);
        Ok(())
    }

    /// Mark an InProgress phase held by `agent_id` as Complete.
    ///
    /// Repeating the call after completion returns Ok and leaves
    /// `completed_at` untouched.
    pub fn complete(
        &mut self,
        phase_id: &str,
        agent_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Completion> {
        let phase = self.roadmap.get_mut(phase_id)?;
        match phase.status {
            PhaseStatus::Complete if phase.is_held_by(agent_id) => Ok(Completion {
                phase_id: phase_id.to_string(),
                agent_id: agent_id.to_string(),
                completed_at: phase.completed_at.unwrap_or(now),
                already_complete: true,
                unblocked: Vec::new(),
            }),
            PhaseStatus::InProgress if phase.is_held_by(agent_id) => {
                phase.status = PhaseStatus::Complete;
                phase.completed_at = Some(now);
                self.claims.remove(phase_id);
                let unblocked = gate::recompute_blocked_status(&mut self.roadmap);
                Ok(Completion {
                    phase_id: phase_id.to_string(),
                    agent_id: agent_id.to_string(),
                    completed_at: now,
                    already_complete: false,
                    unblocked,
                })
            }
            _ => Err(RoadmapError::NotOwner {
                phase: phase_id.to_string(),
                agent: agent_id.to_string(),
            }),
        }
    }

    /// Complete a phase nobody holds, on behalf of `agent_id`. The caller
    /// must already have checked that its dependencies are complete.
    pub(crate) fn force_complete(
        &mut self,
        phase_id: &str,
        agent_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Completion> {
        let phase = self.roadmap.get_mut(phase_id)?;
        phase.status = PhaseStatus::InProgress;
        phase.assignee = Some(agent_id.to_string());
        self.complete(phase_id, agent_id, now)
    }

    /// Force-release every InProgress phase whose claim is older than `lease`.
    pub fn expire_stale_claims(&mut self, now: DateTime<Utc>, lease: Duration) -> Vec<ExpiredClaim> {
        let stale: Vec<ClaimRecord> = self
            .claims
            .all()
            .iter()
            .filter(|c| c.is_stale(now, lease))
            .filter(|c| {
                self.roadmap
                    .get(&c.phase_id)
                    .map(|p| p.status == PhaseStatus::InProgress)
                    .unwrap_or(false)
            })
            .cloned()
            .collect();

        let mut expired = Vec::with_capacity(stale.len());
        for claim in stale {
            self.claims.remove(&claim.phase_id);
            let Ok(phase) = self.roadmap.get_mut(&claim.phase_id) else {
                continue;
            };
            phase.status = PhaseStatus::NotStarted;
            phase.assignee = None;
            expired.push(ExpiredClaim {
                phase: phase.clone(),
                claim,
            });
        }
        expired
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
