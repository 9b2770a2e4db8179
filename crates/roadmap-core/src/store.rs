//! Transactional access to a `.roadmap/` directory.
//!
//! Every mutation runs as one transaction:
//!
//! 1. acquire `.roadmap/roadmap.lock`
//! 2. load `roadmap.yaml` and `claims.yaml`, repair any drift between them
//! 3. apply the operation to an in-memory [`ClaimRegistry`]
//! 4. write `claims.yaml`, then `roadmap.yaml` (the commit point)
//! 5. append audit events, refresh the markdown projection, unlock
//!
//! A crash between the two writes leaves a claim ledger that disagrees with
//! the roadmap; step 2 of the next transaction repairs it.

use crate::audit::{self, AuditAction, AuditEvent};
use crate::config::Config;
use crate::error::Result;
use crate::gate;
use crate::io;
use crate::lock::StoreLock;
use crate::paths;
use crate::registry::{ClaimBook, ClaimRecord, ClaimRegistry, Completion, ExpiredClaim};
use crate::render::{self, ImportReport};
use crate::roadmap::{Phase, Roadmap};
use crate::sync::{self, CompletionSignal, Correction};
use chrono::{DateTime, Duration, Utc};
use std::path::{Path, PathBuf};

/// What a transaction is about, used to audit it when it fails.
struct Intent<'a> {
    action: AuditAction,
    phase: Option<&'a str>,
    agent: Option<&'a str>,
}

impl<'a> Intent<'a> {
    fn new(action: AuditAction) -> Self {
        Self {
            action,
            phase: None,
            agent: None,
        }
    }

    fn phase(mut self, phase: &'a str) -> Self {
        self.phase = Some(phase);
        self
    }

    fn agent(mut self, agent: &'a str) -> Self {
        self.agent = Some(agent);
        self
    }

    fn event(&self, now: DateTime<Utc>) -> AuditEvent {
        let mut event = AuditEvent::new(self.action, now);
        if let Some(p) = self.phase {
            event = event.phase(p);
        }
        if let Some(a) = self.agent {
            event = event.agent(a);
        }
        event
    }
}

/// State handed to an operation while the lock is held.
struct Txn {
    registry: ClaimRegistry,
    events: Vec<AuditEvent>,
    repairs: Vec<Correction>,
    now: DateTime<Utc>,
}

impl Txn {
    fn record(&mut self, event: AuditEvent) {
        self.events.push(event);
    }

    fn record_expired(&mut self, expired: &[ExpiredClaim]) {
        for e in expired {
            tracing::warn!(
                phase = %e.claim.phase_id,
                agent = %e.claim.agent_id,
                claimed_at = %e.claim.claimed_at,
                "lease expired, phase released"
            );
            let event = AuditEvent::new(AuditAction::Expire, self.now)
                .phase(&e.claim.phase_id)
                .agent(&e.claim.agent_id)
                .detail(format!("claimed at {}", e.claim.claimed_at.to_rfc3339()));
            self.record(event);
        }
    }

    fn record_repairs(&mut self, repairs: Vec<Correction>) {
        for c in &repairs {
            tracing::warn!(phase = %c.phase_id(), "{}", c.describe());
            let event = AuditEvent::new(AuditAction::Repair, self.now)
                .phase(c.phase_id())
                .detail(c.describe());
            self.record(event);
        }
        self.repairs.extend(repairs);
    }
}

#[derive(Debug, Clone)]
pub struct Store {
    root: PathBuf,
    config: Config,
}

impl Store {
    /// Create `.roadmap/` with a default config and empty state files.
    /// Existing files are left alone.
    pub fn init(root: &Path, project_name: &str) -> Result<Self> {
        io::ensure_dir(&paths::roadmap_dir(root))?;
        let config = Config::new(project_name);
        io::write_if_missing(
            &paths::config_path(root),
            serde_yaml::to_string(&config)?.as_bytes(),
        )?;
        io::write_if_missing(
            &paths::roadmap_path(root),
            serde_yaml::to_string(&Roadmap::new())?.as_bytes(),
        )?;
        io::write_if_missing(
            &paths::claims_path(root),
            serde_yaml::to_string(&ClaimBook::new())?.as_bytes(),
        )?;
        Self::open(root)
    }

    pub fn open(root: &Path) -> Result<Self> {
        let config = Config::load(root)?;
        Ok(Self {
            root: root.to_path_buf(),
            config,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn lease(&self) -> Duration {
        self.config.lease.duration()
    }

    // -----------------------------------------------------------------------
    // Lock-free reads
    // -----------------------------------------------------------------------

    pub fn roadmap(&self) -> Result<Roadmap> {
        Roadmap::load(&self.root)
    }

    pub fn claims(&self) -> Result<ClaimBook> {
        ClaimBook::load(&self.root)
    }

    pub fn unblocked(&self) -> Result<Vec<Phase>> {
        let roadmap = self.roadmap()?;
        Ok(gate::unblocked(&roadmap).into_iter().cloned().collect())
    }

    pub fn audit_log(&self) -> Result<Vec<AuditEvent>> {
        audit::read(&self.root)
    }

    // -----------------------------------------------------------------------
    // Mutations
    // -----------------------------------------------------------------------

    pub fn add_phase(&self, id: &str, name: &str, dependencies: Vec<String>) -> Result<Phase> {
        self.transact(None, Intent::new(AuditAction::AddPhase).phase(id), |txn| {
            let phase = txn
                .registry
                .roadmap_mut()
                .add_phase(id, name, dependencies)?
                .clone();
            tracing::info!(phase = %phase.id, status = %phase.status, "phase added");
            let event = AuditEvent::new(AuditAction::AddPhase, txn.now)
                .phase(&phase.id)
                .detail(phase.name.clone());
            txn.record(event);
            Ok(phase)
        })
    }

    /// Merge a markdown roadmap into the stored one.
    pub fn import_markdown(&self, text: &str) -> Result<ImportReport> {
        self.transact(None, Intent::new(AuditAction::Import), |txn| {
            let phases = render::parse_markdown(text, txn.now)?;
            let report = render::import(txn.registry.roadmap_mut(), phases)?;
            // Imported in-progress phases need claim records of their own.
            for c in sync::repair(&mut txn.registry, txn.now, Some(self.lease())) {
                if let Correction::ClaimRestored { phase_id, agent_id } = c {
                    let event = AuditEvent::new(AuditAction::Claim, txn.now)
                        .phase(phase_id)
                        .agent(agent_id)
                        .detail("imported in progress");
                    txn.record(event);
                }
            }
            tracing::info!(
                added = report.added.len(),
                skipped = report.skipped.len(),
                "markdown imported"
            );
            let event = AuditEvent::new(AuditAction::Import, txn.now).detail(format!(
                "added {}, skipped {}",
                report.added.len(),
                report.skipped.len()
            ));
            txn.record(event);
            Ok(report)
        })
    }

    pub fn claim(&self, phase_id: &str, agent_id: &str) -> Result<ClaimRecord> {
        let intent = Intent::new(AuditAction::Claim).phase(phase_id).agent(agent_id);
        self.transact(Some(agent_id), intent, |txn| {
            self.expire_before_claim(txn);
            let record = txn
                .registry
                .claim(phase_id, agent_id, txn.now, Some(self.lease()))?;
            self.record_claim(txn, &record);
            Ok(record)
        })
    }

    /// Claim the first unblocked phase in roadmap order.
    pub fn claim_next(&self, agent_id: &str) -> Result<ClaimRecord> {
        let intent = Intent::new(AuditAction::Claim).agent(agent_id);
        self.transact(Some(agent_id), intent, |txn| {
            self.expire_before_claim(txn);
            let record = txn
                .registry
                .claim_next(agent_id, txn.now, Some(self.lease()))?;
            self.record_claim(txn, &record);
            Ok(record)
        })
    }

    pub fn release(&self, phase_id: &str, agent_id: &str) -> Result<()> {
        let intent = Intent::new(AuditAction::Release).phase(phase_id).agent(agent_id);
        self.transact(Some(agent_id), intent, |txn| {
            txn.registry.release(phase_id, agent_id)?;
            tracing::info!(phase = %phase_id, agent = %agent_id, "phase released");
            let event = AuditEvent::new(AuditAction::Release, txn.now)
                .phase(phase_id)
                .agent(agent_id);
            txn.record(event);
            Ok(())
        })
    }

    pub fn complete(&self, phase_id: &str, agent_id: &str) -> Result<Completion> {
        let intent = Intent::new(AuditAction::Complete).phase(phase_id).agent(agent_id);
        self.transact(Some(agent_id), intent, |txn| {
            let done = txn.registry.complete(phase_id, agent_id, txn.now)?;
            if done.already_complete {
                tracing::debug!(phase = %phase_id, "phase already complete");
                let event = AuditEvent::new(AuditAction::Complete, txn.now)
                    .phase(phase_id)
                    .agent(agent_id)
                    .detail("already complete");
                txn.record(event);
                return Ok(done);
            }
            tracing::info!(phase = %phase_id, agent = %agent_id, "phase completed");
            let event = AuditEvent::new(AuditAction::Complete, txn.now)
                .phase(phase_id)
                .agent(agent_id);
            txn.record(event);
            for id in &done.unblocked {
                tracing::info!(phase = %id, "phase unblocked");
                let event = AuditEvent::new(AuditAction::Garden, txn.now)
                    .phase(id)
                    .detail(format!("unblocked by {phase_id}"));
                txn.record(event);
            }
            Ok(done)
        })
    }

    /// Force-release claims older than `lease`, or the configured lease.
    pub fn expire(&self, lease: Option<Duration>) -> Result<Vec<ExpiredClaim>> {
        let lease = lease.unwrap_or_else(|| self.lease());
        self.transact(None, Intent::new(AuditAction::Expire), |txn| {
            let expired = txn.registry.expire_stale_claims(txn.now, lease);
            txn.record_expired(&expired);
            Ok(expired)
        })
    }

    /// Move Blocked phases whose dependencies are satisfied to NotStarted.
    pub fn garden(&self) -> Result<Vec<String>> {
        self.transact(None, Intent::new(AuditAction::Garden), |txn| {
            let changed = gate::recompute_blocked_status(txn.registry.roadmap_mut());
            for id in &changed {
                tracing::info!(phase = %id, "phase unblocked");
                let event = AuditEvent::new(AuditAction::Garden, txn.now).phase(id);
                txn.record(event);
            }
            Ok(changed)
        })
    }

    /// Apply external completion signals. Conflicts are returned, not raised;
    /// the caller decides how to surface them.
    pub fn reconcile(&self, signals: &[CompletionSignal]) -> Result<Vec<Correction>> {
        self.transact(None, Intent::new(AuditAction::Correction), |txn| {
            let corrections = sync::reconcile(&mut txn.registry, signals, txn.now)?;
            for c in &corrections {
                let mut event = AuditEvent::new(AuditAction::Correction, txn.now)
                    .phase(c.phase_id())
                    .detail(c.describe());
                if c.is_conflict() {
                    tracing::error!(phase = %c.phase_id(), "{}", c.describe());
                    event.action = AuditAction::Conflict;
                    event = event.outcome("conflict");
                } else {
                    tracing::info!(phase = %c.phase_id(), "{}", c.describe());
                }
                txn.record(event);
            }
            Ok(corrections)
        })
    }

    /// Run the drift repair that every transaction starts with, and report it.
    pub fn repair(&self) -> Result<Vec<Correction>> {
        self.transact(None, Intent::new(AuditAction::Repair), |txn| {
            Ok(txn.repairs.clone())
        })
    }

    // -----------------------------------------------------------------------
    // Transaction plumbing
    // -----------------------------------------------------------------------

    fn expire_before_claim(&self, txn: &mut Txn) {
        if self.config.lease.expire_on_claim {
            let expired = txn.registry.expire_stale_claims(txn.now, self.lease());
            txn.record_expired(&expired);
        }
    }

    fn record_claim(&self, txn: &mut Txn, record: &ClaimRecord) {
        tracing::info!(
            phase = %record.phase_id,
            agent = %record.agent_id,
            claim_id = %record.claim_id,
            "phase claimed"
        );
        let event = AuditEvent::new(AuditAction::Claim, txn.now)
            .phase(&record.phase_id)
            .agent(&record.agent_id)
            .detail(format!("claim {}", record.claim_id));
        txn.record(event);
    }

    /// Run `op` under the store lock. State is written whenever it changed,
    /// even when `op` fails, so repairs and expiries done on the way are kept.
    fn transact<T, F>(&self, holder: Option<&str>, intent: Intent<'_>, op: F) -> Result<T>
    where
        F: FnOnce(&mut Txn) -> Result<T>,
    {
        let lock = StoreLock::acquire(
            &paths::lock_path(&self.root),
            holder,
            self.config.lock.options(),
        )?;

        let roadmap = Roadmap::load(&self.root)?;
        let claims = ClaimBook::load(&self.root)?;
        let before = (roadmap.all().to_vec(), claims.all().to_vec());

        let now = Utc::now();
        let mut txn = Txn {
            registry: ClaimRegistry::new(roadmap, claims),
            events: Vec::new(),
            repairs: Vec::new(),
            now,
        };
        let repairs = sync::repair(&mut txn.registry, now, Some(self.lease()));
        txn.record_repairs(repairs);

        let result = op(&mut txn);
        if let Err(err) = &result {
            tracing::debug!(action = %intent.action, error = %err, "operation refused");
            txn.events.push(intent.event(now).failed(err));
        }

        let (roadmap, claims) = txn.registry.into_parts();
        let changed = before.0 != roadmap.all() || before.1 != claims.all();
        if changed {
            claims.save(&self.root)?;
            roadmap.save(&self.root)?;
        }
        audit::append(&self.root, &txn.events)?;

        if changed {
            if let Some(path) = self.config.projection_path(&self.root) {
                if let Err(e) = render::write_projection(&path, &roadmap, &self.config.project.name)
                {
                    tracing::warn!(path = %path.display(), error = %e, "projection not refreshed");
                }
            }
        }

        if let Err(e) = lock.release() {
            tracing::warn!(error = %e, "failed to remove store lock");
        }
        result
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
