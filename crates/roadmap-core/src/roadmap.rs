use crate::error::{Result, RoadmapError};
use crate::paths;
use crate::types::PhaseStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;

// ---------------------------------------------------------------------------
// Phase
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Phase {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
    pub status: PhaseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Phase {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            dependencies: Vec::new(),
            status: PhaseStatus::NotStarted,
            assignee: None,
            completed_at: None,
        }
    }

    pub fn with_dependencies<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = deps.into_iter().map(Into::into).collect();
        self
    }

    pub fn is_held_by(&self, agent: &str) -> bool {
        self.assignee.as_deref() == Some(agent)
    }
}

// ---------------------------------------------------------------------------
// Roadmap
// ---------------------------------------------------------------------------

/// The ordered set of phases and their dependency edges.
///
/// Every constructor validates the graph, so a `Roadmap` value always holds
/// unique, well-formed ids, known dependencies, and no cycles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Roadmap {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    phases: Vec<Phase>,
}

fn default_version() -> u32 {
    1
}

impl Default for Roadmap {
    fn default() -> Self {
        Self::new()
    }
}

impl Roadmap {
    pub fn new() -> Self {
        Self {
            version: 1,
            phases: Vec::new(),
        }
    }

    pub fn from_phases(phases: Vec<Phase>) -> Result<Self> {
        let roadmap = Self { version: 1, phases };
        roadmap.validate()?;
        Ok(roadmap)
    }

    /// Build a roadmap from phase definitions alone, deriving each initial
    /// status from whether its dependencies exist as complete phases.
    pub fn from_definitions<I>(defs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String, Vec<String>)>,
    {
        let mut roadmap = Self::new();
        let defs: Vec<_> = defs.into_iter().collect();
        for (id, name, deps) in &defs {
            paths::validate_phase_id(id)?;
            if roadmap.contains(id) {
                return Err(RoadmapError::Parse(format!("duplicate phase id '{id}'")));
            }
            roadmap
                .phases
                .push(Phase::new(id.clone(), name.clone()).with_dependencies(deps.clone()));
        }
        roadmap.validate()?;
        for phase in &mut roadmap.phases {
            if !phase.dependencies.is_empty() {
                phase.status = PhaseStatus::Blocked;
            }
        }
        Ok(roadmap)
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    pub fn parse(data: &str) -> Result<Self> {
        let roadmap: Roadmap =
            serde_yaml::from_str(data).map_err(|e| RoadmapError::Parse(e.to_string()))?;
        roadmap.validate()?;
        Ok(roadmap)
    }

    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::roadmap_path(root);
        if !path.exists() {
            return Err(RoadmapError::NotInitialized);
        }
        let data = std::fs::read_to_string(&path)?;
        Self::parse(&data).map_err(|e| match e {
            RoadmapError::Parse(msg) => RoadmapError::Parse(format!("{}: {msg}", path.display())),
            other => other,
        })
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::roadmap_path(root);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn all(&self) -> &[Phase] {
        &self.phases
    }

    pub fn len(&self) -> usize {
        self.phases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.phases.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.phases.iter().any(|p| p.id == id)
    }

    pub fn get(&self, id: &str) -> Result<&Phase> {
        self.phases
            .iter()
            .find(|p| p.id == id)
            .ok_or_else(|| RoadmapError::NotFound(id.to_string()))
    }

    pub(crate) fn get_mut(&mut self, id: &str) -> Result<&mut Phase> {
        self.phases
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| RoadmapError::NotFound(id.to_string()))
    }

    pub(crate) fn phases_mut(&mut self) -> &mut [Phase] {
        &mut self.phases
    }

    pub fn is_complete(&self, id: &str) -> bool {
        self.phases
            .iter()
            .any(|p| p.id == id && p.status == PhaseStatus::Complete)
    }

    /// Dependencies of `phase` that are not yet complete, in declaration order.
    pub fn incomplete_dependencies(&self, phase: &Phase) -> Vec<String> {
        phase
            .dependencies
            .iter()
            .filter(|dep| !self.is_complete(dep))
            .cloned()
            .collect()
    }

    /// Phases that list `id` as a dependency.
    pub fn dependents(&self, id: &str) -> Vec<&Phase> {
        self.phases
            .iter()
            .filter(|p| p.dependencies.iter().any(|d| d == id))
            .collect()
    }

    // -----------------------------------------------------------------------
    // Mutations
    // -----------------------------------------------------------------------

    /// Append a new phase. Its status starts as NotStarted when every
    /// dependency is already complete, otherwise Blocked.
    pub fn add_phase(
        &mut self,
        id: impl Into<String>,
        name: impl Into<String>,
        dependencies: Vec<String>,
    ) -> Result<&Phase> {
        let id = id.into();
        paths::validate_phase_id(&id)?;
        if self.contains(&id) {
            return Err(RoadmapError::PhaseExists(id));
        }
        let mut phase = Phase::new(id, name).with_dependencies(dependencies);
        if !self.incomplete_dependencies(&phase).is_empty() {
            phase.status = PhaseStatus::Blocked;
        }
        self.phases.push(phase);
        if let Err(e) = self.validate() {
            self.phases.pop();
            return Err(e);
        }
        Ok(&self.phases[self.phases.len() - 1])
    }

    /// Append fully-formed phases (statuses included) in one step. Nothing is
    /// kept if the combined graph fails validation.
    pub fn extend(&mut self, phases: Vec<Phase>) -> Result<()> {
        let before = self.phases.len();
        for phase in phases {
            if self.contains(&phase.id) {
                self.phases.truncate(before);
                return Err(RoadmapError::PhaseExists(phase.id));
            }
            self.phases.push(phase);
        }
        if let Err(e) = self.validate() {
            self.phases.truncate(before);
            return Err(e);
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for phase in &self.phases {
            paths::validate_phase_id(&phase.id)
                .map_err(|_| RoadmapError::Parse(format!("invalid phase id '{}'", phase.id)))?;
            if !seen.insert(phase.id.as_str()) {
                return Err(RoadmapError::Parse(format!(
                    "duplicate phase id '{}'",
                    phase.id
                )));
            }
        }

        for phase in &self.phases {
            let mut deps = HashSet::new();
            for dep in &phase.dependencies {
                if dep == &phase.id {
                    return Err(RoadmapError::Parse(format!(
                        "phase '{}' depends on itself",
                        phase.id
                    )));
                }
                if !seen.contains(dep.as_str()) {
                    return Err(RoadmapError::Parse(format!(
                        "phase '{}' depends on unknown phase '{dep}'",
                        phase.id
                    )));
                }
                if !deps.insert(dep.as_str()) {
                    return Err(RoadmapError::Parse(format!(
                        "phase '{}' lists dependency '{dep}' twice",
                        phase.id
                    )));
                }
            }
        }

        if let Some(cycle) = find_cycle(&self.phases) {
            return Err(RoadmapError::Parse(format!(
                "dependency cycle: {}",
                cycle.join(" -> ")
            )));
        }

        for phase in &self.phases {
            self.validate_status(phase)?;
        }
        Ok(())
    }

    fn validate_status(&self, phase: &Phase) -> Result<()> {
        let assignee = phase.assignee.as_deref().filter(|a| !a.trim().is_empty());
        match phase.status {
            PhaseStatus::InProgress if assignee.is_none() => Err(RoadmapError::Parse(format!(
                "phase '{}' is in progress without an assignee",
                phase.id
            ))),
            PhaseStatus::InProgress if !self.incomplete_dependencies(phase).is_empty() => {
                Err(RoadmapError::Parse(format!(
                    "phase '{}' is in progress but depends on incomplete: {}",
                    phase.id,
                    self.incomplete_dependencies(phase).join(", ")
                )))
            }
            PhaseStatus::Complete if phase.completed_at.is_none() => {
                Err(RoadmapError::Parse(format!(
                    "phase '{}' is complete without completed_at",
                    phase.id
                )))
            }
            PhaseStatus::Complete if !self.incomplete_dependencies(phase).is_empty() => {
                Err(RoadmapError::Parse(format!(
                    "phase '{}' is complete but depends on incomplete: {}",
                    phase.id,
                    self.incomplete_dependencies(phase).join(", ")
                )))
            }
            PhaseStatus::NotStarted | PhaseStatus::Blocked if phase.assignee.is_some() => {
                Err(RoadmapError::Parse(format!(
                    "phase '{}' is {} but has an assignee",
                    phase.id, phase.status
                )))
            }
            status if status != PhaseStatus::Complete && phase.completed_at.is_some() => {
                Err(RoadmapError::Parse(format!(
                    "phase '{}' is {} but has completed_at",
                    phase.id, phase.status
                )))
            }
            _ => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// Cycle detection
// ---------------------------------------------------------------------------

/// Depth-first search keeping the ids on the current path in `visiting`.
/// Reaching a node that is still on the path closes a cycle, which is
/// returned as the path from that node back to itself.
fn find_cycle(phases: &[Phase]) -> Option<Vec<String>> {
    let index: HashMap<&str, &Phase> = phases.iter().map(|p| (p.id.as_str(), p)).collect();
    let mut visiting = HashSet::new();
    let mut done = HashSet::new();
    let mut stack = Vec::new();

    for phase in phases {
        if let Some(cycle) = visit(&phase.id, &index, &mut visiting, &mut done, &mut stack) {
            return Some(cycle);
        }
    }
    None
}

fn visit<'a>(
    id: &'a str,
    index: &HashMap<&'a str, &'a Phase>,
    visiting: &mut HashSet<&'a str>,
    done: &mut HashSet<&'a str>,
    stack: &mut Vec<&'a str>,
) -> Option<Vec<String>> {
    if done.contains(id) {
        return None;
    }
    if visiting.contains(id) {
        let start = stack.iter().position(|s| *s == id).unwrap_or(0);
        let mut cycle: Vec<String> = stack[start..].iter().map(|s| s.to_string()).collect();
        cycle.push(id.to_string());
        return Some(cycle);
    }

    visiting.insert(id);
    stack.push(id);
    if let Some(phase) = index.get(id).copied() {
        for dep in &phase.dependencies {
            if let Some(cycle) = visit(dep.as_str(), index, visiting, done, stack) {
                return Some(cycle);
            }
        }
    }
    stack.pop();
    visiting.remove(id);
    done.insert(id);
    None
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
