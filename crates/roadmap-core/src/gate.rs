//! Dependency gate: which phases may be claimed right now.

use crate::roadmap::{Phase, Roadmap};
use crate::types::PhaseStatus;

/// Phases that are NotStarted and whose dependencies are all Complete, in
/// roadmap order.
pub fn unblocked(roadmap: &Roadmap) -> Vec<&Phase> {
    roadmap
        .all()
        .iter()
        .filter(|p| p.status == PhaseStatus::NotStarted && dependencies_satisfied(roadmap, p))
        .collect()
}

pub fn dependencies_satisfied(roadmap: &Roadmap, phase: &Phase) -> bool {
    phase.dependencies.iter().all(|dep| roadmap.is_complete(dep))
}

/// Move every Blocked phase whose dependencies are now satisfied back to
/// NotStarted. Never blocks a phase. Returns the ids that changed.
pub fn recompute_blocked_status(roadmap: &mut Roadmap) -> Vec<String> {
    let ready: Vec<String> = roadmap
        .all()
        .iter()
        .filter(|p| p.status == PhaseStatus::Blocked && dependencies_satisfied(roadmap, p))
        .map(|p| p.id.clone())
        .collect();

    for phase in roadmap.phases_mut() {
        if ready.contains(&phase.id) {
            phase.status = PhaseStatus::NotStarted;
        }
    }
    ready
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn abc() -> Roadmap {
        Roadmap::from_definitions([
            ("A".to_string(), "A".to_string(), vec![]),
            ("B".to_string(), "B".to_string(), vec!["A".to_string()]),
            (
                "C".to_string(),
                "C".to_string(),
                vec!["A".to_string(), "B".to_string()],
            ),
        ])
        .unwrap()
    }

    fn mark_complete(roadmap: &mut Roadmap, id: &str) {
        let phase = roadmap.get_mut(id).unwrap();
        phase.status = PhaseStatus::Complete;
        phase.assignee = Some("agent".into());
        phase.completed_at = Some(Utc::now());
    }

    fn ids(phases: &[&Phase]) -> Vec<String> {
        phases.iter().map(|p| p.id.clone()).collect()
    }

    #[test]
    fn only_roots_unblocked_initially() {
        let roadmap = abc();
        assert_eq!(ids(&unblocked(&roadmap)), ["A"]);
    }

    #[test]
    fn gardening_unblocks_dependents_one_level_at_a_time() {
        let mut roadmap = abc();
        mark_complete(&mut roadmap, "A");
        assert!(unblocked(&roadmap).is_empty(), "B is still marked blocked");

        assert_eq!(recompute_blocked_status(&mut roadmap), ["B"]);
        assert_eq!(ids(&unblocked(&roadmap)), ["B"]);
        assert_eq!(roadmap.get("C").unwrap().status, PhaseStatus::Blocked);
    }

    #[test]
    fn gardening_never_blocks() {
        let mut roadmap = abc();
        // A hand-edited NotStarted phase with incomplete deps stays NotStarted,
        // but the gate still refuses it.
        roadmap.get_mut("C").unwrap().status = PhaseStatus::NotStarted;
        assert!(recompute_blocked_status(&mut roadmap).is_empty());
        assert_eq!(roadmap.get("C").unwrap().status, PhaseStatus::NotStarted);
        assert_eq!(ids(&unblocked(&roadmap)), ["A"]);
    }

    #[test]
    fn unblocked_never_contains_incomplete_dependencies() {
        // Exhaustively try every status assignment over a small diamond.
        let statuses = PhaseStatus::all();
        for a in statuses {
            for b in statuses {
                for c in statuses {
                    let mut roadmap = Roadmap::from_definitions([
                        ("a".to_string(), "a".to_string(), vec![]),
                        ("b".to_string(), "b".to_string(), vec!["a".to_string()]),
                        ("c".to_string(), "c".to_string(), vec!["a".to_string()]),
                        (
                            "d".to_string(),
                            "d".to_string(),
                            vec!["b".to_string(), "c".to_string()],
                        ),
                    ])
                    .unwrap();
                    for (id, status) in [("a", a), ("b", b), ("c", c)] {
                        roadmap.get_mut(id).unwrap().status = *status;
                    }
                    roadmap.get_mut("d").unwrap().status = PhaseStatus::NotStarted;
                    recompute_blocked_status(&mut roadmap);
                    for phase in unblocked(&roadmap) {
                        assert!(
                            roadmap.incomplete_dependencies(phase).is_empty(),
                            "{} unblocked with incomplete deps",
                            phase.id
                        );
                    }
                }
            }
        }
    }
}
