#![allow(deprecated)]
use assert_cmd::Command;
use predicates::prelude::*;
use std::process::Stdio;
use tempfile::TempDir;

fn roadmap(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("roadmap").unwrap();
    cmd.current_dir(dir.path())
        .env("ROADMAP_ROOT", dir.path())
        .env_remove("ROADMAP_AGENT")
        .env_remove("RUST_LOG");
    cmd
}

fn init_project(dir: &TempDir) {
    roadmap(dir).arg("init").assert().success();
}

/// A -> B -> C, with C also depending on A.
fn init_abc(dir: &TempDir) {
    init_project(dir);
    roadmap(dir)
        .args(["phase", "add", "A", "Foundation"])
        .assert()
        .success();
    roadmap(dir)
        .args(["phase", "add", "B", "Build", "--after", "A"])
        .assert()
        .success();
    roadmap(dir)
        .args(["phase", "add", "C", "Ship", "--after", "A,B"])
        .assert()
        .success();
}

fn unblocked_ids(dir: &TempDir) -> Vec<String> {
    let output = roadmap(dir)
        .args(["unblocked", "--json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let json: serde_json::Value = serde_json::from_slice(&output).unwrap();
    json.as_array()
        .unwrap()
        .iter()
        .map(|p| p["id"].as_str().unwrap().to_string())
        .collect()
}

// ---------------------------------------------------------------------------
// roadmap init
// ---------------------------------------------------------------------------

#[test]
fn init_creates_state_files() {
    let dir = TempDir::new().unwrap();
    roadmap(&dir).arg("init").assert().success();

    assert!(dir.path().join(".roadmap").is_dir());
    assert!(dir.path().join(".roadmap/config.yaml").exists());
    assert!(dir.path().join(".roadmap/roadmap.yaml").exists());
    assert!(dir.path().join(".roadmap/claims.yaml").exists());
}

#[test]
fn init_is_idempotent() {
    let dir = TempDir::new().unwrap();
    init_abc(&dir);
    roadmap(&dir).arg("init").assert().success();
    assert_eq!(unblocked_ids(&dir), ["A"]);
}

#[test]
fn commands_before_init_are_caller_errors() {
    let dir = TempDir::new().unwrap();
    roadmap(&dir)
        .args(["claim", "A", "--agent", "a1"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("roadmap init"));
}

// ---------------------------------------------------------------------------
// phase add / list / show
// ---------------------------------------------------------------------------

#[test]
fn phase_add_derives_blocked_status() {
    let dir = TempDir::new().unwrap();
    init_abc(&dir);

    roadmap(&dir)
        .args(["phase", "list", "--status", "blocked"])
        .assert()
        .success()
        .stdout(predicate::str::contains("B"))
        .stdout(predicate::str::contains("Ship"));
}

#[test]
fn phase_add_rejects_cycles_and_unknown_dependencies() {
    let dir = TempDir::new().unwrap();
    init_abc(&dir);

    roadmap(&dir)
        .args(["phase", "add", "D", "Docs", "--after", "Z"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("unknown phase 'Z'"));
    roadmap(&dir)
        .args(["phase", "add", "A", "Again"])
        .assert()
        .code(2);
}

#[test]
fn phase_show_lists_waiting_dependencies() {
    let dir = TempDir::new().unwrap();
    init_abc(&dir);

    roadmap(&dir)
        .args(["phase", "show", "C"])
        .assert()
        .success()
        .stdout(predicate::str::contains("waiting on: A, B"));
    roadmap(&dir).args(["phase", "show", "Z"]).assert().code(2);
}

#[test]
fn hand_edited_cycle_is_a_parse_error() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    std::fs::write(
        dir.path().join(".roadmap/roadmap.yaml"),
        "phases:\n- id: A\n  name: A\n  dependencies: [B]\n  status: blocked\n- id: B\n  name: B\n  dependencies: [A]\n  status: blocked\n",
    )
    .unwrap();

    roadmap(&dir)
        .arg("unblocked")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("dependency cycle"));
}

// ---------------------------------------------------------------------------
// claim / release / complete
// ---------------------------------------------------------------------------

#[test]
fn abc_flow() {
    let dir = TempDir::new().unwrap();
    init_abc(&dir);
    assert_eq!(unblocked_ids(&dir), ["A"]);

    roadmap(&dir)
        .args(["claim", "A", "--agent", "agent1"])
        .assert()
        .success();
    roadmap(&dir)
        .args(["complete", "A", "--agent", "agent1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Unblocked: B"));
    assert_eq!(unblocked_ids(&dir), ["B"]);

    roadmap(&dir)
        .args(["claim", "B", "--agent", "agent2"])
        .assert()
        .success();
    roadmap(&dir)
        .args(["complete", "B", "--agent", "agent2"])
        .assert()
        .success();
    assert_eq!(unblocked_ids(&dir), ["C"]);
}

#[test]
fn contention_exits_with_three() {
    let dir = TempDir::new().unwrap();
    init_abc(&dir);

    roadmap(&dir)
        .args(["claim", "B", "--agent", "agent1"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("blocked by: A"));

    roadmap(&dir)
        .args(["claim", "A", "--agent", "agent1"])
        .assert()
        .success();
    roadmap(&dir)
        .args(["claim", "A", "--agent", "agent2"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("already claimed by 'agent1'"));
}

#[test]
fn release_by_non_owner_exits_with_two() {
    let dir = TempDir::new().unwrap();
    init_abc(&dir);
    roadmap(&dir)
        .args(["claim", "A", "--agent", "agent1"])
        .assert()
        .success();

    roadmap(&dir)
        .args(["release", "A", "--agent", "intruder"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("does not hold"));
    roadmap(&dir)
        .args(["release", "A", "--agent", "agent1"])
        .assert()
        .success();
    assert_eq!(unblocked_ids(&dir), ["A"]);
}

#[test]
fn agent_comes_from_environment() {
    let dir = TempDir::new().unwrap();
    init_abc(&dir);

    roadmap(&dir)
        .args(["next", "--json"])
        .env("ROADMAP_AGENT", "env-agent")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"agent_id\": \"env-agent\""));
    roadmap(&dir).args(["claim", "B"]).assert().code(2);
}

#[test]
fn complete_is_idempotent() {
    let dir = TempDir::new().unwrap();
    init_abc(&dir);
    roadmap(&dir)
        .args(["claim", "A", "--agent", "agent1"])
        .assert()
        .success();
    roadmap(&dir)
        .args(["complete", "A", "--agent", "agent1"])
        .assert()
        .success();
    roadmap(&dir)
        .args(["complete", "A", "--agent", "agent1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("already complete"));

    let output = roadmap(&dir)
        .args(["audit", "--phase", "A", "--json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let events: serde_json::Value = serde_json::from_slice(&output).unwrap();
    let completes = events
        .as_array()
        .unwrap()
        .iter()
        .filter(|e| e["action"] == "complete")
        .count();
    assert_eq!(completes, 2);
}

#[test]
fn next_with_nothing_left_is_contention() {
    let dir = TempDir::new().unwrap();
    init_abc(&dir);
    roadmap(&dir)
        .args(["next", "--agent", "agent1"])
        .assert()
        .success();
    roadmap(&dir)
        .args(["next", "--agent", "agent2"])
        .assert()
        .code(3);
}

#[test]
fn concurrent_processes_claim_exactly_once() {
    const AGENTS: usize = 6;
    let dir = TempDir::new().unwrap();
    init_abc(&dir);
    let bin = assert_cmd::cargo::cargo_bin("roadmap");

    let children: Vec<_> = (0..AGENTS)
        .map(|i| {
            std::process::Command::new(&bin)
                .args(["claim", "A", "--agent", &format!("agent{i}")])
                .env("ROADMAP_ROOT", dir.path())
                .env_remove("ROADMAP_AGENT")
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .spawn()
                .unwrap()
        })
        .collect();

    let mut codes: Vec<i32> = children
        .into_iter()
        .map(|mut c| c.wait().unwrap().code().unwrap())
        .collect();
    codes.sort();

    let mut expected = vec![0];
    expected.extend(std::iter::repeat(3).take(AGENTS - 1));
    assert_eq!(codes, expected);
}

// ---------------------------------------------------------------------------
// expire / garden / repair
// ---------------------------------------------------------------------------

#[test]
fn expire_with_zero_lease_frees_the_phase() {
    let dir = TempDir::new().unwrap();
    init_abc(&dir);
    roadmap(&dir)
        .args(["claim", "A", "--agent", "agent1"])
        .assert()
        .success();
    std::thread::sleep(std::time::Duration::from_millis(20));

    roadmap(&dir)
        .args(["expire", "--lease-minutes", "0"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Expired A (held by agent1"));
    roadmap(&dir)
        .args(["claim", "A", "--agent", "agent2"])
        .assert()
        .success();
}

#[test]
fn garden_unblocks_after_hand_edit() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    std::fs::write(
        dir.path().join(".roadmap/roadmap.yaml"),
        "phases:\n- id: A\n  name: A\n  status: complete\n  completed_at: 2026-01-01T00:00:00Z\n- id: B\n  name: B\n  dependencies: [A]\n  status: blocked\n",
    )
    .unwrap();

    roadmap(&dir)
        .arg("garden")
        .assert()
        .success()
        .stdout(predicate::str::contains("Unblocked: B"));
    assert_eq!(unblocked_ids(&dir), ["B"]);
}

#[test]
fn repair_restores_lost_claim_record() {
    let dir = TempDir::new().unwrap();
    init_abc(&dir);
    roadmap(&dir)
        .args(["claim", "A", "--agent", "agent1"])
        .assert()
        .success();
    std::fs::write(dir.path().join(".roadmap/claims.yaml"), "claims: []\n").unwrap();

    roadmap(&dir)
        .arg("repair")
        .assert()
        .success()
        .stdout(predicate::str::contains("restored claim record for agent1"));
    roadmap(&dir)
        .arg("repair")
        .assert()
        .success()
        .stdout(predicate::str::contains("agree"));
}

// ---------------------------------------------------------------------------
// reconcile
// ---------------------------------------------------------------------------

#[test]
fn reconcile_completes_lagging_phase() {
    let dir = TempDir::new().unwrap();
    init_abc(&dir);
    roadmap(&dir)
        .args(["claim", "A", "--agent", "agent1"])
        .assert()
        .success();

    roadmap(&dir)
        .args(["reconcile", "--phase", "A", "--agent", "agent1", "--source", "commit 1a2b"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[fixed] A"));
    assert_eq!(unblocked_ids(&dir), ["B"]);
}

#[test]
fn reconcile_conflict_is_integrity_error() {
    let dir = TempDir::new().unwrap();
    init_abc(&dir);
    roadmap(&dir)
        .args(["claim", "A", "--agent", "agent1"])
        .assert()
        .success();

    roadmap(&dir)
        .args(["reconcile", "--phase", "A", "--agent", "agent2"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("[CONFLICT] A"))
        .stderr(predicate::str::contains("conflict on phase 'A'"));

    roadmap(&dir)
        .args(["audit", "--phase", "A"])
        .assert()
        .success()
        .stdout(predicate::str::contains("conflict"));
}

#[test]
fn reconcile_reads_signal_file() {
    let dir = TempDir::new().unwrap();
    init_abc(&dir);
    let signals = dir.path().join("signals.jsonl");
    std::fs::write(
        &signals,
        "# nightly sweep\n{\"phase_id\":\"A\",\"agent_id\":\"agent1\"}\n{\"phase_id\":\"B\",\"agent_id\":\"agent1\"}\n",
    )
    .unwrap();

    roadmap(&dir)
        .args(["reconcile", "--file"])
        .arg(&signals)
        .assert()
        .success();
    assert_eq!(unblocked_ids(&dir), ["C"]);
}

#[test]
fn reconcile_requires_a_signal() {
    let dir = TempDir::new().unwrap();
    init_abc(&dir);
    roadmap(&dir).arg("reconcile").assert().code(2);
}

// ---------------------------------------------------------------------------
// audit / render / import / config
// ---------------------------------------------------------------------------

#[test]
fn audit_records_refused_claims() {
    let dir = TempDir::new().unwrap();
    init_abc(&dir);
    roadmap(&dir)
        .args(["claim", "A", "--agent", "agent1"])
        .assert()
        .success();
    roadmap(&dir)
        .args(["claim", "A", "--agent", "agent2"])
        .assert()
        .code(3);

    let output = roadmap(&dir)
        .args(["audit", "--limit", "2", "--json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let events: serde_json::Value = serde_json::from_slice(&output).unwrap();
    let events = events.as_array().unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0]["outcome"], "ok");
    assert_eq!(events[1]["outcome"], "already_claimed");
    assert_eq!(events[1]["agent_id"], "agent2");
}

#[test]
fn render_then_import_into_fresh_project() {
    let dir = TempDir::new().unwrap();
    init_abc(&dir);
    roadmap(&dir)
        .args(["claim", "A", "--agent", "agent1"])
        .assert()
        .success();

    let md = dir.path().join("plan.md");
    roadmap(&dir)
        .args(["render", "--output"])
        .arg(&md)
        .assert()
        .success();
    let text = std::fs::read_to_string(&md).unwrap();
    assert!(text.contains("- 🔄 **A** Foundation [@agent1]"));
    assert!(text.contains("- 🚫 **C** Ship (after A, B)"));

    let other = TempDir::new().unwrap();
    init_project(&other);
    roadmap(&other)
        .arg("import")
        .arg(&md)
        .assert()
        .success()
        .stdout(predicate::str::contains("Imported 3 phase(s)"));
    roadmap(&other)
        .args(["claim", "A", "--agent", "agent2"])
        .assert()
        .code(3);
}

#[test]
fn projection_follows_transitions() {
    let dir = TempDir::new().unwrap();
    roadmap(&dir)
        .args(["init", "--projection", "ROADMAP.md"])
        .assert()
        .success();
    roadmap(&dir)
        .args(["phase", "add", "A", "Foundation"])
        .assert()
        .success();
    roadmap(&dir)
        .args(["claim", "A", "--agent", "agent1"])
        .assert()
        .success();

    let text = std::fs::read_to_string(dir.path().join("ROADMAP.md")).unwrap();
    assert!(text.contains("<!-- roadmap:start -->"));
    assert!(text.contains("- 🔄 **A** Foundation [@agent1]"));
}

#[test]
fn projection_into_existing_readme_keeps_its_text() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("README.md"), "# Project\n\nhand-written docs\n").unwrap();
    roadmap(&dir)
        .args(["init", "--projection", "README.md"])
        .assert()
        .success();
    roadmap(&dir)
        .args(["phase", "add", "A", "Foundation"])
        .assert()
        .success();

    let text = std::fs::read_to_string(dir.path().join("README.md")).unwrap();
    assert!(text.starts_with("# Project\n\nhand-written docs\n"));
    assert_eq!(text.matches("<!-- roadmap:start -->").count(), 1);
    assert!(text.contains("- ⬜ **A** Foundation"));
}

#[test]
fn init_projection_defaults_to_roadmap_md() {
    let dir = TempDir::new().unwrap();
    roadmap(&dir)
        .args(["init", "--projection"])
        .assert()
        .success();
    assert!(dir.path().join("ROADMAP.md").exists());
}

#[test]
fn config_validate_flags_zero_lease() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    roadmap(&dir)
        .args(["config", "validate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No warnings"));

    std::fs::write(
        dir.path().join(".roadmap/config.yaml"),
        "project:\n  name: x\nlease:\n  minutes: 0\n",
    )
    .unwrap();
    roadmap(&dir)
        .args(["config", "validate"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("lease.minutes"));
}

#[test]
fn state_summarizes_claims() {
    let dir = TempDir::new().unwrap();
    init_abc(&dir);
    roadmap(&dir)
        .args(["claim", "A", "--agent", "agent1"])
        .assert()
        .success();

    let output = roadmap(&dir)
        .args(["state", "--json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let json: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(json["total"], 3);
    assert_eq!(json["counts"]["in_progress"], 1);
    assert_eq!(json["counts"]["blocked"], 2);
    assert_eq!(json["claims"][0]["agent_id"], "agent1");
}
