use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;

fn settings_path(dir: &tempfile::TempDir) -> String {
    dir.path().join("flowtrack.yaml").to_str().unwrap().to_string()
}

#[test]
fn test_init_list_and_show() {
    let dir = tempfile::tempdir().unwrap();

    cargo_bin_cmd!("flowtrack")
        .args(["init", dir.path().to_str().unwrap()])
        .assert()
        .success();

    assert!(dir.path().join("flowtrack.yaml").exists());
    assert!(dir.path().join("configs/DERIV.json").exists());

    let config = settings_path(&dir);

    cargo_bin_cmd!("flowtrack")
        .args(["--config", &config, "flow", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("DERIV"));

    cargo_bin_cmd!("flowtrack")
        .args(["--config", &config, "flow", "show", "DERIV"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Calculator_Runs [pending] sequential"))
        .stdout(predicate::str::contains("BPF [pending] parallel"));
}

#[test]
fn test_status_with_mock_source() {
    let dir = tempfile::tempdir().unwrap();
    cargo_bin_cmd!("flowtrack")
        .args(["init", dir.path().to_str().unwrap()])
        .assert()
        .success();

    let output = cargo_bin_cmd!("flowtrack")
        .args(["--config", &settings_path(&dir), "status", "DERIV", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let view: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(view["status"], "running");
    assert_eq!(view["stages"][0]["sub_stages"][0]["name"], "Stage_1_1");
    assert_eq!(view["stages"][0]["sub_stages"][0]["status"]["status"], "running");
    assert_eq!(view["edges"].as_array().unwrap().len(), 2);
}

#[test]
fn test_register_and_remove() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("flowtrack.yaml"), "name: ops\n").unwrap();
    let payload = dir.path().join("securities.json");
    std::fs::write(
        &payload,
        r#"{
            "flowName": "SECURITIES",
            "flowDefinition": {
                "overall": "On-PREM{Recon}",
                "subStages": {"On-PREM": {"Recon": "Load->Match->Report"}}
            },
            "stageMappings": {"onPrem": {"Load": {"bpf_id": 1, "process_id": 2}}}
        }"#,
    )
    .unwrap();

    let config = settings_path(&dir);

    cargo_bin_cmd!("flowtrack")
        .args(["--config", &config, "flow", "register", payload.to_str().unwrap()])
        .assert()
        .success();
    assert!(dir.path().join("configs/SECURITIES.json").exists());

    cargo_bin_cmd!("flowtrack")
        .args(["--config", &config, "flow", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("SECURITIES"));

    cargo_bin_cmd!("flowtrack")
        .args(["--config", &config, "flow", "remove", "SECURITIES"])
        .assert()
        .success();

    cargo_bin_cmd!("flowtrack")
        .args(["--config", &config, "flow", "remove", "SECURITIES"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("flow not found"));
}

#[test]
fn test_validate_reports_counts() {
    let dir = tempfile::tempdir().unwrap();
    let payload = dir.path().join("deriv.json");
    std::fs::write(
        &payload,
        r#"{
            "flowName": "DERIV",
            "flowDefinition": "Sub-stages\nAWS\nCalc { A->A }\nOn-PREM\nBPF { C, D }\n",
            "stageMappings": {"aws": "A: calc_dag"}
        }"#,
    )
    .unwrap();

    cargo_bin_cmd!("flowtrack")
        .args(["validate", payload.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("2 categories, 2 stages, 4 sub-stages, 1 edges"))
        .stdout(predicate::str::contains("1 warning(s)"));
}

#[test]
fn test_validate_rejects_missing_flow_name() {
    let dir = tempfile::tempdir().unwrap();
    let payload = dir.path().join("broken.json");
    std::fs::write(&payload, r#"{"flowDefinition": "Sub-stages"}"#).unwrap();

    cargo_bin_cmd!("flowtrack")
        .args(["validate", payload.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("missing flowName"));
}

#[test]
fn test_unknown_flow_is_not_found() {
    let dir = tempfile::tempdir().unwrap();

    cargo_bin_cmd!("flowtrack")
        .args(["--config", &settings_path(&dir), "flow", "show", "NOPE"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("flow not found: NOPE"));
}

#[test]
fn test_watch_stops_after_ticks() {
    let dir = tempfile::tempdir().unwrap();
    cargo_bin_cmd!("flowtrack")
        .args(["init", dir.path().to_str().unwrap()])
        .assert()
        .success();

    cargo_bin_cmd!("flowtrack")
        .args(["--config", &settings_path(&dir), "watch", "DERIV", "--ticks", "1"])
        .timeout(std::time::Duration::from_secs(30))
        .assert()
        .success()
        .stdout(predicate::str::contains("▶ Stage_1_1  running"));
}

#[test]
fn test_register_rejects_path_like_flow_name() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("flowtrack.yaml"), "name: ops\n").unwrap();
    let payload = dir.path().join("escape.json");
    std::fs::write(
        &payload,
        r#"{"flowName": "../escaped", "flowDefinition": "Sub-stages\nAWS\nCalc { A }\n"}"#,
    )
    .unwrap();

    cargo_bin_cmd!("flowtrack")
        .args(["--config", &settings_path(&dir), "flow", "register", payload.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not a valid file name"));

    assert!(!dir.path().join("escaped.json").exists());
}
