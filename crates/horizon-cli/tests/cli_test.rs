use std::process::Command;

fn horizon() -> Command {
    Command::new(env!("CARGO_BIN_EXE_horizon"))
}

fn trace_json(args: &[&str]) -> serde_json::Value {
    let output = horizon()
        .arg("trace")
        .args(args)
        .output()
        .expect("failed to spawn horizon trace");
    assert!(
        output.status.success(),
        "trace failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("trace stdout is not json")
}

#[test]
fn trace_is_deterministic() {
    let args = ["--backend", "cpu", "--rays", "8", "--steps", "200"];
    let a = trace_json(&args);
    let b = trace_json(&args);
    assert_eq!(a["hash"], b["hash"]);
    assert_eq!(a["backend"], "cpu-parallel");
    assert_eq!(a["rays"].as_array().map(Vec::len), Some(8));
}

#[test]
fn trace_sequential_matches_parallel() {
    let seq = trace_json(&["--rays", "32", "--steps", "300", "--backend", "cpu-sequential"]);
    let par = trace_json(&["--rays", "32", "--steps", "300", "--backend", "cpu"]);
    assert_eq!(seq["hash"], par["hash"]);
}

#[test]
fn trace_counts_captured_rays() {
    // Every impact parameter below the critical one falls in.
    let out = trace_json(&[
        "--backend", "cpu", "--rays", "4", "--b-min", "0.5", "--b-max", "2.0", "--steps", "3000",
    ]);
    assert_eq!(out["captured"], 4);
}

#[test]
fn probe_json_stdout_is_clean() {
    let output = horizon()
        .args(["probe", "--json"])
        .output()
        .expect("failed to spawn horizon probe");
    assert!(output.status.success());
    let info: serde_json::Value = serde_json::from_slice(&output.stdout).expect("probe stdout is not json");
    assert!(info["gpu_backend_available"].is_boolean());
}

#[test]
fn bad_config_is_reported() {
    let dir = std::env::temp_dir().join(format!("horizon-cli-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("bad.toml");
    std::fs::write(&path, "[compute]\nbackend = \"quantum\"\n").unwrap();

    let output = horizon()
        .arg("--config")
        .arg(&path)
        .arg("probe")
        .output()
        .expect("failed to spawn horizon");
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("failed to load config"));

    std::fs::remove_dir_all(&dir).ok();
}
