use std::{
    env,
    io::Write,
    process::{Command, Output, Stdio},
};

use restraint_warden_engine::WardenConfig;

fn warden_cli() -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_restraint-warden"));
    let _ = command.current_dir(env!("CARGO_MANIFEST_DIR"));
    command
}

fn run_with_stdin(mut command: Command, script: &str) -> Output {
    let mut child = command
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to launch restraint-warden");
    child
        .stdin
        .take()
        .expect("stdin is piped")
        .write_all(script.as_bytes())
        .expect("failed to write script");
    child.wait_with_output().expect("restraint-warden did not exit")
}

#[test]
fn demo_script_enforces_the_limit() {
    let output = warden_cli()
        .args(["--config", "scripts/limit.toml"])
        .args(["--script", "scripts/enforcement.txt"])
        .output()
        .expect("failed to launch restraint-warden");
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Victim restrained=true, tracked=true, elapsed=0s, debug=false"));
    assert!(stdout.contains("LimitEnforced { actor: ActorId(1)"));
    assert!(stdout.contains("Cleared cached safe teleport spot for: Outpost."));
}

#[test]
fn scripts_are_read_from_stdin() {
    let script = "\
        landmark 100 0 100 Outpost\n\
        spawn 1 0 0 0 Victim\n\
        spawn 7 10 0 10 Warden Admin\n\
        grant 7 restraintwarden.admin\n\
        admin 7 status victim\n";
    let output = run_with_stdin(warden_cli(), script);
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("7 > Victim restrained=false, tracked=false, elapsed=0s, debug=false"));
}

#[test]
fn malformed_script_lines_fail_with_their_line_number() {
    let output = run_with_stdin(warden_cli(), "spawn 1 0 0 0 Victim\nteleport 1\n");
    assert!(!output.status.success());

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Script line 2: teleport 1"));
    assert!(stderr.contains("unknown directive 'teleport'"));
}

#[test]
fn default_config_is_written_and_loads_back() {
    let path = env::temp_dir().join(format!("restraint-warden-{}.toml", std::process::id()));
    let output = warden_cli()
        .arg("--write-default-config")
        .arg(&path)
        .output()
        .expect("failed to launch restraint-warden");
    assert!(output.status.success());
    assert!(path.exists());

    let loaded = WardenConfig::load(&path);
    let _ = std::fs::remove_file(&path);
    assert_eq!(loaded.expect("written config loads"), WardenConfig::default());
}
