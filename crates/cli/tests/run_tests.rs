// Integration tests for `tabula run`: script semantics, exit codes, output modes.
// Run with: cargo test -p tabula-cli --test run_tests

use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};

use tempfile::TempDir;

struct Output {
    code: i32,
    stdout: String,
    stderr: String,
}

/// Run the binary with an isolated config directory and `stdin` piped in.
fn tabula(config_home: &Path, args: &[&str], stdin: &str) -> Output {
    let mut child = Command::new(env!("CARGO_BIN_EXE_tabula"))
        .args(args)
        .env("XDG_CONFIG_HOME", config_home)
        .env("HOME", config_home)
        .env_remove("RUST_LOG")
        .env_remove("TABULA_CONFIG")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn tabula");

    // The binary may exit before reading stdin (usage errors), so a broken pipe is fine
    let mut pipe = child.stdin.take().unwrap();
    let _ = pipe.write_all(stdin.as_bytes());
    drop(pipe);

    let output = child.wait_with_output().expect("wait for tabula");
    Output {
        code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    }
}

fn run(args: &[&str], stdin: &str) -> Output {
    let home = TempDir::new().unwrap();
    tabula(home.path(), args, stdin)
}

// ===========================================================================
// Script commands
// ===========================================================================

#[test]
fn get_prints_reference_text_and_value() {
    let out = run(&["run"], "set A1 =B1*2\nset B1 21\nget A1\nget C9\n");
    assert_eq!(out.code, 0, "stderr: {}", out.stderr);
    assert_eq!(out.stdout, "A1\t=B1*2\t42\nC9\t\t\n");
    assert_eq!(out.stderr, "");
}

#[test]
fn print_and_size_commands() {
    let script = "\
# build a small table
set A1 1
set B1 =A1+1

set A2 '=not a formula
print values
print texts
size
";
    let out = run(&["run"], script);
    assert_eq!(out.code, 0, "stderr: {}", out.stderr);
    assert_eq!(
        out.stdout,
        "1\t2\n=not a formula\t\n1\t=A1+1\n'=not a formula\t\n2\t2\n"
    );
}

#[test]
fn edits_propagate_to_dependents() {
    let script = "\
set A1 3
set B1 =A1*A1
get B1
set A1 4
get B1
clear A1
get B1
";
    let out = run(&["run"], script);
    assert_eq!(out.stdout, "B1\t=A1*A1\t9\nB1\t=A1*A1\t16\nB1\t=A1*A1\t0\n");
}

#[test]
fn error_values_are_printed_not_failed() {
    let out = run(&["run"], "set A1 =1/0\nset A2 abc\nset A3 =A2+1\nprint values\n");
    assert_eq!(out.code, 0, "value errors are not script failures");
    assert_eq!(out.stdout, "#ARITHM!\nabc\n#VALUE!\n");
}

// ===========================================================================
// Failures and exit codes
// ===========================================================================

#[test]
fn failed_lines_are_reported_and_run_continues() {
    let script = "\
set A1 =B1
set B1 =A1
set C1 =(1
bogus
get Z0
get B1
";
    let out = run(&["run"], script);
    assert_eq!(out.code, 1);
    assert_eq!(out.stdout, "B1\t\t\n");

    let errors: Vec<_> = out.stderr.lines().collect();
    assert_eq!(errors.len(), 4, "stderr: {}", out.stderr);
    assert!(errors[0].starts_with("error: line 2: circular dependency"));
    assert!(errors[1].starts_with("error: line 3: formula syntax error"));
    assert!(errors[2].starts_with("error: line 4: unknown command"));
    assert!(errors[3].starts_with("error: line 5: invalid cell reference"));
}

#[test]
fn missing_script_file_is_io_error() {
    let out = run(&["run", "/nonexistent/tabula/script.txt"], "");
    assert_eq!(out.code, 3);
    assert!(out.stderr.contains("cannot read"), "stderr: {}", out.stderr);
}

#[test]
fn unknown_option_is_usage_error() {
    let out = run(&["run", "--frobnicate"], "");
    assert_eq!(out.code, 2);
}

// ===========================================================================
// Script file and output options
// ===========================================================================

#[test]
fn script_from_file_with_print_option() {
    let dir = TempDir::new().unwrap();
    let script = dir.path().join("edits.txt");
    std::fs::write(&script, "set A1 5\r\nset B2 =A1-1\r\n").unwrap();

    let out = run(&["run", script.to_str().unwrap(), "--print", "values"], "");
    assert_eq!(out.code, 0, "stderr: {}", out.stderr);
    assert_eq!(out.stdout, "5\t\n\t4\n");

    let out = run(&["run", script.to_str().unwrap(), "--print", "texts"], "");
    assert_eq!(out.stdout, "5\t\n\t=A1-1\n");
}

#[test]
fn json_dump_lists_every_stored_cell() {
    let out = run(&["run", "--json"], "set A1 =B1+C1\nset B1 2\nset D4 'x\n");
    assert_eq!(out.code, 0, "stderr: {}", out.stderr);

    let val: serde_json::Value = serde_json::from_str(out.stdout.trim()).expect("valid JSON");
    let cells = val.as_array().expect("array");
    let names: Vec<_> = cells.iter().map(|c| c["cell"].as_str().unwrap()).collect();
    assert_eq!(names, ["A1", "B1", "C1", "D4"]);

    assert_eq!(cells[0]["kind"], "formula");
    assert_eq!(cells[2]["kind"], "empty");
    assert_eq!(cells[3]["kind"], "text");
    assert_eq!(cells[0]["text"], "=B1+C1");
    assert_eq!(cells[0]["value"], 2.0);
    assert_eq!(cells[2]["text"], "");
    assert!(cells[2]["value"].is_null());
    assert_eq!(cells[3]["value"], "x");
}

// ===========================================================================
// Settings
// ===========================================================================

// Default config location follows XDG_CONFIG_HOME on Linux only
#[test]
#[cfg(target_os = "linux")]
fn settings_file_sets_default_print_mode() {
    let home = TempDir::new().unwrap();
    let config = home.path().join("tabula").join("settings.json");
    std::fs::create_dir_all(config.parent().unwrap()).unwrap();
    std::fs::write(
        &config,
        "{\n  // after every run\n  \"print.mode\": \"texts\",\n  \"print.showSize\": true\n}\n",
    )
    .unwrap();

    let out = tabula(home.path(), &["run"], "set A1 =1+1\n");
    assert_eq!(out.code, 0, "stderr: {}", out.stderr);
    assert_eq!(out.stdout, "=1+1\n1\t1\n");

    // Flag overrides the setting
    let out = tabula(home.path(), &["run", "--print", "none"], "set A1 =1+1\n");
    assert_eq!(out.stdout, "1\t1\n");
}

#[test]
fn explicit_config_path() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("custom.json");
    std::fs::write(&config, r#"{ "print.mode": "values" }"#).unwrap();

    let out = run(&["run", "--config", config.to_str().unwrap()], "set A1 =2*3\n");
    assert_eq!(out.code, 0, "stderr: {}", out.stderr);
    assert_eq!(out.stdout, "6\n");
}

#[test]
fn invalid_explicit_config_is_usage_error() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("broken.json");
    std::fs::write(&config, "{ not json").unwrap();

    let out = run(&["run", "--config", config.to_str().unwrap()], "set A1 1\n");
    assert_eq!(out.code, 2);
    assert!(out.stderr.contains("invalid settings"), "stderr: {}", out.stderr);
}

#[test]
#[cfg(target_os = "linux")]
fn invalid_default_config_falls_back_with_warning() {
    let home = TempDir::new().unwrap();
    let config = home.path().join("tabula").join("settings.json");
    std::fs::create_dir_all(config.parent().unwrap()).unwrap();
    std::fs::write(&config, "{ not json").unwrap();

    let out = tabula(home.path(), &["run"], "set A1 1\nget A1\n");
    assert_eq!(out.code, 0);
    assert_eq!(out.stdout, "A1\t1\t1\n");
    assert!(out.stderr.contains("using default settings"), "stderr: {}", out.stderr);
}
