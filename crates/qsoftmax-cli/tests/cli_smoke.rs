use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;

/// The binary with a clean environment so ambient QSOFTMAX_* settings
/// cannot leak into assertions.
fn qsoftmax() -> Command {
    let mut cmd = Command::cargo_bin("qsoftmax").unwrap();
    for key in [
        "QSOFTMAX_CONFIG",
        "QSOFTMAX_DEVICE",
        "QSOFTMAX_DTYPE",
        "QSOFTMAX_BATCH",
        "QSOFTMAX_CHANNELS",
        "QSOFTMAX_AXIS",
        "QSOFTMAX_OUTPUT_SCALE",
        "QSOFTMAX_ROUNDING",
        "QSOFTMAX_GENERATOR",
        "QSOFTMAX_IN_PLACE",
        "QSOFTMAX_TIMEOUT_MS",
        "QSOFTMAX_MEMORY_LIMIT_MB",
        "QSOFTMAX_KERNEL",
        "QSOFTMAX_LOG_LEVEL",
        "QSOFTMAX_LOG_FORMAT",
        "RUST_LOG",
    ] {
        cmd.env_remove(key);
    }
    cmd
}

fn json_report(args: &[&str]) -> serde_json::Value {
    let out = qsoftmax().args(args).args(["--format", "json"]).assert().success().get_output().stdout.clone();
    serde_json::from_slice(&out).unwrap()
}

#[test]
fn help_works() {
    qsoftmax().arg("--help").assert().success();
}

#[test]
fn version_works() {
    qsoftmax().arg("--version").assert().success();
}

#[test]
fn help_mentions_core_subcommands() {
    let out = qsoftmax().arg("--help").assert().success().get_output().stdout.clone();
    let s = String::from_utf8(out).unwrap();
    for needle in ["run", "info", "config", "--dtype", "--config"] {
        assert!(s.contains(needle), "help missing `{needle}`");
    }
}

#[test]
fn invalid_command_fails() {
    qsoftmax().arg("nonexistent-command").assert().failure();
}

#[test]
fn default_run_prints_every_stage() {
    qsoftmax()
        .assert()
        .success()
        .stdout(predicate::str::starts_with("usr_src_data: 1 "))
        .stdout(predicate::str::contains("\nmax_usr_src_data: 1\n"))
        .stdout(predicate::str::contains("\nsrc_data: 255 "))
        .stdout(predicate::str::contains("\noutput: "));
}

#[test]
fn run_subcommand_matches_default() {
    let a = qsoftmax().assert().success().get_output().stdout.clone();
    let b = qsoftmax().arg("run").assert().success().get_output().stdout.clone();
    assert_eq!(a, b);
}

#[test]
fn flags_before_run_subcommand_are_honoured() {
    let outer = json_report(&["--dtype", "s8", "run"]);
    let inner = json_report(&["run", "--dtype", "s8"]);
    assert_eq!(outer["dtype"], "s8");
    assert_eq!(outer["dtype"], inner["dtype"]);

    let both = json_report(&["--dtype", "s8", "--batch", "2", "run", "--batch", "4"]);
    assert_eq!(both["dtype"], "s8");
    assert_eq!(both["shape"], serde_json::json!([4, 10]));
}

#[test]
fn json_report_has_pipeline_fields() {
    let report = json_report(&["run", "--dtype", "f32", "--output-scale", "1", "--dequantize"]);
    assert_eq!(report["shape"], serde_json::json!([3, 10]));
    assert_eq!(report["dtype"], "f32");
    let output = report["output"].as_array().unwrap();
    assert_eq!(output.len(), 30);
    let row: f64 = output[..10].iter().map(|v| v.as_f64().unwrap()).sum();
    assert!((row - 1.0).abs() < 1e-5);
    assert!(report["dequantized"].is_array());
}

#[test]
fn out_of_place_matches_in_place() {
    let a = json_report(&["run", "--dtype", "s8"]);
    let b = json_report(&["run", "--dtype", "s8", "--out-of-place"]);
    assert_eq!(a["output"], b["output"]);
    assert_eq!(b["in_place"], false);
}

#[test]
fn degenerate_input_exits_with_quantization_code() {
    qsoftmax()
        .args(["run", "--generator", "zeros"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Degenerate input"));
}

#[test]
fn bad_axis_exits_with_kernel_code() {
    qsoftmax()
        .args(["run", "--axis", "5"])
        .assert()
        .code(4)
        .stderr(predicate::str::contains("Invalid axis 5 for tensor of rank 2"));
}

#[test]
fn cuda_exits_with_execution_code() {
    qsoftmax()
        .args(["run", "--device", "cuda"])
        .assert()
        .code(5)
        .stderr(predicate::str::contains("Device unavailable: cuda:0"));
}

#[test]
fn unknown_dtype_is_a_usage_error() {
    qsoftmax().args(["run", "--dtype", "f16"]).assert().failure();
}

#[test]
fn config_file_and_env_are_layered() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[softmax]\nbatch = 4\ndtype = \"s8\"").unwrap();

    qsoftmax()
        .args(["config", "show", "--config"])
        .arg(file.path())
        .env("QSOFTMAX_CHANNELS", "6")
        .assert()
        .success()
        .stdout(predicate::str::contains("[softmax]"))
        .stdout(predicate::str::contains("batch = 4"))
        .stdout(predicate::str::contains("channels = 6"))
        .stdout(predicate::str::contains("dtype = \"s8\""));

    let report = {
        let out = qsoftmax()
            .arg("--config")
            .arg(file.path())
            .args(["run", "--batch", "2", "--format", "json"])
            .assert()
            .success()
            .get_output()
            .stdout
            .clone();
        serde_json::from_slice::<serde_json::Value>(&out).unwrap()
    };
    assert_eq!(report["shape"], serde_json::json!([2, 10]));
    assert_eq!(report["dtype"], "s8");
}

#[test]
fn malformed_config_exits_with_config_code() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[softmax]\nbatch = \"many\"").unwrap();
    qsoftmax().arg("--config").arg(file.path()).assert().code(2);
}

#[test]
fn info_lists_providers() {
    qsoftmax()
        .arg("info")
        .assert()
        .success()
        .stdout(predicate::str::contains("fallback"))
        .stdout(predicate::str::contains("cuda:0"));
}
