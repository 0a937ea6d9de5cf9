mod common;

use std::fs;

use assert_cmd::Command;
use common::{EXPORT_CSV, TestWorkspace};
use predicates::str::contains;

const TABLE: &str = "hspdata";

fn loader() -> Command {
    Command::cargo_bin("service-report-loader").expect("binary exists")
}

fn init(workspace: &TestWorkspace) {
    loader()
        .args(["init", "-w"])
        .arg(workspace.warehouse_dir())
        .args(["-t", TABLE])
        .assert()
        .success();
}

fn ingest(workspace: &TestWorkspace, input: &std::path::Path) -> Command {
    let mut cmd = loader();
    cmd.args(["ingest", "-i"])
        .arg(input)
        .arg("-w")
        .arg(workspace.warehouse_dir())
        .args(["-t", TABLE]);
    cmd
}

#[test]
fn ingest_twice_appends_once() {
    let workspace = TestWorkspace::new();
    let input = workspace.write("export.csv", EXPORT_CSV);
    init(&workspace);

    ingest(&workspace, &input)
        .assert()
        .success()
        .stdout(contains("Appended 4 row(s) to 'hspdata'"))
        .stdout(contains("1 invalid id"));

    ingest(&workspace, &input)
        .assert()
        .success()
        .stdout(contains("No new rows for 'hspdata'; up to date to 107"));

    loader()
        .args(["status", "-w"])
        .arg(workspace.warehouse_dir())
        .args(["-t", TABLE])
        .assert()
        .success()
        .stdout(contains("Table 'hspdata' is up to date to 107"));

    let body = workspace.read(&workspace.warehouse().data_path(TABLE));
    assert_eq!(body.lines().count(), 5);
    assert!(body.contains("2023-04-04,105,ali"));
    assert!(!body.contains("120000"));
}

#[test]
fn ingest_json_report_includes_digest_and_tallies() {
    let workspace = TestWorkspace::new();
    let input = workspace.write("export.csv", EXPORT_CSV);
    init(&workspace);

    let output = ingest(&workspace, &input)
        .arg("--json")
        .output()
        .expect("run ingest");
    assert!(output.status.success());
    let report: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("json report");
    assert_eq!(report["sha256"].as_str().unwrap().len(), 64);
    assert_eq!(report["input_rows"], 5);
    assert_eq!(report["rejected"]["invalid_id"], 1);
    assert_eq!(report["dates"]["jalali"], 3);
    assert_eq!(report["dropped_index_column"], "Row");
    assert_eq!(report["discarded_columns"][0], "PayPlan");
    assert_eq!(report["outcome"]["status"], "appended");
    assert_eq!(report["outcome"]["new_watermark"], 107);
}

#[test]
fn dry_run_writes_rows_without_appending() {
    let workspace = TestWorkspace::new();
    let input = workspace.write("export.csv", EXPORT_CSV);
    let ready = workspace.path().join("ready.csv");
    init(&workspace);

    ingest(&workspace, &input)
        .args(["--dry-run", "-o"])
        .arg(&ready)
        .assert()
        .success();

    let contents = fs::read_to_string(&ready).expect("ready rows");
    assert!(contents.starts_with("\"CreatDate\",\"UserServiceId\""));
    assert!(contents.contains("\"2023-04-04\",\"105\",\"ali\""));
    assert_eq!(contents.lines().count(), 5);

    loader()
        .args(["status", "-w"])
        .arg(workspace.warehouse_dir())
        .args(["-t", TABLE])
        .assert()
        .success()
        .stdout(contains("is empty"));
}

#[test]
fn ingest_reads_stdin_and_previews_rows() {
    let workspace = TestWorkspace::new();
    init(&workspace);

    loader()
        .args(["ingest", "-i", "-", "-w"])
        .arg(workspace.warehouse_dir())
        .args(["-t", TABLE, "--preview", "2"])
        .write_stdin(EXPORT_CSV)
        .assert()
        .success()
        .stdout(contains("UserServiceId"))
        .stdout(contains("2023-04-05"))
        .stdout(contains("Appended 4 row(s)"));
}

#[test]
fn missing_table_fails_even_with_fallback() {
    let workspace = TestWorkspace::new();
    let input = workspace.write("export.csv", EXPORT_CSV);

    ingest(&workspace, &input)
        .assert()
        .failure()
        .stderr(contains("error: could not read the watermark of table 'hspdata'"))
        .stderr(contains("does not exist"));

    ingest(&workspace, &input)
        .arg("--assume-empty-on-error")
        .assert()
        .failure()
        .stderr(contains("warning: watermark unavailable"))
        .stderr(contains("error: appending 4 row(s) to table 'hspdata' failed"));
}

#[test]
fn init_refuses_existing_table() {
    let workspace = TestWorkspace::new();
    init(&workspace);
    loader()
        .args(["init", "-w"])
        .arg(workspace.warehouse_dir())
        .args(["-t", TABLE])
        .assert()
        .failure()
        .stderr(contains("already exists"));
}

#[test]
fn schema_and_creators_describe_stored_table() {
    let workspace = TestWorkspace::new();
    let input = workspace.write("export.csv", EXPORT_CSV);
    init(&workspace);
    ingest(&workspace, &input).assert().success();

    loader()
        .args(["schema", "-w"])
        .arg(workspace.warehouse_dir())
        .args(["-t", TABLE])
        .assert()
        .success()
        .stdout(contains("UserServiceId"))
        .stdout(contains("integer"));

    let output = loader()
        .args(["creators", "-w"])
        .arg(workspace.warehouse_dir())
        .args(["-t", TABLE])
        .output()
        .expect("run creators");
    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout), "ali\nreza\nsara\n");
}

#[test]
fn report_summary_and_export() {
    let workspace = TestWorkspace::new();
    let input = workspace.write("export.csv", EXPORT_CSV);
    init(&workspace);
    ingest(&workspace, &input).assert().success();

    loader()
        .args(["report", "-w"])
        .arg(workspace.warehouse_dir())
        .args(["-t", TABLE, "--creator", "ali", "--summary"])
        .assert()
        .success()
        .stdout(contains("RunningBalance"))
        .stdout(contains("Grand Total"));

    let exported = workspace.path().join("report.csv");
    loader()
        .args(["report", "-w"])
        .arg(workspace.warehouse_dir())
        .args([
            "-t",
            TABLE,
            "--id",
            "100..106",
            "--date-between",
            "2023-04-01,2023-04-30",
            "-o",
        ])
        .arg(&exported)
        .assert()
        .success();
    let contents = fs::read_to_string(&exported).expect("report csv");
    assert_eq!(contents.lines().count(), 3);
    assert!(contents.contains("\"105\""));
    assert!(contents.contains("\"106\""));
    assert!(!contents.contains("\"107\""));
}

#[test]
fn profile_prints_defaults_and_checks_files() {
    loader()
        .arg("profile")
        .assert()
        .success()
        .stdout(contains("SavingOffUsed: Package"))
        .stdout(contains("- ServicePrice"));

    let workspace = TestWorkspace::new();
    let bad = workspace.write("profile.yml", "erase: [UserServiceId]\n");
    loader()
        .args(["profile", "--check"])
        .arg(&bad)
        .assert()
        .failure()
        .stderr(contains("UserServiceId cannot be erased"));
}
