use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::time::{SystemTime, UNIX_EPOCH};

fn bin_path() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_tally"))
}

fn tmp_dir(tag: &str) -> PathBuf {
    let nanos = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_nanos();
    let mut p = std::env::temp_dir();
    p.push(format!("tally_cli_{}_{}_{}", tag, std::process::id(), nanos));
    std::fs::create_dir_all(&p).unwrap();
    p
}

fn run(args: &[&str]) -> Output {
    Command::new(bin_path())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("failed to run {:?} {:?}: {}", bin_path(), args, e))
}

const ANALYSIS: &str = r#"
processes:
  sig:
    files: [sig.json]
  bkg:
    files: [bkg1.json, bkg2.json]
regions:
  pos:
    selection: "x > 0"
    weight: "w"
distributions:
  x:
    expressions: [x]
    binnings: [{low: 0, high: 4, n_bins: 4}]
"#;

const ENVIRONMENT: &str = "cache:\n  type: memory\nbackend:\n  type: serial\n";

/// Writes the analysis, environment and data files; returns their paths.
fn setup(dir: &Path) -> (PathBuf, PathBuf) {
    let write = |name: &str, text: &str| std::fs::write(dir.join(name), text).unwrap();
    write("analysis.yml", ANALYSIS);
    write("environment.yml", ENVIRONMENT);
    write(
        "sig.json",
        r#"{"trees": {"nominal": {"x": [0.5, 1.5, -1.0, 3.5], "w": [1.0, 1.0, 1.0, 2.0], "sf": [1.1, 1.1, 1.1, 1.1]}}}"#,
    );
    write(
        "bkg1.json",
        r#"{"tree_weight": 2.0, "trees": {"nominal": {"x": [2.5], "w": [1.0], "sf": [0.9]}}}"#,
    );
    write(
        "bkg2.json",
        r#"{"trees": {"nominal": {"x": [-2.5, 0.5], "w": [1.0, 4.0], "sf": [0.9, 0.9]}}}"#,
    );
    (dir.join("analysis.yml"), dir.join("environment.yml"))
}

fn stdout_json(out: &Output) -> serde_json::Value {
    assert!(out.status.success(), "command failed, stderr={}", String::from_utf8_lossy(&out.stderr));
    serde_json::from_slice(&out.stdout).expect("stdout should be JSON")
}

#[test]
fn count_reports_every_pair() {
    let dir = tmp_dir("count");
    let (analysis, environment) = setup(&dir);
    let out = run(&[
        "count",
        "-a",
        analysis.to_string_lossy().as_ref(),
        "-e",
        environment.to_string_lossy().as_ref(),
        "--stat",
    ]);
    let v = stdout_json(&out);
    let counts = v["counts"].as_array().unwrap();
    assert_eq!(counts.len(), 2);
    // Processes in name order: bkg, sig.
    assert_eq!(counts[0]["process"], "bkg");
    assert_eq!(counts[0]["count"].as_f64().unwrap(), 5.0);
    assert_eq!(counts[1]["process"], "sig");
    assert_eq!(counts[1]["count"].as_f64().unwrap(), 4.0);
    assert_eq!(counts[1]["stat_up"].as_f64().unwrap(), 2.0);
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn histogram_writes_output_file() {
    let dir = tmp_dir("histogram");
    let (analysis, environment) = setup(&dir);
    let output = dir.join("out.json");
    let out = run(&[
        "histogram",
        "-a",
        analysis.to_string_lossy().as_ref(),
        "-e",
        environment.to_string_lossy().as_ref(),
        "-p",
        "sig",
        "-o",
        output.to_string_lossy().as_ref(),
    ]);
    assert!(out.status.success(), "histogram failed, stderr={}", String::from_utf8_lossy(&out.stderr));
    let v: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&output).unwrap()).unwrap();
    let rows = v["histograms"].as_array().unwrap();
    assert_eq!(rows.len(), 1);
    let contents: Vec<f64> = rows[0]["measurement"]["contents"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c.as_f64().unwrap())
        .collect();
    // Underflow, four bins, overflow; x = -1 fails the selection.
    assert_eq!(contents, vec![0.0, 1.0, 1.0, 0.0, 2.0, 0.0]);
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn band_combines_sources() {
    let dir = tmp_dir("band");
    let (analysis, environment) = setup(&dir);
    let out = run(&[
        "band",
        "-a",
        analysis.to_string_lossy().as_ref(),
        "-e",
        environment.to_string_lossy().as_ref(),
        "-p",
        "sig",
        "-d",
        "x",
        "--weight-variation",
        "sf:sf:2 - sf",
    ]);
    let v = stdout_json(&out);
    let row = &v["bands"][0];
    assert_eq!(row["sources"][0], "sf");
    let y: Vec<f64> =
        row["band"]["y"].as_array().unwrap().iter().map(|c| c.as_f64().unwrap()).collect();
    assert_eq!(y, vec![1.0, 1.0, 0.0, 2.0]);
    assert_eq!(row["ratio"]["y"][0].as_f64().unwrap(), 1.0);
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn missing_analysis_fails() {
    let dir = tmp_dir("missing");
    let out = run(&["count", "-a", dir.join("nope.yml").to_string_lossy().as_ref()]);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("invalid configuration path"));
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn unknown_process_fails() {
    let dir = tmp_dir("unknown");
    let (analysis, environment) = setup(&dir);
    let out = run(&[
        "count",
        "-a",
        analysis.to_string_lossy().as_ref(),
        "-e",
        environment.to_string_lossy().as_ref(),
        "-p",
        "nope",
    ]);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("unknown process"));
    let _ = std::fs::remove_dir_all(&dir);
}

const ESTIMATIONS: &str = r#"
estimations:
  sig_minus_bkg:
    process: sig
    method: linear
    terms:
      - {coefficient: 1.0}
      - {coefficient: -0.5, process: bkg}
"#;

#[test]
fn count_includes_estimations() {
    let dir = tmp_dir("estimation");
    let (analysis, environment) = setup(&dir);
    std::fs::write(&analysis, format!("{ANALYSIS}{ESTIMATIONS}")).unwrap();
    let out = run(&[
        "count",
        "-a",
        analysis.to_string_lossy().as_ref(),
        "-e",
        environment.to_string_lossy().as_ref(),
        "-p",
        "sig",
        "--stat",
    ]);
    let v = stdout_json(&out);
    let counts = v["counts"].as_array().unwrap();
    assert_eq!(counts.len(), 2);
    assert_eq!(counts[0]["process"], "sig");
    assert_eq!(counts[0]["estimated"], false);
    assert_eq!(counts[1]["process"], "sig_minus_bkg");
    assert_eq!(counts[1]["estimated"], true);
    // sig = 4, bkg = 5
    assert_eq!(counts[1]["count"].as_f64().unwrap(), 4.0 - 2.5);
    assert!(counts[1]["stat_up"].as_f64().unwrap() > 0.0);

    let out = run(&[
        "count",
        "-a",
        analysis.to_string_lossy().as_ref(),
        "-e",
        environment.to_string_lossy().as_ref(),
        "--estimation",
        "nope",
    ]);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("unknown estimation"));
    let _ = std::fs::remove_dir_all(&dir);
}
