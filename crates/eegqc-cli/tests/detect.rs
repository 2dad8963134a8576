use assert_cmd::cargo::cargo_bin_cmd;
use serde_json::Value;
use std::{error::Error, fs, path::PathBuf};
use tempfile::tempdir;

fn workspace_root() -> PathBuf {
    let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    manifest_dir
        .parent()
        .and_then(|p| p.parent())
        .map(|p| p.to_path_buf())
        .unwrap_or(manifest_dir)
}

fn simulate(out: &PathBuf, extra: &[&str]) -> Result<(), Box<dyn Error>> {
    let mut cmd = cargo_bin_cmd!("eegqc");
    cmd.args(["simulate", "--out", out.to_str().unwrap(), "--duration", "8"]);
    cmd.args(extra);
    cmd.assert().success();
    Ok(())
}

fn detect_json(args: &[&str]) -> Result<Value, Box<dyn Error>> {
    let mut cmd = cargo_bin_cmd!("eegqc");
    cmd.arg("detect").args(args);
    let output = cmd.assert().success().get_output().stdout.clone();
    Ok(serde_json::from_slice(&output)?)
}

#[test]
fn simulated_cnt_reports_its_bridge() -> Result<(), Box<dyn Error>> {
    let temp = tempdir()?;
    let cnt = temp.path().join("sub01.cnt");
    simulate(&cnt, &["--bridge", "C3:Cz"])?;

    let json = detect_json(&[cnt.to_str().unwrap()])?;
    assert_eq!(json["source"], "sub01.cnt");
    assert_eq!(json["sfreq"], 250.0);
    assert_eq!(json["bridged"], serde_json::json!([["C3", "Cz"]]));
    assert_eq!(json["channels"].as_array().unwrap().len(), 19);
    assert_eq!(json["epochs"], 4);
    Ok(())
}

#[test]
fn brainvision_run_writes_png_and_matrix() -> Result<(), Box<dyn Error>> {
    let temp = tempdir()?;
    let vhdr = temp.path().join("sub02.vhdr");
    simulate(&vhdr, &["--bridge", "O1:O2", "--bridge", "F7:F3", "--seed", "3"])?;
    let png = temp.path().join("sub02.png");
    let csv = temp.path().join("sub02.csv");

    let mut cmd = cargo_bin_cmd!("eegqc");
    cmd.args([
        "detect",
        vhdr.to_str().unwrap(),
        "--png",
        png.to_str().unwrap(),
        "--matrix-csv",
        csv.to_str().unwrap(),
    ]);
    let assert = cmd.assert().success();
    let stderr = String::from_utf8_lossy(&assert.get_output().stderr).into_owned();
    assert!(stderr.contains("Reading file: sub02.vhdr..."), "{stderr}");
    assert!(stderr.contains("Searching for bridges..."), "{stderr}");

    let json: Value = serde_json::from_slice(&assert.get_output().stdout)?;
    assert_eq!(json["bridged"], serde_json::json!([["F7", "F3"], ["O1", "O2"]]));
    assert!(fs::metadata(&png)?.len() > 0);

    let matrix = fs::read_to_string(&csv)?;
    let mut lines = matrix.lines();
    let header = lines.next().unwrap();
    assert!(header.starts_with(",Fp1,Fp2,F7,F3"));
    let first_row: Vec<&str> = lines.next().unwrap().split(',').collect();
    assert_eq!(first_row[0], "Fp1");
    assert_eq!(first_row[1], "");
    assert_eq!(matrix.lines().count(), 20);
    Ok(())
}

#[test]
fn config_file_and_legacy_remap_are_applied() -> Result<(), Box<dyn Error>> {
    let temp = tempdir()?;
    let cnt = temp.path().join("legacy.cnt");
    simulate(
        &cnt,
        &["--channels", "FP1,FP2,CZ,PZ,X,O1", "--bridge", "FP1:FP2"],
    )?;
    let config = workspace_root().join("test_data/bridge_config.toml");

    let json = detect_json(&[
        cnt.to_str().unwrap(),
        "--config",
        config.to_str().unwrap(),
        "--legacy-remap",
    ])?;
    assert_eq!(
        json["channels"],
        serde_json::json!(["Fp1", "Fp2", "Cz", "Pz", "O1"])
    );
    assert_eq!(json["bridged"], serde_json::json!([["Fp1", "Fp2"]]));
    assert_eq!(json["epochs"], 8);
    assert_eq!(json["dropped"], serde_json::json!([]));
    Ok(())
}

#[test]
fn unsupported_extension_fails() -> Result<(), Box<dyn Error>> {
    let temp = tempdir()?;
    let path = temp.path().join("recording.edf");
    fs::write(&path, b"0       ")?;
    let mut cmd = cargo_bin_cmd!("eegqc");
    cmd.args(["detect", path.to_str().unwrap()]);
    let assert = cmd.assert().failure();
    let stderr = String::from_utf8_lossy(&assert.get_output().stderr).into_owned();
    assert!(stderr.contains("unsupported file format"), "{stderr}");
    Ok(())
}

#[test]
fn channels_lists_mapped_and_dropped_labels() -> Result<(), Box<dyn Error>> {
    let vhdr = workspace_root().join("test_data/sample.vhdr");
    let mut cmd = cargo_bin_cmd!("eegqc");
    cmd.args(["channels", vhdr.to_str().unwrap()]);
    let output = cmd.assert().success().get_output().stdout.clone();
    let rows: Vec<Value> = String::from_utf8(output)?
        .lines()
        .map(serde_json::from_str)
        .collect::<Result<_, _>>()?;
    assert_eq!(rows.len(), 4);
    assert_eq!(rows[1]["label"], "FP2");
    assert_eq!(rows[1]["name"], "Fp2");
    assert_eq!(rows[3]["label"], "VEOG");
    assert!(rows[3]["name"].is_null());
    Ok(())
}
