use assert_cmd::Command;
use spheronet_nn::CubedSphereConfig;
use spheronet_test_data::{DdgTable, FeatureDir};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn tiny_config(dir: &Path) -> PathBuf {
    let path = dir.join("tiny.json");
    CubedSphereConfig::tiny().to_json(&path).unwrap();
    path
}

fn stdout(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn test_predict_ddg_then_correlate() {
    let (features, _features) = FeatureDir::small()
        .protein("1abc", "MKVLGE")
        .protein("2xyz", "AWYF")
        .create_temp()
        .unwrap();
    let (csv, _csv) = DdgTable::new()
        .row("1abc", "K2A", 1.2)
        .row("1abc", "V3G", 0.4)
        .row("1abc", "L4A;G5W", 2.5)
        .row("2xyz", "W2F", -0.3)
        .row("2xyz", "A:Y3A", 0.9)
        .create_temp()
        .unwrap();
    let work = TempDir::new().unwrap();
    let config = tiny_config(work.path());
    let results = work.path().join("results.json");

    let output = Command::cargo_bin("spheronet")
        .unwrap()
        .arg("--cpu")
        .arg("predict-ddg")
        .arg("--ddg-csv")
        .arg(&csv)
        .arg("--checkpoint")
        .arg(work.path().join("checkpoints"))
        .arg("--input-dir")
        .arg(&features)
        .arg("--model-config")
        .arg(&config)
        .arg("--output")
        .arg(&results)
        .assert()
        .success()
        .get_output()
        .clone();
    let text = stdout(&output);
    assert!(text.contains("scored 5 of 5 mutations"), "{text}");
    assert!(text.contains("pearson r ="), "{text}");
    assert!(results.exists());

    let output = Command::cargo_bin("spheronet")
        .unwrap()
        .arg("correlate")
        .arg("--results")
        .arg(&results)
        .assert()
        .success()
        .get_output()
        .clone();
    assert!(stdout(&output).contains("(n = 5)"));
}

#[test]
fn test_train_then_infer() {
    let (features, _features) = FeatureDir::small()
        .protein("1abc", "MKVLGE")
        .protein("2xyz", "AWYF")
        .protein("3def", "GGSTPK")
        .protein("4ghi", "DERN")
        .create_temp()
        .unwrap();
    let work = TempDir::new().unwrap();
    let config = tiny_config(work.path());
    let checkpoints = work.path().join("checkpoints");

    Command::cargo_bin("spheronet")
        .unwrap()
        .args(["--cpu", "train", "--batch-size", "3", "--max-steps", "4"])
        .args(["--checkpoint-every", "2", "--validation-set-size", "1"])
        .arg("--input-dir")
        .arg(&features)
        .arg("--checkpoint")
        .arg(&checkpoints)
        .arg("--model-config")
        .arg(&config)
        .assert()
        .success();
    assert!(checkpoints.join("model.ckpt-4.safetensors").exists());
    assert!(checkpoints.join("config.json").exists());

    // the network configuration is picked up from the checkpoint directory
    let output = Command::cargo_bin("spheronet")
        .unwrap()
        .args(["--cpu", "infer", "--split", "train", "--strict", "--step", "-1"])
        .args(["--validation-set-size", "1"])
        .arg("--input-dir")
        .arg(&features)
        .arg("--checkpoint")
        .arg(&checkpoints)
        .assert()
        .success()
        .get_output()
        .clone();
    let text = stdout(&output);
    assert!(text.contains("train split, 10 residues"), "{text}");
}

#[test]
fn test_strict_without_checkpoint_fails() {
    let (features, _features) = FeatureDir::small().protein("1abc", "MKV").create_temp().unwrap();
    let (csv, _csv) = DdgTable::new().row("1abc", "K2A", 1.0).create_temp().unwrap();
    let work = TempDir::new().unwrap();
    let config = tiny_config(work.path());

    Command::cargo_bin("spheronet")
        .unwrap()
        .args(["--cpu", "predict-ddg", "--strict"])
        .arg("--ddg-csv")
        .arg(&csv)
        .arg("--checkpoint")
        .arg(work.path())
        .arg("--input-dir")
        .arg(&features)
        .arg("--model-config")
        .arg(&config)
        .assert()
        .failure();
}

#[test]
fn test_missing_ddg_table_fails() {
    let work = TempDir::new().unwrap();
    Command::cargo_bin("spheronet")
        .unwrap()
        .args(["-q", "predict-ddg"])
        .arg("--ddg-csv")
        .arg(work.path().join("absent.csv"))
        .arg("--checkpoint")
        .arg(work.path())
        .arg("--input-dir")
        .arg(work.path())
        .assert()
        .failure();
}
