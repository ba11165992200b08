use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;

const ENV_KEYS: [&str; 4] = [
    "TILECACHE_CAPACITY",
    "TILECACHE_TILE_WIDTH",
    "TILECACHE_TILE_HEIGHT",
    "TILECACHE_INDEX_ORDER",
];

fn tilecache() -> Command {
    let mut cmd = cargo_bin_cmd!("tilecache");
    for key in ENV_KEYS {
        cmd.env_remove(key);
    }
    cmd.env_remove("RUST_LOG");
    cmd
}

fn stdout_json(cmd: &mut Command) -> Value {
    let output = cmd.assert().success().get_output().stdout.clone();
    serde_json::from_slice(&output).expect("stdout should contain valid json")
}

#[test]
fn version_prints_package_version() {
    tilecache()
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn config_emits_stable_json_contract() {
    let value = stdout_json(tilecache().args(["config", "--capacity", "4", "--tile-size", "64"]));

    insta::with_settings!({ sort_maps => true }, {
        insta::assert_json_snapshot!("config_with_flags", value);
    });
}

#[test]
fn config_layers_file_env_and_flags() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let path = temp.path().join("tilecache.conf");
    std::fs::write(&path, "capacity = 10\ntile_width = 32\ntile_height = 32\nindex_order = 8\n")
        .expect("config file should be written");

    let value = stdout_json(
        tilecache()
            .arg("config")
            .arg("--config")
            .arg(&path)
            .arg("--capacity=-1")
            .env("TILECACHE_TILE_HEIGHT", "48"),
    );

    assert_eq!(value["capacity"], -1);
    assert_eq!(value["tile_width"], 32);
    assert_eq!(value["tile_height"], 48);
    assert_eq!(value["index_order"], 8);
}

#[test]
fn render_writes_png_and_summary() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let output_path = temp.path().join("out").join("field.png");

    let value = stdout_json(
        tilecache()
            .arg("render")
            .args(["--width", "200", "--height", "130", "--tile-size", "64"])
            .args(["--bounds=-3,-3,3,3", "--y-reversed"])
            .arg("--output")
            .arg(&output_path),
    );

    assert_eq!(value["tiles_drawn"], 12);
    assert_eq!(value["generated"], 12);
    assert_eq!(value["hits"], 0);
    assert_eq!(value["tile_width"], 64);

    let image = image::open(&output_path).expect("render should be a readable image");
    assert_eq!((image.width(), image.height()), (200, 130));
}

#[test]
fn pan_reports_every_frame() {
    let value = stdout_json(tilecache().args([
        "pan",
        "--width",
        "256",
        "--height",
        "128",
        "--tile-size",
        "64",
        "--frames",
        "2",
        "--step-x",
        "1",
    ]));

    let frames = value.as_array().expect("pan output should be an array");
    assert_eq!(frames.len(), 3);
    for (i, frame) in frames.iter().enumerate() {
        assert_eq!(frame["frame"], i as u64 + 1);
        assert_eq!(frame["tiles_drawn"], 8);
    }
    assert_eq!(frames[0]["generated"], 8);

    let first_min_x = frames[0]["bounds"]["min_x"].as_f64().unwrap();
    let last_min_x = frames[2]["bounds"]["min_x"].as_f64().unwrap();
    assert!(last_min_x > first_min_x);
}

#[test]
fn render_fails_for_invalid_bounds() {
    let temp = tempfile::tempdir().expect("temp dir should be created");

    tilecache()
        .arg("render")
        .args(["--bounds", "5,0,1,10"])
        .arg("--output")
        .arg(temp.path().join("never.png"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid viewport"));
}

#[test]
fn config_fails_for_missing_file() {
    tilecache()
        .args(["config", "--config", "/nonexistent/tilecache.conf"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to load config"));
}

#[test]
fn config_fails_for_invalid_environment() {
    tilecache()
        .arg("config")
        .env("TILECACHE_CAPACITY", "plenty")
        .assert()
        .failure()
        .stderr(predicate::str::contains("TILECACHE_CAPACITY"));
}
