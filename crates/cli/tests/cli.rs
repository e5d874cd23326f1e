use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

fn write_config(dir: &TempDir, extra: &str) -> PathBuf {
    let content = format!(
        "[general]\nconfig_json_path = \"{}\"\nstate_db_path = \"{}\"\n{}",
        dir.path().join("config.json").display(),
        dir.path().join("state.sqlite").display(),
        extra
    );
    let path = dir.path().join("skyrelay.toml");
    fs::write(&path, content).expect("write config");
    path
}

fn skyrelay(dir: &TempDir) -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("skyrelay");
    cmd.current_dir(dir.path())
        .env_remove("DISCORD_BOT_TOKEN")
        .env_remove("SKYRELAY_ENCRYPTION_KEY")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn config_init_writes_example_file() {
    let dir = TempDir::new().expect("temp dir");
    let config_path = dir.path().join("skyrelay.toml");

    skyrelay(&dir)
        .args(["config", "init", "--path"])
        .arg(&config_path)
        .assert()
        .success();

    let content = fs::read_to_string(&config_path).expect("read config");
    assert!(content.contains("source = \"public\""));
    assert!(content.contains("interval_secs = 300"));
}

#[test]
fn config_init_refuses_to_overwrite() {
    let dir = TempDir::new().expect("temp dir");
    let config_path = write_config(&dir, "");

    skyrelay(&dir)
        .args(["config", "init", "--path"])
        .arg(&config_path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
}

#[test]
fn config_show_applies_env_overrides() {
    let dir = TempDir::new().expect("temp dir");
    let config_path = write_config(&dir, "");

    skyrelay(&dir)
        .env("SKYRELAY__POLL__INTERVAL_SECS", "60")
        .args(["config", "show", "--config"])
        .arg(&config_path)
        .assert()
        .success()
        .stdout(predicate::str::contains("interval_secs = 60"));
}

#[test]
fn keygen_prints_a_32_byte_key() {
    let dir = TempDir::new().expect("temp dir");

    let output = skyrelay(&dir).arg("keygen").output().expect("run keygen");
    assert!(output.status.success());

    let key = String::from_utf8(output.stdout).expect("utf8");
    // base64 of 32 bytes
    assert_eq!(key.trim().len(), 44);
    assert!(key.trim().ends_with('='));
}

#[test]
fn doctor_warns_when_setup_has_not_run() {
    let dir = TempDir::new().expect("temp dir");
    let config_path = write_config(&dir, "");

    let output = skyrelay(&dir)
        .args(["doctor", "--json", "--config"])
        .arg(&config_path)
        .output()
        .expect("run doctor");

    assert!(output.status.success());

    let value: Value = serde_json::from_slice(&output.stdout).expect("valid json");
    assert_eq!(value["overall"], "warn");
    assert_eq!(value["settings"]["status"], "warn");
    assert_eq!(value["discord"]["status"], "warn");
    assert!(!dir.path().join("config.json").exists());
}

#[test]
fn doctor_requires_key_for_authenticated_feed() {
    let dir = TempDir::new().expect("temp dir");
    let config_path = write_config(&dir, "[feed]\nsource = \"authenticated\"\n");

    let output = skyrelay(&dir)
        .args(["doctor", "--json", "--config"])
        .arg(&config_path)
        .output()
        .expect("run doctor");

    assert!(!output.status.success());

    let value: Value = serde_json::from_slice(&output.stdout).expect("valid json");
    assert_eq!(value["overall"], "error");
    assert_eq!(value["encryption_key"]["status"], "error");
}

#[test]
fn run_once_skips_until_configured() {
    let dir = TempDir::new().expect("temp dir");
    let config_path = write_config(&dir, "");

    skyrelay(&dir)
        .args(["run", "--once", "--dry-run", "--config"])
        .arg(&config_path)
        .assert()
        .success()
        .stderr(predicate::str::contains("skyrelay setup"));

    let stored: Value =
        serde_json::from_str(&fs::read_to_string(dir.path().join("config.json")).unwrap())
            .expect("config.json is json");
    assert!(stored["CHANNEL_ID"].is_null());
    assert!(stored["BLSKY_USER_HANDLE"].is_null());
}

#[test]
fn getpost_fails_without_account() {
    let dir = TempDir::new().expect("temp dir");
    let config_path = write_config(&dir, "");

    skyrelay(&dir)
        .args(["getpost", "--dry-run", "--config"])
        .arg(&config_path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Account identity not set"));
}

#[test]
fn authenticated_run_requires_encryption_key() {
    let dir = TempDir::new().expect("temp dir");
    let config_path = write_config(&dir, "[feed]\nsource = \"authenticated\"\n");

    skyrelay(&dir)
        .args(["run", "--once", "--dry-run", "--config"])
        .arg(&config_path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("SKYRELAY_ENCRYPTION_KEY"));
}

fn write_stub_feed(dir: &TempDir) -> String {
    let feed = serde_json::json!({
        "feed": [{
            "post": {
                "uri": "at://did:plc:alice/app.bsky.feed.post/3kabc",
                "cid": "bafyrei",
                "author": {
                    "did": "did:plc:alice",
                    "handle": "alice.bsky.social",
                    "displayName": "Alice"
                },
                "record": {
                    "$type": "app.bsky.feed.post",
                    "text": "Shipping #rust today",
                    "createdAt": "2024-07-04T16:00:00.000Z"
                }
            }
        }]
    });
    let feed_path = dir.path().join("feed.json");
    fs::write(&feed_path, feed.to_string()).expect("write feed");

    let settings = serde_json::json!({
        "CHANNEL_ID": 1234567890u64,
        "BLSKY_USER_HANDLE": "alice.bsky.social",
        "BLSKY_USER": null,
        "BLSKY_PASS": null
    });
    fs::write(dir.path().join("config.json"), settings.to_string()).expect("write settings");

    format!(
        "[feed]\nsource = \"stub\"\nstub_feed_path = \"{}\"\n",
        feed_path.display()
    )
}

#[test]
fn run_once_relays_stub_post_to_stdout() {
    let dir = TempDir::new().expect("temp dir");
    let feed = write_stub_feed(&dir);
    let config_path = write_config(&dir, &feed);

    skyrelay(&dir)
        .args(["run", "--once", "--dry-run", "--config"])
        .arg(&config_path)
        .assert()
        .success()
        .stdout(predicate::str::contains("New Bluesky post!"))
        .stdout(predicate::str::contains(
            "Shipping [#rust](https://bsky.app/hashtag/rust) today",
        ))
        .stdout(predicate::str::contains(
            "https://bsky.app/profile/alice.bsky.social/post/3kabc",
        ));

    // Dry runs keep no checkpoint
    assert!(!dir.path().join("state.sqlite").exists());
}

#[test]
fn getpost_by_member_is_hidden_with_notice() {
    let dir = TempDir::new().expect("temp dir");
    let feed = write_stub_feed(&dir);
    let config_path = write_config(
        &dir,
        &format!("{}\n[discord]\nadmin_user_ids = [\"1\"]\n", feed),
    );

    skyrelay(&dir)
        .args(["getpost", "--dry-run", "--public", "--user", "2", "--config"])
        .arg(&config_path)
        .assert()
        .success()
        .stderr(predicate::str::contains(
            "Only admins can send this message without being hidden!",
        ))
        .stdout(predicate::str::contains("### Only admins"))
        .stdout(predicate::str::contains("hidden"));
}

#[test]
fn getpost_by_admin_is_public() {
    let dir = TempDir::new().expect("temp dir");
    let feed = write_stub_feed(&dir);
    let config_path = write_config(
        &dir,
        &format!("{}\n[discord]\nadmin_user_ids = [\"1\"]\n", feed),
    );

    skyrelay(&dir)
        .args(["getpost", "--dry-run", "--public", "--user", "1", "--config"])
        .arg(&config_path)
        .assert()
        .success()
        .stdout(predicate::str::contains("(public, delivery"))
        .stdout(predicate::str::contains("### Only admins").not());
}
