//! Runs the `comic` binary against throwaway config and data directories.

use std::path::PathBuf;
use std::process::{Command, Output};

struct Home {
    dir: tempfile::TempDir,
}

impl Home {
    fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    fn run(&self, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_comic"))
            .args(args)
            .env("HOME", self.dir.path())
            .env("XDG_CONFIG_HOME", self.dir.path().join("config"))
            .env("XDG_DATA_HOME", self.dir.path().join("data"))
            .output()
            .unwrap()
    }

    fn config_file(&self, profile: &str) -> PathBuf {
        self.dir
            .path()
            .join("config")
            .join("comic")
            .join(format!("{profile}.toml"))
    }

    fn data_dir(&self, profile: &str) -> PathBuf {
        self.dir.path().join("data").join("comic").join(profile)
    }
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn config_init_writes_defaults() {
    let home = Home::new();
    let output = home.run(&["config", "init"]);
    assert!(output.status.success(), "{}", stderr(&output));

    let content = std::fs::read_to_string(home.config_file("default")).unwrap();
    let config: toml::Table = content.parse().unwrap();
    assert_eq!(config["blossom"]["timeout_secs"].as_integer(), Some(30));
    assert_eq!(config["cache"]["ttl_hours"].as_integer(), Some(24));
    assert!(!config["relays"]["relay_list"].as_array().unwrap().is_empty());
    assert!(config["identity"]["signer"].as_array().unwrap().is_empty());
}

#[test]
fn config_init_keeps_user_edits() {
    let home = Home::new();
    assert!(home.run(&["--profile", "artist", "config", "init"]).status.success());

    let file = home.config_file("artist");
    let edited = std::fs::read_to_string(&file)
        .unwrap()
        .replace("timeout_secs = 30", "timeout_secs = 7");
    std::fs::write(&file, format!("# my comic profile\n{edited}")).unwrap();

    assert!(home.run(&["--profile", "artist", "config", "init"]).status.success());
    let content = std::fs::read_to_string(&file).unwrap();
    assert!(content.starts_with("# my comic profile"));
    let config: toml::Table = content.parse().unwrap();
    assert_eq!(config["blossom"]["timeout_secs"].as_integer(), Some(7));
    assert!(!home.config_file("default").exists());
}

#[test]
fn cache_clear_on_a_fresh_profile() {
    let home = Home::new();
    let output = home.run(&["cache", "clear"]);
    assert!(output.status.success(), "{}", stderr(&output));
    assert!(stdout(&output).contains("cleared 0 cache entries"));
    assert!(home.data_dir("default").join("cache").is_dir());
}

#[test]
fn network_commands_need_an_identity() {
    let home = Home::new();
    assert!(home.run(&["config", "init"]).status.success());

    let output = home.run(&["relays"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("no identity"), "{}", stderr(&output));
}

#[test]
fn malformed_hash_is_rejected() {
    let home = Home::new();
    let output = home.run(&["blobs", "delete", "not-a-hash"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("expected 64-character hex sha256"), "{}", stderr(&output));
}

#[test]
fn drive_upload_needs_exactly_one_source() {
    let home = Home::new();

    let none = home.run(&["drives", "upload", "comic", "/"]);
    assert!(!none.status.success());
    assert!(stderr(&none).contains("required"), "{}", stderr(&none));

    let both = home.run(&["drives", "upload", "comic", "/", "cat.svg", "--url", "https://cdn.example/cat.svg"]);
    assert!(!both.status.success());
    assert!(stderr(&both).contains("cannot be used with"), "{}", stderr(&both));

    let unnamed = home.run(&["drives", "upload", "comic", "/", "--hash", &"ab".repeat(32)]);
    assert!(!unnamed.status.success());
    assert!(stderr(&unnamed).contains("--name"), "{}", stderr(&unnamed));
}

#[test]
fn opened_channels_start_empty_per_profile() {
    let home = Home::new();
    let file = home.config_file("reader");
    std::fs::create_dir_all(file.parent().unwrap()).unwrap();
    std::fs::write(&file, format!("[identity]\npubkey = \"{}\"\n", "ab".repeat(32))).unwrap();

    let output = home.run(&["--profile", "reader", "channels", "close", "some-channel"]);
    assert!(output.status.success(), "{}", stderr(&output));
    assert!(stdout(&output).contains("0 opened channels"));

    let output = home.run(&["--profile", "reader", "channels", "opened"]);
    assert!(output.status.success(), "{}", stderr(&output));
    assert_eq!(stdout(&output).trim(), "0 opened channels");
}
