use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

struct Machine {
    home: TempDir,
    appdata: TempDir,
    remote: TempDir,
}

impl Machine {
    fn new() -> Self {
        Self {
            home: TempDir::new().expect("home"),
            appdata: TempDir::new().expect("appdata"),
            remote: TempDir::new().expect("remote"),
        }
    }

    fn savesync(&self) -> Command {
        let mut cmd = Command::cargo_bin("savesync").expect("savesync binary");
        cmd.env("HOME", self.home.path())
            .env("USERPROFILE", self.home.path())
            .env("NO_COLOR", "1");
        cmd
    }

    fn init(&self) {
        self.savesync()
            .args(["init", "--remote-root"])
            .arg(self.remote.path())
            .arg("--appdata-dir")
            .arg(self.appdata.path())
            .assert()
            .success();
    }

    fn install_new_gen(&self, folder: &str) -> PathBuf {
        let dir = self.appdata.path().join("ShanghaiAlice").join(folder);
        std::fs::create_dir_all(&dir).expect("mkdir save dir");
        std::fs::write(dir.join("score.dat"), b"hiscore").expect("write score");
        dir
    }

    fn remote_object(&self, title: &str) -> PathBuf {
        self.remote
            .path()
            .join("TouhouSaveSync")
            .join(format!("{title}.zip"))
    }
}

fn config_file(home: &Path) -> PathBuf {
    home.join(".savesync").join("config.yaml")
}

#[test]
fn commands_require_init() {
    let machine = Machine::new();
    machine
        .savesync()
        .args(["status"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("savesync init"));
}

#[test]
fn init_writes_config() {
    let machine = Machine::new();
    machine.init();

    let yaml = std::fs::read_to_string(config_file(machine.home.path())).expect("read config");
    assert!(yaml.contains("remote_root"));
    assert!(yaml.contains("TouhouSaveSync"));
    assert!(machine.home.path().join(".savesync/scratch").is_dir());
}

#[test]
fn scan_lists_new_generation_items() {
    let machine = Machine::new();
    machine.init();
    machine.install_new_gen("th13");
    machine.install_new_gen("thumbs");

    let output = machine
        .savesync()
        .args(["scan", "--json"])
        .output()
        .expect("run scan");
    assert!(output.status.success());

    let items: serde_json::Value = serde_json::from_slice(&output.stdout).expect("scan JSON");
    let items = items.as_array().expect("array");
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["title"], "Touhou13");
    assert_eq!(items[0]["generation"], "new");
}

#[test]
fn scan_without_games_says_so() {
    let machine = Machine::new();
    machine.init();

    machine
        .savesync()
        .arg("scan")
        .assert()
        .success()
        .stdout(predicate::str::contains("No games detected"));
}

#[test]
fn status_json_reports_pending_push() {
    let machine = Machine::new();
    machine.init();
    machine.install_new_gen("th13");

    let output = machine
        .savesync()
        .args(["status", "--json"])
        .output()
        .expect("run status");
    assert!(
        output.status.success(),
        "status failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).expect("status JSON");
    assert_eq!(report["summary"]["items"], 1);
    assert_eq!(report["summary"]["pending"], 1);
    assert_eq!(report["items"][0]["title"], "Touhou13");
    assert_eq!(report["items"][0]["decision"], "push");
    assert!(!machine.remote_object("Touhou13").exists());
}

#[test]
fn dry_run_sync_writes_nothing() {
    let machine = Machine::new();
    machine.init();
    machine.install_new_gen("th13");

    machine
        .savesync()
        .args(["sync", "--all", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[dry-run] 'Touhou13' would upload"));

    assert!(!machine.remote_object("Touhou13").exists());
}

#[test]
fn sync_uploads_then_settles() {
    let machine = Machine::new();
    machine.init();
    machine.install_new_gen("th13");

    machine
        .savesync()
        .args(["sync", "Touhou13"])
        .assert()
        .success()
        .stdout(predicate::str::contains("uploaded"));
    assert!(machine.remote_object("Touhou13").is_file());

    machine
        .savesync()
        .args(["sync", "--all"])
        .assert()
        .success()
        .stdout(predicate::str::contains("already up to date"));
}

#[test]
fn sync_requires_title_or_all() {
    let machine = Machine::new();
    machine.init();

    machine
        .savesync()
        .arg("sync")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--all"));
}
