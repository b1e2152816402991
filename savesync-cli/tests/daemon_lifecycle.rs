use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread::sleep;
use std::time::{Duration, Instant};

use savesync_core::config;
use tempfile::TempDir;

fn savesync_bin_path() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_savesync"))
}

struct DaemonProcess {
    child: Child,
    binary: PathBuf,
    home: PathBuf,
}

impl DaemonProcess {
    fn start(binary: PathBuf, home: PathBuf) -> Self {
        let child = Command::new(&binary)
            .env("HOME", &home)
            .env("USERPROFILE", &home)
            .env("RUST_LOG", "warn")
            .args(["daemon", "start"])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .expect("spawn daemon");

        Self {
            child,
            binary,
            home,
        }
    }

    fn stop(&mut self) {
        let _ = Command::new(&self.binary)
            .env("HOME", &self.home)
            .env("USERPROFILE", &self.home)
            .args(["daemon", "stop"])
            .status();

        let deadline = Instant::now() + Duration::from_secs(3);
        while Instant::now() < deadline {
            if let Ok(Some(_)) = self.child.try_wait() {
                return;
            }
            sleep(Duration::from_millis(50));
        }

        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

impl Drop for DaemonProcess {
    fn drop(&mut self) {
        self.stop();
    }
}

fn daemon_status(binary: &Path, home: &Path) -> Option<serde_json::Value> {
    let output = Command::new(binary)
        .env("HOME", home)
        .env("USERPROFILE", home)
        .args(["daemon", "status"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    serde_json::from_slice(&output.stdout).ok()
}

fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        sleep(Duration::from_millis(100));
    }
    false
}

#[test]
fn status_without_daemon_reports_not_running() {
    let home = TempDir::new().expect("home");
    let status = daemon_status(&savesync_bin_path(), home.path()).expect("status JSON");
    assert_eq!(status["running"], false);
}

#[test]
#[cfg(unix)]
fn daemon_uploads_detected_save_and_stops_on_request() {
    let home = TempDir::new().expect("home");
    let appdata = TempDir::new().expect("appdata");
    let remote = TempDir::new().expect("remote");

    let save_dir = appdata.path().join("ShanghaiAlice").join("th13");
    std::fs::create_dir_all(&save_dir).expect("mkdir save dir");
    std::fs::write(save_dir.join("score.dat"), b"hiscore").expect("write score");

    let mut cfg = config::Config::new(remote.path().to_path_buf());
    cfg.appdata_directory = Some(appdata.path().to_path_buf());
    cfg.poll_interval_secs = 1;
    config::save_at(home.path(), &cfg).expect("save config");

    let binary = savesync_bin_path();
    let mut daemon = DaemonProcess::start(binary.clone(), home.path().to_path_buf());
    assert!(
        wait_until(Duration::from_secs(5), || {
            daemon_status(&binary, home.path())
                .map(|s| s["running"] == true)
                .unwrap_or(false)
        }),
        "daemon did not report running state in time",
    );

    let object = remote.path().join("TouhouSaveSync").join("Touhou13.zip");
    assert!(
        wait_until(Duration::from_secs(10), || object.is_file()),
        "daemon did not upload the save within timeout",
    );

    let queued = Command::new(&binary)
        .env("HOME", home.path())
        .env("USERPROFILE", home.path())
        .args(["daemon", "sync", "Touhou99"])
        .output()
        .expect("run daemon sync");
    assert!(!queued.status.success(), "unknown title should be rejected");

    daemon.stop();
    assert!(
        wait_until(Duration::from_secs(3), || !home
            .path()
            .join(".savesync/daemon.sock")
            .exists()),
        "socket should be removed after shutdown",
    );
}
