use std::path::{Path, PathBuf};

use savesync_core::config;

pub const DAEMON_SOCKET: &str = "daemon.sock";

pub fn savesync_root(home: &Path) -> PathBuf {
    config::root_at(home)
}

pub fn run_dir(home: &Path) -> PathBuf {
    savesync_root(home).join("run")
}

pub fn socket_path(home: &Path) -> PathBuf {
    savesync_root(home).join(DAEMON_SOCKET)
}

pub fn scratch_dir(home: &Path) -> PathBuf {
    config::scratch_dir_at(home)
}
