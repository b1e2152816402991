//! Process liveness checks by executable base name.

use std::process::Command;

pub trait ProcessProbe: Send + Sync {
    /// Whether a process named `executable` (without extension) is running.
    fn is_running(&self, executable: &str) -> bool;
}

/// Probe backed by the platform process lister.
///
/// A failing lister is logged and reported as "not running".
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProcessProbe;

impl ProcessProbe for SystemProcessProbe {
    #[cfg(unix)]
    fn is_running(&self, executable: &str) -> bool {
        // Matches both native names and `.exe` images run through a loader.
        let pattern = format!("{}(\\.exe)?", regex_escape(executable));
        match Command::new("pgrep").arg("-x").arg(&pattern).output() {
            Ok(output) if output.status.success() => true,
            Ok(output) if output.status.code() == Some(1) => false,
            Ok(output) => {
                tracing::warn!(
                    executable,
                    status = %output.status,
                    stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                    "pgrep failed; assuming not running",
                );
                false
            }
            Err(err) => {
                tracing::warn!(executable, error = %err, "cannot run pgrep; assuming not running");
                false
            }
        }
    }

    #[cfg(windows)]
    fn is_running(&self, executable: &str) -> bool {
        let image = format!("{executable}.exe");
        let filter = format!("IMAGENAME eq {image}");
        match Command::new("tasklist")
            .args(["/FI", &filter, "/NH", "/FO", "CSV"])
            .output()
        {
            Ok(output) => String::from_utf8_lossy(&output.stdout)
                .to_ascii_lowercase()
                .contains(&image.to_ascii_lowercase()),
            Err(err) => {
                tracing::warn!(executable, error = %err, "cannot run tasklist; assuming not running");
                false
            }
        }
    }
}

#[cfg(unix)]
fn regex_escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if "\\.+*?()|[]{}^$".contains(c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn escapes_regex_metacharacters() {
        assert_eq!(regex_escape("th07"), "th07");
        assert_eq!(regex_escape("a.b(c)"), "a\\.b\\(c\\)");
        assert_eq!(regex_escape("東方紅魔郷"), "東方紅魔郷");
    }

    #[test]
    fn unknown_executable_is_not_running() {
        assert!(!SystemProcessProbe.is_running("savesync-no-such-process-xyz"));
    }
}
