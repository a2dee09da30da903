//! Executable lookup for processes started outside a login shell.
//!
//! Desktop launchers usually hand the engine a minimal `PATH`, so a plain
//! `which git` can fail even though the user's terminal finds git. The lookup
//! below retries once with the `PATH` reported by the user's login shell.

use std::{
    collections::HashSet,
    env::{join_paths, split_paths},
    ffi::{OsStr, OsString},
    path::{Path, PathBuf},
    process::Stdio,
    time::Duration,
};

use tokio::process::Command;

const PATH_REFRESH_TIMEOUT: Duration = Duration::from_secs(5);

/// Resolve an executable by name or explicit path.
///
/// Explicit paths (absolute, or containing a separator) are returned when they
/// point at a file. Bare names go through `which`, then through a refreshed
/// `PATH`; a successful refresh is written back to the process environment.
pub async fn resolve_executable_path(executable: &str) -> Option<PathBuf> {
    let executable = executable.trim();
    if executable.is_empty() {
        return None;
    }

    let path = Path::new(executable);
    if path.is_absolute() || path.components().count() > 1 {
        return path.is_file().then(|| path.to_path_buf());
    }

    if let Some(found) = which(executable).await {
        return Some(found);
    }

    if refresh_path().await
        && let Some(found) = which(executable).await
    {
        return Some(found);
    }

    None
}

/// Merge two PATH strings, keeping the order of `primary` and appending unseen
/// entries of `secondary`.
pub fn merge_paths(primary: impl AsRef<OsStr>, secondary: impl AsRef<OsStr>) -> OsString {
    let mut seen = HashSet::<PathBuf>::new();
    let merged: Vec<PathBuf> = split_paths(primary.as_ref())
        .chain(split_paths(secondary.as_ref()))
        .filter(|p| !p.as_os_str().is_empty() && seen.insert(p.clone()))
        .collect();

    join_paths(merged).unwrap_or_default()
}

async fn which(executable: &str) -> Option<PathBuf> {
    let executable = executable.to_string();
    tokio::task::spawn_blocking(move || which::which(executable))
        .await
        .ok()
        .and_then(|result| result.ok())
}

async fn refresh_path() -> bool {
    let Some(refreshed) = login_shell_path().await else {
        return false;
    };
    let existing = std::env::var_os("PATH").unwrap_or_default();
    let merged = merge_paths(&existing, OsString::from(&refreshed));
    if merged == existing {
        return false;
    }
    tracing::debug!(?existing, ?merged, "Refreshed PATH from login shell");
    unsafe {
        std::env::set_var("PATH", &merged);
    }
    true
}

#[cfg(unix)]
async fn login_shell_path() -> Option<String> {
    let shell = std::env::var("SHELL")
        .ok()
        .filter(|s| Path::new(s).is_file())
        .unwrap_or_else(|| "/bin/sh".to_string());
    let is_login_capable = shell.ends_with("zsh") || shell.ends_with("bash");

    let mut cmd = Command::new(&shell);
    if is_login_capable {
        cmd.arg("-l");
    }
    cmd.arg("-c")
        .arg("printf '%s' \"$PATH\"")
        .env("TERM", "dumb")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true);

    let child = cmd.spawn().ok()?;
    let output = match tokio::time::timeout(PATH_REFRESH_TIMEOUT, child.wait_with_output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(err)) => {
            tracing::debug!(%shell, ?err, "Failed to read PATH from login shell");
            return None;
        }
        Err(_) => {
            tracing::warn!(
                %shell,
                timeout_secs = PATH_REFRESH_TIMEOUT.as_secs(),
                "Timed out reading PATH from login shell"
            );
            return None;
        }
    };

    if !output.status.success() {
        return None;
    }
    let path = String::from_utf8(output.stdout).ok()?.trim().to_string();
    if path.is_empty() { None } else { Some(path) }
}

#[cfg(not(unix))]
async fn login_shell_path() -> Option<String> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_paths_keeps_order_and_dedups() {
        let a = join_paths(["/usr/bin", "/bin"]).unwrap();
        let b = join_paths(["/bin", "/opt/bin", ""]).unwrap();
        let merged: Vec<PathBuf> = split_paths(&merge_paths(&a, &b)).collect();
        assert_eq!(
            merged,
            vec![
                PathBuf::from("/usr/bin"),
                PathBuf::from("/bin"),
                PathBuf::from("/opt/bin")
            ]
        );
    }

    #[tokio::test]
    async fn explicit_missing_path_is_not_resolved() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("no-such-git");
        assert!(
            resolve_executable_path(missing.to_str().unwrap())
                .await
                .is_none()
        );
        assert!(resolve_executable_path("   ").await.is_none());
    }
}
