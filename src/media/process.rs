use std::{
    env,
    ffi::OsStr,
    io::ErrorKind,
    path::{Path, PathBuf},
    process::{Output, Stdio},
    time::Duration,
};

use tokio::process;

use super::MediaError;

/// Finds `bin` without running it. A path is checked as given, a bare
/// name is looked up in `PATH`.
pub fn locate_tool(bin: &str) -> Option<PathBuf> {
    let candidate = Path::new(bin);
    if candidate.components().count() > 1 {
        return is_executable(candidate).then(|| candidate.to_path_buf());
    }

    let paths = env::var_os("PATH")?;
    env::split_paths(&paths)
        .map(|dir| dir.join(bin))
        .find(|path| is_executable(path))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    std::fs::metadata(path).is_ok_and(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file() || path.with_extension("exe").is_file()
}

/// [`MediaError::ToolUnavailable`] when `bin` is not installed. Spawns
/// nothing, so a job still runs exactly one process.
pub fn ensure_tool(bin: &str) -> Result<PathBuf, MediaError> {
    locate_tool(bin).ok_or_else(|| MediaError::ToolUnavailable(bin.to_owned()))
}

/// Runs one external tool to completion and captures its output.
///
/// Arguments go straight to the process, there is no shell in between.
/// A non-zero exit becomes [`MediaError::ToolFailed`] with the captured
/// stderr. When `timeout` elapses the child is killed.
pub async fn run_tool<I, S>(bin: &str, args: I, timeout: Duration) -> Result<Output, MediaError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let args: Vec<S> = args.into_iter().collect();
    log::info!(
        "Running {}: {}",
        bin,
        args.iter()
            .map(|a| a.as_ref().to_string_lossy())
            .collect::<Vec<_>>()
            .join(" ")
    );

    let child = process::Command::new(bin)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| match e.kind() {
            ErrorKind::NotFound | ErrorKind::PermissionDenied => {
                MediaError::ToolUnavailable(bin.to_owned())
            }
            _ => MediaError::Io(e),
        })?;

    let output = tokio::time::timeout(timeout, child.wait_with_output())
        .await
        .map_err(|_| MediaError::TimedOut {
            tool: bin.to_owned(),
            secs: timeout.as_secs(),
        })??;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        log::error!("{bin} failed with {}: {stderr}", output.status);
        return Err(MediaError::ToolFailed {
            tool: bin.to_owned(),
            status: output.status,
            stderr,
        });
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MISSING_TOOL: &str = "winyl-test-missing-tool-7f3a";

    #[tokio::test]
    async fn missing_binary_is_tool_unavailable() {
        let err = ensure_tool(MISSING_TOOL).unwrap_err();
        assert!(matches!(err, MediaError::ToolUnavailable(ref t) if t == MISSING_TOOL));

        let err = run_tool(MISSING_TOOL, ["-y"], Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::ToolUnavailable(_)));
    }

    #[cfg(unix)]
    #[test]
    fn locates_tools_by_name_and_by_path() {
        let sh = locate_tool("sh").unwrap();
        assert!(sh.is_absolute());
        assert_eq!(locate_tool(sh.to_str().unwrap()), Some(sh.clone()));
        assert_eq!(locate_tool("/nonexistent/dir/ffmpeg"), None);

        let dir = tempfile::tempdir().unwrap();
        let plain = dir.path().join("not-executable");
        std::fs::write(&plain, b"data").unwrap();
        assert_eq!(locate_tool(plain.to_str().unwrap()), None);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_zero_exit_carries_stderr() {
        let err = run_tool("sh", ["-c", "echo boom >&2; exit 3"], Duration::from_secs(5))
            .await
            .unwrap_err();

        match err {
            MediaError::ToolFailed { status, stderr, .. } => {
                assert_eq!(status.code(), Some(3));
                assert!(stderr.contains("boom"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn slow_tool_times_out() {
        let err = run_tool("sleep", ["5"], Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::TimedOut { .. }));
    }
}
