use std::{ffi::OsStr, path::Path, time::Duration};

use serde::Deserialize;

use super::{MediaError, process::run_tool};

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    format: Option<ProbeFormat>,
}

/// Duration of a media file in seconds, as reported by ffprobe.
pub async fn duration_secs(
    ffprobe_bin: &str,
    path: &Path,
    timeout: Duration,
) -> Result<f64, MediaError> {
    let output = run_tool(
        ffprobe_bin,
        [
            OsStr::new("-v"),
            OsStr::new("error"),
            OsStr::new("-show_entries"),
            OsStr::new("format=duration"),
            OsStr::new("-of"),
            OsStr::new("json"),
            path.as_os_str(),
        ],
        timeout,
    )
    .await?;

    parse_duration(&String::from_utf8_lossy(&output.stdout))
}

fn parse_duration(json: &str) -> Result<f64, MediaError> {
    let parsed: ProbeOutput = serde_json::from_str(json)
        .map_err(|e| MediaError::Invalid(format!("Failed to parse ffprobe output: {e}")))?;

    let raw = parsed
        .format
        .and_then(|f| f.duration)
        .ok_or_else(|| MediaError::Invalid("Duration not found in format section".into()))?;

    raw.trim()
        .parse::<f64>()
        .map_err(|e| MediaError::Invalid(format!("Failed to parse duration '{raw}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ffprobe_json() {
        let json = r#"{ "format": { "duration": "59.976000" } }"#;
        let secs = parse_duration(json).unwrap();
        assert!((secs - 59.976).abs() < 1e-9);
    }

    #[test]
    fn missing_duration_is_an_error() {
        assert!(parse_duration(r#"{ "format": {} }"#).is_err());
        assert!(parse_duration(r#"{}"#).is_err());
        assert!(parse_duration("not json").is_err());
    }
}
