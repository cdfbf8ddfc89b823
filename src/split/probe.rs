use std::ffi::OsString;
use std::path::Path;

use crate::error::{Error, Result};
use crate::tool::{self, Tool};

/// Total duration of `source` in seconds, as reported by ffprobe.
pub async fn probe_duration(ffprobe: &Tool, source: &Path) -> Result<f64> {
    if !source.is_file() {
        return Err(Error::probe(ffprobe.name(), source, "source file does not exist"));
    }

    let args: Vec<OsString> = vec![
        "-v".into(),
        "error".into(),
        "-show_entries".into(),
        "format=duration".into(),
        "-of".into(),
        "default=noprint_wrappers=1:nokey=1".into(),
        source.into(),
    ];

    let output = ffprobe
        .output(&args)
        .await
        .map_err(|err| Error::probe(ffprobe.name(), source, err.to_string()))?;

    if !output.status.success() {
        return Err(Error::probe(ffprobe.name(), source, tool::stderr_summary(&output)));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    parse_duration(&stdout).ok_or_else(|| {
        let message = format!("unparseable duration output: {:?}", stdout.trim());
        Error::probe(ffprobe.name(), source, message)
    })
}

/// Parse the first non-empty line as a finite, non-negative number of seconds.
pub fn parse_duration(stdout: &str) -> Option<f64> {
    let line = stdout.lines().map(str::trim).find(|line| !line.is_empty())?;
    line.parse::<f64>()
        .ok()
        .filter(|seconds| seconds.is_finite() && *seconds >= 0.0)
}
