use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::process::{Output, Stdio};
use std::time::Duration;

use tokio::process::Command;

use crate::error::{Error, Result};

pub const FFMPEG: &str = "ffmpeg";
pub const FFPROBE: &str = "ffprobe";
pub const YT_DLP: &str = "yt-dlp";

const SPAWN_RETRY_DELAY: Duration = Duration::from_millis(200);

/// An external program plus the spawn retry budget used for every call.
#[derive(Debug, Clone)]
pub struct Tool {
    name: String,
    program: PathBuf,
    retries: usize,
}

impl Tool {
    /// Resolve `name` on PATH.
    pub fn locate(name: &str, retries: usize) -> Result<Self> {
        let program =
            which::which(name).map_err(|_| Error::ToolNotFound { tool: name.to_string() })?;
        Ok(Self::at(name, program, retries))
    }

    pub fn at(name: &str, program: impl Into<PathBuf>, retries: usize) -> Self {
        Self {
            name: name.to_string(),
            program: program.into(),
            retries,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run to completion and capture stdout/stderr. The exit status is left
    /// for the caller to judge; only spawn failures become errors.
    ///
    /// Spawn failures other than a missing binary or a permission error are
    /// retried up to `retries` times.
    pub async fn output(&self, args: &[OsString]) -> Result<Output> {
        let mut attempt = 0;

        loop {
            let result = Command::new(&self.program)
                .args(args)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true)
                .output()
                .await;

            match result {
                Ok(output) => return Ok(output),
                Err(err) if err.kind() == ErrorKind::NotFound => {
                    return Err(Error::ToolNotFound { tool: self.name.clone() });
                }
                Err(err)
                    if err.kind() == ErrorKind::PermissionDenied || attempt >= self.retries =>
                {
                    return Err(Error::tool(&self.name, format!("failed to spawn: {}", err)));
                }
                Err(err) => {
                    attempt += 1;
                    tracing::warn!(tool = %self.name, attempt, "spawn failed, retrying: {}", err);
                    tokio::time::sleep(SPAWN_RETRY_DELAY).await;
                }
            }
        }
    }
}

/// Last non-empty stderr line, for compact error messages.
pub fn stderr_summary(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    stderr
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(|line| line.to_string())
        .unwrap_or_else(|| format!("exited with {}", output.status))
}

/// PATH lookup for every tool the program shells out to.
pub fn check_tools() -> Vec<(&'static str, Option<PathBuf>)> {
    [FFMPEG, FFPROBE, YT_DLP]
        .into_iter()
        .map(|name| (name, which::which(name).ok()))
        .collect()
}
