use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::download::Auth;
use crate::error::{Error, Result};
use crate::tool::Tool;

const FORMAT: &str = "bestvideo+bestaudio/best";
const OUTPUT_TEMPLATE: &str = "%(title)s.%(ext)s";

const AUTH_MARKERS: &[&str] = &[
    "sign in to confirm",
    "login required",
    "use --cookies",
    "private video",
    "age-restricted",
    "members-only",
    "http error 401",
    "http error 403",
];

const NOT_FOUND_MARKERS: &[&str] = &[
    "video unavailable",
    "http error 404",
    "does not exist",
    "unsupported url",
];

pub fn download_args(url: &str, auth: &Auth, downloads_dir: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "--no-playlist".into(),
        "--quiet".into(),
        "--no-warnings".into(),
        "-f".into(),
        FORMAT.into(),
        "--merge-output-format".into(),
        "mp4".into(),
        "-o".into(),
        downloads_dir.join(OUTPUT_TEMPLATE).into(),
        // Report the final path instead of making the caller look for it.
        "--print".into(),
        "after_move:filepath".into(),
        "--no-simulate".into(),
    ];

    match auth {
        Auth::None => {}
        Auth::CookieFile(path) => {
            args.push("--cookies".into());
            args.push(path.into());
        }
        Auth::Browser(name) => {
            args.push("--cookies-from-browser".into());
            args.push(name.into());
        }
    }

    args.push(url.into());
    args
}

/// Download with yt-dlp and return the path of the merged file.
pub async fn download(
    ytdlp: &Tool,
    url: &str,
    auth: &Auth,
    downloads_dir: &Path,
) -> Result<PathBuf> {
    let output = ytdlp.output(&download_args(url, auth, downloads_dir)).await?;

    if !output.status.success() {
        return Err(classify_failure(url, &String::from_utf8_lossy(&output.stderr)));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let path = printed_path(&stdout)
        .ok_or_else(|| Error::tool(ytdlp.name(), format!("no file path reported for {}", url)))?;

    if !path.is_file() {
        return Err(Error::tool(
            ytdlp.name(),
            format!("reported file {} does not exist", path.display()),
        ));
    }

    Ok(path)
}

pub fn printed_path(stdout: &str) -> Option<PathBuf> {
    stdout
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(PathBuf::from)
}

/// Turn yt-dlp's stderr into a typed acquisition error.
pub fn classify_failure(url: &str, stderr: &str) -> Error {
    let lower = stderr.to_lowercase();
    let url = url.to_string();

    if AUTH_MARKERS.iter().any(|marker| lower.contains(marker)) {
        return Error::AuthRequired { url };
    }
    if NOT_FOUND_MARKERS.iter().any(|marker| lower.contains(marker)) {
        return Error::NotFound { url };
    }

    let message = stderr
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("yt-dlp exited with an error")
        .to_string();
    Error::Network { url, message }
}
