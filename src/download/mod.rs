pub mod direct;
pub mod ytdlp;

use std::future::Future;
use std::path::PathBuf;

use url::Url;

use crate::error::{Error, Result};
use crate::options::Options;
use crate::split::AbortHandle;
use crate::tool::{self, Tool};

/// Browser yt-dlp reads cookies from when a video needs a signed-in session.
pub const DEFAULT_BROWSER: &str = "firefox";

const DIRECT_EXTENSIONS: &[&str] = &["mp4", "webm", "mkv", "mov", "m4v"];

/// Credentials for a single fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Auth {
    #[default]
    None,
    CookieFile(PathBuf),
    Browser(String),
}

impl std::fmt::Display for Auth {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Auth::None => write!(f, "no cookies"),
            Auth::CookieFile(path) => write!(f, "cookie file {}", path.display()),
            Auth::Browser(name) => write!(f, "cookies from {}", name),
        }
    }
}

/// True when the URL points straight at a media file rather than a page.
pub fn is_direct_media(url: &Url) -> bool {
    let path = url.path();
    match path.rsplit_once('.') {
        Some((_, ext)) => DIRECT_EXTENSIONS.iter().any(|known| known.eq_ignore_ascii_case(ext)),
        None => false,
    }
}

/// Download `url` into the downloads directory and return the produced file.
///
/// Tripping `abort` cancels the transfer and returns [`Error::Aborted`].
pub async fn fetch(
    url: &str,
    auth: &Auth,
    options: &Options,
    abort: &AbortHandle,
) -> Result<PathBuf> {
    let parsed = Url::parse(url)?;

    tokio::fs::create_dir_all(&options.downloads_dir)
        .await
        .map_err(|err| Error::filesystem("create directory", &options.downloads_dir, err))?;

    tracing::info!("Downloading {} ({})", url, auth);

    let path = if is_direct_media(&parsed) {
        if *auth != Auth::None {
            tracing::debug!("direct download ignores {}", auth);
        }
        direct::DownloadClient::new()?
            .download_to(&parsed, &options.downloads_dir, abort)
            .await?
    } else {
        let ytdlp = Tool::locate(tool::YT_DLP, options.max_spawn_retries)?;
        abort.run(ytdlp::download(&ytdlp, url, auth, &options.downloads_dir)).await?
    };

    tracing::info!("Finished downloading {} to {}", url, path.display());
    Ok(path)
}

/// [`fetch`] with `auth`, then once more with `options.fallback_auth` if the
/// first attempt needed a signed-in session.
pub async fn fetch_with_fallback(
    url: &str,
    auth: &Auth,
    options: &Options,
    abort: &AbortHandle,
) -> Result<PathBuf> {
    with_auth_fallback(auth, options.fallback_auth.as_ref(), |auth| async move {
        fetch(url, &auth, options, abort).await
    })
    .await
}

async fn with_auth_fallback<F, Fut>(
    auth: &Auth,
    fallback: Option<&Auth>,
    mut attempt: F,
) -> Result<PathBuf>
where
    F: FnMut(Auth) -> Fut,
    Fut: Future<Output = Result<PathBuf>>,
{
    match attempt(auth.clone()).await {
        Err(err) if err.is_auth_required() => match fallback.filter(|fallback| *fallback != auth) {
            Some(fallback) => {
                tracing::warn!("{}; retrying with {}", err, fallback);
                attempt(fallback.clone()).await
            }
            None => Err(err),
        },
        result => result,
    }
}
