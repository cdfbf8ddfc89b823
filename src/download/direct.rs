use std::path::{Path, PathBuf};

use bytes::Bytes;
use reqwest::StatusCode;
use tokio::io::AsyncWriteExt;
use url::Url;

use crate::error::{Error, Result};
use crate::split::AbortHandle;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; rv:78.0) Gecko/20100101 Firefox/78.0";

pub struct DownloadClient {
    client: reqwest::Client,
}

impl DownloadClient {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder().user_agent(USER_AGENT).build()?;

        Ok(Self { client })
    }

    /// Stream `url` into `dir`, named after the last URL path segment.
    ///
    /// The body is written to a hidden `.partial` file first and renamed once
    /// the whole body has arrived. An abort drops the transfer and removes
    /// the partial file.
    pub async fn download_to(&self, url: &Url, dir: &Path, abort: &AbortHandle) -> Result<PathBuf> {
        let output = dir.join(file_name(url));
        let partial = dir.join(format!(".{}.partial", file_name(url)));

        if let Err(err) = abort.run(self.stream_to(url, &partial)).await {
            discard(&partial).await;
            return Err(err);
        }

        tokio::fs::rename(&partial, &output)
            .await
            .map_err(|err| Error::filesystem("rename download", &output, err))?;

        Ok(output)
    }

    async fn stream_to(&self, url: &Url, partial: &Path) -> Result<()> {
        let mut response = self
            .client
            .get(url.as_str())
            .send()
            .await
            .map_err(|err| network(url, err))?;

        if let Some(err) = status_error(url, response.status()) {
            return Err(err);
        }

        let expected = response.content_length();
        let mut file = tokio::fs::File::create(partial)
            .await
            .map_err(|err| Error::filesystem("create file", partial, err))?;

        let mut written: u64 = 0;
        loop {
            let chunk: Option<Bytes> = response.chunk().await.map_err(|err| network(url, err))?;
            let Some(chunk) = chunk else { break };
            file.write_all(&chunk)
                .await
                .map_err(|err| Error::filesystem("write", partial, err))?;
            written += chunk.len() as u64;
        }
        file.flush().await.map_err(|err| Error::filesystem("write", partial, err))?;

        if let Some(expected) = expected {
            if written != expected {
                return Err(Error::Network {
                    url: url.to_string(),
                    message: format!("body truncated: got {} of {} bytes", written, expected),
                });
            }
        }

        Ok(())
    }
}

async fn discard(partial: &Path) {
    match tokio::fs::remove_file(partial).await {
        Ok(_) => {}
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => {
            tracing::warn!("failed to remove partial download {}: {}", partial.display(), err)
        }
    }
}

fn network(url: &Url, err: reqwest::Error) -> Error {
    Error::Network {
        url: url.to_string(),
        message: err.to_string(),
    }
}

/// Map a non-success HTTP status onto the acquisition error kinds.
pub fn status_error(url: &Url, status: StatusCode) -> Option<Error> {
    if status.is_success() {
        return None;
    }

    let url = url.to_string();
    Some(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Error::AuthRequired { url },
        StatusCode::NOT_FOUND | StatusCode::GONE => Error::NotFound { url },
        other => Error::Network {
            url,
            message: format!("HTTP status {}", other),
        },
    })
}

pub fn file_name(url: &Url) -> String {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|name| !name.is_empty())
        .map(|name| name.to_string())
        .unwrap_or_else(|| "video.mp4".to_string())
}
