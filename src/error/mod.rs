pub mod chunk_error;

use std::path::PathBuf;

pub use chunk_error::ChunkError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("tool not found: {tool}")]
    ToolNotFound { tool: String },

    /// Duration probe failed; fatal for the whole segmentation run.
    #[error("probe failed: {tool} on {}: {message}", path.display())]
    Probe {
        tool: String,
        path: PathBuf,
        message: String,
    },

    #[error("failed to {action} {}: {source}", path.display())]
    Filesystem {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("authentication required for {url}")]
    AuthRequired { url: String },

    #[error("network error for {url}: {message}")]
    Network { url: String, message: String },

    #[error("not found: {url}")]
    NotFound { url: String },

    /// A planned chunk would be written over the file being split.
    #[error("refusing to overwrite source {}: it is also part {label}", path.display())]
    SourceCollision { path: PathBuf, label: String },

    #[error("interrupted")]
    Aborted,

    #[error("{tool} failed: {message}")]
    Tool { tool: String, message: String },

    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl Error {
    pub fn probe(
        tool: impl Into<String>,
        path: impl Into<PathBuf>,
        message: impl Into<String>,
    ) -> Self {
        Self::Probe {
            tool: tool.into(),
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn filesystem(
        action: &'static str,
        path: impl Into<PathBuf>,
        source: std::io::Error,
    ) -> Self {
        Self::Filesystem {
            action,
            path: path.into(),
            source,
        }
    }

    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Tool {
            tool: tool.into(),
            message: message.into(),
        }
    }

    pub fn is_auth_required(&self) -> bool {
        matches!(self, Self::AuthRequired { .. })
    }
}
