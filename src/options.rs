use std::path::PathBuf;

use crate::download::{Auth, DEFAULT_BROWSER};
use crate::split::{ExtractMode, Naming};

#[derive(Debug, Clone)]
pub struct Options {
    pub max_parallel_jobs: usize,
    pub max_spawn_retries: usize,
    pub output_root: PathBuf,
    pub downloads_dir: PathBuf,
    pub chunk_seconds: u32,
    pub mode: ExtractMode,
    pub naming: Naming,
    /// Tried once when a download turns out to need a signed-in session.
    pub fallback_auth: Option<Auth>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            max_parallel_jobs: 1,
            max_spawn_retries: 3,
            output_root: PathBuf::from("videos_output"),
            downloads_dir: PathBuf::from("youtube_downloads"),
            chunk_seconds: 60,
            mode: ExtractMode::Copy,
            naming: Naming::SourceStem,
            fallback_auth: Some(Auth::Browser(DEFAULT_BROWSER.to_string())),
        }
    }
}
