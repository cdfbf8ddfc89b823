use std::path::PathBuf;

/// A failed chunk extraction. Collected into the run report, never raised.
#[derive(Debug, Clone)]
pub struct ChunkError {
    pub index: u32,
    pub label: String,
    pub output: PathBuf,
    pub message: String,
}

impl std::fmt::Display for ChunkError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "chunk {} ({}): {}", self.label, self.output.display(), self.message)
    }
}

impl std::error::Error for ChunkError {}
