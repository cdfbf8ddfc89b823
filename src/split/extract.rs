use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::error::ChunkError;
use crate::split::plan::Chunk;
use crate::tool::{self, Tool};

/// How ffmpeg produces each chunk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum ExtractMode {
    /// Stream copy. Fast, but cuts can only land on keyframes, so chunk
    /// boundaries drift to the nearest keyframe.
    #[default]
    Copy,
    /// Decode and re-encode every chunk (libx264/aac). Slow, frame-accurate cuts.
    Reencode,
}

impl ExtractMode {
    fn codec_args(&self) -> &'static [&'static str] {
        match self {
            ExtractMode::Copy => &["-c", "copy", "-avoid_negative_ts", "make_zero"],
            ExtractMode::Reencode => &[
                "-c:v", "libx264", "-preset", "medium", "-crf", "20", "-c:a", "aac", "-b:a", "192k",
            ],
        }
    }
}

/// Hidden sibling ffmpeg writes into before the chunk is published. The real
/// extension is kept last so ffmpeg still picks the right muxer.
pub fn partial_path(output: &Path) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_default();
    let name = match output.extension() {
        Some(ext) => format!(".{}.partial.{}", stem, ext.to_string_lossy()),
        None => format!(".{}.partial", stem),
    };
    output.with_file_name(name)
}

pub fn extract_args(
    source: &Path,
    chunk: &Chunk,
    target: &Path,
    mode: ExtractMode,
) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "-y".into(),
        "-loglevel".into(),
        "error".into(),
        "-ss".into(),
        chunk.start.to_string().into(),
        "-i".into(),
        source.into(),
        "-t".into(),
        chunk.duration.to_string().into(),
    ];
    args.extend(mode.codec_args().iter().map(OsString::from));
    args.push(target.into());
    args
}

/// Cut one chunk and publish it under its final name.
pub async fn extract_chunk(
    ffmpeg: &Tool,
    source: &Path,
    chunk: &Chunk,
    mode: ExtractMode,
) -> Result<PathBuf, ChunkError> {
    let partial = partial_path(&chunk.output);
    let fail = |message: String| {
        discard(&partial);
        ChunkError {
            index: chunk.index,
            label: chunk.label.clone(),
            output: chunk.output.clone(),
            message,
        }
    };

    let output = ffmpeg
        .output(&extract_args(source, chunk, &partial, mode))
        .await
        .map_err(|err| fail(err.to_string()))?;

    if !output.status.success() {
        return Err(fail(format!("{}: {}", ffmpeg.name(), tool::stderr_summary(&output))));
    }

    if !partial.is_file() {
        return Err(fail(format!("{} produced no output file", ffmpeg.name())));
    }

    if let Err(err) = tokio::fs::rename(&partial, &chunk.output).await {
        return Err(fail(format!("failed to publish chunk: {}", err)));
    }

    Ok(chunk.output.clone())
}

fn discard(partial: &Path) {
    match std::fs::remove_file(partial) {
        Ok(_) => {}
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => tracing::warn!("failed to remove partial chunk {}: {}", partial.display(), err),
    }
}
