use std::path::{Path, PathBuf};

use crate::download::{self, Auth};
use crate::error::Result;
use crate::options::Options;
use crate::split::{AbortHandle, SegmentationReport, Segmenter, SourcePolicy};

/// Download `url` and split it. With [`SourcePolicy::Delete`] the downloaded
/// file is removed once every part has been written. Tripping `abort` during
/// the download cancels it.
pub async fn cut_url(
    url: &str,
    auth: &Auth,
    options: &Options,
    policy: SourcePolicy,
    abort: &AbortHandle,
) -> Result<SegmentationReport> {
    // Fail on missing ffmpeg/ffprobe before spending time on the download.
    let segmenter = Segmenter::from_path(options)?.with_abort_handle(abort.clone());

    let source = download::fetch_with_fallback(url, auth, options, abort).await?;
    segmenter.split(&source, policy).await
}

/// Split files the user already has. Sources are never deleted.
pub async fn split_files(
    files: &[PathBuf],
    options: &Options,
    abort: &AbortHandle,
) -> Result<Vec<(PathBuf, Result<SegmentationReport>)>> {
    let segmenter = Segmenter::from_path(options)?.with_abort_handle(abort.clone());
    Ok(split_each(&segmenter, files, abort).await)
}

async fn split_each(
    segmenter: &Segmenter,
    files: &[PathBuf],
    abort: &AbortHandle,
) -> Vec<(PathBuf, Result<SegmentationReport>)> {
    let mut results = Vec::new();

    for file in files {
        if abort.is_aborted() {
            tracing::warn!("Aborted, not splitting {}", file.display());
            break;
        }
        let result = segmenter.split(file, SourcePolicy::Keep).await;
        results.push((file.to_owned(), result));
    }

    results
}

pub fn print_report(report: &SegmentationReport) {
    println!(
        "Split {} ({:.1}s) into {} / {} parts in {}",
        report.source.display(),
        report.duration,
        report.produced.len(),
        report.planned,
        report.output_dir.display()
    );

    for failure in &report.failures {
        eprintln!("  failed {}", failure);
    }
    if report.aborted {
        eprintln!("  aborted, {} parts not started", report.skipped);
    }
    if report.source_removed {
        println!("  removed source {}", report.source.display());
    }
}

pub fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::split::Naming;
    use crate::tool::Tool;
    use chrono::NaiveDate;
    use std::os::unix::fs::PermissionsExt;

    const FFMPEG_OK: &str = r#"for last; do :; done
printf 'chunk' > "$last""#;

    fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[tokio::test]
    async fn batch_split_keeps_every_source() {
        let dir = tempfile::tempdir().unwrap();
        let ffprobe = script(dir.path(), "ffprobe", "echo 90");
        let ffmpeg = script(dir.path(), "ffmpeg", FFMPEG_OK);
        let options = Options {
            output_root: dir.path().join("out"),
            ..Options::default()
        };
        let segmenter = Segmenter::new(
            Tool::at("ffprobe", ffprobe, 3),
            Tool::at("ffmpeg", ffmpeg, 3),
            &options,
        );

        let files: Vec<PathBuf> =
            ["a.mp4", "b.mp4"].iter().map(|name| dir.path().join(name)).collect();
        for file in &files {
            std::fs::write(file, b"video").unwrap();
        }

        let results = split_each(&segmenter, &files, &AbortHandle::new()).await;
        assert_eq!(results.len(), 2);
        for (file, result) in &results {
            let report = result.as_ref().unwrap();
            assert!(report.is_complete());
            assert_eq!(report.produced.len(), 2);
            assert!(!report.source_removed);
            assert!(file.exists());
        }

        let out = results[0].1.as_ref().unwrap().output_dir.clone();
        let mut names: Vec<String> = std::fs::read_dir(&out)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        assert_eq!(names, vec!["a_001.mp4", "a_002.mp4", "b_001.mp4", "b_002.mp4"]);
    }

    #[tokio::test]
    async fn batch_split_refuses_to_overwrite_a_source_in_the_output_dir() {
        let dir = tempfile::tempdir().unwrap();
        let ffprobe = script(dir.path(), "ffprobe", "echo 90");
        let ffmpeg = script(dir.path(), "ffmpeg", FFMPEG_OK);
        let options = Options {
            output_root: dir.path().join("out"),
            naming: Naming::Literal,
            ..Options::default()
        };
        let date = NaiveDate::from_ymd_opt(2026, 10, 17).unwrap();
        let segmenter = Segmenter::new(
            Tool::at("ffprobe", ffprobe, 3),
            Tool::at("ffmpeg", ffmpeg, 3),
            &options,
        )
        .with_date(date);

        let day_dir = dir.path().join("out").join("2026-10-17");
        std::fs::create_dir_all(&day_dir).unwrap();
        let source = day_dir.join("part_001.mp4");
        std::fs::write(&source, b"ORIGINAL-VIDEO").unwrap();

        let results = split_each(&segmenter, &[source.clone()], &AbortHandle::new()).await;
        assert_eq!(results.len(), 1);
        match &results[0].1 {
            Err(Error::SourceCollision { path, label }) => {
                assert_eq!(path, &source);
                assert_eq!(label, "001");
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(std::fs::read(&source).unwrap(), b"ORIGINAL-VIDEO");
        assert!(!day_dir.join("part_002.mp4").exists());
    }

    #[tokio::test]
    async fn batch_stops_after_abort() {
        let dir = tempfile::tempdir().unwrap();
        let options = Options::default();
        let segmenter = Segmenter::new(
            Tool::at("ffprobe", dir.path().join("ffprobe"), 0),
            Tool::at("ffmpeg", dir.path().join("ffmpeg"), 0),
            &options,
        );
        let abort = AbortHandle::new();
        abort.abort();

        let results = split_each(&segmenter, &[dir.path().join("a.mp4")], &abort).await;
        assert!(results.is_empty());
    }
}
