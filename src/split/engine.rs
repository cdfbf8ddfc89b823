use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use chrono::NaiveDate;
use tokio::sync::{Notify, Semaphore};

use crate::error::{ChunkError, Error, Result};
use crate::options::Options;
use crate::split::extract::{self, ExtractMode};
use crate::split::plan::{self, Chunk, Naming, Plan};
use crate::split::probe;
use crate::tool::{self, Tool};

/// What happens to the source file once it has been split.
///
/// `Delete` is for files this program downloaded itself. Files handed in by
/// the user are always split with `Keep`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourcePolicy {
    Keep,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    Probing,
    Planning,
    Extracting(u32),
    Finalizing,
    Done,
    Error,
}

#[derive(Debug, Default)]
struct AbortState {
    aborted: AtomicBool,
    notify: Notify,
}

/// Stops a running split from starting further chunks and cancels
/// downloads wrapped in [`AbortHandle::run`].
#[derive(Debug, Clone, Default)]
pub struct AbortHandle(Arc<AbortState>);

impl AbortHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.0.aborted.store(true, Ordering::SeqCst);
        self.0.notify.notify_waiters();
    }

    pub fn is_aborted(&self) -> bool {
        self.0.aborted.load(Ordering::SeqCst)
    }

    /// Resolves once [`abort`](Self::abort) has been called.
    pub async fn aborted(&self) {
        loop {
            // Registered before the flag check so a concurrent abort is not missed.
            let notified = self.0.notify.notified();
            if self.is_aborted() {
                return;
            }
            notified.await;
        }
    }

    /// Drive `work` to completion unless the handle is tripped first, in
    /// which case `work` is dropped and [`Error::Aborted`] returned.
    pub async fn run<T>(&self, work: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::select! {
            result = work => result,
            _ = self.aborted() => Err(Error::Aborted),
        }
    }
}

#[derive(Debug)]
pub struct SegmentationReport {
    pub source: PathBuf,
    pub duration: f64,
    pub output_dir: PathBuf,
    pub planned: u32,
    /// Published chunk paths, in part order.
    pub produced: Vec<PathBuf>,
    pub failures: Vec<ChunkError>,
    /// Chunks never started because the run was aborted.
    pub skipped: u32,
    /// At least one chunk was skipped. An abort that lands after the last
    /// chunk started does not count.
    pub aborted: bool,
    pub source_removed: bool,
}

impl SegmentationReport {
    pub fn is_complete(&self) -> bool {
        !self.aborted && self.failures.is_empty() && self.produced.len() == self.planned as usize
    }
}

enum ChunkOutcome {
    Produced(PathBuf),
    Failed(ChunkError),
    Skipped,
}

pub struct Segmenter {
    ffprobe: Tool,
    ffmpeg: Tool,
    output_root: PathBuf,
    chunk_seconds: u32,
    mode: ExtractMode,
    naming: Naming,
    max_parallel_jobs: usize,
    date: Option<NaiveDate>,
    abort: AbortHandle,
}

impl Segmenter {
    /// Build a segmenter using `ffprobe` and `ffmpeg` from PATH.
    pub fn from_path(options: &Options) -> Result<Self> {
        let ffprobe = Tool::locate(tool::FFPROBE, options.max_spawn_retries)?;
        let ffmpeg = Tool::locate(tool::FFMPEG, options.max_spawn_retries)?;
        Ok(Self::new(ffprobe, ffmpeg, options))
    }

    pub fn new(ffprobe: Tool, ffmpeg: Tool, options: &Options) -> Self {
        Self {
            ffprobe,
            ffmpeg,
            output_root: options.output_root.clone(),
            chunk_seconds: options.chunk_seconds.max(1),
            mode: options.mode,
            naming: options.naming,
            max_parallel_jobs: options.max_parallel_jobs.max(1),
            date: None,
            abort: AbortHandle::new(),
        }
    }

    /// Pin the dated directory instead of using today's local date.
    pub fn with_date(mut self, date: NaiveDate) -> Self {
        self.date = Some(date);
        self
    }

    pub fn with_abort_handle(mut self, abort: AbortHandle) -> Self {
        self.abort = abort;
        self
    }

    fn enter(&self, stage: Stage, source: &Path) {
        tracing::debug!(?stage, source = %source.display(), "segmentation stage");
    }

    /// Split `source` into `chunk_seconds` long parts under
    /// `<output_root>/<YYYY-MM-DD>/`.
    ///
    /// Probe and directory creation failures abort the run before any chunk
    /// is written, as does a plan whose outputs would replace `source`.
    /// Chunk failures are collected in the report. The source is only
    /// removed with [`SourcePolicy::Delete`] after every chunk has been
    /// published.
    pub async fn split(&self, source: &Path, policy: SourcePolicy) -> Result<SegmentationReport> {
        self.enter(Stage::Idle, source);

        self.enter(Stage::Probing, source);
        let duration = match probe::probe_duration(&self.ffprobe, source).await {
            Ok(duration) => duration,
            Err(err) => {
                self.enter(Stage::Error, source);
                tracing::error!("Error probing {}: {}", source.display(), err);
                return Err(err);
            }
        };

        self.enter(Stage::Planning, source);
        let output_dir = plan::dated_dir(&self.output_root, self.date.unwrap_or_else(plan::today));
        if let Err(err) = tokio::fs::create_dir_all(&output_dir).await {
            self.enter(Stage::Error, source);
            tracing::error!("Error creating folder {}: {}", output_dir.display(), err);
            return Err(Error::filesystem("create directory", &output_dir, err));
        }
        let plan = Plan::new(source, duration, self.chunk_seconds, &output_dir, self.naming);
        if let Err(err) = guard_source(source, &output_dir, &plan).await {
            self.enter(Stage::Error, source);
            tracing::error!("Error planning {}: {}", source.display(), err);
            return Err(err);
        }

        tracing::info!(
            "Splitting {} ({:.1}s) into {} parts of {}s",
            source.display(),
            duration,
            plan.part_count(),
            self.chunk_seconds
        );

        let outcomes = self.extract_all(&plan).await;

        let mut produced = Vec::new();
        let mut failures = Vec::new();
        let mut skipped = 0;
        for outcome in outcomes {
            match outcome {
                ChunkOutcome::Produced(path) => produced.push(path),
                ChunkOutcome::Failed(err) => failures.push(err),
                ChunkOutcome::Skipped => skipped += 1,
            }
        }

        self.enter(Stage::Finalizing, source);
        let mut report = SegmentationReport {
            source: source.to_path_buf(),
            duration,
            output_dir,
            planned: plan.part_count(),
            produced,
            failures,
            skipped,
            aborted: skipped > 0,
            source_removed: false,
        };

        if policy == SourcePolicy::Delete {
            if report.is_complete() {
                match tokio::fs::remove_file(source).await {
                    Ok(_) => report.source_removed = true,
                    Err(err) => {
                        tracing::warn!("Error removing source {}: {}", source.display(), err)
                    }
                }
            } else {
                tracing::warn!(
                    "Keeping source {} because the split is incomplete",
                    source.display()
                );
            }
        }

        self.enter(Stage::Done, source);
        Ok(report)
    }

    async fn extract_all(&self, plan: &Plan) -> Vec<ChunkOutcome> {
        let semaphore = Arc::new(Semaphore::new(self.max_parallel_jobs));
        let finished = Arc::new(AtomicU32::new(0));
        let total = plan.part_count();

        let tasks = plan
            .chunks
            .iter()
            .cloned()
            .map(|chunk| {
                let semaphore = Arc::clone(&semaphore);
                let finished = Arc::clone(&finished);
                let abort = self.abort.clone();
                let ffmpeg = self.ffmpeg.clone();
                let source = plan.source.clone();
                let mode = self.mode;
                let job = chunk.clone();

                let handle = tokio::spawn(async move {
                    let chunk = job;
                    let Ok(_permit) = semaphore.acquire_owned().await else {
                        return ChunkOutcome::Skipped;
                    };
                    if abort.is_aborted() {
                        return ChunkOutcome::Skipped;
                    }

                    tracing::debug!(
                        stage = ?Stage::Extracting(chunk.index),
                        "extracting {} [{}s, {:.1}s)",
                        chunk.output.display(),
                        chunk.start,
                        chunk.end
                    );

                    let result = extract::extract_chunk(&ffmpeg, &source, &chunk, mode).await;
                    let outcome = match result {
                        Ok(path) => ChunkOutcome::Produced(path),
                        Err(err) => {
                            tracing::warn!(index = err.index, "Error extracting {}", err);
                            ChunkOutcome::Failed(err)
                        }
                    };

                    let done = finished.fetch_add(1, Ordering::SeqCst) + 1;
                    let width = total.to_string().len();
                    let percent = (done as f64 / total as f64) * 100.;
                    tracing::info!(
                        "Processed {done:width$} / {total:width$} parts ({percent:5.2}%)\t {}",
                        chunk.label
                    );

                    outcome
                });

                (chunk, handle)
            })
            .collect::<Vec<_>>();

        let mut outcomes = Vec::with_capacity(tasks.len());
        for (chunk, task) in tasks {
            match task.await {
                Ok(outcome) => outcomes.push(outcome),
                Err(err) => outcomes.push(ChunkOutcome::Failed(join_failure(&chunk, err))),
            }
        }

        outcomes
    }
}

/// Fail before extraction if publishing any chunk would replace `source`.
async fn guard_source(source: &Path, output_dir: &Path, plan: &Plan) -> Result<()> {
    let source_real = tokio::fs::canonicalize(source)
        .await
        .map_err(|err| Error::filesystem("resolve path", source, err))?;
    let dir_real = tokio::fs::canonicalize(output_dir)
        .await
        .map_err(|err| Error::filesystem("resolve path", output_dir, err))?;

    for chunk in &plan.chunks {
        let partial = extract::partial_path(&chunk.output);
        for target in [&chunk.output, &partial] {
            let Some(name) = target.file_name() else { continue };
            if dir_real.join(name) == source_real {
                return Err(Error::SourceCollision {
                    path: source.to_path_buf(),
                    label: chunk.label.clone(),
                });
            }
        }
    }

    Ok(())
}

fn join_failure(chunk: &Chunk, err: tokio::task::JoinError) -> ChunkError {
    ChunkError {
        index: chunk.index,
        label: chunk.label.clone(),
        output: chunk.output.clone(),
        message: format!("chunk task failed: {}", err),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    const FFMPEG_OK: &str = r#"for last; do :; done
printf 'chunk' > "$last""#;

    const FFMPEG_FAILS_AT_60: &str = r#"prev=""
for arg; do
  if [ "$prev" = "-ss" ] && [ "$arg" = "60" ]; then echo "cut failed" >&2; exit 1; fi
  prev="$arg"
done
for last; do :; done
printf 'chunk' > "$last""#;

    const FFMPEG_WRITES_THEN_FAILS: &str = r#"for last; do :; done
printf 'trunc' > "$last"
exit 1"#;

    fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        root: PathBuf,
        source: PathBuf,
        bin: PathBuf,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let root = dir.path().join("videos_output");
            let bin = dir.path().join("bin");
            std::fs::create_dir_all(&bin).unwrap();
            let source = dir.path().join("clip.mp4");
            std::fs::write(&source, b"video").unwrap();
            Self { _dir: dir, root, source, bin }
        }

        fn segmenter(&self, duration: &str, ffmpeg: &str, parallel: usize) -> Segmenter {
            let ffprobe = script(&self.bin, "ffprobe", &format!("echo {}", duration));
            let ffmpeg = script(&self.bin, "ffmpeg", ffmpeg);
            let options = Options {
                output_root: self.root.clone(),
                max_parallel_jobs: parallel,
                ..Options::default()
            };
            Segmenter::new(Tool::at("ffprobe", ffprobe, 3), Tool::at("ffmpeg", ffmpeg, 3), &options)
                .with_date(date())
        }

        fn day_dir(&self) -> PathBuf {
            self.root.join("2026-10-17")
        }

        fn listing(&self) -> Vec<String> {
            let mut names: Vec<String> = std::fs::read_dir(self.day_dir())
                .unwrap()
                .map(|entry| entry.unwrap().file_name().to_string_lossy().to_string())
                .collect();
            names.sort();
            names
        }
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 17).unwrap()
    }

    #[tokio::test]
    async fn splits_into_dated_directory() {
        let fx = Fixture::new();
        let segmenter = fx.segmenter("125.0", FFMPEG_OK, 1);
        let report = segmenter.split(&fx.source, SourcePolicy::Keep).await.unwrap();

        assert_eq!(report.output_dir, fx.day_dir());
        assert_eq!(report.planned, 3);
        assert!(report.is_complete());
        assert_eq!(fx.listing(), vec!["clip_001.mp4", "clip_002.mp4", "clip_003.mp4"]);
        assert_eq!(report.produced[0], fx.day_dir().join("clip_001.mp4"));
        assert!(fx.source.exists());
        assert!(!report.source_removed);
    }

    #[tokio::test]
    async fn exact_multiple_produces_trailing_part() {
        let fx = Fixture::new();
        let segmenter = fx.segmenter("60.000000", FFMPEG_OK, 1);
        let report = segmenter.split(&fx.source, SourcePolicy::Keep).await.unwrap();
        assert_eq!(report.planned, 2);
        assert_eq!(fx.listing(), vec!["clip_001.mp4", "clip_002.mp4"]);
    }

    #[tokio::test]
    async fn delete_policy_removes_source_after_full_success() {
        let fx = Fixture::new();
        let segmenter = fx.segmenter("125.0", FFMPEG_OK, 2);
        let report = segmenter.split(&fx.source, SourcePolicy::Delete).await.unwrap();
        assert!(report.is_complete());
        assert!(report.source_removed);
        assert!(!fx.source.exists());
    }

    #[tokio::test]
    async fn probe_failure_writes_nothing_and_keeps_source() {
        let fx = Fixture::new();
        let segmenter = fx.segmenter("125.0", FFMPEG_OK, 1);
        script(&fx.bin, "ffprobe", "echo 'moov atom not found' >&2; exit 1");

        let err = segmenter.split(&fx.source, SourcePolicy::Delete).await.unwrap_err();
        match err {
            Error::Probe { tool, path, message } => {
                assert_eq!(tool, "ffprobe");
                assert_eq!(path, fx.source);
                assert!(message.contains("moov atom not found"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(fx.source.exists());
        assert!(!fx.day_dir().exists());
    }

    #[tokio::test]
    async fn unparseable_probe_output_is_fatal() {
        let fx = Fixture::new();
        let segmenter = fx.segmenter("N/A", FFMPEG_OK, 1);
        let err = segmenter.split(&fx.source, SourcePolicy::Keep).await.unwrap_err();
        assert!(matches!(err, Error::Probe { .. }));
        assert!(!fx.day_dir().exists());
    }

    #[tokio::test]
    async fn chunk_failure_is_collected_and_source_kept() {
        let fx = Fixture::new();
        let report = fx
            .segmenter("125.0", FFMPEG_FAILS_AT_60, 1)
            .split(&fx.source, SourcePolicy::Delete)
            .await
            .unwrap();

        assert_eq!(report.planned, 3);
        assert_eq!(report.produced.len(), 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].index, 1);
        assert_eq!(report.failures[0].label, "002");
        assert!(report.failures[0].message.contains("cut failed"));
        assert!(!report.is_complete());
        assert_eq!(fx.listing(), vec!["clip_001.mp4", "clip_003.mp4"]);
        assert!(fx.source.exists());
        assert!(!report.source_removed);
    }

    #[tokio::test]
    async fn failed_chunk_leaves_no_partial_file() {
        let fx = Fixture::new();
        let report = fx
            .segmenter("30", FFMPEG_WRITES_THEN_FAILS, 1)
            .split(&fx.source, SourcePolicy::Keep)
            .await
            .unwrap();
        assert_eq!(report.failures.len(), 1);
        assert!(fx.listing().is_empty());
    }

    #[tokio::test]
    async fn rerun_overwrites_same_names() {
        let fx = Fixture::new();
        let segmenter = fx.segmenter("125.0", FFMPEG_OK, 1);
        segmenter.split(&fx.source, SourcePolicy::Keep).await.unwrap();
        let report = segmenter.split(&fx.source, SourcePolicy::Keep).await.unwrap();

        assert!(report.is_complete());
        assert_eq!(fx.listing(), vec!["clip_001.mp4", "clip_002.mp4", "clip_003.mp4"]);
    }

    #[tokio::test]
    async fn parallel_jobs_keep_part_order() {
        let fx = Fixture::new();
        let segmenter = fx.segmenter("330", FFMPEG_OK, 4);
        let report = segmenter.split(&fx.source, SourcePolicy::Keep).await.unwrap();

        let names: Vec<String> = report
            .produced
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(
            names,
            vec![
                "clip_001.mp4",
                "clip_002.mp4",
                "clip_003.mp4",
                "clip_004.mp4",
                "clip_005.mp4",
                "clip_006.mp4"
            ]
        );
    }

    #[tokio::test]
    async fn aborted_run_skips_chunks_and_keeps_source() {
        let fx = Fixture::new();
        let abort = AbortHandle::new();
        abort.abort();
        let segmenter = fx.segmenter("125.0", FFMPEG_OK, 1).with_abort_handle(abort);

        let report = segmenter.split(&fx.source, SourcePolicy::Delete).await.unwrap();
        assert!(report.aborted);
        assert_eq!(report.skipped, 3);
        assert!(report.produced.is_empty());
        assert!(fx.listing().is_empty());
        assert!(fx.source.exists());
    }

    #[tokio::test]
    async fn abort_after_last_chunk_started_keeps_run_complete() {
        let fx = Fixture::new();
        let abort = AbortHandle::new();
        let segmenter = fx
            .segmenter("30", &format!("sleep 0.5\n{}", FFMPEG_OK), 1)
            .with_abort_handle(abort.clone());

        let late = tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(250)).await;
            abort.abort();
        });
        let report = segmenter.split(&fx.source, SourcePolicy::Delete).await.unwrap();
        late.await.unwrap();

        assert_eq!(report.skipped, 0);
        assert!(!report.aborted);
        assert!(report.is_complete());
        assert!(report.source_removed);
    }

    #[tokio::test]
    async fn run_returns_aborted_when_tripped() {
        let abort = AbortHandle::new();
        let trip = abort.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            trip.abort();
        });

        let started = std::time::Instant::now();
        let result: Result<()> = abort
            .run(async {
                tokio::time::sleep(std::time::Duration::from_secs(30)).await;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(Error::Aborted)));
        assert!(started.elapsed() < std::time::Duration::from_secs(5));
    }

    #[tokio::test]
    async fn run_passes_through_finished_work() {
        let abort = AbortHandle::new();
        let result = abort.run(async { Ok(7) }).await.unwrap();
        assert_eq!(result, 7);

        abort.abort();
        let pending = abort.run(std::future::pending::<Result<()>>()).await;
        assert!(matches!(pending, Err(Error::Aborted)));
    }

    #[tokio::test]
    async fn literal_naming_matches_part_scheme() {
        let fx = Fixture::new();
        let ffprobe = script(&fx.bin, "ffprobe", "echo 61");
        let ffmpeg = script(&fx.bin, "ffmpeg", FFMPEG_OK);
        let options = Options {
            output_root: fx.root.clone(),
            naming: Naming::Literal,
            ..Options::default()
        };
        let segmenter =
            Segmenter::new(Tool::at("ffprobe", ffprobe, 3), Tool::at("ffmpeg", ffmpeg, 3), &options)
                .with_date(date());

        segmenter.split(&fx.source, SourcePolicy::Keep).await.unwrap();
        assert_eq!(fx.listing(), vec!["part_001.mp4", "part_002.mp4"]);
    }
}
