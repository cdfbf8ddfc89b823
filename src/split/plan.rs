use std::path::{Path, PathBuf};

use chrono::NaiveDate;

/// How chunk files are named inside the dated directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Naming {
    /// `{source stem}_{NNN}.{source ext}`
    SourceStem,
    /// `part_{NNN}.mp4`
    Literal,
}

impl Naming {
    pub fn file_name(&self, source: &Path, part: u32) -> String {
        let label = part_label(part);
        match self {
            Naming::Literal => format!("part_{}.mp4", label),
            Naming::SourceStem => {
                let stem = source
                    .file_stem()
                    .map(|stem| stem.to_string_lossy().to_string())
                    .unwrap_or_else(|| "part".to_string());
                let ext = source
                    .extension()
                    .map(|ext| ext.to_string_lossy().to_string())
                    .unwrap_or_else(|| "mp4".to_string());
                format!("{}_{}.{}", stem, label, ext)
            }
        }
    }
}

/// Number of chunks for a source of `duration` seconds.
///
/// Always `floor(duration / chunk_seconds) + 1`. When the duration is an exact
/// multiple of the chunk length this yields a trailing chunk that starts at the
/// end of the stream and is empty or near-empty; callers rely on that count, so
/// it is not special-cased.
pub fn part_count(duration: f64, chunk_seconds: u32) -> u32 {
    (duration / chunk_seconds as f64).floor() as u32 + 1
}

pub fn part_label(part: u32) -> String {
    format!("{:03}", part)
}

pub fn dated_dir(root: &Path, date: NaiveDate) -> PathBuf {
    root.join(date.format("%Y-%m-%d").to_string())
}

pub fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

#[derive(Debug, Clone)]
pub struct Chunk {
    /// 0-based position in the plan; part number is `index + 1`.
    pub index: u32,
    pub label: String,
    pub start: u64,
    /// Requested length; ffmpeg clips the last chunk at end of stream.
    pub duration: u32,
    /// Where the chunk actually ends given the probed source length.
    pub end: f64,
    pub output: PathBuf,
}

#[derive(Debug, Clone)]
pub struct Plan {
    pub source: PathBuf,
    pub chunks: Vec<Chunk>,
}

impl Plan {
    pub fn new(
        source: &Path,
        duration: f64,
        chunk_seconds: u32,
        output_dir: &Path,
        naming: Naming,
    ) -> Self {
        let chunks = (0..part_count(duration, chunk_seconds))
            .map(|index| {
                let start = index as u64 * chunk_seconds as u64;
                let part = index + 1;
                Chunk {
                    index,
                    label: part_label(part),
                    start,
                    duration: chunk_seconds,
                    end: ((start + chunk_seconds as u64) as f64).min(duration.max(start as f64)),
                    output: output_dir.join(naming.file_name(source, part)),
                }
            })
            .collect();

        Self {
            source: source.to_path_buf(),
            chunks,
        }
    }

    pub fn part_count(&self) -> u32 {
        self.chunks.len() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn part_count_is_floor_plus_one() {
        assert_eq!(part_count(0.0, 60), 1);
        assert_eq!(part_count(0.5, 60), 1);
        assert_eq!(part_count(59.99, 60), 1);
        assert_eq!(part_count(125.0, 60), 3);
        assert_eq!(part_count(3600.0, 1), 3601);
        for chunk in [1u32, 7, 30, 60, 600] {
            for duration in [0.0, 1.0, 59.5, 60.0, 61.0, 1234.5] {
                let expected = (duration / chunk as f64).floor() as u32 + 1;
                assert_eq!(part_count(duration, chunk), expected);
                assert!(part_count(duration, chunk) >= 1);
            }
        }
    }

    fn plan_for(source: &str, duration: f64, output_dir: &str) -> Plan {
        Plan::new(Path::new(source), duration, 60, Path::new(output_dir), Naming::SourceStem)
    }

    #[test]
    fn exact_multiple_keeps_trailing_chunk() {
        let plan = plan_for("/in/clip.mp4", 60.0, "/out");
        assert_eq!(plan.part_count(), 2);
        let last = &plan.chunks[1];
        assert_eq!(last.start, 60);
        assert_eq!(last.end, 60.0);
    }

    #[test]
    fn last_chunk_is_clipped_at_source_end() {
        let plan = plan_for("/in/clip.mp4", 125.0, "/out");
        let ranges: Vec<(u64, f64)> = plan.chunks.iter().map(|c| (c.start, c.end)).collect();
        assert_eq!(ranges, vec![(0, 60.0), (60, 120.0), (120, 125.0)]);
        assert!(plan.chunks.iter().all(|c| c.duration == 60));
    }

    #[test]
    fn labels_are_contiguous_and_padded() {
        let plan = plan_for("/in/talk.webm", 250.0, "/out/2026-10-17");
        let names: Vec<String> = plan
            .chunks
            .iter()
            .map(|c| c.output.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(
            names,
            vec![
                "talk_001.webm",
                "talk_002.webm",
                "talk_003.webm",
                "talk_004.webm",
                "talk_005.webm"
            ]
        );
        let day = Path::new("/out/2026-10-17");
        assert!(plan.chunks.iter().all(|c| c.output.parent() == Some(day)));
    }

    #[test]
    fn literal_naming() {
        assert_eq!(Naming::Literal.file_name(Path::new("/in/a.mkv"), 12), "part_012.mp4");
        assert_eq!(Naming::SourceStem.file_name(Path::new("/in/noext"), 1), "noext_001.mp4");
    }

    #[test]
    fn dated_dir_uses_iso_date() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 9).unwrap();
        assert_eq!(
            dated_dir(Path::new("videos_output"), date),
            PathBuf::from("videos_output/2026-03-09")
        );
    }
}
