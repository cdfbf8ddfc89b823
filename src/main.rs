mod cut;
mod download;
mod error;
mod file;
mod options;
mod split;
mod tool;

use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};

use download::Auth;
use split::{AbortHandle, ExtractMode, Naming, SourcePolicy};

#[derive(Parser, Debug)]
#[command(version, about = "Download videos and cut them into fixed-length parts")]
struct Args {
    #[clap(subcommand)]
    subcmd: SubCmd,

    #[clap(short, long, default_value = "1", env = "CUTTER_PARALLEL", global = true)]
    /// set the maximum number of parts cut at the same time
    parallel: usize,

    #[clap(short, long, default_value = "3", env = "CUTTER_RETRIES", global = true)]
    /// set how often a failed tool launch is retried
    retries: usize,

    #[clap(short, long, default_value = "videos_output", env = "CUTTER_OUTPUT", global = true)]
    /// directory that receives the dated part folders
    output: PathBuf,

    #[clap(
        short,
        long,
        default_value = "youtube_downloads",
        env = "CUTTER_DOWNLOADS",
        global = true
    )]
    /// directory downloads are written to
    downloads: PathBuf,

    #[clap(long, default_value = download::DEFAULT_BROWSER, global = true)]
    /// browser whose cookies are tried when a video needs a signed-in session
    fallback_browser: String,

    #[clap(long, global = true)]
    /// never retry a download with browser cookies
    no_fallback: bool,

    #[clap(short, long, global = true)]
    /// enable debug logging
    verbose: bool,
}

#[derive(ClapArgs, Debug, Clone)]
struct AuthArgs {
    #[clap(long, conflicts_with = "browser")]
    /// cookie file (Netscape format) passed to yt-dlp
    cookies: Option<PathBuf>,

    #[clap(long)]
    /// browser profile yt-dlp reads cookies from
    browser: Option<String>,
}

impl AuthArgs {
    fn auth(&self) -> Auth {
        match (&self.cookies, &self.browser) {
            (Some(cookies), _) => Auth::CookieFile(cookies.clone()),
            (None, Some(browser)) => Auth::Browser(browser.clone()),
            (None, None) => Auth::None,
        }
    }
}

#[derive(ClapArgs, Debug, Clone)]
struct SplitArgs {
    #[clap(short, long, default_value = "60", value_parser = clap::value_parser!(u32).range(1..))]
    /// length of each part in seconds
    seconds: u32,

    #[clap(short, long, value_enum, default_value_t = ExtractMode::Copy)]
    /// copy: fast, cuts snap to keyframes; reencode: slow, frame-accurate cuts
    mode: ExtractMode,

    #[clap(short, long, value_enum, default_value_t = Naming::SourceStem)]
    /// name parts after the source file or as part_NNN.mp4
    naming: Naming,
}

#[derive(Subcommand, Debug)]
#[command(version, about)]
enum SubCmd {
    /// Download a single video
    Download {
        #[clap(value_parser = url_parser)]
        /// provide a video link
        url: String,

        #[command(flatten)]
        auth: AuthArgs,
    },
    /// Download a video and cut it into parts; the download is removed afterwards
    Cut {
        #[clap(value_parser = url_parser)]
        /// provide a video link
        url: String,

        #[command(flatten)]
        auth: AuthArgs,

        #[command(flatten)]
        split: SplitArgs,

        #[clap(long)]
        /// keep the downloaded file after cutting
        keep_source: bool,
    },
    /// Cut existing video files into parts; the files are left untouched
    Split {
        #[clap(required = true)]
        /// video files to cut
        files: Vec<PathBuf>,

        #[command(flatten)]
        split: SplitArgs,
    },
    /// Download and cut every entry of a json file
    File {
        #[clap(default_value = "download.json")]
        /// provide a formated json file that contains the download links
        file: PathBuf,

        #[command(flatten)]
        split: SplitArgs,
    },
    /// Check that ffmpeg, ffprobe and yt-dlp are installed
    CheckTools,
}

fn url_parser(url: &str) -> Result<String, String> {
    if url.starts_with("http") {
        Ok(url.to_string())
    } else {
        Err("URL must start with http or https".to_string())
    }
}

fn init_tracing(verbose: bool) {
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if verbose {
            "cutter_rs=debug".to_string()
        } else {
            "cutter_rs=info".to_string()
        }
    });

    tracing_subscriber::fmt().with_env_filter(env_filter).init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let split = match &args.subcmd {
        SubCmd::Cut { split, .. } | SubCmd::Split { split, .. } | SubCmd::File { split, .. } => {
            Some(split.clone())
        }
        _ => None,
    };

    let mut options = options::Options {
        max_parallel_jobs: args.parallel,
        max_spawn_retries: args.retries,
        output_root: args.output,
        downloads_dir: args.downloads,
        fallback_auth: (!args.no_fallback).then(|| Auth::Browser(args.fallback_browser)),
        ..Default::default()
    };
    if let Some(split) = split {
        options.chunk_seconds = split.seconds;
        options.mode = split.mode;
        options.naming = split.naming;
    }

    tracing::debug!(?options, "options");

    for dir in [&options.downloads_dir, &options.output_root] {
        std::fs::create_dir_all(dir)
            .map_err(|err| error::Error::filesystem("create directory", dir, err))?;
    }

    let abort = AbortHandle::new();
    {
        let abort = abort.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_err() {
                return;
            }
            tracing::warn!("Interrupted, cancelling downloads and not starting further parts");
            abort.abort();

            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupted again, exiting");
                std::process::exit(130);
            }
        });
    }

    match args.subcmd {
        SubCmd::Download { url, auth } => {
            let path = download::fetch_with_fallback(&url, &auth.auth(), &options, &abort).await?;
            println!("Finished downloading {} to {}", cut::display_name(&path), path.display());
        }
        SubCmd::Cut { url, auth, keep_source, .. } => {
            let policy = if keep_source { SourcePolicy::Keep } else { SourcePolicy::Delete };
            let report = cut::cut_url(&url, &auth.auth(), &options, policy, &abort).await?;
            cut::print_report(&report);
            if !report.is_complete() {
                let missing = report.planned as usize - report.produced.len();
                let message = format!("{} of {} parts were not produced", missing, report.planned);
                return Err(message.into());
            }
        }
        SubCmd::Split { files, .. } => {
            let mut failed = 0;
            for (file, result) in cut::split_files(&files, &options, &abort).await? {
                match result {
                    Ok(report) => {
                        cut::print_report(&report);
                        if !report.is_complete() {
                            failed += 1;
                        }
                    }
                    Err(err) => {
                        eprintln!("Error splitting {}: {}", file.display(), err);
                        failed += 1;
                    }
                }
            }
            if failed > 0 {
                let message =
                    format!("{} of {} files were not split completely", failed, files.len());
                return Err(message.into());
            }
        }
        SubCmd::File { file, .. } => {
            let failed = file::cut_file(&file, &options, &abort).await?;
            if failed > 0 {
                let message = format!("{} entries of {} did not finish", failed, file.display());
                return Err(message.into());
            }
            println!("Finished reading file {}", file.display());
        }
        SubCmd::CheckTools => {
            let mut missing = 0;
            for (name, path) in tool::check_tools() {
                match path {
                    Some(path) => println!("{:8} {}", name, path.display()),
                    None => {
                        println!("{:8} not found", name);
                        missing += 1;
                    }
                }
            }
            if missing > 0 {
                return Err(format!("{} required tools are missing", missing).into());
            }
        }
    }

    Ok(())
}
