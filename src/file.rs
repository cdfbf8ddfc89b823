use std::io::Read;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::cut;
use crate::download::Auth;
use crate::error::{Error, Result};
use crate::options::Options;
use crate::split::{AbortHandle, SourcePolicy};

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct CutEntity {
    url: String,
    seconds: Option<u32>,
    #[serde(default)]
    keep_source: bool,
    cookies: Option<PathBuf>,
    browser: Option<String>,
}

impl CutEntity {
    fn auth(&self) -> Auth {
        match (&self.cookies, &self.browser) {
            (Some(cookies), _) => Auth::CookieFile(cookies.clone()),
            (None, Some(browser)) => Auth::Browser(browser.clone()),
            (None, None) => Auth::None,
        }
    }

    fn policy(&self) -> SourcePolicy {
        if self.keep_source {
            SourcePolicy::Keep
        } else {
            SourcePolicy::Delete
        }
    }
}

fn parse_entries(reader: impl Read) -> Result<Vec<CutEntity>> {
    Ok(serde_json::from_reader(reader)?)
}

/// Download and split every entry of a JSON batch file. Returns how many
/// entries did not finish cleanly; one bad entry never stops the batch.
pub async fn cut_file(file: &Path, options: &Options, abort: &AbortHandle) -> Result<usize> {
    let reader = match std::fs::File::open(file) {
        Ok(file) => std::io::BufReader::new(file),
        Err(err) => {
            eprintln!("Error opening file ({}): {}", file.display(), err);
            return Err(Error::filesystem("open", file, err));
        }
    };
    let entries = match parse_entries(reader) {
        Ok(entries) => entries,
        Err(err) => {
            eprintln!("Error parsing JSON: {}", err);
            return Err(err);
        }
    };

    let mut failed = 0;
    for entry in entries {
        if abort.is_aborted() {
            eprintln!("Aborted, skipping remaining entries");
            break;
        }
        println!();

        let mut options = options.clone();
        match entry.seconds {
            Some(0) => {
                eprintln!("Skipping {}: seconds must be at least 1", entry.url);
                failed += 1;
                continue;
            }
            Some(seconds) => options.chunk_seconds = seconds,
            None => {}
        }

        println!("Cutting {} into {}s parts", entry.url, options.chunk_seconds);

        match cut::cut_url(&entry.url, &entry.auth(), &options, entry.policy(), abort).await {
            Ok(report) => {
                cut::print_report(&report);
                if !report.is_complete() {
                    failed += 1;
                }
            }
            Err(err) => {
                eprintln!("Error cutting {}: {}", entry.url, err);
                failed += 1;
            }
        }
    }

    Ok(failed)
}
