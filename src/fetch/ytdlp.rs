//! Fetcher backed by the `yt-dlp` command line tool

use std::{
    ffi::OsString,
    io::{BufRead, BufReader, Read},
    path::{Path, PathBuf},
    process::{Command, ExitStatus, Stdio},
    thread,
};

use crate::{
    config::FetchConfig,
    domain::candidate::Candidate,
    fetch::{Download, DownloadSender, FetchError, FetchProgress, Fetcher},
};

const PROGRESS_MARKER: &str = "snaptrack-progress";
const PROGRESS_TEMPLATE: &str = "download:snaptrack-progress %(progress.status)s %(progress.downloaded_bytes)s %(progress.total_bytes)s %(progress.total_bytes_estimate)s";

/// errors that hit every candidate alike, so skipping would not help
const ENVIRONMENT_FAILURES: &[&str] = &["ffmpeg", "ffprobe", "Postprocessing"];

pub struct YtDlpFetcher {
    program: PathBuf,
    audio_format: String,
    audio_quality: u32,
}

impl YtDlpFetcher {
    pub fn new(config: &FetchConfig) -> Self {
        Self {
            program: config.program.clone(),
            audio_format: config.audio_format.clone(),
            audio_quality: config.audio_quality,
        }
    }

    fn args(&self, url: &str, dest: &Path) -> Vec<OsString> {
        let template = dest.with_extension("%(ext)s");
        let quality = format!("{}K", self.audio_quality);
        let mut args: Vec<OsString> = [
            "--format",
            "bestaudio/best",
            "--extract-audio",
            "--audio-format",
            self.audio_format.as_str(),
            "--audio-quality",
            quality.as_str(),
            "--no-playlist",
            "--quiet",
            "--progress",
            "--newline",
            "--progress-template",
            PROGRESS_TEMPLATE,
            "--output",
        ]
        .into_iter()
        .map(OsString::from)
        .collect();
        args.push(template.into_os_string());
        args.push(OsString::from(url));
        args
    }

    fn run(program: PathBuf, args: Vec<OsString>, dest: PathBuf, tx: DownloadSender) {
        let mut child = match Command::new(&program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                tx.finish(Err(FetchError::Failed(format!(
                    "could not start {}: {e}",
                    program.to_string_lossy()
                ))));
                return;
            }
        };

        // progress may land on either stream depending on yt-dlp version
        let stderr_reader = child.stderr.take().map(|stderr| {
            let tx = tx.clone();
            thread::spawn(move || forward_lines(stderr, &tx))
        });
        let mut output = child
            .stdout
            .take()
            .map(|stdout| forward_lines(stdout, &tx))
            .unwrap_or_default();
        if let Some(reader) = stderr_reader {
            output.extend(reader.join().unwrap_or_default());
        }

        let result = match child.wait() {
            Ok(status) => outcome(status, &output, &dest),
            Err(e) => Err(FetchError::Failed(format!("failed to wait for yt-dlp: {e}"))),
        };
        tx.finish(result);
    }
}

impl Fetcher for YtDlpFetcher {
    fn fetch(&mut self, candidate: &Candidate, dest: &Path) -> Download {
        let (tx, download) = Download::channel();
        let program = self.program.clone();
        let args = self.args(&candidate.watch_url, dest);
        let dest = dest.to_path_buf();

        log::debug!(
            "fetching {} into {}",
            candidate.watch_url,
            dest.to_string_lossy()
        );
        let worker = thread::Builder::new()
            .name(format!("yt-dlp {}", candidate.id))
            .spawn(move || Self::run(program, args, dest, tx));
        match worker {
            Ok(_) => download,
            Err(e) => Download::failed(FetchError::Failed(format!(
                "could not start fetch worker: {e}"
            ))),
        }
    }
}

/// sends progress lines to the download, returns every other line
fn forward_lines<R: Read>(stream: R, tx: &DownloadSender) -> Vec<String> {
    let mut other = Vec::new();
    for line in BufReader::new(stream).lines() {
        let Ok(line) = line else { break };
        match parse_progress_line(&line) {
            Some(progress) => tx.progress(progress),
            None if line.trim_start().starts_with(PROGRESS_MARKER) => {}
            None => other.push(line),
        }
    }
    other
}

fn parse_bytes(field: Option<&str>) -> Option<f64> {
    field
        .filter(|f| *f != "NA" && *f != "None")
        .and_then(|f| f.parse::<f64>().ok())
}

/// Parses one line printed with [`PROGRESS_TEMPLATE`].
pub fn parse_progress_line(line: &str) -> Option<FetchProgress> {
    let rest = line.trim().strip_prefix(PROGRESS_MARKER)?;
    let mut fields = rest.split_whitespace();

    match fields.next()? {
        "downloading" => {
            let downloaded = parse_bytes(fields.next());
            let total = parse_bytes(fields.next());
            let estimate = parse_bytes(fields.next());
            let fraction = match (downloaded, total.or(estimate)) {
                (Some(done), Some(total)) if total > 0.0 => Some((done / total).clamp(0.0, 1.0)),
                _ => None,
            };
            Some(FetchProgress::Downloading { fraction })
        }
        "finished" => Some(FetchProgress::Finished),
        _ => None,
    }
}

/// Decides what an exited yt-dlp process means for the candidate.
fn outcome(status: ExitStatus, output: &[String], dest: &Path) -> Result<PathBuf, FetchError> {
    if status.success() {
        return if dest.is_file() {
            Ok(dest.to_path_buf())
        } else {
            Err(FetchError::Failed(format!(
                "yt-dlp succeeded but {} was not produced",
                dest.to_string_lossy()
            )))
        };
    }
    Err(classify_failure(output, &status.to_string()))
}

fn classify_failure(output: &[String], status: &str) -> FetchError {
    let errors = output
        .iter()
        .map(|l| l.trim())
        .filter(|l| l.starts_with("ERROR:"))
        .collect::<Vec<_>>();

    if let Some(line) = errors
        .iter()
        .find(|l| ENVIRONMENT_FAILURES.iter().any(|m| l.contains(m)))
    {
        return FetchError::Failed(line.to_string());
    }

    match errors.first() {
        Some(line) => FetchError::SourceUnavailable(line.to_string()),
        None => FetchError::Failed(format!("yt-dlp exited with {status}")),
    }
}
