//! Download-and-transcode of candidates into local audio files

use std::{
    path::{Path, PathBuf},
    sync::mpsc::{self, Receiver, Sender},
};

use thiserror::Error;

use crate::domain::candidate::Candidate;

pub mod ytdlp;

/// Incremental status of a running fetch
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FetchProgress {
    /// `fraction` is within `0.0..=1.0`, absent while the total size is unknown
    Downloading { fraction: Option<f64> },
    /// download complete, audio conversion may still be running
    Finished,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// this candidate cannot be fetched (removed, private, region locked...).
    /// Routine, the next candidate should be tried
    #[error("source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("fetch failed: {0}")]
    Failed(String),
}

impl FetchError {
    pub fn is_recoverable(&self) -> bool {
        matches!(self, FetchError::SourceUnavailable(_))
    }
}

enum DownloadEvent {
    Progress(FetchProgress),
    Done(Result<PathBuf, FetchError>),
}

/// A running fetch.
///
/// Iterating yields progress events until the fetch ends; [`Download::finish`]
/// then returns where the audio file was written. The sequence is finite and
/// can be consumed only once.
pub struct Download {
    events: Receiver<DownloadEvent>,
    outcome: Option<Result<PathBuf, FetchError>>,
}

/// Producer side of a [`Download`], owned by whatever performs the fetch
#[derive(Clone)]
pub struct DownloadSender {
    events: Sender<DownloadEvent>,
}

impl Download {
    pub fn channel() -> (DownloadSender, Download) {
        let (tx, rx) = mpsc::channel();
        (
            DownloadSender { events: tx },
            Download {
                events: rx,
                outcome: None,
            },
        )
    }

    /// a fetch that could not even start
    pub fn failed(error: FetchError) -> Download {
        let (tx, download) = Self::channel();
        tx.finish(Err(error));
        download
    }

    /// Blocks until the fetch is over, dropping remaining progress events.
    pub fn finish(mut self) -> Result<PathBuf, FetchError> {
        while self.next().is_some() {}
        self.outcome.take().unwrap_or_else(|| {
            Err(FetchError::Failed("fetch ended without a result".to_string()))
        })
    }
}

impl Iterator for Download {
    type Item = FetchProgress;

    fn next(&mut self) -> Option<FetchProgress> {
        if self.outcome.is_some() {
            return None;
        }

        match self.events.recv() {
            Ok(DownloadEvent::Progress(progress)) => Some(progress),
            Ok(DownloadEvent::Done(result)) => {
                self.outcome = Some(result);
                None
            }
            Err(_) => {
                self.outcome = Some(Err(FetchError::Failed(
                    "fetch worker exited without a result".to_string(),
                )));
                None
            }
        }
    }
}

impl DownloadSender {
    pub fn progress(&self, progress: FetchProgress) {
        // nobody listening any more is fine, the fetch still completes
        let _ = self.events.send(DownloadEvent::Progress(progress));
    }

    pub fn finish(self, result: Result<PathBuf, FetchError>) {
        let _ = self.events.send(DownloadEvent::Done(result));
    }
}

/// Something able to turn a candidate into a local audio file at `dest`
pub trait Fetcher {
    fn fetch(&mut self, candidate: &Candidate, dest: &Path) -> Download;
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn test_download_yields_progress_then_result() {
        let (tx, download) = Download::channel();

        std::thread::spawn(move || {
            tx.progress(FetchProgress::Downloading { fraction: Some(0.5) });
            tx.progress(FetchProgress::Finished);
            tx.finish(Ok(PathBuf::from("cache/v1.mp3")));
        });

        let mut download = download;
        let events: Vec<_> = download.by_ref().collect();

        assert_eq!(
            events,
            vec![
                FetchProgress::Downloading { fraction: Some(0.5) },
                FetchProgress::Finished
            ]
        );
        assert_eq!(download.next(), None);
        assert_eq!(download.finish(), Ok(PathBuf::from("cache/v1.mp3")));
    }

    #[test]
    fn test_finish_without_iterating() {
        let (tx, download) = Download::channel();
        tx.progress(FetchProgress::Downloading { fraction: None });
        tx.finish(Err(FetchError::SourceUnavailable("private video".into())));

        assert_eq!(
            download.finish(),
            Err(FetchError::SourceUnavailable("private video".into()))
        );
    }

    #[test]
    fn test_dropped_sender_is_a_failure() {
        let (tx, download) = Download::channel();
        tx.progress(FetchProgress::Finished);
        drop(tx);

        let result = download.finish();
        assert!(matches!(result, Err(FetchError::Failed(_))));
    }

    #[test]
    fn test_failed_download_has_no_progress() {
        let mut download = Download::failed(FetchError::Failed("no yt-dlp".into()));

        assert_eq!(download.next(), None);
        assert_eq!(download.finish(), Err(FetchError::Failed("no yt-dlp".into())));
    }

    #[test]
    fn test_only_source_unavailable_is_recoverable() {
        assert!(FetchError::SourceUnavailable("x".into()).is_recoverable());
        assert!(!FetchError::Failed("x".into()).is_recoverable());
    }
}
