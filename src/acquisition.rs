//! Picks the next playable candidate of a session, fetching it if needed

use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use crate::{
    domain::{candidate::Candidate, session::SessionPlaybackState},
    fetch::{FetchError, FetchProgress, Fetcher},
    storage::{cache::PlaybackCache, error::StorageError},
};

/// The track chosen by one invocation
#[derive(Debug, Clone, Serialize)]
pub struct NowPlaying {
    pub candidate: Candidate,
    pub path: PathBuf,
    pub from_cache: bool,
}

#[derive(Debug)]
pub enum Acquisition {
    Playing(NowPlaying),
    /// no unseen candidate could be played. `attempted` is 0 when every
    /// candidate had already been offered in this session
    Exhausted { attempted: usize },
}

#[derive(Debug, Error)]
pub enum AcquireError {
    #[error("fetching \"{}\" failed: {source}", candidate.title)]
    Fetch {
        candidate: Candidate,
        #[source]
        source: FetchError,
    },

    #[error("cache lookup failed: {0}")]
    Cache(#[from] StorageError),
}

/// Hooks for whoever renders the acquisition. All optional
pub trait AcquireEvents {
    /// a fetch is about to start
    fn attempting(&mut self, _candidate: &Candidate) {}

    fn progress(&mut self, _candidate: &Candidate, _progress: FetchProgress) {}

    /// the candidate could not be fetched and the next one will be tried
    fn skipped(&mut self, _candidate: &Candidate, _reason: &FetchError) {}
}

/// Ignores every event
pub struct NoEvents;

impl AcquireEvents for NoEvents {}

/// Plays the first unseen candidate that is cached or can be fetched.
///
/// Every candidate is marked seen *before* it is tried, so a candidate that
/// failed is never retried in the same session. Unavailable sources are
/// skipped; any other fetch failure ends the invocation.
pub fn acquire_next(
    candidates: &[Candidate],
    session: &mut SessionPlaybackState,
    cache: &mut dyn PlaybackCache,
    fetcher: &mut dyn Fetcher,
    events: &mut dyn AcquireEvents,
) -> Result<Acquisition, AcquireError> {
    if candidates.iter().all(|c| session.is_seen(&c.id)) {
        return Ok(Acquisition::Exhausted { attempted: 0 });
    }

    let mut attempted = 0;
    for candidate in candidates {
        // also filters duplicate ids within one result list
        if !session.mark_seen(&candidate.id) {
            continue;
        }
        attempted += 1;

        if let Some(path) = cache.lookup(&candidate.id)? {
            log::info!("playing cached {} from {}", candidate.id, path.to_string_lossy());
            return Ok(Acquisition::Playing(NowPlaying {
                candidate: candidate.clone(),
                path,
                from_cache: true,
            }));
        }

        events.attempting(candidate);
        let dest = cache.path_for(&candidate.id);
        let mut download = fetcher.fetch(candidate, &dest);
        for progress in download.by_ref() {
            events.progress(candidate, progress);
        }

        match download.finish() {
            Ok(path) => {
                if let Err(e) = cache.store(candidate, &path) {
                    // the file is at its derived path, a later lookup adopts it
                    log::warn!("failed to index fetched {}: {e}", candidate.id);
                }
                log::info!("fetched {} into {}", candidate.id, path.to_string_lossy());
                return Ok(Acquisition::Playing(NowPlaying {
                    candidate: candidate.clone(),
                    path,
                    from_cache: false,
                }));
            }
            Err(e) if e.is_recoverable() => {
                log::warn!("Skipping unavailable video: {} ({e})", candidate.title);
                events.skipped(candidate, &e);
            }
            Err(e) => {
                log::error!("fetching {} failed: {e}", candidate.id);
                return Err(AcquireError::Fetch {
                    candidate: candidate.clone(),
                    source: e,
                });
            }
        }
    }

    Ok(Acquisition::Exhausted { attempted })
}
