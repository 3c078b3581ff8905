//! Identification session: photo, query, search, acquisition

use thiserror::Error;

use crate::{
    acquisition::{AcquireError, AcquireEvents, Acquisition, NowPlaying, acquire_next},
    classifier::{EntityClassifier, GeminiClassifier, ImageUpload},
    config::Config,
    domain::{
        entity::{IdentifiedEntity, parse_classifier_reply},
        session::SessionPlaybackState,
    },
    fetch::{Fetcher, ytdlp::YtDlpFetcher},
    links,
    search::{CandidateSearch, SearchError, YouTubeSearch},
    storage::{
        cache::{AudioCache, PlaybackCache},
        error::StorageError,
    },
};

/// Everything that can go wrong between a photo and a playing track
#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("could not get a response from the image model: {0}")]
    ClassificationFailed(String),

    #[error("couldn't identify a music artist or religious figure in this image")]
    NoEntityMatch,

    #[error("search unavailable: {0}")]
    SearchUnavailable(#[from] SearchError),

    #[error("couldn't find any music related to {name}")]
    NoCandidatesFound { name: String },

    #[error("{}", exhausted_message(.name, .attempted))]
    AllCandidatesExhausted {
        name: String,
        attempted: usize,
        fallback_url: String,
    },

    #[error("an error occurred while trying to play \"{title}\": {reason}")]
    FetchFailed {
        title: String,
        reason: String,
        fallback_url: String,
    },

    #[error("nothing identified yet, start with a photo")]
    NoSession,

    #[error("audio cache error: {0}")]
    Cache(#[from] StorageError),
}

fn exhausted_message(name: &str, attempted: &usize) -> String {
    if *attempted == 0 {
        format!("looks like you've heard all the top results for {name}")
    } else {
        format!("tried {attempted} top results for {name} but couldn't find a playable one")
    }
}

impl PlaybackError {
    /// link to offer instead, where opening the search page directly can help
    pub fn remediation(&self) -> Option<&str> {
        match self {
            PlaybackError::AllCandidatesExhausted { fallback_url, .. }
            | PlaybackError::FetchFailed { fallback_url, .. } => Some(fallback_url.as_str()),
            _ => None,
        }
    }

    /// expected outcomes the user can act on, as opposed to failures
    pub fn is_warning(&self) -> bool {
        matches!(
            self,
            PlaybackError::NoEntityMatch
                | PlaybackError::NoCandidatesFound { .. }
                | PlaybackError::AllCandidatesExhausted { .. }
        )
    }
}

pub type BoxedSearch = Box<dyn CandidateSearch + Send>;
pub type BoxedClassifier = Box<dyn EntityClassifier + Send>;
pub type BoxedFetcher = Box<dyn Fetcher + Send>;
pub type BoxedCache = Box<dyn PlaybackCache + Send>;

/// Owns the session state and the collaborators of the acquisition pipeline.
///
/// One request is handled at a time; callers sharing a jukebox serialise access.
pub struct Jukebox {
    classifier: BoxedClassifier,
    search: BoxedSearch,
    fetcher: BoxedFetcher,
    cache: BoxedCache,
    max_results: u32,
    entity: Option<IdentifiedEntity>,
    playback: SessionPlaybackState,
    now_playing: Option<NowPlaying>,
}

impl Jukebox {
    pub fn new(
        classifier: BoxedClassifier,
        search: BoxedSearch,
        fetcher: BoxedFetcher,
        cache: BoxedCache,
        max_results: u32,
    ) -> Self {
        Self {
            classifier,
            search,
            fetcher,
            cache,
            max_results,
            entity: None,
            playback: SessionPlaybackState::new(),
            now_playing: None,
        }
    }

    pub fn from_config(cfg: &Config) -> Result<Self, StorageError> {
        let cache = AudioCache::new(&cfg.cache, &cfg.fetch.audio_format)?;
        Ok(Self::new(
            Box::new(GeminiClassifier::new(&cfg.classifier)),
            Box::new(YouTubeSearch::new(&cfg.search)),
            Box::new(YtDlpFetcher::new(&cfg.fetch)),
            Box::new(cache),
            cfg.search.max_results,
        ))
    }

    pub fn entity(&self) -> Option<&IdentifiedEntity> {
        self.entity.as_ref()
    }

    pub fn now_playing(&self) -> Option<&NowPlaying> {
        self.now_playing.as_ref()
    }

    pub fn session(&self) -> &SessionPlaybackState {
        &self.playback
    }

    /// new search: forget the entity and everything played for it
    pub fn reset(&mut self) {
        self.entity = None;
        self.playback.reset();
        self.now_playing = None;
    }

    /// Identifies the subject of the photo and plays a first track for it.
    pub fn identify(
        &mut self,
        image: &ImageUpload,
        events: &mut dyn AcquireEvents,
    ) -> Result<NowPlaying, PlaybackError> {
        self.reset();

        let reply = self
            .classifier
            .describe(image)
            .map_err(|e| PlaybackError::ClassificationFailed(e.to_string()))?;
        let entity = parse_classifier_reply(&reply).ok_or(PlaybackError::NoEntityMatch)?;

        log::info!("identified {} {}", entity.kind, entity.name);
        self.play_entity(entity, events)
    }

    /// Starts a session for an already known entity.
    pub fn play_entity(
        &mut self,
        entity: IdentifiedEntity,
        events: &mut dyn AcquireEvents,
    ) -> Result<NowPlaying, PlaybackError> {
        self.reset();
        self.entity = Some(entity);
        self.play_next(events)
    }

    /// "Play another": the next track of the current session.
    pub fn play_next(&mut self, events: &mut dyn AcquireEvents) -> Result<NowPlaying, PlaybackError> {
        let entity = self.entity.clone().ok_or(PlaybackError::NoSession)?;
        self.playback.clear_current_file();
        self.now_playing = None;

        let query = entity.query();
        let candidates = self.search.search(&query, self.max_results)?;
        if candidates.is_empty() {
            return Err(PlaybackError::NoCandidatesFound { name: entity.name });
        }

        let acquired = acquire_next(
            &candidates,
            &mut self.playback,
            self.cache.as_mut(),
            self.fetcher.as_mut(),
            events,
        );

        match acquired {
            Ok(Acquisition::Playing(playing)) => {
                self.playback.set_current_file(playing.path.clone());
                self.now_playing = Some(playing.clone());
                Ok(playing)
            }
            Ok(Acquisition::Exhausted { attempted }) => Err(PlaybackError::AllCandidatesExhausted {
                fallback_url: links::search_page_url(&entity.name),
                name: entity.name,
                attempted,
            }),
            Err(AcquireError::Fetch { candidate, source }) => Err(PlaybackError::FetchFailed {
                title: candidate.title,
                reason: source.to_string(),
                fallback_url: links::search_page_url(&entity.name),
            }),
            Err(AcquireError::Cache(e)) => Err(PlaybackError::Cache(e)),
        }
    }
}
