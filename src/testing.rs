//! Scripted collaborators shared by tests

use std::{
    collections::HashMap,
    path::Path,
    sync::{Arc, Mutex},
};

use rusqlite::Connection;

use crate::{
    classifier::{ClassifyError, EntityClassifier, ImageUpload},
    domain::candidate::Candidate,
    fetch::{Download, FetchError, FetchProgress, Fetcher},
    search::{CandidateSearch, SearchError},
    storage::{cache::AudioCache, schema},
};

pub fn candidates(ids: &[&str]) -> Vec<Candidate> {
    ids.iter()
        .map(|id| Candidate::new(*id, format!("Song {id}"), format!("https://img/{id}.jpg")))
        .collect()
}

pub fn memory_cache(dir: &Path) -> AudioCache {
    let conn = Connection::open_in_memory().unwrap();
    schema::init(&conn).unwrap();
    AudioCache::from_existing_conn(conn, dir.to_path_buf(), "mp3")
}

/// Succeeds for every candidate unless told otherwise, writing a small file at `dest`
#[derive(Default)]
pub struct ScriptedFetcher {
    failures: HashMap<String, FetchError>,
    pub calls: Arc<Mutex<Vec<String>>>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(mut self, id: &str, error: FetchError) -> Self {
        self.failures.insert(id.to_string(), error);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl Fetcher for ScriptedFetcher {
    fn fetch(&mut self, candidate: &Candidate, dest: &Path) -> Download {
        self.calls.lock().unwrap().push(candidate.id.clone());

        if let Some(error) = self.failures.get(&candidate.id) {
            let (tx, download) = Download::channel();
            tx.progress(FetchProgress::Downloading { fraction: None });
            tx.finish(Err(error.clone()));
            return download;
        }

        let (tx, download) = Download::channel();
        tx.progress(FetchProgress::Downloading { fraction: Some(0.5) });
        tx.progress(FetchProgress::Downloading { fraction: Some(1.0) });
        tx.progress(FetchProgress::Finished);
        let result = std::fs::write(dest, format!("audio of {}", candidate.id))
            .map(|_| dest.to_path_buf())
            .map_err(|e| FetchError::Failed(e.to_string()));
        tx.finish(result);
        download
    }
}

/// Returns the same candidates for every query, or fails when offline
pub struct FakeSearch {
    results: Option<Vec<Candidate>>,
    pub queries: Arc<Mutex<Vec<String>>>,
}

impl FakeSearch {
    pub fn returning(results: Vec<Candidate>) -> Self {
        Self {
            results: Some(results),
            queries: Default::default(),
        }
    }

    pub fn offline() -> Self {
        Self {
            results: None,
            queries: Default::default(),
        }
    }
}

impl CandidateSearch for FakeSearch {
    fn search(&self, query: &str, max_results: u32) -> Result<Vec<Candidate>, SearchError> {
        self.queries.lock().unwrap().push(query.to_string());
        match &self.results {
            Some(results) => Ok(results.iter().take(max_results as usize).cloned().collect()),
            None => Err(SearchError::Unreachable("offline".to_string())),
        }
    }
}

/// Replies with fixed text, or fails when `None`
pub struct FakeClassifier(pub Option<String>);

impl EntityClassifier for FakeClassifier {
    fn describe(&self, _image: &ImageUpload) -> Result<String, ClassifyError> {
        self.0
            .clone()
            .ok_or_else(|| ClassifyError::Request("model down".to_string()))
    }
}
