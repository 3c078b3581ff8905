use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    time::SystemTime,
};

use rusqlite::{OptionalExtension, params};

use crate::{
    config::CacheConfig,
    domain::candidate::Candidate,
    storage::{
        db::{self, SecondsSinceUnix, system_time_to_i64},
        error::StorageError,
        fs::{self, CachedFile},
        schema::{columns::*, tables::*},
    },
};

/// Audio files fetched so far, keyed by candidate id.
///
/// Entries are never evicted or revalidated by this crate.
pub trait PlaybackCache {
    /// path of a previously fetched file for this candidate, if any
    fn lookup(&mut self, candidate_id: &str) -> Result<Option<PathBuf>, StorageError>;

    /// records a completed fetch. Storing the same candidate twice is a no-op in effect
    fn store(&mut self, candidate: &Candidate, path: &Path) -> Result<(), StorageError>;

    /// where a fetch for this candidate should put its file
    fn path_for(&self, candidate_id: &str) -> PathBuf;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub candidate_id: String,
    pub path: PathBuf,
    pub title: Option<String>,
    pub stored_at: SecondsSinceUnix,
}

/// Differences between the cache index and the cache directory
#[derive(Debug, Default)]
pub struct CacheStatus {
    /// audio files in the directory without an index entry
    pub unindexed_files: Vec<CachedFile>,
    /// index entries whose file is gone or unusable
    pub missing_files: Vec<CacheEntry>,
}

impl CacheStatus {
    pub fn is_clean(&self) -> bool {
        self.unindexed_files.is_empty() && self.missing_files.is_empty()
    }
}

/// Cache directory with one `<id>.<format>` file per candidate and a SQLite index
pub struct AudioCache {
    pub(crate) db: rusqlite::Connection,
    dir: PathBuf,
    audio_format: String,
}

impl AudioCache {
    /// when called, creates the cache directory and opens the index
    pub fn new(config: &CacheConfig, audio_format: &str) -> Result<Self, StorageError> {
        std::fs::create_dir_all(&config.dir)?;
        let db = db::open(config)?;
        Ok(Self::from_existing_conn(db, config.dir.clone(), audio_format))
    }

    pub fn from_existing_conn(db: rusqlite::Connection, dir: PathBuf, audio_format: &str) -> Self {
        Self {
            db,
            dir,
            audio_format: audio_format.to_string(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn indexed_path(&self, candidate_id: &str) -> Result<Option<PathBuf>, StorageError> {
        let path = self
            .db
            .query_row(
                &format!("SELECT {PATH} FROM {CACHE_ENTRIES} WHERE {CANDIDATE_ID} = ?1"),
                params![candidate_id],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(path.map(PathBuf::from))
    }

    fn upsert(
        &mut self,
        candidate_id: &str,
        path: &Path,
        title: Option<&str>,
    ) -> Result<(), StorageError> {
        let time_secs = system_time_to_i64(SystemTime::now()).map_err(StorageError::Internal)?;

        self.db.execute(
            &format!(
                "INSERT INTO {CACHE_ENTRIES} ({CANDIDATE_ID}, {PATH}, {TITLE}, {STORED_AT})
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT({CANDIDATE_ID}) DO UPDATE SET
                    {PATH} = excluded.{PATH},
                    {TITLE} = COALESCE(excluded.{TITLE}, {CACHE_ENTRIES}.{TITLE})"
            ),
            params![candidate_id, path.to_string_lossy(), title, time_secs],
        )?;
        Ok(())
    }

    /// All index entries, oldest first
    pub fn list_entries(&self) -> Result<Vec<CacheEntry>, StorageError> {
        let mut stmt = self.db.prepare(&format!(
            "SELECT {CANDIDATE_ID}, {PATH}, {TITLE}, {STORED_AT} FROM {CACHE_ENTRIES}
             ORDER BY {STORED_AT}, {CANDIDATE_ID}"
        ))?;

        let entries = stmt
            .query_map([], |row| {
                Ok(CacheEntry {
                    candidate_id: row.get(0)?,
                    path: PathBuf::from(row.get::<_, String>(1)?),
                    title: row.get(2)?,
                    stored_at: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(entries)
    }

    /// aka git status for the cache
    ///
    /// compares the cache directory with the index without changing either
    pub fn status(&self) -> Result<CacheStatus, StorageError> {
        let entries = self.list_entries()?;
        let indexed = entries
            .iter()
            .map(|e| e.candidate_id.clone())
            .collect::<HashSet<_>>();

        let unindexed_files = fs::scan_cache_dir(&self.dir)?
            .into_iter()
            .filter(|f| !indexed.contains(&f.candidate_id))
            .collect();

        let missing_files = entries
            .into_iter()
            .filter(|e| !fs::is_valid_audio_path(&e.path))
            .collect();

        Ok(CacheStatus {
            unindexed_files,
            missing_files,
        })
    }
}

impl PlaybackCache for AudioCache {
    fn lookup(&mut self, candidate_id: &str) -> Result<Option<PathBuf>, StorageError> {
        if let Some(path) = self.indexed_path(candidate_id)? {
            if fs::is_valid_audio_path(&path) {
                return Ok(Some(path));
            }
            log::debug!(
                "cache entry {candidate_id} points to unusable file {}",
                path.to_string_lossy()
            );
        }

        // a file at the derived path from a run without an index
        let derived = self.path_for(candidate_id);
        if fs::is_valid_audio_path(&derived) {
            log::info!("adopting cached file {}", derived.to_string_lossy());
            self.upsert(candidate_id, &derived, None)?;
            return Ok(Some(derived));
        }

        Ok(None)
    }

    fn store(&mut self, candidate: &Candidate, path: &Path) -> Result<(), StorageError> {
        self.upsert(&candidate.id, path, Some(&candidate.title))
    }

    fn path_for(&self, candidate_id: &str) -> PathBuf {
        self.dir.join(format!("{candidate_id}.{}", self.audio_format))
    }
}
