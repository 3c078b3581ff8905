//! Module to inspect the audio cache directory in the file system

use walkdir::WalkDir;

use std::path::{Path, PathBuf};

use crate::storage::error::StorageError;

const AUDIO_EXTENSIONS: &[&str] = &["mp3", "m4a", "opus", "ogg", "aac", "flac", "wav"];

pub fn is_audio_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| AUDIO_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Audio file found in the cache directory, named after its candidate id
#[derive(Debug, PartialEq, Eq, Clone, Hash)]
pub struct CachedFile {
    pub candidate_id: String,
    pub path: PathBuf,
}

/// Lists audio files directly inside the cache directory.
///
/// A missing directory is an empty cache, not an error.
pub fn scan_cache_dir(dir: &Path) -> Result<Vec<CachedFile>, StorageError> {
    if !dir.exists() {
        return Ok(vec![]);
    }

    let dir_str = dir.to_string_lossy();
    let files = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| match e {
            Ok(e) => Some(e),
            Err(err) => {
                log::warn!("error while scanning dir {dir_str}, skipping an entry: {err:?}");
                None
            }
        })
        .filter(|e| e.file_type().is_file())
        .map(|e| e.path().to_path_buf())
        .filter(|p| is_audio_file(p))
        .filter_map(|path| {
            let candidate_id = path.file_stem()?.to_string_lossy().into_owned();
            Some(CachedFile { candidate_id, path })
        })
        .collect();

    Ok(files)
}

/// Best-effort check that a path points to a real, playable audio file.
///
/// This does NOT decode audio, but rules out:
/// - missing paths
/// - directories / special files
/// - wrong extensions
/// - empty files (left behind by an interrupted fetch)
pub fn is_valid_audio_path(path: &Path) -> bool {
    let meta = match std::fs::metadata(path) {
        Ok(m) => m,
        Err(_) => return false,
    };

    meta.is_file() && is_audio_file(path) && meta.len() > 0
}
