use std::{collections::HashSet, path::PathBuf};

/// Playback bookkeeping of one identification session.
///
/// `seen_ids` only grows until [`SessionPlaybackState::reset`] is called,
/// so "play another" never offers the same candidate twice.
#[derive(Debug, Default, Clone)]
pub struct SessionPlaybackState {
    seen_ids: HashSet<String>,
    current_file: Option<PathBuf>,
}

impl SessionPlaybackState {
    pub fn new() -> Self {
        Self::default()
    }

    /// new search: forget everything
    pub fn reset(&mut self) {
        self.seen_ids.clear();
        self.current_file = None;
    }

    /// returns true if the id was not seen before
    pub fn mark_seen(&mut self, id: &str) -> bool {
        self.seen_ids.insert(id.to_string())
    }

    pub fn is_seen(&self, id: &str) -> bool {
        self.seen_ids.contains(id)
    }

    pub fn seen_ids(&self) -> &HashSet<String> {
        &self.seen_ids
    }

    pub fn current_file(&self) -> Option<&PathBuf> {
        self.current_file.as_ref()
    }

    pub fn set_current_file(&mut self, path: PathBuf) {
        self.current_file = Some(path);
    }

    pub fn clear_current_file(&mut self) {
        self.current_file = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mark_seen_is_idempotent() {
        let mut once = SessionPlaybackState::new();
        once.mark_seen("v1");

        let mut twice = SessionPlaybackState::new();
        assert!(twice.mark_seen("v1"));
        assert!(!twice.mark_seen("v1"));

        assert_eq!(once.seen_ids(), twice.seen_ids());
        assert!(twice.is_seen("v1"));
        assert!(!twice.is_seen("v2"));
    }

    #[test]
    fn test_reset_clears_seen_ids_and_current_file() {
        let mut state = SessionPlaybackState::new();
        state.mark_seen("v1");
        state.set_current_file(PathBuf::from("audio_cache/v1.mp3"));

        state.reset();

        assert!(state.seen_ids().is_empty());
        assert!(state.current_file().is_none());
    }

    #[test]
    fn test_clear_current_file_keeps_seen_ids() {
        let mut state = SessionPlaybackState::new();
        state.mark_seen("v1");
        state.set_current_file(PathBuf::from("audio_cache/v1.mp3"));

        state.clear_current_file();

        assert!(state.is_seen("v1"));
        assert!(state.current_file().is_none());
    }
}
