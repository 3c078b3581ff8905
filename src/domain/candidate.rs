use serde::Serialize;

const WATCH_BASE_URL: &str = "https://www.youtube.com/watch?v=";

/// One retrievable track found by the search, in the search engine's order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Candidate {
    /// video id, stable across searches
    pub id: String,
    pub title: String,
    pub thumbnail_url: String,
    pub watch_url: String,
}

impl Candidate {
    pub fn new(id: impl Into<String>, title: impl Into<String>, thumbnail_url: impl Into<String>) -> Self {
        let id = id.into();
        let watch_url = format!("{WATCH_BASE_URL}{id}");
        Self {
            id,
            title: title.into(),
            thumbnail_url: thumbnail_url.into(),
            watch_url,
        }
    }

    /// title cut down for progress lines
    pub fn short_title(&self, max_chars: usize) -> String {
        if self.title.chars().count() <= max_chars {
            self.title.clone()
        } else {
            let cut: String = self.title.chars().take(max_chars).collect();
            format!("{cut}...")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_watch_url_is_derived_from_id() {
        let candidate = Candidate::new("dQw4w9WgXcQ", "Song", "http://img");
        assert_eq!(candidate.watch_url, "https://www.youtube.com/watch?v=dQw4w9WgXcQ");
    }

    #[test]
    fn test_short_title() {
        let candidate = Candidate::new("v1", "Ångström — a very long title", "");

        assert_eq!(candidate.short_title(100), "Ångström — a very long title");
        assert_eq!(candidate.short_title(8), "Ångström...");
    }
}
