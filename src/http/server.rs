use log::info;
use rouille::{Request, Response};
use serde::{Deserialize, Serialize};
use std::{
    io::Read,
    path::Path,
    sync::{Arc, Mutex, MutexGuard},
};

use crate::{
    acquisition::{AcquireEvents, NowPlaying},
    classifier::ImageUpload,
    config::HttpConfig,
    domain::{candidate::Candidate, entity::IdentifiedEntity},
    fetch::{FetchError, FetchProgress},
    http::error::{ApiError, ApiFailure},
    jukebox::Jukebox,
};

const STREAM_ROUTE: &str = "/playing/stream";

pub struct HttpServer {
    jukebox: Arc<Mutex<Jukebox>>,
    pub config: HttpConfig,
}

/// Progress goes to the log, the HTTP client only sees the final result
struct LogEvents;

impl AcquireEvents for LogEvents {
    fn attempting(&mut self, candidate: &Candidate) {
        info!("Trying: {}", candidate.short_title(30));
    }

    fn progress(&mut self, candidate: &Candidate, progress: FetchProgress) {
        match progress {
            FetchProgress::Downloading {
                fraction: Some(fraction),
            } => log::debug!("{}: downloading {}%", candidate.id, (fraction * 100.0) as u32),
            FetchProgress::Downloading { fraction: None } => {}
            FetchProgress::Finished => log::debug!("{}: download complete, preparing audio", candidate.id),
        }
    }

    fn skipped(&mut self, candidate: &Candidate, reason: &FetchError) {
        info!("Skipping unavailable video: {} ({reason})", candidate.title);
    }
}

impl HttpServer {
    pub fn new(jukebox: Jukebox, config: HttpConfig) -> Self {
        Self {
            jukebox: Arc::new(Mutex::new(jukebox)),
            config,
        }
    }

    pub fn run(self) {
        let addr = format!("{}:{}", self.config.bind_addr, self.config.port);
        rouille::start_server(addr, move |request| self.handle_request(request));
    }

    fn handle_request(&self, request: &Request) -> Response {
        Self::log_request(request);

        let result = rouille::router!(request,
            (POST) (/identify) => {
                self.handle_identify(request)
            },
            (POST) (/play) => {
                self.handle_play_another()
            },
            (POST) (/reset) => {
                self.handle_reset()
            },
            (GET) (/playing) => {
                self.handle_now_playing()
            },
            (GET) (/playing/stream) => {
                self.handle_stream()
            },
            _ => Ok(Response::empty_404())
        );

        let response = result.unwrap_or_else(ApiFailure::into_response);
        info!("Response: {} {}", request.method(), response.status_code);
        response
    }

    fn log_request(request: &Request) {
        info!("{} {}", request.method(), request.url());
    }

    fn lock(&self) -> Result<MutexGuard<'_, Jukebox>, ApiFailure> {
        self.jukebox.lock().map_err(|e| {
            log::error!("jukebox lock poisoned: {e}");
            ApiError::Internal("internal server error".into()).into()
        })
    }

    fn read_image(request: &Request) -> Result<ImageUpload, ApiFailure> {
        let mut bytes = Vec::new();
        if let Some(mut data) = request.data() {
            data.read_to_end(&mut bytes)
                .map_err(|e| ApiError::BadRequest(format!("failed to read image: {e}")))?;
        }
        if bytes.is_empty() {
            return Err(ApiError::BadRequest("missing image body".into()).into());
        }

        let mime_type = request
            .header("Content-Type")
            .map(|h| h.split(';').next().unwrap_or_default().trim().to_lowercase())
            .filter(|h| h.starts_with("image/"))
            .unwrap_or_else(|| "image/jpeg".to_string());
        Ok(ImageUpload::new(bytes, mime_type))
    }

    fn handle_identify(&self, request: &Request) -> Result<Response, ApiFailure> {
        let image = Self::read_image(request)?;
        let mut jukebox = self.lock()?;
        let playing = jukebox.identify(&image, &mut LogEvents)?;
        Ok(Response::json(&NowPlayingResponse::from_domain(
            jukebox.entity(),
            &playing,
        )))
    }

    fn handle_play_another(&self) -> Result<Response, ApiFailure> {
        let mut jukebox = self.lock()?;
        let playing = jukebox.play_next(&mut LogEvents)?;
        Ok(Response::json(&NowPlayingResponse::from_domain(
            jukebox.entity(),
            &playing,
        )))
    }

    fn handle_reset(&self) -> Result<Response, ApiFailure> {
        self.lock()?.reset();
        Ok(Response::empty_204())
    }

    fn handle_now_playing(&self) -> Result<Response, ApiFailure> {
        let jukebox = self.lock()?;
        Ok(Response::json(&StateResponse {
            entity: jukebox.entity().cloned(),
            candidates_tried: jukebox.session().seen_ids().len(),
            now_playing: jukebox
                .now_playing()
                .map(|p| NowPlayingResponse::from_domain(jukebox.entity(), p)),
        }))
    }

    fn handle_stream(&self) -> Result<Response, ApiFailure> {
        let path = {
            let jukebox = self.lock()?;
            let playing = jukebox
                .now_playing()
                .ok_or_else(|| ApiError::NotFound("nothing is playing".into()))?;
            playing.path.clone()
        };

        let mime = Self::mime_for_track(&path);
        let file = std::fs::File::open(&path).map_err(|e| {
            log::error!("cannot open {}: {e}", path.to_string_lossy());
            ApiError::NotFound("audio file is gone".into())
        })?;
        log::debug!(
            "STREAM -> 200 OK, path: {}, MIME type: {}",
            path.to_string_lossy(),
            mime
        );

        Ok(Response::from_file(mime, file))
    }

    fn mime_for_track(path: &Path) -> String {
        let ext = path
            .extension()
            .map(|ext| ext.to_string_lossy())
            .map(|s| s.to_lowercase());
        let default = || {
            mime_guess::from_path(path)
                .first_or_octet_stream()
                .to_string()
        };
        ext.and_then(|ext| Self::mime_from_ext(ext.as_str()))
            .unwrap_or_else(default)
    }

    /// Map file extension (without dot) to proper MIME type for browser playback.
    /// Returns None if the extension is not recognized.
    pub fn mime_from_ext(ext: &str) -> Option<String> {
        match ext {
            "m4a" => Some("audio/x-m4a".to_string()), // Safari iOS compatible
            "aac" => Some("audio/aac".to_string()),
            "mp3" => Some("audio/mpeg".to_string()),
            "opus" => Some("audio/ogg".to_string()),
            "ogg" => Some("audio/ogg".to_string()),
            "wav" => Some("audio/wav".to_string()),
            "flac" => Some("audio/flac".to_string()),
            _ => None,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct NowPlayingResponse {
    entity: Option<IdentifiedEntity>,
    candidate_id: String,
    title: String,
    thumbnail_url: String,
    watch_url: String,
    from_cache: bool,
    stream_url: String,
}

impl NowPlayingResponse {
    fn from_domain(entity: Option<&IdentifiedEntity>, playing: &NowPlaying) -> Self {
        Self {
            entity: entity.cloned(),
            candidate_id: playing.candidate.id.clone(),
            title: playing.candidate.title.clone(),
            thumbnail_url: playing.candidate.thumbnail_url.clone(),
            watch_url: playing.candidate.watch_url.clone(),
            from_cache: playing.from_cache,
            stream_url: STREAM_ROUTE.to_string(),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct StateResponse {
    entity: Option<IdentifiedEntity>,
    /// candidates offered so far in this session, played or skipped
    candidates_tried: usize,
    now_playing: Option<NowPlayingResponse>,
}

#[cfg(test)]
pub fn parse_json_response<T: serde::de::DeserializeOwned>(
    response: rouille::Response,
) -> anyhow::Result<T> {
    Ok(serde_json::from_reader(
        response.data.into_reader_and_size().0,
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::entity::EntityKind,
        fetch::FetchError,
        testing::{FakeClassifier, FakeSearch, ScriptedFetcher, candidates, memory_cache},
    };

    use rouille::Request;
    use serde_json::Value;
    use tempfile::{TempDir, tempdir};

    fn create_server(reply: &str, search: FakeSearch, fetcher: ScriptedFetcher) -> (HttpServer, TempDir) {
        let tmp = tempdir().unwrap();
        let jukebox = Jukebox::new(
            Box::new(FakeClassifier(Some(reply.to_string()))),
            Box::new(search),
            Box::new(fetcher),
            Box::new(memory_cache(tmp.path())),
            10,
        );
        let server = HttpServer::new(
            jukebox,
            HttpConfig {
                bind_addr: "0.0.0.0".to_string(),
                port: 8080,
            },
        );
        (server, tmp)
    }

    fn create_default_server() -> (HttpServer, TempDir) {
        create_server(
            "Artist: Test Singer",
            FakeSearch::returning(candidates(&["v1", "v2"])),
            ScriptedFetcher::new(),
        )
    }

    fn identify_request() -> Request {
        Request::fake_http(
            "POST",
            "/identify",
            vec![("Content-Type".to_string(), "image/png".to_string())],
            vec![0x89, b'P', b'N', b'G'],
        )
    }

    fn post(url: &str) -> Request {
        Request::fake_http("POST", url, vec![], vec![])
    }

    fn get(url: &str) -> Request {
        Request::fake_http("GET", url, vec![], vec![])
    }

    // --------------------------------------------------
    // ✅ SUCCESS
    // --------------------------------------------------

    #[test]
    fn test_http_identify_plays_first_track() -> anyhow::Result<()> {
        let (server, _tmp) = create_default_server();

        let response = server.handle_request(&identify_request());

        assert_eq!(response.status_code, 200);
        let body: NowPlayingResponse = parse_json_response(response)?;
        assert_eq!(body.candidate_id, "v1");
        assert_eq!(body.stream_url, "/playing/stream");
        assert_eq!(
            body.entity,
            Some(IdentifiedEntity::new("Test Singer", EntityKind::Artist))
        );
        assert!(!body.from_cache);
        Ok(())
    }

    #[test]
    fn test_http_play_another_then_state() -> anyhow::Result<()> {
        let (server, _tmp) = create_default_server();
        server.handle_request(&identify_request());

        let response = server.handle_request(&post("/play"));
        assert_eq!(response.status_code, 200);
        let body: NowPlayingResponse = parse_json_response(response)?;
        assert_eq!(body.candidate_id, "v2");

        let state: StateResponse = parse_json_response(server.handle_request(&get("/playing")))?;
        assert_eq!(state.now_playing.map(|p| p.candidate_id), Some("v2".to_string()));
        assert_eq!(state.candidates_tried, 2);
        Ok(())
    }

    #[test]
    fn test_http_stream_current_file() -> anyhow::Result<()> {
        let (server, _tmp) = create_default_server();
        server.handle_request(&identify_request());

        let response = server.handle_request(&get("/playing/stream"));

        assert_eq!(response.status_code, 200);
        let mut body = Vec::new();
        response
            .data
            .into_reader_and_size()
            .0
            .read_to_end(&mut body)?;
        assert_eq!(body, b"audio of v1");
        Ok(())
    }

    #[test]
    fn test_http_reset_clears_state() -> anyhow::Result<()> {
        let (server, _tmp) = create_default_server();
        server.handle_request(&identify_request());

        let response = server.handle_request(&post("/reset"));
        assert_eq!(response.status_code, 204);

        let state: StateResponse = parse_json_response(server.handle_request(&get("/playing")))?;
        assert!(state.entity.is_none());
        assert!(state.now_playing.is_none());
        assert_eq!(state.candidates_tried, 0);
        Ok(())
    }

    // --------------------------------------------------
    // ❌ FAILURES
    // --------------------------------------------------

    #[test]
    fn test_http_identify_without_body() {
        let (server, _tmp) = create_default_server();

        let response = server.handle_request(&post("/identify"));

        assert_eq!(response.status_code, 400);
    }

    #[test]
    fn test_http_identify_no_match() -> anyhow::Result<()> {
        let (server, _tmp) = create_server(
            "No match",
            FakeSearch::returning(candidates(&["v1"])),
            ScriptedFetcher::new(),
        );

        let response = server.handle_request(&identify_request());

        assert_eq!(response.status_code, 422);
        let body: Value = parse_json_response(response)?;
        assert_eq!(body["warning"], true);
        Ok(())
    }

    #[test]
    fn test_http_play_without_session() {
        let (server, _tmp) = create_default_server();

        let response = server.handle_request(&post("/play"));

        assert_eq!(response.status_code, 409);
    }

    #[test]
    fn test_http_exhausted_offers_fallback_link() -> anyhow::Result<()> {
        let (server, _tmp) = create_server(
            "Artist: Test Singer",
            FakeSearch::returning(candidates(&["v1"])),
            ScriptedFetcher::new(),
        );
        server.handle_request(&identify_request());

        let response = server.handle_request(&post("/play"));

        assert_eq!(response.status_code, 404);
        let body: Value = parse_json_response(response)?;
        assert_eq!(
            body["fallback_url"],
            "https://www.youtube.com/results?search_query=Test+Singer"
        );
        Ok(())
    }

    #[test]
    fn test_http_fatal_fetch_is_bad_gateway() -> anyhow::Result<()> {
        let (server, _tmp) = create_server(
            "Figure: Krishna",
            FakeSearch::returning(candidates(&["k1"])),
            ScriptedFetcher::new().failing("k1", FetchError::Failed("disk full".into())),
        );

        let response = server.handle_request(&identify_request());

        assert_eq!(response.status_code, 502);
        let body: Value = parse_json_response(response)?;
        assert_eq!(
            body["fallback_url"],
            "https://www.youtube.com/results?search_query=Krishna"
        );
        assert_eq!(body["warning"], false);
        Ok(())
    }

    #[test]
    fn test_http_search_unavailable() {
        let (server, _tmp) = create_server("Artist: X", FakeSearch::offline(), ScriptedFetcher::new());

        let response = server.handle_request(&identify_request());

        assert_eq!(response.status_code, 503);
    }

    #[test]
    fn test_http_stream_without_track() {
        let (server, _tmp) = create_default_server();

        let response = server.handle_request(&get("/playing/stream"));

        assert_eq!(response.status_code, 404);
    }

    #[test]
    fn test_mime_for_cached_files() {
        assert_eq!(HttpServer::mime_for_track(Path::new("a/v1.mp3")), "audio/mpeg");
        assert_eq!(HttpServer::mime_for_track(Path::new("a/v1.M4A")), "audio/x-m4a");
    }
}
