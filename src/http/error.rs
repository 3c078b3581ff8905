use rouille::Response;
use serde::Serialize;

use crate::jukebox::PlaybackError;

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    /// the request needs an identified entity first
    Conflict(String),
    Unprocessable(String),
    /// a remote collaborator failed
    BadGateway(String),
    Unavailable(String),
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    warning: bool,
    fallback_url: Option<&'a str>,
}

/// Error with the remediation link to render next to it
pub struct ApiFailure {
    pub error: ApiError,
    pub warning: bool,
    pub fallback_url: Option<String>,
}

impl From<ApiError> for ApiFailure {
    fn from(error: ApiError) -> Self {
        Self {
            error,
            warning: false,
            fallback_url: None,
        }
    }
}

impl From<PlaybackError> for ApiFailure {
    fn from(err: PlaybackError) -> Self {
        let message = err.to_string();
        let warning = err.is_warning();
        let fallback_url = err.remediation().map(str::to_string);

        let error = match err {
            PlaybackError::NoEntityMatch => ApiError::Unprocessable(message),
            PlaybackError::NoSession => ApiError::Conflict(message),
            PlaybackError::NoCandidatesFound { .. } | PlaybackError::AllCandidatesExhausted { .. } => {
                ApiError::NotFound(message)
            }
            PlaybackError::ClassificationFailed(_) | PlaybackError::FetchFailed { .. } => {
                ApiError::BadGateway(message)
            }
            PlaybackError::SearchUnavailable(_) => ApiError::Unavailable(message),
            PlaybackError::Cache(e) => {
                log::error!("cache failure: {e}");
                ApiError::Internal("internal server error".into())
            }
        };

        Self {
            error,
            warning,
            fallback_url,
        }
    }
}

impl ApiError {
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::BadRequest(_) => 400,
            ApiError::NotFound(_) => 404,
            ApiError::Conflict(_) => 409,
            ApiError::Unprocessable(_) => 422,
            ApiError::BadGateway(_) => 502,
            ApiError::Unavailable(_) => 503,
            ApiError::Internal(_) => 500,
        }
    }

    fn message(&self) -> &str {
        match self {
            ApiError::BadRequest(msg)
            | ApiError::NotFound(msg)
            | ApiError::Conflict(msg)
            | ApiError::Unprocessable(msg)
            | ApiError::BadGateway(msg)
            | ApiError::Unavailable(msg)
            | ApiError::Internal(msg) => msg,
        }
    }
}

impl ApiFailure {
    pub fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.error.message(),
            warning: self.warning,
            fallback_url: self.fallback_url.as_deref(),
        };
        Response::json(&body).with_status_code(self.error.status_code())
    }
}
