use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("'The date supplied {date} is invalid, expected YYYY-MM-DD'")]
    InvalidDate { date: String },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{api} responded with {status}: {body}")]
    ApiFailure {
        api: &'static str,
        status: StatusCode,
        body: String,
    },

    #[error("Failed to parse URL: {0}")]
    UrlParsingFailed(#[from] url::ParseError),

    #[error("Failed to resolve default credentials: {message}")]
    Credentials { message: String },

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),
}

impl From<google_cloud_auth::error::Error> for Error {
    fn from(err: google_cloud_auth::error::Error) -> Self {
        Error::Credentials {
            message: err.to_string(),
        }
    }
}
