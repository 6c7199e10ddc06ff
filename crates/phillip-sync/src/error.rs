use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[cfg(feature = "http")]
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server returned {status}: {body}")]
    Server { status: u16, body: String },

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("page has no <script id=\"{0}\"> tag")]
    MissingJsonTag(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("unexpected payload: {0}")]
    Malformed(String),

    #[error("invalid timestamp {raw:?}: {source}")]
    Timestamp {
        raw: String,
        source: chrono::ParseError,
    },
}
