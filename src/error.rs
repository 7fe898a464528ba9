use thiserror::Error;

/// Failure talking to an EDGAR endpoint.
///
/// A 404 is not represented here: sources report it as `Ok(None)`.
#[derive(Debug, Error)]
pub enum EdgarError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected response status {status} from {url}")]
    Status { status: u16, url: String },

    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

impl EdgarError {
    /// Timeouts, connection failures and 5xx responses.
    pub fn is_transient(&self) -> bool {
        match self {
            EdgarError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            EdgarError::Status { status, .. } => *status >= 500 || *status == 429,
            EdgarError::Url(_) => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("malformed feed document: {0}")]
    Parse(String),
}

impl From<quick_xml::Error> for FeedError {
    fn from(e: quick_xml::Error) -> Self {
        FeedError::Parse(e.to_string())
    }
}

/// An entry whose title matched none of the known grammars.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("cannot classify entry {title:?}: {reason}")]
pub struct ClassificationFailure {
    pub title: String,
    pub reason: String,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("an ingestion run is already in progress")]
    AlreadyRunning,

    #[error("a backfill of {0} days reaches before the earliest representable date")]
    BackfillWindow(u32),

    #[error("storage failure: {0}")]
    Store(#[from] anyhow::Error),
}
