use reqwest::StatusCode;

/// Errors surfaced by the scraping pipeline.
///
/// Cache faults never appear here: the cache is best-effort and the service
/// layer degrades to a direct fetch instead of failing the request. A missing
/// table or header row is likewise not an error; it parses to an empty
/// dataset.
#[derive(Debug, thiserror::Error)]
pub enum DseError {
    #[error("invalid upstream url: {0}")]
    Url(#[from] url::ParseError),
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status {status} from {url}")]
    Status { url: String, status: StatusCode },
    #[error("'{0}' is not a valid YYYY-MM-DD date")]
    Date(String),
    #[error("start date {start} is after end date {end}")]
    DateRange { start: String, end: String },
}

impl DseError {
    /// True for the date-validation variants, which the HTTP layer reports
    /// with their own message instead of the generic fetch-failure one.
    pub fn is_validation(&self) -> bool {
        matches!(self, DseError::Date(_) | DseError::DateRange { .. })
    }
}
