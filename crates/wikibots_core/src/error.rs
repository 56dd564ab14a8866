use reqwest::StatusCode;
use thiserror::Error;

/// Failure reported by the remote wiki or the transport in front of it.
#[derive(Debug, Error)]
pub enum WikiError {
    #[error("MediaWiki API error [{code}]: {info}")]
    Api { code: String, info: String },
    #[error("MediaWiki API request failed with HTTP {0}")]
    Http(StatusCode),
    #[error("failed to call MediaWiki API")]
    Network(#[source] reqwest::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Worth another attempt after a delay.
    Transient,
    /// Retrying cannot help; the page is counted as an error.
    Permanent,
}

const TRANSIENT_API_CODES: &[&str] = &[
    "badtoken",
    "maxlag",
    "ratelimited",
    "readonly",
    "editconflict-retry",
    "internal_api_error_DBQueryError",
    "internal_api_error_DBQueryTimeoutError",
];

impl WikiError {
    pub fn api(code: impl Into<String>, info: impl Into<String>) -> Self {
        Self::Api {
            code: code.into(),
            info: info.into(),
        }
    }

    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Api { code, .. } => Some(code),
            _ => None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Api { code, .. } => {
                if TRANSIENT_API_CODES.contains(&code.as_str()) {
                    ErrorKind::Transient
                } else {
                    ErrorKind::Permanent
                }
            }
            Self::Http(status) => {
                if is_retryable_status(*status) {
                    ErrorKind::Transient
                } else {
                    ErrorKind::Permanent
                }
            }
            Self::Network(error) => {
                if error.is_timeout() || error.is_connect() || error.is_request() {
                    ErrorKind::Transient
                } else {
                    ErrorKind::Permanent
                }
            }
        }
    }
}

/// Classify an error chain. Anything that is not a `WikiError` (decode
/// failures, local I/O) is permanent.
pub fn classify(error: &anyhow::Error) -> ErrorKind {
    error
        .chain()
        .find_map(|cause| cause.downcast_ref::<WikiError>())
        .map_or(ErrorKind::Permanent, WikiError::kind)
}

/// MediaWiki error code carried anywhere in the chain.
pub fn api_code(error: &anyhow::Error) -> Option<&str> {
    error
        .chain()
        .find_map(|cause| cause.downcast_ref::<WikiError>())
        .and_then(WikiError::code)
}

pub(crate) fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
}
