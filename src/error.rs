use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Teloxide request error: {0}")]
    Teloxide(#[from] teloxide::RequestError),

    #[error("Reqwest error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error(transparent)]
    Retrieval(#[from] RetrievalError),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Everything a single retrieval can fail with. The chat layer only needs the
/// variant; the payload is there for the operator.
#[derive(Error, Debug)]
pub enum RetrievalError {
    #[error("This link is not supported")]
    UnsupportedPlatform,

    #[error("Invalid output name: {0}")]
    InvalidBasename(String),

    #[error("Could not read media info: {0}")]
    MetadataUnavailable(String),

    #[error("Only videos shorter than {} minutes can be downloaded", .0 / 60)]
    ContentTooLong(u64),

    #[error("Video extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("Upstream responded with HTTP {0}")]
    UpstreamHttpError(u16),

    #[error("No image found on the page")]
    ImageUrlNotFound,

    #[error("Page is larger than {0} bytes")]
    PageTooLarge(usize),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("External tool failed: {0}")]
    ExternalToolFailed(String),

    #[error("Operation timed out")]
    Timeout,

    #[error("Download produced no file: {0}")]
    EmptyOrMissingOutput(String),

    #[error("Download produced {0} files where one was expected")]
    AmbiguousOutput(usize),

    #[error("Filesystem error: {0}")]
    Filesystem(String),
}

impl RetrievalError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnsupportedPlatform => "unsupported_platform",
            Self::InvalidBasename(_) => "invalid_basename",
            Self::MetadataUnavailable(_) => "metadata_unavailable",
            Self::ContentTooLong(_) => "content_too_long",
            Self::ExtractionFailed(_) => "extraction_failed",
            Self::UpstreamHttpError(_) => "upstream_http_error",
            Self::ImageUrlNotFound => "image_url_not_found",
            Self::PageTooLarge(_) => "page_too_large",
            Self::NetworkError(_) => "network_error",
            Self::ExternalToolFailed(_) => "external_tool_failed",
            Self::Timeout => "timeout",
            Self::EmptyOrMissingOutput(_) => "empty_or_missing_output",
            Self::AmbiguousOutput(_) => "ambiguous_output",
            Self::Filesystem(_) => "filesystem",
        }
    }
}

impl From<reqwest::Error> for RetrievalError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::NetworkError(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_too_long_reports_minutes() {
        let err = RetrievalError::ContentTooLong(6000);
        assert_eq!(
            err.to_string(),
            "Only videos shorter than 100 minutes can be downloaded"
        );
        assert_eq!(err.kind(), "content_too_long");
    }
}
