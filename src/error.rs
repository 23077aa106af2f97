use thiserror::Error;

/// Failure categories surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidInput,
    UpstreamDetection,
    UpstreamComparison,
    Storage,
    NotFound,
    Internal,
}

impl ErrorKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidInput => "INVALID_INPUT",
            Self::UpstreamDetection => "UPSTREAM_DETECTION_FAILURE",
            Self::UpstreamComparison => "UPSTREAM_COMPARISON_FAILURE",
            Self::Storage => "STORAGE_FAILURE",
            Self::NotFound => "NOT_FOUND",
            Self::Internal => "INTERNAL",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("selection does not contain any known hold")]
    EmptySelection,
    #[error("hold detection failed: {0}")]
    UpstreamDetection(String),
    #[error("route comparison failed: {0}")]
    UpstreamComparison(String),
    #[error("route storage failed: {context}: {source}")]
    Storage {
        context: String,
        #[source]
        source: std::io::Error,
    },
    #[error("route image not found: {0}")]
    NotFound(String),
    #[error("image processing failed: {0}")]
    Image(#[from] image::ImageError),
    #[error("worker pool error: {0}")]
    WorkerPool(String),
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput(_) | Self::EmptySelection => ErrorKind::InvalidInput,
            Self::UpstreamDetection(_) => ErrorKind::UpstreamDetection,
            Self::UpstreamComparison(_) => ErrorKind::UpstreamComparison,
            Self::Storage { .. } => ErrorKind::Storage,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Image(_) | Self::WorkerPool(_) => ErrorKind::Internal,
        }
    }

    pub(crate) fn storage(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Storage {
            context: context.into(),
            source,
        }
    }
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;
