use http::StatusCode;

/// Internal failure taxonomy. Every variant maps onto exactly one HTTP
/// status; provider-reported errors use the same vocabulary.
#[derive(Debug, thiserror::Error)]
pub enum DavError {
    #[error("bad request")]
    BadRequest,
    #[error("not found")]
    NotFound,
    #[error("method not allowed")]
    MethodNotAllowed,
    #[error("forbidden")]
    Forbidden,
    #[error("conflict")]
    Conflict,
    #[error("precondition failed")]
    PreconditionFailed,
    #[error("locked")]
    Locked,
    #[error("failed dependency")]
    FailedDependency,
    #[error("insufficient storage")]
    InsufficientStorage,
    #[error("bad gateway")]
    BadGateway,
    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

impl DavError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest => StatusCode::BAD_REQUEST,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::Conflict => StatusCode::CONFLICT,
            Self::PreconditionFailed => StatusCode::PRECONDITION_FAILED,
            Self::Locked => StatusCode::LOCKED,
            Self::FailedDependency => StatusCode::FAILED_DEPENDENCY,
            Self::InsufficientStorage => StatusCode::INSUFFICIENT_STORAGE,
            Self::BadGateway => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<http::Error> for DavError {
    fn from(value: http::Error) -> Self {
        Self::Internal(value.into())
    }
}
