use thiserror::Error;

use telecare_shared::CoreError;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("http request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("portal returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("response decode failed: {0}")]
    Decode(String),

    #[error("store rejected the operation: {0}")]
    Rejected(String),

    #[error("not found: {0}")]
    NotFound(String),
}

impl From<ApiError> for CoreError {
    fn from(err: ApiError) -> Self {
        CoreError::PersistenceFailure(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;
