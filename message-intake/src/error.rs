use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::store::StoreError;

/// Why a submission was not persisted.
#[derive(Debug, Error)]
pub enum IngestError {
    /// The payload could not be decoded into a submission at all.
    #[error("malformed submission: {0}")]
    Decode(String),

    /// The payload decoded but a required field is missing or empty.
    #[error("invalid submission: {0}")]
    Validation(&'static str),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl IntoResponse for IngestError {
    fn into_response(self) -> Response {
        let (status, reason) = match self {
            IngestError::Decode(_) | IngestError::Validation(_) => {
                (StatusCode::BAD_REQUEST, "Bad Request")
            }
            IngestError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error"),
        };

        (status, reason).into_response()
    }
}
