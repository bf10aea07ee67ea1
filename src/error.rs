use axum::http::StatusCode;
use thiserror::Error;

/// Failures of the donation/request lifecycle and the chat broker.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Malformed or missing input.
    #[error("{0}")]
    Validation(String),

    /// No identity, or the identity has the wrong role for the action.
    #[error("{0}")]
    Authorization(String),

    /// The identity is valid but does not own the record it is acting on.
    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    /// A state-machine precondition does not hold.
    #[error("{0}")]
    Conflict(String),

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

impl CoreError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn authorization(msg: impl Into<String>) -> Self {
        Self::Authorization(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Authorization(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_taxonomy() {
        assert_eq!(CoreError::validation("x").status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(CoreError::authorization("x").status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(CoreError::forbidden("x").status_code(), StatusCode::FORBIDDEN);
        assert_eq!(CoreError::not_found("x").status_code(), StatusCode::NOT_FOUND);
        assert_eq!(CoreError::conflict("x").status_code(), StatusCode::CONFLICT);
        assert_eq!(
            CoreError::from(sqlx::Error::RowNotFound).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn display_is_the_bare_message() {
        let err = CoreError::conflict("Donation is no longer available.");
        assert_eq!(err.to_string(), "Donation is no longer available.");
    }
}
