use std::sync::Arc;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::models::CollectionKind;

/// Failures talking to the Catalog API
#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Catalog API rejected the session token")]
    Unauthorized,

    #[error("No authentication token found")]
    MissingToken,

    #[error("Catalog API returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid catalog response: {0}")]
    InvalidResponse(String),

    #[error("Failed to store session: {0}")]
    Session(String),

    #[error("Background task failed: {0}")]
    Task(String),
}

impl ApiError {
    /// True when the failure means the current session is no longer usable
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, ApiError::Unauthorized | ApiError::MissingToken)
    }
}

/// Errors surfaced by the membership cache
///
/// `Query` means the answer is unknown, not "not a member". Callers that
/// degrade to a default display state must still log the error.
#[derive(thiserror::Error, Debug)]
pub enum MembershipError {
    #[error("Failed to refresh {kind}: {source}")]
    Query {
        kind: CollectionKind,
        #[source]
        source: Arc<ApiError>,
    },

    #[error("Failed to update {kind} for movie {movie_id}: {source}")]
    Write {
        kind: CollectionKind,
        movie_id: u64,
        #[source]
        source: Arc<ApiError>,
    },

    #[error("Movie {movie_id} is not in {kind}")]
    NotFound { kind: CollectionKind, movie_id: u64 },

    #[error("Session expired. Please login again.")]
    SessionExpired,

    #[error("Invalid movie id: {0}")]
    InvalidMovieId(u64),
}

pub type MembershipResult<T> = Result<T, MembershipError>;

/// Application-level errors returned by the HTTP surface
#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Membership(#[from] MembershipError),

    #[error(transparent)]
    Catalog(#[from] ApiError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Membership(err) => match err {
                MembershipError::SessionExpired => StatusCode::UNAUTHORIZED,
                MembershipError::NotFound { .. } => StatusCode::NOT_FOUND,
                MembershipError::InvalidMovieId(_) => StatusCode::BAD_REQUEST,
                MembershipError::Query { .. } | MembershipError::Write { .. } => {
                    StatusCode::BAD_GATEWAY
                }
            },
            AppError::Catalog(err) => match err {
                ApiError::Unauthorized | ApiError::MissingToken => StatusCode::UNAUTHORIZED,
                ApiError::Status { status: 404, .. } => StatusCode::NOT_FOUND,
                ApiError::Status { status: 400, .. } => StatusCode::BAD_REQUEST,
                ApiError::Task(_) | ApiError::Session(_) => StatusCode::INTERNAL_SERVER_ERROR,
                _ => StatusCode::BAD_GATEWAY,
            },
            AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        };

        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_failures() {
        assert!(ApiError::Unauthorized.is_auth_failure());
        assert!(ApiError::MissingToken.is_auth_failure());
        assert!(!ApiError::Status {
            status: 500,
            body: String::new()
        }
        .is_auth_failure());
    }

    #[test]
    fn test_status_codes() {
        let expired = AppError::from(MembershipError::SessionExpired).into_response();
        assert_eq!(expired.status(), StatusCode::UNAUTHORIZED);

        let missing = AppError::from(MembershipError::NotFound {
            kind: CollectionKind::Favorites,
            movie_id: 42,
        })
        .into_response();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);

        let upstream = AppError::from(MembershipError::Query {
            kind: CollectionKind::Watchlist,
            source: Arc::new(ApiError::Status {
                status: 500,
                body: "boom".to_string(),
            }),
        })
        .into_response();
        assert_eq!(upstream.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_membership_error_messages() {
        let err = MembershipError::NotFound {
            kind: CollectionKind::Watchlist,
            movie_id: 7,
        };
        assert_eq!(err.to_string(), "Movie 7 is not in watchlist");
    }
}
