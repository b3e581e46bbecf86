//! Handler error type and its mapping onto HTTP status codes.

use crate::auth::AuthError;
use crate::response;
use crate::store::StoreError;
use lambda_http::http::{header::RETRY_AFTER, HeaderValue, StatusCode};
use lambda_http::{Body, Response};
use std::time::Duration;

pub const UNAUTHORIZED_MESSAGE: &str = "Unauthorized. Please log in.";
pub const INTERNAL_MESSAGE: &str = "Internal server error";

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Unauthorized(#[from] AuthError),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("rate limited, retry in {}s", whole_seconds(.retry_after))]
    RateLimited { retry_after: Duration },

    #[error("Method not allowed")]
    MethodNotAllowed,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        ApiError::Validation(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::Store(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message shown to the caller. Auth and server-side details stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            ApiError::Unauthorized(_) => UNAUTHORIZED_MESSAGE.to_string(),
            ApiError::RateLimited { retry_after } => format!(
                "Please wait {} seconds before triggering another alert.",
                whole_seconds(retry_after)
            ),
            ApiError::Store(_) | ApiError::Internal(_) => INTERNAL_MESSAGE.to_string(),
            other => other.to_string(),
        }
    }

    pub fn into_response(self) -> Response<Body> {
        match &self {
            ApiError::Unauthorized(reason) => {
                tracing::warn!(reason = %reason, "Auth failed");
            }
            ApiError::Store(_) | ApiError::Internal(_) => {
                tracing::error!(error = %self, "Unhandled error");
            }
            _ => {}
        }

        let mut resp = response::message(self.status(), &self.public_message());
        if let ApiError::RateLimited { retry_after } = &self {
            resp.headers_mut()
                .insert(RETRY_AFTER, HeaderValue::from(whole_seconds(retry_after)));
        }
        resp
    }
}

/// Remaining wait rounded up to whole seconds, never below one.
fn whole_seconds(wait: &Duration) -> u64 {
    let secs = wait.as_secs() + u64::from(wait.subsec_nanos() > 0);
    secs.max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ApiError::from(AuthError::Expired).status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::validation("x").status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::NotFound("x".into()).status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::MethodNotAllowed.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(
            ApiError::from(StoreError::Backend("boom".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_details_are_not_leaked() {
        let err = ApiError::from(StoreError::Backend("connection refused to 10.0.0.4".into()));
        assert_eq!(err.public_message(), INTERNAL_MESSAGE);

        let err = ApiError::from(AuthError::UnknownKeyId("kid-9".into()));
        assert_eq!(err.public_message(), UNAUTHORIZED_MESSAGE);
    }

    #[test]
    fn test_rate_limited_rounds_up() {
        let err = ApiError::RateLimited {
            retry_after: Duration::from_millis(8_200),
        };
        assert_eq!(
            err.public_message(),
            "Please wait 9 seconds before triggering another alert."
        );
        let resp = err.into_response();
        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(resp.headers()[RETRY_AFTER], "9");
    }
}
