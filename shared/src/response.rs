//! JSON response construction shared by every route.

use crate::error::ApiError;
use lambda_http::http::{header, HeaderValue, StatusCode};
use lambda_http::{Body, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Cross-origin headers attached to every response.
pub const CORS_HEADERS: [(&str, &str); 3] = [
    ("Access-Control-Allow-Origin", "*"),
    ("Access-Control-Allow-Headers", "Content-Type,Authorization"),
    ("Access-Control-Allow-Methods", "GET,POST,PUT,DELETE,OPTIONS"),
];

fn build(status: StatusCode, body: String) -> Response<Body> {
    let mut resp = Response::new(Body::from(body));
    *resp.status_mut() = status;
    resp.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    resp
}

/// Serialize `body` as the JSON payload of a `status` response.
pub fn json<T: Serialize>(status: StatusCode, body: &T) -> Result<Response<Body>, ApiError> {
    let payload = serde_json::to_string(body)
        .map_err(|e| ApiError::Internal(format!("failed to serialize response: {}", e)))?;
    Ok(build(status, payload))
}

/// `{"message": ...}` envelope used for errors and simple acknowledgements.
pub fn message(status: StatusCode, message: &str) -> Response<Body> {
    build(status, serde_json::json!({ "message": message }).to_string())
}

pub fn with_cors(mut resp: Response<Body>) -> Response<Body> {
    for (name, value) in CORS_HEADERS {
        resp.headers_mut()
            .insert(name, HeaderValue::from_static(value));
    }
    resp
}

/// Parse a JSON request body; an empty body reads as `{}`.
pub fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, ApiError> {
    let body = if body.iter().all(u8::is_ascii_whitespace) {
        b"{}".as_slice()
    } else {
        body
    };
    serde_json::from_slice(body)
        .map_err(|e| ApiError::validation(format!("Invalid request body: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, serde::Deserialize)]
    struct Payload {
        name: Option<String>,
    }

    #[test]
    fn test_parse_body_empty_is_object() {
        let payload: Payload = parse_body(b"").unwrap();
        assert!(payload.name.is_none());
    }

    #[test]
    fn test_parse_body_rejects_wrong_types() {
        let err = parse_body::<Payload>(br#"{"name": 42}"#).unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[test]
    fn test_with_cors_sets_headers() {
        let resp = with_cors(message(StatusCode::OK, "ok"));
        for (name, value) in CORS_HEADERS {
            assert_eq!(resp.headers()[name], value);
        }
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "application/json");
    }
}
