use lambda_http::{
    http::{header, Method, StatusCode},
    Body, Error, Request, Response,
};
use rakshak_shared::error::ApiError;
use rakshak_shared::{alerts, guardians, health, response, users, AppState};
use std::sync::Arc;
use std::time::Instant;

/// Main Lambda handler - routes requests to the public or authenticated endpoints
pub(crate) async fn function_handler(
    event: Request,
    state: Arc<AppState>,
) -> Result<Response<Body>, Error> {
    tracing::info!(method = %event.method(), path = %event.uri().path(), "RAKSHAK API invoked");

    // Handle CORS preflight
    if event.method() == Method::OPTIONS {
        return Ok(response::with_cors(response::message(StatusCode::OK, "OK")));
    }

    let resp = match route(&event, &state).await {
        Ok(resp) => resp,
        Err(e) => e.into_response(),
    };
    Ok(response::with_cors(resp))
}

async fn route(event: &Request, state: &AppState) -> Result<Response<Body>, ApiError> {
    let method = event.method();
    let path = event.uri().path();
    let parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    // Health check (public)
    if method == Method::GET && matches!(parts.as_slice(), ["health"]) {
        return health::health(state.store.as_ref(), state.evidence.as_ref()).await;
    }

    // Everything else needs a verified token
    let authorization = event
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    let claims = state.verifier.verify(authorization).await?;
    let user_id = claims.sub.as_str();

    let body: &[u8] = event.body();
    let store = state.store.as_ref();

    match (method, parts.as_slice()) {
        // --- PROFILE ---
        (&Method::GET, ["user", "profile"]) => users::get_profile(store, user_id).await,
        (&Method::PUT, ["user", "profile"]) => users::update_profile(store, user_id, body).await,

        // --- GUARDIANS ---
        (&Method::GET, ["user", "guardians"] | ["user", "guardians", _]) => {
            guardians::list_guardians(store, user_id).await
        }
        (&Method::POST, ["user", "guardians"]) => {
            guardians::create_guardian(store, user_id, body).await
        }
        (&Method::PUT, ["user", "guardians", guardian_id]) => {
            guardians::update_guardian(store, user_id, guardian_id, body).await
        }
        (&Method::DELETE, ["user", "guardians", guardian_id]) => {
            guardians::delete_guardian(store, user_id, guardian_id).await
        }

        // --- ALERTS ---
        (&Method::POST, ["alert", "simulate"]) => {
            state
                .rate_limiter
                .try_acquire(user_id, Instant::now())
                .map_err(|retry_after| {
                    tracing::info!(user_id = %user_id, "Alert trigger rate limited");
                    ApiError::RateLimited { retry_after }
                })?;
            alerts::simulate(store, state.mailer.as_ref(), user_id, body).await
        }
        (&Method::GET, ["alert", "history"]) => alerts::history(store, user_id).await,
        (&Method::POST, ["alert", "evidence"]) => {
            alerts::evidence_upload_url(store, state.evidence.as_ref(), user_id, body).await
        }

        // Known path, wrong method
        (
            _,
            ["health"]
            | ["user", "profile"]
            | ["user", "guardians"]
            | ["user", "guardians", _]
            | ["alert", "simulate" | "history" | "evidence"],
        ) => Err(ApiError::MethodNotAllowed),

        _ => Err(ApiError::NotFound(format!(
            "Route not found: {} {}",
            method, path
        ))),
    }
}
