use crate::error::ApiError;
use crate::response;
use crate::s3::EvidenceStore;
use crate::store::DocumentStore;
use crate::types::{HealthResponse, ServiceStatus};
use lambda_http::http::StatusCode;
use lambda_http::{Body, Response};

/// Check the downstream services. A failed check only degrades the report.
pub async fn check(store: &dyn DocumentStore, evidence: &dyn EvidenceStore) -> HealthResponse {
    let store_ok = match store.ping().await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "Document store ping failed");
            false
        }
    };
    let evidence_ok = evidence.is_ready().await;

    HealthResponse {
        status: if store_ok { "healthy" } else { "degraded" }.to_string(),
        services: ServiceStatus {
            api: "healthy".to_string(),
            document_store: if store_ok { "connected" } else { "disconnected" }.to_string(),
            s3: if evidence_ok { "ready" } else { "not_configured" }.to_string(),
        },
        version: env!("CARGO_PKG_VERSION").to_string(),
    }
}

pub async fn health(
    store: &dyn DocumentStore,
    evidence: &dyn EvidenceStore,
) -> Result<Response<Body>, ApiError> {
    let report = check(store, evidence).await;
    response::json(StatusCode::OK, &report)
}
