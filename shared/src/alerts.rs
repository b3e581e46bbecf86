//! Alert lifecycle: record, fan out, resolve.
//!
//! An alert is stored as `processing` before any guardian is contacted and
//! moves to its terminal status in one update once every send has resolved.
//! The two writes are not atomic; a crash in between leaves the alert in
//! `processing`.

use crate::email::Mailer;
use crate::error::ApiError;
use crate::guardians::find_guardians;
use crate::notify::{notify_all, AlertContext};
use crate::response;
use crate::s3::{content_type_for, evidence_key, EvidenceStore, EVIDENCE_URL_TTL};
use crate::store::{from_document, to_document, Collection, Document, DocumentStore, Filter, FindOptions};
use crate::types::{
    Alert, AlertStatus, EvidenceUploadRequest, EvidenceUploadResponse, Location,
    SimulateAlertRequest, SimulateAlertResponse,
};
use chrono::{SecondsFormat, Utc};
use lambda_http::http::StatusCode;
use lambda_http::{Body, Response};
use serde_json::Value;
use uuid::Uuid;

pub const HISTORY_LIMIT: usize = 50;
pub const DEFAULT_DETECTION_TYPE: &str = "voice_distress";
pub const DELIVERY_METHOD: &str = "email";
const DEFAULT_EXTENSION: &str = "bin";

/// Validated input of one alert trigger.
#[derive(Debug, Clone, PartialEq)]
pub struct AlertInput {
    pub location: Location,
    pub detection_type: String,
    pub confidence: f64,
}

impl TryFrom<SimulateAlertRequest> for AlertInput {
    type Error = ApiError;

    fn try_from(req: SimulateAlertRequest) -> Result<Self, Self::Error> {
        let location = req.location.unwrap_or_default();
        let detection_type = req
            .detection_type
            .unwrap_or_else(|| DEFAULT_DETECTION_TYPE.to_string());
        let confidence = req.confidence.unwrap_or(0.0);

        if !(-90.0..=90.0).contains(&location.lat) {
            return Err(ApiError::validation("Latitude must be between -90 and 90"));
        }
        if !(-180.0..=180.0).contains(&location.lng) {
            return Err(ApiError::validation("Longitude must be between -180 and 180"));
        }
        if !(0.0..=1.0).contains(&confidence) {
            return Err(ApiError::validation("Confidence must be between 0 and 1"));
        }
        if detection_type.is_empty()
            || !detection_type
                .chars()
                .all(|c| c.is_ascii_lowercase() || c == '_')
        {
            return Err(ApiError::validation("Invalid detection type"));
        }

        Ok(Self {
            location,
            detection_type,
            confidence,
        })
    }
}

/// Fixed-width UTC timestamp, so string order is time order.
fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Run one alert through its lifecycle.
pub async fn trigger_alert(
    store: &dyn DocumentStore,
    mailer: &dyn Mailer,
    user_id: &str,
    input: AlertInput,
) -> Result<SimulateAlertResponse, ApiError> {
    let alert = Alert {
        alert_id: Uuid::new_v4().to_string(),
        user_id: user_id.to_string(),
        location: input.location,
        detection_type: input.detection_type,
        confidence: input.confidence,
        timestamp: now_timestamp(),
        delivery_method: DELIVERY_METHOD.to_string(),
        status: AlertStatus::Processing,
        guardians_notified: 0,
    };

    store.insert(Collection::Alerts, to_document(&alert)?).await?;
    tracing::info!(
        user_id = %user_id,
        alert_id = %alert.alert_id,
        detection_type = %alert.detection_type,
        confidence = alert.confidence,
        "Alert recorded"
    );

    let guardians = find_guardians(store, user_id).await?;
    let context = AlertContext {
        detection_type: alert.detection_type.clone(),
        location: alert.location,
        timestamp: alert.timestamp.clone(),
    };
    let summary = notify_all(mailer, &guardians, &context).await;

    let mut resolved = Document::new();
    resolved.insert("status".to_string(), Value::from(summary.status.as_str()));
    resolved.insert(
        "guardiansNotified".to_string(),
        Value::from(summary.notified),
    );
    let filter = Filter::owner(user_id).eq("alertId", alert.alert_id.as_str());
    let matched = store
        .update(Collection::Alerts, &filter, resolved, false)
        .await?;
    if matched == 0 {
        tracing::error!(alert_id = %alert.alert_id, "Alert disappeared before resolution");
    }

    tracing::info!(
        user_id = %user_id,
        alert_id = %alert.alert_id,
        status = summary.status.as_str(),
        notified = summary.notified,
        total = summary.total,
        "Alert resolved"
    );

    Ok(SimulateAlertResponse {
        alert_id: alert.alert_id,
        timestamp: alert.timestamp,
        delivery_method: alert.delivery_method,
        status: summary.status,
        guardians_notified: summary.notified,
        message: "Silent alert triggered successfully".to_string(),
    })
}

/// `POST /alert/simulate`. The caller has already passed the rate limiter.
pub async fn simulate(
    store: &dyn DocumentStore,
    mailer: &dyn Mailer,
    user_id: &str,
    body: &[u8],
) -> Result<Response<Body>, ApiError> {
    let req: SimulateAlertRequest = response::parse_body(body)?;
    let input = AlertInput::try_from(req)?;
    let result = trigger_alert(store, mailer, user_id, input).await?;
    response::json(StatusCode::OK, &result)
}

/// The user's alerts, newest first.
pub async fn find_history(
    store: &dyn DocumentStore,
    user_id: &str,
) -> Result<Vec<Alert>, ApiError> {
    store
        .find(
            Collection::Alerts,
            &Filter::owner(user_id),
            FindOptions::newest_first("timestamp", HISTORY_LIMIT),
        )
        .await?
        .into_iter()
        .map(|doc| from_document(doc).map_err(ApiError::from))
        .collect()
}

pub async fn history(
    store: &dyn DocumentStore,
    user_id: &str,
) -> Result<Response<Body>, ApiError> {
    let alerts = find_history(store, user_id).await?;
    response::json(StatusCode::OK, &serde_json::json!({ "alerts": alerts }))
}

/// `POST /alert/evidence`: presigned upload URL for an alert the caller owns.
pub async fn evidence_upload_url(
    store: &dyn DocumentStore,
    evidence: &dyn EvidenceStore,
    user_id: &str,
    body: &[u8],
) -> Result<Response<Body>, ApiError> {
    let req: EvidenceUploadRequest = response::parse_body(body)?;
    let alert_id = req.alert_id.trim();
    if alert_id.is_empty() {
        return Err(ApiError::validation("alertId is required"));
    }

    let extension = req
        .extension
        .as_deref()
        .map(str::trim)
        .unwrap_or(DEFAULT_EXTENSION);
    if extension.is_empty()
        || extension.len() > 8
        || !extension.chars().all(|c| c.is_ascii_alphanumeric())
    {
        return Err(ApiError::validation("Invalid file extension"));
    }

    let filter = Filter::owner(user_id).eq("alertId", alert_id);
    if store.find_one(Collection::Alerts, &filter).await?.is_none() {
        return Err(ApiError::NotFound("Alert not found".to_string()));
    }

    let key = evidence_key(user_id, alert_id, extension);
    let upload_url = evidence
        .presign_upload(&key, content_type_for(extension), EVIDENCE_URL_TTL)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    tracing::info!(user_id = %user_id, alert_id = %alert_id, key = %key, "Evidence upload URL issued");

    response::json(
        StatusCode::OK,
        &EvidenceUploadResponse {
            upload_url,
            object_key: key,
            expires_in: EVIDENCE_URL_TTL.as_secs(),
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::email::{EmailMessage, SendOutcome};
    use crate::notify::test_support::RecordingMailer;
    use crate::s3::test_support::FakeEvidenceStore;
    use crate::store::MemoryStore;
    use crate::types::Guardian;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    async fn add_guardian(store: &MemoryStore, user_id: &str, id: &str) {
        let guardian = Guardian {
            id: id.to_string(),
            user_id: user_id.to_string(),
            name: id.to_string(),
            email: format!("{}@example.com", id),
            phone: String::new(),
            relationship: String::new(),
        };
        store
            .insert(Collection::Guardians, to_document(&guardian).unwrap())
            .await
            .unwrap();
    }

    fn input() -> AlertInput {
        AlertInput::try_from(SimulateAlertRequest::default()).unwrap()
    }

    #[test]
    fn test_simulate_defaults() {
        let input = input();
        assert_eq!(input.location, Location { lat: 0.0, lng: 0.0 });
        assert_eq!(input.detection_type, DEFAULT_DETECTION_TYPE);
        assert_eq!(input.confidence, 0.0);
    }

    #[test]
    fn test_simulate_rejects_out_of_range_values() {
        let bad = [
            r#"{"location": {"lat": 91, "lng": 0}}"#,
            r#"{"location": {"lat": 0, "lng": -181}}"#,
            r#"{"confidence": 1.5}"#,
            r#"{"detectionType": "Scream!"}"#,
            r#"{"detectionType": ""}"#,
        ];
        for body in bad {
            let req: SimulateAlertRequest = response::parse_body(body.as_bytes()).unwrap();
            assert!(AlertInput::try_from(req).is_err(), "{}", body);
        }
    }

    #[tokio::test]
    async fn test_alert_resolves_to_fan_out_status() {
        let store = MemoryStore::new();
        for id in ["g0", "g1", "g2"] {
            add_guardian(&store, "alice", id).await;
        }
        let mailer = RecordingMailer::failing(&["g0@example.com", "g2@example.com"]);

        let result = trigger_alert(&store, &mailer, "alice", input()).await.unwrap();
        assert_eq!(result.status, AlertStatus::Partial);
        assert_eq!(result.guardians_notified, 1);
        assert_eq!(result.delivery_method, "email");

        let history = find_history(&store, "alice").await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].alert_id, result.alert_id);
        assert_eq!(history[0].status, AlertStatus::Partial);
        assert_eq!(history[0].guardians_notified, 1);
    }

    #[tokio::test]
    async fn test_alert_without_guardians() {
        let store = MemoryStore::new();
        let mailer = RecordingMailer::default();
        let result = trigger_alert(&store, &mailer, "alice", input()).await.unwrap();
        assert_eq!(result.status, AlertStatus::NoGuardians);
        assert_eq!(result.guardians_notified, 0);
        assert!(mailer.attempts().is_empty());
    }

    /// Looks the alert up in the store at every send.
    struct ObservingMailer {
        store: Arc<MemoryStore>,
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Mailer for ObservingMailer {
        async fn send(&self, _message: &EmailMessage) -> SendOutcome {
            let alerts = self
                .store
                .find(Collection::Alerts, &Filter::owner("alice"), FindOptions::default())
                .await
                .unwrap();
            for alert in alerts {
                self.seen
                    .lock()
                    .unwrap()
                    .push(alert["status"].as_str().unwrap().to_string());
            }
            SendOutcome::Delivered {
                message_id: "m".to_string(),
            }
        }
    }

    #[tokio::test]
    async fn test_alert_is_processing_while_notifying() {
        let store = Arc::new(MemoryStore::new());
        add_guardian(&store, "alice", "g0").await;
        add_guardian(&store, "alice", "g1").await;
        let mailer = ObservingMailer {
            store: store.clone(),
            seen: Mutex::new(Vec::new()),
        };

        let result = trigger_alert(store.as_ref(), &mailer, "alice", input())
            .await
            .unwrap();

        assert_eq!(*mailer.seen.lock().unwrap(), vec!["processing", "processing"]);
        assert_eq!(result.status, AlertStatus::Delivered);
        let history = find_history(store.as_ref(), "alice").await.unwrap();
        assert!(history[0].status.is_terminal());
    }

    #[tokio::test]
    async fn test_history_is_capped_and_newest_first() {
        let store = MemoryStore::new();
        for i in 0..55 {
            let alert = Alert {
                alert_id: format!("a{}", i),
                user_id: "alice".to_string(),
                location: Location::default(),
                detection_type: DEFAULT_DETECTION_TYPE.to_string(),
                confidence: 0.5,
                timestamp: format!("2026-10-{:02}T{:02}:00:00.000Z", 1 + i / 24, i % 24),
                delivery_method: DELIVERY_METHOD.to_string(),
                status: AlertStatus::Delivered,
                guardians_notified: 1,
            };
            store
                .insert(Collection::Alerts, to_document(&alert).unwrap())
                .await
                .unwrap();
        }

        let history = find_history(&store, "alice").await.unwrap();
        assert_eq!(history.len(), HISTORY_LIMIT);
        assert_eq!(history[0].alert_id, "a54");
        assert!(history
            .windows(2)
            .all(|pair| pair[0].timestamp > pair[1].timestamp));
        assert!(find_history(&store, "bob").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_evidence_url_for_owned_alert_only() {
        let store = MemoryStore::new();
        let evidence = FakeEvidenceStore::ready();
        let result = trigger_alert(&store, &RecordingMailer::default(), "alice", input())
            .await
            .unwrap();

        let body = serde_json::json!({"alertId": result.alert_id, "extension": "wav"}).to_string();
        let resp = evidence_upload_url(&store, &evidence, "alice", body.as_bytes())
            .await
            .unwrap();
        let json: Value = serde_json::from_slice(resp.body()).unwrap();
        let key = format!("evidence/alice/{}.wav", result.alert_id);
        assert_eq!(json["objectKey"], key.as_str());
        assert_eq!(json["expiresIn"], 300);
        assert_eq!(
            evidence.presigned.lock().unwrap()[0],
            (key, "audio/wav".to_string(), EVIDENCE_URL_TTL)
        );

        let err = evidence_upload_url(&store, &evidence, "bob", body.as_bytes())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));

        let body = serde_json::json!({"alertId": result.alert_id, "extension": "../x"}).to_string();
        let err = evidence_upload_url(&store, &evidence, "alice", body.as_bytes())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }
}
