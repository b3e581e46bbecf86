use serde::{Deserialize, Serialize};

// ========== LOCATION ==========
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Default)]
pub struct Location {
    pub lat: f64,
    pub lng: f64,
}

// ========== PROFILE ==========
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub home_location: Option<String>,
}

impl Profile {
    /// Shell returned when the user has never saved a profile.
    pub fn empty(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            name: None,
            phone: None,
            home_location: None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub home_location: Option<String>,
}

// ========== GUARDIAN ==========
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Guardian {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub relationship: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateGuardianRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub relationship: Option<String>,
}

// ========== ALERT ==========
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    Processing,
    Delivered,
    Partial,
    Failed,
    NoGuardians,
}

impl AlertStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, AlertStatus::Processing)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AlertStatus::Processing => "processing",
            AlertStatus::Delivered => "delivered",
            AlertStatus::Partial => "partial",
            AlertStatus::Failed => "failed",
            AlertStatus::NoGuardians => "no_guardians",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub alert_id: String,
    pub user_id: String,
    pub location: Location,
    pub detection_type: String,
    pub confidence: f64,
    /// RFC 3339 UTC
    pub timestamp: String,
    pub delivery_method: String,
    pub status: AlertStatus,
    pub guardians_notified: u32,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SimulateAlertRequest {
    pub location: Option<Location>,
    pub detection_type: Option<String>,
    pub confidence: Option<f64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulateAlertResponse {
    pub alert_id: String,
    pub timestamp: String,
    pub delivery_method: String,
    pub status: AlertStatus,
    pub guardians_notified: u32,
    pub message: String,
}

// ========== EVIDENCE ==========
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceUploadRequest {
    pub alert_id: String,
    pub extension: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceUploadResponse {
    pub upload_url: String,
    pub object_key: String,
    pub expires_in: u64,
}

// ========== HEALTH ==========
#[derive(Debug, Serialize)]
pub struct ServiceStatus {
    pub api: String,
    /// Reported under the `mongodb` key.
    #[serde(rename = "mongodb")]
    pub document_store: String,
    pub s3: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub services: ServiceStatus,
    pub version: String,
}
