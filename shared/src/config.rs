//! Runtime configuration loaded from the Lambda environment.

use std::env;

/// Which document store backend the process talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    DynamoDb,
    Memory,
}

/// Configuration read once at cold start.
#[derive(Debug, Clone)]
pub struct Config {
    /// Region of the Cognito user pool
    pub cognito_region: String,
    pub cognito_user_pool_id: String,
    /// App client id; tokens must carry it as their audience
    pub cognito_client_id: String,
    /// DynamoDB table holding users, guardians and alerts
    pub table_name: String,
    /// Verified SES identity used as the alert sender
    pub ses_sender_email: String,
    pub evidence_bucket: String,
    pub store_backend: StoreBackend,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let store_backend = match env::var("DOCUMENT_STORE").as_deref() {
            Err(_) | Ok("dynamodb") => StoreBackend::DynamoDb,
            Ok("memory") => StoreBackend::Memory,
            Ok(other) => {
                return Err(ConfigError::Invalid {
                    name: "DOCUMENT_STORE",
                    value: other.to_string(),
                })
            }
        };

        Ok(Self {
            cognito_region: env::var("COGNITO_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
            cognito_user_pool_id: required("COGNITO_USER_POOL_ID")?,
            cognito_client_id: required("COGNITO_CLIENT_ID")?,
            table_name: env::var("TABLE_NAME").unwrap_or_else(|_| "rakshak".to_string()),
            ses_sender_email: env::var("SES_SENDER_EMAIL")
                .unwrap_or_else(|_| "alerts@rakshak.ai".to_string()),
            evidence_bucket: env::var("S3_EVIDENCE_BUCKET")
                .unwrap_or_else(|_| "rakshak-evidence".to_string()),
            store_backend,
        })
    }

    /// Fixed configuration for tests.
    pub fn test_default() -> Self {
        Self {
            cognito_region: "us-east-1".to_string(),
            cognito_user_pool_id: "us-east-1_TestPool".to_string(),
            cognito_client_id: "test-client-id".to_string(),
            table_name: "rakshak-test".to_string(),
            ses_sender_email: "alerts@example.com".to_string(),
            evidence_bucket: "rakshak-evidence-test".to_string(),
            store_backend: StoreBackend::Memory,
        }
    }

    /// Token issuer: the user pool URL.
    pub fn issuer(&self) -> String {
        format!(
            "https://cognito-idp.{}.amazonaws.com/{}",
            self.cognito_region, self.cognito_user_pool_id
        )
    }

    pub fn jwks_url(&self) -> String {
        format!("{}/.well-known/jwks.json", self.issuer())
    }
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    env::var(name)
        .map(|v| v.trim().to_string())
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::Missing(name))
}
