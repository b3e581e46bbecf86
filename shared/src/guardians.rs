use crate::error::ApiError;
use crate::response;
use crate::store::{
    from_document, to_document, Collection, Document, DocumentStore, Filter, FindOptions,
    StoreError,
};
use crate::types::{CreateGuardianRequest, Guardian};
use lambda_http::http::StatusCode;
use lambda_http::{Body, Response};
use serde_json::{Map, Value};
use uuid::Uuid;

pub const MAX_GUARDIANS: u64 = 3;

/// Fields a guardian update may touch.
const UPDATABLE_FIELDS: [&str; 4] = ["name", "email", "phone", "relationship"];

/// All guardians registered by the user.
pub async fn find_guardians(
    store: &dyn DocumentStore,
    user_id: &str,
) -> Result<Vec<Guardian>, ApiError> {
    store
        .find(Collection::Guardians, &Filter::owner(user_id), FindOptions::default())
        .await?
        .into_iter()
        .map(|doc| from_document(doc).map_err(ApiError::from))
        .collect()
}

pub async fn list_guardians(
    store: &dyn DocumentStore,
    user_id: &str,
) -> Result<Response<Body>, ApiError> {
    let guardians = find_guardians(store, user_id).await?;
    response::json(StatusCode::OK, &serde_json::json!({ "guardians": guardians }))
}

fn cap_reached() -> ApiError {
    ApiError::validation(format!("Maximum {} guardians allowed", MAX_GUARDIANS))
}

/// Create a guardian. The early count gives the cap error before body
/// validation; the insert itself enforces the cap atomically.
pub async fn create_guardian(
    store: &dyn DocumentStore,
    user_id: &str,
    body: &[u8],
) -> Result<Response<Body>, ApiError> {
    let existing = store
        .count(Collection::Guardians, &Filter::owner(user_id))
        .await?;
    if existing >= MAX_GUARDIANS {
        return Err(cap_reached());
    }

    let req: CreateGuardianRequest = response::parse_body(body)?;
    let trimmed = |value: Option<String>| value.map(|v| v.trim().to_string()).unwrap_or_default();
    let name = trimmed(req.name);
    let email = trimmed(req.email);

    if name.is_empty() || email.is_empty() {
        return Err(ApiError::validation("Name and email are required"));
    }
    if !is_plausible_email(&email) {
        return Err(ApiError::validation("Invalid email address"));
    }

    let guardian = Guardian {
        id: Uuid::new_v4().to_string(),
        user_id: user_id.to_string(),
        name,
        email,
        phone: trimmed(req.phone),
        relationship: trimmed(req.relationship),
    };

    match store
        .insert_capped(Collection::Guardians, to_document(&guardian)?, MAX_GUARDIANS)
        .await
    {
        Ok(()) => {}
        Err(StoreError::LimitReached(_)) => return Err(cap_reached()),
        Err(e) => return Err(e.into()),
    }

    tracing::info!(user_id = %user_id, guardian_id = %guardian.id, "Guardian added");

    response::json(
        StatusCode::CREATED,
        &serde_json::json!({ "message": "Guardian added", "guardian": guardian }),
    )
}

/// Partial update restricted to the whitelisted string fields.
pub async fn update_guardian(
    store: &dyn DocumentStore,
    user_id: &str,
    guardian_id: &str,
    body: &[u8],
) -> Result<Response<Body>, ApiError> {
    let fields: Map<String, Value> = response::parse_body(body)?;

    let mut update = Document::new();
    for (key, value) in fields {
        if let (true, Value::String(s)) = (UPDATABLE_FIELDS.contains(&key.as_str()), value) {
            update.insert(key, Value::String(s.trim().to_string()));
        }
    }

    if update.is_empty() {
        return Err(ApiError::validation("No valid fields to update"));
    }
    if matches!(update.get("name"), Some(Value::String(name)) if name.is_empty()) {
        return Err(ApiError::validation("Name cannot be empty"));
    }
    if let Some(Value::String(email)) = update.get("email") {
        if !is_plausible_email(email) {
            return Err(ApiError::validation("Invalid email address"));
        }
    }

    let filter = Filter::owner(user_id).eq("id", guardian_id);
    let matched = store
        .update(Collection::Guardians, &filter, update, false)
        .await?;
    if matched == 0 {
        return Err(ApiError::NotFound("Guardian not found".to_string()));
    }

    tracing::info!(user_id = %user_id, guardian_id = %guardian_id, "Guardian updated");
    Ok(response::message(StatusCode::OK, "Guardian updated"))
}

pub async fn delete_guardian(
    store: &dyn DocumentStore,
    user_id: &str,
    guardian_id: &str,
) -> Result<Response<Body>, ApiError> {
    let filter = Filter::owner(user_id).eq("id", guardian_id);
    let deleted = store.delete(Collection::Guardians, &filter).await?;
    if deleted == 0 {
        return Err(ApiError::NotFound("Guardian not found".to_string()));
    }

    tracing::info!(user_id = %user_id, guardian_id = %guardian_id, "Guardian deleted");
    Ok(response::message(StatusCode::OK, "Guardian deleted"))
}

fn is_plausible_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && !domain.is_empty() && !email.contains(char::is_whitespace),
        None => false,
    }
}
