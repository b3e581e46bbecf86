use crate::error::ApiError;
use crate::response;
use crate::store::{from_document, to_document, Collection, DocumentStore, Filter};
use crate::types::{Profile, UpdateProfileRequest};
use lambda_http::http::StatusCode;
use lambda_http::{Body, Response};

/// Get the caller's profile, or an empty shell if none was saved yet.
pub async fn get_profile(
    store: &dyn DocumentStore,
    user_id: &str,
) -> Result<Response<Body>, ApiError> {
    let profile = match store.find_one(Collection::Users, &Filter::owner(user_id)).await? {
        Some(doc) => from_document(doc)?,
        None => Profile::empty(user_id),
    };

    response::json(StatusCode::OK, &serde_json::json!({ "profile": profile }))
}

/// Upsert the caller's profile with the non-empty fields of the request.
pub async fn update_profile(
    store: &dyn DocumentStore,
    user_id: &str,
    body: &[u8],
) -> Result<Response<Body>, ApiError> {
    let req: UpdateProfileRequest = response::parse_body(body)?;

    let non_empty = |value: Option<String>| {
        value
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };
    let update = Profile {
        user_id: user_id.to_string(),
        name: non_empty(req.name),
        phone: non_empty(req.phone),
        home_location: non_empty(req.home_location),
    };

    if update.name.is_none() && update.phone.is_none() && update.home_location.is_none() {
        return Err(ApiError::validation("No valid fields to update"));
    }

    store
        .update(
            Collection::Users,
            &Filter::owner(user_id),
            to_document(&update)?,
            true,
        )
        .await?;

    tracing::info!(user_id = %user_id, "Profile updated");

    response::json(
        StatusCode::OK,
        &serde_json::json!({ "message": "Profile updated", "profile": update }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::Value;

    fn body_json(resp: &Response<Body>) -> Value {
        serde_json::from_slice(resp.body()).unwrap()
    }

    #[tokio::test]
    async fn test_get_profile_defaults_to_shell() {
        let store = MemoryStore::new();
        let resp = get_profile(&store, "alice").await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(&resp), serde_json::json!({"profile": {"userId": "alice"}}));
    }

    #[tokio::test]
    async fn test_update_profile_merges_fields() {
        let store = MemoryStore::new();
        update_profile(&store, "alice", br#"{"name": "Asha", "phone": "  "}"#)
            .await
            .unwrap();
        update_profile(&store, "alice", br#"{"homeLocation": "Indiranagar", "role": "admin"}"#)
            .await
            .unwrap();

        let resp = get_profile(&store, "alice").await.unwrap();
        assert_eq!(
            body_json(&resp)["profile"],
            serde_json::json!({"userId": "alice", "name": "Asha", "homeLocation": "Indiranagar"})
        );
    }

    #[tokio::test]
    async fn test_update_profile_requires_a_field() {
        let store = MemoryStore::new();
        let err = update_profile(&store, "alice", br#"{"name": ""}"#)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }
}
