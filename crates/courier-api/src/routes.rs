use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post},
};
use tracing::error;

use courier_types::StoreError;
use courier_types::api::{LoginRequest, LoginResponse, RegisterRequest, SearchQuery, SendMessageRequest};

use crate::assets::AssetBackend;
use crate::error::{ApiError, ApiJson};
use crate::middleware::require_auth;
use crate::{ChatListAggregator, IdentityStore, MessageStore};

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub identity: IdentityStore<AssetBackend>,
    pub messages: MessageStore,
    pub chat_list: ChatListAggregator,
}

/// All `/api` routes. Everything except register and login needs a session
/// token.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/api/register", post(register))
        .route("/api/login", post(login));

    let protected_routes = Router::new()
        .route("/api/send-message", post(send_message))
        .route("/api/messages/{sender_id}/{receiver_id}", get(get_messages))
        .route("/api/users", get(list_users))
        .route("/api/users/search", get(search_users))
        .route("/api/users/{user_id}", get(get_user))
        .route("/api/users/{user_id}/profile", get(get_profile))
        .route("/api/users/{user_id}/chat-list", get(get_chat_list))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}

/// Run blocking store work off the async runtime.
async fn blocking<T, F>(state: &AppState, f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&AppStateInner) -> Result<T, StoreError> + Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            StoreError::Storage(anyhow::anyhow!("blocking task failed: {}", e))
        })?
        .map_err(ApiError::from)
}

pub async fn register(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state
        .identity
        .register(&req.name, &req.email, &req.password, req.profile_pic.as_deref())
        .await?;
    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn login(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state.identity.authenticate(&req.email, &req.password).await?;
    Ok(Json(LoginResponse {
        token: session.token,
        expires_at: session.expires_at,
    }))
}

pub async fn send_message(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let message = blocking(&state, move |s| {
        s.messages.send(&req.sender_id, &req.receiver_id, &req.content)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(message)))
}

pub async fn get_messages(
    State(state): State<AppState>,
    Path((sender_id, receiver_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let messages = blocking(&state, move |s| s.messages.get_conversation(&sender_id, &receiver_id)).await?;
    Ok(Json(messages))
}

pub async fn list_users(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let users = blocking(&state, |s| s.identity.list_all()).await?;
    Ok(Json(users))
}

pub async fn search_users(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let users = blocking(&state, move |s| s.identity.search(&query.query)).await?;
    Ok(Json(users))
}

pub async fn get_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let user = blocking(&state, move |s| s.identity.get_by_id(&user_id)).await?;
    Ok(Json(user))
}

pub async fn get_profile(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let profile = blocking(&state, move |s| s.identity.get_profile(&user_id)).await?;
    Ok(Json(profile))
}

pub async fn get_chat_list(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let peers = blocking(&state, move |s| s.chat_list.get_chat_list(&user_id)).await?;
    Ok(Json(peers))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, header};
    use chrono::Duration;
    use courier_db::Database;
    use courier_types::api::ErrorResponse;
    use courier_types::{Message, User, UserId, UserProfile};
    use serde::de::DeserializeOwned;
    use serde_json::json;
    use tower::ServiceExt;

    use crate::TokenIssuer;
    use crate::assets::DiskAssetHost;

    async fn app(asset_dir: &std::path::Path) -> Router {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let assets = DiskAssetHost::new(asset_dir.to_path_buf(), "http://localhost:8080")
            .await
            .unwrap();
        let state = Arc::new(AppStateInner {
            identity: IdentityStore::new(
                db.clone(),
                Arc::new(AssetBackend::Disk(assets)),
                TokenIssuer::new("router-test-secret", Duration::hours(1)),
            ),
            messages: MessageStore::new(db.clone()),
            chat_list: ChatListAggregator::new(db),
        });
        router(state)
    }

    async fn call(
        app: &Router,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, Vec<u8>) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let body = match body {
            Some(json) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        let response = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, bytes.to_vec())
    }

    fn parse<T: DeserializeOwned>(bytes: &[u8]) -> T {
        serde_json::from_slice(bytes).unwrap()
    }

    async fn register(app: &Router, name: &str, email: &str, password: &str) -> User {
        let (status, body) = call(
            app,
            "POST",
            "/api/register",
            None,
            Some(json!({ "name": name, "email": email, "password": password })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        parse(&body)
    }

    async fn login(app: &Router, email: &str, password: &str) -> String {
        let (status, body) = call(
            app,
            "POST",
            "/api/login",
            None,
            Some(json!({ "email": email, "password": password })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        parse::<LoginResponse>(&body).token
    }

    #[tokio::test]
    async fn end_to_end_conversation() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path()).await;

        let alice = register(&app, "Alice", "a@x.com", "pw1").await;
        let bob = register(&app, "Bob", "b@x.com", "pw2").await;
        let token = login(&app, "a@x.com", "pw1").await;

        for (from, to, content) in [(&alice, &bob, "hi"), (&bob, &alice, "hey")] {
            let (status, _) = call(
                &app,
                "POST",
                "/api/send-message",
                Some(&token),
                Some(json!({ "sender_id": from.id, "receiver_id": to.id, "content": content })),
            )
            .await;
            assert_eq!(status, StatusCode::CREATED);
        }

        let (status, body) = call(
            &app,
            "GET",
            &format!("/api/messages/{}/{}", alice.id, bob.id),
            Some(&token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let conversation: Vec<Message> = parse(&body);
        let contents: Vec<&str> = conversation.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["hi", "hey"]);
        assert!(conversation[1].timestamp > conversation[0].timestamp);

        let (_, body) = call(
            &app,
            "GET",
            &format!("/api/users/{}/chat-list", alice.id),
            Some(&token),
            None,
        )
        .await;
        let peers: Vec<UserId> = parse(&body);
        assert_eq!(peers, vec![bob.id]);
    }

    #[tokio::test]
    async fn protected_routes_need_a_valid_token() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path()).await;

        let (status, _) = call(&app, "GET", "/api/users", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = call(&app, "GET", "/api/users", Some("garbage"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn errors_map_to_status_codes() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path()).await;
        register(&app, "Alice", "a@x.com", "pw1").await;
        let token = login(&app, "a@x.com", "pw1").await;

        let (status, body) = call(
            &app,
            "POST",
            "/api/register",
            None,
            Some(json!({ "name": "Again", "email": "a@x.com", "password": "pw" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(parse::<ErrorResponse>(&body).error, "Email already exists");

        let (status, _) = call(&app, "POST", "/api/register", None, Some(json!({ "name": "NoEmail" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (wrong_status, wrong_body) = call(
            &app,
            "POST",
            "/api/login",
            None,
            Some(json!({ "email": "a@x.com", "password": "bad" })),
        )
        .await;
        let (unknown_status, unknown_body) = call(
            &app,
            "POST",
            "/api/login",
            None,
            Some(json!({ "email": "nobody@x.com", "password": "pw1" })),
        )
        .await;
        assert_eq!(wrong_status, StatusCode::UNAUTHORIZED);
        assert_eq!(unknown_status, StatusCode::UNAUTHORIZED);
        assert_eq!(wrong_body, unknown_body);

        let missing = uuid::Uuid::new_v4();
        let (status, _) = call(&app, "GET", &format!("/api/users/{missing}"), Some(&token), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = call(&app, "GET", "/api/users/not-an-id/chat-list", Some(&token), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn malformed_bodies_are_json_validation_errors() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path()).await;

        let (status, body) = call(&app, "POST", "/api/register", None, Some(json!({ "name": 5 }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(parse::<ErrorResponse>(&body).error, "Invalid request body");

        for (content_type, raw) in [("application/json", "not json"), ("text/plain", "{}")] {
            let request = Request::builder()
                .method("POST")
                .uri("/api/login")
                .header(header::CONTENT_TYPE, content_type)
                .body(Body::from(raw))
                .unwrap();
            let response = app.clone().oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
            let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
            assert_eq!(parse::<ErrorResponse>(&bytes).error, "Invalid request body");
        }
    }

    #[tokio::test]
    async fn user_views_never_expose_password() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path()).await;
        let alice = register(&app, "Alice", "a@x.com", "pw1").await;
        register(&app, "Bob", "b@x.com", "pw2").await;
        let token = login(&app, "a@x.com", "pw1").await;

        let (_, body) = call(&app, "GET", "/api/users", Some(&token), None).await;
        let raw: serde_json::Value = parse(&body);
        assert_eq!(raw.as_array().unwrap().len(), 2);
        assert!(raw.as_array().unwrap().iter().all(|u| u.get("password").is_none()));

        let (_, body) = call(&app, "GET", "/api/users/search?query=ali", Some(&token), None).await;
        let found: Vec<User> = parse(&body);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, alice.id);

        let (status, body) = call(&app, "GET", &format!("/api/users/{}/profile", alice.id), Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        let raw: serde_json::Value = parse(&body);
        assert!(raw.get("password").is_none());
        let profile: UserProfile = parse(&body);
        assert_eq!(profile.email, "a@x.com");
    }
}
