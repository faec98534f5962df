use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{header, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use courier_shared::constants::PROTOCOL_VERSION;
use courier_shared::UserId;
use courier_store::{Message, NewMessage};

use crate::auth::AuthUser;
use crate::conversations::ConversationIndex;
use crate::coordinator::DeliveryCoordinator;
use crate::error::ServerError;
use crate::file_store::FileStore;
use crate::ws::ws_handler;

/// Room for multipart framing on top of the largest accepted file.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<DeliveryCoordinator>,
    pub conversations: ConversationIndex,
    pub file_store: Arc<FileStore>,
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    let body_limit = state.file_store.max_size() + MULTIPART_OVERHEAD;

    Router::new()
        .route("/health", get(health_check))
        .route("/api/messages", post(send_message))
        .route("/api/messages/:user_id", get(get_messages))
        .route("/api/upload", post(upload_file))
        .route("/api/conversations", get(list_conversations))
        .route("/uploads/:name", get(download_upload))
        .route("/ws", get(ws_handler))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    protocol: &'static str,
    connections: usize,
}

#[derive(Deserialize)]
struct SendMessageRequest {
    #[serde(default)]
    receiver_id: String,
    #[serde(default)]
    content: String,
}

fn parse_user(raw: &str, field: &str) -> Result<UserId, ServerError> {
    UserId::new(raw).ok_or_else(|| ServerError::BadRequest(format!("Missing {field}")))
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        protocol: PROTOCOL_VERSION,
        connections: state.coordinator.registry().connection_count(),
    })
}

/// POST /api/messages
async fn send_message(
    State(state): State<AppState>,
    AuthUser(sender): AuthUser,
    Json(req): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<Message>), ServerError> {
    let receiver = parse_user(&req.receiver_id, "receiver_id")?;
    if req.content.is_empty() {
        return Err(ServerError::BadRequest("Missing content".to_string()));
    }

    let stored = state
        .coordinator
        .send(NewMessage::text(sender, receiver, req.content))
        .await?;

    Ok((StatusCode::CREATED, Json(stored)))
}

/// GET /api/messages/:user_id
async fn get_messages(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    Path(other): Path<String>,
) -> Result<Json<Vec<Message>>, ServerError> {
    let other = parse_user(&other, "user_id")?;
    let messages = state.coordinator.history(&caller, &other).await?;
    Ok(Json(messages))
}

/// POST /api/upload (multipart: `receiver_id`, `file`)
async fn upload_file(
    State(state): State<AppState>,
    AuthUser(sender): AuthUser,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<Message>), ServerError> {
    let mut receiver_id = None;
    let mut file = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServerError::BadRequest(format!("Multipart error: {}", e)))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "receiver_id" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ServerError::BadRequest(format!("Failed to read field: {}", e)))?;
                receiver_id = Some(text);
            }
            "file" => {
                let file_name = field.file_name().map(str::to_string);
                let content_type = field.content_type().map(str::to_string);
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ServerError::BadRequest(format!("Failed to read field: {}", e)))?;
                file = Some((file_name, content_type, data));
            }
            _ => {}
        }
    }

    let receiver = parse_user(receiver_id.as_deref().unwrap_or(""), "receiver_id")?;
    let (file_name, content_type, data) = file.ok_or_else(|| {
        ServerError::BadRequest("Missing 'file' field in multipart form".to_string())
    })?;

    let file_ref = state
        .file_store
        .store_file(file_name.as_deref(), content_type.as_deref(), &data)
        .await?;

    info!(
        sender = %sender,
        receiver = %receiver,
        url = %file_ref.url,
        size = data.len(),
        "File uploaded"
    );

    let stored = state
        .coordinator
        .send(NewMessage::file(sender, receiver, file_ref))
        .await?;

    Ok((StatusCode::CREATED, Json(stored)))
}

/// GET /api/conversations
async fn list_conversations(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
) -> Result<Json<Vec<UserId>>, ServerError> {
    let participants = state.conversations.list_conversations(&caller).await?;
    Ok(Json(participants.into_iter().collect()))
}

/// GET /uploads/:name
async fn download_upload(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, ServerError> {
    let upload = state.file_store.read_file(&name).await?;
    Ok(([(header::CONTENT_TYPE, upload.content_type)], upload.data))
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tempfile::TempDir;
    use tower::ServiceExt;

    use courier_store::SqliteStore;

    use super::*;
    use crate::auth::USER_ID_HEADER;
    use crate::registry::{ConnectionRegistry, Outgoing};

    async fn test_state() -> (AppState, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let coordinator = Arc::new(DeliveryCoordinator::new(
            Arc::clone(&store),
            Arc::new(ConnectionRegistry::new()),
        ));
        let file_store = Arc::new(
            FileStore::new(dir.path().join("uploads"), 1024)
                .await
                .unwrap(),
        );
        let state = AppState {
            coordinator,
            conversations: ConversationIndex::new(store),
            file_store,
        };
        (state, dir)
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post_json(uri: &str, user: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(USER_ID_HEADER, user)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_as(uri: &str, user: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .header(USER_ID_HEADER, user)
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let (state, _dir) = test_state().await;
        let response = build_router(state)
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["status"], "ok");
        assert_eq!(json["connections"], 0);
    }

    #[tokio::test]
    async fn test_api_requires_identity() {
        let (state, _dir) = test_state().await;
        let response = build_router(state)
            .oneshot(
                Request::builder()
                    .uri("/api/conversations")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_send_then_fetch_and_list() {
        let (state, _dir) = test_state().await;
        let app = build_router(state);

        for (from, to, content) in [("alice", "bob", "hi"), ("bob", "alice", "hey")] {
            let response = app
                .clone()
                .oneshot(post_json(
                    "/api/messages",
                    from,
                    serde_json::json!({ "receiver_id": to, "content": content }),
                ))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::CREATED);
            let json = body_json(response).await;
            assert_eq!(json["sender_id"], from);
            assert_eq!(json["file_type"], "text");
        }

        let ab = body_json(
            app.clone()
                .oneshot(get_as("/api/messages/bob", "alice"))
                .await
                .unwrap(),
        )
        .await;
        let ba = body_json(
            app.clone()
                .oneshot(get_as("/api/messages/alice", "bob"))
                .await
                .unwrap(),
        )
        .await;
        assert_eq!(ab, ba);
        assert_eq!(ab[0]["content"], "hi");
        assert_eq!(ab[1]["content"], "hey");

        let conversations = body_json(
            app.oneshot(get_as("/api/conversations", "alice"))
                .await
                .unwrap(),
        )
        .await;
        assert_eq!(conversations, serde_json::json!(["bob"]));
    }

    #[tokio::test]
    async fn test_send_rejects_empty_content() {
        let (state, _dir) = test_state().await;
        let response = build_router(state)
            .oneshot(post_json(
                "/api/messages",
                "alice",
                serde_json::json!({ "receiver_id": "bob" }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_send_without_receiver_is_json_bad_request() {
        let (state, _dir) = test_state().await;
        let response = build_router(state)
            .oneshot(post_json(
                "/api/messages",
                "alice",
                serde_json::json!({ "content": "hi" }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(json["error"], "Invalid request: Missing receiver_id");
    }

    #[tokio::test]
    async fn test_direct_send_is_pushed() {
        let (state, _dir) = test_state().await;
        let (_conn, mut rx) = state.coordinator.attach(UserId::new("bob").unwrap());

        let response = build_router(state)
            .oneshot(post_json(
                "/api/messages",
                "alice",
                serde_json::json!({ "receiver_id": "bob", "content": "hi" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let Outgoing::Message(pushed) = rx.try_recv().unwrap() else {
            panic!("expected a message frame");
        };
        assert_eq!(pushed.content.as_deref(), Some("hi"));
    }

    #[tokio::test]
    async fn test_upload_and_download() {
        let (state, _dir) = test_state().await;
        let app = build_router(state);

        let boundary = "courier-boundary";
        let body = format!(
            "--{b}\r\n\
             Content-Disposition: form-data; name=\"receiver_id\"\r\n\r\n\
             bob\r\n\
             --{b}\r\n\
             Content-Disposition: form-data; name=\"file\"; filename=\"cat.png\"\r\n\
             Content-Type: image/png\r\n\r\n\
             meow\r\n\
             --{b}--\r\n",
            b = boundary
        );
        let request = Request::builder()
            .method("POST")
            .uri("/api/upload")
            .header(USER_ID_HEADER, "alice")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(Body::from(body))
            .unwrap();

        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let json = body_json(response).await;
        assert_eq!(json["file_type"], "image");
        assert_eq!(json["file_name"], "cat.png");
        assert!(json["content"].is_null());

        let url = json["file_url"].as_str().unwrap().to_string();
        let response = app
            .oneshot(Request::builder().uri(&url).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], b"meow");
    }

    #[tokio::test]
    async fn test_missing_upload_is_not_found() {
        let (state, _dir) = test_state().await;
        let response = build_router(state)
            .oneshot(
                Request::builder()
                    .uri("/uploads/does-not-exist")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
