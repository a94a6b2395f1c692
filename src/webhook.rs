use std::path::Path;

use anyhow::anyhow;
use axum::{
    body::Bytes,
    debug_handler,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
    Router,
};
use tower_http::services::ServeDir;
use tracing::debug;

use crate::{dispatch, messenger::Update, AppError, AppResult, AppState};

pub const SECRET_HEADER: &str = "x-telegram-bot-api-secret-token";

pub fn router(media_dir: &Path) -> Router<AppState> {
    Router::new()
        .route("/webhook", post(webhook))
        .nest_service("/media", ServeDir::new(media_dir))
}

/// Handles one update to completion; handler failures never surface as HTTP errors.
#[debug_handler]
async fn webhook(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> AppResult<StatusCode> {
    if let Some(secret) = &state.config.webhook_secret {
        let given = headers.get(SECRET_HEADER).and_then(|v| v.to_str().ok());
        if given != Some(secret.as_str()) {
            return Err(AppError::new(StatusCode::UNAUTHORIZED, anyhow!("webhook secret mismatch")));
        }
    }

    let update: Update = serde_json::from_slice(&body).map_err(AppError::bad_request)?;
    let update_id = update.update_id;
    match update.into_event() {
        Some(event) => dispatch::dispatch(&state, event).await,
        None => debug!(update_id, "update ignored"),
    }
    Ok(StatusCode::OK)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{body::Body, http::Request};
    use serde_json::json;
    use tower::ServiceExt;

    use super::*;
    use crate::testing;

    fn post_update(body: String, secret: Option<&str>) -> Request<Body> {
        let mut req = Request::post("/webhook").header("content-type", "application/json");
        if let Some(secret) = secret {
            req = req.header(SECRET_HEADER, secret);
        }
        req.body(Body::from(body)).unwrap()
    }

    fn start_update() -> String {
        json!({
            "update_id": 1,
            "message": {
                "message_id": 5,
                "from": { "id": 77, "username": "kim" },
                "chat": { "id": 77 },
                "text": "/start"
            }
        })
        .to_string()
    }

    #[tokio::test]
    async fn update_is_dispatched() {
        let h = testing::harness().await;
        let dir = tempfile::tempdir().unwrap();
        let app = router(dir.path()).with_state(h.state.clone());

        let res = app.oneshot(post_update(start_update(), None)).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert!(h.messenger.last_text_to(77).starts_with("Welcome!"));
        assert!(h.state.repos.users.by_external_id(77).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn bad_body_and_wrong_secret_are_rejected() {
        let mut h = testing::harness().await;
        let mut config = testing::test_config();
        config.webhook_secret = Some("s3cret".to_owned());
        h.state.config = Arc::new(config);
        let dir = tempfile::tempdir().unwrap();
        let app = router(dir.path()).with_state(h.state.clone());

        let res = app.clone().oneshot(post_update(start_update(), Some("nope"))).await.unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

        let res = app.clone().oneshot(post_update("{".to_owned(), Some("s3cret"))).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);

        let res = app.oneshot(post_update(start_update(), Some("s3cret"))).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(h.messenger.texts_to(77).len(), 1);
    }
}
