use axum::{
    Router,
    http::StatusCode,
    routing::{get, post},
};
use bson::oid::ObjectId;

use crate::{App, error::AppError};

use super::{
    account::{get_community_butterflies, get_user_butterflies},
    comment::add_comment_handler,
    create::create_butterfly_handler,
    delete::delete_butterfly_handler,
    feed::get_feed,
    view::get_butterfly,
};

const MIN_TEXT_LENGTH: usize = 3;
const MAX_TEXT_LENGTH: usize = 5000;

pub fn route() -> Router<App> {
    Router::<App>::new()
        .route("/butterflies", get(get_feed).post(create_butterfly_handler))
        .route(
            "/butterflies/{id}",
            get(get_butterfly).delete(delete_butterfly_handler),
        )
        .route("/butterflies/{id}/comments", post(add_comment_handler))
        .route("/users/{id}/butterflies", get(get_user_butterflies))
        .route("/communities/{id}/butterflies", get(get_community_butterflies))
}

pub fn parse_id(id: &str) -> Result<ObjectId, AppError> {
    ObjectId::parse_str(id.trim())
        .map_err(|_| AppError::from((format!("Invalid id `{id}`"), StatusCode::BAD_REQUEST)))
}

/// The path to revalidate, `/` when none was given. Paths end up in the
/// revalidation event stream, so control characters are rejected.
pub fn validate_path(path: Option<&str>) -> Result<&str, AppError> {
    let path = path.unwrap_or("/");
    if path.chars().any(char::is_control) {
        return Err(("Invalid path", StatusCode::BAD_REQUEST).into());
    }
    Ok(path)
}

/// Trims `text` and checks its length. Whitespace does not count towards the
/// minimum.
pub fn validate_text(text: &str) -> Result<String, AppError> {
    let text = text.trim();

    if text.chars().filter(|c| !c.is_whitespace()).count() < MIN_TEXT_LENGTH {
        return Err(("Minimum 3 characters.", StatusCode::BAD_REQUEST).into());
    }

    if text.chars().count() > MAX_TEXT_LENGTH {
        return Err((
            "Content too long (max 5000 characters)",
            StatusCode::BAD_REQUEST,
        )
            .into());
    }

    Ok(text.to_string())
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use http_body_util::BodyExt;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use super::*;
    use crate::{
        butterfly::fixtures::{post, user},
        config::ServerConfig,
        revalidate::Revalidator,
        store::{ButterflyStore, InMemoryStore},
    };

    fn app(store: Arc<InMemoryStore>) -> Router {
        let state = App {
            store,
            revalidator: Arc::new(Revalidator::new()),
            config: Arc::new(ServerConfig::default()),
        };
        route().with_state(state)
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[test]
    fn test_validate_text() {
        assert_eq!(validate_text("  hello  ").unwrap(), "hello");
        assert!(validate_text("a b").is_err(), "Whitespace should not count");
        assert!(validate_text("abc").is_ok());
        assert!(validate_text(&"x".repeat(5001)).is_err());
    }

    #[test]
    fn test_validate_path() {
        assert_eq!(validate_path(None).unwrap(), "/");
        assert_eq!(validate_path(Some("/profile")).unwrap(), "/profile");
        assert!(validate_path(Some("/profile\rdata: /admin")).is_err());
        assert!(validate_path(Some("/a\nb")).is_err());
    }

    #[test]
    fn test_parse_id() {
        let id = ObjectId::new();
        assert_eq!(parse_id(&id.to_hex()).unwrap(), id);
        assert!(parse_id("not-an-id").is_err());
    }

    #[tokio::test]
    async fn test_create_comment_and_view() {
        let store = Arc::new(InMemoryStore::new());
        let alice = user("Alice");
        store.insert_user(alice.clone()).await;

        let (status, created) = send(
            app(store.clone()),
            json_request(
                "POST",
                "/butterflies",
                json!({ "text": "hello there", "author": alice.id.to_hex() }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let id = created["id"].as_str().unwrap().to_string();

        let (status, comment) = send(
            app(store.clone()),
            json_request(
                "POST",
                &format!("/butterflies/{id}/comments"),
                json!({ "text": "general kenobi", "author": alice.id.to_hex() }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(comment["parent_id"], json!(id));

        let (status, view) = send(
            app(store.clone()),
            Request::builder()
                .uri(format!("/butterflies/{id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(view["author"]["name"], json!("Alice"));
        assert_eq!(view["children"][0]["text"], json!("general kenobi"));
        assert_eq!(view["children"][0]["author"]["name"], json!("Alice"));
    }

    #[tokio::test]
    async fn test_short_text_is_rejected() {
        let store = Arc::new(InMemoryStore::new());
        let (status, body) = send(
            app(store.clone()),
            json_request(
                "POST",
                "/butterflies",
                json!({ "text": "  hi ", "author": ObjectId::new().to_hex() }),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["msg"], json!("Minimum 3 characters."));
        assert_eq!(store.butterfly_count().await, 0);
    }

    #[tokio::test]
    async fn test_delete_then_not_found() {
        let store = Arc::new(InMemoryStore::new());
        let alice = user("Alice");
        let root = post(&store, &alice, None, "to be deleted").await;
        let uri = format!("/butterflies/{}?path=/profile", root.id.to_hex());

        let delete = || {
            Request::builder()
                .method("DELETE")
                .uri(&uri)
                .body(Body::empty())
                .unwrap()
        };

        let (status, report) = send(app(store.clone()), delete()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(report["deleted"], json!(1));
        assert!(store.find_butterfly(root.id).await.unwrap().is_none());

        let (status, body) = send(app(store.clone()), delete()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], json!("NOT_FOUND"));
    }

    #[tokio::test]
    async fn test_path_with_control_characters_is_rejected() {
        let store = Arc::new(InMemoryStore::new());
        let alice = user("Alice");
        store.insert_user(alice.clone()).await;

        let (status, body) = send(
            app(store.clone()),
            json_request(
                "POST",
                "/butterflies",
                json!({
                    "text": "hello world",
                    "author": alice.id.to_hex(),
                    "path": "/profile\rdata: /forged",
                }),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["msg"], json!("Invalid path"));
        assert_eq!(store.butterfly_count().await, 0);
    }

    #[tokio::test]
    async fn test_malformed_id() {
        let store = Arc::new(InMemoryStore::new());
        let (status, _) = send(
            app(store),
            Request::builder()
                .uri("/butterflies/nope")
                .body(Body::empty())
                .unwrap(),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
