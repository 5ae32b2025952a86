use std::sync::Arc;

use axum::{
    async_trait,
    extract::{FromRequest, Request},
    routing::get,
    Json, Router,
};
use serde::de::DeserializeOwned;

use crate::error::ApiError;
use crate::state::AppState;

mod admin;
mod auth;
mod content;
mod news;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(auth::router(state.clone()))
        .merge(news::router())
        .merge(content::router())
        .merge(admin::router(state.clone()))
        .route("/health", get(|| async { "OK" }))
        .with_state(state)
}

/// `Json` whose rejections are reported as validation errors.
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| ApiError::field("body", rejection.body_text()))?;
        Ok(ApiJson(value))
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use axum::{
        body::Body,
        extract::ConnectInfo,
        http::{header, Method, Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::infra::{db, seed::seed};
    use crate::security::config::{test_config, SecurityConfig};

    async fn app_with(config: SecurityConfig) -> Router {
        let state = AppState::new(db::memory().await, &config).unwrap();
        seed(
            state.users.as_ref(),
            state.roles.as_ref(),
            &state.hasher,
            &config.admin,
        )
        .await
        .unwrap();
        router(state)
    }

    async fn app() -> Router {
        app_with(test_config()).await
    }

    async fn send(
        app: &Router,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            req = req.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let req = match body {
            Some(body) => req
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => req.body(Body::empty()).unwrap(),
        };
        let res = app.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = axum::body::to_bytes(res.into_body(), 1 << 20).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    async fn login(app: &Router, who: &str, password: &str) -> String {
        let (status, body) = send(
            app,
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({ "usernameOrEmail": who, "password": password })),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        body["token"].as_str().unwrap().to_string()
    }

    async fn register_alice(app: &Router) -> Value {
        let (status, body) = send(
            app,
            Method::POST,
            "/api/auth/register",
            None,
            Some(json!({
                "username": "alice",
                "email": "alice@example.com",
                "password": "Secret#1",
                "fullName": "Alice Liddell"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body
    }

    #[tokio::test]
    async fn health_answers_ok() {
        let app = app().await;
        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let res = app.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(res.into_body(), 64).await.unwrap();
        assert_eq!(&bytes[..], b"OK");
    }

    #[tokio::test]
    async fn account_lifecycle_over_http() {
        let app = app().await;
        let registered = register_alice(&app).await;

        let token = login(&app, "alice@example.com", "Secret#1").await;
        let (status, profile) = send(&app, Method::GET, "/api/auth/profile", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(profile["id"], registered["userId"]);
        assert_eq!(profile["roles"], json!(["User"]));

        let (status, profile) = send(
            &app,
            Method::PUT,
            "/api/auth/profile",
            Some(&token),
            Some(json!({ "address": "1 Rabbit Hole", "fullName": "" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(profile["address"], "1 Rabbit Hole");
        assert_eq!(profile["fullName"], "Alice Liddell");

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/auth/change-password",
            Some(&token),
            Some(json!({ "currentPassword": "wrong", "newPassword": "Better#2" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "WrongCurrentPassword");

        let (status, _) = send(
            &app,
            Method::POST,
            "/api/auth/change-password",
            Some(&token),
            Some(json!({ "currentPassword": "Secret#1", "newPassword": "Better#2" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        login(&app, "alice", "Better#2").await;
    }

    #[tokio::test]
    async fn duplicate_and_weak_registrations_are_rejected() {
        let app = app().await;
        register_alice(&app).await;

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/auth/register",
            None,
            Some(json!({ "username": "alice", "email": "other@example.com", "password": "Secret#1" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "DuplicateUsername");

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/auth/register",
            None,
            Some(json!({ "username": "bob", "email": "bob@example.com", "password": "short" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "WeakPassword");
        assert!(body["fields"]["password"].as_array().is_some_and(|r| !r.is_empty()));
    }

    #[tokio::test]
    async fn bad_credentials_look_the_same() {
        let app = app().await;
        register_alice(&app).await;

        let (unknown_status, unknown) = send(
            &app,
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({ "usernameOrEmail": "nobody", "password": "Secret#1" })),
        )
        .await;
        let (wrong_status, wrong) = send(
            &app,
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({ "username": "alice", "password": "Secret#2" })),
        )
        .await;
        assert_eq!(unknown_status, StatusCode::UNAUTHORIZED);
        assert_eq!(unknown_status, wrong_status);
        assert_eq!(unknown, wrong);
    }

    #[tokio::test]
    async fn protected_routes_need_a_valid_token() {
        let app = app().await;
        let (status, body) = send(&app, Method::GET, "/api/auth/profile", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Unauthenticated");

        let token = login(&app, "admin", "Admin@123").await;
        let sig = token.rfind('.').unwrap() + 1;
        let mut tampered = token.clone();
        let first = &token[sig..sig + 1];
        tampered.replace_range(sig..sig + 1, if first == "A" { "B" } else { "A" });
        let (status, _) = send(&app, Method::GET, "/api/auth/profile", Some(&tampered), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn malformed_json_is_a_validation_error() {
        let app = app().await;
        let req = Request::builder()
            .method(Method::POST)
            .uri("/api/auth/login")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let res = app.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let bytes = axum::body::to_bytes(res.into_body(), 4096).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "ValidationError");
        assert!(body["fields"]["body"].is_array());
    }

    #[tokio::test]
    async fn news_drafts_are_admin_only() {
        let app = app().await;
        let admin = login(&app, "admin", "Admin@123").await;

        let (status, published) = send(
            &app,
            Method::POST,
            "/api/news",
            Some(&admin),
            Some(json!({ "title": "Launch", "content": "We launched", "isPublished": true })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let (status, draft) = send(
            &app,
            Method::POST,
            "/api/news",
            Some(&admin),
            Some(json!({ "title": "Secret", "content": "Not yet" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, list) = send(&app, Method::GET, "/api/news", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(list.as_array().map(Vec::len), Some(1));
        assert_eq!(list[0]["id"], published["id"]);

        let draft_uri = format!("/api/news/{}", draft["id"]);
        let (status, _) = send(&app, Method::GET, &draft_uri, None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = send(&app, Method::GET, &draft_uri, Some(&admin), None).await;
        assert_eq!(status, StatusCode::OK);

        let (_, all) = send(&app, Method::GET, "/api/news", Some(&admin), None).await;
        assert_eq!(all.as_array().map(Vec::len), Some(2));

        let (status, _) = send(&app, Method::DELETE, &draft_uri, Some(&admin), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = send(&app, Method::DELETE, &draft_uri, Some(&admin), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn news_writes_check_role_and_fields() {
        let app = app().await;
        register_alice(&app).await;
        let user = login(&app, "alice", "Secret#1").await;
        let admin = login(&app, "admin", "Admin@123").await;
        let article = json!({ "title": "Launch", "content": "We launched" });

        let (status, _) = send(&app, Method::POST, "/api/news", None, Some(article.clone())).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, body) = send(&app, Method::POST, "/api/news", Some(&user), Some(article)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "Forbidden");

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/news",
            Some(&admin),
            Some(json!({ "title": " ", "content": "" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["fields"]["title"].is_array());
        assert!(body["fields"]["content"].is_array());
    }

    #[tokio::test]
    async fn company_content_upsert_reports_created_then_ok() {
        let app = app().await;
        let admin = login(&app, "admin", "Admin@123").await;
        let page = json!({ "title": "About us", "content": "<p>hello</p>" });

        let (status, _) =
            send(&app, Method::PUT, "/api/company-content/about", Some(&admin), Some(page.clone())).await;
        assert_eq!(status, StatusCode::CREATED);
        let (status, _) =
            send(&app, Method::PUT, "/api/company-content/about", Some(&admin), Some(page)).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(&app, Method::GET, "/api/company-content/about", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["title"], "About us");

        let (status, _) =
            send(&app, Method::DELETE, "/api/company-content/about", Some(&admin), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = send(&app, Method::GET, "/api/company-content/about", None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn role_changes_show_up_in_the_next_token() {
        let app = app().await;
        let registered = register_alice(&app).await;
        let user = login(&app, "alice", "Secret#1").await;
        let admin = login(&app, "admin", "Admin@123").await;

        let (status, _) = send(&app, Method::GET, "/api/admin/users", Some(&user), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, _) = send(&app, Method::GET, "/api/admin/users", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let uri = format!("/api/admin/users/{}/roles", registered["userId"].as_str().unwrap());
        let (status, _) =
            send(&app, Method::POST, &uri, Some(&admin), Some(json!({ "role": "Manager" }))).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) =
            send(&app, Method::POST, &uri, Some(&admin), Some(json!({ "role": "Ghost" }))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({ "usernameOrEmail": "alice", "password": "Secret#1" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let roles = body["roles"].as_array().unwrap();
        assert!(roles.contains(&json!("Manager")));
        assert!(roles.contains(&json!("User")));

        let (status, users) = send(&app, Method::GET, "/api/admin/users", Some(&admin), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(users.as_array().map(Vec::len), Some(2));
    }

    #[tokio::test]
    async fn repeated_logins_are_throttled() {
        let mut config = test_config();
        config.rate_limit.max_requests = 2;
        let app = app_with(config).await;
        let attempt = json!({ "usernameOrEmail": "admin", "password": "nope" });

        for _ in 0..2 {
            let (status, _) =
                send(&app, Method::POST, "/api/auth/login", None, Some(attempt.clone())).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED);
        }
        let (status, body) =
            send(&app, Method::POST, "/api/auth/login", None, Some(attempt)).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body["error"], "RateLimited");
    }

    #[tokio::test]
    async fn rotating_forwarded_for_does_not_reset_the_limit() {
        let mut config = test_config();
        config.rate_limit.max_requests = 2;
        let app = app_with(config).await;
        let peer = SocketAddr::from(([198, 51, 100, 4], 40_000));

        let mut statuses = Vec::new();
        for i in 0..5 {
            let mut req = Request::builder()
                .method(Method::POST)
                .uri("/api/auth/login")
                .header(header::CONTENT_TYPE, "application/json")
                .header("x-forwarded-for", format!("203.0.113.{i}"))
                .body(Body::from(
                    json!({ "usernameOrEmail": "admin", "password": "nope" }).to_string(),
                ))
                .unwrap();
            req.extensions_mut().insert(ConnectInfo(peer));
            statuses.push(app.clone().oneshot(req).await.unwrap().status());
        }
        assert_eq!(
            statuses,
            [
                StatusCode::UNAUTHORIZED,
                StatusCode::UNAUTHORIZED,
                StatusCode::TOO_MANY_REQUESTS,
                StatusCode::TOO_MANY_REQUESTS,
                StatusCode::TOO_MANY_REQUESTS,
            ]
        );
    }
}
