//! HTTP routes.

use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router, middleware};
use gcalmcp_calendar::{CalendarService, Event, EventDraft, EventPatch};
use gcalmcp_core::EventWindow;
use serde::Deserialize;
use serde_json::{Value, json};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::auth::{JwtVerifier, require_bearer};
use crate::config::TrustModel;
use crate::error::ApiError;

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub service: CalendarService,
}

pub type SharedState = Arc<AppState>;

#[derive(Debug, Deserialize)]
pub(crate) struct ListParams {
    max_results: Option<usize>,
}

/// Builds the application router for a trust model.
pub fn router(service: CalendarService, trust: &TrustModel) -> Router {
    let state = Arc::new(AppState { service });

    let mut calendar = Router::new()
        .route("/events", get(list_events).post(create_event))
        .route(
            "/events/:id",
            get(get_event).patch(update_event).delete(delete_event),
        );
    if let TrustModel::BearerJwt(settings) = trust {
        let verifier = Arc::new(JwtVerifier::new(settings));
        calendar = calendar.route_layer(middleware::from_fn_with_state(verifier, require_bearer));
    }

    Router::new()
        .route("/healthz", get(healthz))
        .nest("/calendar", calendar)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

async fn healthz() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

async fn list_events(
    State(state): State<SharedState>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> Result<Json<Vec<Event>>, ApiError> {
    let Query(params) = params.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let window = EventWindow::upcoming()
        .with_max_results(params.max_results.unwrap_or(EventWindow::DEFAULT_MAX_RESULTS))
        .map_err(|e| ApiError::bad_request(e.to_string()))?;

    let events = state.service.list_events(&window).await?;
    Ok(Json(events))
}

async fn create_event(
    State(state): State<SharedState>,
    body: Result<Json<EventDraft>, JsonRejection>,
) -> Result<Json<Event>, ApiError> {
    let Json(draft) = body.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let event = state.service.create_event(&draft).await?;
    Ok(Json(event))
}

async fn get_event(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<Event>, ApiError> {
    let event = state.service.get_event(&id).await?;
    Ok(Json(event))
}

async fn update_event(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    body: Result<Json<EventPatch>, JsonRejection>,
) -> Result<Json<Event>, ApiError> {
    let Json(patch) = body.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let event = state.service.update_event(&id, &patch).await?;
    Ok(Json(event))
}

async fn delete_event(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    state.service.delete_event(&id).await?;
    Ok(Json(json!({"status": "Event deleted successfully"})))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path as FsPath;
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use chrono::Utc;
    use gcalmcp_auth::{CredentialResolver, ResolverConfig};
    use gcalmcp_calendar::CalendarAdapter;
    use jsonwebtoken::{EncodingKey, Header, encode};
    use tempfile::TempDir;
    use tower::ServiceExt;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::config::JwtSettings;

    fn write_token(dir: &FsPath) {
        let record = json!({
            "token": "ya29.valid",
            "refresh_token": "1//refresh",
            "token_uri": "http://127.0.0.1:9/token",
            "client_id": "client.apps.googleusercontent.com",
            "client_secret": "shh",
            "scopes": ["https://www.googleapis.com/auth/calendar"],
            "expiry": (Utc::now() + chrono::Duration::hours(1)).to_rfc3339()
        });
        std::fs::write(dir.join("token.json"), record.to_string()).unwrap();
    }

    fn app(dir: &TempDir, server: &MockServer, trust: &TrustModel) -> Router {
        let resolver = CredentialResolver::new(
            ResolverConfig::new(dir.path())
                .with_service_account_path(None)
                .with_open_browser(false),
        )
        .unwrap();
        let adapter = CalendarAdapter::new(Duration::from_secs(5))
            .unwrap()
            .with_base_url(server.uri());
        router(CalendarService::new(resolver, adapter), trust)
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn event_json(id: &str) -> Value {
        json!({
            "id": id,
            "summary": "Team Sync",
            "start": {"dateTime": "2025-02-05T14:00:00Z"},
            "end": {"dateTime": "2025-02-05T15:00:00Z"}
        })
    }

    #[tokio::test]
    async fn healthz_is_open() {
        let dir = TempDir::new().unwrap();
        let server = MockServer::start().await;
        let trust = TrustModel::BearerJwt(JwtSettings::new("s3cret"));

        let response = app(&dir, &server, &trust)
            .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, json!({"status": "ok"}));
    }

    #[tokio::test]
    async fn list_returns_events_array() {
        let dir = TempDir::new().unwrap();
        write_token(dir.path());
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/calendars/primary/events"))
            .and(query_param("maxResults", "5"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"items": [event_json("evt1")]})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let response = app(&dir, &server, &TrustModel::None)
            .oneshot(
                Request::get("/calendar/events?max_results=5")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body[0]["id"], "evt1");
    }

    #[tokio::test]
    async fn list_rejects_out_of_range_limit() {
        let dir = TempDir::new().unwrap();
        let server = MockServer::start().await;

        for query in ["max_results=0", "max_results=2501", "max_results=ten"] {
            let response = app(&dir, &server, &TrustModel::None)
                .oneshot(
                    Request::get(format!("/calendar/events?{}", query))
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{}", query);
            assert_eq!(json_body(response).await["error"]["code"], "invalid_request");
        }
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn create_event_posts_to_provider() {
        let dir = TempDir::new().unwrap();
        write_token(dir.path());
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/calendars/primary/events"))
            .and(body_partial_json(json!({
                "summary": "Team Sync",
                "attendees": [{"email": "a@example.com"}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(event_json("new1")))
            .expect(1)
            .mount(&server)
            .await;

        let body = json!({
            "summary": "Team Sync",
            "start": "2025-02-05T14:00:00Z",
            "end": "2025-02-05T15:00:00Z",
            "attendees": ["a@example.com"]
        });
        let response = app(&dir, &server, &TrustModel::None)
            .oneshot(
                Request::post("/calendar/events")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["id"], "new1");
    }

    #[tokio::test]
    async fn malformed_body_is_bad_request() {
        let dir = TempDir::new().unwrap();
        let server = MockServer::start().await;

        let response = app(&dir, &server, &TrustModel::None)
            .oneshot(
                Request::post("/calendar/events")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"summary": 42}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn missing_event_is_404() {
        let dir = TempDir::new().unwrap();
        write_token(dir.path());
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/calendars/primary/events/nope"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "error": {"code": 404, "message": "Not Found: internal detail"}
            })))
            .mount(&server)
            .await;

        let response = app(&dir, &server, &TrustModel::None)
            .oneshot(
                Request::patch("/calendar/events/nope")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"summary": "Renamed"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = json_body(response).await;
        assert_eq!(
            body,
            json!({"error": {"code": "not_found", "message": "Event not found"}})
        );
    }

    #[tokio::test]
    async fn delete_reports_status() {
        let dir = TempDir::new().unwrap();
        write_token(dir.path());
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/calendars/primary/events/evt1"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let response = app(&dir, &server, &TrustModel::None)
            .oneshot(
                Request::delete("/calendar/events/evt1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            json_body(response).await,
            json!({"status": "Event deleted successfully"})
        );
    }

    #[tokio::test]
    async fn no_credentials_is_401() {
        let dir = TempDir::new().unwrap();
        let server = MockServer::start().await;

        let response = app(&dir, &server, &TrustModel::None)
            .oneshot(Request::get("/calendar/events/evt1").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = json_body(response).await;
        assert_eq!(body["error"]["code"], "authentication_failed");
        assert!(!body.to_string().contains(&dir.path().display().to_string()));
    }

    #[tokio::test]
    async fn bearer_jwt_gates_calendar_routes() {
        let dir = TempDir::new().unwrap();
        write_token(dir.path());
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/calendars/primary/events/evt1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(event_json("evt1")))
            .expect(1)
            .mount(&server)
            .await;
        let trust = TrustModel::BearerJwt(JwtSettings::new("s3cret"));

        let denied = app(&dir, &server, &trust)
            .oneshot(Request::get("/calendar/events/evt1").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(denied.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(denied).await["error"]["code"], "unauthorized");

        let jwt = encode(
            &Header::default(),
            &json!({"sub": "agent", "exp": Utc::now().timestamp() + 600}),
            &EncodingKey::from_secret(b"s3cret"),
        )
        .unwrap();
        let allowed = app(&dir, &server, &trust)
            .oneshot(
                Request::get("/calendar/events/evt1")
                    .header(header::AUTHORIZATION, format!("Bearer {}", jwt))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(allowed.status(), StatusCode::OK);
    }
}
