pub mod config;
pub mod middleware;
pub mod routes;

use std::sync::Arc;

use axum::{
    Router,
    middleware::from_fn_with_state,
    routing::{get, post},
};
use kiosk_engine::Engine;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub engine: Engine,
    pub bridge_secret: String,
}

/// The bridge router: public health check plus the authenticated event
/// endpoint.
pub fn app(state: AppState) -> Router {
    let public_routes = Router::new().route("/health", get(routes::health));

    let bridge_routes = Router::new()
        .route("/events", post(routes::handle_event))
        .layer(from_fn_with_state(state.clone(), middleware::require_bridge))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(bridge_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use http_body_util::BodyExt;
    use kiosk_db::Database;
    use kiosk_engine::EngineConfig;
    use kiosk_types::api::{ControlAction, InboundEvent, RenderInstruction};
    use kiosk_types::events::{Event, FormKind, Input, Nav};
    use kiosk_types::models::{Role, UserId};
    use tower::ServiceExt;

    const SECRET: &str = "bridge-test-token";
    const OWNER: UserId = UserId(1);

    fn test_app() -> (Arc<Database>, Router) {
        let db = Arc::new(Database::open_in_memory(OWNER).unwrap());
        let engine = Engine::new(db.clone(), EngineConfig::default());
        let state = Arc::new(AppStateInner {
            engine,
            bridge_secret: SECRET.into(),
        });
        (db, app(state))
    }

    fn event_request(body: String, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/events")
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        builder.body(Body::from(body)).unwrap()
    }

    async fn post_event(app: &Router, user: UserId, event: Event) -> RenderInstruction {
        let body = serde_json::to_string(&InboundEvent {
            user_id: user,
            event,
        })
        .unwrap();
        let res = app
            .clone()
            .oneshot(event_request(body, Some(SECRET)))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_is_public() {
        let (_db, app) = test_app();
        let res = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body, serde_json::json!({ "status": "ok" }));
    }

    #[tokio::test]
    async fn events_require_secret() {
        let (_db, app) = test_app();
        let body = r#"{"user_id":5,"event":{"type":"Nav","data":{"to":"who_am_i"}}}"#;

        let res = app
            .clone()
            .oneshot(event_request(body.into(), None))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

        let res = app
            .clone()
            .oneshot(event_request(body.into(), Some("wrong")))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

        let res = app
            .oneshot(event_request(body.into(), Some(SECRET)))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        let out: RenderInstruction = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(out.text.as_deref(), Some("Your user id: 5"));
    }

    #[tokio::test]
    async fn malformed_event_is_client_error() {
        let (_db, app) = test_app();
        let res = app
            .oneshot(event_request(r#"{"user_id":"x"}"#.into(), Some(SECRET)))
            .await
            .unwrap();
        assert!(res.status().is_client_error());
    }

    #[tokio::test]
    async fn form_runs_over_the_bridge() {
        let (db, app) = test_app();

        let home = post_event(&app, OWNER, Event::Nav(Nav::Start { arg: None })).await;
        let has_admin = home.controls.iter().flatten().any(|c| {
            c.action
                == ControlAction::Event {
                    event: Event::Nav(Nav::Admin),
                }
        });
        assert!(has_admin);

        post_event(&app, OWNER, Event::Nav(Nav::Begin(FormKind::AddCategory))).await;
        let saved = post_event(&app, OWNER, Event::Text(Input::decode("Drinks"))).await;
        assert!(saved.text.unwrap().starts_with("Category added: Drinks"));
        assert_eq!(db.list_categories().unwrap()[0].title, "Drinks");

        // A customer sees no admin entry.
        let home = post_event(&app, UserId(9), Event::Nav(Nav::Start { arg: None })).await;
        assert_eq!(db.role_of(UserId(9)).unwrap(), Role::User);
        assert_eq!(home.controls.len(), 2);
    }
}
