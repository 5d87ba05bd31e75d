pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::admin::handlers as admin;
use crate::conversation::handlers as conversation;
use crate::matching::handlers as matching;
use crate::state::AppState;
use crate::users::handlers as users;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Registration and questionnaire
        .route(
            "/api/v1/questionnaire",
            get(conversation::handle_get_questionnaire),
        )
        .route(
            "/api/v1/conversations/:external_id",
            get(conversation::handle_get_conversation),
        )
        .route(
            "/api/v1/conversations/:external_id/events",
            post(conversation::handle_conversation_event),
        )
        // Profiles
        .route(
            "/api/v1/users/:id",
            get(users::handle_get_user)
                .patch(users::handle_edit_profile)
                .delete(users::handle_reset_account),
        )
        .route("/api/v1/users/:id/likes", get(matching::handle_likes_received))
        // Matching
        .route("/api/v1/seekers/:id/ranking", get(matching::handle_ranking))
        .route(
            "/api/v1/seekers/:id/browse",
            get(matching::handle_browse_current),
        )
        .route(
            "/api/v1/seekers/:id/browse/:action",
            post(matching::handle_browse_action),
        )
        .route("/api/v1/likes", post(matching::handle_like))
        .route(
            "/api/v1/matches/:seeker_id/:provider_id",
            get(matching::handle_get_match),
        )
        // Administration
        .route("/api/v1/admin/stats", get(admin::handle_stats))
        .route("/api/v1/admin/users/:id/block", post(admin::handle_block))
        .route("/api/v1/admin/users/:id/unblock", post(admin::handle_unblock))
        .route(
            "/api/v1/admin/seekers/:id/ranking",
            get(admin::handle_inspect_ranking),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::{header, Method, Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::config::Config;
    use crate::conversation::session::MemorySessionStore;
    use crate::matching::scorer::scorer_for;
    use crate::matching::ScoringStrategy;
    use crate::notify::LogNotifier;
    use crate::questionnaire::tests::{SECTIONED_QUESTIONNAIRE, WARMTH_QUESTIONNAIRE};
    use crate::questionnaire::Questionnaire;
    use crate::store::MemoryStore;

    fn test_state() -> AppState {
        test_state_with(WARMTH_QUESTIONNAIRE)
    }

    fn test_state_with(questionnaire: &str) -> AppState {
        let config = Config {
            database_url: None,
            redis_url: None,
            questionnaire_path: "unused.json".to_string(),
            scoring_strategy: ScoringStrategy::Difference,
            scoring_enabled: true,
            admin_allowlist: vec![900],
            notify_webhook_url: None,
            session_ttl_secs: 60,
            active_window_hours: 24,
            port: 0,
            rust_log: "info".to_string(),
        };
        AppState {
            store: Arc::new(MemoryStore::new()),
            sessions: Arc::new(MemorySessionStore::new()),
            notifier: Arc::new(LogNotifier),
            scorer: scorer_for(ScoringStrategy::Difference),
            questionnaire: Arc::new(
                Questionnaire::from_json_str(questionnaire, ScoringStrategy::Difference).unwrap(),
            ),
            config,
        }
    }

    async fn call(
        app: &Router,
        method: Method,
        uri: &str,
        body: Option<Value>,
        admin: Option<&str>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(admin) = admin {
            builder = builder.header("x-admin-id", admin);
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn onboard(app: &Router, external_id: i64, role: &str, answers: [i64; 2]) -> i64 {
        let uri = format!("/api/v1/conversations/{external_id}/events");
        let mut events = vec![
            json!({"type": "choose_role", "role": role}),
            json!({"type": "submit_contact", "contact": format!("@u{external_id}")}),
            json!({"type": "submit_profile", "about": "hello"}),
            json!({"type": "start_test"}),
        ];
        events.extend(answers.iter().map(|v| json!({"type": "answer", "value": v})));

        let mut last = Value::Null;
        for event in events {
            let (status, body) = call(app, Method::POST, &uri, Some(event), None).await;
            assert_eq!(status, StatusCode::OK, "{body}");
            last = body;
        }
        assert_eq!(last["session"]["state"], "test_complete");
        last["session"]["user_id"].as_i64().unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let app = build_router(test_state());
        let (status, body) = call(&app, Method::GET, "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["service"], "matchmaker");
    }

    #[tokio::test]
    async fn test_browse_like_and_match_over_http() {
        let app = build_router(test_state());
        let provider = onboard(&app, 1, "provider", [5, 5]).await;
        let seeker = onboard(&app, 2, "seeker", [5, 4]).await;

        let (status, body) = call(
            &app,
            Method::GET,
            &format!("/api/v1/seekers/{seeker}/browse"),
            None,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["card"]["provider"]["id"], provider);
        assert_eq!(body["card"]["total"], 1);

        let (_, body) = call(
            &app,
            Method::POST,
            &format!("/api/v1/seekers/{seeker}/browse/like"),
            None,
            None,
        )
        .await;
        assert_eq!(body["card"]["like"]["is_new"], true);
        assert_eq!(body["card"]["like"]["mutual"], false);

        let (_, likes) = call(
            &app,
            Method::GET,
            &format!("/api/v1/users/{provider}/likes"),
            None,
            None,
        )
        .await;
        assert_eq!(likes[0]["liker"]["id"], seeker);

        let (_, outcome) = call(
            &app,
            Method::POST,
            "/api/v1/likes",
            Some(json!({"liker_id": provider, "liked_id": seeker})),
            None,
        )
        .await;
        assert_eq!(outcome["match_created"], true);

        let (status, m) = call(
            &app,
            Method::GET,
            &format!("/api/v1/matches/{seeker}/{provider}"),
            None,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(m["seeker_id"], seeker);
    }

    #[tokio::test]
    async fn test_error_statuses() {
        let app = build_router(test_state());
        let provider = onboard(&app, 1, "provider", [3, 3]).await;

        let (status, body) = call(&app, Method::GET, "/api/v1/users/999", None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "NOT_FOUND");

        let (status, _) = call(
            &app,
            Method::GET,
            &format!("/api/v1/seekers/{provider}/browse"),
            None,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = call(
            &app,
            Method::POST,
            "/api/v1/conversations/1/events",
            Some(json!({"type": "start_test"})),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_admin_requires_allow_listed_header() {
        let app = build_router(test_state());
        onboard(&app, 1, "provider", [3, 3]).await;

        let (status, _) = call(&app, Method::GET, "/api/v1/admin/stats", None, None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, _) =
            call(&app, Method::GET, "/api/v1/admin/stats", None, Some("901")).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, stats) =
            call(&app, Method::GET, "/api/v1/admin/stats", None, Some("900")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(stats["providers"], 1);
    }

    #[tokio::test]
    async fn test_account_reset_restarts_conversation() {
        let app = build_router(test_state());
        let id = onboard(&app, 5, "seeker", [1, 2]).await;

        let (status, _) = call(
            &app,
            Method::DELETE,
            &format!("/api/v1/users/{id}"),
            None,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (_, view) = call(&app, Method::GET, "/api/v1/conversations/5", None, None).await;
        assert_eq!(view["session"]["state"], "new");
    }

    #[tokio::test]
    async fn test_next_question_comes_from_role_section() {
        let app = build_router(test_state_with(SECTIONED_QUESTIONNAIRE));
        let uri = "/api/v1/conversations/3/events";
        for event in [
            json!({"type": "choose_role", "role": "provider"}),
            json!({"type": "submit_contact", "contact": "@p"}),
            json!({"type": "submit_profile", "about": "hi"}),
        ] {
            call(&app, Method::POST, uri, Some(event), None).await;
        }

        let (status, view) = call(
            &app,
            Method::POST,
            uri,
            Some(json!({"type": "start_test"})),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(view["next_question"]["id"], "p_listen");
        assert_eq!(view["session"]["user_role"], "provider");
    }
}
