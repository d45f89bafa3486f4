//! Exercises the real router built by [`quiz_server::router::build`] over an
//! in-memory store, the way `stupid-server`'s own integration tests drive a
//! JSON contract — except here we go through `tower::ServiceExt` against the
//! actual `Router` rather than mirror types, since this crate (unlike
//! `stupid-server`) has a lib target to import from.

use std::sync::Arc;

use http_body_util::BodyExt;
use hyper::{Request, StatusCode};
use quiz_core::Config;
use quiz_core::entity::{QuestionSourceMode, Quiz, QuizStatus};
use quiz_server::{router, startup};
use tower::ServiceExt;

async fn test_app() -> axum::Router {
    let mut config = Config::for_profile("");
    config.scheduler.min_schedule_horizon_secs = 1;
    let state = startup::build(config).await;
    router::build(state)
}

#[tokio::test]
async fn health_check_reports_ok() {
    let app = test_app().await;

    let response = app
        .oneshot(Request::builder().uri("/health").body(axum::body::Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn quiz_state_for_unknown_quiz_is_not_found() {
    let app = test_app().await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/admin/quizzes/999/state")
                .body(axum::body::Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn schedule_then_cancel_quiz_round_trip() {
    let mut config = Config::for_profile("");
    config.scheduler.min_schedule_horizon_secs = 1;
    let store = Arc::new(quiz_store::MemoryStore::new());

    let quiz = Quiz {
        id: 1,
        title: "Friday Trivia".into(),
        description: String::new(),
        scheduled_time: chrono::Utc::now() + chrono::Duration::seconds(120),
        prize_fund: 1000,
        status: QuizStatus::Scheduled,
        question_count: 1,
        actual_question_count: None,
        finish_on_zero_players: false,
        question_source_mode: QuestionSourceMode::Hybrid,
    };
    store.insert_quiz(quiz);
    store.insert_question(quiz_core::entity::Question {
        id: 100,
        quiz_id: Some(1),
        text: "q".into(),
        text_alt: None,
        options: vec![
            quiz_core::entity::QuestionOption { id: 1, text: "a".into() },
            quiz_core::entity::QuestionOption { id: 2, text: "b".into() },
        ],
        correct_option: 1,
        time_limit_sec: 10,
        point_value: 10,
        difficulty: 1,
        is_used: false,
    });

    let state = startup::build_with_store(config, store.clone()).await;
    let app = router::build(state.clone());

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/admin/quizzes/1/schedule")
                .body(axum::body::Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(state.scheduler.is_armed(1).await);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/admin/quizzes/1/cancel")
                .body(axum::body::Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(!state.scheduler.is_armed(1).await);
}

#[tokio::test]
async fn ws_ticket_requires_identity_headers() {
    let app = test_app().await;

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/auth/ws-ticket")
                .body(axum::body::Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    // `ConnectInfo<SocketAddr>` is only populated by `into_make_service_with_connect_info`,
    // which `oneshot` bypasses — axum rejects the request before our handler runs.
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}
