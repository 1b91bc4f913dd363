use actix_web::{test, web, App};
use lesson_service::handlers::{configure, AppState};
use lesson_service::models::sample_lessons;
use lesson_service::{LessonRecommender, PipelineSettings};
use serde_json::{json, Value};
use std::sync::Arc;

async fn state() -> web::Data<AppState> {
    let recommender = LessonRecommender::in_memory(64, PipelineSettings::default());
    recommender.index_lessons(sample_lessons()).await.unwrap();
    web::Data::new(AppState {
        recommender: Arc::new(recommender),
    })
}

#[actix_web::test]
async fn test_recommend_returns_lessons() {
    let app = test::init_service(App::new().app_data(state().await).configure(configure)).await;

    let req = test::TestRequest::post()
        .uri("/api/recommend")
        .set_json(json!({"query": "anxiety relief", "profile": {"id": "u1", "profile_vec": {}}}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());

    let body: Value = test::read_body_json(resp).await;
    let recommendations = body["recommendations"].as_array().unwrap();
    assert!(!recommendations.is_empty() && recommendations.len() <= 10);
    assert_eq!(recommendations[0]["id"], "lesson1");
    for lesson in recommendations {
        for field in ["id", "title", "content", "tone_tag"] {
            assert!(lesson.get(field).is_some(), "missing {}", field);
        }
    }
}

#[actix_web::test]
async fn test_recommend_without_profile() {
    let app = test::init_service(App::new().app_data(state().await).configure(configure)).await;

    let req = test::TestRequest::post()
        .uri("/api/recommend")
        .set_json(json!({"query": "gratitude"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
}

#[actix_web::test]
async fn test_recommend_demotes_history() {
    let app = test::init_service(App::new().app_data(state().await).configure(configure)).await;

    let req = test::TestRequest::post()
        .uri("/api/recommend")
        .set_json(json!({
            "query": "anxiety relief",
            "profile": {"id": "u1", "profileVec": {}, "history": ["lesson1"]}
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());

    let body: Value = test::read_body_json(resp).await;
    let recommendations = body["recommendations"].as_array().unwrap();
    assert!(recommendations.len() > 1);
    assert_ne!(recommendations[0]["id"], "lesson1");
    assert_eq!(recommendations.last().unwrap()["id"], "lesson1");
}

#[actix_web::test]
async fn test_malformed_requests_get_error_body() {
    let app = test::init_service(App::new().app_data(state().await).configure(configure)).await;

    let cases = [
        ("/api/recommend", "{not json".to_string()),
        ("/api/recommend", json!({"profile": {"id": "u1"}}).to_string()),
        ("/api/recommend", json!({"query": "   "}).to_string()),
        (
            "/api/recommend",
            json!({"query": "calm", "profile": {"profile_vec": {"0": 1.0, "5": 1.0}}}).to_string(),
        ),
        ("/api/feedback", json!({"interactions": []}).to_string()),
        (
            "/api/feedback",
            json!({"userId": "u1", "interactions": [["lesson1-0", 3]]}).to_string(),
        ),
    ];

    for (uri, payload) in cases {
        let req = test::TestRequest::post()
            .uri(uri)
            .insert_header(("content-type", "application/json"))
            .set_payload(payload.clone())
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 400, "{} {}", uri, payload);

        let body: Value = test::read_body_json(resp).await;
        assert!(body["error"].is_string(), "{} {}", uri, payload);
    }
}

#[actix_web::test]
async fn test_feedback_accepts_scores_and_actions() {
    let state = state().await;
    let app = test::init_service(App::new().app_data(state.clone()).configure(configure)).await;

    let req = test::TestRequest::post()
        .uri("/api/feedback")
        .set_json(json!({
            "userId": "u1",
            "interactions": [["lesson1-0", 1], ["lesson2", "like"], ["lesson3-0", "view"]]
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body, json!({"success": true}));

    let recommender = &state.recommender;
    assert_eq!(
        recommender.arm_stats("u1", "", "lesson2-0").map(|s| s.exposures),
        Some(1)
    );
    assert!(!recommender.profile("u1").unwrap().is_cold());
}

#[actix_web::test]
async fn test_health() {
    let app = test::init_service(App::new().app_data(state().await).configure(configure)).await;

    let req = test::TestRequest::get().uri("/health").to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());

    let body = test::read_body(resp).await;
    assert_eq!(body, "OK");
}
