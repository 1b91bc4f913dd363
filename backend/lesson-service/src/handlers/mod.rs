use crate::error::{AppError, Result};
use crate::models::{Interaction, InteractionAction, Lesson, UserProfile, ANONYMOUS_USER};
use crate::services::LessonRecommender;
use actix_web::{post, web, HttpRequest, HttpResponse};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

pub struct AppState {
    pub recommender: Arc<LessonRecommender>,
}

// ===========================================================================
// Request/Response DTOs
// ===========================================================================

#[derive(Debug, Deserialize)]
pub struct RecommendRequest {
    pub query: String,
    #[serde(default)]
    pub profile: Option<ProfilePayload>,
}

#[derive(Debug, Deserialize)]
pub struct ProfilePayload {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default, alias = "profileVec")]
    pub profile_vec: ProfileVec,
    /// Lessons already viewed or completed
    #[serde(default)]
    pub history: Vec<String>,
}

/// A plain array, or an object keyed "0".."n-1" (how typed arrays serialize in JS)
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ProfileVec {
    Dense(Vec<f32>),
    Indexed(HashMap<String, f32>),
}

impl Default for ProfileVec {
    fn default() -> Self {
        ProfileVec::Dense(Vec::new())
    }
}

impl ProfileVec {
    pub fn into_vec(self) -> Result<Vec<f32>> {
        let vec = match self {
            ProfileVec::Dense(vec) => vec,
            ProfileVec::Indexed(map) => {
                let mut slots: Vec<Option<f32>> = vec![None; map.len()];
                for (key, value) in map {
                    let index: usize = key.parse().map_err(|_| {
                        AppError::BadRequest(format!("profile_vec key '{}' is not an index", key))
                    })?;
                    let slot = slots.get_mut(index).ok_or_else(|| {
                        AppError::BadRequest(format!("profile_vec index {} out of range", index))
                    })?;
                    *slot = Some(value);
                }
                slots
                    .into_iter()
                    .collect::<Option<Vec<f32>>>()
                    .ok_or_else(|| AppError::BadRequest("profile_vec has gaps".to_string()))?
            }
        };

        if vec.iter().any(|x| !x.is_finite()) {
            return Err(AppError::BadRequest(
                "profile_vec must contain finite numbers".to_string(),
            ));
        }
        Ok(vec)
    }
}

#[derive(Debug, Serialize)]
pub struct RecommendResponse {
    pub recommendations: Vec<Lesson>,
}

#[derive(Debug, Deserialize)]
pub struct FeedbackRequest {
    #[serde(rename = "userId", alias = "user_id")]
    pub user_id: String,
    #[serde(default)]
    pub interactions: Vec<(String, RewardValue)>,
    /// Query the chunks were served for; keys context arms
    #[serde(default)]
    pub query: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(untagged)]
pub enum RewardValue {
    Score(f64),
    Action(InteractionAction),
}

impl RewardValue {
    pub fn reward(&self) -> f64 {
        match self {
            RewardValue::Score(score) => *score,
            RewardValue::Action(action) => action.reward(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct FeedbackResponse {
    pub success: bool,
}

// ===========================================================================
// Handlers
// ===========================================================================

#[post("/api/recommend")]
pub async fn recommend(
    state: web::Data<AppState>,
    body: web::Json<RecommendRequest>,
) -> Result<HttpResponse> {
    let request = body.into_inner();

    let profile = match request.profile {
        Some(payload) => Some(
            UserProfile::new(
                payload.id.unwrap_or_else(|| ANONYMOUS_USER.to_string()),
                payload.profile_vec.into_vec()?,
            )
            .with_history(payload.history),
        ),
        None => None,
    };

    let recommendations = state
        .recommender
        .recommend_lessons(&request.query, profile)
        .await?;

    info!(
        results = recommendations.len(),
        "POST /api/recommend"
    );

    Ok(HttpResponse::Ok().json(RecommendResponse { recommendations }))
}

#[post("/api/feedback")]
pub async fn feedback(
    state: web::Data<AppState>,
    body: web::Json<FeedbackRequest>,
) -> Result<HttpResponse> {
    let request = body.into_inner();

    let interactions: Vec<Interaction> = request
        .interactions
        .iter()
        .map(|(chunk_id, reward)| Interaction::new(chunk_id.clone(), reward.reward()))
        .collect();

    let report = state.recommender.update_feedback(
        &request.user_id,
        &interactions,
        request.query.as_deref(),
    )?;

    info!(
        user_id = %request.user_id,
        applied = report.applied,
        "POST /api/feedback"
    );

    Ok(HttpResponse::Ok().json(FeedbackResponse { success: true }))
}

pub async fn health() -> &'static str {
    "OK"
}

/// Malformed JSON bodies get the same `{"error": ...}` shape as every other failure
pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default().error_handler(|err, _req: &HttpRequest| {
        AppError::BadRequest(err.to_string()).into()
    })
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(json_config())
        .service(recommend)
        .service(feedback)
        .route("/health", web::get().to(health));
}
