use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeSet;
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    middleware::request_id::RequestId,
    models::{
        ActivityRecommendationResponse, ChildId, ChildRecommendationResponse, ChildSummary,
        Interest, InterestCatalog, RecommendationStats,
    },
    services::{ActivityQuery, ChildQuery},
};

use super::AppState;

// Request/Response types

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChildRecommendationParams {
    pub k: Option<i64>,
    pub min_group_size: Option<i64>,
    pub max_group_size: Option<i64>,
    /// Comma-separated child IDs to leave out
    pub exclude_ids: Option<String>,
}

impl ChildRecommendationParams {
    fn into_query(self) -> AppResult<ChildQuery> {
        let exclude_ids = match self.exclude_ids.as_deref() {
            Some(raw) => parse_id_list(raw)?,
            None => Vec::new(),
        };

        Ok(ChildQuery {
            k: self.k,
            min_group_size: self.min_group_size,
            max_group_size: self.max_group_size,
            exclude_ids,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityParams {
    pub activity_type: Option<String>,
    pub k: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateInterestsRequest {
    pub interests: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateInterestsResponse {
    pub message: String,
    pub child: ChildSummary,
    pub profile_set_version: u64,
}

// Handlers

/// Health check endpoint
pub async fn health_check() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "status": "healthy" })))
}

/// Partner and playgroup recommendations for one child
pub async fn child_recommendations(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Path(child_id): Path<String>,
    Query(params): Query<ChildRecommendationParams>,
) -> AppResult<Json<ChildRecommendationResponse>> {
    tracing::info!(
        request_id = %request_id,
        child_id = %child_id,
        k = ?params.k,
        min_group_size = ?params.min_group_size,
        max_group_size = ?params.max_group_size,
        "Processing child recommendation request"
    );

    let query = params.into_query()?;
    // parameter errors take precedence over an unresolvable child
    query.validate()?;
    let child_id = parse_child_id(&child_id)?;
    let response = state
        .recommendations
        .recommend_for_child(child_id, query, today())
        .await?;

    Ok(Json(response))
}

/// Activity partners for one child
pub async fn activity_recommendations(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Path(child_id): Path<String>,
    Query(params): Query<ActivityParams>,
) -> AppResult<Json<ActivityRecommendationResponse>> {
    tracing::info!(
        request_id = %request_id,
        child_id = %child_id,
        activity_type = ?params.activity_type,
        k = ?params.k,
        "Processing activity recommendation request"
    );

    let query = ActivityQuery {
        activity_type: params.activity_type,
        k: params.k,
    };
    query.validate()?;
    let child_id = parse_child_id(&child_id)?;
    let response = state
        .recommendations
        .recommend_activity_partners(child_id, query, today())
        .await?;

    Ok(Json(response))
}

/// Every active child
pub async fn list_children(State(state): State<AppState>) -> AppResult<Json<Vec<ChildSummary>>> {
    let children = state.recommendations.active_children(today()).await?;
    Ok(Json(children))
}

/// The interest vocabulary and its categories
pub async fn available_interests(State(state): State<AppState>) -> Json<InterestCatalog> {
    Json(state.recommendations.interest_catalog())
}

/// Interest coverage and cache statistics
pub async fn stats(State(state): State<AppState>) -> AppResult<Json<RecommendationStats>> {
    Ok(Json(state.recommendations.stats().await?))
}

/// Replace a child's interests
pub async fn update_interests(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Path(child_id): Path<String>,
    Json(request): Json<UpdateInterestsRequest>,
) -> AppResult<Json<UpdateInterestsResponse>> {
    let interests = request
        .interests
        .iter()
        .map(|tag| tag.parse::<Interest>())
        .collect::<Result<BTreeSet<Interest>, _>>()
        .map_err(|e| AppError::validation("interests", e.to_string()))?;
    let child_id = parse_child_id(&child_id)?;

    let (profile, version) = state.profiles.update_interests(child_id, interests).await?;

    tracing::info!(
        request_id = %request_id,
        child_id = %child_id,
        version,
        "Interests updated"
    );

    Ok(Json(UpdateInterestsResponse {
        message: "Child interests updated successfully".to_string(),
        child: ChildSummary::from_profile(&profile, profile.age_in_months(today())),
        profile_set_version: version,
    }))
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

/// IDs that are not UUIDs cannot name any child
fn parse_child_id(raw: &str) -> AppResult<ChildId> {
    Uuid::parse_str(raw.trim()).map_err(|_| AppError::NotFound(format!("Child {} not found", raw)))
}

fn parse_id_list(raw: &str) -> AppResult<Vec<ChildId>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            Uuid::parse_str(s)
                .map_err(|_| AppError::validation("excludeIds", format!("'{}' is not a child ID", s)))
        })
        .collect()
}
