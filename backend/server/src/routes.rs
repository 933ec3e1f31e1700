use std::sync::Arc;

use axum::{
    Json,
    extract::{Query, State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};
use bank::similarity::{find_nearest_neighbors, rank_by_similarity};
use chrono::Utc;
use tracing::debug;

use crate::{
    database::list_proposals,
    error::AppError,
    gateway::submit,
    payloads::{
        NeighborsQuery, ProposalMode, ProposalsQuery, SimilarModel, SimilarQuery, SubmitRequest,
        VerifyQuery, VerifyResponse,
    },
    state::State as AppState,
    workflow::verify,
};

const DEFAULT_NEIGHBORS: usize = 10;

pub async fn submit_handler(
    State(state): State<Arc<AppState>>,
    request: Result<Json<SubmitRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(request) = request.map_err(|e| {
        debug!("Rejected submission body: {e}");
        AppError::MalformedPayload
    })?;

    let receipt = submit(&state, &request.email, request.payload).await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

pub async fn verify_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<VerifyQuery>,
) -> Result<impl IntoResponse, AppError> {
    let token = query
        .token
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::Validation("Missing verification token".to_string()))?;

    let ttl = state.config.verification_ttl();
    let outcome = state
        .db
        .call(move |conn| verify(conn, &token, ttl, Utc::now()))
        .await?;

    Ok(Json(VerifyResponse {
        success: true,
        message: outcome.message,
        results: outcome.results,
    }))
}

pub async fn proposals_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ProposalsQuery>,
) -> Result<impl IntoResponse, AppError> {
    let mode = query
        .mode
        .filter(|m| !m.trim().is_empty())
        .map(|m| m.parse::<ProposalMode>())
        .transpose()
        .map_err(AppError::Validation)?;

    let proposals = state.db.call(move |conn| list_proposals(conn, mode)).await?;
    Ok(Json(proposals))
}

pub async fn similar_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SimilarQuery>,
) -> Result<impl IntoResponse, AppError> {
    if state.store.get(&query.id).is_none() {
        return Err(AppError::NotFound(format!("Unknown model {}", query.id)));
    }

    let candidates: Option<Vec<String>> = query.candidates.map(|list| {
        list.split(',')
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .collect()
    });

    let mut ranked = rank_by_similarity(&state.store, &query.id, candidates.as_deref());
    if let Some(limit) = query.limit {
        ranked.truncate(limit);
    }

    let similar: Vec<SimilarModel> = ranked
        .into_iter()
        .map(|ranked| SimilarModel {
            similarity: state.scale.percent(ranked.distance),
            ranked,
        })
        .collect();

    Ok(Json(serde_json::to_value(similar).map_err(|e| AppError::InternalError(e.to_string()))?))
}

pub async fn neighbors_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<NeighborsQuery>,
) -> Result<impl IntoResponse, AppError> {
    if state.store.get(&query.id).is_none() {
        return Err(AppError::NotFound(format!("Unknown model {}", query.id)));
    }

    let neighbors: Vec<SimilarModel> =
        find_nearest_neighbors(&state.store, &query.id, query.k.unwrap_or(DEFAULT_NEIGHBORS))
            .into_iter()
            .map(|ranked| SimilarModel {
                similarity: state.scale.percent(ranked.distance),
                ranked,
            })
            .collect();

    Ok(Json(serde_json::to_value(neighbors).map_err(|e| AppError::InternalError(e.to_string()))?))
}

pub async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
