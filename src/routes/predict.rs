use crate::{error::PredictionError, model_service::ModelService, server::SharedState};
use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::instrument;

const ROUTE: &str = "/predict/";

#[derive(Deserialize, Serialize)]
pub struct ImageRequest {
    pub image: String,
}

#[derive(Deserialize, Serialize)]
pub struct PredictionResponse {
    pub prediction: usize,
}

#[instrument(skip(state, request))]
pub async fn predict<M: ModelService>(
    State(state): State<SharedState<M>>,
    Json(request): Json<ImageRequest>,
) -> Result<Json<PredictionResponse>, PredictionError> {
    tracing::info!("Prediction endpoint was accessed");
    state.metrics.record_request(ROUTE);

    let start = Instant::now();
    let result = state.inference_service.predict(request.image).await;
    state
        .metrics
        .record_prediction_duration(start.elapsed().as_millis() as u64, ROUTE);
    state.metrics.record_prediction(result.is_ok());

    let prediction = result?;
    Ok(Json(PredictionResponse { prediction }))
}
