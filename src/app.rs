use axum::{
    Json, Router,
    extract::{Multipart, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::calculator::{CalcError, Evaluation};
use crate::config::Config;
use crate::cooling::{
    self, CapexEstimate, CapexInput, Comparison, CoolingError, CoolingType, OpexEstimate, OpexInput,
};
use crate::downloader;
use crate::leveling::{LevelError, LevelReport};
use crate::naming::NamingError;
use crate::parameter::{CalculationItem, Parameter};
use crate::saving;
use crate::solution::Solution;
use crate::validator;

pub struct AppState {
    solution: Mutex<Solution>,
    config: Config,
}

impl AppState {
    pub fn new(solution: Solution, config: Config) -> Arc<Self> {
        Arc::new(AppState {
            solution: Mutex::new(solution),
            config,
        })
    }

    fn solution(&self) -> Result<MutexGuard<'_, Solution>, ApiError> {
        self.solution
            .lock()
            .map_err(|_| ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "solution state is poisoned"))
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct StatusResponse {
    pub status: String,
    pub message: Option<String>,
}

impl StatusResponse {
    fn ok() -> Self {
        StatusResponse {
            status: "ok".to_string(),
            message: None,
        }
    }
}

/// Error returned by a handler, rendered as `{status: "error", message}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        ApiError {
            status,
            message: message.into(),
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        warn!("request failed ({}): {}", self.status, self.message);
        let body = StatusResponse {
            status: "error".to_string(),
            message: Some(self.message),
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<LevelError> for ApiError {
    fn from(e: LevelError) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, e.to_string())
    }
}

impl From<CalcError> for ApiError {
    fn from(e: CalcError) -> Self {
        match e {
            CalcError::UnknownTarget(_) => Self::new(StatusCode::NOT_FOUND, e.to_string()),
            _ => Self::new(StatusCode::UNPROCESSABLE_ENTITY, e.to_string()),
        }
    }
}

impl From<NamingError> for ApiError {
    fn from(e: NamingError) -> Self {
        let status = match e {
            NamingError::EmptyName => StatusCode::BAD_REQUEST,
            NamingError::UnknownParameter(_) => StatusCode::NOT_FOUND,
            NamingError::NameTaken(_) => StatusCode::CONFLICT,
        };
        Self::new(status, e.to_string())
    }
}

impl From<CoolingError> for ApiError {
    fn from(e: CoolingError) -> Self {
        Self::bad_request(e.to_string())
    }
}

impl From<std::io::Error> for ApiError {
    fn from(e: std::io::Error) -> Self {
        Self::internal(e.to_string())
    }
}

#[derive(Deserialize, Default)]
struct LevelsRequest {
    /// Levels these parameters instead of the stored solution.
    #[serde(default)]
    parameters: Option<Vec<Parameter>>,
}

#[derive(Deserialize)]
struct CalculateRequest {
    #[serde(default)]
    inputs: BTreeMap<String, f64>,
    #[serde(default)]
    target: Vec<String>,
}

#[derive(Serialize)]
struct CalculateResponse {
    status: String,
    results: BTreeMap<String, f64>,
    evaluation: Evaluation,
}

#[derive(Serialize)]
struct ValidateResponse {
    status: String,
    name: String,
    value: f64,
}

#[derive(Deserialize)]
struct RenameRequest {
    old_name: String,
    new_name: String,
}

#[derive(Deserialize)]
struct CapexRequest {
    cooling_type: String,
    #[serde(flatten)]
    input: CapexInput,
}

#[derive(Deserialize)]
struct OpexRequest {
    cooling_type: String,
    #[serde(flatten)]
    input: OpexInput,
}

#[derive(Deserialize)]
struct SaveQuery {
    filename: String,
}

/// Builds the API router over shared state.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/solution", get(get_solution).put(put_solution))
        .route("/api/levels", post(levels))
        .route("/api/calculate", post(calculate))
        .route("/api/validate", post(validate))
        .route("/api/rename", post(rename))
        .route("/api/cooling/capex", post(cooling_capex))
        .route("/api/cooling/compare", post(cooling_compare))
        .route("/api/cooling/opex", post(cooling_opex))
        .route("/api/save", post(save_solution))
        .route("/api/export", post(export_solution))
        .route("/api/load", post(load_solution))
        .route("/api/export/csv", get(export_csv))
        .route("/api/export/xlsx", get(export_xlsx))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn run(solution: Solution, config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let bind = format!("{}:{}", config.host, config.port);
    let app = router(AppState::new(solution, config));

    let listener = TcpListener::bind(&bind).await?;
    info!("listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}

async fn get_solution(State(state): State<Arc<AppState>>) -> Result<Json<Solution>, ApiError> {
    let solution = state.solution()?;
    Ok(Json(solution.clone()))
}

async fn put_solution(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<Solution>,
) -> Result<Json<StatusResponse>, ApiError> {
    // Reject definitions that cannot be leveled before replacing the stored one.
    payload.levels(&state.config.level_manager())?;

    let mut solution = state.solution()?;
    info!("replacing solution {} with {}", solution.id, payload.id);
    *solution = payload;
    Ok(Json(StatusResponse::ok()))
}

async fn levels(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<LevelsRequest>,
) -> Result<Json<LevelReport>, ApiError> {
    let manager = state.config.level_manager();
    let report = match payload.parameters {
        Some(parameters) => manager.level(parameters)?,
        None => state.solution()?.levels(&manager)?,
    };
    Ok(Json(report))
}

async fn calculate(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CalculateRequest>,
) -> Result<Json<CalculateResponse>, ApiError> {
    let evaluation = {
        let solution = state.solution()?;
        solution.evaluate(payload.inputs, &payload.target, &state.config.level_manager())?
    };
    let values = evaluation.targets(&payload.target)?;
    let results = payload.target.iter().cloned().zip(values).collect();

    Ok(Json(CalculateResponse {
        status: "ok".to_string(),
        results,
        evaluation,
    }))
}

async fn validate(
    State(state): State<Arc<AppState>>,
    Json(candidate): Json<CalculationItem>,
) -> Result<Json<ValidateResponse>, ApiError> {
    if !candidate.is_complete() {
        return Err(ApiError::bad_request("calculation needs a name and a formula"));
    }
    let solution = state.solution()?;
    let value = validator::validate(&solution.groups, &candidate, &state.config.level_manager())?;

    Ok(Json(ValidateResponse {
        status: "ok".to_string(),
        name: candidate.name,
        value,
    }))
}

async fn rename(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RenameRequest>,
) -> Result<Json<StatusResponse>, ApiError> {
    let mut solution = state.solution()?;
    solution.rename_parameter(&payload.old_name, &payload.new_name)?;
    Ok(Json(StatusResponse::ok()))
}

async fn cooling_capex(Json(payload): Json<CapexRequest>) -> Result<Json<CapexEstimate>, ApiError> {
    let cooling_type = CoolingType::from_name(&payload.cooling_type)?;
    Ok(Json(cooling::estimate_capex(cooling_type, &payload.input)?))
}

async fn cooling_compare(Json(payload): Json<CapexInput>) -> Result<Json<Comparison>, ApiError> {
    Ok(Json(cooling::compare(&payload)?))
}

async fn cooling_opex(Json(payload): Json<OpexRequest>) -> Result<Json<OpexEstimate>, ApiError> {
    let cooling_type = CoolingType::from_name(&payload.cooling_type)?;
    Ok(Json(cooling::estimate_opex(cooling_type, &payload.input)?))
}

async fn save_solution(
    Query(params): Query<SaveQuery>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<StatusResponse>, ApiError> {
    let path = state
        .config
        .snapshot_path(&params.filename)
        .ok_or_else(|| ApiError::bad_request(format!("invalid file name: {}", params.filename)))?;

    let mut solution = state.solution()?;
    saving::save_solution(&mut solution, &path)?;
    Ok(Json(StatusResponse {
        status: "ok".to_string(),
        message: Some(path.display().to_string()),
    }))
}

async fn export_solution(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let buffer = {
        let solution = state.solution()?;
        saving::serialize_to_memory(&solution)?
    };

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/gzip"),
            (header::CONTENT_DISPOSITION, "attachment; filename=\"solution.bin.gz\""),
        ],
        buffer,
    )
        .into_response())
}

async fn load_solution(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<StatusResponse>, ApiError> {
    let mut file_data = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(e.to_string()))?
    {
        if field.name() == Some("solution") {
            file_data = field
                .bytes()
                .await
                .map_err(|e| ApiError::bad_request(e.to_string()))?
                .to_vec();
        }
    }

    if file_data.is_empty() {
        return Err(ApiError::bad_request("No file data received"));
    }

    let loaded = saving::deserialize_from_memory(&file_data)
        .map_err(|e| ApiError::bad_request(format!("Failed to load solution: {}", e)))?;

    let mut solution = state.solution()?;
    info!("loaded solution {} ({})", loaded.id, loaded.name);
    *solution = loaded;
    Ok(Json(StatusResponse::ok()))
}

fn current_levels(state: &AppState) -> Result<LevelReport, ApiError> {
    let solution = state.solution()?;
    Ok(solution.levels(&state.config.level_manager())?)
}

async fn export_csv(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let report = current_levels(&state)?;
    let csv = downloader::to_csv(&report).map_err(|e| ApiError::internal(e.to_string()))?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/csv"),
            (header::CONTENT_DISPOSITION, "attachment; filename=\"parameters.csv\""),
        ],
        csv,
    )
        .into_response())
}

async fn export_xlsx(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let report = current_levels(&state)?;
    let xlsx = downloader::to_xlsx(&report).map_err(|e| ApiError::internal(e.to_string()))?;

    Ok((
        StatusCode::OK,
        [
            (
                header::CONTENT_TYPE,
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            ),
            (header::CONTENT_DISPOSITION, "attachment; filename=\"parameters.xlsx\""),
        ],
        xlsx,
    )
        .into_response())
}
