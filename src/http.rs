//! HTTP transport for both agents
//!
//! Axum router with permissive CORS. Every response is JSON; failures carry an
//! `error` label and a human-readable `message`, plus `details` in debug mode.

use std::path::Path;
use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{DefaultBodyLimit, Multipart, State, multipart::MultipartError},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::Local;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};

use crate::clients::{GeminiBackend, ModelBackend, ModelClient, OcrEngine, TesseractCli};
use crate::config::Config;
use crate::deserializers::de_option_f64_forgiving;
use crate::error::{EcoAgentError, Result};
use crate::footprint::{FootprintInput, FootprintPipeline, PipelineReport, StageFailure};
use crate::solar::{ApplianceTable, SolarEnergyAgent, SolarSettings};

pub const API_VERSION: &str = "1.0.0";
const ALLOWED_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "webp"];
const DEFAULT_SIM_SOLAR: f64 = 0.0;
const DEFAULT_SIM_BATTERY: f64 = 50.0;
pub const UPLOAD_PREFIX: &str = "eco-upload-";

/// Shared state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    client: ModelClient,
    /// Process-wide energy agent. Locked only to log readings or swap settings,
    /// never across a model call; configuration updates are last-writer-wins.
    solar: Arc<Mutex<SolarEnergyAgent>>,
    footprint: Arc<FootprintPipeline>,
}

impl AppState {
    pub fn new(config: Config, backend: Arc<dyn ModelBackend>, ocr: Arc<dyn OcrEngine>) -> Self {
        let client = ModelClient::new(backend, config.model.candidates.clone());
        let solar = SolarEnergyAgent::new(client.clone(), config.solar.clone());
        let footprint = FootprintPipeline::new(client.clone(), &config.model.vision_model, ocr);
        Self {
            config: Arc::new(config),
            client,
            solar: Arc::new(Mutex::new(solar)),
            footprint: Arc::new(footprint),
        }
    }

    /// Gemini over HTTPS plus the tesseract CLI
    pub fn from_config(config: Config) -> anyhow::Result<Self> {
        let backend = GeminiBackend::from_config(&config.model)?;
        let ocr = TesseractCli::from_config(&config.ocr);
        Ok(Self::new(config, Arc::new(backend), Arc::new(ocr)))
    }

    fn new_agent(&self, settings: SolarSettings) -> SolarEnergyAgent {
        SolarEnergyAgent::new(self.client.clone(), settings)
    }
}

/// JSON error response
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: Value,
}

impl ApiError {
    fn new(status: StatusCode, error: &str, message: impl Into<String>) -> Self {
        Self {
            status,
            body: json!({
                "success": false,
                "error": error,
                "message": message.into(),
            }),
        }
    }

    fn bad_request(error: &str, message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, error, message)
    }

    fn from_error(err: &EcoAgentError, debug: bool) -> Self {
        let status = match err {
            EcoAgentError::InvalidParams { .. }
            | EcoAgentError::Validation { .. }
            | EcoAgentError::Parse { .. } => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        tracing::error!("Request failed: {}", err);
        let mut api = Self::new(status, err.label(), err.to_string());
        if debug && let Value::Object(map) = &mut api.body {
            map.insert("details".into(), Value::String(format!("{:?}", err)));
        }
        api
    }

    fn stage_failure(failure: &StageFailure, error: &str) -> Self {
        let mut api = Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            error,
            failure.message.clone(),
        );
        if let Value::Object(map) = &mut api.body {
            map.insert("stage".into(), Value::String(failure.label()));
        }
        api
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

type ApiResult = std::result::Result<Json<Value>, ApiError>;

fn timestamp() -> String {
    Local::now().to_rfc3339()
}

/// Health check endpoint
pub async fn health_handler() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "message": "Eco Agents API is running",
        "version": API_VERSION,
    }))
}

#[derive(Debug, Deserialize)]
struct SolarConfigBody {
    #[serde(default, deserialize_with = "de_option_f64_forgiving")]
    battery_capacity: Option<f64>,
    #[serde(default)]
    appliances: Option<ApplianceTable>,
}

impl SolarConfigBody {
    fn is_empty(&self) -> bool {
        self.battery_capacity.is_none() && self.appliances.is_none()
    }

    /// Missing pieces are taken from `base`; an empty appliance map counts as missing
    fn settings_over(&self, base: &SolarSettings) -> Result<SolarSettings> {
        let battery_capacity_wh = self.battery_capacity.unwrap_or(base.battery_capacity_wh);
        if battery_capacity_wh <= 0.0 {
            return Err(EcoAgentError::InvalidParams {
                message: format!("battery_capacity must be > 0, got {}", battery_capacity_wh),
            });
        }
        let appliances = match &self.appliances {
            Some(table) if !table.is_empty() => table.clone(),
            _ => base.appliances.clone(),
        };
        Ok(SolarSettings {
            battery_capacity_wh,
            appliances,
        })
    }
}

#[derive(Debug, Deserialize)]
struct AnalyzeBody {
    #[serde(default, deserialize_with = "de_option_f64_forgiving")]
    solar_production: Option<f64>,
    #[serde(default, deserialize_with = "de_option_f64_forgiving")]
    battery_percentage: Option<f64>,
    #[serde(flatten)]
    config: SolarConfigBody,
}

#[derive(Debug, Deserialize)]
struct SimulationPoint {
    #[serde(default, deserialize_with = "de_option_f64_forgiving")]
    solar: Option<f64>,
    #[serde(default, deserialize_with = "de_option_f64_forgiving")]
    battery: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct SimulateBody {
    #[serde(default)]
    simulation_data: Vec<SimulationPoint>,
    #[serde(flatten)]
    config: SolarConfigBody,
}

/// Bodies are parsed from raw bytes so appliance maps keep their document order
fn parse_body<T: DeserializeOwned>(
    body: &Bytes,
    debug: bool,
) -> std::result::Result<T, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(ApiError::bad_request(
            "No JSON data provided",
            "Request body must be a JSON object",
        ));
    }
    serde_json::from_slice(body).map_err(|e| ApiError::from_error(&e.into(), debug))
}

/// Analyze current solar state; request-level battery/appliance settings replace the shared configuration
pub async fn solar_analyze_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult {
    let body: AnalyzeBody = parse_body(&body, state.config.server.debug)?;
    let (Some(solar), Some(battery)) = (body.solar_production, body.battery_percentage) else {
        return Err(ApiError::bad_request(
            "Missing required fields",
            "Missing required fields: solar_production and battery_percentage",
        ));
    };

    let mut agent = state.solar.lock().await;
    if !body.config.is_empty() {
        let settings = body
            .config
            .settings_over(&agent.settings())
            .map_err(|e| ApiError::from_error(&e, state.config.server.debug))?;
        *agent = state.new_agent(settings);
    }
    let pending = agent.record_reading(solar, battery);
    let capacity = agent.settings().battery_capacity_wh;
    // The model call runs unlocked so config reads and other analyses are not blocked.
    drop(agent);
    let advice = pending.resolve().await;

    Ok(Json(json!({
        "success": true,
        "timestamp": timestamp(),
        "input": {
            "solar_production_watts": solar,
            "battery_percentage": battery,
            "battery_capacity_wh": capacity,
        },
        "management_plan": advice.plan,
        "plan_source": advice.source,
    })))
}

/// Run a multi-point simulation on a fresh agent; the shared agent is untouched
pub async fn solar_simulate_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult {
    let body: SimulateBody = parse_body(&body, state.config.server.debug)?;
    if body.simulation_data.is_empty() {
        return Err(ApiError::bad_request(
            "No simulation data provided",
            "simulation_data must contain at least one point",
        ));
    }

    let base = state.solar.lock().await.settings();
    let settings = body
        .config
        .settings_over(&base)
        .map_err(|e| ApiError::from_error(&e, state.config.server.debug))?;
    let mut agent = state.new_agent(settings.clone());

    let mut results = Vec::with_capacity(body.simulation_data.len());
    for (idx, point) in body.simulation_data.iter().enumerate() {
        let solar = point.solar.unwrap_or(DEFAULT_SIM_SOLAR);
        let battery = point.battery.unwrap_or(DEFAULT_SIM_BATTERY);
        let advice = agent.track_and_advise(solar, battery).await;
        results.push(json!({
            "step": idx + 1,
            "input": {
                "solar_production_watts": solar,
                "battery_percentage": battery,
            },
            "management_plan": advice.plan,
        }));
    }

    Ok(Json(json!({
        "success": true,
        "timestamp": timestamp(),
        "configuration": {
            "battery_capacity_wh": settings.battery_capacity_wh,
            "appliances": settings.appliances,
        },
        "simulation_results": results,
    })))
}

pub async fn solar_config_get_handler(State(state): State<AppState>) -> Json<Value> {
    let agent = state.solar.lock().await;
    let settings = agent.settings();
    Json(json!({
        "success": true,
        "configuration": {
            "battery_capacity_wh": settings.battery_capacity_wh,
            "appliances": settings.appliances,
            "energy_log_count": agent.energy_log().len(),
        },
    }))
}

/// Replace the shared configuration; omitted fields reset to defaults and the energy log starts over
pub async fn solar_config_post_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult {
    let body: SolarConfigBody = parse_body(&body, state.config.server.debug)?;
    let settings = body
        .settings_over(&SolarSettings::default())
        .map_err(|e| ApiError::from_error(&e, state.config.server.debug))?;

    *state.solar.lock().await = state.new_agent(settings.clone());
    tracing::info!(
        "Solar configuration replaced ({} Wh, {} appliances)",
        settings.battery_capacity_wh,
        settings.appliances.len()
    );

    Ok(Json(json!({
        "success": true,
        "message": "Configuration updated successfully",
        "configuration": {
            "battery_capacity_wh": settings.battery_capacity_wh,
            "appliances": settings.appliances,
        },
    })))
}

/// Reduce a client-supplied name to a safe basename
pub fn secure_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    cleaned.trim_start_matches('.').to_string()
}

fn allowed_extension(filename: &str) -> Option<String> {
    let ext = Path::new(filename)
        .extension()?
        .to_str()?
        .to_ascii_lowercase();
    ALLOWED_EXTENSIONS.contains(&ext.as_str()).then_some(ext)
}

fn too_large(max_bytes: usize) -> ApiError {
    ApiError::new(
        StatusCode::PAYLOAD_TOO_LARGE,
        "File too large",
        format!("Maximum file size is {}MB", max_bytes.div_ceil(1024 * 1024)),
    )
}

fn multipart_error(err: MultipartError, max_bytes: usize) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        too_large(max_bytes)
    } else {
        ApiError::bad_request("Invalid upload", err.body_text())
    }
}

fn with_metadata(report: PipelineReport, filename: &str, test_mode: bool) -> Value {
    let mut map: Map<String, Value> = report.into_map();
    let mut metadata = json!({
        "filename": filename,
        "analysis_timestamp": timestamp(),
        "api_version": API_VERSION,
    });
    if test_mode && let Value::Object(m) = &mut metadata {
        m.insert("test_mode".into(), Value::Bool(true));
    }
    map.insert("metadata".into(), metadata);
    Value::Object(map)
}

/// Carbon footprint analysis of an uploaded image (multipart field `image`)
pub async fn analyze_handler(
    State(state): State<AppState>,
    multipart: std::result::Result<Multipart, axum::extract::multipart::MultipartRejection>,
) -> ApiResult {
    let max_bytes = state.config.server.max_upload_bytes;
    let Ok(mut multipart) = multipart else {
        return Err(ApiError::bad_request(
            "No image file provided",
            "Please upload an image file",
        ));
    };

    let mut upload: Option<(String, Bytes)> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, max_bytes))?
    {
        if field.name() != Some("image") {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let bytes = field.bytes().await.map_err(|e| multipart_error(e, max_bytes))?;
        upload = Some((filename, bytes));
        break;
    }

    let Some((raw_name, bytes)) = upload else {
        return Err(ApiError::bad_request(
            "No image file provided",
            "Please upload an image file",
        ));
    };
    if raw_name.trim().is_empty() {
        return Err(ApiError::bad_request(
            "No file selected",
            "Please select a file to upload",
        ));
    }
    if bytes.len() > max_bytes {
        return Err(too_large(max_bytes));
    }
    let filename = secure_filename(&raw_name);
    let Some(ext) = allowed_extension(&filename) else {
        return Err(ApiError::bad_request(
            "Invalid file type",
            format!(
                "Please upload files with extensions: {}",
                ALLOWED_EXTENSIONS.join(", ")
            ),
        ));
    };

    // Removed on drop, whichever way the analysis ends.
    let suffix = format!(".{}", ext);
    let mut builder = tempfile::Builder::new();
    builder.prefix(UPLOAD_PREFIX).suffix(&suffix);
    let temp = match &state.config.server.upload_dir {
        Some(dir) => builder.tempfile_in(dir),
        None => builder.tempfile(),
    }
    .map_err(|e| ApiError::from_error(&e.into(), state.config.server.debug))?;
    tokio::fs::write(temp.path(), &bytes)
        .await
        .map_err(|e| ApiError::from_error(&e.into(), state.config.server.debug))?;

    tracing::info!("Starting analysis for: {}", filename);
    let report = state
        .footprint
        .run(&FootprintInput::Image(temp.path().to_path_buf()))
        .await
        .map_err(|f| ApiError::stage_failure(&f, "Analysis failed"))?;
    tracing::info!("Analysis completed for: {}", filename);

    Ok(Json(with_metadata(report, &filename, false)))
}

/// Run the footprint pipeline on the configured sample image
pub async fn test_handler(State(state): State<AppState>) -> ApiResult {
    let sample = Path::new(&state.config.server.sample_image);
    if !sample.is_file() {
        return Err(ApiError::new(
            StatusCode::NOT_FOUND,
            "Sample image not found",
            format!("{} not found", sample.display()),
        ));
    }
    let filename = sample
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    let report = state
        .footprint
        .run(&FootprintInput::Image(sample.to_path_buf()))
        .await
        .map_err(|f| ApiError::stage_failure(&f, "Test analysis failed"))?;

    Ok(Json(with_metadata(report, &filename, true)))
}

pub async fn not_found_handler() -> ApiError {
    ApiError::new(
        StatusCode::NOT_FOUND,
        "Endpoint not found",
        "The requested API endpoint does not exist",
    )
}

pub fn router(state: AppState) -> Router {
    let max_upload = state.config.server.max_upload_bytes;
    Router::new()
        .route("/api/health", get(health_handler))
        .route("/api/solar/analyze", post(solar_analyze_handler))
        .route("/api/solar/simulate", post(solar_simulate_handler))
        .route(
            "/api/solar/config",
            get(solar_config_get_handler).post(solar_config_post_handler),
        )
        .route(
            "/api/analyze",
            // Multipart framing overhead on top of the file itself
            post(analyze_handler).layer(DefaultBodyLimit::max(max_upload + 64 * 1024)),
        )
        .route("/api/test", post(test_handler))
        .fallback(not_found_handler)
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .with_state(state)
}

/// Start the HTTP server
pub async fn start_http_server(config: Config) -> anyhow::Result<()> {
    let bind = config.server.bind.clone();
    let state = AppState::from_config(config)?;
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind HTTP listener: {}", e))?;

    tracing::info!("Starting HTTP server on {}", bind);
    tracing::info!("  GET  /api/health          - Health check");
    tracing::info!("  POST /api/solar/analyze   - Analyze current solar state");
    tracing::info!("  POST /api/solar/simulate  - Run multi-point simulation");
    tracing::info!("  GET/POST /api/solar/config - Read or replace configuration");
    tracing::info!("  POST /api/analyze         - Carbon footprint of an uploaded image");
    tracing::info!("  POST /api/test            - Carbon footprint of the sample image");

    axum::serve(listener, app)
        .await
        .map_err(|e| anyhow::anyhow!("HTTP server error: {}", e))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filenames_are_reduced_to_safe_basenames() {
        assert_eq!(secure_filename("../../etc/passwd"), "passwd");
        assert_eq!(secure_filename("C:\\Users\\me\\chips bag.PNG"), "chips_bag.PNG");
        assert_eq!(secure_filename(".hidden.jpg"), "hidden.jpg");
    }

    #[test]
    fn only_image_extensions_are_allowed() {
        assert_eq!(allowed_extension("a.PNG").as_deref(), Some("png"));
        assert_eq!(allowed_extension("a.webp").as_deref(), Some("webp"));
        assert!(allowed_extension("a.gif").is_none());
        assert!(allowed_extension("noext").is_none());
    }

    #[test]
    fn empty_appliance_map_keeps_base_table() {
        let body: SolarConfigBody =
            serde_json::from_value(json!({"battery_capacity": "5000", "appliances": {}})).unwrap();
        let settings = body.settings_over(&SolarSettings::default()).unwrap();
        assert_eq!(settings.battery_capacity_wh, 5000.0);
        assert_eq!(settings.appliances.len(), 6);
    }

    #[test]
    fn non_positive_capacity_is_rejected() {
        let body: SolarConfigBody =
            serde_json::from_value(json!({"battery_capacity": 0})).unwrap();
        assert!(body.settings_over(&SolarSettings::default()).is_err());
    }
}
