//! cardstock - sport trading-card collection catalogue server.

mod auth;
mod error;
mod images;
mod import;
mod schema;
mod search;
mod sheet_parser;
mod store;
mod template;

use axum::{
    extract::{DefaultBodyLimit, Path, State},
    http::header,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use auth::{AuthUser, JwtConfig};
use error::{ApiError, ApiResult};
use import::{ColumnMapping, ImportPolicy, ValidationResult};
use schema::{Card, Collection, NewCard, User, VocabEntry, VocabKind};
use search::{CardQuery, SearchOutcome, SearchStack, SEARCH_TIMEOUT};
use sheet_parser::{parse_sheet, ParsedSheet};
use store::Store;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub search: Arc<SearchStack>,
    pub jwt: JwtConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cardstock=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Backing services
    let store = Store::from_env(reqwest::Client::new())?;
    let jwt = JwtConfig::from_env()?;
    let search_client = reqwest::Client::builder().timeout(SEARCH_TIMEOUT).build()?;
    let search = Arc::new(SearchStack::from_env(search_client));

    let state = AppState { store, search, jwt };

    // Build router
    let app = Router::new()
        .route("/health", get(health))
        .route("/api/auth/me", get(me))
        .route("/api/collections", get(list_collections).post(create_collection))
        .route(
            "/api/collections/{id}",
            get(get_collection)
                .patch(update_collection)
                .delete(delete_collection),
        )
        .route("/api/collections/{id}/cards", get(list_cards))
        .route("/api/cards", post(create_card))
        .route("/api/cards/{id}", axum::routing::patch(update_card).delete(delete_card))
        .route("/api/vocab/{kind}", get(list_vocab).post(create_vocab))
        .route(
            "/api/vocab/{kind}/{id}",
            axum::routing::patch(rename_vocab).delete(delete_vocab),
        )
        .route("/api/cards/import/template", get(download_template))
        .route("/api/cards/import/parse", post(parse_upload))
        .route("/api/cards/import/validate", post(validate_upload))
        .route("/api/cards/import/run", post(run_import))
        .route("/api/cards/image-search", post(image_search))
        .route("/api/images/upload", post(upload_image))
        .layer(DefaultBodyLimit::max(25 * 1024 * 1024)) // 25MB
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    // Run server
    let addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server listening on http://{}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}

// ============================================================================
// Shared helpers
// ============================================================================

/// Fetch a collection and verify the caller owns it. Ownership is re-checked
/// on every access path, before any other work.
async fn owned_collection(
    state: &AppState,
    user: &AuthUser,
    collection_id: i64,
) -> Result<Collection, ApiError> {
    let collection = state
        .store
        .get_collection(collection_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Collection not found".into()))?;

    if collection.user_id != user.user_id {
        return Err(ApiError::Forbidden("Not your collection".into()));
    }
    Ok(collection)
}

fn decode_file(file_data: &str) -> Result<Vec<u8>, ApiError> {
    BASE64
        .decode(file_data)
        .map_err(|e| ApiError::BadRequest(format!("Invalid base64 file data: {}", e)))
}

/// Parse an upload, mapping structural failures to request errors.
fn parse_upload_bytes(file_name: &str, bytes: &[u8]) -> Result<ParsedSheet, ApiError> {
    parse_sheet(file_name, bytes).map_err(|e| ApiError::BadRequest(e.to_string()))
}

fn content_hash(bytes: &[u8]) -> String {
    Sha256::digest(bytes)
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

fn parse_vocab_kind(segment: &str) -> Result<VocabKind, ApiError> {
    VocabKind::from_str(segment)
        .ok_or_else(|| ApiError::NotFound(format!("Unknown vocabulary: {}", segment)))
}

// ============================================================================
// Health & session
// ============================================================================

/// Health check endpoint.
async fn health() -> &'static str {
    "ok"
}

async fn me(State(state): State<AppState>, user: AuthUser) -> ApiResult<Json<User>> {
    state
        .store
        .get_user(user.user_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("User not found".into()))
}

// ============================================================================
// Collections
// ============================================================================

async fn list_collections(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<Json<Vec<Collection>>> {
    Ok(Json(state.store.list_collections(user.user_id).await?))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateCollectionRequest {
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    category_id: Option<i64>,
}

async fn create_collection(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<CreateCollectionRequest>,
) -> ApiResult<Json<Collection>> {
    let name = req.name.trim();
    if name.is_empty() {
        return Err(ApiError::BadRequest("Name is required".into()));
    }

    let collection = state
        .store
        .create_collection(user.user_id, name, req.description.as_deref(), req.category_id)
        .await?;
    Ok(Json(collection))
}

async fn get_collection(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<Collection>> {
    Ok(Json(owned_collection(&state, &user, id).await?))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateCollectionRequest {
    name: Option<String>,
    description: Option<String>,
    category_id: Option<i64>,
}

async fn update_collection(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
    Json(req): Json<UpdateCollectionRequest>,
) -> ApiResult<Json<Value>> {
    owned_collection(&state, &user, id).await?;

    let mut set = serde_json::Map::new();
    if let Some(name) = &req.name {
        if name.trim().is_empty() {
            return Err(ApiError::BadRequest("Name is required".into()));
        }
        set.insert("name".into(), json!(name.trim()));
    }
    if let Some(description) = &req.description {
        set.insert("description".into(), json!(description));
    }
    if let Some(category_id) = req.category_id {
        set.insert("categoryId".into(), json!(category_id));
    }
    if set.is_empty() {
        return Err(ApiError::BadRequest("Nothing to update".into()));
    }

    state.store.update_collection(id, Value::Object(set)).await?;
    Ok(Json(json!({ "success": true })))
}

async fn delete_collection(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<Value>> {
    owned_collection(&state, &user, id).await?;
    state.store.delete_collection(id).await?;
    Ok(Json(json!({ "success": true })))
}

// ============================================================================
// Cards
// ============================================================================

async fn list_cards(
    State(state): State<AppState>,
    user: AuthUser,
    Path(collection_id): Path<i64>,
) -> ApiResult<Json<Vec<Card>>> {
    owned_collection(&state, &user, collection_id).await?;
    Ok(Json(state.store.list_cards(collection_id).await?))
}

async fn create_card(
    State(state): State<AppState>,
    user: AuthUser,
    Json(card): Json<NewCard>,
) -> ApiResult<Json<Card>> {
    owned_collection(&state, &user, card.collection_id).await?;

    for (value, label) in [
        (&card.player_name, "Player name"),
        (&card.season, "Season"),
        (&card.card_number, "Card number"),
    ] {
        if value.trim().is_empty() {
            return Err(ApiError::BadRequest(format!("{} is required", label)));
        }
    }

    Ok(Json(state.store.create_card(&card).await?))
}

/// Card columns a PATCH may touch. `collectionId` is deliberately absent:
/// cards never move between collections.
const UPDATABLE_CARD_FIELDS: &[&str] = &[
    "playerName",
    "teamId",
    "brandId",
    "seriesId",
    "insertId",
    "parallelId",
    "memorabilia",
    "season",
    "cardNumber",
    "autograph",
    "autographTypeId",
    "numbered",
    "numberedCurrent",
    "numberedOf",
    "gradingCompanyId",
    "grade",
    "frontImageUrl",
    "backImageUrl",
    "notes",
];

async fn update_card(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
    Json(body): Json<Value>,
) -> ApiResult<Json<Value>> {
    let card = state
        .store
        .get_card(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Card not found".into()))?;
    owned_collection(&state, &user, card.collection_id).await?;

    let body = body
        .as_object()
        .ok_or_else(|| ApiError::BadRequest("Expected a JSON object".into()))?;

    let mut set = serde_json::Map::new();
    for (key, value) in body {
        if !UPDATABLE_CARD_FIELDS.contains(&key.as_str()) {
            continue;
        }
        if matches!(key.as_str(), "playerName" | "season" | "cardNumber")
            && value.as_str().map(|s| s.trim().is_empty()).unwrap_or(false)
        {
            return Err(ApiError::BadRequest(format!("{} may not be empty", key)));
        }
        set.insert(key.clone(), value.clone());
    }
    if set.is_empty() {
        return Err(ApiError::BadRequest("Nothing to update".into()));
    }

    state.store.update_card(id, Value::Object(set)).await?;
    Ok(Json(json!({ "success": true })))
}

async fn delete_card(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<Value>> {
    let card = state
        .store
        .get_card(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Card not found".into()))?;
    owned_collection(&state, &user, card.collection_id).await?;

    state.store.delete_card(id).await?;
    Ok(Json(json!({ "success": true })))
}

// ============================================================================
// Reference vocabularies
// ============================================================================

async fn list_vocab(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(kind): Path<String>,
) -> ApiResult<Json<Vec<VocabEntry>>> {
    let kind = parse_vocab_kind(&kind)?;
    Ok(Json(state.store.list_vocab(kind).await?))
}

#[derive(Deserialize)]
struct VocabPayload {
    name: String,
}

async fn create_vocab(
    State(state): State<AppState>,
    user: AuthUser,
    Path(kind): Path<String>,
    Json(req): Json<VocabPayload>,
) -> ApiResult<Json<VocabEntry>> {
    user.require_admin()?;
    let kind = parse_vocab_kind(&kind)?;

    let name = req.name.trim();
    if name.is_empty() {
        return Err(ApiError::BadRequest("Name is required".into()));
    }

    // Names are unique case-insensitively; pre-check for a friendly error
    // (the schema's unique index is the hard guarantee).
    let existing = state.store.list_vocab(kind).await?;
    if existing
        .iter()
        .any(|e| e.name.to_lowercase() == name.to_lowercase())
    {
        return Err(ApiError::Unprocessable(format!(
            "A {} named \"{}\" already exists",
            kind.label(),
            name
        )));
    }

    Ok(Json(state.store.create_vocab(kind, name).await?))
}

async fn rename_vocab(
    State(state): State<AppState>,
    user: AuthUser,
    Path((kind, id)): Path<(String, i64)>,
    Json(req): Json<VocabPayload>,
) -> ApiResult<Json<Value>> {
    user.require_admin()?;
    let kind = parse_vocab_kind(&kind)?;

    let name = req.name.trim();
    if name.is_empty() {
        return Err(ApiError::BadRequest("Name is required".into()));
    }

    let existing = state.store.list_vocab(kind).await?;
    if !existing.iter().any(|e| e.id == id) {
        return Err(ApiError::NotFound(format!("{} not found", kind.label())));
    }
    if existing
        .iter()
        .any(|e| e.id != id && e.name.to_lowercase() == name.to_lowercase())
    {
        return Err(ApiError::Unprocessable(format!(
            "A {} named \"{}\" already exists",
            kind.label(),
            name
        )));
    }

    state.store.rename_vocab(kind, id, name).await?;
    Ok(Json(json!({ "success": true })))
}

async fn delete_vocab(
    State(state): State<AppState>,
    user: AuthUser,
    Path((kind, id)): Path<(String, i64)>,
) -> ApiResult<Json<Value>> {
    user.require_admin()?;
    let kind = parse_vocab_kind(&kind)?;
    state.store.delete_vocab(kind, id).await?;
    Ok(Json(json!({ "success": true })))
}

// ============================================================================
// Import wizard
// ============================================================================

const XLSX_MIME: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

async fn download_template(_user: AuthUser) -> ApiResult<impl IntoResponse> {
    let bytes = template::generate_template()?;
    Ok((
        [
            (header::CONTENT_TYPE, XLSX_MIME.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", template::TEMPLATE_FILENAME),
            ),
        ],
        bytes,
    ))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ParseRequest {
    file_name: String,
    file_data: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ParseResponse {
    headers: Vec<String>,
    row_count: usize,
    auto_mappings: Vec<ColumnMapping>,
    content_hash: String,
}

async fn parse_upload(
    State(_state): State<AppState>,
    _user: AuthUser,
    Json(req): Json<ParseRequest>,
) -> ApiResult<Json<ParseResponse>> {
    let bytes = decode_file(&req.file_data)?;
    let sheet = parse_upload_bytes(&req.file_name, &bytes)?;

    info!(
        "Parsed upload {} ({} bytes): {} columns, {} rows",
        req.file_name,
        bytes.len(),
        sheet.headers.len(),
        sheet.rows.len()
    );

    let auto_mappings = import::auto_match_columns(&sheet.headers);

    Ok(Json(ParseResponse {
        row_count: sheet.rows.len(),
        headers: sheet.headers,
        auto_mappings,
        content_hash: content_hash(&bytes),
    }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ValidateRequest {
    file_name: String,
    file_data: String,
    mappings: Vec<ColumnMapping>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ValidateResponse {
    content_hash: String,
    #[serde(flatten)]
    result: ValidationResult,
}

async fn validate_upload(
    State(state): State<AppState>,
    _user: AuthUser,
    Json(req): Json<ValidateRequest>,
) -> ApiResult<Json<ValidateResponse>> {
    let bytes = decode_file(&req.file_data)?;
    let sheet = parse_upload_bytes(&req.file_name, &bytes)?;

    // Fresh vocabulary snapshot per call; the result is advisory, not a
    // commit guarantee (an admin may edit vocabularies before the import).
    let refs = state.store.load_reference_sets().await?;
    let result = import::validate_rows(&sheet.rows, &req.mappings, &refs);

    info!(
        "Validated {}: valid={}, {} errors",
        req.file_name,
        result.valid,
        result.errors.len()
    );

    Ok(Json(ValidateResponse {
        content_hash: content_hash(&bytes),
        result,
    }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImportRequest {
    collection_id: i64,
    file_name: String,
    file_data: String,
    mappings: Vec<ColumnMapping>,
    #[serde(default)]
    policy: ImportPolicy,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ImportResponse {
    imported_count: usize,
}

async fn run_import(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<ImportRequest>,
) -> ApiResult<Json<ImportResponse>> {
    // Ownership is rejected before any parsing work begins
    owned_collection(&state, &user, req.collection_id).await?;

    let bytes = decode_file(&req.file_data)?;
    let sheet = parse_upload_bytes(&req.file_name, &bytes)?;

    let ids = state.store.load_reference_ids().await?;
    let cards = import::build_card_rows(req.collection_id, &sheet.rows, &req.mappings, &ids, req.policy)
        .map_err(|e| ApiError::Unprocessable(e.to_string()))?;

    let imported_count = state.store.insert_cards(&cards).await?;
    info!(
        "Imported {} cards into collection {}",
        imported_count, req.collection_id
    );

    Ok(Json(ImportResponse { imported_count }))
}

// ============================================================================
// Image search & upload
// ============================================================================

async fn image_search(
    State(state): State<AppState>,
    _user: AuthUser,
    Json(card): Json<CardQuery>,
) -> ApiResult<Json<SearchOutcome>> {
    if card.player_name.trim().is_empty() {
        return Err(ApiError::BadRequest("Player name is required".into()));
    }
    Ok(Json(state.search.search_card_images(&card).await))
}

#[derive(Deserialize)]
struct UploadImageRequest {
    image: String,
    filename: String,
}

#[derive(Serialize)]
struct UploadImageResponse {
    url: String,
}

async fn upload_image(
    State(state): State<AppState>,
    _user: AuthUser,
    Json(req): Json<UploadImageRequest>,
) -> ApiResult<Json<UploadImageResponse>> {
    let image = images::decode_data_url(&req.image).map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let key = images::object_key(&image);

    info!(
        "Uploading image {} as {} ({} bytes)",
        req.filename,
        key,
        image.bytes.len()
    );

    let url = state
        .store
        .upload_object(&key, image.bytes, image.content_type)
        .await?;
    Ok(Json(UploadImageResponse { url }))
}
