//! HTTP API handlers for the registrar.

pub mod error;

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use registrar_catalog::{CatalogError, Controller, Service, MAX_PER_PAGE};
use serde::{Deserialize, Serialize};

use self::error::ApiError;

/// Shared application state.
pub struct AppState {
    pub controller: Arc<Controller>,
    /// Catalog identifier reported in collection responses.
    pub id: String,
    pub description: String,
}

/// Creates the API router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/", get(list_services).post(create_service))
        .route(
            "/{id}",
            get(get_service).put(put_service).delete(delete_service),
        )
        .route("/{path}/{op}/{*value}", get(filter_services))
        .with_state(state)
}

async fn health_check() -> impl IntoResponse {
    Json(HealthResponse { status: "healthy" })
}

/// List registrations page by page.
async fn list_services(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PageQuery>,
) -> Result<Json<CollectionResponse>, ApiError> {
    let (page, per_page) = query.parse()?;
    let (services, total) = state.controller.list(page, per_page).await?;
    Ok(Json(CollectionResponse::new(
        &state, services, page, per_page, total,
    )))
}

/// Register a new service.
async fn create_service(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let service = parse_service(&body)?;
    let created = state.controller.add(service).await?;
    Ok(created_response(created))
}

async fn get_service(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Service>, ApiError> {
    Ok(Json(state.controller.get(&id).await?))
}

/// Update a registration, creating it under `id` if it does not exist.
async fn put_service(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let service = parse_service(&body)?;

    match state.controller.update(&id, service.clone()).await {
        Ok(updated) => Ok(Json(updated).into_response()),
        Err(CatalogError::NotFound(_)) => {
            let created = state.controller.add(service.with_id(id)).await?;
            Ok(created_response(created))
        }
        Err(e) => Err(e.into()),
    }
}

async fn delete_service(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.controller.delete(&id).await?;
    Ok(StatusCode::OK)
}

/// Filter registrations by an attribute, e.g. `GET /type/equals/_mqtt._tcp`.
async fn filter_services(
    State(state): State<Arc<AppState>>,
    Path((path, op, value)): Path<(String, String, String)>,
    Query(query): Query<PageQuery>,
) -> Result<Json<CollectionResponse>, ApiError> {
    let (page, per_page) = query.parse()?;
    let (services, total) = state
        .controller
        .filter(&path, &op, &value, page, per_page)
        .await?;
    Ok(Json(CollectionResponse::new(
        &state, services, page, per_page, total,
    )))
}

fn parse_service(body: &[u8]) -> Result<Service, ApiError> {
    serde_json::from_slice(body)
        .map_err(|e| ApiError::bad_request(format!("error parsing request body: {e}")))
}

fn created_response(service: Service) -> Response {
    let location = format!("/{}", service.id);
    (
        StatusCode::CREATED,
        [(header::LOCATION, location)],
        Json(service),
    )
        .into_response()
}

// Request and response types

/// Paging query parameters. Parsed by hand so that malformed numbers
/// produce the standard error body.
#[derive(Debug, Default, Deserialize)]
struct PageQuery {
    page: Option<String>,
    per_page: Option<String>,
}

impl PageQuery {
    fn parse(&self) -> Result<(usize, usize), ApiError> {
        let page = parse_positive("page", self.page.as_deref(), 1)?;
        let per_page = parse_positive("per_page", self.per_page.as_deref(), MAX_PER_PAGE)?;
        Ok((page, per_page.min(MAX_PER_PAGE)))
    }
}

fn parse_positive(name: &str, raw: Option<&str>, default: usize) -> Result<usize, ApiError> {
    let Some(raw) = raw else {
        return Ok(default);
    };
    match raw.parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ApiError::bad_request(format!(
            "{name} must be a positive integer, got {raw:?}"
        ))),
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

/// One page of registrations.
#[derive(Debug, Serialize, Deserialize)]
pub struct CollectionResponse {
    pub id: String,
    pub description: String,
    pub services: Vec<Service>,
    pub page: usize,
    pub per_page: usize,
    pub total: usize,
}

impl CollectionResponse {
    fn new(
        state: &AppState,
        services: Vec<Service>,
        page: usize,
        per_page: usize,
        total: usize,
    ) -> Self {
        Self {
            id: state.id.clone(),
            description: state.description.clone(),
            services,
            page,
            per_page,
            total,
        }
    }
}
