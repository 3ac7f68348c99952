// src/handlers/medicines_cache.rs

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use utoipa::ToSchema;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::{
    common::error::{field_error, ApiError, AppError},
    config::AppState,
    handlers::validate_not_blank,
    middleware::{
        i18n::Locale,
        rbac::{PermStockRead, PermStockWrite, RequirePermission},
    },
    models::stock::{
        CacheFilter, CacheMetadataUpdate, MedicineCache, NewCacheEntry, ProductStock,
        ReconciliationReport,
    },
};

fn validate_price(value: &Decimal) -> Result<(), ValidationError> {
    if value.is_sign_negative() {
        return Err(field_error("range", "validation.price_not_negative"));
    }
    Ok(())
}

// ---
// Payload: CreateCacheEntry (cadastro inicial do lote)
// ---
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateCacheEntryPayload {
    #[validate(
        custom(function = "validate_not_blank"),
        length(max = 64, message = "validation.too_long")
    )]
    #[serde(default)]
    #[schema(example = "MED001")]
    pub product_id: String,

    #[validate(
        custom(function = "validate_not_blank"),
        length(max = 64, message = "validation.too_long")
    )]
    #[serde(default)]
    #[schema(example = "B1")]
    pub batch_no: String,

    #[validate(range(min = 0, message = "validation.quantity_not_negative"))]
    #[serde(default)]
    pub current_quantity: i64,

    #[validate(custom(function = "validate_price"))]
    #[serde(default)]
    #[schema(value_type = f64, example = 12.5)]
    pub product_price: Decimal,

    pub manufacture_date: Option<NaiveDate>,
    #[serde(alias = "expiry_date")]
    pub expire_date: Option<NaiveDate>,
}

// ---
// Payload: UpdateCacheEntry (preço e datas; saldo só muda pelo livro-razão)
// ---
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateCacheEntryPayload {
    #[schema(value_type = Option<f64>, example = 12.5)]
    pub product_price: Option<Decimal>,
    pub manufacture_date: Option<NaiveDate>,
    #[serde(alias = "expiry_date")]
    pub expire_date: Option<NaiveDate>,

    /// Versão lida pelo cliente (controle de concorrência otimista)
    #[validate(required(message = "validation.required"))]
    pub version: Option<i64>,
}

impl UpdateCacheEntryPayload {
    fn check(&self) -> Result<(), AppError> {
        let mut errors = self.validate().err().unwrap_or_else(ValidationErrors::new);
        if self.product_price.is_some_and(|p| p.is_sign_negative()) {
            errors.add("product_price", field_error("range", "validation.price_not_negative"));
        }
        if errors.is_empty() { Ok(()) } else { Err(AppError::ValidationError(errors)) }
    }
}

#[utoipa::path(
    get,
    path = "/api/medicines-cache",
    tag = "Medicines Cache",
    params(CacheFilter),
    responses(
        (status = 200, description = "Saldos por lote", body = Vec<MedicineCache>)
    ),
    security(("api_jwt" = []))
)]
pub async fn list_cache(
    State(app_state): State<AppState>,
    locale: Locale,
    _guard: RequirePermission<PermStockRead>,
    Query(filter): Query<CacheFilter>,
) -> Result<impl IntoResponse, ApiError> {
    let rows = app_state
        .medicines_cache_service
        .list(&filter)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok(Json(rows))
}

#[utoipa::path(
    post,
    path = "/api/medicines-cache",
    tag = "Medicines Cache",
    request_body = CreateCacheEntryPayload,
    responses(
        (status = 201, description = "Lote registrado", body = MedicineCache),
        (status = 409, description = "Lote já registrado")
    ),
    security(("api_jwt" = []))
)]
pub async fn create_cache_entry(
    State(app_state): State<AppState>,
    locale: Locale,
    _guard: RequirePermission<PermStockWrite>,
    Json(payload): Json<CreateCacheEntryPayload>,
) -> Result<impl IntoResponse, ApiError> {
    payload
        .validate()
        .map_err(|e| AppError::ValidationError(e).to_api_error(&locale, &app_state.i18n_store))?;

    let created = app_state
        .medicines_cache_service
        .create(NewCacheEntry {
            product_id: payload.product_id.trim().to_string(),
            batch_no: payload.batch_no.trim().to_string(),
            current_quantity: payload.current_quantity,
            product_price: payload.product_price,
            manufacture_date: payload.manufacture_date,
            expire_date: payload.expire_date,
        })
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::CREATED, Json(created)))
}

#[utoipa::path(
    get,
    path = "/api/medicines-cache/{id}",
    tag = "Medicines Cache",
    params(("id" = i64, Path, description = "ID do registro")),
    responses(
        (status = 200, description = "Registro do cache", body = MedicineCache),
        (status = 404, description = "Não encontrado")
    ),
    security(("api_jwt" = []))
)]
pub async fn get_cache_entry(
    State(app_state): State<AppState>,
    locale: Locale,
    _guard: RequirePermission<PermStockRead>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let row = app_state
        .medicines_cache_service
        .get(id)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok(Json(row))
}

#[utoipa::path(
    put,
    path = "/api/medicines-cache/{id}",
    tag = "Medicines Cache",
    request_body = UpdateCacheEntryPayload,
    params(("id" = i64, Path, description = "ID do registro")),
    responses(
        (status = 200, description = "Registro atualizado", body = MedicineCache),
        (status = 409, description = "Versão desatualizada")
    ),
    security(("api_jwt" = []))
)]
pub async fn update_cache_entry(
    State(app_state): State<AppState>,
    locale: Locale,
    _guard: RequirePermission<PermStockWrite>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateCacheEntryPayload>,
) -> Result<impl IntoResponse, ApiError> {
    payload
        .check()
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    let updated = app_state
        .medicines_cache_service
        .update(
            id,
            CacheMetadataUpdate {
                product_price: payload.product_price,
                manufacture_date: payload.manufacture_date,
                expire_date: payload.expire_date,
                version: payload.version.unwrap_or_default(),
            },
        )
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok(Json(updated))
}

#[utoipa::path(
    get,
    path = "/api/medicines-cache/{id}/reconciliation",
    tag = "Medicines Cache",
    params(("id" = i64, Path, description = "ID do registro")),
    responses(
        (status = 200, description = "Saldo do cache comparado ao livro-razão", body = ReconciliationReport),
        (status = 404, description = "Não encontrado")
    ),
    security(("api_jwt" = []))
)]
pub async fn reconcile_cache_entry(
    State(app_state): State<AppState>,
    locale: Locale,
    _guard: RequirePermission<PermStockRead>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let report = app_state
        .medicines_cache_service
        .reconcile(id)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok(Json(report))
}

#[utoipa::path(
    get,
    path = "/api/medicines-cache/products/{product_id}",
    tag = "Medicines Cache",
    params(("product_id" = String, Path, description = "Código do produto")),
    responses(
        (status = 200, description = "Saldo total do produto", body = ProductStock),
        (status = 404, description = "Produto sem saldo registrado")
    ),
    security(("api_jwt" = []))
)]
pub async fn get_product_stock(
    State(app_state): State<AppState>,
    locale: Locale,
    _guard: RequirePermission<PermStockRead>,
    Path(product_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let stock = app_state
        .medicines_cache_service
        .product_stock(&product_id)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok(Json(stock))
}

#[utoipa::path(
    get,
    path = "/api/medicines-cache/audit",
    tag = "Medicines Cache",
    responses(
        (status = 200, description = "Conciliação de todos os lotes, divergentes primeiro", body = Vec<ReconciliationReport>)
    ),
    security(("api_jwt" = []))
)]
pub async fn audit_cache(
    State(app_state): State<AppState>,
    locale: Locale,
    _guard: RequirePermission<PermStockRead>,
) -> Result<impl IntoResponse, ApiError> {
    let reports = app_state
        .medicines_cache_service
        .audit()
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok(Json(reports))
}
