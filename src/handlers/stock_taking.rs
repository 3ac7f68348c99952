// src/handlers/stock_taking.rs

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::{
    common::error::{ApiError, AppError},
    config::AppState,
    handlers::{trimmed, validate_not_blank},
    middleware::{
        auth::AuthenticatedUser,
        i18n::Locale,
        rbac::{PermStockCount, PermStockRead, RequirePermission},
    },
    models::stock::{ObservedBatch, ObservedProduct, StockTaking, StockTakingReceipt},
};

// ---
// Payload: SubmitStockTaking
// ---
#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct CountedBatchPayload {
    #[validate(
        custom(function = "validate_not_blank"),
        length(max = 64, message = "validation.too_long")
    )]
    #[serde(default)]
    #[schema(example = "B1")]
    pub batch_no: String,

    // As planilhas antigas chamam de "product_quantity"
    #[serde(alias = "product_quantity")]
    #[validate(
        required(message = "validation.required"),
        range(min = 0, message = "validation.quantity_not_negative")
    )]
    #[schema(example = 80)]
    pub quantity: Option<i64>,

    pub manufacture_date: Option<NaiveDate>,

    #[serde(alias = "expiry_date")]
    pub expire_date: Option<NaiveDate>,
}

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct CountedProductPayload {
    #[validate(
        custom(function = "validate_not_blank"),
        length(max = 64, message = "validation.too_long")
    )]
    #[serde(default)]
    #[schema(example = "MED001")]
    pub product_id: String,

    #[validate(length(min = 1, message = "validation.batches_required"), nested)]
    #[serde(default)]
    pub batches: Vec<CountedBatchPayload>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct SubmitStockTakingPayload {
    #[validate(length(min = 1, message = "validation.products_required"), nested)]
    #[serde(default)]
    pub products: Vec<CountedProductPayload>,

    pub notes: Option<String>,

    // Aceito por compatibilidade; o autor é sempre o operador do token
    pub created_by: Option<String>,
}

impl SubmitStockTakingPayload {
    fn into_observed(self) -> Vec<ObservedProduct> {
        self.products
            .into_iter()
            .map(|product| ObservedProduct {
                product_id: product.product_id.trim().to_string(),
                batches: product
                    .batches
                    .into_iter()
                    .map(|batch| ObservedBatch {
                        batch_no: batch.batch_no.trim().to_string(),
                        quantity: batch.quantity.unwrap_or_default(),
                        manufacture_date: batch.manufacture_date,
                        expire_date: batch.expire_date,
                    })
                    .collect(),
            })
            .collect()
    }
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ImportQuery {
    /// Observação gravada junto com o inventário
    pub notes: Option<String>,
}

#[utoipa::path(
    post,
    path = "/api/stock-taking",
    tag = "Stock Taking",
    request_body = SubmitStockTakingPayload,
    responses(
        (status = 201, description = "Inventário aplicado ao cache", body = StockTakingReceipt),
        (status = 400, description = "Payload inválido, produto ou lote repetido")
    ),
    security(("api_jwt" = []))
)]
pub async fn submit_stock_taking(
    State(app_state): State<AppState>,
    locale: Locale,
    user: AuthenticatedUser,
    _guard: RequirePermission<PermStockCount>,
    Json(payload): Json<SubmitStockTakingPayload>,
) -> Result<impl IntoResponse, ApiError> {
    payload
        .validate()
        .map_err(|e| AppError::ValidationError(e).to_api_error(&locale, &app_state.i18n_store))?;

    let notes = trimmed(payload.notes.clone());
    let receipt = app_state
        .stock_taking_service
        .submit(&user.0.id, notes, payload.into_observed())
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::CREATED, Json(receipt)))
}

#[utoipa::path(
    post,
    path = "/api/stock-taking/import",
    tag = "Stock Taking",
    params(ImportQuery),
    request_body(
        content = String,
        content_type = "text/csv",
        description = "Cabeçalho: product_id,batch_no,product_quantity,manufacture_date,expire_date"
    ),
    responses(
        (status = 201, description = "Planilha aplicada ao cache", body = StockTakingReceipt),
        (status = 422, description = "Planilha rejeitada; nada foi gravado")
    ),
    security(("api_jwt" = []))
)]
pub async fn import_stock_taking(
    State(app_state): State<AppState>,
    locale: Locale,
    user: AuthenticatedUser,
    _guard: RequirePermission<PermStockCount>,
    Query(query): Query<ImportQuery>,
    body: String,
) -> Result<impl IntoResponse, ApiError> {
    let receipt = app_state
        .stock_taking_service
        .import_csv(&user.0.id, &body, trimmed(query.notes))
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::CREATED, Json(receipt)))
}

#[utoipa::path(
    get,
    path = "/api/stock-taking",
    tag = "Stock Taking",
    responses(
        (status = 200, description = "Inventários registrados", body = Vec<StockTaking>)
    ),
    security(("api_jwt" = []))
)]
pub async fn list_stock_takings(
    State(app_state): State<AppState>,
    locale: Locale,
    _guard: RequirePermission<PermStockRead>,
) -> Result<impl IntoResponse, ApiError> {
    let takings = app_state
        .stock_taking_service
        .list()
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok(Json(takings))
}

#[utoipa::path(
    get,
    path = "/api/stock-taking/{id}",
    tag = "Stock Taking",
    params(("id" = i64, Path, description = "ID do inventário")),
    responses(
        (status = 200, description = "Inventário", body = StockTaking),
        (status = 404, description = "Não encontrado")
    ),
    security(("api_jwt" = []))
)]
pub async fn get_stock_taking(
    State(app_state): State<AppState>,
    locale: Locale,
    _guard: RequirePermission<PermStockRead>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let taking = app_state
        .stock_taking_service
        .get(id)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok(Json(taking))
}
