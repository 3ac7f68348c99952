// src/handlers/stock_adjustments.rs

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use validator::{Validate, ValidationErrors};

use crate::{
    common::error::{field_error, ApiError, AppError},
    config::AppState,
    handlers::{trimmed, validate_not_blank},
    middleware::{
        auth::AuthenticatedUser,
        i18n::Locale,
        rbac::{PermStockRead, PermStockWrite, RequirePermission},
    },
    models::stock::{
        AdjustmentAnnotation, AdjustmentFilter, AdjustmentType, AppliedAdjustment, NewStockAdjustment,
        StockAdjustment,
    },
};

// ---
// Payload: CreateStockAdjustment
// ---
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateStockAdjustmentPayload {
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

    // Texto livre: tipos desconhecidos viram 400 com mensagem própria
    #[validate(custom(function = "validate_not_blank"))]
    #[serde(default)]
    #[schema(example = "decrease")]
    pub adjustment_type: String,

    #[validate(
        required(message = "validation.required"),
        range(min = 1, message = "validation.quantity_positive")
    )]
    #[schema(example = 30)]
    pub quantity_adjusted: Option<i64>,

    #[validate(
        custom(function = "validate_not_blank"),
        length(max = 500, message = "validation.too_long")
    )]
    #[serde(default)]
    pub reason: String,

    // Aceito por compatibilidade; o autor é sempre o operador do token
    pub created_by: Option<String>,

    pub destination: Option<String>,
    pub recipient_name: Option<String>,
    pub recipient_contact: Option<String>,
}

impl CreateStockAdjustmentPayload {
    /// Validação do derive + regras que dependem de mais de um campo.
    fn check(&self) -> Result<AdjustmentType, AppError> {
        let mut errors = self.validate().err().unwrap_or_else(ValidationErrors::new);

        let kind = self.adjustment_type.parse::<AdjustmentType>().ok();
        if kind.is_some_and(AdjustmentType::requires_recipient) {
            if trimmed(self.destination.clone()).is_none() {
                errors.add("destination", field_error("required", "validation.recipient_required"));
            }
            if trimmed(self.recipient_name.clone()).is_none() {
                errors.add("recipient_name", field_error("required", "validation.recipient_required"));
            }
        }

        if !errors.is_empty() {
            return Err(AppError::ValidationError(errors));
        }
        kind.ok_or_else(|| AppError::UnknownAdjustmentType(self.adjustment_type.clone()))
    }
}

// ---
// Payload: AnnotateStockAdjustment (PUT)
// ---
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct AnnotateStockAdjustmentPayload {
    #[validate(length(min = 1, max = 500, message = "validation.reason_length"))]
    pub reason: Option<String>,
    pub destination: Option<String>,
    pub recipient_name: Option<String>,
    pub recipient_contact: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AdjustmentQuery {
    pub product_id: Option<String>,
    pub batch_no: Option<String>,
    /// increase, decrease, transfer ou donation
    pub adjustment_type: Option<String>,
}

fn parse_type(raw: &str) -> Result<AdjustmentType, AppError> {
    raw.parse::<AdjustmentType>().map_err(AppError::UnknownAdjustmentType)
}

// ---
// Handler: create_adjustment
// ---
#[utoipa::path(
    post,
    path = "/api/stock-adjustments",
    tag = "Stock Adjustments",
    request_body = CreateStockAdjustmentPayload,
    responses(
        (status = 201, description = "Ajuste registrado; inclui o saldo atualizado do lote", body = AppliedAdjustment),
        (status = 400, description = "Payload inválido"),
        (status = 409, description = "Saída maior que o saldo do lote")
    ),
    security(("api_jwt" = []))
)]
pub async fn create_adjustment(
    State(app_state): State<AppState>,
    locale: Locale,
    user: AuthenticatedUser,
    _guard: RequirePermission<PermStockWrite>,
    Json(payload): Json<CreateStockAdjustmentPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let kind = payload
        .check()
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    let command = NewStockAdjustment {
        product_id: payload.product_id.trim().to_string(),
        batch_no: payload.batch_no.trim().to_string(),
        adjustment_type: kind,
        // check() garante que existe
        quantity_adjusted: payload.quantity_adjusted.unwrap_or_default(),
        reason: payload.reason.trim().to_string(),
        created_by: user.0.id,
        destination: trimmed(payload.destination),
        recipient_name: trimmed(payload.recipient_name),
        recipient_contact: trimmed(payload.recipient_contact),
        reverses_id: None,
    };

    let applied = app_state
        .stock_adjustment_service
        .record(command)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::CREATED, Json(applied)))
}

#[utoipa::path(
    get,
    path = "/api/stock-adjustments",
    tag = "Stock Adjustments",
    params(AdjustmentQuery),
    responses(
        (status = 200, description = "Lançamentos em ordem de registro", body = Vec<StockAdjustment>)
    ),
    security(("api_jwt" = []))
)]
pub async fn list_adjustments(
    State(app_state): State<AppState>,
    locale: Locale,
    _guard: RequirePermission<PermStockRead>,
    Query(query): Query<AdjustmentQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let types = match query.adjustment_type.as_deref() {
        Some(raw) => vec![parse_type(raw).map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?],
        None => Vec::new(),
    };
    let filter = AdjustmentFilter {
        product_id: query.product_id,
        batch_no: query.batch_no,
        types,
    };

    let entries = app_state
        .stock_adjustment_service
        .list(&filter)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok(Json(entries))
}

#[utoipa::path(
    get,
    path = "/api/stock-adjustments/transfers",
    tag = "Stock Adjustments",
    responses(
        (status = 200, description = "Transferências e doações", body = Vec<StockAdjustment>)
    ),
    security(("api_jwt" = []))
)]
pub async fn list_transfers(
    State(app_state): State<AppState>,
    locale: Locale,
    _guard: RequirePermission<PermStockRead>,
) -> Result<impl IntoResponse, ApiError> {
    let entries = app_state
        .stock_adjustment_service
        .transfers()
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok(Json(entries))
}

#[utoipa::path(
    get,
    path = "/api/stock-adjustments/type/{adjustment_type}",
    tag = "Stock Adjustments",
    params(
        ("adjustment_type" = String, Path, description = "increase, decrease, transfer ou donation")
    ),
    responses(
        (status = 200, description = "Lançamentos do tipo", body = Vec<StockAdjustment>),
        (status = 400, description = "Tipo desconhecido")
    ),
    security(("api_jwt" = []))
)]
pub async fn list_by_type(
    State(app_state): State<AppState>,
    locale: Locale,
    _guard: RequirePermission<PermStockRead>,
    Path(adjustment_type): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let kind = parse_type(&adjustment_type).map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    let entries = app_state
        .stock_adjustment_service
        .by_type(kind)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok(Json(entries))
}

#[utoipa::path(
    get,
    path = "/api/stock-adjustments/{id}",
    tag = "Stock Adjustments",
    params(("id" = i64, Path, description = "ID do lançamento")),
    responses(
        (status = 200, description = "Lançamento", body = StockAdjustment),
        (status = 404, description = "Não encontrado")
    ),
    security(("api_jwt" = []))
)]
pub async fn get_adjustment(
    State(app_state): State<AppState>,
    locale: Locale,
    _guard: RequirePermission<PermStockRead>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let entry = app_state
        .stock_adjustment_service
        .get(id)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok(Json(entry))
}

#[utoipa::path(
    put,
    path = "/api/stock-adjustments/{id}",
    tag = "Stock Adjustments",
    request_body = AnnotateStockAdjustmentPayload,
    params(("id" = i64, Path, description = "ID do lançamento")),
    responses(
        (status = 200, description = "Campos descritivos corrigidos", body = StockAdjustment),
        (status = 400, description = "Payload inválido"),
        (status = 404, description = "Não encontrado")
    ),
    security(("api_jwt" = []))
)]
pub async fn annotate_adjustment(
    State(app_state): State<AppState>,
    locale: Locale,
    _guard: RequirePermission<PermStockWrite>,
    Path(id): Path<i64>,
    Json(payload): Json<AnnotateStockAdjustmentPayload>,
) -> Result<impl IntoResponse, ApiError> {
    // Motivo em branco é erro; nos demais campos, branco significa "sem alteração"
    let patch = AnnotateStockAdjustmentPayload {
        reason: payload.reason.map(|v| v.trim().to_string()),
        destination: trimmed(payload.destination),
        recipient_name: trimmed(payload.recipient_name),
        recipient_contact: trimmed(payload.recipient_contact),
    };
    patch
        .validate()
        .map_err(|e| AppError::ValidationError(e).to_api_error(&locale, &app_state.i18n_store))?;

    let updated = app_state
        .stock_adjustment_service
        .annotate(
            id,
            AdjustmentAnnotation {
                reason: patch.reason,
                destination: patch.destination,
                recipient_name: patch.recipient_name,
                recipient_contact: patch.recipient_contact,
            },
        )
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok(Json(updated))
}

#[utoipa::path(
    delete,
    path = "/api/stock-adjustments/{id}",
    tag = "Stock Adjustments",
    params(("id" = i64, Path, description = "ID do lançamento a estornar")),
    responses(
        (status = 201, description = "Estorno registrado", body = AppliedAdjustment),
        (status = 404, description = "Não encontrado"),
        (status = 409, description = "Já estornado, é um estorno, ou saldo insuficiente")
    ),
    security(("api_jwt" = []))
)]
pub async fn reverse_adjustment(
    State(app_state): State<AppState>,
    locale: Locale,
    user: AuthenticatedUser,
    _guard: RequirePermission<PermStockWrite>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let applied = app_state
        .stock_adjustment_service
        .reverse(id, &user.0.id)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::CREATED, Json(applied)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(kind: &str) -> CreateStockAdjustmentPayload {
        CreateStockAdjustmentPayload {
            product_id: "MED001".into(),
            batch_no: "B1".into(),
            adjustment_type: kind.into(),
            quantity_adjusted: Some(5),
            reason: "Avaria".into(),
            created_by: None,
            destination: None,
            recipient_name: None,
            recipient_contact: None,
        }
    }

    #[test]
    fn transfer_requires_destination_and_recipient() {
        let err = payload("transfer").check().unwrap_err();
        let AppError::ValidationError(errors) = err else { panic!("esperava erro de validação") };
        let fields = errors.field_errors();
        assert!(fields.contains_key("destination"));
        assert!(fields.contains_key("recipient_name"));
    }

    #[test]
    fn unknown_type_is_reported_after_field_checks() {
        assert!(matches!(
            payload("refund").check(),
            Err(AppError::UnknownAdjustmentType(t)) if t == "refund"
        ));

        let mut blank = payload("refund");
        blank.reason = "  ".into();
        assert!(matches!(blank.check(), Err(AppError::ValidationError(_))));
    }

    #[test]
    fn zero_quantity_is_rejected() {
        let mut zero = payload("decrease");
        zero.quantity_adjusted = Some(0);
        assert!(matches!(zero.check(), Err(AppError::ValidationError(_))));
        assert_eq!(payload("Decrease").check().unwrap(), AdjustmentType::Decrease);
    }
}
