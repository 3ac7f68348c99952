use std::borrow::Cow;
use std::collections::BTreeMap;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;
use validator::{ValidationError, ValidationErrors, ValidationErrorsKind};

use crate::common::i18n::I18nStore;
use crate::middleware::i18n::Locale;

// Linha rejeitada de uma planilha de inventário
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpreadsheetRowError {
    pub line: u64,
    pub column: Option<&'static str>,
    pub problem: RowProblem,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowProblem {
    MissingValue,
    TooLong,
    NotAnInteger,
    NegativeQuantity,
    InvalidDate,
    DatesOutOfOrder,
    WrongColumnCount,
    Unreadable,
}

impl RowProblem {
    pub fn key(self) -> &'static str {
        match self {
            RowProblem::MissingValue => "spreadsheet.missing_value",
            RowProblem::TooLong => "spreadsheet.too_long",
            RowProblem::NotAnInteger => "spreadsheet.not_an_integer",
            RowProblem::NegativeQuantity => "spreadsheet.negative_quantity",
            RowProblem::InvalidDate => "spreadsheet.invalid_date",
            RowProblem::DatesOutOfOrder => "spreadsheet.dates_out_of_order",
            RowProblem::WrongColumnCount => "spreadsheet.wrong_column_count",
            RowProblem::Unreadable => "spreadsheet.unreadable",
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Erro de validação")]
    ValidationError(#[from] validator::ValidationErrors),

    #[error("Token inválido")]
    InvalidToken,

    #[error("Permissão ausente: {0}")]
    MissingPermission(&'static str),

    #[error("Ajuste {0} não encontrado")]
    AdjustmentNotFound(i64),

    #[error("Inventário {0} não encontrado")]
    StockTakingNotFound(i64),

    #[error("Registro de cache {0} não encontrado")]
    CacheEntryNotFound(i64),

    #[error("Produto {0} sem saldo registrado")]
    ProductNotFound(String),

    #[error("Tipo de ajuste desconhecido: {0}")]
    UnknownAdjustmentType(String),

    #[error("Estoque insuficiente em {product_id}/{batch_no}: disponível {available}, solicitado {requested}")]
    InsufficientStock {
        product_id: String,
        batch_no: String,
        available: i64,
        requested: i64,
    },

    #[error("Quantidade fora do limite em {product_id}/{batch_no}")]
    QuantityOverflow { product_id: String, batch_no: String },

    #[error("Lote {product_id}/{batch_no} já existe no cache")]
    CacheEntryAlreadyExists { product_id: String, batch_no: String },

    #[error("Conflito de versão no registro {id} (esperada {expected})")]
    VersionConflict { id: i64, expected: i64 },

    #[error("Ajuste {0} já foi estornado")]
    AlreadyReversed(i64),

    #[error("Ajuste {0} é um estorno e não pode ser estornado")]
    CannotReverseReversal(i64),

    #[error("Ajuste {0} é anterior ao último inventário do lote")]
    SupersededByCount(i64),

    #[error("Produto {0} repetido no inventário")]
    DuplicateProduct(String),

    #[error("Lote {batch_no} repetido para o produto {product_id}")]
    DuplicateBatch { product_id: String, batch_no: String },

    #[error("Inventário sem produtos")]
    EmptySubmission,

    #[error("Cabeçalho da planilha inválido: {found}")]
    SpreadsheetHeader { found: String },

    #[error("Planilha rejeitada: {} linha(s) inválida(s)", .0.len())]
    SpreadsheetRows(Vec<SpreadsheetRowError>),

    #[error("Erro de banco de dados: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Erro de JWT: {0}")]
    JwtError(#[from] jsonwebtoken::errors::Error),

    // Variante genérica para qualquer outro erro inesperado
    #[error("Erro interno do servidor: {0}")]
    InternalServerError(#[from] anyhow::Error),
}

// O erro que sai para o cliente, já traduzido
#[derive(Debug, Serialize)]
pub struct ApiError {
    #[serde(skip)]
    pub status: StatusCode,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}

/// Cria um `ValidationError` cuja mensagem é uma chave do catálogo de i18n.
pub fn field_error(code: &'static str, message_key: &'static str) -> ValidationError {
    let mut err = ValidationError::new(code);
    err.message = Some(Cow::Borrowed(message_key));
    err
}

/// Atalho para erros de validação de um único campo.
pub fn invalid_field(field: &'static str, code: &'static str, message_key: &'static str) -> AppError {
    let mut errors = ValidationErrors::new();
    errors.add(field, field_error(code, message_key));
    AppError::ValidationError(errors)
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::ValidationError(_)
            | AppError::UnknownAdjustmentType(_)
            | AppError::QuantityOverflow { .. }
            | AppError::DuplicateProduct(_)
            | AppError::DuplicateBatch { .. }
            | AppError::EmptySubmission => StatusCode::BAD_REQUEST,
            AppError::InvalidToken => StatusCode::UNAUTHORIZED,
            AppError::MissingPermission(_) => StatusCode::FORBIDDEN,
            AppError::AdjustmentNotFound(_)
            | AppError::StockTakingNotFound(_)
            | AppError::CacheEntryNotFound(_)
            | AppError::ProductNotFound(_) => StatusCode::NOT_FOUND,
            AppError::InsufficientStock { .. }
            | AppError::CacheEntryAlreadyExists { .. }
            | AppError::VersionConflict { .. }
            | AppError::AlreadyReversed(_)
            | AppError::CannotReverseReversal(_)
            | AppError::SupersededByCount(_) => StatusCode::CONFLICT,
            AppError::SpreadsheetHeader { .. } | AppError::SpreadsheetRows(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            AppError::DatabaseError(_) | AppError::JwtError(_) | AppError::InternalServerError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Traduz o erro para o idioma do cliente.
    pub fn to_api_error(&self, locale: &Locale, i18n: &I18nStore) -> ApiError {
        let lang = locale.0.as_str();
        let t = |key: &str, args: &[(&str, String)]| i18n.translate(lang, key, args);
        let status = self.status_code();

        let (error, details) = match self {
            AppError::ValidationError(errors) => {
                let mut fields = BTreeMap::new();
                collect_field_messages("", errors, &mut fields);
                let details = fields
                    .into_iter()
                    .map(|(field, keys)| {
                        let messages: Vec<String> = keys.iter().map(|k| t(k, &[])).collect();
                        (field, json!(messages))
                    })
                    .collect::<serde_json::Map<_, _>>();
                (t("errors.validation", &[]), Some(Value::Object(details)))
            }
            AppError::InvalidToken => (t("errors.invalid_token", &[]), None),
            AppError::MissingPermission(slug) => (
                t("errors.missing_permission", &[("permission", slug.to_string())]),
                None,
            ),
            AppError::AdjustmentNotFound(id) => {
                (t("errors.adjustment_not_found", &[("id", id.to_string())]), None)
            }
            AppError::StockTakingNotFound(id) => {
                (t("errors.stock_taking_not_found", &[("id", id.to_string())]), None)
            }
            AppError::CacheEntryNotFound(id) => {
                (t("errors.cache_entry_not_found", &[("id", id.to_string())]), None)
            }
            AppError::ProductNotFound(product_id) => (
                t("errors.product_not_found", &[("product_id", product_id.clone())]),
                None,
            ),
            AppError::UnknownAdjustmentType(value) => (
                t("errors.unknown_adjustment_type", &[("value", value.clone())]),
                None,
            ),
            AppError::InsufficientStock { product_id, batch_no, available, requested } => (
                t(
                    "errors.insufficient_stock",
                    &[
                        ("product_id", product_id.clone()),
                        ("batch_no", batch_no.clone()),
                        ("available", available.to_string()),
                        ("requested", requested.to_string()),
                    ],
                ),
                Some(json!({
                    "product_id": product_id,
                    "batch_no": batch_no,
                    "available": available,
                    "requested": requested,
                })),
            ),
            AppError::QuantityOverflow { product_id, batch_no } => (
                t(
                    "errors.quantity_overflow",
                    &[("product_id", product_id.clone()), ("batch_no", batch_no.clone())],
                ),
                None,
            ),
            AppError::CacheEntryAlreadyExists { product_id, batch_no } => (
                t(
                    "errors.cache_entry_exists",
                    &[("product_id", product_id.clone()), ("batch_no", batch_no.clone())],
                ),
                None,
            ),
            AppError::VersionConflict { id, expected } => (
                t("errors.version_conflict", &[("id", id.to_string())]),
                Some(json!({ "id": id, "expected_version": expected })),
            ),
            AppError::AlreadyReversed(id) => {
                (t("errors.already_reversed", &[("id", id.to_string())]), None)
            }
            AppError::CannotReverseReversal(id) => {
                (t("errors.cannot_reverse_reversal", &[("id", id.to_string())]), None)
            }
            AppError::SupersededByCount(id) => {
                (t("errors.superseded_by_count", &[("id", id.to_string())]), None)
            }
            AppError::DuplicateProduct(product_id) => (
                t("errors.duplicate_product", &[("product_id", product_id.clone())]),
                None,
            ),
            AppError::DuplicateBatch { product_id, batch_no } => (
                t(
                    "errors.duplicate_batch",
                    &[("product_id", product_id.clone()), ("batch_no", batch_no.clone())],
                ),
                None,
            ),
            AppError::EmptySubmission => (t("errors.empty_submission", &[]), None),
            AppError::SpreadsheetHeader { found } => (
                t(
                    "errors.spreadsheet_header",
                    &[
                        ("expected", crate::services::spreadsheet::STOCK_TAKING_COLUMNS.join(",")),
                        ("found", found.clone()),
                    ],
                ),
                None,
            ),
            AppError::SpreadsheetRows(rows) => {
                let details: Vec<Value> = rows
                    .iter()
                    .map(|row| {
                        json!({
                            "line": row.line,
                            "column": row.column,
                            "value": row.value,
                            "message": t(row.problem.key(), &[]),
                        })
                    })
                    .collect();
                (
                    t("errors.spreadsheet_rows", &[("count", rows.len().to_string())]),
                    Some(Value::Array(details)),
                )
            }

            // Todos os outros erros (DatabaseError, InternalServerError) viram 500.
            // O `tracing` loga a mensagem detalhada; o cliente recebe uma genérica.
            e => {
                tracing::error!("🔥 Erro Interno do Servidor: {}", e);
                (t("errors.internal", &[]), None)
            }
        };

        ApiError { status, error, details }
    }
}

// Achata erros aninhados (listas e structs) em "products[0].batches[1].quantity".
fn collect_field_messages(
    prefix: &str,
    errors: &ValidationErrors,
    out: &mut BTreeMap<String, Vec<String>>,
) {
    for (field, kind) in errors.errors() {
        let path = if prefix.is_empty() {
            field.to_string()
        } else {
            format!("{prefix}.{field}")
        };

        match kind {
            ValidationErrorsKind::Field(field_errors) => {
                let messages = out.entry(path).or_default();
                for err in field_errors {
                    let key = err
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| format!("validation.{}", err.code));
                    messages.push(key);
                }
            }
            ValidationErrorsKind::Struct(nested) => collect_field_messages(&path, nested, out),
            ValidationErrorsKind::List(items) => {
                for (index, nested) in items {
                    collect_field_messages(&format!("{path}[{index}]"), nested, out);
                }
            }
        }
    }
}
