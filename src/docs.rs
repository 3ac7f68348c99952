// src/docs.rs

use axum::Json;
use utoipa::openapi::security::{Http, HttpAuthScheme, SecurityScheme};
use utoipa::OpenApi;

use crate::handlers;
use crate::models;

#[derive(OpenApi)]
#[openapi(
    paths(
        // --- Stock Adjustments ---
        handlers::stock_adjustments::create_adjustment,
        handlers::stock_adjustments::list_adjustments,
        handlers::stock_adjustments::list_transfers,
        handlers::stock_adjustments::list_by_type,
        handlers::stock_adjustments::get_adjustment,
        handlers::stock_adjustments::annotate_adjustment,
        handlers::stock_adjustments::reverse_adjustment,

        // --- Stock Taking ---
        handlers::stock_taking::submit_stock_taking,
        handlers::stock_taking::import_stock_taking,
        handlers::stock_taking::list_stock_takings,
        handlers::stock_taking::get_stock_taking,

        // --- Medicines Cache ---
        handlers::medicines_cache::list_cache,
        handlers::medicines_cache::create_cache_entry,
        handlers::medicines_cache::get_cache_entry,
        handlers::medicines_cache::update_cache_entry,
        handlers::medicines_cache::reconcile_cache_entry,
        handlers::medicines_cache::get_product_stock,
        handlers::medicines_cache::audit_cache,
    ),
    components(
        schemas(
            // --- Ledger ---
            models::stock::AdjustmentType,
            models::stock::StockAdjustment,
            models::stock::AppliedAdjustment,

            // --- Cache ---
            models::stock::MedicineCache,
            models::stock::ProductStock,
            models::stock::ReconciliationReport,

            // --- Inventário ---
            models::stock::StockTaking,
            models::stock::CountedProduct,
            models::stock::CountedBatch,
            models::stock::ProductVariance,
            models::stock::StockTakingReceipt,

            // --- Payloads ---
            handlers::stock_adjustments::CreateStockAdjustmentPayload,
            handlers::stock_adjustments::AnnotateStockAdjustmentPayload,
            handlers::stock_taking::SubmitStockTakingPayload,
            handlers::stock_taking::CountedProductPayload,
            handlers::stock_taking::CountedBatchPayload,
            handlers::medicines_cache::CreateCacheEntryPayload,
            handlers::medicines_cache::UpdateCacheEntryPayload,
        )
    ),
    tags(
        (name = "Stock Adjustments", description = "Livro-razão de entradas e saídas por lote"),
        (name = "Stock Taking", description = "Contagem física (inventário) e importação de planilhas"),
        (name = "Medicines Cache", description = "Saldo atual por lote e conciliação com o livro-razão")
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "api_jwt",
            SecurityScheme::Http(
                Http::new(HttpAuthScheme::Bearer)
            ),
        );
    }
}

// GET /api-docs/openapi.json
pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
