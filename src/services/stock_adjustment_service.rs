// src/services/stock_adjustment_service.rs

use std::sync::Arc;

use crate::{
    common::error::AppError,
    db::StockStore,
    models::stock::{
        AdjustmentAnnotation, AdjustmentFilter, AdjustmentType, AppliedAdjustment, NewStockAdjustment,
        StockAdjustment,
    },
};

#[derive(Clone)]
pub struct StockAdjustmentService {
    store: Arc<dyn StockStore>,
}

impl StockAdjustmentService {
    pub fn new(store: Arc<dyn StockStore>) -> Self {
        Self { store }
    }

    // --- RECORD (lançamento + saldo) ---
    pub async fn record(&self, command: NewStockAdjustment) -> Result<AppliedAdjustment, AppError> {
        let applied = self.store.record_adjustment(command).await.inspect_err(|e| {
            if let AppError::InsufficientStock { product_id, batch_no, available, requested } = e {
                tracing::warn!(%product_id, %batch_no, available, requested, "⚠️ Saída maior que o saldo");
            }
        })?;

        tracing::info!(
            adjustment_id = applied.adjustment.id,
            product_id = %applied.adjustment.product_id,
            batch_no = %applied.adjustment.batch_no,
            kind = %applied.adjustment.adjustment_type,
            quantity = applied.adjustment.quantity_adjusted,
            after = applied.adjustment.quantity_after,
            "📦 Ajuste de estoque registrado"
        );
        Ok(applied)
    }

    pub async fn list(&self, filter: &AdjustmentFilter) -> Result<Vec<StockAdjustment>, AppError> {
        self.store.list_adjustments(filter).await
    }

    /// Saídas para fora da farmácia (transferências e doações).
    pub async fn transfers(&self) -> Result<Vec<StockAdjustment>, AppError> {
        let filter = AdjustmentFilter {
            types: vec![AdjustmentType::Transfer, AdjustmentType::Donation],
            ..Default::default()
        };
        self.store.list_adjustments(&filter).await
    }

    pub async fn by_type(&self, kind: AdjustmentType) -> Result<Vec<StockAdjustment>, AppError> {
        let filter = AdjustmentFilter {
            types: vec![kind],
            ..Default::default()
        };
        self.store.list_adjustments(&filter).await
    }

    pub async fn get(&self, id: i64) -> Result<StockAdjustment, AppError> {
        self.store
            .get_adjustment(id)
            .await?
            .ok_or(AppError::AdjustmentNotFound(id))
    }

    pub async fn annotate(&self, id: i64, patch: AdjustmentAnnotation) -> Result<StockAdjustment, AppError> {
        let updated = self.store.annotate_adjustment(id, patch).await?;
        tracing::info!(adjustment_id = id, "📝 Ajuste de estoque corrigido");
        Ok(updated)
    }

    // --- REVERSE (estorno compensatório) ---
    pub async fn reverse(&self, id: i64, actor_id: &str) -> Result<AppliedAdjustment, AppError> {
        let applied = self.store.reverse_adjustment(id, actor_id).await?;
        tracing::info!(
            adjustment_id = id,
            reversal_id = applied.adjustment.id,
            product_id = %applied.adjustment.product_id,
            batch_no = %applied.adjustment.batch_no,
            "↩️ Ajuste de estoque estornado"
        );
        Ok(applied)
    }
}
