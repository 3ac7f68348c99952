// src/services/medicines_cache_service.rs

use std::sync::Arc;

use crate::{
    common::error::AppError,
    db::StockStore,
    models::stock::{
        CacheFilter, CacheMetadataUpdate, MedicineCache, NewCacheEntry, ProductStock,
        ReconciliationReport,
    },
    services::reconciliation,
};

#[derive(Clone)]
pub struct MedicinesCacheService {
    store: Arc<dyn StockStore>,
}

impl MedicinesCacheService {
    pub fn new(store: Arc<dyn StockStore>) -> Self {
        Self { store }
    }

    pub async fn list(&self, filter: &CacheFilter) -> Result<Vec<MedicineCache>, AppError> {
        self.store.list_cache(filter).await
    }

    pub async fn get(&self, id: i64) -> Result<MedicineCache, AppError> {
        self.store
            .get_cache_entry(id)
            .await?
            .ok_or(AppError::CacheEntryNotFound(id))
    }

    pub async fn product_stock(&self, product_id: &str) -> Result<ProductStock, AppError> {
        let filter = CacheFilter {
            product_id: Some(product_id.to_string()),
            ..Default::default()
        };
        let batches = self.store.list_cache(&filter).await?;
        if batches.is_empty() {
            return Err(AppError::ProductNotFound(product_id.to_string()));
        }
        Ok(reconciliation::product_stock(product_id, batches))
    }

    pub async fn create(&self, entry: NewCacheEntry) -> Result<MedicineCache, AppError> {
        reconciliation::ensure_dates_in_order(entry.manufacture_date, entry.expire_date)?;

        let created = self.store.create_cache_entry(entry).await?;
        tracing::info!(
            cache_id = created.id,
            product_id = %created.product_id,
            batch_no = %created.batch_no,
            quantity = created.current_quantity,
            "💊 Lote registrado no cache"
        );
        Ok(created)
    }

    pub async fn update(&self, id: i64, patch: CacheMetadataUpdate) -> Result<MedicineCache, AppError> {
        let updated = self.store.update_cache_metadata(id, patch).await?;
        tracing::info!(cache_id = id, version = updated.version, "💊 Dados do lote atualizados");
        Ok(updated)
    }

    pub async fn reconcile(&self, id: i64) -> Result<ReconciliationReport, AppError> {
        let slice = self
            .store
            .ledger_slice(id)
            .await?
            .ok_or(AppError::CacheEntryNotFound(id))?;
        Ok(reconciliation::reconcile(&slice.cache, &slice.entries))
    }

    /// Confere todos os lotes; as divergências vêm primeiro.
    pub async fn audit(&self) -> Result<Vec<ReconciliationReport>, AppError> {
        let slices = self.store.ledger_slices().await?;

        let mut reports: Vec<ReconciliationReport> = slices
            .iter()
            .map(|slice| reconciliation::reconcile(&slice.cache, &slice.entries))
            .collect();
        reconciliation::sort_audit(&mut reports);

        let drifted = reports.iter().filter(|r| !r.consistent).count();
        for report in reports.iter().filter(|r| !r.consistent) {
            tracing::warn!(
                cache_id = report.cache_id,
                product_id = %report.product_id,
                batch_no = %report.batch_no,
                cached = report.cached_quantity,
                expected = report.expected_quantity,
                "🚨 Cache divergente do livro-razão"
            );
        }
        tracing::info!(rows = reports.len(), drifted, "🔎 Auditoria do cache concluída");

        Ok(reports)
    }
}
