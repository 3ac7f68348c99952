// src/db/store.rs

use async_trait::async_trait;

use crate::{
    common::error::AppError,
    models::stock::{
        AdjustmentAnnotation, AdjustmentFilter, AppliedAdjustment, CacheFilter, CacheMetadataUpdate,
        MedicineCache, NewCacheEntry, NewStockAdjustment, NewStockTaking, StockAdjustment,
        StockTaking, StockTakingReceipt,
    },
};

/// Registro do cache junto com os lançamentos que ele precisa refletir,
/// lidos no mesmo instante.
#[derive(Debug, Clone)]
pub struct LedgerSlice {
    pub cache: MedicineCache,
    pub entries: Vec<StockAdjustment>,
}

/// Porta de persistência do livro-razão, do cache e dos inventários.
///
/// Toda escrita é atômica: o lançamento e o saldo do cache são gravados
/// juntos ou nada é gravado. Escritas do mesmo produto são serializadas.
#[async_trait]
pub trait StockStore: Send + Sync {
    // --- Livro-razão ---
    async fn record_adjustment(&self, command: NewStockAdjustment) -> Result<AppliedAdjustment, AppError>;

    /// Grava o estorno de `id`. Falha se `id` já foi estornado ou é ele próprio um estorno.
    async fn reverse_adjustment(&self, id: i64, created_by: &str) -> Result<AppliedAdjustment, AppError>;

    async fn annotate_adjustment(
        &self,
        id: i64,
        patch: AdjustmentAnnotation,
    ) -> Result<StockAdjustment, AppError>;

    async fn get_adjustment(&self, id: i64) -> Result<Option<StockAdjustment>, AppError>;

    async fn list_adjustments(&self, filter: &AdjustmentFilter) -> Result<Vec<StockAdjustment>, AppError>;

    // --- Inventário ---
    async fn record_stock_taking(&self, command: NewStockTaking) -> Result<StockTakingReceipt, AppError>;

    async fn list_stock_takings(&self) -> Result<Vec<StockTaking>, AppError>;

    async fn get_stock_taking(&self, id: i64) -> Result<Option<StockTaking>, AppError>;

    // --- Cache ---
    async fn create_cache_entry(&self, entry: NewCacheEntry) -> Result<MedicineCache, AppError>;

    async fn update_cache_metadata(
        &self,
        id: i64,
        patch: CacheMetadataUpdate,
    ) -> Result<MedicineCache, AppError>;

    async fn get_cache_entry(&self, id: i64) -> Result<Option<MedicineCache>, AppError>;

    async fn list_cache(&self, filter: &CacheFilter) -> Result<Vec<MedicineCache>, AppError>;

    // --- Conciliação ---
    async fn ledger_slice(&self, cache_id: i64) -> Result<Option<LedgerSlice>, AppError>;

    async fn ledger_slices(&self) -> Result<Vec<LedgerSlice>, AppError>;
}
