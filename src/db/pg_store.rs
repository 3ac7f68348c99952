// src/db/pg_store.rs

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};

use crate::{
    common::error::AppError,
    db::{
        cache_repo::CacheRowInsert,
        store::{LedgerSlice, StockStore},
        MedicinesCacheRepository, StockAdjustmentRepository, StockTakingRepository,
    },
    models::stock::{
        AdjustmentAnnotation, AdjustmentFilter, AppliedAdjustment, CacheFilter, CacheMetadataUpdate,
        MedicineCache, NewCacheEntry, NewStockAdjustment, NewStockTaking, StockAdjustment,
        StockTaking, StockTakingReceipt, StockTakingRow,
    },
    services::reconciliation::{self, BatchCount},
};

#[derive(Clone)]
pub struct PgStockStore {
    pool: PgPool,
    adjustment_repo: StockAdjustmentRepository,
    cache_repo: MedicinesCacheRepository,
    stock_taking_repo: StockTakingRepository,
}

impl PgStockStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            adjustment_repo: StockAdjustmentRepository::new(),
            cache_repo: MedicinesCacheRepository::new(),
            stock_taking_repo: StockTakingRepository::new(),
        }
    }

    // Lançamento + saldo dentro da transação. O produto já deve estar travado.
    async fn apply(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        command: NewStockAdjustment,
    ) -> Result<AppliedAdjustment, AppError> {
        let cached = self
            .cache_repo
            .find_by_key_for_update(&mut **tx, &command.product_id, &command.batch_no)
            .await?;

        let before = cached.as_ref().map_or(0, |row| row.current_quantity);
        let after = reconciliation::apply_adjustment(
            &command.product_id,
            &command.batch_no,
            before,
            command.adjustment_type,
            command.quantity_adjusted,
        )?;

        let adjustment = self
            .adjustment_repo
            .insert(&mut **tx, &command, before, after)
            .await?;

        let cache = match cached {
            Some(row) => self
                .cache_repo
                .set_quantity(&mut **tx, row.id, row.version, after)
                .await?
                .ok_or(AppError::VersionConflict { id: row.id, expected: row.version })?,
            None => {
                let insert = CacheRowInsert {
                    product_id: &command.product_id,
                    batch_no: &command.batch_no,
                    current_quantity: after,
                    product_price: Decimal::ZERO,
                    manufacture_date: None,
                    expire_date: None,
                    baseline_quantity: 0,
                    baseline_seq: 0,
                };
                self.cache_repo.insert(&mut **tx, &insert).await?
            }
        };

        Ok(AppliedAdjustment { adjustment, cache })
    }

    async fn stock_takings_with_lines(
        &self,
        rows: Vec<StockTakingRow>,
    ) -> Result<Vec<StockTaking>, AppError> {
        let ids: Vec<i64> = rows.iter().map(|row| row.id).collect();
        let mut lines = self.stock_taking_repo.lines_for(&self.pool, &ids).await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let (mine, rest): (Vec<_>, Vec<_>) =
                    lines.drain(..).partition(|line| line.stock_taking_id == row.id);
                lines = rest;
                StockTaking::assemble(row, mine)
            })
            .collect())
    }

    // Transação de leitura com snapshot único (cache e livro-razão no mesmo instante)
    async fn snapshot(&self) -> Result<Transaction<'static, Postgres>, AppError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ READ ONLY")
            .execute(&mut *tx)
            .await?;
        Ok(tx)
    }
}

#[async_trait]
impl StockStore for PgStockStore {
    async fn record_adjustment(&self, command: NewStockAdjustment) -> Result<AppliedAdjustment, AppError> {
        let mut tx = self.pool.begin().await?;
        self.adjustment_repo.lock_product(&mut *tx, &command.product_id).await?;

        let applied = self.apply(&mut tx, command).await?;

        tx.commit().await?;
        Ok(applied)
    }

    async fn reverse_adjustment(&self, id: i64, created_by: &str) -> Result<AppliedAdjustment, AppError> {
        let mut tx = self.pool.begin().await?;

        let original = self
            .adjustment_repo
            .find_by_id(&mut *tx, id)
            .await?
            .ok_or(AppError::AdjustmentNotFound(id))?;
        self.adjustment_repo.lock_product(&mut *tx, &original.product_id).await?;

        if self.adjustment_repo.is_reversed(&mut *tx, id).await? {
            return Err(AppError::AlreadyReversed(id));
        }

        let baseline_seq = self
            .cache_repo
            .find_by_key(&mut *tx, &original.product_id, &original.batch_no)
            .await?
            .map_or(0, |row| row.baseline_seq);
        let command = reconciliation::reversal_of(&original, baseline_seq, created_by)?;
        let applied = self.apply(&mut tx, command).await?;

        tx.commit().await?;
        Ok(applied)
    }

    async fn annotate_adjustment(
        &self,
        id: i64,
        patch: AdjustmentAnnotation,
    ) -> Result<StockAdjustment, AppError> {
        let mut tx = self.pool.begin().await?;

        let current = self
            .adjustment_repo
            .find_for_update(&mut *tx, id)
            .await?
            .ok_or(AppError::AdjustmentNotFound(id))?;
        let resolved = reconciliation::merge_annotation(&current, patch)?;
        let updated = self.adjustment_repo.update_annotation(&mut *tx, id, &resolved).await?;

        tx.commit().await?;
        Ok(updated)
    }

    async fn get_adjustment(&self, id: i64) -> Result<Option<StockAdjustment>, AppError> {
        self.adjustment_repo.find_by_id(&self.pool, id).await
    }

    async fn list_adjustments(&self, filter: &AdjustmentFilter) -> Result<Vec<StockAdjustment>, AppError> {
        self.adjustment_repo.list(&self.pool, filter).await
    }

    async fn record_stock_taking(&self, command: NewStockTaking) -> Result<StockTakingReceipt, AppError> {
        let mut tx = self.pool.begin().await?;

        // Trava em ordem alfabética para duas contagens não se bloquearem mutuamente
        let mut product_ids: Vec<&str> = command.products.iter().map(|p| p.product_id.as_str()).collect();
        product_ids.sort_unstable();
        for product_id in product_ids {
            self.adjustment_repo.lock_product(&mut *tx, product_id).await?;
        }

        let header = self
            .stock_taking_repo
            .insert_header(&mut *tx, &command.created_by, command.notes.as_deref())
            .await?;

        let mut lines = Vec::new();
        let mut cache_updates = Vec::new();
        let mut variances = Vec::with_capacity(command.products.len());

        for product in &command.products {
            let existing = self.cache_repo.find_by_product(&mut *tx, &product.product_id).await?;
            let plan = reconciliation::plan_stock_count(&product.product_id, &existing, &product.batches)?;
            let head = self.adjustment_repo.ledger_head(&mut *tx, &product.product_id).await?;

            for count in &plan.counts {
                let row = CacheRowInsert {
                    product_id: &plan.product_id,
                    batch_no: &count.batch_no,
                    current_quantity: count.quantity,
                    product_price: Decimal::ZERO,
                    manufacture_date: count.manufacture_date,
                    expire_date: count.expire_date,
                    baseline_quantity: count.quantity,
                    baseline_seq: head,
                };
                let written = self.cache_repo.upsert_count(&mut *tx, &row).await?;

                if count.observed {
                    // A linha guarda as datas já mescladas com as do cache
                    let recorded = BatchCount {
                        manufacture_date: written.manufacture_date,
                        expire_date: written.expire_date,
                        ..count.clone()
                    };
                    let line = self
                        .stock_taking_repo
                        .insert_line(&mut *tx, header.id, &plan.product_id, &recorded)
                        .await?;
                    lines.push(line);
                }
                cache_updates.push(written);
            }
            variances.push(plan.variance);
        }

        tx.commit().await?;

        Ok(StockTakingReceipt {
            stock_taking: StockTaking::assemble(header, lines),
            cache_updates,
            variances,
        })
    }

    async fn list_stock_takings(&self) -> Result<Vec<StockTaking>, AppError> {
        let rows = self.stock_taking_repo.list(&self.pool).await?;
        self.stock_takings_with_lines(rows).await
    }

    async fn get_stock_taking(&self, id: i64) -> Result<Option<StockTaking>, AppError> {
        let Some(row) = self.stock_taking_repo.find_by_id(&self.pool, id).await? else {
            return Ok(None);
        };
        Ok(self.stock_takings_with_lines(vec![row]).await?.into_iter().next())
    }

    async fn create_cache_entry(&self, entry: NewCacheEntry) -> Result<MedicineCache, AppError> {
        let mut tx = self.pool.begin().await?;
        self.adjustment_repo.lock_product(&mut *tx, &entry.product_id).await?;

        if self
            .cache_repo
            .find_by_key(&mut *tx, &entry.product_id, &entry.batch_no)
            .await?
            .is_some()
        {
            return Err(AppError::CacheEntryAlreadyExists {
                product_id: entry.product_id,
                batch_no: entry.batch_no,
            });
        }

        let head = self.adjustment_repo.ledger_head(&mut *tx, &entry.product_id).await?;
        let row = CacheRowInsert {
            product_id: &entry.product_id,
            batch_no: &entry.batch_no,
            current_quantity: entry.current_quantity,
            product_price: entry.product_price,
            manufacture_date: entry.manufacture_date,
            expire_date: entry.expire_date,
            baseline_quantity: entry.current_quantity,
            baseline_seq: head,
        };
        let created = self.cache_repo.insert(&mut *tx, &row).await?;

        tx.commit().await?;
        Ok(created)
    }

    async fn update_cache_metadata(
        &self,
        id: i64,
        patch: CacheMetadataUpdate,
    ) -> Result<MedicineCache, AppError> {
        let mut tx = self.pool.begin().await?;

        let Some(product_id) = self.cache_repo.product_of(&mut *tx, id).await? else {
            return Err(AppError::CacheEntryNotFound(id));
        };
        // Mesma trava dos ajustes: a edição espera a escrita de saldo em curso, e vice-versa
        self.adjustment_repo.lock_product(&mut *tx, &product_id).await?;

        let current = self
            .cache_repo
            .find_by_id(&mut *tx, id)
            .await?
            .ok_or(AppError::CacheEntryNotFound(id))?;
        let resolved = reconciliation::merge_cache_metadata(&current, &patch)?;

        let updated = self
            .cache_repo
            .update_metadata(&mut *tx, id, patch.version, &resolved)
            .await?
            .ok_or(AppError::VersionConflict { id, expected: patch.version })?;

        tx.commit().await?;
        Ok(updated)
    }

    async fn get_cache_entry(&self, id: i64) -> Result<Option<MedicineCache>, AppError> {
        self.cache_repo.find_by_id(&self.pool, id).await
    }

    async fn list_cache(&self, filter: &CacheFilter) -> Result<Vec<MedicineCache>, AppError> {
        self.cache_repo.list(&self.pool, filter).await
    }

    async fn ledger_slice(&self, cache_id: i64) -> Result<Option<LedgerSlice>, AppError> {
        let mut tx = self.snapshot().await?;

        let Some(cache) = self.cache_repo.find_by_id(&mut *tx, cache_id).await? else {
            return Ok(None);
        };
        let entries = self
            .adjustment_repo
            .list_for_batch_after(&mut *tx, &cache.product_id, &cache.batch_no, cache.baseline_seq)
            .await?;

        tx.commit().await?;
        Ok(Some(LedgerSlice { cache, entries }))
    }

    async fn ledger_slices(&self) -> Result<Vec<LedgerSlice>, AppError> {
        let mut tx = self.snapshot().await?;

        let rows = self.cache_repo.list(&mut *tx, &CacheFilter::default()).await?;
        let oldest_baseline = rows.iter().map(|row| row.baseline_seq).min().unwrap_or(0);
        let entries = self.adjustment_repo.list_after(&mut *tx, oldest_baseline).await?;

        tx.commit().await?;

        Ok(rows
            .into_iter()
            .map(|cache| {
                let entries = entries
                    .iter()
                    .filter(|e| {
                        e.product_id == cache.product_id
                            && e.batch_no == cache.batch_no
                            && e.id > cache.baseline_seq
                    })
                    .cloned()
                    .collect();
                LedgerSlice { cache, entries }
            })
            .collect())
    }
}
