// src/db/memory_store.rs
//
// StockStore em memória, usado em desenvolvimento (sem DATABASE_URL) e nos testes.
// Um único Mutex serializa as escritas; cada operação calcula tudo antes de
// mutar o estado, então uma falha não deixa gravação parcial.

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::Mutex;

use crate::{
    common::error::AppError,
    db::store::{LedgerSlice, StockStore},
    models::stock::{
        AdjustmentAnnotation, AdjustmentFilter, AppliedAdjustment, CacheFilter, CacheMetadataUpdate,
        MedicineCache, NewCacheEntry, NewStockAdjustment, NewStockTaking, StockAdjustment,
        StockTaking, StockTakingLine, StockTakingReceipt, StockTakingRow,
    },
    services::reconciliation,
};

#[derive(Default)]
struct MemoryState {
    adjustments: Vec<StockAdjustment>,
    cache: Vec<MedicineCache>,
    stock_takings: Vec<StockTakingRow>,
    stock_taking_lines: Vec<StockTakingLine>,
}

impl MemoryState {
    fn next_adjustment_id(&self) -> i64 {
        self.adjustments.last().map_or(1, |a| a.id + 1)
    }

    fn next_cache_id(&self) -> i64 {
        self.cache.iter().map(|c| c.id).max().unwrap_or(0) + 1
    }

    fn ledger_head(&self, product_id: &str) -> i64 {
        self.adjustments
            .iter()
            .filter(|a| a.product_id == product_id)
            .map(|a| a.id)
            .max()
            .unwrap_or(0)
    }

    fn cache_position(&self, product_id: &str, batch_no: &str) -> Option<usize> {
        self.cache
            .iter()
            .position(|c| c.product_id == product_id && c.batch_no == batch_no)
    }

    fn stock_taking(&self, row: &StockTakingRow) -> StockTaking {
        let lines = self
            .stock_taking_lines
            .iter()
            .filter(|l| l.stock_taking_id == row.id)
            .cloned()
            .collect();
        StockTaking::assemble(row.clone(), lines)
    }

    fn slice(&self, cache: &MedicineCache) -> LedgerSlice {
        let entries = self
            .adjustments
            .iter()
            .filter(|a| {
                a.product_id == cache.product_id
                    && a.batch_no == cache.batch_no
                    && a.id > cache.baseline_seq
            })
            .cloned()
            .collect();
        LedgerSlice { cache: cache.clone(), entries }
    }

    // Lançamento + saldo. Nada é alterado se o ajuste for rejeitado.
    fn apply(&mut self, command: NewStockAdjustment) -> Result<AppliedAdjustment, AppError> {
        let position = self.cache_position(&command.product_id, &command.batch_no);
        let before = position.map_or(0, |i| self.cache[i].current_quantity);
        let after = reconciliation::apply_adjustment(
            &command.product_id,
            &command.batch_no,
            before,
            command.adjustment_type,
            command.quantity_adjusted,
        )?;

        let now = Utc::now();
        let entry = StockAdjustment {
            id: self.next_adjustment_id(),
            product_id: command.product_id,
            batch_no: command.batch_no,
            adjustment_type: command.adjustment_type,
            quantity_adjusted: command.quantity_adjusted,
            reason: command.reason,
            created_by: command.created_by,
            destination: command.destination,
            recipient_name: command.recipient_name,
            recipient_contact: command.recipient_contact,
            reverses_id: command.reverses_id,
            quantity_before: before,
            quantity_after: after,
            created_at: now,
        };

        let cache = match position {
            Some(i) => {
                let row = &mut self.cache[i];
                row.current_quantity = after;
                row.version += 1;
                row.updated_at = now;
                row.clone()
            }
            None => {
                let row = MedicineCache {
                    id: self.next_cache_id(),
                    product_id: entry.product_id.clone(),
                    batch_no: entry.batch_no.clone(),
                    current_quantity: after,
                    product_price: Decimal::ZERO,
                    manufacture_date: None,
                    expire_date: None,
                    baseline_quantity: 0,
                    baseline_seq: 0,
                    version: 1,
                    created_at: now,
                    updated_at: now,
                };
                self.cache.push(row.clone());
                row
            }
        };

        self.adjustments.push(entry.clone());
        Ok(AppliedAdjustment { adjustment: entry, cache })
    }
}

#[derive(Default)]
pub struct MemoryStockStore {
    state: Mutex<MemoryState>,
}

impl MemoryStockStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StockStore for MemoryStockStore {
    async fn record_adjustment(&self, command: NewStockAdjustment) -> Result<AppliedAdjustment, AppError> {
        self.state.lock().await.apply(command)
    }

    async fn reverse_adjustment(&self, id: i64, created_by: &str) -> Result<AppliedAdjustment, AppError> {
        let mut state = self.state.lock().await;

        let original = state
            .adjustments
            .iter()
            .find(|a| a.id == id)
            .ok_or(AppError::AdjustmentNotFound(id))?;
        if state.adjustments.iter().any(|a| a.reverses_id == Some(id)) {
            return Err(AppError::AlreadyReversed(id));
        }

        let baseline_seq = state
            .cache_position(&original.product_id, &original.batch_no)
            .map_or(0, |i| state.cache[i].baseline_seq);
        let command = reconciliation::reversal_of(original, baseline_seq, created_by)?;
        state.apply(command)
    }

    async fn annotate_adjustment(
        &self,
        id: i64,
        patch: AdjustmentAnnotation,
    ) -> Result<StockAdjustment, AppError> {
        let mut state = self.state.lock().await;

        let entry = state
            .adjustments
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or(AppError::AdjustmentNotFound(id))?;
        let resolved = reconciliation::merge_annotation(entry, patch)?;

        entry.reason = resolved.reason;
        entry.destination = resolved.destination;
        entry.recipient_name = resolved.recipient_name;
        entry.recipient_contact = resolved.recipient_contact;
        Ok(entry.clone())
    }

    async fn get_adjustment(&self, id: i64) -> Result<Option<StockAdjustment>, AppError> {
        let state = self.state.lock().await;
        Ok(state.adjustments.iter().find(|a| a.id == id).cloned())
    }

    async fn list_adjustments(&self, filter: &AdjustmentFilter) -> Result<Vec<StockAdjustment>, AppError> {
        let state = self.state.lock().await;
        Ok(state
            .adjustments
            .iter()
            .filter(|a| filter.matches(a))
            .cloned()
            .collect())
    }

    async fn record_stock_taking(&self, command: NewStockTaking) -> Result<StockTakingReceipt, AppError> {
        let mut state = self.state.lock().await;

        // 1. Planeja todos os produtos antes de tocar no estado
        let mut plans = Vec::with_capacity(command.products.len());
        for product in &command.products {
            let existing: Vec<MedicineCache> = state
                .cache
                .iter()
                .filter(|c| c.product_id == product.product_id)
                .cloned()
                .collect();
            let plan = reconciliation::plan_stock_count(&product.product_id, &existing, &product.batches)?;
            let head = state.ledger_head(&product.product_id);
            plans.push((plan, head));
        }

        // 2. Grava
        let now = Utc::now();
        let stock_taking_id = state.stock_takings.last().map_or(1, |s| s.id + 1);
        let row = StockTakingRow {
            id: stock_taking_id,
            created_by: command.created_by,
            notes: command.notes,
            created_at: now,
        };
        state.stock_takings.push(row.clone());

        let mut next_line_id = state.stock_taking_lines.last().map_or(1, |l| l.id + 1);
        let mut cache_updates = Vec::new();
        let mut variances = Vec::with_capacity(plans.len());

        for (plan, head) in plans {
            for count in plan.counts {
                let written = match state.cache_position(&plan.product_id, &count.batch_no) {
                    Some(i) => {
                        let cached = &mut state.cache[i];
                        cached.current_quantity = count.quantity;
                        cached.baseline_quantity = count.quantity;
                        cached.baseline_seq = head;
                        cached.manufacture_date = count.manufacture_date.or(cached.manufacture_date);
                        cached.expire_date = count.expire_date.or(cached.expire_date);
                        cached.version += 1;
                        cached.updated_at = now;
                        cached.clone()
                    }
                    None => {
                        let cached = MedicineCache {
                            id: state.next_cache_id(),
                            product_id: plan.product_id.clone(),
                            batch_no: count.batch_no.clone(),
                            current_quantity: count.quantity,
                            product_price: Decimal::ZERO,
                            manufacture_date: count.manufacture_date,
                            expire_date: count.expire_date,
                            baseline_quantity: count.quantity,
                            baseline_seq: head,
                            version: 1,
                            created_at: now,
                            updated_at: now,
                        };
                        state.cache.push(cached.clone());
                        cached
                    }
                };

                if count.observed {
                    state.stock_taking_lines.push(StockTakingLine {
                        id: next_line_id,
                        stock_taking_id,
                        product_id: plan.product_id.clone(),
                        batch_no: count.batch_no,
                        quantity: count.quantity,
                        previous_quantity: count.previous_quantity,
                        manufacture_date: written.manufacture_date,
                        expire_date: written.expire_date,
                    });
                    next_line_id += 1;
                }
                cache_updates.push(written);
            }
            variances.push(plan.variance);
        }

        Ok(StockTakingReceipt {
            stock_taking: state.stock_taking(&row),
            cache_updates,
            variances,
        })
    }

    async fn list_stock_takings(&self) -> Result<Vec<StockTaking>, AppError> {
        let state = self.state.lock().await;
        Ok(state.stock_takings.iter().map(|row| state.stock_taking(row)).collect())
    }

    async fn get_stock_taking(&self, id: i64) -> Result<Option<StockTaking>, AppError> {
        let state = self.state.lock().await;
        Ok(state
            .stock_takings
            .iter()
            .find(|row| row.id == id)
            .map(|row| state.stock_taking(row)))
    }

    async fn create_cache_entry(&self, entry: NewCacheEntry) -> Result<MedicineCache, AppError> {
        let mut state = self.state.lock().await;

        if state.cache_position(&entry.product_id, &entry.batch_no).is_some() {
            return Err(AppError::CacheEntryAlreadyExists {
                product_id: entry.product_id,
                batch_no: entry.batch_no,
            });
        }

        let now = Utc::now();
        let row = MedicineCache {
            id: state.next_cache_id(),
            baseline_seq: state.ledger_head(&entry.product_id),
            product_id: entry.product_id,
            batch_no: entry.batch_no,
            current_quantity: entry.current_quantity,
            product_price: entry.product_price,
            manufacture_date: entry.manufacture_date,
            expire_date: entry.expire_date,
            baseline_quantity: entry.current_quantity,
            version: 1,
            created_at: now,
            updated_at: now,
        };
        state.cache.push(row.clone());
        Ok(row)
    }

    async fn update_cache_metadata(
        &self,
        id: i64,
        patch: CacheMetadataUpdate,
    ) -> Result<MedicineCache, AppError> {
        let mut state = self.state.lock().await;

        let row = state
            .cache
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or(AppError::CacheEntryNotFound(id))?;
        let resolved = reconciliation::merge_cache_metadata(row, &patch)?;

        row.product_price = resolved.product_price;
        row.manufacture_date = resolved.manufacture_date;
        row.expire_date = resolved.expire_date;
        row.version += 1;
        row.updated_at = Utc::now();
        Ok(row.clone())
    }

    async fn get_cache_entry(&self, id: i64) -> Result<Option<MedicineCache>, AppError> {
        let state = self.state.lock().await;
        Ok(state.cache.iter().find(|c| c.id == id).cloned())
    }

    async fn list_cache(&self, filter: &CacheFilter) -> Result<Vec<MedicineCache>, AppError> {
        let state = self.state.lock().await;
        let mut rows: Vec<MedicineCache> = state.cache.iter().filter(|c| filter.matches(c)).cloned().collect();
        rows.sort_by(|a, b| (&a.product_id, &a.batch_no).cmp(&(&b.product_id, &b.batch_no)));
        Ok(rows)
    }

    async fn ledger_slice(&self, cache_id: i64) -> Result<Option<LedgerSlice>, AppError> {
        let state = self.state.lock().await;
        Ok(state
            .cache
            .iter()
            .find(|c| c.id == cache_id)
            .map(|c| state.slice(c)))
    }

    async fn ledger_slices(&self) -> Result<Vec<LedgerSlice>, AppError> {
        let state = self.state.lock().await;
        Ok(state.cache.iter().map(|c| state.slice(c)).collect())
    }
}
