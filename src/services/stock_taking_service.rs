// src/services/stock_taking_service.rs

use std::sync::Arc;

use crate::{
    common::error::AppError,
    db::StockStore,
    models::stock::{NewStockTaking, ObservedProduct, StockTaking, StockTakingReceipt},
    services::{reconciliation, spreadsheet},
};

#[derive(Clone)]
pub struct StockTakingService {
    store: Arc<dyn StockStore>,
}

impl StockTakingService {
    pub fn new(store: Arc<dyn StockStore>) -> Self {
        Self { store }
    }

    /// Aplica a contagem física: o valor contado substitui o saldo de cada lote.
    pub async fn submit(
        &self,
        actor_id: &str,
        notes: Option<String>,
        products: Vec<ObservedProduct>,
    ) -> Result<StockTakingReceipt, AppError> {
        reconciliation::ensure_unique_counts(&products)?;

        let receipt = self
            .store
            .record_stock_taking(NewStockTaking {
                created_by: actor_id.to_string(),
                notes,
                products,
            })
            .await?;

        for variance in receipt.variances.iter().filter(|v| v.difference != 0) {
            tracing::info!(
                stock_taking_id = receipt.stock_taking.id,
                product_id = %variance.product_id,
                previous = variance.previous_total,
                observed = variance.observed_total,
                difference = variance.difference,
                "📋 Divergência de inventário"
            );
        }
        tracing::info!(
            stock_taking_id = receipt.stock_taking.id,
            products = receipt.variances.len(),
            "✅ Inventário registrado"
        );

        Ok(receipt)
    }

    pub async fn import_csv(
        &self,
        actor_id: &str,
        text: &str,
        notes: Option<String>,
    ) -> Result<StockTakingReceipt, AppError> {
        let products = spreadsheet::parse_stock_taking_csv(text)?;
        tracing::info!(products = products.len(), "📄 Planilha de inventário lida");
        self.submit(actor_id, notes, products).await
    }

    pub async fn list(&self) -> Result<Vec<StockTaking>, AppError> {
        self.store.list_stock_takings().await
    }

    pub async fn get(&self, id: i64) -> Result<StockTaking, AppError> {
        self.store
            .get_stock_taking(id)
            .await?
            .ok_or(AppError::StockTakingNotFound(id))
    }
}
