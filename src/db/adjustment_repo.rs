// src/db/adjustment_repo.rs

use sqlx::{Executor, Postgres, QueryBuilder};

use crate::{
    common::error::AppError,
    models::stock::{AdjustmentFilter, NewStockAdjustment, StockAdjustment},
    services::reconciliation::ResolvedAnnotation,
};

#[derive(Clone, Default)]
pub struct StockAdjustmentRepository;

impl StockAdjustmentRepository {
    pub fn new() -> Self {
        Self
    }

    /// Serializa as escritas de um produto até o fim da transação.
    pub async fn lock_product<'e, E>(&self, executor: E, product_id: &str) -> Result<(), AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1)::bigint)")
            .bind(product_id)
            .execute(executor)
            .await?;
        Ok(())
    }

    /// Maior id do livro-razão para o produto (0 se não houver lançamentos).
    pub async fn ledger_head<'e, E>(&self, executor: E, product_id: &str) -> Result<i64, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let head: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(id), 0)::BIGINT FROM stock_adjustments WHERE product_id = $1",
        )
        .bind(product_id)
        .fetch_one(executor)
        .await?;
        Ok(head)
    }

    pub async fn insert<'e, E>(
        &self,
        executor: E,
        command: &NewStockAdjustment,
        quantity_before: i64,
        quantity_after: i64,
    ) -> Result<StockAdjustment, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query_as::<_, StockAdjustment>(
            r#"
            INSERT INTO stock_adjustments (
                product_id, batch_no, adjustment_type, quantity_adjusted, reason, created_by,
                destination, recipient_name, recipient_contact, reverses_id,
                quantity_before, quantity_after
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING *
            "#,
        )
        .bind(&command.product_id)
        .bind(&command.batch_no)
        .bind(command.adjustment_type)
        .bind(command.quantity_adjusted)
        .bind(&command.reason)
        .bind(&command.created_by)
        .bind(&command.destination)
        .bind(&command.recipient_name)
        .bind(&command.recipient_contact)
        .bind(command.reverses_id)
        .bind(quantity_before)
        .bind(quantity_after)
        .fetch_one(executor)
        .await
        .map_err(|e| {
            // Dois estornos concorrentes do mesmo lançamento
            if let (sqlx::Error::Database(db_err), Some(original)) = (&e, command.reverses_id) {
                if db_err.is_unique_violation() {
                    return AppError::AlreadyReversed(original);
                }
            }
            e.into()
        })
    }

    pub async fn find_by_id<'e, E>(&self, executor: E, id: i64) -> Result<Option<StockAdjustment>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let entry = sqlx::query_as::<_, StockAdjustment>("SELECT * FROM stock_adjustments WHERE id = $1")
            .bind(id)
            .fetch_optional(executor)
            .await?;
        Ok(entry)
    }

    pub async fn find_for_update<'e, E>(&self, executor: E, id: i64) -> Result<Option<StockAdjustment>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let entry = sqlx::query_as::<_, StockAdjustment>(
            "SELECT * FROM stock_adjustments WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(executor)
        .await?;
        Ok(entry)
    }

    pub async fn is_reversed<'e, E>(&self, executor: E, id: i64) -> Result<bool, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let reversed: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM stock_adjustments WHERE reverses_id = $1)")
                .bind(id)
                .fetch_one(executor)
                .await?;
        Ok(reversed)
    }

    pub async fn update_annotation<'e, E>(
        &self,
        executor: E,
        id: i64,
        annotation: &ResolvedAnnotation,
    ) -> Result<StockAdjustment, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let entry = sqlx::query_as::<_, StockAdjustment>(
            r#"
            UPDATE stock_adjustments
            SET reason = $2, destination = $3, recipient_name = $4, recipient_contact = $5
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&annotation.reason)
        .bind(&annotation.destination)
        .bind(&annotation.recipient_name)
        .bind(&annotation.recipient_contact)
        .fetch_one(executor)
        .await?;
        Ok(entry)
    }

    pub async fn list<'e, E>(&self, executor: E, filter: &AdjustmentFilter) -> Result<Vec<StockAdjustment>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT * FROM stock_adjustments WHERE TRUE");

        if let Some(product_id) = &filter.product_id {
            builder.push(" AND product_id = ").push_bind(product_id);
        }
        if let Some(batch_no) = &filter.batch_no {
            builder.push(" AND batch_no = ").push_bind(batch_no);
        }
        if !filter.types.is_empty() {
            builder.push(" AND adjustment_type IN (");
            let mut separated = builder.separated(", ");
            for kind in &filter.types {
                separated.push_bind(*kind);
            }
            separated.push_unseparated(")");
        }
        builder.push(" ORDER BY id ASC");

        let entries = builder
            .build_query_as::<StockAdjustment>()
            .fetch_all(executor)
            .await?;
        Ok(entries)
    }

    /// Lançamentos posteriores ao menor baseline do cache, para conciliação em lote.
    pub async fn list_after<'e, E>(&self, executor: E, after_id: i64) -> Result<Vec<StockAdjustment>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let entries = sqlx::query_as::<_, StockAdjustment>(
            "SELECT * FROM stock_adjustments WHERE id > $1 ORDER BY id ASC",
        )
        .bind(after_id)
        .fetch_all(executor)
        .await?;
        Ok(entries)
    }

    pub async fn list_for_batch_after<'e, E>(
        &self,
        executor: E,
        product_id: &str,
        batch_no: &str,
        after_id: i64,
    ) -> Result<Vec<StockAdjustment>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let entries = sqlx::query_as::<_, StockAdjustment>(
            r#"
            SELECT * FROM stock_adjustments
            WHERE product_id = $1 AND batch_no = $2 AND id > $3
            ORDER BY id ASC
            "#,
        )
        .bind(product_id)
        .bind(batch_no)
        .bind(after_id)
        .fetch_all(executor)
        .await?;
        Ok(entries)
    }
}
