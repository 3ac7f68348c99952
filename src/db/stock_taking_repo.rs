// src/db/stock_taking_repo.rs

use sqlx::{Executor, Postgres};

use crate::{
    common::error::AppError,
    models::stock::{StockTakingLine, StockTakingRow},
    services::reconciliation::BatchCount,
};

#[derive(Clone, Default)]
pub struct StockTakingRepository;

impl StockTakingRepository {
    pub fn new() -> Self {
        Self
    }

    pub async fn insert_header<'e, E>(
        &self,
        executor: E,
        created_by: &str,
        notes: Option<&str>,
    ) -> Result<StockTakingRow, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let row = sqlx::query_as::<_, StockTakingRow>(
            "INSERT INTO stock_takings (created_by, notes) VALUES ($1, $2) RETURNING *",
        )
        .bind(created_by)
        .bind(notes)
        .fetch_one(executor)
        .await?;
        Ok(row)
    }

    pub async fn insert_line<'e, E>(
        &self,
        executor: E,
        stock_taking_id: i64,
        product_id: &str,
        count: &BatchCount,
    ) -> Result<StockTakingLine, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let line = sqlx::query_as::<_, StockTakingLine>(
            r#"
            INSERT INTO stock_taking_lines (
                stock_taking_id, product_id, batch_no, quantity, previous_quantity,
                manufacture_date, expire_date
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(stock_taking_id)
        .bind(product_id)
        .bind(&count.batch_no)
        .bind(count.quantity)
        .bind(count.previous_quantity)
        .bind(count.manufacture_date)
        .bind(count.expire_date)
        .fetch_one(executor)
        .await?;
        Ok(line)
    }

    pub async fn find_by_id<'e, E>(&self, executor: E, id: i64) -> Result<Option<StockTakingRow>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let row = sqlx::query_as::<_, StockTakingRow>("SELECT * FROM stock_takings WHERE id = $1")
            .bind(id)
            .fetch_optional(executor)
            .await?;
        Ok(row)
    }

    pub async fn list<'e, E>(&self, executor: E) -> Result<Vec<StockTakingRow>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let rows = sqlx::query_as::<_, StockTakingRow>("SELECT * FROM stock_takings ORDER BY id ASC")
            .fetch_all(executor)
            .await?;
        Ok(rows)
    }

    pub async fn lines_for<'e, E>(&self, executor: E, ids: &[i64]) -> Result<Vec<StockTakingLine>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let lines = sqlx::query_as::<_, StockTakingLine>(
            "SELECT * FROM stock_taking_lines WHERE stock_taking_id = ANY($1) ORDER BY id ASC",
        )
        .bind(ids)
        .fetch_all(executor)
        .await?;
        Ok(lines)
    }
}
