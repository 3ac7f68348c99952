// src/db/cache_repo.rs

use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::{Executor, Postgres, QueryBuilder};

use crate::{
    common::error::AppError,
    models::stock::{CacheFilter, MedicineCache},
    services::reconciliation::ResolvedMetadata,
};

/// Valores de um lote na criação do registro no cache.
pub struct CacheRowInsert<'a> {
    pub product_id: &'a str,
    pub batch_no: &'a str,
    pub current_quantity: i64,
    pub product_price: Decimal,
    pub manufacture_date: Option<NaiveDate>,
    pub expire_date: Option<NaiveDate>,
    pub baseline_quantity: i64,
    pub baseline_seq: i64,
}

#[derive(Clone, Default)]
pub struct MedicinesCacheRepository;

impl MedicinesCacheRepository {
    pub fn new() -> Self {
        Self
    }

    pub async fn find_by_id<'e, E>(&self, executor: E, id: i64) -> Result<Option<MedicineCache>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let row = sqlx::query_as::<_, MedicineCache>("SELECT * FROM medicines_cache WHERE id = $1")
            .bind(id)
            .fetch_optional(executor)
            .await?;
        Ok(row)
    }

    pub async fn find_by_key<'e, E>(
        &self,
        executor: E,
        product_id: &str,
        batch_no: &str,
    ) -> Result<Option<MedicineCache>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let row = sqlx::query_as::<_, MedicineCache>(
            "SELECT * FROM medicines_cache WHERE product_id = $1 AND batch_no = $2",
        )
        .bind(product_id)
        .bind(batch_no)
        .fetch_optional(executor)
        .await?;
        Ok(row)
    }

    /// Igual a `find_by_key`, travando a linha até o fim da transação.
    pub async fn find_by_key_for_update<'e, E>(
        &self,
        executor: E,
        product_id: &str,
        batch_no: &str,
    ) -> Result<Option<MedicineCache>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let row = sqlx::query_as::<_, MedicineCache>(
            "SELECT * FROM medicines_cache WHERE product_id = $1 AND batch_no = $2 FOR UPDATE",
        )
        .bind(product_id)
        .bind(batch_no)
        .fetch_optional(executor)
        .await?;
        Ok(row)
    }

    pub async fn product_of<'e, E>(&self, executor: E, id: i64) -> Result<Option<String>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let product_id: Option<String> = sqlx::query_scalar("SELECT product_id FROM medicines_cache WHERE id = $1")
            .bind(id)
            .fetch_optional(executor)
            .await?;
        Ok(product_id)
    }

    pub async fn find_by_product<'e, E>(&self, executor: E, product_id: &str) -> Result<Vec<MedicineCache>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let rows = sqlx::query_as::<_, MedicineCache>(
            "SELECT * FROM medicines_cache WHERE product_id = $1 ORDER BY batch_no ASC",
        )
        .bind(product_id)
        .fetch_all(executor)
        .await?;
        Ok(rows)
    }

    pub async fn insert<'e, E>(&self, executor: E, row: &CacheRowInsert<'_>) -> Result<MedicineCache, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query_as::<_, MedicineCache>(
            r#"
            INSERT INTO medicines_cache (
                product_id, batch_no, current_quantity, product_price,
                manufacture_date, expire_date, baseline_quantity, baseline_seq
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(row.product_id)
        .bind(row.batch_no)
        .bind(row.current_quantity)
        .bind(row.product_price)
        .bind(row.manufacture_date)
        .bind(row.expire_date)
        .bind(row.baseline_quantity)
        .bind(row.baseline_seq)
        .fetch_one(executor)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(db_err) = &e {
                if db_err.is_unique_violation() {
                    return AppError::CacheEntryAlreadyExists {
                        product_id: row.product_id.to_string(),
                        batch_no: row.batch_no.to_string(),
                    };
                }
            }
            e.into()
        })
    }

    /// Atualiza o saldo se a versão ainda for `version`; `None` indica escrita concorrente.
    pub async fn set_quantity<'e, E>(
        &self,
        executor: E,
        id: i64,
        version: i64,
        quantity: i64,
    ) -> Result<Option<MedicineCache>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let row = sqlx::query_as::<_, MedicineCache>(
            r#"
            UPDATE medicines_cache
            SET current_quantity = $3, version = version + 1, updated_at = NOW()
            WHERE id = $1 AND version = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(version)
        .bind(quantity)
        .fetch_optional(executor)
        .await?;
        Ok(row)
    }

    /// Grava o valor contado como novo baseline do lote, criando o registro se preciso.
    pub async fn upsert_count<'e, E>(&self, executor: E, row: &CacheRowInsert<'_>) -> Result<MedicineCache, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let written = sqlx::query_as::<_, MedicineCache>(
            r#"
            INSERT INTO medicines_cache (
                product_id, batch_no, current_quantity, product_price,
                manufacture_date, expire_date, baseline_quantity, baseline_seq
            )
            VALUES ($1, $2, $3, 0, $4, $5, $3, $6)
            ON CONFLICT (product_id, batch_no) DO UPDATE SET
                current_quantity  = EXCLUDED.current_quantity,
                baseline_quantity = EXCLUDED.baseline_quantity,
                baseline_seq      = EXCLUDED.baseline_seq,
                manufacture_date  = COALESCE(EXCLUDED.manufacture_date, medicines_cache.manufacture_date),
                expire_date       = COALESCE(EXCLUDED.expire_date, medicines_cache.expire_date),
                version           = medicines_cache.version + 1,
                updated_at        = NOW()
            RETURNING *
            "#,
        )
        .bind(row.product_id)
        .bind(row.batch_no)
        .bind(row.current_quantity)
        .bind(row.manufacture_date)
        .bind(row.expire_date)
        .bind(row.baseline_seq)
        .fetch_one(executor)
        .await?;
        Ok(written)
    }

    pub async fn update_metadata<'e, E>(
        &self,
        executor: E,
        id: i64,
        version: i64,
        metadata: &ResolvedMetadata,
    ) -> Result<Option<MedicineCache>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let row = sqlx::query_as::<_, MedicineCache>(
            r#"
            UPDATE medicines_cache
            SET product_price = $3, manufacture_date = $4, expire_date = $5,
                version = version + 1, updated_at = NOW()
            WHERE id = $1 AND version = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(version)
        .bind(metadata.product_price)
        .bind(metadata.manufacture_date)
        .bind(metadata.expire_date)
        .fetch_optional(executor)
        .await?;
        Ok(row)
    }

    pub async fn list<'e, E>(&self, executor: E, filter: &CacheFilter) -> Result<Vec<MedicineCache>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("SELECT * FROM medicines_cache WHERE TRUE");

        if let Some(product_id) = &filter.product_id {
            builder.push(" AND product_id = ").push_bind(product_id);
        }
        if let Some(batch_no) = &filter.batch_no {
            builder.push(" AND batch_no = ").push_bind(batch_no);
        }
        if let Some(limit) = filter.expiring_before {
            builder.push(" AND expire_date < ").push_bind(limit);
        }
        match filter.in_stock {
            Some(true) => {
                builder.push(" AND current_quantity > 0");
            }
            Some(false) => {
                builder.push(" AND current_quantity = 0");
            }
            None => {}
        }
        builder.push(" ORDER BY product_id ASC, batch_no ASC");

        let rows = builder.build_query_as::<MedicineCache>().fetch_all(executor).await?;
        Ok(rows)
    }
}
