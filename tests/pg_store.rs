//! Testes do armazenamento em Postgres.
//!
//! Rodam apenas com `DATABASE_URL` apontando para um banco descartável;
//! sem a variável, cada teste retorna sem fazer nada.

use std::sync::{
    atomic::{AtomicU32, Ordering},
    Arc,
};
use std::time::Duration;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::{postgres::PgPoolOptions, PgPool};

use pharmacy_stock::{
    common::error::AppError,
    db::{PgStockStore, StockStore},
    models::stock::{
        AdjustmentType, CacheMetadataUpdate, NewCacheEntry, NewStockAdjustment, NewStockTaking,
        ObservedBatch, ObservedProduct,
    },
    services::reconciliation,
};

async fn pg_store() -> Option<(PgStockStore, PgPool)> {
    let Ok(url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL não definida, pulando teste do Postgres");
        return None;
    };
    let pool = PgPoolOptions::new()
        .max_connections(12)
        .connect(&url)
        .await
        .expect("conexão com o banco de testes");
    sqlx::migrate!().run(&pool).await.expect("migrações");
    Some((PgStockStore::new(pool.clone()), pool))
}

// Os testes dividem o banco: cada um usa seus próprios produtos
fn product(tag: &str) -> String {
    static SEQ: AtomicU32 = AtomicU32::new(0);
    format!(
        "{tag}-{}-{}-{}",
        std::process::id(),
        chrono::Utc::now().timestamp_micros(),
        SEQ.fetch_add(1, Ordering::Relaxed)
    )
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn command(product_id: &str, batch_no: &str, kind: AdjustmentType, quantity: i64) -> NewStockAdjustment {
    let needs_recipient = kind.requires_recipient();
    NewStockAdjustment {
        product_id: product_id.to_string(),
        batch_no: batch_no.to_string(),
        adjustment_type: kind,
        quantity_adjusted: quantity,
        reason: "Teste".to_string(),
        created_by: "farmaceutica".to_string(),
        destination: needs_recipient.then(|| "Filial Centro".to_string()),
        recipient_name: needs_recipient.then(|| "Ana".to_string()),
        recipient_contact: None,
        reverses_id: None,
    }
}

async fn seed(store: &PgStockStore, product_id: &str, batch_no: &str, quantity: i64) -> i64 {
    store
        .create_cache_entry(NewCacheEntry {
            product_id: product_id.to_string(),
            batch_no: batch_no.to_string(),
            current_quantity: quantity,
            product_price: Decimal::new(990, 2),
            manufacture_date: Some(date(2025, 1, 1)),
            expire_date: Some(date(2027, 1, 1)),
        })
        .await
        .expect("cadastro do lote")
        .id
}

async fn assert_consistent(store: &PgStockStore, cache_id: i64) {
    let slice = store.ledger_slice(cache_id).await.unwrap().expect("lote");
    let report = reconciliation::reconcile(&slice.cache, &slice.entries);
    assert!(report.consistent, "{report:?}");
}

#[tokio::test]
async fn adjustments_move_stock_and_reject_oversell() {
    let Some((store, _)) = pg_store().await else { return };
    let pid = product("MED");
    let cache_id = seed(&store, &pid, "B1", 10).await;

    let applied = store
        .record_adjustment(command(&pid, "B1", AdjustmentType::Increase, 100))
        .await
        .unwrap();
    assert_eq!(applied.adjustment.quantity_before, 10);
    assert_eq!(applied.cache.current_quantity, 110);
    assert_eq!(applied.cache.version, 2);

    let applied = store
        .record_adjustment(command(&pid, "B1", AdjustmentType::Decrease, 30))
        .await
        .unwrap();
    assert_eq!(applied.cache.current_quantity, 80);

    let result = store
        .record_adjustment(command(&pid, "B1", AdjustmentType::Transfer, 81))
        .await;
    assert!(matches!(result, Err(AppError::InsufficientStock { .. })), "{result:?}");

    let slice = store.ledger_slice(cache_id).await.unwrap().unwrap();
    assert_eq!(slice.cache.current_quantity, 80);
    assert_eq!(slice.entries.len(), 2);
    assert_consistent(&store, cache_id).await;

    // Entrada em lote desconhecido cria a linha do cache
    let applied = store
        .record_adjustment(command(&pid, "NOVO", AdjustmentType::Increase, 7))
        .await
        .unwrap();
    assert_eq!(applied.cache.current_quantity, 7);
    assert_eq!(applied.cache.baseline_quantity, 0);
}

#[tokio::test]
async fn stock_taking_upserts_batches_and_keeps_known_dates() {
    let Some((store, _)) = pg_store().await else { return };
    let pid = product("MED");
    let b1 = seed(&store, &pid, "B1", 10).await;
    store
        .record_adjustment(command(&pid, "B2", AdjustmentType::Increase, 15))
        .await
        .unwrap();

    let receipt = store
        .record_stock_taking(NewStockTaking {
            created_by: "farmaceutica".to_string(),
            notes: Some("inventário de maio".to_string()),
            products: vec![ObservedProduct {
                product_id: pid.clone(),
                batches: vec![
                    ObservedBatch {
                        batch_no: "B1".to_string(),
                        quantity: 8,
                        manufacture_date: None,
                        expire_date: None,
                    },
                    ObservedBatch {
                        batch_no: "B3".to_string(),
                        quantity: 4,
                        manufacture_date: None,
                        expire_date: Some(date(2028, 6, 30)),
                    },
                ],
            }],
        })
        .await
        .unwrap();

    assert_eq!(receipt.variances[0].previous_total, 25);
    assert_eq!(receipt.variances[0].observed_total, 12);
    assert_eq!(receipt.variances[0].difference, -13);

    let quantity_of = |batch: &str| {
        receipt
            .cache_updates
            .iter()
            .find(|c| c.batch_no == batch)
            .map(|c| c.current_quantity)
    };
    assert_eq!(quantity_of("B1"), Some(8));
    assert_eq!(quantity_of("B2"), Some(0));
    assert_eq!(quantity_of("B3"), Some(4));

    // Datas em branco na contagem não apagam as do cadastro
    let cached = store.get_cache_entry(b1).await.unwrap().unwrap();
    assert_eq!(cached.expire_date, Some(date(2027, 1, 1)));
    assert_eq!(cached.baseline_quantity, 8);

    // As linhas gravadas trazem as mesmas datas do cache
    let taking = store
        .get_stock_taking(receipt.stock_taking.id)
        .await
        .unwrap()
        .expect("inventário");
    let batches = &taking.products[0].batches;
    assert_eq!(batches.len(), 2);
    let line = batches.iter().find(|b| b.batch_no == "B1").unwrap();
    assert_eq!(line.previous_quantity, 10);
    assert_eq!(line.manufacture_date, Some(date(2025, 1, 1)));
    assert_eq!(line.expire_date, Some(date(2027, 1, 1)));

    // Ajuste posterior entra no delta a partir do novo baseline
    store
        .record_adjustment(command(&pid, "B1", AdjustmentType::Decrease, 3))
        .await
        .unwrap();
    let slice = store.ledger_slice(b1).await.unwrap().unwrap();
    assert_eq!(slice.entries.len(), 1);
    assert_consistent(&store, b1).await;
}

#[tokio::test]
async fn reversal_compensates_once_and_not_across_a_count() {
    let Some((store, _)) = pg_store().await else { return };
    let pid = product("MED");
    let cache_id = seed(&store, &pid, "B1", 50).await;

    let original = store
        .record_adjustment(command(&pid, "B1", AdjustmentType::Decrease, 8))
        .await
        .unwrap()
        .adjustment;
    let reversal = store.reverse_adjustment(original.id, "gerente").await.unwrap();
    assert_eq!(reversal.adjustment.adjustment_type, AdjustmentType::Increase);
    assert_eq!(reversal.adjustment.reverses_id, Some(original.id));
    assert_eq!(reversal.cache.current_quantity, 50);

    let again = store.reverse_adjustment(original.id, "gerente").await;
    assert!(matches!(again, Err(AppError::AlreadyReversed(id)) if id == original.id));
    let nested = store.reverse_adjustment(reversal.adjustment.id, "gerente").await;
    assert!(matches!(nested, Err(AppError::CannotReverseReversal(_))));

    let counted = store
        .record_adjustment(command(&pid, "B1", AdjustmentType::Decrease, 5))
        .await
        .unwrap()
        .adjustment;
    store
        .record_stock_taking(NewStockTaking {
            created_by: "farmaceutica".to_string(),
            notes: None,
            products: vec![ObservedProduct {
                product_id: pid.clone(),
                batches: vec![ObservedBatch {
                    batch_no: "B1".to_string(),
                    quantity: 45,
                    manufacture_date: None,
                    expire_date: None,
                }],
            }],
        })
        .await
        .unwrap();

    let result = store.reverse_adjustment(counted.id, "gerente").await;
    assert!(matches!(result, Err(AppError::SupersededByCount(id)) if id == counted.id), "{result:?}");
    let cached = store.get_cache_entry(cache_id).await.unwrap().unwrap();
    assert_eq!(cached.current_quantity, 45);
    assert_consistent(&store, cache_id).await;

    let missing = store.reverse_adjustment(i64::MAX, "gerente").await;
    assert!(matches!(missing, Err(AppError::AdjustmentNotFound(_))));
}

#[tokio::test]
async fn concurrent_decreases_never_oversell() {
    let Some((store, _)) = pg_store().await else { return };
    let store = Arc::new(store);
    let pid = product("MED");
    let cache_id = seed(&store, &pid, "B1", 15).await;

    let mut handles = Vec::new();
    for _ in 0..20 {
        let store = store.clone();
        let pid = pid.clone();
        handles.push(tokio::spawn(async move {
            store
                .record_adjustment(command(&pid, "B1", AdjustmentType::Decrease, 1))
                .await
        }));
    }

    let mut accepted = 0;
    let mut refused = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => accepted += 1,
            Err(AppError::InsufficientStock { .. }) => refused += 1,
            Err(other) => panic!("erro inesperado: {other:?}"),
        }
    }

    assert_eq!(accepted, 15);
    assert_eq!(refused, 5);
    let cached = store.get_cache_entry(cache_id).await.unwrap().unwrap();
    assert_eq!(cached.current_quantity, 0);
    assert_consistent(&store, cache_id).await;
}

#[tokio::test]
async fn adjustment_waits_for_a_pending_row_edit() {
    let Some((store, pool)) = pg_store().await else { return };
    let store = Arc::new(store);
    let pid = product("MED");
    let cache_id = seed(&store, &pid, "B1", 10).await;

    // Outra sessão altera o lote e segura a transação aberta
    let mut editor = pool.begin().await.unwrap();
    sqlx::query("UPDATE medicines_cache SET version = version + 1, product_price = 3 WHERE id = $1")
        .bind(cache_id)
        .execute(&mut *editor)
        .await
        .unwrap();

    let pending = {
        let store = store.clone();
        let pid = pid.clone();
        tokio::spawn(async move {
            store
                .record_adjustment(command(&pid, "B1", AdjustmentType::Decrease, 1))
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(200)).await;
    editor.commit().await.unwrap();

    let applied = pending.await.unwrap().expect("ajuste após a edição");
    assert_eq!(applied.cache.current_quantity, 9);
    assert_eq!(applied.cache.version, 3);
    assert_eq!(applied.cache.product_price, Decimal::new(3, 0));
}

#[tokio::test]
async fn metadata_edits_and_adjustments_interleave_without_spurious_conflicts() {
    let Some((store, _)) = pg_store().await else { return };
    let store = Arc::new(store);
    let pid = product("MED");
    let cache_id = seed(&store, &pid, "B1", 100).await;

    let mut handles = Vec::new();
    for i in 0..10i64 {
        let writer = store.clone();
        let pid = pid.clone();
        handles.push(tokio::spawn(async move {
            writer
                .record_adjustment(command(&pid, "B1", AdjustmentType::Decrease, 2))
                .await
                .map(|_| ())
        }));

        let editor = store.clone();
        handles.push(tokio::spawn(async move {
            let current = editor.get_cache_entry(cache_id).await.unwrap().expect("lote");
            let patch = CacheMetadataUpdate {
                product_price: Some(Decimal::new(1000 + i, 2)),
                manufacture_date: None,
                expire_date: None,
                version: current.version,
            };
            match editor.update_cache_metadata(cache_id, patch).await {
                // Versão lida antes de outra escrita: conflito legítimo
                Err(AppError::VersionConflict { .. }) | Ok(_) => Ok(()),
                Err(other) => Err(other),
            }
        }));
    }

    for handle in handles {
        handle.await.unwrap().expect("nenhuma escrita deve falhar");
    }

    let cached = store.get_cache_entry(cache_id).await.unwrap().unwrap();
    assert_eq!(cached.current_quantity, 80);
    assert_consistent(&store, cache_id).await;

    let stale = store
        .update_cache_metadata(
            cache_id,
            CacheMetadataUpdate {
                product_price: Some(Decimal::ONE),
                manufacture_date: None,
                expire_date: None,
                version: cached.version - 1,
            },
        )
        .await;
    assert!(matches!(stale, Err(AppError::VersionConflict { .. })));
    let missing = store
        .update_cache_metadata(
            i64::MAX,
            CacheMetadataUpdate {
                product_price: None,
                manufacture_date: None,
                expire_date: None,
                version: 1,
            },
        )
        .await;
    assert!(matches!(missing, Err(AppError::CacheEntryNotFound(_))));
}
