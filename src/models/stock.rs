// src/models/stock.rs

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};

// --- 1. Tipos de Ajuste (Livro-razão) ---
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "adjustment_type", rename_all = "lowercase")] // Banco
#[serde(rename_all = "lowercase")] // JSON
pub enum AdjustmentType {
    Increase, // Vira "increase"
    Decrease,
    Transfer, // Saída para outra filial
    Donation,
}

impl AdjustmentType {
    pub const ALL: [AdjustmentType; 4] = [
        AdjustmentType::Increase,
        AdjustmentType::Decrease,
        AdjustmentType::Transfer,
        AdjustmentType::Donation,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AdjustmentType::Increase => "increase",
            AdjustmentType::Decrease => "decrease",
            AdjustmentType::Transfer => "transfer",
            AdjustmentType::Donation => "donation",
        }
    }

    /// Apenas `increase` soma ao saldo; os demais tipos são saídas.
    pub fn is_outflow(self) -> bool {
        !matches!(self, AdjustmentType::Increase)
    }

    /// Transferências e doações exigem destino e destinatário.
    pub fn requires_recipient(self) -> bool {
        matches!(self, AdjustmentType::Transfer | AdjustmentType::Donation)
    }

    /// Converte a magnitude (sempre positiva) no delta com sinal.
    pub fn signed(self, quantity: i64) -> i64 {
        if self.is_outflow() { -quantity } else { quantity }
    }

    /// Tipo do lançamento compensatório (estorno).
    pub fn reversal(self) -> AdjustmentType {
        match self {
            AdjustmentType::Increase => AdjustmentType::Decrease,
            _ => AdjustmentType::Increase,
        }
    }
}

impl fmt::Display for AdjustmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AdjustmentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        AdjustmentType::ALL
            .into_iter()
            .find(|kind| kind.as_str() == wanted)
            .ok_or_else(|| s.to_string())
    }
}

// --- 2. Lançamento do Livro-razão (imutável) ---
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct StockAdjustment {
    #[schema(example = 42)]
    pub id: i64,
    #[schema(example = "MED001")]
    pub product_id: String,
    #[schema(example = "B1")]
    pub batch_no: String,
    pub adjustment_type: AdjustmentType,
    #[schema(example = 30)]
    pub quantity_adjusted: i64,
    #[schema(example = "Avaria no transporte")]
    pub reason: String,
    pub created_by: String,
    pub destination: Option<String>,
    pub recipient_name: Option<String>,
    pub recipient_contact: Option<String>,
    // Preenchido apenas nos estornos
    pub reverses_id: Option<i64>,
    pub quantity_before: i64,
    pub quantity_after: i64,
    pub created_at: DateTime<Utc>,
}

impl StockAdjustment {
    pub fn signed_quantity(&self) -> i64 {
        self.adjustment_type.signed(self.quantity_adjusted)
    }
}

// --- 3. Cache de Medicamentos (projeção do saldo por lote) ---
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct MedicineCache {
    pub id: i64,
    #[schema(example = "MED001")]
    pub product_id: String,
    #[schema(example = "B1")]
    pub batch_no: String,
    #[schema(example = 80)]
    pub current_quantity: i64,
    #[schema(value_type = f64, example = 12.5)]
    pub product_price: Decimal,
    pub manufacture_date: Option<NaiveDate>,
    pub expire_date: Option<NaiveDate>,

    // Último valor autoritativo (cadastro inicial ou inventário)
    pub baseline_quantity: i64,
    // Maior id do livro-razão já contemplado pelo baseline
    pub baseline_seq: i64,

    // Token de concorrência otimista
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Visão agregada por produto (soma dos lotes).
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ProductStock {
    pub product_id: String,
    pub current_quantity: i64,
    // Validade mais próxima entre os lotes com saldo (FEFO)
    pub next_expiry: Option<NaiveDate>,
    pub batches: Vec<MedicineCache>,
}

/// Resposta do registro de um ajuste: o lançamento e o saldo resultante.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AppliedAdjustment {
    #[serde(flatten)]
    pub adjustment: StockAdjustment,
    pub cache: MedicineCache,
}

// --- 4. Inventário (Contagem Física) ---
#[derive(Debug, Clone, FromRow)]
pub struct StockTakingRow {
    pub id: i64,
    pub created_by: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct StockTakingLine {
    pub id: i64,
    pub stock_taking_id: i64,
    pub product_id: String,
    pub batch_no: String,
    pub quantity: i64,
    pub previous_quantity: i64,
    pub manufacture_date: Option<NaiveDate>,
    pub expire_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CountedBatch {
    pub batch_no: String,
    pub quantity: i64,
    pub previous_quantity: i64,
    pub manufacture_date: Option<NaiveDate>,
    pub expire_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CountedProduct {
    pub product_id: String,
    pub batches: Vec<CountedBatch>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StockTaking {
    pub id: i64,
    pub created_by: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub products: Vec<CountedProduct>,
}

impl StockTaking {
    /// Monta o registro a partir do cabeçalho e das linhas persistidas,
    /// agrupando por produto na ordem em que aparecem.
    pub fn assemble(row: StockTakingRow, lines: Vec<StockTakingLine>) -> Self {
        let mut products: Vec<CountedProduct> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();

        for line in lines {
            let position = *index.entry(line.product_id.clone()).or_insert_with(|| {
                products.push(CountedProduct {
                    product_id: line.product_id.clone(),
                    batches: Vec::new(),
                });
                products.len() - 1
            });

            products[position].batches.push(CountedBatch {
                batch_no: line.batch_no,
                quantity: line.quantity,
                previous_quantity: line.previous_quantity,
                manufacture_date: line.manufacture_date,
                expire_date: line.expire_date,
            });
        }

        Self {
            id: row.id,
            created_by: row.created_by,
            notes: row.notes,
            created_at: row.created_at,
            products,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct ProductVariance {
    pub product_id: String,
    pub previous_total: i64,
    pub observed_total: i64,
    pub difference: i64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct StockTakingReceipt {
    pub stock_taking: StockTaking,
    pub cache_updates: Vec<MedicineCache>,
    pub variances: Vec<ProductVariance>,
}

// --- 5. Conciliação ---
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct ReconciliationReport {
    pub cache_id: i64,
    pub product_id: String,
    pub batch_no: String,
    pub cached_quantity: i64,
    pub baseline_quantity: i64,
    pub ledger_delta: i64,
    pub expected_quantity: i64,
    pub entries_since_baseline: usize,
    pub consistent: bool,
}

// ---
// Comandos de escrita (já validados) entregues ao StockStore
// ---

#[derive(Debug, Clone)]
pub struct NewStockAdjustment {
    pub product_id: String,
    pub batch_no: String,
    pub adjustment_type: AdjustmentType,
    pub quantity_adjusted: i64,
    pub reason: String,
    pub created_by: String,
    pub destination: Option<String>,
    pub recipient_name: Option<String>,
    pub recipient_contact: Option<String>,
    pub reverses_id: Option<i64>,
}

/// Campos descritivos que podem ser corrigidos num lançamento.
#[derive(Debug, Clone, Default)]
pub struct AdjustmentAnnotation {
    pub reason: Option<String>,
    pub destination: Option<String>,
    pub recipient_name: Option<String>,
    pub recipient_contact: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct AdjustmentFilter {
    pub product_id: Option<String>,
    pub batch_no: Option<String>,
    pub types: Vec<AdjustmentType>,
}

impl AdjustmentFilter {
    pub fn matches(&self, entry: &StockAdjustment) -> bool {
        self.product_id.as_ref().is_none_or(|p| *p == entry.product_id)
            && self.batch_no.as_ref().is_none_or(|b| *b == entry.batch_no)
            && (self.types.is_empty() || self.types.contains(&entry.adjustment_type))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObservedBatch {
    pub batch_no: String,
    pub quantity: i64,
    pub manufacture_date: Option<NaiveDate>,
    pub expire_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObservedProduct {
    pub product_id: String,
    pub batches: Vec<ObservedBatch>,
}

#[derive(Debug, Clone)]
pub struct NewStockTaking {
    pub created_by: String,
    pub notes: Option<String>,
    pub products: Vec<ObservedProduct>,
}

#[derive(Debug, Clone)]
pub struct NewCacheEntry {
    pub product_id: String,
    pub batch_no: String,
    pub current_quantity: i64,
    pub product_price: Decimal,
    pub manufacture_date: Option<NaiveDate>,
    pub expire_date: Option<NaiveDate>,
}

#[derive(Debug, Clone)]
pub struct CacheMetadataUpdate {
    pub product_price: Option<Decimal>,
    pub manufacture_date: Option<NaiveDate>,
    pub expire_date: Option<NaiveDate>,
    pub version: i64,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct CacheFilter {
    pub product_id: Option<String>,
    pub batch_no: Option<String>,
    /// Apenas lotes com validade anterior a esta data
    pub expiring_before: Option<NaiveDate>,
    pub in_stock: Option<bool>,
}

impl CacheFilter {
    pub fn matches(&self, row: &MedicineCache) -> bool {
        self.product_id.as_ref().is_none_or(|p| *p == row.product_id)
            && self.batch_no.as_ref().is_none_or(|b| *b == row.batch_no)
            && self
                .expiring_before
                .is_none_or(|limit| row.expire_date.is_some_and(|d| d < limit))
            && self.in_stock.is_none_or(|wanted| (row.current_quantity > 0) == wanted)
    }
}
