pub mod adjustment_repo;
pub use adjustment_repo::StockAdjustmentRepository;
pub mod cache_repo;
pub use cache_repo::MedicinesCacheRepository;
pub mod stock_taking_repo;
pub use stock_taking_repo::StockTakingRepository;

pub mod store;
pub use store::{LedgerSlice, StockStore};
pub mod pg_store;
pub use pg_store::PgStockStore;
pub mod memory_store;
pub use memory_store::MemoryStockStore;
