pub mod auth;
pub mod medicines_cache_service;
pub mod reconciliation;
pub mod spreadsheet;
pub mod stock_adjustment_service;
pub mod stock_taking_service;
