//! Infrastructure layer: storage adapters, configuration and the
//! transactional inventory service.

pub mod config;
pub mod error;
pub mod service;
pub mod store;

pub use config::{AlertConfig, BulkConfig, DatabaseConfig, InventoryConfig};
pub use error::InventoryServiceError;
pub use service::{BulkItemResult, InventoryService, MovementReceipt, TransferReceipt};
pub use store::{
    InMemoryStockStore, LedgerSnapshot, MovementFilter, MovementPage, Pagination,
    PostgresStockStore, StockStore, StockTransaction, StorageError,
};
