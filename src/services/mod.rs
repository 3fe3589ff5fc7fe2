// Service exports
pub mod cache;
pub mod memory;
pub mod postgres;
pub mod storage;
pub mod store;

pub use cache::{CacheError, CacheKey, CacheManager, CacheStats};
pub use memory::{MemoryMediaStore, MemoryStore};
pub use postgres::PostgresClient;
pub use storage::{MediaError, MediaStore, StorageClient};
pub use store::{LifecycleStore, MarketplaceStore, ProviderDirectory, StoreError};
