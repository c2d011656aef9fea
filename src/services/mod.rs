// Service exports
pub mod cache;
pub mod directory;
pub mod store;

pub use cache::{is_stale, CacheError, CacheKey, CacheManager};
pub use directory::{Directory, DirectoryError};
pub use store::{MatchStore, StoreError};
