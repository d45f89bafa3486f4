pub mod cache;
pub mod error;
pub mod keys;

pub use cache::{Cache, InMemoryCache};
pub use error::CacheError;
