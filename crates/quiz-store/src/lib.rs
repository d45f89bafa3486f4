pub mod error;
pub mod memory;
pub mod pg;
pub mod rows;
pub mod traits;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use pg::PgStore;
pub use traits::Store;
