pub mod pool;
pub mod records;
pub mod schema;

pub use records::SqliteBackend;
