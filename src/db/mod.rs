pub mod datasets;
pub mod pool;

pub use datasets::{DatasetStore, PgDatasetStore};
pub use pool::{create_pool, run_migrations};
