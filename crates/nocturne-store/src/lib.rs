pub mod config;
pub mod error;
pub mod pools;
pub mod schema;
pub mod store;

pub use config::{default_base_dir, load_config, prepare_base_dir};
pub use error::{Result, StoreError};
pub use store::{AuditEntry, Store};
