// burrow-core/src/lib.rs
// Criteria-driven embedded document store adapter

pub mod adapter;
pub mod aggregate;
pub mod connection;
pub mod criteria;
pub mod error;
pub mod logging;
pub mod schema;
pub mod store;
pub mod value_utils;

// Public exports
pub use adapter::Adapter;
pub use aggregate::GroupSpec;
pub use connection::{Collection, Connection, ConnectionConfig};
pub use criteria::{translate, Criteria, NativeQuery};
pub use error::{BurrowError, Result};
pub use logging::{get_log_level, set_log_level, LogLevel};
pub use schema::{definition_from_value, AttributeDef, Definition};
pub use store::{DataStore, DocumentStore, IndexSpec};
