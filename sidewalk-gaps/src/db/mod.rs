//! Accès PostgreSQL/PostGIS et outils clients

pub mod ident;
pub mod lifecycle;
pub mod pool;
pub mod tools;
pub mod transaction;

pub use ident::QualifiedTable;
pub use pool::{connect, create_pool, DatabaseConfig, SslMode};
pub use tools::ToolError;
pub use transaction::CommandTransaction;
