//! Data models for the xmla-link client library.
//!
//! Resolution-chain results (workspace, token, cluster) and the typed
//! rowset surface (schema columns, rows) consumed by downstream
//! formatters.

mod cluster;
mod row;
mod schema;
mod token;
mod workspace;

pub use cluster::Cluster;
pub use row::Row;
pub use schema::{ColumnType, SchemaColumn};
pub use token::{Token, TokenScheme};
pub use workspace::{Workspace, WorkspaceListResponse};
