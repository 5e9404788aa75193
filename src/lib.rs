//! XMLA (XML for Analysis) client library.
//!
//! Runs analytical queries against a tabular-data engine endpoint over
//! SOAP/HTTPS: resolves a logical workspace to a physical compute
//! cluster, chains the short-lived tokens that authorize access,
//! tracks a server-side session, and parses streamed rowset responses
//! into typed rows without buffering whole result sets.
//!
//! # Example
//!
//! ```rust,no_run
//! use xmla_link::Connection;
//!
//! # async fn example() -> xmla_link::Result<()> {
//! let mut conn = Connection::from_connection_string(
//!     "Data Source=powerbi://api.example.com/Sales;Catalog=Sales;Password=eyJhbGc...",
//! )?;
//! conn.open().await?;
//!
//! let mut rows = conn.execute_query_stream("EVALUATE Sales").await?;
//! while let Some(row) = rows.recv().await {
//!     println!("{}", row?.to_json_line()?);
//! }
//!
//! conn.close().await;
//! # Ok(())
//! # }
//! ```

pub mod connection;
pub mod connection_string;
pub mod envelope;
pub mod error;
pub mod models;
pub mod resolve;
pub mod rowset;
pub mod transport;

pub use connection::{Connection, ConnectionState};
pub use connection_string::ConnectionDescriptor;
pub use envelope::QueryType;
pub use error::{Result, XmlaLinkError};
pub use models::{Cluster, ColumnType, Row, SchemaColumn, Token, TokenScheme, Workspace};
pub use rowset::{parse_rowset, stream_rowset, stream_rowset_json};
pub use transport::{BufferedResponse, HttpTransport};
