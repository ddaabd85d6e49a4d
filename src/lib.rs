//! Arrow Flight catalog server for the DuckDB Airport extension.
//!
//! This crate serves a pluggable data catalog over Arrow Flight so that a
//! SQL client can attach it as a database: discover schemas, tables and
//! functions, stream scans with projection and filter pushdown, run
//! INSERT/UPDATE/DELETE with RETURNING over DoExchange, issue DDL through
//! custom actions, query column statistics, and coordinate transactions.
//!
//! The storage backend is entirely user-supplied: implement [`Catalog`],
//! [`CatalogSchema`] and [`Table`] (plus whichever optional capabilities
//! the tables support) and hand the catalog to [`AirportServerBuilder`].
//!
//! ```no_run
//! use std::sync::Arc;
//! use airport::{AirportServer, MemoryTransactionCoordinator};
//! # fn catalog() -> Arc<dyn airport::Catalog> { unimplemented!() }
//!
//! # async fn serve() -> Result<(), airport::AirportError> {
//! let server = AirportServer::builder(catalog())
//!     .with_location("grpc://127.0.0.1:50051")
//!     .with_transaction_coordinator(Arc::new(MemoryTransactionCoordinator::new()))
//!     .build()?;
//! let (_tx, rx) = tokio::sync::oneshot::channel();
//! server.serve_with_shutdown("127.0.0.1:50051".parse().unwrap(), rx).await
//! # }
//! ```

pub mod auth;
pub mod catalog;
pub mod error;
pub mod logging;
pub mod transaction;
pub mod types;
pub mod wire;

mod actions;
mod discovery;
mod dml;
mod scan;
mod server;

pub use auth::{AllowAll, Authenticator, CatalogAuthorizer};
pub use catalog::{
    find_rowid_column, is_rowid_type, project_schema, BatchStream, Catalog, CatalogSchema,
    ColumnStats, DmlOptions, DmlResult, FunctionCall, FunctionSignature, RequestContext,
    ScalarFunctionInfo, ScanOptions, SchemaDefinition, SchemaRequest, Table, TableDefinition,
    TableFunctionInfo,
};
pub use catalog::{
    AlterableTable, DeletableBatchTable, DeletableTable, DynamicSchemaTable, InsertableTable,
    StatisticsTable, TableReference, UpdatableBatchTable, UpdatableTable,
};
pub use error::AirportError;
pub use server::{
    start_server, AirportFlightService, AirportServer, AirportServerBuilder, CatalogRegistry,
    ClientAuthMode, ServerRegistry, TlsOptions,
};
pub use transaction::{MemoryTransactionCoordinator, TransactionCoordinator, TransactionState};
pub use wire::{ParameterValue, ScanTicket, TimePoint};
