//! The catalog contract enforced by the Flight dispatch engine.
//!
//! A backend exposes its data by implementing three object-safe traits:
//!
//! - [`Catalog`]: a named container of schemas, optionally *dynamic*
//!   (schema creation/drop allowed).
//! - [`CatalogSchema`]: a named container of tables, table references and
//!   functions, optionally *dynamic* (table DDL allowed).
//! - [`Table`]: a typed stream of rows with a fixed Arrow schema.
//!
//! Everything beyond `name`/`comment`/`schema`/`scan` is an **optional
//! capability**: a closed set of variants a table advertises through the
//! `as_*` accessor methods, each returning `None` by default.  The
//! dispatcher tests the accessors at call time and never silently
//! downgrades; an absent capability produces an "unimplemented" error.
//! When both the batch and the legacy variant of UPDATE or DELETE are
//! present, the batch variant is preferred.
//!
//! # Rowid discovery
//!
//! A table whose rows can be individually addressed advertises a row
//! identifier column, found by [`find_rowid_column`]: a field named
//! `rowid`, otherwise a field whose metadata carries a non-empty
//! [`IS_ROWID_KEY`] entry.  Rowid values are `Int64`, `Int32` or `UInt64`;
//! a null rowid in DML input fails the operation.

use std::collections::HashMap;
use std::sync::Arc;

use arrow::array::RecordBatch;
use arrow::datatypes::{DataType, FieldRef, Schema, SchemaRef};
use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::AirportError;
use crate::wire::{ParameterValue, TimePoint};

/// Field-metadata key marking the row identifier column.
pub const IS_ROWID_KEY: &str = "is_rowid";

/// Reserved column name recognized as the row identifier.
pub const ROWID_COLUMN_NAME: &str = "rowid";

/// A lazy, finite sequence of record batches produced by a catalog.
pub type BatchStream = BoxStream<'static, Result<RecordBatch, AirportError>>;

// ---------------------------------------------------------------------------
// Request context
// ---------------------------------------------------------------------------

/// Per-call state threaded through every catalog method.
///
/// Handlers build one of these from the inbound gRPC metadata before the
/// first catalog call; implementations treat it as read-only.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Identity established by the authenticator, if any.
    pub peer_identity: Option<String>,
    /// Transaction attached to this call via the `x-transaction-id` (or
    /// `airport-transaction-id`) header.
    pub transaction_id: Option<String>,
    /// Name of the catalog this call was routed to.
    pub catalog: String,
}

// ---------------------------------------------------------------------------
// Scan and DML option types
// ---------------------------------------------------------------------------

/// Inputs to [`Table::scan`].
#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    /// Requested columns in order; empty means all.  The table MAY return
    /// all columns anyway and leave projection to the client.
    pub columns: Vec<String>,
    /// Opaque predicate bytes pushed down by the SQL client.  A table may
    /// use them to skip rows but must stay correct if it ignores them.
    pub filter: Option<Vec<u8>>,
    /// Version or timestamp to read; `None` means current state.
    pub time_point: Option<TimePoint>,
    /// Positional arguments for table functions.
    pub parameters: Vec<ParameterValue>,
}

/// Inputs to [`DynamicSchemaTable::schema_for_request`].
#[derive(Debug, Clone, Default)]
pub struct SchemaRequest {
    pub columns: Vec<String>,
    pub time_point: Option<TimePoint>,
    pub parameters: Vec<ParameterValue>,
}

/// Options common to every DML operation.
#[derive(Debug, Clone, Default)]
pub struct DmlOptions {
    /// Whether the client asked for post-image rows.
    pub returning: bool,
    /// Advisory list of columns to include in RETURNING output; may be
    /// empty, and implementations may filter or ignore it.
    pub returning_columns: Vec<String>,
}

/// Outcome of one DML operation.
pub struct DmlResult {
    pub affected_rows: i64,
    /// Post-image (or pre-image, for DELETE) rows when RETURNING was
    /// requested.  Consumed and released by the dispatcher; the stream is
    /// finite and not restartable.
    pub returning: Option<BatchStream>,
}

impl DmlResult {
    pub fn affected(affected_rows: i64) -> Self {
        Self {
            affected_rows,
            returning: None,
        }
    }
}

impl std::fmt::Debug for DmlResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DmlResult")
            .field("affected_rows", &self.affected_rows)
            .field("returning", &self.returning.is_some())
            .finish()
    }
}

/// Column statistics reported by [`StatisticsTable::column_statistics`].
///
/// Every field is optional; `min`/`max` are single-element arrays whose
/// type equals the column type.
#[derive(Debug, Clone, Default)]
pub struct ColumnStats {
    pub has_not_null: Option<bool>,
    pub has_null: Option<bool>,
    pub distinct_count: Option<i64>,
    pub min: Option<arrow::array::ArrayRef>,
    pub max: Option<arrow::array::ArrayRef>,
    pub max_string_length: Option<i64>,
    pub contains_unicode: Option<bool>,
}

/// One locally-executed function call resolved from a table reference.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FunctionCall {
    pub function_name: String,
    pub arguments: Vec<ParameterValue>,
}

/// Signature of a scalar or table function.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionSignature {
    pub parameters: Vec<DataType>,
    pub variadic: bool,
    pub return_type: Option<DataType>,
}

/// A scalar function exposed by a schema.
#[derive(Debug, Clone)]
pub struct ScalarFunctionInfo {
    pub name: String,
    pub comment: String,
    pub signature: FunctionSignature,
}

/// A table function exposed by a schema.  `result_schema` is `None` when
/// the output schema depends on argument values; the dispatcher then asks
/// the resolved table via [`DynamicSchemaTable`].
#[derive(Debug, Clone)]
pub struct TableFunctionInfo {
    pub name: String,
    pub comment: String,
    pub signature: FunctionSignature,
    pub result_schema: Option<SchemaRef>,
}

/// Inputs to [`CatalogSchema::create_table`].
#[derive(Debug, Clone)]
pub struct TableDefinition {
    pub name: String,
    pub schema: SchemaRef,
    pub constraints: Vec<String>,
}

/// Inputs to [`Catalog::create_schema`].
#[derive(Debug, Clone, Default)]
pub struct SchemaDefinition {
    pub name: String,
    pub comment: Option<String>,
    pub tags: HashMap<String, String>,
}

// ---------------------------------------------------------------------------
// Catalog tree traits
// ---------------------------------------------------------------------------

/// A named container of schemas.
#[async_trait]
pub trait Catalog: Send + Sync {
    fn name(&self) -> &str;

    fn comment(&self) -> &str {
        ""
    }

    /// Whether schemas can be created and dropped through DDL actions.
    fn dynamic(&self) -> bool {
        false
    }

    async fn schema_names(&self, ctx: &RequestContext) -> Result<Vec<String>, AirportError>;

    async fn schema(
        &self,
        ctx: &RequestContext,
        name: &str,
    ) -> Result<Arc<dyn CatalogSchema>, AirportError>;

    async fn create_schema(
        &self,
        _ctx: &RequestContext,
        _definition: SchemaDefinition,
    ) -> Result<(), AirportError> {
        Err(AirportError::unimplemented("catalog does not support schema creation"))
    }

    async fn drop_schema(&self, _ctx: &RequestContext, _name: &str) -> Result<(), AirportError> {
        Err(AirportError::unimplemented("catalog does not support schema drop"))
    }
}

/// A named container of tables and functions within a catalog.
#[async_trait]
pub trait CatalogSchema: Send + Sync {
    fn name(&self) -> &str;

    fn comment(&self) -> &str {
        ""
    }

    /// Whether tables can be created, dropped and renamed through DDL.
    fn dynamic(&self) -> bool {
        false
    }

    async fn table_names(&self, ctx: &RequestContext) -> Result<Vec<String>, AirportError>;

    async fn table(
        &self,
        ctx: &RequestContext,
        name: &str,
    ) -> Result<Arc<dyn Table>, AirportError>;

    async fn scalar_functions(
        &self,
        _ctx: &RequestContext,
    ) -> Result<Vec<ScalarFunctionInfo>, AirportError> {
        Ok(Vec::new())
    }

    async fn table_functions(
        &self,
        _ctx: &RequestContext,
    ) -> Result<Vec<TableFunctionInfo>, AirportError> {
        Ok(Vec::new())
    }

    async fn create_table(
        &self,
        _ctx: &RequestContext,
        _definition: TableDefinition,
    ) -> Result<Arc<dyn Table>, AirportError> {
        Err(AirportError::unimplemented("schema does not support table creation"))
    }

    async fn drop_table(&self, _ctx: &RequestContext, _name: &str) -> Result<(), AirportError> {
        Err(AirportError::unimplemented("schema does not support table drop"))
    }

    async fn rename_table(
        &self,
        _ctx: &RequestContext,
        _name: &str,
        _new_name: &str,
    ) -> Result<(), AirportError> {
        Err(AirportError::unimplemented("schema does not support table rename"))
    }
}

/// A named, typed stream of rows.
///
/// The four mandatory operations are `name`, `comment`, `schema` and
/// `scan`; everything else is advertised through the `as_*` accessors.
#[async_trait]
pub trait Table: Send + Sync {
    fn name(&self) -> &str;

    fn comment(&self) -> &str {
        ""
    }

    /// Schema of the table, optionally projected to `columns` (empty means
    /// all).  A projection-aware table returns the projected subset; other
    /// tables may return the full schema and leave projection to the
    /// client.
    fn schema(&self, columns: &[String]) -> SchemaRef;

    /// Open a lazy batch stream.  Batches must arrive in producer order
    /// and each batch's schema must equal `schema(options.columns)` or
    /// `schema(&[])`.
    async fn scan(
        &self,
        ctx: &RequestContext,
        options: ScanOptions,
    ) -> Result<BatchStream, AirportError>;

    fn as_insertable(&self) -> Option<&dyn InsertableTable> {
        None
    }

    fn as_updatable(&self) -> Option<&dyn UpdatableTable> {
        None
    }

    fn as_updatable_batch(&self) -> Option<&dyn UpdatableBatchTable> {
        None
    }

    fn as_deletable(&self) -> Option<&dyn DeletableTable> {
        None
    }

    fn as_deletable_batch(&self) -> Option<&dyn DeletableBatchTable> {
        None
    }

    fn as_dynamic_schema(&self) -> Option<&dyn DynamicSchemaTable> {
        None
    }

    fn as_statistics(&self) -> Option<&dyn StatisticsTable> {
        None
    }

    fn as_alterable(&self) -> Option<&dyn AlterableTable> {
        None
    }

    fn as_table_reference(&self) -> Option<&dyn TableReference> {
        None
    }
}

// ---------------------------------------------------------------------------
// Capability traits
// ---------------------------------------------------------------------------

#[async_trait]
pub trait InsertableTable: Send + Sync {
    /// Insert every batch of `batches`.  Batches are owned by the
    /// dispatcher for the duration of the call; the implementation must
    /// not hold references past its return.
    async fn insert(
        &self,
        ctx: &RequestContext,
        batches: BatchStream,
        options: &DmlOptions,
    ) -> Result<DmlResult, AirportError>;
}

/// Legacy UPDATE variant: rowids arrive as a separate sequence parallel to
/// the rows of `batch`, which has the rowid column already stripped.
#[async_trait]
pub trait UpdatableTable: Send + Sync {
    async fn update(
        &self,
        ctx: &RequestContext,
        row_ids: Vec<i64>,
        batch: RecordBatch,
        options: &DmlOptions,
    ) -> Result<DmlResult, AirportError>;
}

/// Batch UPDATE variant: the rowid column is embedded in the batch and
/// located via [`find_rowid_column`].  Preferred over the legacy variant
/// when both are present.
#[async_trait]
pub trait UpdatableBatchTable: Send + Sync {
    async fn update_batch(
        &self,
        ctx: &RequestContext,
        batch: RecordBatch,
        options: &DmlOptions,
    ) -> Result<DmlResult, AirportError>;
}

/// Legacy DELETE variant: only the rowid sequence is passed.
#[async_trait]
pub trait DeletableTable: Send + Sync {
    async fn delete(
        &self,
        ctx: &RequestContext,
        row_ids: Vec<i64>,
        options: &DmlOptions,
    ) -> Result<DmlResult, AirportError>;
}

/// Batch DELETE variant: the whole input batch is passed through.
/// Preferred over the legacy variant when both are present.
#[async_trait]
pub trait DeletableBatchTable: Send + Sync {
    async fn delete_batch(
        &self,
        ctx: &RequestContext,
        batch: RecordBatch,
        options: &DmlOptions,
    ) -> Result<DmlResult, AirportError>;
}

/// Tables whose schema depends on request parameters (table functions,
/// time travel).
#[async_trait]
pub trait DynamicSchemaTable: Send + Sync {
    async fn schema_for_request(
        &self,
        ctx: &RequestContext,
        request: SchemaRequest,
    ) -> Result<SchemaRef, AirportError>;
}

#[async_trait]
pub trait StatisticsTable: Send + Sync {
    async fn column_statistics(
        &self,
        ctx: &RequestContext,
        column_name: &str,
        column_type: &DataType,
    ) -> Result<ColumnStats, AirportError>;
}

/// Column-level DDL on a single table.
#[async_trait]
pub trait AlterableTable: Send + Sync {
    async fn add_column(
        &self,
        ctx: &RequestContext,
        field: FieldRef,
        if_not_exists: bool,
    ) -> Result<(), AirportError>;

    async fn remove_column(
        &self,
        ctx: &RequestContext,
        name: &str,
        if_exists: bool,
        cascade: bool,
    ) -> Result<(), AirportError>;

    async fn rename_column(
        &self,
        ctx: &RequestContext,
        name: &str,
        new_name: &str,
    ) -> Result<(), AirportError>;

    async fn change_column_type(
        &self,
        ctx: &RequestContext,
        field: FieldRef,
    ) -> Result<(), AirportError>;

    async fn set_not_null(&self, ctx: &RequestContext, name: &str) -> Result<(), AirportError>;

    async fn drop_not_null(&self, ctx: &RequestContext, name: &str) -> Result<(), AirportError>;

    async fn set_default(
        &self,
        ctx: &RequestContext,
        name: &str,
        expression: &str,
    ) -> Result<(), AirportError>;
}

/// A table whose rows are not served by this server: scanning it resolves
/// to function calls the SQL client executes locally.
#[async_trait]
pub trait TableReference: Send + Sync {
    async fn function_calls(
        &self,
        ctx: &RequestContext,
        request: &ScanOptions,
    ) -> Result<Vec<FunctionCall>, AirportError>;
}

// ---------------------------------------------------------------------------
// Rowid and projection helpers
// ---------------------------------------------------------------------------

/// Whether a data type is acceptable for a rowid column.
pub fn is_rowid_type(data_type: &DataType) -> bool {
    matches!(data_type, DataType::Int64 | DataType::Int32 | DataType::UInt64)
}

/// Locate the row identifier column of a schema.
///
/// A field qualifies when its name is `rowid` or its metadata carries a
/// non-empty `is_rowid` entry.  Returns the index only when exactly one
/// field qualifies.
pub fn find_rowid_column(schema: &Schema) -> Option<usize> {
    let mut found = None;
    for (index, field) in schema.fields().iter().enumerate() {
        let marked = field.name() == ROWID_COLUMN_NAME
            || field
                .metadata()
                .get(IS_ROWID_KEY)
                .map(|v| !v.is_empty())
                .unwrap_or(false);
        if marked {
            if found.is_some() {
                return None;
            }
            found = Some(index);
        }
    }
    found
}

/// Project a schema down to `columns`, preserving order and metadata.
/// An empty list yields the full schema; an unknown name is NotFound.
pub fn project_schema(schema: &SchemaRef, columns: &[String]) -> Result<SchemaRef, AirportError> {
    if columns.is_empty() {
        return Ok(Arc::clone(schema));
    }
    let mut indices = Vec::with_capacity(columns.len());
    for name in columns {
        let index = schema
            .index_of(name)
            .map_err(|_| AirportError::not_found(format!("column '{name}' does not exist")))?;
        indices.push(index);
    }
    let projected = schema.project(&indices)?;
    Ok(Arc::new(projected))
}

/// Remove one column from a batch, keeping the remaining column order.
pub fn strip_column(batch: &RecordBatch, index: usize) -> Result<RecordBatch, AirportError> {
    let keep: Vec<usize> = (0..batch.num_columns()).filter(|i| *i != index).collect();
    Ok(batch.project(&keep)?)
}
