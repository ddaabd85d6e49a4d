//! Shared fixtures for the integration suites: an in-memory catalog with
//! versioned tables, capability-spy tables, a counting transaction
//! coordinator and a static-token authenticator.
#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use arrow::array::{ArrayRef, Int64Array, RecordBatch, StringArray};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow_flight::flight_service_client::FlightServiceClient;
use async_trait::async_trait;
use futures::stream;
use futures::TryStreamExt;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tonic::transport::Channel;

use airport::{
    project_schema, AirportError, AirportServer, Authenticator, BatchStream, Catalog,
    CatalogAuthorizer, CatalogSchema, ColumnStats, DeletableBatchTable, DeletableTable,
    DmlOptions, DmlResult, FunctionCall, InsertableTable, MemoryTransactionCoordinator,
    RequestContext, ScanOptions, SchemaDefinition, StatisticsTable, Table, TableDefinition,
    TableFunctionInfo, TableReference, TransactionCoordinator, TransactionState,
    UpdatableBatchTable, UpdatableTable,
};

// ---------------------------------------------------------------------------
// Batch helpers
// ---------------------------------------------------------------------------

pub fn users_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Int64, false),
        Field::new("name", DataType::Utf8, true),
    ]))
}

pub fn users_batch(ids: &[i64], names: &[&str]) -> RecordBatch {
    RecordBatch::try_new(
        users_schema(),
        vec![
            Arc::new(Int64Array::from(ids.to_vec())) as ArrayRef,
            Arc::new(StringArray::from(names.to_vec())) as ArrayRef,
        ],
    )
    .unwrap()
}

// ---------------------------------------------------------------------------
// In-memory table
// ---------------------------------------------------------------------------

pub struct MemoryTable {
    name: String,
    comment: String,
    schema: SchemaRef,
    rows: Mutex<Vec<RecordBatch>>,
    versions: HashMap<String, Vec<RecordBatch>>,
    stats: HashMap<String, ColumnStats>,
    insertable: bool,
    updatable_batch: bool,
    updatable_legacy: bool,
    deletable_batch: bool,
    deletable_legacy: bool,
    fail_updates: bool,
    pub insert_calls: AtomicUsize,
    pub update_batch_calls: AtomicUsize,
    pub update_legacy_calls: AtomicUsize,
    pub delete_batch_calls: AtomicUsize,
    pub delete_legacy_calls: AtomicUsize,
}

impl MemoryTable {
    pub fn new(name: &str, schema: SchemaRef) -> Self {
        Self {
            name: name.to_string(),
            comment: String::new(),
            schema,
            rows: Mutex::new(Vec::new()),
            versions: HashMap::new(),
            stats: HashMap::new(),
            insertable: false,
            updatable_batch: false,
            updatable_legacy: false,
            deletable_batch: false,
            deletable_legacy: false,
            fail_updates: false,
            insert_calls: AtomicUsize::new(0),
            update_batch_calls: AtomicUsize::new(0),
            update_legacy_calls: AtomicUsize::new(0),
            delete_batch_calls: AtomicUsize::new(0),
            delete_legacy_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_rows(self, batches: Vec<RecordBatch>) -> Self {
        *self.rows.lock().unwrap() = batches;
        self
    }

    pub fn with_version(mut self, version: &str, batches: Vec<RecordBatch>) -> Self {
        self.versions.insert(version.to_string(), batches);
        self
    }

    pub fn with_stats(mut self, column: &str, stats: ColumnStats) -> Self {
        self.stats.insert(column.to_string(), stats);
        self
    }

    pub fn insertable(mut self) -> Self {
        self.insertable = true;
        self
    }

    pub fn updatable_batch(mut self) -> Self {
        self.updatable_batch = true;
        self
    }

    pub fn updatable_legacy(mut self) -> Self {
        self.updatable_legacy = true;
        self
    }

    pub fn deletable_batch(mut self) -> Self {
        self.deletable_batch = true;
        self
    }

    pub fn deletable_legacy(mut self) -> Self {
        self.deletable_legacy = true;
        self
    }

    /// Every update fails after the call is counted; used to drive the
    /// rollback path.
    pub fn failing_updates(mut self) -> Self {
        self.fail_updates = true;
        self
    }

    fn project(&self, batch: &RecordBatch, columns: &[String]) -> Result<RecordBatch, AirportError> {
        if columns.is_empty() {
            return Ok(batch.clone());
        }
        let mut indices = Vec::with_capacity(columns.len());
        for name in columns {
            let index = batch.schema().index_of(name).map_err(|_| {
                AirportError::not_found(format!("column '{name}' does not exist"))
            })?;
            indices.push(index);
        }
        batch
            .project(&indices)
            .map_err(|e| AirportError::internal(e.to_string()))
    }

    fn rows_at(&self, options: &ScanOptions) -> Result<Vec<RecordBatch>, AirportError> {
        match &options.time_point {
            None => Ok(self.rows.lock().unwrap().clone()),
            Some(point) if point.unit == "version" => {
                self.versions.get(&point.value).cloned().ok_or_else(|| {
                    let mut available: Vec<&str> =
                        self.versions.keys().map(|k| k.as_str()).collect();
                    available.sort();
                    AirportError::not_found(format!(
                        "version '{}' does not exist; available versions: {}",
                        point.value,
                        available.join(", ")
                    ))
                })
            }
            Some(point) => Err(AirportError::invalid_argument(format!(
                "unsupported time point unit '{}'",
                point.unit
            ))),
        }
    }
}

#[async_trait]
impl Table for MemoryTable {
    fn name(&self) -> &str {
        &self.name
    }

    fn comment(&self) -> &str {
        &self.comment
    }

    fn schema(&self, columns: &[String]) -> SchemaRef {
        project_schema(&self.schema, columns).unwrap_or_else(|_| Arc::clone(&self.schema))
    }

    async fn scan(
        &self,
        _ctx: &RequestContext,
        options: ScanOptions,
    ) -> Result<BatchStream, AirportError> {
        let rows = self.rows_at(&options)?;
        let mut projected = Vec::with_capacity(rows.len());
        for batch in &rows {
            projected.push(self.project(batch, &options.columns)?);
        }
        Ok(Box::pin(stream::iter(projected.into_iter().map(Ok))))
    }

    fn as_insertable(&self) -> Option<&dyn InsertableTable> {
        self.insertable.then_some(self as &dyn InsertableTable)
    }

    fn as_updatable(&self) -> Option<&dyn UpdatableTable> {
        self.updatable_legacy.then_some(self as &dyn UpdatableTable)
    }

    fn as_updatable_batch(&self) -> Option<&dyn UpdatableBatchTable> {
        self.updatable_batch.then_some(self as &dyn UpdatableBatchTable)
    }

    fn as_deletable(&self) -> Option<&dyn DeletableTable> {
        self.deletable_legacy.then_some(self as &dyn DeletableTable)
    }

    fn as_deletable_batch(&self) -> Option<&dyn DeletableBatchTable> {
        self.deletable_batch.then_some(self as &dyn DeletableBatchTable)
    }

    fn as_statistics(&self) -> Option<&dyn StatisticsTable> {
        (!self.stats.is_empty()).then_some(self as &dyn StatisticsTable)
    }
}

#[async_trait]
impl InsertableTable for MemoryTable {
    async fn insert(
        &self,
        _ctx: &RequestContext,
        batches: BatchStream,
        options: &DmlOptions,
    ) -> Result<DmlResult, AirportError> {
        self.insert_calls.fetch_add(1, Ordering::SeqCst);
        let batches: Vec<RecordBatch> = batches.try_collect().await?;
        let affected: i64 = batches.iter().map(|b| b.num_rows() as i64).sum();
        self.rows.lock().unwrap().extend(batches.iter().cloned());

        let returning = options.returning.then(|| {
            Box::pin(stream::iter(batches.into_iter().map(Ok))) as BatchStream
        });
        Ok(DmlResult {
            affected_rows: affected,
            returning,
        })
    }
}

#[async_trait]
impl UpdatableBatchTable for MemoryTable {
    async fn update_batch(
        &self,
        _ctx: &RequestContext,
        batch: RecordBatch,
        options: &DmlOptions,
    ) -> Result<DmlResult, AirportError> {
        self.update_batch_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_updates {
            return Err(AirportError::internal("backend rejected the update"));
        }
        let affected = batch.num_rows() as i64;
        let returning = options
            .returning
            .then(move || Box::pin(stream::once(async move { Ok(batch) })) as BatchStream);
        Ok(DmlResult {
            affected_rows: affected,
            returning,
        })
    }
}

#[async_trait]
impl UpdatableTable for MemoryTable {
    async fn update(
        &self,
        _ctx: &RequestContext,
        row_ids: Vec<i64>,
        _batch: RecordBatch,
        _options: &DmlOptions,
    ) -> Result<DmlResult, AirportError> {
        self.update_legacy_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_updates {
            return Err(AirportError::internal("backend rejected the update"));
        }
        Ok(DmlResult::affected(row_ids.len() as i64))
    }
}

#[async_trait]
impl DeletableBatchTable for MemoryTable {
    async fn delete_batch(
        &self,
        _ctx: &RequestContext,
        batch: RecordBatch,
        _options: &DmlOptions,
    ) -> Result<DmlResult, AirportError> {
        self.delete_batch_calls.fetch_add(1, Ordering::SeqCst);
        Ok(DmlResult::affected(batch.num_rows() as i64))
    }
}

#[async_trait]
impl DeletableTable for MemoryTable {
    async fn delete(
        &self,
        _ctx: &RequestContext,
        row_ids: Vec<i64>,
        _options: &DmlOptions,
    ) -> Result<DmlResult, AirportError> {
        self.delete_legacy_calls.fetch_add(1, Ordering::SeqCst);
        Ok(DmlResult::affected(row_ids.len() as i64))
    }
}

#[async_trait]
impl StatisticsTable for MemoryTable {
    async fn column_statistics(
        &self,
        _ctx: &RequestContext,
        column_name: &str,
        _column_type: &DataType,
    ) -> Result<ColumnStats, AirportError> {
        self.stats.get(column_name).cloned().ok_or_else(|| {
            AirportError::not_found(format!("no statistics for column '{column_name}'"))
        })
    }
}

// ---------------------------------------------------------------------------
// Dynamic-schema table
// ---------------------------------------------------------------------------

/// A table-function-backed table whose schema depends on its arguments:
/// `n` integer arguments produce columns `c0..cn-1`, all Int64.
pub struct GeneratorTable {
    name: String,
}

impl GeneratorTable {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }

    fn schema_for(parameters: &[airport::ParameterValue]) -> SchemaRef {
        let fields: Vec<Field> = (0..parameters.len().max(1))
            .map(|i| Field::new(format!("c{i}"), DataType::Int64, true))
            .collect();
        Arc::new(Schema::new(fields))
    }
}

#[async_trait]
impl Table for GeneratorTable {
    fn name(&self) -> &str {
        &self.name
    }

    fn schema(&self, _columns: &[String]) -> SchemaRef {
        Self::schema_for(&[])
    }

    async fn scan(
        &self,
        _ctx: &RequestContext,
        options: ScanOptions,
    ) -> Result<airport::BatchStream, AirportError> {
        let schema = Self::schema_for(&options.parameters);
        let columns: Vec<ArrayRef> = schema
            .fields()
            .iter()
            .map(|_| Arc::new(Int64Array::from(vec![0i64])) as ArrayRef)
            .collect();
        let batch = RecordBatch::try_new(schema, columns)
            .map_err(|e| AirportError::internal(e.to_string()))?;
        Ok(Box::pin(stream::once(async move { Ok(batch) })))
    }

    fn as_dynamic_schema(&self) -> Option<&dyn airport::DynamicSchemaTable> {
        Some(self)
    }
}

#[async_trait]
impl airport::DynamicSchemaTable for GeneratorTable {
    async fn schema_for_request(
        &self,
        _ctx: &RequestContext,
        request: airport::SchemaRequest,
    ) -> Result<SchemaRef, AirportError> {
        Ok(Self::schema_for(&request.parameters))
    }
}

// ---------------------------------------------------------------------------
// Table reference
// ---------------------------------------------------------------------------

/// A table resolved client-side into a `read_csv` call; the server never
/// streams rows for it.
pub struct CsvReference {
    name: String,
    schema: SchemaRef,
    path: String,
}

impl CsvReference {
    pub fn new(name: &str, schema: SchemaRef, path: &str) -> Self {
        Self {
            name: name.to_string(),
            schema,
            path: path.to_string(),
        }
    }
}

#[async_trait]
impl Table for CsvReference {
    fn name(&self) -> &str {
        &self.name
    }

    fn schema(&self, columns: &[String]) -> SchemaRef {
        project_schema(&self.schema, columns).unwrap_or_else(|_| Arc::clone(&self.schema))
    }

    async fn scan(
        &self,
        _ctx: &RequestContext,
        _options: ScanOptions,
    ) -> Result<BatchStream, AirportError> {
        Err(AirportError::unimplemented(
            "table references are resolved by the client",
        ))
    }

    fn as_table_reference(&self) -> Option<&dyn TableReference> {
        Some(self)
    }
}

#[async_trait]
impl TableReference for CsvReference {
    async fn function_calls(
        &self,
        _ctx: &RequestContext,
        _request: &ScanOptions,
    ) -> Result<Vec<FunctionCall>, AirportError> {
        Ok(vec![FunctionCall {
            function_name: "read_csv".to_string(),
            arguments: vec![airport::ParameterValue::Text(self.path.clone())],
        }])
    }
}

// ---------------------------------------------------------------------------
// In-memory schema and catalog
// ---------------------------------------------------------------------------

pub struct MemorySchema {
    name: String,
    comment: String,
    dynamic: bool,
    tables: RwLock<HashMap<String, Arc<dyn Table>>>,
    table_functions: Vec<TableFunctionInfo>,
}

impl MemorySchema {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            comment: String::new(),
            dynamic: false,
            tables: RwLock::new(HashMap::new()),
            table_functions: Vec::new(),
        }
    }

    pub fn dynamic(mut self) -> Self {
        self.dynamic = true;
        self
    }

    pub fn with_comment(mut self, comment: &str) -> Self {
        self.comment = comment.to_string();
        self
    }

    pub fn with_table(self, table: Arc<dyn Table>) -> Self {
        self.tables
            .write()
            .unwrap()
            .insert(table.name().to_string(), table);
        self
    }

    pub fn with_table_function(mut self, function: TableFunctionInfo) -> Self {
        self.table_functions.push(function);
        self
    }

    pub fn add_table(&self, name: &str, table: Arc<dyn Table>) {
        self.tables.write().unwrap().insert(name.to_string(), table);
    }
}

#[async_trait]
impl CatalogSchema for MemorySchema {
    fn name(&self) -> &str {
        &self.name
    }

    fn comment(&self) -> &str {
        &self.comment
    }

    fn dynamic(&self) -> bool {
        self.dynamic
    }

    async fn table_names(&self, _ctx: &RequestContext) -> Result<Vec<String>, AirportError> {
        let mut names: Vec<String> = self.tables.read().unwrap().keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn table(
        &self,
        _ctx: &RequestContext,
        name: &str,
    ) -> Result<Arc<dyn Table>, AirportError> {
        self.tables
            .read()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| {
                AirportError::not_found(format!(
                    "table '{}' does not exist in schema '{}'",
                    name, self.name
                ))
            })
    }

    async fn table_functions(
        &self,
        _ctx: &RequestContext,
    ) -> Result<Vec<TableFunctionInfo>, AirportError> {
        Ok(self.table_functions.clone())
    }

    async fn create_table(
        &self,
        _ctx: &RequestContext,
        definition: TableDefinition,
    ) -> Result<Arc<dyn Table>, AirportError> {
        let table: Arc<dyn Table> = Arc::new(
            MemoryTable::new(&definition.name, definition.schema)
                .insertable()
                .updatable_batch()
                .deletable_batch(),
        );
        self.tables
            .write()
            .unwrap()
            .insert(definition.name.clone(), Arc::clone(&table));
        Ok(table)
    }

    async fn drop_table(&self, _ctx: &RequestContext, name: &str) -> Result<(), AirportError> {
        self.tables
            .write()
            .unwrap()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| {
                AirportError::not_found(format!(
                    "table '{}' does not exist in schema '{}'",
                    name, self.name
                ))
            })
    }

    async fn rename_table(
        &self,
        _ctx: &RequestContext,
        name: &str,
        new_name: &str,
    ) -> Result<(), AirportError> {
        let mut tables = self.tables.write().unwrap();
        if tables.contains_key(new_name) {
            return Err(AirportError::already_exists(format!(
                "table '{new_name}' already exists"
            )));
        }
        let table = tables.remove(name).ok_or_else(|| {
            AirportError::not_found(format!("table '{name}' does not exist"))
        })?;
        tables.insert(new_name.to_string(), table);
        Ok(())
    }
}

pub struct MemoryCatalog {
    name: String,
    dynamic: bool,
    schemas: RwLock<HashMap<String, Arc<MemorySchema>>>,
    pub schema_names_calls: AtomicUsize,
}

impl MemoryCatalog {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            dynamic: false,
            schemas: RwLock::new(HashMap::new()),
            schema_names_calls: AtomicUsize::new(0),
        }
    }

    pub fn dynamic(mut self) -> Self {
        self.dynamic = true;
        self
    }

    pub fn with_schema(self, schema: Arc<MemorySchema>) -> Self {
        self.schemas
            .write()
            .unwrap()
            .insert(schema.name().to_string(), schema);
        self
    }
}

#[async_trait]
impl Catalog for MemoryCatalog {
    fn name(&self) -> &str {
        &self.name
    }

    fn dynamic(&self) -> bool {
        self.dynamic
    }

    async fn schema_names(&self, _ctx: &RequestContext) -> Result<Vec<String>, AirportError> {
        self.schema_names_calls.fetch_add(1, Ordering::SeqCst);
        let mut names: Vec<String> = self.schemas.read().unwrap().keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn schema(
        &self,
        _ctx: &RequestContext,
        name: &str,
    ) -> Result<Arc<dyn CatalogSchema>, AirportError> {
        self.schemas
            .read()
            .unwrap()
            .get(name)
            .map(|s| Arc::clone(s) as Arc<dyn CatalogSchema>)
            .ok_or_else(|| AirportError::not_found(format!("schema '{name}' does not exist")))
    }

    async fn create_schema(
        &self,
        _ctx: &RequestContext,
        definition: SchemaDefinition,
    ) -> Result<(), AirportError> {
        let mut schemas = self.schemas.write().unwrap();
        if schemas.contains_key(&definition.name) {
            return Err(AirportError::already_exists(format!(
                "schema '{}' already exists",
                definition.name
            )));
        }
        let mut schema = MemorySchema::new(&definition.name).dynamic();
        if let Some(comment) = definition.comment {
            schema = schema.with_comment(&comment);
        }
        schemas.insert(definition.name.clone(), Arc::new(schema));
        Ok(())
    }

    async fn drop_schema(&self, _ctx: &RequestContext, name: &str) -> Result<(), AirportError> {
        self.schemas
            .write()
            .unwrap()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| AirportError::not_found(format!("schema '{name}' does not exist")))
    }
}

// ---------------------------------------------------------------------------
// Spy coordinator and authenticator
// ---------------------------------------------------------------------------

/// Delegates to the in-memory coordinator while counting terminal calls.
pub struct SpyCoordinator {
    inner: MemoryTransactionCoordinator,
    pub commits: AtomicUsize,
    pub rollbacks: AtomicUsize,
}

impl SpyCoordinator {
    pub fn new() -> Self {
        Self {
            inner: MemoryTransactionCoordinator::new(),
            commits: AtomicUsize::new(0),
            rollbacks: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl TransactionCoordinator for SpyCoordinator {
    async fn begin(&self, ctx: &RequestContext) -> Result<String, AirportError> {
        self.inner.begin(ctx).await
    }

    async fn commit(&self, ctx: &RequestContext, transaction_id: &str) -> Result<(), AirportError> {
        self.commits.fetch_add(1, Ordering::SeqCst);
        self.inner.commit(ctx, transaction_id).await
    }

    async fn rollback(
        &self,
        ctx: &RequestContext,
        transaction_id: &str,
    ) -> Result<(), AirportError> {
        self.rollbacks.fetch_add(1, Ordering::SeqCst);
        self.inner.rollback(ctx, transaction_id).await
    }

    async fn status(
        &self,
        ctx: &RequestContext,
        transaction_id: &str,
    ) -> Result<Option<TransactionState>, AirportError> {
        self.inner.status(ctx, transaction_id).await
    }
}

/// Accepts exactly one token; optionally denies one catalog by name.
pub struct StaticTokenAuthenticator {
    token: String,
    denied_catalog: Option<String>,
}

impl StaticTokenAuthenticator {
    pub fn new(token: &str) -> Self {
        Self {
            token: token.to_string(),
            denied_catalog: None,
        }
    }

    pub fn denying_catalog(mut self, catalog: &str) -> Self {
        self.denied_catalog = Some(catalog.to_string());
        self
    }
}

#[async_trait]
impl Authenticator for StaticTokenAuthenticator {
    async fn authenticate(&self, token: Option<&str>) -> Result<String, AirportError> {
        match token {
            Some(token) if token == self.token => Ok("test-user".to_string()),
            Some(_) => Err(AirportError::unauthenticated("invalid bearer token")),
            None => Err(AirportError::unauthenticated("missing bearer token")),
        }
    }

    fn as_catalog_authorizer(&self) -> Option<&dyn CatalogAuthorizer> {
        self.denied_catalog.as_ref().map(|_| self as &dyn CatalogAuthorizer)
    }
}

#[async_trait]
impl CatalogAuthorizer for StaticTokenAuthenticator {
    async fn authorize_catalog(
        &self,
        _identity: &str,
        catalog: &str,
    ) -> Result<(), AirportError> {
        if self.denied_catalog.as_deref() == Some(catalog) {
            return Err(AirportError::permission_denied(format!(
                "access to catalog '{catalog}' is denied"
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Flight stream helpers
// ---------------------------------------------------------------------------

/// Decode a collected FlightData sequence into record batches, skipping
/// metadata-only frames.
pub async fn decode_flight_data(messages: Vec<arrow_flight::FlightData>) -> Vec<RecordBatch> {
    let data = messages
        .into_iter()
        .filter(|m| !m.data_header.is_empty())
        .map(Ok::<_, arrow_flight::error::FlightError>);
    arrow_flight::decode::FlightRecordBatchStream::new_from_flight_data(stream::iter(data))
        .try_collect()
        .await
        .expect("failed to decode flight data")
}

/// Run DoGet for a ticket and decode the reply into batches.
pub async fn do_get_batches(
    client: &mut FlightServiceClient<Channel>,
    ticket: airport::ScanTicket,
) -> Result<Vec<RecordBatch>, tonic::Status> {
    let response = client
        .do_get(arrow_flight::Ticket::new(ticket.encode().unwrap()))
        .await?;
    let messages: Vec<arrow_flight::FlightData> =
        response.into_inner().try_collect().await?;
    Ok(decode_flight_data(messages).await)
}

// ---------------------------------------------------------------------------
// Server bootstrap
// ---------------------------------------------------------------------------

/// Bind an ephemeral port, serve in a background task, return the address.
pub async fn start_test_server(server: AirportServer) -> (SocketAddr, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        server.serve_with_listener(listener).await.unwrap();
    });
    (addr, handle)
}

pub async fn connect(addr: SocketAddr) -> FlightServiceClient<Channel> {
    let channel = tonic::transport::Endpoint::from_shared(format!("http://{addr}"))
        .expect("invalid endpoint")
        .connect()
        .await
        .expect("failed to connect to test server");
    FlightServiceClient::new(channel)
}

/// Catalog `main` with the three-row `users` table from the discovery
/// scenario, fully DML-capable.
pub fn users_catalog() -> (Arc<MemoryCatalog>, Arc<MemoryTable>) {
    let table = Arc::new(
        MemoryTable::new("users", users_schema())
            .with_rows(vec![users_batch(&[1, 2, 3], &["Alice", "Bob", "Charlie"])])
            .insertable()
            .updatable_batch()
            .deletable_batch(),
    );
    let schema = Arc::new(
        MemorySchema::new("main")
            .dynamic()
            .with_table(table.clone() as Arc<dyn Table>),
    );
    let catalog = Arc::new(MemoryCatalog::new("demo").dynamic().with_schema(schema));
    (catalog, table)
}
