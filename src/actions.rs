//! The DoAction dispatcher.
//!
//! Every custom operation is a request-body/response-body pair: bodies are
//! MessagePack maps, responses are a msgpack ack map, a prost-encoded
//! `FlightInfo`, or an Arrow IPC batch (`column_statistics`).  DDL actions
//! against non-dynamic catalogs or schemas answer "unimplemented"; the
//! dispatcher decides that before the backend is consulted.

use std::collections::HashMap;
use std::sync::Arc;

use arrow::datatypes::Schema;
use arrow_flight::{ActionType, FlightDescriptor};
use prost::Message;
use serde::{Deserialize, Serialize};

use crate::catalog::{
    Catalog, CatalogSchema, RequestContext, SchemaDefinition, Table, TableDefinition,
};
use crate::discovery::{flight_info_for_table, parse_descriptor, resolve_table};
use crate::error::AirportError;
use crate::server::CatalogRegistry;
use crate::transaction::TransactionCoordinator;
use crate::types::{column_stats_batch, duckdb_type_to_arrow};
use crate::wire::{
    batch_to_ipc_bytes, decode_msgpack, encode_msgpack, schema_from_ipc_bytes, ScanTicket,
    TimePoint,
};

/// Everything an action handler may need, resolved by the server glue
/// before dispatch.
pub(crate) struct ActionEnv {
    pub ctx: RequestContext,
    pub catalog: Arc<dyn Catalog>,
    pub catalogs: Arc<CatalogRegistry>,
    pub coordinator: Option<Arc<dyn TransactionCoordinator>>,
    pub location: Option<String>,
}

impl ActionEnv {
    /// Action bodies may name a catalog explicitly; an absent or empty
    /// name means the one the call was routed to.
    fn catalog_named(&self, name: &Option<String>) -> Result<Arc<dyn Catalog>, AirportError> {
        match name.as_deref() {
            None | Some("") => Ok(Arc::clone(&self.catalog)),
            Some(name) if name == self.catalog.name() => Ok(Arc::clone(&self.catalog)),
            Some(name) => self.catalogs.get(name),
        }
    }
}

// ---------------------------------------------------------------------------
// Request and response bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct Ack {
    status: &'static str,
}

fn ack() -> Result<Vec<u8>, AirportError> {
    encode_msgpack(&Ack { status: "ok" })
}

#[derive(Debug, Deserialize)]
struct CreateSchemaRequest {
    #[serde(default)]
    catalog: Option<String>,
    schema: String,
    #[serde(default)]
    comment: Option<String>,
    #[serde(default)]
    tags: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct DropSchemaRequest {
    #[serde(default)]
    catalog: Option<String>,
    name: String,
    #[serde(default)]
    ignore_not_found: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum OnConflict {
    Error,
    Ignore,
    Replace,
}

impl Default for OnConflict {
    fn default() -> Self {
        OnConflict::Error
    }
}

#[derive(Debug, Deserialize)]
struct CreateTableRequest {
    #[serde(default)]
    catalog: Option<String>,
    schema: String,
    name: String,
    arrow_schema: serde_bytes::ByteBuf,
    #[serde(default)]
    on_conflict: OnConflict,
    #[serde(default)]
    constraints: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct DropTableRequest {
    #[serde(default)]
    catalog: Option<String>,
    schema: String,
    name: String,
    #[serde(default)]
    ignore_not_found: bool,
}

#[derive(Debug, Deserialize)]
struct RenameTableRequest {
    #[serde(default)]
    catalog: Option<String>,
    schema: String,
    table: String,
    new_name: String,
}

#[derive(Debug, Deserialize)]
struct AddColumnRequest {
    #[serde(default)]
    catalog: Option<String>,
    schema: String,
    table: String,
    column_schema: serde_bytes::ByteBuf,
    #[serde(default)]
    if_column_not_exists: bool,
}

#[derive(Debug, Deserialize)]
struct RemoveColumnRequest {
    #[serde(default)]
    catalog: Option<String>,
    schema: String,
    table: String,
    column: String,
    #[serde(default)]
    if_column_exists: bool,
    #[serde(default)]
    cascade: bool,
}

#[derive(Debug, Deserialize)]
struct RenameColumnRequest {
    #[serde(default)]
    catalog: Option<String>,
    schema: String,
    table: String,
    column: String,
    new_name: String,
}

#[derive(Debug, Deserialize)]
struct ChangeColumnTypeRequest {
    #[serde(default)]
    catalog: Option<String>,
    schema: String,
    table: String,
    column_schema: serde_bytes::ByteBuf,
}

#[derive(Debug, Deserialize)]
struct ColumnConstraintRequest {
    #[serde(default)]
    catalog: Option<String>,
    schema: String,
    table: String,
    column: String,
}

#[derive(Debug, Deserialize)]
struct SetDefaultRequest {
    #[serde(default)]
    catalog: Option<String>,
    schema: String,
    table: String,
    column: String,
    default: String,
}

#[derive(Debug, Deserialize)]
struct ColumnStatisticsRequest {
    flight_descriptor: serde_bytes::ByteBuf,
    column_name: String,
    #[serde(rename = "type")]
    column_type: String,
}

#[derive(Debug, Deserialize)]
struct TransactionStatusRequest {
    transaction_id: String,
}

#[derive(Debug, Serialize)]
struct TransactionCreated {
    transaction_id: String,
}

#[derive(Debug, Serialize)]
struct TransactionStatus {
    state: &'static str,
}

#[derive(Debug, Deserialize)]
struct EndpointsRequest {
    #[serde(default)]
    catalog: Option<String>,
    schema: String,
    table: String,
    #[serde(default)]
    parameters: Vec<crate::wire::ParameterValue>,
    #[serde(default)]
    time_point: Option<TimePoint>,
}

#[derive(Debug, Default, Deserialize)]
struct ListSchemasRequest {
    #[serde(default)]
    catalog: Option<String>,
}

#[derive(Debug, Serialize)]
struct SchemaListEntry {
    name: String,
    comment: String,
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

pub(crate) async fn dispatch(
    env: &ActionEnv,
    action_type: &str,
    body: &[u8],
) -> Result<Vec<u8>, AirportError> {
    crate::airport_debug!(Actions, "dispatching '{action_type}'");

    match action_type {
        "create_schema" => create_schema(env, decode_msgpack(body)?).await,
        "drop_schema" => drop_schema(env, decode_msgpack(body)?).await,
        "create_table" => create_table(env, decode_msgpack(body)?).await,
        "drop_table" => drop_table(env, decode_msgpack(body)?).await,
        "rename_table" => rename_table(env, decode_msgpack(body)?).await,
        "add_column" => add_column(env, decode_msgpack(body)?).await,
        "remove_column" => remove_column(env, decode_msgpack(body)?).await,
        "rename_column" => rename_column(env, decode_msgpack(body)?).await,
        "change_column_type" => change_column_type(env, decode_msgpack(body)?).await,
        "set_not_null" => set_not_null(env, decode_msgpack(body)?).await,
        "drop_not_null" => drop_not_null(env, decode_msgpack(body)?).await,
        "set_default" => set_default(env, decode_msgpack(body)?).await,
        "column_statistics" => column_statistics(env, decode_msgpack(body)?).await,
        "create_transaction" => create_transaction(env).await,
        "get_transaction_status" => get_transaction_status(env, decode_msgpack(body)?).await,
        "endpoints" => endpoints(env, decode_msgpack(body)?).await,
        "list_schemas" => {
            let request = if body.is_empty() {
                ListSchemasRequest::default()
            } else {
                decode_msgpack(body)?
            };
            list_schemas(env, request).await
        }
        other => Err(AirportError::unimplemented(format!(
            "unknown action '{other}'"
        ))),
    }
}

/// Everything `ListActions` advertises, with one-line descriptions.
pub(crate) fn action_types() -> Vec<ActionType> {
    let actions: &[(&str, &str)] = &[
        ("create_schema", "Create a schema in a dynamic catalog"),
        ("drop_schema", "Drop an empty schema from a dynamic catalog"),
        ("create_table", "Create a table from an Arrow schema"),
        ("drop_table", "Drop a table from a dynamic schema"),
        ("rename_table", "Rename a table within its schema"),
        ("add_column", "Add a column to a table"),
        ("remove_column", "Remove a column from a table"),
        ("rename_column", "Rename a column"),
        ("change_column_type", "Change a column's type"),
        ("set_not_null", "Add a NOT NULL constraint to a column"),
        ("drop_not_null", "Remove a NOT NULL constraint from a column"),
        ("set_default", "Set a column's default expression"),
        ("column_statistics", "Fetch statistics for one column"),
        ("create_transaction", "Open a coordinated transaction"),
        ("get_transaction_status", "Report a transaction's state"),
        ("endpoints", "Resolve the endpoints serving a table"),
        ("list_schemas", "List the schemas of a catalog"),
    ];
    actions
        .iter()
        .map(|(name, description)| ActionType {
            r#type: name.to_string(),
            description: description.to_string(),
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Schema DDL
// ---------------------------------------------------------------------------

async fn create_schema(env: &ActionEnv, request: CreateSchemaRequest) -> Result<Vec<u8>, AirportError> {
    let catalog = env.catalog_named(&request.catalog)?;
    if !catalog.dynamic() {
        return Err(AirportError::unimplemented(format!(
            "catalog '{}' does not support schema creation",
            catalog.name()
        )));
    }
    catalog
        .create_schema(
            &env.ctx,
            SchemaDefinition {
                name: request.schema,
                comment: request.comment,
                tags: request.tags,
            },
        )
        .await?;
    ack()
}

async fn drop_schema(env: &ActionEnv, request: DropSchemaRequest) -> Result<Vec<u8>, AirportError> {
    let catalog = env.catalog_named(&request.catalog)?;
    if !catalog.dynamic() {
        return Err(AirportError::unimplemented(format!(
            "catalog '{}' does not support schema drop",
            catalog.name()
        )));
    }

    let schema = match catalog.schema(&env.ctx, &request.name).await {
        Ok(schema) => schema,
        Err(AirportError::NotFound(_)) if request.ignore_not_found => return ack(),
        Err(err) => return Err(err),
    };

    let tables = schema.table_names(&env.ctx).await?;
    if !tables.is_empty() {
        return Err(AirportError::failed_precondition(format!(
            "schema '{}' still contains {} table(s); drop them first",
            request.name,
            tables.len()
        )));
    }

    catalog.drop_schema(&env.ctx, &request.name).await?;
    ack()
}

// ---------------------------------------------------------------------------
// Table DDL
// ---------------------------------------------------------------------------

async fn dynamic_schema_of(
    env: &ActionEnv,
    catalog: &Arc<dyn Catalog>,
    name: &str,
) -> Result<Arc<dyn CatalogSchema>, AirportError> {
    let schema = catalog.schema(&env.ctx, name).await?;
    if !schema.dynamic() {
        return Err(AirportError::unimplemented(format!(
            "schema '{name}' does not support table DDL"
        )));
    }
    Ok(schema)
}

async fn table_info_reply(
    env: &ActionEnv,
    schema_name: &str,
    table_name: &str,
    table: &Arc<dyn Table>,
) -> Result<Vec<u8>, AirportError> {
    let request = ScanTicket::new(schema_name, table_name);
    let info = flight_info_for_table(&env.ctx, table, &request, env.location.as_deref()).await?;
    Ok(info.encode_to_vec())
}

async fn create_table(env: &ActionEnv, request: CreateTableRequest) -> Result<Vec<u8>, AirportError> {
    let catalog = env.catalog_named(&request.catalog)?;
    let schema = dynamic_schema_of(env, &catalog, &request.schema).await?;

    let arrow_schema = Arc::new(schema_from_ipc_bytes(&request.arrow_schema)?);
    if arrow_schema.fields().is_empty() {
        return Err(AirportError::invalid_argument(
            "cannot create a table with no columns",
        ));
    }

    if let Ok(existing) = schema.table(&env.ctx, &request.name).await {
        match request.on_conflict {
            OnConflict::Error => {
                return Err(AirportError::already_exists(format!(
                    "table '{}' already exists in schema '{}'",
                    request.name, request.schema
                )))
            }
            OnConflict::Ignore => {
                return table_info_reply(env, &request.schema, &request.name, &existing).await
            }
            OnConflict::Replace => {
                schema.drop_table(&env.ctx, &request.name).await?;
            }
        }
    }

    let table = schema
        .create_table(
            &env.ctx,
            TableDefinition {
                name: request.name.clone(),
                schema: arrow_schema,
                constraints: request.constraints,
            },
        )
        .await?;

    table_info_reply(env, &request.schema, &request.name, &table).await
}

async fn drop_table(env: &ActionEnv, request: DropTableRequest) -> Result<Vec<u8>, AirportError> {
    let catalog = env.catalog_named(&request.catalog)?;
    let schema = dynamic_schema_of(env, &catalog, &request.schema).await?;

    match schema.drop_table(&env.ctx, &request.name).await {
        Ok(()) => ack(),
        Err(AirportError::NotFound(_)) if request.ignore_not_found => ack(),
        Err(err) => Err(err),
    }
}

async fn rename_table(env: &ActionEnv, request: RenameTableRequest) -> Result<Vec<u8>, AirportError> {
    let catalog = env.catalog_named(&request.catalog)?;
    let schema = dynamic_schema_of(env, &catalog, &request.schema).await?;
    schema
        .rename_table(&env.ctx, &request.table, &request.new_name)
        .await?;
    let table = schema.table(&env.ctx, &request.new_name).await?;
    table_info_reply(env, &request.schema, &request.new_name, &table).await
}

// ---------------------------------------------------------------------------
// Column DDL
// ---------------------------------------------------------------------------

async fn alterable_table(
    env: &ActionEnv,
    catalog_name: &Option<String>,
    schema: &str,
    table: &str,
) -> Result<(Arc<dyn Table>, String), AirportError> {
    let catalog = env.catalog_named(catalog_name)?;
    let (_, table) = resolve_table(&env.ctx, &catalog, schema, table).await?;
    if table.as_alterable().is_none() {
        return Err(AirportError::unimplemented(format!(
            "table '{}' does not support column DDL",
            table.name()
        )));
    }
    Ok((table, schema.to_string()))
}

/// Decode the single-field schema carried by `add_column` and
/// `change_column_type` bodies.
fn single_field(bytes: &[u8]) -> Result<arrow::datatypes::FieldRef, AirportError> {
    let schema: Schema = schema_from_ipc_bytes(bytes)?;
    if schema.fields().len() != 1 {
        return Err(AirportError::invalid_argument(format!(
            "expected a single-field schema, got {} fields",
            schema.fields().len()
        )));
    }
    Ok(Arc::clone(&schema.fields()[0]))
}

async fn add_column(env: &ActionEnv, request: AddColumnRequest) -> Result<Vec<u8>, AirportError> {
    let (table, schema_name) =
        alterable_table(env, &request.catalog, &request.schema, &request.table).await?;
    let field = single_field(&request.column_schema)?;
    table
        .as_alterable()
        .expect("checked by alterable_table")
        .add_column(&env.ctx, field, request.if_column_not_exists)
        .await?;
    table_info_reply(env, &schema_name, &request.table, &table).await
}

async fn remove_column(env: &ActionEnv, request: RemoveColumnRequest) -> Result<Vec<u8>, AirportError> {
    let (table, schema_name) =
        alterable_table(env, &request.catalog, &request.schema, &request.table).await?;
    table
        .as_alterable()
        .expect("checked by alterable_table")
        .remove_column(&env.ctx, &request.column, request.if_column_exists, request.cascade)
        .await?;
    table_info_reply(env, &schema_name, &request.table, &table).await
}

async fn rename_column(env: &ActionEnv, request: RenameColumnRequest) -> Result<Vec<u8>, AirportError> {
    let (table, schema_name) =
        alterable_table(env, &request.catalog, &request.schema, &request.table).await?;
    table
        .as_alterable()
        .expect("checked by alterable_table")
        .rename_column(&env.ctx, &request.column, &request.new_name)
        .await?;
    table_info_reply(env, &schema_name, &request.table, &table).await
}

async fn change_column_type(
    env: &ActionEnv,
    request: ChangeColumnTypeRequest,
) -> Result<Vec<u8>, AirportError> {
    let (table, schema_name) =
        alterable_table(env, &request.catalog, &request.schema, &request.table).await?;
    let field = single_field(&request.column_schema)?;
    table
        .as_alterable()
        .expect("checked by alterable_table")
        .change_column_type(&env.ctx, field)
        .await?;
    table_info_reply(env, &schema_name, &request.table, &table).await
}

async fn set_not_null(env: &ActionEnv, request: ColumnConstraintRequest) -> Result<Vec<u8>, AirportError> {
    let (table, schema_name) =
        alterable_table(env, &request.catalog, &request.schema, &request.table).await?;
    table
        .as_alterable()
        .expect("checked by alterable_table")
        .set_not_null(&env.ctx, &request.column)
        .await?;
    table_info_reply(env, &schema_name, &request.table, &table).await
}

async fn drop_not_null(env: &ActionEnv, request: ColumnConstraintRequest) -> Result<Vec<u8>, AirportError> {
    let (table, schema_name) =
        alterable_table(env, &request.catalog, &request.schema, &request.table).await?;
    table
        .as_alterable()
        .expect("checked by alterable_table")
        .drop_not_null(&env.ctx, &request.column)
        .await?;
    table_info_reply(env, &schema_name, &request.table, &table).await
}

async fn set_default(env: &ActionEnv, request: SetDefaultRequest) -> Result<Vec<u8>, AirportError> {
    let (table, schema_name) =
        alterable_table(env, &request.catalog, &request.schema, &request.table).await?;
    table
        .as_alterable()
        .expect("checked by alterable_table")
        .set_default(&env.ctx, &request.column, &request.default)
        .await?;
    table_info_reply(env, &schema_name, &request.table, &table).await
}

// ---------------------------------------------------------------------------
// Statistics
// ---------------------------------------------------------------------------

async fn column_statistics(
    env: &ActionEnv,
    request: ColumnStatisticsRequest,
) -> Result<Vec<u8>, AirportError> {
    let descriptor = FlightDescriptor::decode(request.flight_descriptor.as_ref())
        .map_err(|e| AirportError::invalid_argument(format!("invalid flight descriptor: {e}")))?;
    let target = parse_descriptor(&descriptor)?;

    let (_, table) = resolve_table(&env.ctx, &env.catalog, &target.schema, &target.table).await?;
    let statistics = table.as_statistics().ok_or_else(|| {
        AirportError::unimplemented(format!(
            "table '{}' does not expose column statistics",
            target.table
        ))
    })?;

    let column_type = duckdb_type_to_arrow(&request.column_type)?;
    let stats = statistics
        .column_statistics(&env.ctx, &request.column_name, &column_type)
        .await?;

    let batch = column_stats_batch(&column_type, &stats)?;
    batch_to_ipc_bytes(&batch)
}

// ---------------------------------------------------------------------------
// Transactions
// ---------------------------------------------------------------------------

async fn create_transaction(env: &ActionEnv) -> Result<Vec<u8>, AirportError> {
    let coordinator = env.coordinator.as_ref().ok_or_else(|| {
        AirportError::unimplemented("no transaction coordinator is configured")
    })?;
    let transaction_id = coordinator.begin(&env.ctx).await?;
    encode_msgpack(&TransactionCreated { transaction_id })
}

async fn get_transaction_status(
    env: &ActionEnv,
    request: TransactionStatusRequest,
) -> Result<Vec<u8>, AirportError> {
    let coordinator = env.coordinator.as_ref().ok_or_else(|| {
        AirportError::unimplemented("no transaction coordinator is configured")
    })?;
    let state = coordinator
        .status(&env.ctx, &request.transaction_id)
        .await?
        .ok_or_else(|| {
            AirportError::not_found(format!(
                "unknown transaction '{}'",
                request.transaction_id
            ))
        })?;
    encode_msgpack(&TransactionStatus {
        state: state.as_str(),
    })
}

// ---------------------------------------------------------------------------
// Discovery aids
// ---------------------------------------------------------------------------

async fn endpoints(env: &ActionEnv, request: EndpointsRequest) -> Result<Vec<u8>, AirportError> {
    let catalog = env.catalog_named(&request.catalog)?;
    let (_, table) = resolve_table(&env.ctx, &catalog, &request.schema, &request.table).await?;

    let mut ticket = ScanTicket::new(request.schema.clone(), request.table.clone());
    ticket.parameters = request.parameters;
    ticket.time_point = request.time_point;

    let info = flight_info_for_table(&env.ctx, &table, &ticket, env.location.as_deref()).await?;
    let encoded: Vec<serde_bytes::ByteBuf> = info
        .endpoint
        .iter()
        .map(|endpoint| serde_bytes::ByteBuf::from(endpoint.encode_to_vec()))
        .collect();
    encode_msgpack(&encoded)
}

async fn list_schemas(env: &ActionEnv, request: ListSchemasRequest) -> Result<Vec<u8>, AirportError> {
    let catalog = env.catalog_named(&request.catalog)?;
    let mut entries = Vec::new();
    for name in catalog.schema_names(&env.ctx).await? {
        let schema = catalog.schema(&env.ctx, &name).await?;
        entries.push(SchemaListEntry {
            name,
            comment: schema.comment().to_string(),
        });
    }
    encode_msgpack(&entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::datatypes::Field;

    #[test]
    fn on_conflict_decodes_lowercase() {
        #[derive(Deserialize)]
        struct Probe {
            on_conflict: OnConflict,
        }
        #[derive(Serialize)]
        struct Body<'a> {
            on_conflict: &'a str,
        }
        let bytes = encode_msgpack(&Body { on_conflict: "replace" }).unwrap();
        let probe: Probe = decode_msgpack(&bytes).unwrap();
        assert_eq!(probe.on_conflict, OnConflict::Replace);
    }

    #[test]
    fn on_conflict_defaults_to_error() {
        assert_eq!(OnConflict::default(), OnConflict::Error);
    }

    #[test]
    fn action_catalog_is_complete() {
        let names: Vec<String> = action_types().into_iter().map(|a| a.r#type).collect();
        for expected in [
            "create_schema",
            "drop_schema",
            "create_table",
            "drop_table",
            "column_statistics",
            "create_transaction",
            "get_transaction_status",
            "endpoints",
            "list_schemas",
        ] {
            assert!(names.iter().any(|n| n == expected), "missing {expected}");
        }
    }

    #[test]
    fn single_field_schema_is_enforced() {
        let schema = Schema::new(vec![
            Field::new("a", arrow::datatypes::DataType::Int64, true),
            Field::new("b", arrow::datatypes::DataType::Utf8, true),
        ]);
        let bytes = crate::wire::schema_to_ipc_bytes(&schema).unwrap();
        let err = single_field(&bytes).unwrap_err();
        assert!(matches!(err, AirportError::InvalidArgument(_)));
    }
}
