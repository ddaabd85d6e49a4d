//! Discovery handlers: `ListFlights`, `GetFlightInfo` and `GetSchema`.
//!
//! Every table is announced as one `FlightInfo` whose descriptor path is
//! `[schema, table]` and whose endpoint ticket encodes enough to reopen a
//! scan.  Table references are announced with a `data://` endpoint URI the
//! client resolves into locally-executed function calls; the server never
//! streams rows for them.  Schema-level functions are listed as
//! pseudo-tables under the reserved `__functions` path segment.

use std::sync::Arc;

use arrow::datatypes::{Field, Schema, SchemaRef};
use arrow::ipc::writer::IpcWriteOptions;
use arrow_flight::flight_descriptor::DescriptorType;
use arrow_flight::{FlightDescriptor, FlightEndpoint, FlightInfo, SchemaAsIpc, SchemaResult, Ticket};

use crate::catalog::{
    Catalog, CatalogSchema, FunctionCall, RequestContext, ScanOptions, SchemaRequest, Table,
};
use crate::error::AirportError;
use crate::wire::{encode_msgpack, ScanTicket};

/// Reserved path segment under which schema-level functions are listed.
pub const FUNCTIONS_PATH_SEGMENT: &str = "__functions";

// ---------------------------------------------------------------------------
// Descriptor parsing and resolution
// ---------------------------------------------------------------------------

/// A descriptor resolved to a scan request: PATH descriptors carry only
/// `[schema, table]`, CMD descriptors a full msgpack ticket.
pub(crate) fn parse_descriptor(descriptor: &FlightDescriptor) -> Result<ScanTicket, AirportError> {
    match descriptor.r#type() {
        DescriptorType::Path => {
            if descriptor.path.len() != 2 {
                return Err(AirportError::invalid_argument(format!(
                    "descriptor path must be [schema, table], got {} segment(s)",
                    descriptor.path.len()
                )));
            }
            Ok(ScanTicket::new(
                descriptor.path[0].clone(),
                descriptor.path[1].clone(),
            ))
        }
        DescriptorType::Cmd => ScanTicket::decode(&descriptor.cmd),
        _ => Err(AirportError::invalid_argument("unknown descriptor type")),
    }
}

/// Parse a `schema/table` flight path string (used by the DML headers).
pub(crate) fn parse_flight_path(path: &str) -> Result<(String, String), AirportError> {
    match path.split_once('/') {
        Some((schema, table)) if !schema.is_empty() && !table.is_empty() => {
            Ok((schema.to_string(), table.to_string()))
        }
        _ => Err(AirportError::invalid_argument(format!(
            "flight path must be 'schema/table', got '{path}'"
        ))),
    }
}

pub(crate) async fn resolve_table(
    ctx: &RequestContext,
    catalog: &Arc<dyn Catalog>,
    schema_name: &str,
    table_name: &str,
) -> Result<(Arc<dyn CatalogSchema>, Arc<dyn Table>), AirportError> {
    let schema = catalog.schema(ctx, schema_name).await?;
    let table = schema.table(ctx, table_name).await?;
    Ok((schema, table))
}

/// Resolve the wire schema for a request: dynamic-schema tables see the
/// request parameters, every other table is asked for its (possibly
/// projected) static schema.
pub(crate) async fn schema_for_request(
    ctx: &RequestContext,
    table: &Arc<dyn Table>,
    request: &ScanTicket,
) -> Result<SchemaRef, AirportError> {
    if let Some(dynamic) = table.as_dynamic_schema() {
        return dynamic
            .schema_for_request(
                ctx,
                SchemaRequest {
                    columns: request.columns.clone(),
                    time_point: request.time_point.clone(),
                    parameters: request.parameters.clone(),
                },
            )
            .await;
    }
    Ok(table.schema(&request.columns))
}

// ---------------------------------------------------------------------------
// FlightInfo assembly
// ---------------------------------------------------------------------------

fn endpoint_for_ticket(
    ticket: &ScanTicket,
    location: Option<&str>,
) -> Result<FlightEndpoint, AirportError> {
    let mut endpoint = FlightEndpoint::new().with_ticket(Ticket::new(ticket.encode()?));
    if let Some(location) = location {
        endpoint = endpoint.with_location(location.to_string());
    }
    Ok(endpoint)
}

/// Encode the locally-executed calls of a table reference into a `data://`
/// URI the client can interpret without contacting this server again.
fn data_location(calls: &[FunctionCall]) -> Result<String, AirportError> {
    Ok(format!("data://call/{}", hex::encode(encode_msgpack(&calls)?)))
}

pub(crate) async fn flight_info_for_table(
    ctx: &RequestContext,
    table: &Arc<dyn Table>,
    request: &ScanTicket,
    location: Option<&str>,
) -> Result<FlightInfo, AirportError> {
    let schema = schema_for_request(ctx, table, request).await?;

    let descriptor =
        FlightDescriptor::new_path(vec![request.schema.clone(), request.table.clone()]);

    let endpoint = if let Some(reference) = table.as_table_reference() {
        let scan_request = ScanOptions {
            columns: request.columns.clone(),
            filter: request.filter.as_ref().map(|f| f.to_vec()),
            time_point: request.time_point.clone(),
            parameters: request.parameters.clone(),
        };
        let calls = reference.function_calls(ctx, &scan_request).await?;
        FlightEndpoint::new()
            .with_ticket(Ticket::new(request.encode()?))
            .with_location(data_location(&calls)?)
    } else {
        endpoint_for_ticket(request, location)?
    };

    let info = FlightInfo::new()
        .with_descriptor(descriptor)
        .try_with_schema(&schema)
        .map_err(|e| AirportError::internal(format!("failed to encode schema: {e}")))?
        .with_endpoint(endpoint)
        .with_total_records(-1)
        .with_total_bytes(-1);

    Ok(info)
}

/// One pseudo-table `FlightInfo` per declared function, under the reserved
/// `__functions` path.  Table functions expose their result schema when it
/// is static; scalar functions expose their signature as a schema.
async fn function_flight_infos(
    ctx: &RequestContext,
    schema_name: &str,
    schema: &Arc<dyn CatalogSchema>,
) -> Result<Vec<FlightInfo>, AirportError> {
    let mut infos = Vec::new();

    for function in schema.table_functions(ctx).await? {
        let Some(result_schema) = function.result_schema else {
            continue;
        };
        let descriptor = FlightDescriptor::new_path(vec![
            schema_name.to_string(),
            FUNCTIONS_PATH_SEGMENT.to_string(),
            function.name.clone(),
        ]);
        let info = FlightInfo::new()
            .with_descriptor(descriptor)
            .try_with_schema(&result_schema)
            .map_err(|e| AirportError::internal(format!("failed to encode schema: {e}")))?
            .with_total_records(-1)
            .with_total_bytes(-1);
        infos.push(info);
    }

    for function in schema.scalar_functions(ctx).await? {
        let mut fields: Vec<Field> = function
            .signature
            .parameters
            .iter()
            .enumerate()
            .map(|(i, dt)| Field::new(format!("arg_{i}"), dt.clone(), true))
            .collect();
        if let Some(return_type) = &function.signature.return_type {
            fields.push(Field::new("result", return_type.clone(), true));
        }
        let descriptor = FlightDescriptor::new_path(vec![
            schema_name.to_string(),
            FUNCTIONS_PATH_SEGMENT.to_string(),
            function.name.clone(),
        ]);
        let info = FlightInfo::new()
            .with_descriptor(descriptor)
            .try_with_schema(&Schema::new(fields))
            .map_err(|e| AirportError::internal(format!("failed to encode schema: {e}")))?
            .with_total_records(-1)
            .with_total_bytes(-1);
        infos.push(info);
    }

    Ok(infos)
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

pub(crate) async fn list_flights(
    ctx: &RequestContext,
    catalog: &Arc<dyn Catalog>,
    location: Option<&str>,
) -> Result<Vec<FlightInfo>, AirportError> {
    let mut flights = Vec::new();

    for schema_name in catalog.schema_names(ctx).await? {
        let schema = catalog.schema(ctx, &schema_name).await?;

        for table_name in schema.table_names(ctx).await? {
            let table = schema.table(ctx, &table_name).await?;
            let request = ScanTicket::new(schema_name.clone(), table_name.clone());
            flights.push(flight_info_for_table(ctx, &table, &request, location).await?);
        }

        flights.extend(function_flight_infos(ctx, &schema_name, &schema).await?);
    }

    Ok(flights)
}

pub(crate) async fn get_flight_info(
    ctx: &RequestContext,
    catalog: &Arc<dyn Catalog>,
    descriptor: &FlightDescriptor,
    location: Option<&str>,
) -> Result<FlightInfo, AirportError> {
    let request = parse_descriptor(descriptor)?;
    let (_, table) = resolve_table(ctx, catalog, &request.schema, &request.table).await?;
    flight_info_for_table(ctx, &table, &request, location).await
}

pub(crate) async fn get_schema(
    ctx: &RequestContext,
    catalog: &Arc<dyn Catalog>,
    descriptor: &FlightDescriptor,
) -> Result<SchemaResult, AirportError> {
    let request = parse_descriptor(descriptor)?;
    let (_, table) = resolve_table(ctx, catalog, &request.schema, &request.table).await?;
    let schema = schema_for_request(ctx, &table, &request).await?;

    let options = IpcWriteOptions::default();
    SchemaAsIpc::new(&schema, &options)
        .try_into()
        .map_err(|e: arrow::error::ArrowError| {
            AirportError::internal(format!("failed to encode schema: {e}"))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_descriptor_parses_to_minimal_ticket() {
        let descriptor = FlightDescriptor::new_path(vec!["main".to_string(), "users".to_string()]);
        let ticket = parse_descriptor(&descriptor).unwrap();
        assert_eq!(ticket.schema, "main");
        assert_eq!(ticket.table, "users");
        assert!(ticket.columns.is_empty());
    }

    #[test]
    fn short_path_descriptor_is_rejected() {
        let descriptor = FlightDescriptor::new_path(vec!["users".to_string()]);
        let err = parse_descriptor(&descriptor).unwrap_err();
        assert!(matches!(err, AirportError::InvalidArgument(_)));
    }

    #[test]
    fn cmd_descriptor_carries_full_ticket() {
        let mut request = ScanTicket::new("main", "prices");
        request.columns = vec!["price".to_string()];
        let descriptor = FlightDescriptor::new_cmd(request.encode().unwrap());
        let parsed = parse_descriptor(&descriptor).unwrap();
        assert_eq!(parsed, request);
    }

    #[test]
    fn flight_path_splits_once() {
        assert_eq!(
            parse_flight_path("main/users").unwrap(),
            ("main".to_string(), "users".to_string())
        );
        assert!(parse_flight_path("users").is_err());
        assert!(parse_flight_path("/users").is_err());
        assert!(parse_flight_path("main/").is_err());
    }

    #[test]
    fn data_location_is_hex_msgpack() {
        let calls = vec![FunctionCall {
            function_name: "read_csv".to_string(),
            arguments: vec![crate::wire::ParameterValue::Text("data.csv".to_string())],
        }];
        let uri = data_location(&calls).unwrap();
        let payload = uri.strip_prefix("data://call/").unwrap();
        let bytes = hex::decode(payload).unwrap();
        let decoded: Vec<FunctionCall> = crate::wire::decode_msgpack(&bytes).unwrap();
        assert_eq!(decoded, calls);
    }
}
