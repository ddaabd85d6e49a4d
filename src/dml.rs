//! The DML exchange engine behind DoPut and DoExchange.
//!
//! A DML call is a bidirectional stream: the client sends the input schema
//! plus zero-or-more input batches; the server answers with zero-or-more
//! RETURNING batches followed by one final metadata frame carrying
//! `{status, affected_rows}` as MessagePack.  The operation and target
//! come from the `airport-operation` / `airport-flight-path` headers, with
//! the first message's descriptor as fallback; `return-chunks: 1` requests
//! the RETURNING stream.
//!
//! Capability selection never downgrades: INSERT needs an insertable
//! table, UPDATE an updatable one, DELETE a deletable one, and when both
//! the batch and the legacy variant are present the batch variant wins.
//! Rowid handling is the dispatcher's job for the legacy variants: the
//! rowid column is extracted into an `i64` sequence (null rowid aborts the
//! call) and stripped from the batch before the table sees it.

use std::sync::Arc;

use arrow::array::{Array, Int32Array, Int64Array, RecordBatch, UInt64Array};
use arrow_flight::decode::FlightRecordBatchStream;
use arrow_flight::encode::FlightDataEncoderBuilder;
use arrow_flight::error::FlightError;
use arrow_flight::{FlightData, FlightDescriptor, PutResult};
use futures::stream::{self, BoxStream};
use futures::{Stream, StreamExt, TryStreamExt};
use tonic::metadata::MetadataMap;
use tonic::Status;

use crate::catalog::{
    find_rowid_column, strip_column, BatchStream, Catalog, DmlOptions, RequestContext, Table,
};
use crate::discovery::{parse_flight_path, resolve_table};
use crate::error::{recover, AirportError};
use crate::logging::{AirportLogger, LogCategory, LogLevel};
use crate::scan::{flight_error_to_status, into_flight_error};
use crate::transaction::{with_transaction, TransactionCoordinator};
use crate::wire::{encode_msgpack, DmlResultFrame};

pub(crate) const OPERATION_HEADER: &str = "airport-operation";
pub(crate) const FLIGHT_PATH_HEADER: &str = "airport-flight-path";
pub(crate) const RETURN_CHUNKS_HEADER: &str = "return-chunks";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DmlOperation {
    Insert,
    Update,
    Delete,
}

impl DmlOperation {
    fn parse(value: &str) -> Result<Self, AirportError> {
        match value.to_lowercase().as_str() {
            "insert" => Ok(DmlOperation::Insert),
            "update" => Ok(DmlOperation::Update),
            "delete" => Ok(DmlOperation::Delete),
            other => Err(AirportError::invalid_argument(format!(
                "unknown DML operation '{other}'"
            ))),
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            DmlOperation::Insert => "insert",
            DmlOperation::Update => "update",
            DmlOperation::Delete => "delete",
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct DmlRequest {
    pub operation: DmlOperation,
    pub schema: String,
    pub table: String,
    pub returning: bool,
}

fn header_value(metadata: &MetadataMap, key: &str) -> Option<String> {
    metadata
        .get(key)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
}

/// Resolve the DML request from gRPC headers, falling back to the first
/// message's descriptor path for the target table.
pub(crate) fn dml_request(
    metadata: &MetadataMap,
    descriptor: Option<&FlightDescriptor>,
) -> Result<DmlRequest, AirportError> {
    let operation = match header_value(metadata, OPERATION_HEADER) {
        Some(value) => DmlOperation::parse(&value)?,
        None => DmlOperation::Insert,
    };

    let (schema, table) = match header_value(metadata, FLIGHT_PATH_HEADER) {
        Some(path) => parse_flight_path(&path)?,
        None => {
            let descriptor = descriptor.ok_or_else(|| {
                AirportError::invalid_argument(
                    "DML call carries neither an airport-flight-path header nor a descriptor",
                )
            })?;
            if descriptor.path.len() != 2 {
                return Err(AirportError::invalid_argument(
                    "DML descriptor path must be [schema, table]",
                ));
            }
            (descriptor.path[0].clone(), descriptor.path[1].clone())
        }
    };

    let returning = header_value(metadata, RETURN_CHUNKS_HEADER)
        .map(|v| v == "1")
        .unwrap_or(false);

    Ok(DmlRequest {
        operation,
        schema,
        table,
        returning,
    })
}

// ---------------------------------------------------------------------------
// Rowid extraction
// ---------------------------------------------------------------------------

/// Pull the rowid column out of a batch as a signed 64-bit sequence.
/// Null rowids and non-integral rowid columns abort the operation.
pub(crate) fn extract_rowids(batch: &RecordBatch, index: usize) -> Result<Vec<i64>, AirportError> {
    let column = batch.column(index);
    if column.null_count() > 0 {
        return Err(AirportError::invalid_argument(
            "rowid column contains null values",
        ));
    }

    let rowids = match column.data_type() {
        arrow::datatypes::DataType::Int64 => {
            let array = column
                .as_any()
                .downcast_ref::<Int64Array>()
                .ok_or_else(|| AirportError::internal("rowid column downcast failed"))?;
            array.values().to_vec()
        }
        arrow::datatypes::DataType::Int32 => {
            let array = column
                .as_any()
                .downcast_ref::<Int32Array>()
                .ok_or_else(|| AirportError::internal("rowid column downcast failed"))?;
            array.values().iter().map(|v| *v as i64).collect()
        }
        arrow::datatypes::DataType::UInt64 => {
            let array = column
                .as_any()
                .downcast_ref::<UInt64Array>()
                .ok_or_else(|| AirportError::internal("rowid column downcast failed"))?;
            let mut out = Vec::with_capacity(array.len());
            for value in array.values() {
                let value = i64::try_from(*value).map_err(|_| {
                    AirportError::invalid_argument(format!("rowid {value} exceeds i64 range"))
                })?;
                out.push(value);
            }
            out
        }
        other => {
            return Err(AirportError::invalid_argument(format!(
                "rowid column has non-integral type {other}"
            )))
        }
    };

    Ok(rowids)
}

fn locate_rowid(batch: &RecordBatch, operation: DmlOperation) -> Result<usize, AirportError> {
    find_rowid_column(&batch.schema()).ok_or_else(|| {
        AirportError::failed_precondition(format!(
            "{} input carries no rowid column",
            operation.as_str()
        ))
    })
}

fn reject_null_rowids(batch: &RecordBatch, index: usize) -> Result<(), AirportError> {
    if batch.column(index).null_count() > 0 {
        return Err(AirportError::invalid_argument(
            "rowid column contains null values",
        ));
    }
    Ok(())
}

/// RETURNING column hint: the input columns minus the rowid column.
fn returning_hint(batch: &RecordBatch, rowid_index: usize) -> Vec<String> {
    batch
        .schema()
        .fields()
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != rowid_index)
        .map(|(_, f)| f.name().clone())
        .collect()
}

// ---------------------------------------------------------------------------
// Core state machine
// ---------------------------------------------------------------------------

pub(crate) struct DmlOutcome {
    pub affected_rows: i64,
    pub returning: Vec<BatchStream>,
}

/// Consume the decoded input batches and drive the selected capability.
/// Batches are processed one at a time; reading blocks the client through
/// gRPC flow control, which is the back-pressure path.
pub(crate) async fn run_dml(
    ctx: &RequestContext,
    table: Arc<dyn Table>,
    request: &DmlRequest,
    mut batches: BatchStream,
) -> Result<DmlOutcome, AirportError> {
    let mut outcome = DmlOutcome {
        affected_rows: 0,
        returning: Vec::new(),
    };

    match request.operation {
        DmlOperation::Insert => {
            let insertable = table.as_insertable().ok_or_else(|| {
                AirportError::failed_precondition(format!(
                    "table '{}' does not support INSERT",
                    request.table
                ))
            })?;
            let options = DmlOptions {
                returning: request.returning,
                returning_columns: Vec::new(),
            };
            let result = insertable.insert(ctx, batches, &options).await?;
            outcome.affected_rows += result.affected_rows;
            if let Some(returning) = result.returning {
                outcome.returning.push(returning);
            }
        }
        DmlOperation::Update => {
            // Batch variant preferred; never a silent downgrade past this.
            let batch_variant = table.as_updatable_batch();
            let legacy_variant = table.as_updatable();
            if batch_variant.is_none() && legacy_variant.is_none() {
                return Err(AirportError::failed_precondition(format!(
                    "table '{}' does not support UPDATE",
                    request.table
                )));
            }

            while let Some(batch) = batches.try_next().await? {
                let rowid_index = locate_rowid(&batch, request.operation)?;
                let options = DmlOptions {
                    returning: request.returning,
                    returning_columns: returning_hint(&batch, rowid_index),
                };
                let result = if let Some(updatable) = batch_variant {
                    reject_null_rowids(&batch, rowid_index)?;
                    updatable.update_batch(ctx, batch, &options).await?
                } else {
                    let legacy = legacy_variant.expect("checked above");
                    let rowids = extract_rowids(&batch, rowid_index)?;
                    let stripped = strip_column(&batch, rowid_index)?;
                    legacy.update(ctx, rowids, stripped, &options).await?
                };
                crate::airport_trace!(Dml, "update batch applied ({} row(s))", result.affected_rows);
                outcome.affected_rows += result.affected_rows;
                if let Some(returning) = result.returning {
                    outcome.returning.push(returning);
                }
            }
        }
        DmlOperation::Delete => {
            let batch_variant = table.as_deletable_batch();
            let legacy_variant = table.as_deletable();
            if batch_variant.is_none() && legacy_variant.is_none() {
                return Err(AirportError::failed_precondition(format!(
                    "table '{}' does not support DELETE",
                    request.table
                )));
            }

            while let Some(batch) = batches.try_next().await? {
                let rowid_index = locate_rowid(&batch, request.operation)?;
                let options = DmlOptions {
                    returning: request.returning,
                    returning_columns: returning_hint(&batch, rowid_index),
                };
                let result = if let Some(deletable) = batch_variant {
                    reject_null_rowids(&batch, rowid_index)?;
                    deletable.delete_batch(ctx, batch, &options).await?
                } else {
                    let legacy = legacy_variant.expect("checked above");
                    let rowids = extract_rowids(&batch, rowid_index)?;
                    legacy.delete(ctx, rowids, &options).await?
                };
                crate::airport_trace!(Dml, "delete batch applied ({} row(s))", result.affected_rows);
                outcome.affected_rows += result.affected_rows;
                if let Some(returning) = result.returning {
                    outcome.returning.push(returning);
                }
            }
        }
    }

    Ok(outcome)
}

// ---------------------------------------------------------------------------
// Stream plumbing
// ---------------------------------------------------------------------------

/// Peel the first inbound message (it may carry the descriptor) and
/// reassemble the full FlightData stream for the batch decoder.
async fn split_first<S>(
    mut input: std::pin::Pin<Box<S>>,
) -> Result<
    (
        Option<FlightDescriptor>,
        BoxStream<'static, Result<FlightData, FlightError>>,
    ),
    AirportError,
>
where
    S: Stream<Item = Result<FlightData, Status>> + Send + 'static,
{
    let first = match input.try_next().await.map_err(AirportError::from)? {
        Some(first) => first,
        None => return Ok((None, stream::empty().boxed())),
    };

    let descriptor = first.flight_descriptor.clone();

    let full = stream::once(async move { Ok(first) })
        .chain(input.map_err(|e: Status| FlightError::Tonic(Box::new(e))))
        .boxed();

    Ok((descriptor, full))
}

fn decode_batches(
    flight_data: BoxStream<'static, Result<FlightData, FlightError>>,
) -> BatchStream {
    FlightRecordBatchStream::new_from_flight_data(flight_data)
        .map_err(AirportError::from)
        .boxed()
}

/// Drive one DML call end to end and build the DoExchange reply stream:
/// RETURNING batches (when requested) followed by the final metadata
/// frame.  On error no metadata frame is produced; the transaction wrapper
/// has already rolled back by the time the status reaches the client.
pub(crate) async fn do_exchange<S>(
    ctx: RequestContext,
    catalog: Arc<dyn Catalog>,
    coordinator: Option<Arc<dyn TransactionCoordinator>>,
    metadata: &MetadataMap,
    input: S,
) -> Result<BoxStream<'static, Result<FlightData, Status>>, Status>
where
    S: Stream<Item = Result<FlightData, Status>> + Send + 'static,
{
    let (descriptor, flight_data) = split_first(Box::pin(input)).await.map_err(Status::from)?;
    let request = dml_request(metadata, descriptor.as_ref()).map_err(Status::from)?;

    AirportLogger::log(
        LogLevel::Debug,
        LogCategory::Dml,
        "exchange accepted",
        &[
            ("operation", request.operation.as_str()),
            ("schema", request.schema.as_str()),
            ("table", request.table.as_str()),
            ("returning", if request.returning { "1" } else { "0" }),
        ],
    );

    let outcome = execute(&ctx, &catalog, coordinator, &request, decode_batches(flight_data))
        .await
        .map_err(Status::from)?;

    let metadata_frame = FlightData {
        app_metadata: encode_msgpack(&DmlResultFrame::success(outcome.affected_rows))
            .map_err(Status::from)?
            .into(),
        ..Default::default()
    };

    let reply = if request.returning && !outcome.returning.is_empty() {
        let returning = stream::iter(outcome.returning).flatten();
        FlightDataEncoderBuilder::new()
            .build(returning.map_err(into_flight_error))
            .map_err(flight_error_to_status)
            .chain(stream::once(async move { Ok(metadata_frame) }))
            .boxed()
    } else {
        stream::once(async move { Ok(metadata_frame) }).boxed()
    };

    Ok(reply)
}

/// DoPut drives the same engine; the reply channel only carries
/// `PutResult` frames, so RETURNING data is not available on this path.
pub(crate) async fn do_put<S>(
    ctx: RequestContext,
    catalog: Arc<dyn Catalog>,
    coordinator: Option<Arc<dyn TransactionCoordinator>>,
    metadata: &MetadataMap,
    input: S,
) -> Result<BoxStream<'static, Result<PutResult, Status>>, Status>
where
    S: Stream<Item = Result<FlightData, Status>> + Send + 'static,
{
    let (descriptor, flight_data) = split_first(Box::pin(input)).await.map_err(Status::from)?;
    let mut request = dml_request(metadata, descriptor.as_ref()).map_err(Status::from)?;
    request.returning = false;

    let outcome = execute(&ctx, &catalog, coordinator, &request, decode_batches(flight_data))
        .await
        .map_err(Status::from)?;

    let result = PutResult {
        app_metadata: encode_msgpack(&DmlResultFrame::success(outcome.affected_rows))
            .map_err(Status::from)?
            .into(),
    };

    Ok(stream::once(async move { Ok(result) }).boxed())
}

async fn execute(
    ctx: &RequestContext,
    catalog: &Arc<dyn Catalog>,
    coordinator: Option<Arc<dyn TransactionCoordinator>>,
    request: &DmlRequest,
    batches: BatchStream,
) -> Result<DmlOutcome, AirportError> {
    let (_, table) = resolve_table(ctx, catalog, &request.schema, &request.table).await?;
    with_transaction(coordinator.as_ref(), ctx, async {
        recover(LogCategory::Dml, run_dml(ctx, table, request, batches)).await
    })
    .await
}
