//! The DoGet scan engine.
//!
//! A scan call decodes its ticket, resolves the table, assembles the scan
//! options and then streams batches straight from the catalog's lazy
//! iterator into the Flight encoder.  Nothing is buffered whole: the
//! encoder pulls one batch at a time, so a slow client back-pressures the
//! catalog through the gRPC send window.  Dropping the reply stream (client
//! cancel, deadline) drops the catalog stream and releases any retained
//! batches.

use std::sync::Arc;

use arrow_flight::encode::FlightDataEncoderBuilder;
use arrow_flight::error::FlightError;
use arrow_flight::FlightData;
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use tonic::Status;

use crate::catalog::{Catalog, RequestContext, ScanOptions};
use crate::discovery::{resolve_table, schema_for_request};
use crate::error::AirportError;
use crate::logging::{AirportLogger, LogCategory, LogLevel};
use crate::wire::ScanTicket;

/// Map stream-level Flight errors back onto gRPC statuses, keeping the
/// kind of any error the catalog raised mid-stream.
pub(crate) fn flight_error_to_status(err: FlightError) -> Status {
    match err {
        FlightError::Tonic(status) => *status,
        other => Status::internal(format!("flight encoding error: {other}")),
    }
}

pub(crate) fn into_flight_error(err: AirportError) -> FlightError {
    FlightError::Tonic(Box::new(Status::from(err)))
}

pub(crate) async fn do_get(
    ctx: &RequestContext,
    catalog: &Arc<dyn Catalog>,
    ticket_bytes: &[u8],
) -> Result<BoxStream<'static, Result<FlightData, Status>>, AirportError> {
    let ticket = ScanTicket::decode(ticket_bytes)?;
    AirportLogger::log(
        LogLevel::Debug,
        LogCategory::Scan,
        "opening table scan",
        &[
            ("schema", ticket.schema.as_str()),
            ("table", ticket.table.as_str()),
        ],
    );

    let (_, table) = resolve_table(ctx, catalog, &ticket.schema, &ticket.table).await?;

    if table.as_table_reference().is_some() {
        return Err(AirportError::failed_precondition(format!(
            "table '{}' is a reference; the client resolves it locally",
            ticket.table
        )));
    }

    // The announced wire schema: the projected subset when the table
    // projects, the full schema when it leaves projection to the client.
    let wire_schema = schema_for_request(ctx, &table, &ticket).await?;

    let options = ScanOptions {
        columns: ticket.columns.clone(),
        filter: ticket.filter.as_ref().map(|f| f.to_vec()),
        time_point: ticket.time_point.clone(),
        parameters: ticket.parameters.clone(),
    };

    let batches = table.scan(ctx, options).await?;

    let flight_data = FlightDataEncoderBuilder::new()
        .with_schema(wire_schema)
        .build(batches.map_err(into_flight_error))
        .map_err(flight_error_to_status);

    Ok(flight_data.boxed())
}
