//! Wire-level codecs shared by every handler.
//!
//! Three concerns live here:
//!
//! - **MessagePack** bodies for DoAction requests/replies, scan tickets and
//!   the final DML metadata frame.  All maps are encoded with field names
//!   (`to_vec_named`) so the DuckDB Airport extension can decode them by
//!   key; unknown keys are ignored on decode and absent optional keys take
//!   their serde defaults.
//! - **Arrow IPC** schema bytes, used by `create_table`/`add_column` action
//!   bodies and the `GetSchema` reply.  Field-level metadata (including
//!   `is_rowid` and extension-type keys) rides along unchanged.
//! - The **bearer token** carried in the `authorization` gRPC header.

use arrow::datatypes::Schema;
use arrow::ipc::writer::IpcWriteOptions;
use arrow_flight::{IpcMessage, SchemaAsIpc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::AirportError;

// ---------------------------------------------------------------------------
// MessagePack helpers
// ---------------------------------------------------------------------------

/// Encode a serde value as a MessagePack map keyed by field names.
pub fn encode_msgpack<T: Serialize>(value: &T) -> Result<Vec<u8>, AirportError> {
    rmp_serde::to_vec_named(value)
        .map_err(|e| AirportError::internal(format!("msgpack encode failed: {e}")))
}

/// Decode a MessagePack body into a serde struct.
pub fn decode_msgpack<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, AirportError> {
    rmp_serde::from_slice(bytes)
        .map_err(|e| AirportError::invalid_argument(format!("malformed msgpack body: {e}")))
}

// ---------------------------------------------------------------------------
// Common wire payload types
// ---------------------------------------------------------------------------

/// A version or timestamp for time-travel reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimePoint {
    pub unit: String,
    pub value: String,
}

/// A positional argument value for table functions.
///
/// The untagged representation matches what the client sends: a plain
/// msgpack scalar per argument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(serde_bytes::ByteBuf),
    Null,
}

/// Ticket payload encoding the minimum needed to reopen a scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanTicket {
    pub schema: String,
    pub table: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub columns: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<serde_bytes::ByteBuf>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<ParameterValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_point: Option<TimePoint>,
}

impl ScanTicket {
    pub fn new(schema: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
            columns: Vec::new(),
            filter: None,
            parameters: Vec::new(),
            time_point: None,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, AirportError> {
        encode_msgpack(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, AirportError> {
        rmp_serde::from_slice(bytes)
            .map_err(|e| AirportError::invalid_argument(format!("invalid scan ticket: {e}")))
    }
}

/// Final metadata frame sent after all RETURNING batches of a DML call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DmlResultFrame {
    pub status: String,
    pub affected_rows: i64,
}

impl DmlResultFrame {
    pub fn success(affected_rows: i64) -> Self {
        Self {
            status: "success".to_string(),
            affected_rows,
        }
    }
}

// ---------------------------------------------------------------------------
// Arrow IPC schema bytes
// ---------------------------------------------------------------------------

/// Serialize a schema as an encapsulated IPC message (the format used by
/// `SchemaResult` and by action bodies carrying schemas).
pub fn schema_to_ipc_bytes(schema: &Schema) -> Result<Vec<u8>, AirportError> {
    let options = IpcWriteOptions::default();
    let message: IpcMessage = SchemaAsIpc::new(schema, &options)
        .try_into()
        .map_err(|e: arrow::error::ArrowError| {
            AirportError::internal(format!("failed to encode schema: {e}"))
        })?;
    Ok(message.0.to_vec())
}

/// Decode an encapsulated IPC schema message.
pub fn schema_from_ipc_bytes(bytes: &[u8]) -> Result<Schema, AirportError> {
    Schema::try_from(IpcMessage(bytes::Bytes::copy_from_slice(bytes)))
        .map_err(|e| AirportError::invalid_argument(format!("invalid IPC schema bytes: {e}")))
}

/// Serialize one record batch as a complete IPC stream (schema + batch),
/// the shape of the `column_statistics` reply body.
pub fn batch_to_ipc_bytes(batch: &arrow::array::RecordBatch) -> Result<Vec<u8>, AirportError> {
    let mut buffer = Vec::new();
    {
        let mut writer =
            arrow_ipc::writer::StreamWriter::try_new(&mut buffer, batch.schema().as_ref())
                .map_err(|e| AirportError::internal(format!("failed to open IPC stream: {e}")))?;
        writer
            .write(batch)
            .map_err(|e| AirportError::internal(format!("failed to write IPC batch: {e}")))?;
        writer
            .finish()
            .map_err(|e| AirportError::internal(format!("failed to finish IPC stream: {e}")))?;
    }
    Ok(buffer)
}

// ---------------------------------------------------------------------------
// Bearer token parsing
// ---------------------------------------------------------------------------

/// Extract the token from a single `authorization` header value.
///
/// The accepted shape is `Bearer <token>` with a non-empty token.
pub fn parse_bearer(header: &str) -> Result<&str, AirportError> {
    let rest = header
        .strip_prefix("Bearer ")
        .ok_or_else(|| AirportError::unauthenticated("authorization header is not a bearer token"))?;
    let token = rest.trim();
    if token.is_empty() {
        return Err(AirportError::unauthenticated("empty bearer token"));
    }
    Ok(token)
}
