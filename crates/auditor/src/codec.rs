//! JSON encoding of audit records.

use crate::error::DeliveryError;
use crate::record::AuditRecord;
use bytes::Bytes;

/// Encode a record as the JSON document posted to the collector.
pub fn encode(record: &AuditRecord) -> Result<Bytes, DeliveryError> {
    Ok(Bytes::from(serde_json::to_vec(record)?))
}

/// Decode a collector document back into a record.
pub fn decode(bytes: &[u8]) -> Result<AuditRecord, serde_json::Error> {
    serde_json::from_slice(bytes)
}
